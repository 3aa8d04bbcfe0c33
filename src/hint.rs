// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) KTH Royal Institute of Technology
// SPDX-License-Identifier: MIT

//! Compiler hints. The `nightly` feature routes these through
//! `core::intrinsics`; on stable they degrade to plain pass-throughs.

#[cfg(feature = "nightly")]
#[inline]
#[allow(dead_code)]
pub(crate) fn likely(b: bool) -> bool {
    unsafe { core::intrinsics::likely(b) }
}

#[cfg(not(feature = "nightly"))]
#[inline]
#[allow(dead_code)]
pub(crate) fn likely(b: bool) -> bool {
    b
}

#[cfg(feature = "nightly")]
#[inline]
#[allow(dead_code)]
pub(crate) fn unlikely(b: bool) -> bool {
    unsafe { core::intrinsics::unlikely(b) }
}

#[cfg(not(feature = "nightly"))]
#[inline]
#[allow(dead_code)]
pub(crate) fn unlikely(b: bool) -> bool {
    b
}

/// Issues a read-prefetch for `ptr`. A pure optimization hint: skipped
/// entirely on stable, where there's no portable intrinsic for it.
#[cfg(feature = "nightly")]
#[inline]
#[allow(dead_code)]
pub(crate) unsafe fn prefetch_read<T>(ptr: *const T) {
    core::intrinsics::prefetch_read_data(ptr, 3);
}

#[cfg(not(feature = "nightly"))]
#[inline]
#[allow(dead_code)]
pub(crate) unsafe fn prefetch_read<T>(_ptr: *const T) {}
