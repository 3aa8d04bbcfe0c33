// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) KTH Royal Institute of Technology
// SPDX-License-Identifier: MIT

//! Selects the group-scan backend used by the iteration engine (§4.7):
//! SSE2 scans 8 metadata words at once where available, otherwise a
//! portable 4-word fallback is used. Picked the same way the rest of this
//! codebase's SIMD-or-scalar code paths are: a `cfg_if!` over
//! `target_feature`, not runtime dispatch.

cfg_if::cfg_if! {
    if #[cfg(all(
        target_feature = "sse2",
        any(target_arch = "x86", target_arch = "x86_64"),
        not(miri)
    ))] {
        #[path = "sse2.rs"]
        mod imp;
    } else {
        #[path = "generic.rs"]
        mod imp;
    }
}

pub(crate) use imp::{Group, BITS_PER_LANE, WIDTH};
