use std::alloc::Layout;

use thiserror::Error;

/// Errors surfaced by [`crate::HashMap`] and [`crate::HashSet`].
///
/// Every other failure mode (displacement overflow, rehash retries) is
/// handled internally by growing the table; it never reaches a caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("allocation failed for layout {0:?}")]
    AllocationFailed(Layout),
}

pub type Result<T> = std::result::Result<T, Error>;
