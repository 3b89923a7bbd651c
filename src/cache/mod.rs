//! Cache generations — named snapshots of `request key → stored response`.
//!
//! A generation is created at install time, becomes the active one at
//! activation, and every generation belonging to an older version is then
//! deleted. [`CacheStorage`] is the seam the router talks to;
//! [`MemoryStorage`] is the in-process implementation.
//!
//! Storage is shared by every in-flight request. Implementations must be
//! safe for concurrent use with last-write-wins semantics per key, and a
//! lookup into a generation that no longer exists is a miss, not an error.

mod entry;
mod storage;

pub use entry::CacheEntry;
pub use storage::{CacheStorage, MemoryStorage};

use thiserror::Error;

/// Errors raised by a [`CacheStorage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache storage lock poisoned")]
    Poisoned,

    #[error("cache backend failure: {0}")]
    Backend(String),
}
