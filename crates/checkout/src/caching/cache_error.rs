use std::any::Any;

use thiserror::Error;

use crate::utils::panic_message;

/// An error raised by a [`Cache`](super::Cache) implementation.
///
/// These errors never escape the [`SafeCache`](super::SafeCache) failure boundary.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the underlying storage failed.
    #[error("cache i/o failed")]
    Io(#[from] std::io::Error),
    /// An entry could not be (de)serialized by the implementation.
    #[error("failed to (de)serialize cache entry")]
    Serialization(#[from] serde_json::Error),
    /// The storage is temporarily unavailable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// An unexpected error, including panics caught at the failure boundary.
    #[error("internal cache error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Converts a panic payload caught around a cache call into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Internal(format!("panicked: {}", panic_message(payload.as_ref())))
    }
}
