//! Error types for the record store and claim coordinator.

use std::path::PathBuf;

use taskhive_core::CoreError;
use thiserror::Error;

/// Errors that can occur while reading, locking, or rewriting the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The token stayed held by another worker for every attempt.
    #[error("Timed out acquiring lock '{}' after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Filesystem error.
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record line could not be parsed.
    #[error("Corrupt record on line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Domain rule violated inside an exclusive-access cycle.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// Lock contention is routine under concurrency; callers retry later.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
