//! Worker error types.

use taskhive_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Store failure other than routine lock contention.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configured harness binary could not be started.
    #[error("Harness '{name}' is not available (tried '{binary}')")]
    HarnessUnavailable { name: String, binary: String },
}
