//! Error types for harness execution.
//!
//! Execution errors never cross the adapter boundary: `execute` folds them
//! into the `error` field of a failed `ExecutionResult`. Only harness name
//! parsing returns one directly.

use thiserror::Error;

/// Ways a harness run can go wrong.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The harness binary could not be started.
    #[error("Failed to spawn harness '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The deadline passed and the process was terminated.
    #[error("Harness timed out after {timeout_ms}ms and was terminated")]
    TimedOut { timeout_ms: u64 },

    /// The process exited unsuccessfully.
    #[error("Harness exited with code {code}: {detail}")]
    NonZeroExit { code: i32, detail: String },

    /// Exit code was zero but stderr carried failure vocabulary.
    #[error("Harness reported a failure: {0}")]
    FailureSignal(String),

    /// Harness name not recognized.
    #[error("Unknown harness '{0}' (expected claude, codex, or aider)")]
    UnknownHarness(String),

    /// I/O error while supervising the process.
    #[error("Harness I/O error: {0}")]
    Io(#[from] std::io::Error),
}
