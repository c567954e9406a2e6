//! TaskHive worker
//!
//! A worker repeatedly claims the highest-priority eligible item from a shared
//! queue file, hands it to a coding-agent harness, and reports the outcome
//! back. Any number of workers may share one queue; the only coordination is
//! the store's lock token.

pub mod config;
pub mod error;
pub mod executor;
pub mod json_output;
pub mod worker_loop;

pub use config::{Cli, Config, DEFAULT_STORE_PATH, DEFAULT_SYSTEM_PROMPT};
pub use error::WorkerError;
pub use worker_loop::{CycleOutcome, RunSummary, Worker};
