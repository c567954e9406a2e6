//! TaskHive Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The filesystem
//! - Spawned processes
//! - Runtime specifics
//!
//! The record store, the harness adapters, and the worker loop all build on
//! the types and the claim policy defined here.

pub mod error;
pub mod ids;
pub mod item;
pub mod scheduler;
pub mod stats;
pub mod status;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{WorkItemId, WorkerId};
pub use item::{AttemptOutcome, WorkItem, DEFAULT_MAX_RETRIES};
pub use stats::QueueStats;
pub use status::{ItemStatus, Priority};
