//! Core domain errors.

use thiserror::Error;

/// Core domain errors for TaskHive.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Work item not found.
    #[error("Work item not found: {0}")]
    ItemNotFound(String),

    /// A work item with the same id already exists.
    #[error("Work item already exists: {0}")]
    DuplicateItem(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
