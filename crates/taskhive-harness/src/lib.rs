//! Harness adapters for TaskHive
//!
//! This crate runs external coding-agent CLIs (Claude Code, Codex, Aider)
//! as supervised child processes: one prompt in, one `ExecutionResult` out,
//! with streamed output, inferred progress, and timeout enforcement.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskhive_harness::{
//!     ChannelObserver, ChatMessage, ExecutionRequest, HarnessConfig, HarnessKind,
//! };
//!
//! async fn run() {
//!     let adapter = HarnessKind::Claude.build(HarnessConfig::new().with_model("sonnet"));
//!     if !adapter.is_available().await {
//!         return;
//!     }
//!
//!     let (observer, _rx) = ChannelObserver::new();
//!     let request = ExecutionRequest::new("You are a careful engineer.", ".")
//!         .with_message(ChatMessage::user("Add a README"));
//!
//!     let result = adapter.execute(&request, Arc::new(observer)).await;
//!     println!("success={} files={:?}", result.success, result.files_modified);
//! }
//! ```

mod adapter;
mod aider;
mod claude;
mod codex;
mod error;
mod inference;
mod kind;
mod observer;
mod process;
mod types;

pub use adapter::{
    resolve_env, CliAdapter, CliConvention, EnvVar, HarnessAdapter, HarnessConfig,
    DEFAULT_AVAILABILITY_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_TIMEOUT,
};
pub use aider::Aider;
pub use claude::ClaudeCode;
pub use codex::Codex;
pub use error::HarnessError;
pub use inference::{parse_count, FileChanges, OutputPatterns, ProgressTracker};
pub use kind::HarnessKind;
pub use observer::{ChannelObserver, ExecutionEvent, ExecutionObserver, NoopObserver};
pub use process::{supervise, ProcessOutcome, ProcessSpec};
pub use types::{
    ChatMessage, ExecutionRequest, ExecutionResult, Phase, ProgressEvent, Role, TokenUsage,
};
