//! TaskHive record store.
//!
//! All work items live in one JSON Lines file shared by every worker process
//! on the machine. There is no server: mutual exclusion comes from a token
//! file created next to the store, and every read-modify-write cycle reloads
//! the file from disk.
//!
//! # Example
//!
//! ```rust,no_run
//! use taskhive_core::{AttemptOutcome, WorkItem, WorkerId};
//! use taskhive_store::{LockConfig, WorkQueue};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = WorkQueue::open(
//!         ".taskhive/queue.jsonl",
//!         WorkerId::generate(),
//!         LockConfig::default(),
//!     );
//!
//!     queue.enqueue(WorkItem::new("Add tests", "Cover the parser")).await?;
//!
//!     if let Some(item) = queue.claim_next().await? {
//!         queue.report(&item.id, &AttemptOutcome::Succeeded).await?;
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod lock;
mod queue;
mod record;

pub use error::StoreError;
pub use lock::{ClaimCoordinator, LockConfig, LockGuard};
pub use queue::{ReportReceipt, WorkQueue};
pub use record::{parse_records, render_records, RecordStore};
