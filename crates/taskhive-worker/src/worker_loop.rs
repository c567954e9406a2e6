//! The claim / execute / report cycle.

use std::sync::Arc;

use serde::Serialize;
use taskhive_core::{AttemptOutcome, ItemStatus, WorkItemId};
use taskhive_harness::HarnessAdapter;
use taskhive_store::{ReportReceipt, StoreError, WorkQueue};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::WorkerError;
use crate::executor::{attempt_outcome, build_request, ItemObserver};
use crate::json_output;

/// What one pass through the cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An item was executed and its outcome persisted.
    Processed { item_id: WorkItemId, status: ItemStatus },
    /// Nothing was claimable.
    Idle,
    /// The token could not be acquired for the claim.
    Contended,
    /// The item ran, but the report never got the token. It stays
    /// `in_progress` until an operator intervenes.
    ReportAbandoned { item_id: WorkItemId },
}

/// Counters for a worker's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub completed: u32,
    pub retried: u32,
    pub failed: u32,
    pub abandoned: u32,
}

impl RunSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Processed { status, .. } => {
                self.processed += 1;
                match status {
                    ItemStatus::Completed => self.completed += 1,
                    ItemStatus::Ready => self.retried += 1,
                    ItemStatus::Failed => self.failed += 1,
                    ItemStatus::InProgress => {}
                }
            }
            CycleOutcome::ReportAbandoned { .. } => {
                self.processed += 1;
                self.abandoned += 1;
            }
            CycleOutcome::Idle | CycleOutcome::Contended => {}
        }
    }
}

/// A worker bound to one queue file and one harness.
pub struct Worker {
    config: Config,
    queue: WorkQueue,
    adapter: Arc<dyn HarnessAdapter>,
}

impl Worker {
    pub fn new(config: Config, adapter: Arc<dyn HarnessAdapter>) -> Self {
        let queue = WorkQueue::open(
            config.store_path.clone(),
            config.worker_id.clone(),
            config.lock.clone(),
        );
        Self {
            config,
            queue,
            adapter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Claim one item, execute it, and report the result.
    pub async fn run_once(&self) -> Result<CycleOutcome, WorkerError> {
        let item = match self.queue.claim_next().await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(CycleOutcome::Idle),
            Err(e) if e.is_lock_timeout() => {
                warn!(
                    worker_id = %self.config.worker_id,
                    error = %e,
                    "Claim skipped, store is busy"
                );
                return Ok(CycleOutcome::Contended);
            }
            Err(e) => return Err(e.into()),
        };

        json_output::emit_item_claimed(
            item.id.as_str(),
            &item.title,
            item.priority.as_str(),
            item.retry_count,
        );

        let request = build_request(&item, &self.config);
        info!(
            item_id = %item.id,
            harness = self.adapter.name(),
            attempt = item.retry_count + 1,
            max_retries = item.max_retries,
            "Executing work item"
        );
        let observer = Arc::new(ItemObserver::new(item.id.clone()));
        let result = self.adapter.execute(&request, observer).await;
        let outcome = attempt_outcome(&result);

        let Some(receipt) = self.report_with_retry(&item.id, &outcome).await? else {
            json_output::emit_report_abandoned(item.id.as_str(), self.config.report_attempts);
            return Ok(CycleOutcome::ReportAbandoned { item_id: item.id });
        };

        let error = receipt.item.last_error.as_deref().unwrap_or_default();
        let files_changed =
            result.files_created.len() + result.files_modified.len() + result.files_deleted.len();
        match receipt.status {
            ItemStatus::Completed => json_output::emit_item_completed(
                item.id.as_str(),
                result.duration_ms,
                files_changed,
                result.token_usage.as_ref(),
            ),
            ItemStatus::Ready => json_output::emit_item_retrying(
                item.id.as_str(),
                receipt.item.retry_count,
                receipt.item.max_retries,
                error,
            ),
            ItemStatus::Failed => {
                json_output::emit_item_failed(item.id.as_str(), receipt.item.retry_count, error)
            }
            ItemStatus::InProgress => {}
        }

        Ok(CycleOutcome::Processed {
            item_id: item.id,
            status: receipt.status,
        })
    }

    /// Report an outcome, retrying on lock contention.
    ///
    /// Returns `None` if every attempt hit `LockTimeout`.
    async fn report_with_retry(
        &self,
        id: &WorkItemId,
        outcome: &AttemptOutcome,
    ) -> Result<Option<ReportReceipt>, StoreError> {
        let attempts = self.config.report_attempts.max(1);
        for attempt in 1..=attempts {
            match self.queue.report(id, outcome).await {
                Ok(receipt) => return Ok(Some(receipt)),
                Err(e) if e.is_lock_timeout() => {
                    warn!(item_id = %id, attempt, attempts, "Report blocked by lock contention");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!(
            item_id = %id,
            attempts,
            "Giving up on report; item left in_progress"
        );
        Ok(None)
    }

    /// Run cycles until shutdown is signalled, or until idle in `once` mode.
    ///
    /// Shutdown is only observed between cycles, so an item in flight is
    /// always executed and reported.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, WorkerError> {
        let mut summary = RunSummary::default();

        loop {
            if *shutdown.borrow() {
                info!(worker_id = %self.config.worker_id, "Shutdown requested, stopping");
                break;
            }

            match self.run_once().await {
                Ok(outcome @ CycleOutcome::Processed { .. })
                | Ok(outcome @ CycleOutcome::ReportAbandoned { .. }) => {
                    summary.record(&outcome);
                    continue;
                }
                Ok(CycleOutcome::Idle) => {
                    if self.config.once {
                        info!(worker_id = %self.config.worker_id, "No claimable work left");
                        break;
                    }
                    debug!(
                        poll_ms = self.config.poll_interval.as_millis() as u64,
                        "Queue idle, waiting"
                    );
                }
                Ok(CycleOutcome::Contended) => {}
                Err(e) => {
                    if self.config.once {
                        return Err(e);
                    }
                    error!(error = %e, "Worker cycle failed");
                    json_output::emit_error(&e.to_string());
                }
            }

            self.idle_wait(&mut shutdown).await;
        }

        info!(
            worker_id = %self.config.worker_id,
            processed = summary.processed,
            completed = summary.completed,
            retried = summary.retried,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Worker stopped"
        );
        Ok(summary)
    }

    async fn idle_wait(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => {}
            changed = shutdown.changed() => {
                // Sender gone: nobody can ask us to stop any more, so just sleep.
                if changed.is_err() {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}
