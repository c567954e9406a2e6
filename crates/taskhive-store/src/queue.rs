//! Work queue - the claim/report protocol over the record store.

use std::path::{Path, PathBuf};

use taskhive_core::{
    scheduler, AttemptOutcome, CoreError, ItemStatus, WorkItem, WorkItemId, WorkerId,
};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::lock::{ClaimCoordinator, LockConfig};
use crate::record::RecordStore;

/// Result of reporting an attempt back to the store.
#[derive(Debug, Clone)]
pub struct ReportReceipt {
    /// The item as persisted after the report.
    pub item: WorkItem,
    /// Status the item moved to.
    pub status: ItemStatus,
}

/// A worker's handle on the shared queue file.
///
/// Every mutating call runs one exclusive-access cycle: acquire the token,
/// load the full record set, mutate, rewrite if anything changed, release.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    store: RecordStore,
    coordinator: ClaimCoordinator,
}

impl WorkQueue {
    /// Open the queue at `path` for `worker`.
    pub fn open(path: impl Into<PathBuf>, worker: WorkerId, lock_config: LockConfig) -> Self {
        let store = RecordStore::new(path);
        let coordinator = ClaimCoordinator::for_store(store.path(), worker, lock_config);
        Self { store, coordinator }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn worker_id(&self) -> &WorkerId {
        self.coordinator.holder()
    }

    /// Run `f` against the current record set while holding the token.
    ///
    /// Changes made by `f` are persisted before the token is released. If `f`
    /// returns an error nothing is written.
    pub async fn with_exclusive_access<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<WorkItem>) -> Result<R, StoreError>,
    {
        let guard = self.coordinator.acquire().await?;

        let outcome = self.store.load().and_then(|mut items| {
            let before = items.clone();
            let value = f(&mut items)?;
            if items != before {
                self.store.save(&items)?;
            }
            Ok(value)
        });

        if let Err(e) = guard.release() {
            warn!(error = %e, "Failed to release lock after cycle");
        }
        outcome
    }

    /// Append a new item. Its id must not already exist.
    pub async fn enqueue(&self, item: WorkItem) -> Result<WorkItemId, StoreError> {
        let id = item.id.clone();
        self.with_exclusive_access(move |items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(CoreError::DuplicateItem(item.id.to_string()).into());
            }
            items.push(item);
            Ok(())
        })
        .await?;

        info!(item_id = %id, "Work item enqueued");
        Ok(id)
    }

    /// Claim the next eligible item for this worker, if any.
    pub async fn claim_next(&self) -> Result<Option<WorkItem>, StoreError> {
        let worker = self.worker_id().clone();
        let claimed = self
            .with_exclusive_access(|items| {
                let Some(idx) = scheduler::select_next(items) else {
                    return Ok(None);
                };
                let item = &mut items[idx];
                item.claim(&worker)?;
                Ok(Some(item.clone()))
            })
            .await?;

        match &claimed {
            Some(item) => info!(
                item_id = %item.id,
                worker_id = %worker,
                priority = %item.priority,
                retry_count = item.retry_count,
                "Claimed work item"
            ),
            None => debug!(worker_id = %worker, "No claimable work item"),
        }
        Ok(claimed)
    }

    /// Record the outcome of an attempt on `id`.
    pub async fn report(
        &self,
        id: &WorkItemId,
        outcome: &AttemptOutcome,
    ) -> Result<ReportReceipt, StoreError> {
        let worker = self.worker_id().clone();
        let receipt = self
            .with_exclusive_access(|items| {
                let item = items
                    .iter_mut()
                    .find(|item| &item.id == id)
                    .ok_or_else(|| CoreError::ItemNotFound(id.to_string()))?;

                if item.assigned_worker.as_ref() != Some(&worker) {
                    warn!(
                        item_id = %id,
                        worker_id = %worker,
                        assigned_worker = ?item.assigned_worker.as_ref().map(WorkerId::as_str),
                        "Reporting on an item assigned to another worker"
                    );
                }

                let status = item.record_outcome(outcome)?;
                Ok(ReportReceipt {
                    item: item.clone(),
                    status,
                })
            })
            .await?;

        match receipt.status {
            ItemStatus::Completed => info!(item_id = %id, "Work item completed"),
            ItemStatus::Ready => info!(
                item_id = %id,
                retry_count = receipt.item.retry_count,
                max_retries = receipt.item.max_retries,
                "Work item failed, requeued for retry"
            ),
            ItemStatus::Failed => warn!(
                item_id = %id,
                retry_count = receipt.item.retry_count,
                error = ?receipt.item.last_error,
                "Work item failed permanently"
            ),
            ItemStatus::InProgress => {}
        }
        Ok(receipt)
    }

    /// Read the store without taking the token. May be slightly stale but is
    /// never torn, since writers replace the file atomically.
    pub fn snapshot(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.store.load()
    }

    /// Look up one item in a lock-free snapshot.
    pub fn get(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        Ok(self.snapshot()?.into_iter().find(|item| &item.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use taskhive_core::Priority;

    fn queue(dir: &Path, worker: &str) -> WorkQueue {
        WorkQueue::open(
            dir.join("queue.jsonl"),
            WorkerId::new(worker),
            LockConfig::default().with_retry_interval(Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "producer");

        let id = q.enqueue(WorkItem::new("First", "do it")).await.unwrap();
        let items = q.snapshot().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert!(!q.coordinator.lock_path().exists());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "producer");

        q.enqueue(WorkItem::new("a", "").with_id("x")).await.unwrap();
        let err = q.enqueue(WorkItem::new("b", "").with_id("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::DuplicateItem(_))));
        assert_eq!(q.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_prefers_priority() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        q.enqueue(WorkItem::new("A", "").with_id("a").with_priority(Priority::Low))
            .await
            .unwrap();
        q.enqueue(WorkItem::new("B", "").with_id("b").with_priority(Priority::High))
            .await
            .unwrap();

        let claimed = q.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id.as_str(), "b");
        assert_eq!(claimed.status, ItemStatus::InProgress);
        assert_eq!(claimed.assigned_worker, Some(WorkerId::new("worker-a")));

        let persisted = q.get(&WorkItemId::new("b")).unwrap().unwrap();
        assert_eq!(persisted.status, ItemStatus::InProgress);
    }

    #[tokio::test]
    async fn test_claim_on_empty_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        assert!(q.claim_next().await.unwrap().is_none());
        assert!(!q.path().exists());
    }

    #[tokio::test]
    async fn test_report_success_and_retry_paths() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        q.enqueue(WorkItem::new("flaky", "").with_id("f").with_max_retries(2))
            .await
            .unwrap();
        let id = WorkItemId::new("f");

        q.claim_next().await.unwrap().unwrap();
        let receipt = q.report(&id, &AttemptOutcome::failed("exit 1")).await.unwrap();
        assert_eq!(receipt.status, ItemStatus::Ready);
        assert!(receipt.item.assigned_worker.is_none());

        q.claim_next().await.unwrap().unwrap();
        let receipt = q.report(&id, &AttemptOutcome::failed("exit 1")).await.unwrap();
        assert_eq!(receipt.status, ItemStatus::Failed);
        assert_eq!(receipt.item.retry_count, 2);

        assert!(q.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_unknown_item() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        let err = q
            .report(&WorkItemId::new("ghost"), &AttemptOutcome::Succeeded)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_report_on_ready_item_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        q.enqueue(WorkItem::new("idle", "").with_id("i")).await.unwrap();
        let before = fs::read(q.path()).unwrap();

        let err = q
            .report(&WorkItemId::new("i"), &AttemptOutcome::Succeeded)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Core(CoreError::InvalidStateTransition { .. })
        ));
        assert_eq!(fs::read(q.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_extension_fields_survive_claim_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        q.enqueue(
            WorkItem::new("ext", "")
                .with_id("e")
                .with_extension("dashboardColumn", serde_json::json!("todo")),
        )
        .await
        .unwrap();

        q.claim_next().await.unwrap().unwrap();
        q.report(&WorkItemId::new("e"), &AttemptOutcome::Succeeded)
            .await
            .unwrap();

        let item = q.get(&WorkItemId::new("e")).unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(
            item.extensions.get("dashboardColumn"),
            Some(&serde_json::json!("todo"))
        );
    }

    #[tokio::test]
    async fn test_failed_closure_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), "worker-a");
        let result: Result<(), StoreError> = q
            .with_exclusive_access(|_| Err(CoreError::InvalidInput("nope".into()).into()))
            .await;
        assert!(result.is_err());
        assert!(!q.coordinator.lock_path().exists());
    }
}
