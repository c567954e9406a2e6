//! Queue-level counters.

use serde::Serialize;
use std::fmt;

use crate::scheduler::{completed_ids, is_claimable};
use crate::{ItemStatus, WorkItem};

/// Counts of items per status for one snapshot of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub ready: usize,
    /// Ready items whose prerequisites are all completed.
    pub claimable: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let completed = completed_ids(items);
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };

        for item in items {
            match item.status {
                ItemStatus::Ready => {
                    stats.ready += 1;
                    if is_claimable(item, &completed) {
                        stats.claimable += 1;
                    }
                }
                ItemStatus::InProgress => stats.in_progress += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// True when nothing is left to run or running.
    pub fn is_drained(&self) -> bool {
        self.ready == 0 && self.in_progress == 0
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} ready={} (claimable={}) in_progress={} completed={} failed={}",
            self.total, self.ready, self.claimable, self.in_progress, self.completed, self.failed
        )
    }
}
