//! WorkItem and its claim/report transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CoreError, ItemStatus, Priority, WorkItemId, WorkerId};

/// Default retry ceiling for new items.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One queued unit of work, persisted as one line of the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Unique item identifier.
    pub id: WorkItemId,

    /// Short human-readable summary.
    pub title: String,

    /// Full description of the work.
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Items that must be completed before this one is claimable.
    #[serde(default)]
    pub dependencies: Vec<WorkItemId>,

    /// Same gating as `dependencies`, populated by other producers.
    #[serde(default)]
    pub blockers: Vec<WorkItemId>,

    /// Worker holding the item. Present only while in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Error from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Producer-owned fields the core does not interpret. Preserved verbatim.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Outcome of one execution attempt, as reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String },
}

impl AttemptOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl WorkItem {
    /// Create a new ready item with a generated id.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkItemId::generate(),
            title: title.into(),
            description: description.into(),
            status: ItemStatus::Ready,
            priority: Priority::default(),
            dependencies: Vec::new(),
            blockers: Vec::new(),
            assigned_worker: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            completed_at: None,
            created_at: now,
            updated_at: now,
            last_error: None,
            extensions: Map::new(),
        }
    }

    /// Builder method to set a specific ID.
    pub fn with_id(mut self, id: impl Into<WorkItemId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to add a dependency. Duplicates are ignored.
    pub fn with_dependency(mut self, id: impl Into<WorkItemId>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    /// Builder method to add a blocker. Duplicates are ignored.
    pub fn with_blocker(mut self, id: impl Into<WorkItemId>) -> Self {
        let id = id.into();
        if !self.blockers.contains(&id) {
            self.blockers.push(id);
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder method to attach a producer extension field.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Every id that must be completed before this item is claimable.
    pub fn prerequisites(&self) -> impl Iterator<Item = &WorkItemId> {
        self.dependencies.iter().chain(self.blockers.iter())
    }

    /// Check if the item is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the item as claimed by `worker`.
    pub fn claim(&mut self, worker: &WorkerId) -> Result<(), CoreError> {
        if self.status != ItemStatus::Ready {
            return Err(self.invalid_transition(ItemStatus::InProgress));
        }
        self.status = ItemStatus::InProgress;
        self.assigned_worker = Some(worker.clone());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply the outcome of an attempt and return the resulting status.
    ///
    /// A failure increments `retry_count`; the item goes back to `Ready`
    /// while the count is below `max_retries` and to `Failed` otherwise.
    pub fn record_outcome(&mut self, outcome: &AttemptOutcome) -> Result<ItemStatus, CoreError> {
        if self.status != ItemStatus::InProgress {
            let target = match outcome {
                AttemptOutcome::Succeeded => ItemStatus::Completed,
                AttemptOutcome::Failed { .. } => ItemStatus::Failed,
            };
            return Err(self.invalid_transition(target));
        }

        let now = Utc::now();
        match outcome {
            AttemptOutcome::Succeeded => {
                self.status = ItemStatus::Completed;
                self.completed_at = Some(now);
                self.last_error = None;
            }
            AttemptOutcome::Failed { error } => {
                self.retry_count += 1;
                self.last_error = Some(error.clone());
                self.status = if self.retry_count < self.max_retries {
                    ItemStatus::Ready
                } else {
                    ItemStatus::Failed
                };
            }
        }
        self.assigned_worker = None;
        self.updated_at = now;
        Ok(self.status)
    }

    fn invalid_transition(&self, to: ItemStatus) -> CoreError {
        CoreError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
