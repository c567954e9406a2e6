//! Status and priority enums for WorkItems.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Lifecycle status of a WorkItem.
///
/// ```text
/// ready -> in_progress -> completed
///                      -> ready (retry, while retryCount < maxRetries)
///                      -> failed (retry ceiling reached)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be claimed.
    #[default]
    Ready,
    /// Claimed by a worker and executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Failed permanently after exhausting retries.
    Failed,
}

impl ItemStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Ready,
        ItemStatus::InProgress,
        ItemStatus::Completed,
        ItemStatus::Failed,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(Self::Ready),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::InvalidInput(format!("unknown status '{}'", other))),
        }
    }
}

/// Scheduling priority. Variant order is drain order, so `Ord` sorts
/// `Critical` first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// All priorities in drain order.
    pub const DRAIN_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(CoreError::InvalidInput(format!("unknown priority '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_matches_drain_order() {
        let mut shuffled = vec![
            Priority::Low,
            Priority::Critical,
            Priority::Medium,
            Priority::High,
        ];
        shuffled.sort();
        assert_eq!(shuffled, Priority::DRAIN_ORDER.to_vec());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&ItemStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: ItemStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, ItemStatus::Failed);
    }

    #[test]
    fn test_parse_from_cli_strings() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("in-progress".parse::<ItemStatus>().unwrap(), ItemStatus::InProgress);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ItemStatus::Completed.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::Ready.is_terminal());
        assert!(!ItemStatus::InProgress.is_terminal());
    }
}
