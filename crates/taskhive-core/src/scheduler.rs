//! Claim policy - picks the next item a worker may take.
//!
//! The policy is pure: it looks at one snapshot of the record set and never
//! mutates it. Callers run it inside an exclusive-access cycle so the snapshot
//! cannot change between selection and claim.

use std::collections::HashSet;

use crate::{ItemStatus, Priority, WorkItem, WorkItemId};

/// Ids of every completed item in `items`.
pub fn completed_ids(items: &[WorkItem]) -> HashSet<&WorkItemId> {
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Completed)
        .map(|item| &item.id)
        .collect()
}

/// An item is claimable when it is ready and every dependency and blocker
/// resolves to a completed item. Unknown ids never resolve.
pub fn is_claimable(item: &WorkItem, completed: &HashSet<&WorkItemId>) -> bool {
    item.status == ItemStatus::Ready && item.prerequisites().all(|id| completed.contains(id))
}

/// Index of the next item to claim, or `None` when nothing qualifies.
///
/// Tiers are drained `critical` first; within a tier the stored order wins.
pub fn select_next(items: &[WorkItem]) -> Option<usize> {
    let completed = completed_ids(items);

    Priority::DRAIN_ORDER.iter().find_map(|priority| {
        items
            .iter()
            .position(|item| item.priority == *priority && is_claimable(item, &completed))
    })
}

/// Prerequisites of `item` that are not yet completed, in declaration order.
pub fn unmet_prerequisites<'a>(item: &'a WorkItem, items: &[WorkItem]) -> Vec<&'a WorkItemId> {
    let completed = completed_ids(items);
    let mut seen = HashSet::new();
    item.prerequisites()
        .filter(|id| !completed.contains(id) && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, priority: Priority) -> WorkItem {
        WorkItem::new(id, "").with_id(id).with_priority(priority)
    }

    #[test]
    fn test_empty_set_selects_nothing() {
        assert_eq!(select_next(&[]), None);
    }

    #[test]
    fn test_higher_priority_wins() {
        let items = vec![item("a", Priority::Low), item("b", Priority::High)];
        assert_eq!(select_next(&items), Some(1));
    }

    #[test]
    fn test_stored_order_within_tier() {
        let items = vec![
            item("a", Priority::Medium),
            item("b", Priority::Critical),
            item("c", Priority::Critical),
        ];
        assert_eq!(select_next(&items), Some(1));
    }

    #[test]
    fn test_skips_non_ready() {
        let mut busy = item("a", Priority::Critical);
        busy.status = ItemStatus::InProgress;
        let mut dead = item("b", Priority::Critical);
        dead.status = ItemStatus::Failed;
        let items = vec![busy, dead, item("c", Priority::Low)];
        assert_eq!(select_next(&items), Some(2));
    }

    #[test]
    fn test_dependency_gates_claim() {
        let y = item("y", Priority::Low);
        let x = item("x", Priority::Critical).with_dependency("y");
        let mut items = vec![x, y];

        // x is blocked, so the lower-priority y goes first.
        assert_eq!(select_next(&items), Some(1));

        items[1].status = ItemStatus::InProgress;
        assert_eq!(select_next(&items), None);

        items[1].status = ItemStatus::Completed;
        assert_eq!(select_next(&items), Some(0));
    }

    #[test]
    fn test_blocker_gates_like_dependency() {
        let mut blocker = item("b", Priority::Low);
        blocker.status = ItemStatus::Failed;
        let gated = item("g", Priority::High).with_blocker("b");
        let items = vec![gated, blocker];
        assert_eq!(select_next(&items), None);
    }

    #[test]
    fn test_unknown_prerequisite_never_resolves() {
        let items = vec![item("x", Priority::High).with_dependency("ghost")];
        assert_eq!(select_next(&items), None);
        let unmet = unmet_prerequisites(&items[0], &items);
        assert_eq!(unmet, vec![&WorkItemId::new("ghost")]);
    }

    #[test]
    fn test_unmet_prerequisites_lists_each_once() {
        let mut done = item("done", Priority::Low);
        done.status = ItemStatus::Completed;
        let x = item("x", Priority::High)
            .with_dependency("done")
            .with_dependency("open")
            .with_blocker("open");
        let items = vec![x.clone(), done, item("open", Priority::Low)];
        let unmet = unmet_prerequisites(&x, &items);
        assert_eq!(unmet, vec![&WorkItemId::new("open")]);
    }
}
