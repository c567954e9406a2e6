//! Bridges work items and harness executions.

use async_trait::async_trait;
use taskhive_core::{AttemptOutcome, WorkItem, WorkItemId};
use taskhive_harness::{
    ChatMessage, ExecutionObserver, ExecutionRequest, ExecutionResult, ProgressEvent,
};
use tracing::{info, trace};

use crate::config::Config;
use crate::json_output;

/// The task as the harness sees it.
///
/// Every prerequisite of a claimed item is already completed, so they are
/// listed as context the agent can build on.
pub fn render_task(item: &WorkItem) -> String {
    let mut text = format!("# Task: {}\n\nTask ID: {}", item.title, item.id);

    let description = item.description.trim();
    if !description.is_empty() {
        text.push_str("\n\n");
        text.push_str(description);
    }

    let mut prerequisites: Vec<&WorkItemId> = Vec::new();
    for id in item.prerequisites() {
        if !prerequisites.contains(&id) {
            prerequisites.push(id);
        }
    }
    if !prerequisites.is_empty() {
        let ids: Vec<&str> = prerequisites.iter().map(|id| id.as_str()).collect();
        text.push_str(&format!("\n\nCompleted prerequisites: {}", ids.join(", ")));
    }

    if item.retry_count > 0 {
        if let Some(error) = &item.last_error {
            text.push_str(&format!(
                "\n\nPrevious attempt {} of {} failed: {}",
                item.retry_count, item.max_retries, error
            ));
        }
    }

    text
}

/// Build the execution request for a claimed item.
pub fn build_request(item: &WorkItem, config: &Config) -> ExecutionRequest {
    ExecutionRequest::new(config.system_prompt.clone(), config.working_dir.clone())
        .with_message(ChatMessage::user(render_task(item)))
        .with_timeout_ms(config.execution_timeout.as_millis() as u64)
}

/// Map a harness result to the outcome reported to the store.
pub fn attempt_outcome(result: &ExecutionResult) -> AttemptOutcome {
    if result.success {
        AttemptOutcome::Succeeded
    } else {
        AttemptOutcome::failed(
            result
                .error
                .clone()
                .unwrap_or_else(|| "Harness reported failure".to_string()),
        )
    }
}

/// Forwards harness output for one item to the log and JSON event stream.
pub struct ItemObserver {
    item_id: WorkItemId,
}

impl ItemObserver {
    pub fn new(item_id: WorkItemId) -> Self {
        Self { item_id }
    }
}

#[async_trait]
impl ExecutionObserver for ItemObserver {
    async fn on_output(&self, line: &str) {
        trace!(item_id = %self.item_id, line, "Harness output");
        json_output::emit_output_line(self.item_id.as_str(), line);
    }

    async fn on_progress(&self, event: ProgressEvent) {
        info!(
            item_id = %self.item_id,
            phase = %event.phase,
            percent = event.percent,
            "Execution progress"
        );
        json_output::emit_progress(
            self.item_id.as_str(),
            &event.phase.to_string(),
            event.percent,
            &event.message,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_task_lists_prerequisites_once() {
        let item = WorkItem::new("Wire up the cache", "Use the new store in the API layer.")
            .with_id("cache-api")
            .with_dependency("cache-store")
            .with_blocker("cache-store")
            .with_blocker("schema");

        let text = render_task(&item);
        assert!(text.starts_with("# Task: Wire up the cache\n\nTask ID: cache-api"));
        assert!(text.contains("Use the new store in the API layer."));
        assert!(text.ends_with("Completed prerequisites: cache-store, schema"));
    }

    #[test]
    fn test_render_task_mentions_previous_failure() {
        let mut item = WorkItem::new("Flaky", "").with_id("f");
        item.retry_count = 1;
        item.last_error = Some("Harness timed out after 1000ms and was terminated".to_string());

        let text = render_task(&item);
        assert!(text.contains("Previous attempt 1 of 3 failed: Harness timed out"));
    }

    #[test]
    fn test_build_request() {
        let config = Config::new("/tmp/q.jsonl")
            .with_working_dir("/work")
            .with_system_prompt("Be brief.")
            .with_execution_timeout(Duration::from_secs(90));
        let item = WorkItem::new("Add README", "").with_id("readme");

        let request = build_request(&item, &config);
        assert_eq!(request.system_prompt, "Be brief.");
        assert_eq!(request.working_dir, std::path::PathBuf::from("/work"));
        assert_eq!(request.timeout_ms, Some(90_000));
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0].content.contains("Add README"));
    }

    #[test]
    fn test_attempt_outcome() {
        let ok = ExecutionResult {
            success: true,
            ..ExecutionResult::default()
        };
        assert_eq!(attempt_outcome(&ok), AttemptOutcome::Succeeded);

        let failed = ExecutionResult::failure("Harness exited with code 1: boom", 10);
        assert_eq!(
            attempt_outcome(&failed),
            AttemptOutcome::failed("Harness exited with code 1: boom")
        );

        let silent = ExecutionResult::default();
        assert_eq!(
            attempt_outcome(&silent),
            AttemptOutcome::failed("Harness reported failure")
        );
    }
}
