//! JSON output for streaming worker events to stdout.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag to enable JSON output mode.
static JSON_MODE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable JSON output mode.
pub fn enable_json_mode() {
    JSON_MODE_ENABLED.store(true, Ordering::SeqCst);
}

/// Check if JSON mode is enabled.
pub fn is_json_mode() -> bool {
    JSON_MODE_ENABLED.load(Ordering::SeqCst)
}

/// JSON event types that can be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    WorkerStarted,
    WorkerStopped,
    ItemClaimed,
    OutputLine,
    Progress,
    ItemCompleted,
    ItemRetrying,
    ItemFailed,
    ReportAbandoned,
    Error,
}

/// A JSON event to be output to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Create a new JSON event with the current timestamp.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// Output this event as a JSON line to stdout.
    pub fn emit(&self) {
        if !is_json_mode() {
            return;
        }
        if let Ok(json) = serde_json::to_string(self) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }
}

pub fn emit_worker_started(worker_id: &str, store: &str, harness: &str) {
    JsonEvent::new(
        JsonEventType::WorkerStarted,
        serde_json::json!({
            "worker_id": worker_id,
            "store": store,
            "harness": harness,
        }),
    )
    .emit();
}

pub fn emit_worker_stopped(worker_id: &str, summary: &impl Serialize) {
    JsonEvent::new(
        JsonEventType::WorkerStopped,
        serde_json::json!({
            "worker_id": worker_id,
            "summary": summary,
        }),
    )
    .emit();
}

pub fn emit_item_claimed(item_id: &str, title: &str, priority: &str, retry_count: u32) {
    JsonEvent::new(
        JsonEventType::ItemClaimed,
        serde_json::json!({
            "item_id": item_id,
            "title": title,
            "priority": priority,
            "retry_count": retry_count,
        }),
    )
    .emit();
}

pub fn emit_output_line(item_id: &str, line: &str) {
    JsonEvent::new(
        JsonEventType::OutputLine,
        serde_json::json!({
            "item_id": item_id,
            "line": line,
        }),
    )
    .emit();
}

pub fn emit_progress(item_id: &str, phase: &str, percent: u8, message: &str) {
    JsonEvent::new(
        JsonEventType::Progress,
        serde_json::json!({
            "item_id": item_id,
            "phase": phase,
            "percent": percent,
            "message": message,
        }),
    )
    .emit();
}

/// Emit an item_completed event.
pub fn emit_item_completed(
    item_id: &str,
    duration_ms: u64,
    files_changed: usize,
    token_usage: Option<&impl Serialize>,
) {
    JsonEvent::new(
        JsonEventType::ItemCompleted,
        serde_json::json!({
            "item_id": item_id,
            "duration_ms": duration_ms,
            "files_changed": files_changed,
            "token_usage": token_usage,
        }),
    )
    .emit();
}

/// Emit an item_retrying event; the item is back in the queue.
pub fn emit_item_retrying(item_id: &str, retry_count: u32, max_retries: u32, error: &str) {
    JsonEvent::new(
        JsonEventType::ItemRetrying,
        serde_json::json!({
            "item_id": item_id,
            "retry_count": retry_count,
            "max_retries": max_retries,
            "error": error,
        }),
    )
    .emit();
}

/// Emit an item_failed event; retries are exhausted.
pub fn emit_item_failed(item_id: &str, retry_count: u32, error: &str) {
    JsonEvent::new(
        JsonEventType::ItemFailed,
        serde_json::json!({
            "item_id": item_id,
            "retry_count": retry_count,
            "error": error,
        }),
    )
    .emit();
}

pub fn emit_report_abandoned(item_id: &str, attempts: u32) {
    JsonEvent::new(
        JsonEventType::ReportAbandoned,
        serde_json::json!({
            "item_id": item_id,
            "attempts": attempts,
        }),
    )
    .emit();
}

/// Emit an error event.
pub fn emit_error(message: &str) {
    JsonEvent::new(
        JsonEventType::Error,
        serde_json::json!({
            "message": message,
        }),
    )
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shape() {
        let event = JsonEvent::new(
            JsonEventType::ItemRetrying,
            serde_json::json!({ "item_id": "a", "retry_count": 1 }),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "item_retrying");
        assert_eq!(value["data"]["item_id"], "a");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }
}
