//! Observers for streamed output and progress.
//!
//! This module provides the `ExecutionObserver` trait and ready-to-use
//! implementations.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::ProgressEvent;

/// Receives output and progress while a harness runs.
///
/// Callbacks run on the supervising task, so they should return quickly.
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    /// Called with each line of harness stdout, newline stripped.
    async fn on_output(&self, line: &str);

    /// Called when the inferred phase advances.
    async fn on_progress(&self, event: ProgressEvent);
}

/// An observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl ExecutionObserver for NoopObserver {
    async fn on_output(&self, _line: &str) {}

    async fn on_progress(&self, _event: ProgressEvent) {}
}

/// Event forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    Output(String),
    Progress(ProgressEvent),
}

/// An observer that forwards every callback into a channel.
///
/// # Example
///
/// ```rust,no_run
/// use taskhive_harness::{ChannelObserver, ExecutionEvent};
///
/// let (observer, mut rx) = ChannelObserver::new();
///
/// tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         if let ExecutionEvent::Progress(p) = event {
///             println!("{}% {}", p.percent, p.phase);
///         }
///     }
/// });
/// ```
pub struct ChannelObserver {
    event_tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelObserver {
    /// Create a new observer with a receiver for streamed events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { event_tx: tx }, rx)
    }
}

#[async_trait]
impl ExecutionObserver for ChannelObserver {
    async fn on_output(&self, line: &str) {
        // Receiver might be dropped; output is advisory.
        self.event_tx.send(ExecutionEvent::Output(line.to_string())).ok();
    }

    async fn on_progress(&self, event: ProgressEvent) {
        trace!(phase = %event.phase, percent = event.percent, "Forwarding progress");
        self.event_tx.send(ExecutionEvent::Progress(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;

    #[tokio::test]
    async fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();

        observer.on_output("Reading src/main.rs").await;
        observer
            .on_progress(ProgressEvent::new(Phase::Analyzing, "reading"))
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ExecutionEvent::Output("Reading src/main.rs".to_string())
        );
        match rx.try_recv().unwrap() {
            ExecutionEvent::Progress(p) => assert_eq!(p.percent, 20),
            other => panic!("Expected progress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_channel_observer_tolerates_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_output("still fine").await;
    }
}
