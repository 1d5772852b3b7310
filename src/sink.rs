//! Progress and log sinks
//!
//! The controller publishes [`Event`]s; consumers that prefer plain callbacks
//! attach an [`EventForwarder`] (usually through
//! [`BulkController::attach_sinks`](crate::BulkController::attach_sinks)). The
//! forwarder reads a lossless subscription on its own task and calls the sinks in
//! the order events were produced, so a slow sink delays its own updates but never
//! misses a progress tick. Sinks never run on the controller's task and are free to
//! hop to another context (e.g., a UI thread) themselves.

use crate::types::{Event, LogLevel};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives progress ticks
pub trait ProgressSink: Send + Sync {
    /// Step `current` of `total` just completed
    fn report_progress(&self, current: u32, total: u32);
}

/// Receives human-readable status lines
pub trait LogSink: Send + Sync {
    /// Append one line
    fn log_event(&self, message: &str);

    /// Clear everything shown so far
    fn clear(&self);
}

/// [`LogSink`] that writes through `tracing`, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log_event(&self, message: &str) {
        tracing::info!(target: "bulk_dispatch::run_log", "{message}");
    }

    fn clear(&self) {}
}

/// Moves events from a subscription into sinks
pub struct EventForwarder;

impl EventForwarder {
    /// Spawn the forwarding task
    ///
    /// The task ends when the controller (every sender) is dropped.
    pub fn spawn(
        mut events: mpsc::UnboundedReceiver<Event>,
        progress: Arc<dyn ProgressSink>,
        log: Arc<dyn LogSink>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                Self::dispatch(&event, progress.as_ref(), log.as_ref());
            }
            tracing::debug!("Event forwarder stopped");
        })
    }

    fn dispatch(event: &Event, progress: &dyn ProgressSink, log: &dyn LogSink) {
        match event {
            Event::Progress { current, total, .. } => progress.report_progress(*current, *total),
            Event::Log { level, message, .. } => match level {
                LogLevel::Info => log.log_event(message),
                LogLevel::Warning => log.log_event(&format!("Warning: {message}")),
                LogLevel::Error => log.log_event(&format!("Error: {message}")),
            },
            Event::LogCleared => log.clear(),
            _ => {}
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::test_helpers::RecordingSink;
    use crate::types::RunId;
    use chrono::Utc;

    fn log(level: LogLevel, message: &str) -> Event {
        Event::Log {
            run_id: Some(RunId(1)),
            level,
            message: message.to_string(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn forwards_in_production_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingSink::default());
        let handle = EventForwarder::spawn(rx, sink.clone(), sink.clone());

        tx.send(Event::LogCleared).unwrap();
        tx.send(log(LogLevel::Info, "starting")).unwrap();
        for current in 1..=3 {
            tx.send(Event::Progress {
                run_id: RunId(1),
                current,
                total: 3,
            })
            .unwrap();
        }
        tx.send(log(LogLevel::Error, "boom")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(sink.progress(), vec![1, 2, 3]);
        assert_eq!(sink.lines(), vec!["starting", "Error: boom"]);
        assert_eq!(sink.clear_count(), 1);
    }

    #[tokio::test]
    async fn slow_start_still_sees_every_event() {
        let (tx, rx) = mpsc::unbounded_channel();
        for current in 1..=500 {
            tx.send(Event::Progress {
                run_id: RunId(1),
                current,
                total: 500,
            })
            .unwrap();
        }
        drop(tx);

        let sink = Arc::new(RecordingSink::default());
        EventForwarder::spawn(rx, sink.clone(), sink.clone())
            .await
            .unwrap();

        assert_eq!(sink.progress(), (1..=500).collect::<Vec<u32>>());
    }
}
