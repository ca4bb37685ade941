//! UI Log Sink
//!
//! Mirrors every `UILog` event into tracing and keeps a bounded, timestamped
//! history the host UI can read back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::eventing::{sync_handler, Event, EventBus, EventKind, LogLevel, SyncHandler};
use crate::helpers::BoundedDeque;
use crate::services::service::{Service, Startable, Stoppable};

/// One recorded UI log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

/// Sync subscriber for `UILog`
pub struct UiLogSink {
    bus: EventBus,
    history: Arc<Mutex<BoundedDeque<UiLogEntry>>>,
    handler: Mutex<Option<SyncHandler>>,
}

impl UiLogSink {
    pub fn new(bus: EventBus, history_capacity: usize) -> Self {
        Self {
            bus,
            history: Arc::new(Mutex::new(BoundedDeque::new(history_capacity))),
            handler: Mutex::new(None),
        }
    }

    /// Recorded entries, oldest first
    pub fn history(&self) -> Vec<UiLogEntry> {
        self.history.lock().to_vec()
    }

    fn record(history: &Mutex<BoundedDeque<UiLogEntry>>, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "ui_log", "{message}"),
            LogLevel::Info => tracing::info!(target: "ui_log", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "ui_log", "{message}"),
            LogLevel::Error => tracing::error!(target: "ui_log", "{message}"),
        }

        history.lock().push(UiLogEntry {
            timestamp: Local::now(),
            level,
            message: message.to_string(),
        });
    }
}

impl Service for UiLogSink {
    fn name(&self) -> &str {
        "UiLogSink"
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for UiLogSink {
    async fn start(&self) -> anyhow::Result<()> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Ok(());
        }

        let history = self.history.clone();
        let handler = sync_handler(move |event| {
            if let Event::UiLog(log) = event {
                Self::record(&history, log.level, &log.message);
            }
            Ok(())
        });
        self.bus.subscribe(EventKind::UiLog, handler.clone());
        *slot = Some(handler);
        Ok(())
    }
}

#[async_trait]
impl Stoppable for UiLogSink {
    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handler) = self.handler.lock().take() {
            self.bus.unsubscribe(EventKind::UiLog, &handler);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::UiLog;
    use crate::services::WorkerPool;

    #[tokio::test]
    async fn test_history_is_bounded_and_ordered() {
        let bus = EventBus::new(WorkerPool::new(1));
        let sink = UiLogSink::new(bus.clone(), 2);
        sink.start().await.expect("start");

        bus.publish(UiLog::info("one")).await;
        bus.publish(UiLog::warn("two")).await;
        bus.publish(UiLog::error("three")).await;

        let history = sink.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "two");
        assert_eq!(history[0].level, LogLevel::Warn);
        assert_eq!(history[1].message, "three");
    }

    #[tokio::test]
    async fn test_stop_unsubscribes() {
        let bus = EventBus::new(WorkerPool::new(1));
        let sink = UiLogSink::new(bus.clone(), 10);
        sink.stop().await.expect("stop before start");

        sink.start().await.expect("start");
        sink.start().await.expect("second start");
        assert_eq!(bus.subscriber_count(EventKind::UiLog), 1);

        sink.stop().await.expect("stop");
        assert_eq!(bus.subscriber_count(EventKind::UiLog), 0);

        bus.publish(UiLog::info("ignored")).await;
        assert!(sink.history().is_empty());
    }
}
