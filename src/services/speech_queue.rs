//! Speech Queue
//!
//! Serializes speech playback. Requests are buffered in a bounded queue and
//! played one at a time by a single worker task:
//!
//! ```text
//! SpeakRequest ──► handler ──► BoundedDeque (oldest evicted when full)
//!                                   │ notify
//!                                   ▼
//!                              playback worker
//!                     TTSSpeakingState(true) ──► Speaker::speak ──► TTSSpeakingState(false)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::constants::LOG_PREVIEW_CHARS;
use crate::domain::config::SpeechConfig;
use crate::eventing::{
    async_handler, AsyncHandler, Event, EventBus, EventKind, TtsSpeakingState, UiLog,
};
use crate::helpers::{preview, BoundedDeque};
use crate::services::runtime::BackgroundTasks;
use crate::services::service::{Service, Startable, Stoppable};

/// Speech synthesis and playback backend
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`, returning once playback has finished
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// Speaker that only writes the text to the log
#[derive(Debug, Default)]
pub struct LogSpeaker;

#[async_trait]
impl Speaker for LogSpeaker {
    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(target: "speech", "{text}");
        Ok(())
    }
}

struct Shared {
    pending: Mutex<BoundedDeque<String>>,
    muted: AtomicBool,
    wake: Notify,
    /// Stops the worker; a child of the background task token
    halt: CancellationToken,
    /// Cancelled when the worker exits, including by panic
    finished: CancellationToken,
}

impl Shared {
    fn halt(&self) {
        self.halt.cancel();
        let dropped = {
            let mut pending = self.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            tracing::info!(dropped, "Cleared pending speech");
        }
    }
}

/// Single-flight speech playback service
pub struct SpeechQueue {
    bus: EventBus,
    tasks: BackgroundTasks,
    speaker: Arc<dyn Speaker>,
    shared: Arc<Shared>,
    started: AtomicBool,
    handlers: Mutex<Vec<(EventKind, AsyncHandler)>>,
}

impl SpeechQueue {
    pub fn new(
        bus: EventBus,
        tasks: BackgroundTasks,
        speaker: Arc<dyn Speaker>,
        config: &SpeechConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(BoundedDeque::new(config.queue_capacity)),
            muted: AtomicBool::new(config.muted),
            wake: Notify::new(),
            halt: tasks.token().child_token(),
            finished: CancellationToken::new(),
        });

        Self {
            bus,
            tasks,
            speaker,
            shared,
            started: AtomicBool::new(false),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::SeqCst);
        tracing::info!(muted, "Speech mute changed");
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Requests waiting for playback
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn speak_request_handler(&self) -> AsyncHandler {
        let bus = self.bus.clone();
        let shared = self.shared.clone();
        async_handler(move |event| {
            let bus = bus.clone();
            let shared = shared.clone();
            async move {
                let Event::SpeakRequest(request) = event.as_ref() else {
                    return Ok(());
                };

                let text = request.text.trim();
                if text.is_empty() {
                    tracing::debug!("Ignoring empty speak request");
                    return Ok(());
                }
                if shared.halt.is_cancelled() {
                    tracing::debug!("Speech queue stopped, ignoring request");
                    return Ok(());
                }
                if shared.muted.load(Ordering::SeqCst) {
                    tracing::info!(text = %preview(text, LOG_PREVIEW_CHARS), "Muted, dropping speech");
                    return Ok(());
                }

                let (evicted, queued) = {
                    let mut pending = shared.pending.lock();
                    let evicted = pending.push(text.to_string());
                    (evicted, pending.len())
                };
                shared.wake.notify_one();
                tracing::info!(text = %preview(text, LOG_PREVIEW_CHARS), queued, "Queued speech");

                if let Some(dropped) = evicted {
                    let dropped = preview(&dropped, LOG_PREVIEW_CHARS);
                    tracing::warn!(text = %dropped, "Speech queue full, dropped oldest request");
                    bus.publish(UiLog::warn(format!("Speech queue full, dropped '{dropped}'")))
                        .await;
                }
                Ok(())
            }
        })
    }

    fn shutdown_handler(&self) -> AsyncHandler {
        let shared = self.shared.clone();
        async_handler(move |_| {
            let shared = shared.clone();
            async move {
                shared.halt();
                Ok(())
            }
        })
    }
}

async fn playback_worker(bus: EventBus, shared: Arc<Shared>, speaker: Arc<dyn Speaker>) {
    let _finished = shared.finished.clone().drop_guard();
    tracing::info!("Speech playback worker started");

    loop {
        let next = shared.pending.lock().pop_front();
        let Some(text) = next else {
            tokio::select! {
                _ = shared.halt.cancelled() => break,
                _ = shared.wake.notified() => {}
            }
            continue;
        };
        if shared.halt.is_cancelled() {
            break;
        }

        bus.publish(TtsSpeakingState { is_speaking: true }).await;

        let outcome = tokio::select! {
            result = speaker.speak(&text) => Some(result),
            _ = shared.halt.cancelled() => None,
        };
        match outcome {
            Some(Ok(())) => tracing::debug!(text = %preview(&text, LOG_PREVIEW_CHARS), "Speech finished"),
            Some(Err(e)) => {
                tracing::error!(error = %e, "Speech playback failed");
                bus.publish(UiLog::error(format!("Speech playback failed: {e}")))
                    .await;
            }
            None => tracing::info!("Speech interrupted by shutdown"),
        }

        bus.publish(TtsSpeakingState { is_speaking: false }).await;
    }

    tracing::info!("Speech playback worker finished");
}

impl Service for SpeechQueue {
    fn name(&self) -> &str {
        "SpeechQueue"
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for SpeechQueue {
    async fn start(&self) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let bus = self.bus.clone();
        let shared = self.shared.clone();
        let speaker = self.speaker.clone();
        if !self
            .tasks
            .spawn("speech-playback", move |_| playback_worker(bus, shared, speaker))
        {
            self.started.store(false, Ordering::SeqCst);
            anyhow::bail!("background tasks already cancelled");
        }

        let subscriptions = [
            (EventKind::SpeakRequest, self.speak_request_handler()),
            (EventKind::AppShutdown, self.shutdown_handler()),
        ];
        let mut handlers = self.handlers.lock();
        for (kind, handler) in subscriptions {
            self.bus.subscribe_async(kind, handler.clone());
            handlers.push((kind, handler));
        }
        Ok(())
    }
}

#[async_trait]
impl Stoppable for SpeechQueue {
    async fn stop(&self) -> anyhow::Result<()> {
        let handlers: Vec<_> = self.handlers.lock().drain(..).collect();
        for (kind, handler) in &handlers {
            self.bus.unsubscribe(*kind, handler);
        }

        self.shared.halt();
        if self.started.load(Ordering::SeqCst) {
            self.shared.finished.cancelled().await;
        }
        Ok(())
    }
}
