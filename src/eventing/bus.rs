//! Event Bus
//!
//! In-process publish/subscribe dispatcher keyed by [`EventKind`].
//!
//! ## Dispatch
//!
//! ```text
//! publish(event)
//!   │  snapshot subscribers of event.kind() under the read lock
//!   ├─► sync handlers, registration order, one at a time on the WorkerPool
//!   │        H1 ──► H2 ──► H3           (each awaited before the next)
//!   └─► async handlers, all at once      (join_all, no relative order)
//!            A1 ┐
//!            A2 ┼──► barrier ──► publish returns
//!            A3 ┘
//! ```
//!
//! ## Rules
//! - **Barrier**: `publish` returns only after every dispatched handler finished.
//! - **Isolation**: an error or panic in one handler is logged; the others still run
//!   and the publisher never sees it.
//! - **No retry**: a failed handler misses that event only.
//! - **Snapshot**: subscribe/unsubscribe during an in-flight publish is safe; the
//!   change applies from the next publish.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use ahash::AHashMap;
use futures::FutureExt;
use parking_lot::RwLock;

use crate::eventing::app_event::{Event, EventKind};
use crate::eventing::handler::{handler_addr, AsyncHandler, SyncHandler};
use crate::services::WorkerPool;

#[derive(Default)]
struct Subscribers {
    sync: Vec<SyncHandler>,
    asynchronous: Vec<AsyncHandler>,
}

impl Subscribers {
    fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.asynchronous.is_empty()
    }
}

/// Counts from a single [`EventBus::publish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that completed successfully
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

impl Delivery {
    /// Total handlers dispatched
    pub fn dispatched(&self) -> usize {
        self.delivered + self.failed
    }
}

struct BusInner {
    registry: RwLock<AHashMap<EventKind, Subscribers>>,
    workers: WorkerPool,
}

/// Central event dispatcher
///
/// Cheap to clone; every clone shares one registry. Construct one instance
/// at process start and pass it to every service that needs it.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose sync handlers run on `workers`
    pub fn new(workers: WorkerPool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(AHashMap::new()),
                workers,
            }),
        }
    }

    /// The pool sync handlers run on, shared with services for blocking work
    pub fn workers(&self) -> &WorkerPool {
        &self.inner.workers
    }

    /// Register a synchronous handler
    ///
    /// Registering the same handler twice delivers each event to it twice.
    pub fn subscribe(&self, kind: EventKind, handler: SyncHandler) {
        tracing::debug!(event = %kind, "Subscribing sync handler");
        self.inner
            .registry
            .write()
            .entry(kind)
            .or_default()
            .sync
            .push(handler);
    }

    /// Register an asynchronous handler
    pub fn subscribe_async(&self, kind: EventKind, handler: AsyncHandler) {
        tracing::debug!(event = %kind, "Subscribing async handler");
        self.inner
            .registry
            .write()
            .entry(kind)
            .or_default()
            .asynchronous
            .push(handler);
    }

    /// Remove a handler from whichever list holds it
    ///
    /// Only the first registration in each list is removed. Returns `false`
    /// when the handler was not registered for `kind`.
    pub fn unsubscribe<H: ?Sized>(&self, kind: EventKind, handler: &Arc<H>) -> bool {
        let target = handler_addr(handler);
        let mut registry = self.inner.registry.write();
        let Some(subs) = registry.get_mut(&kind) else {
            return false;
        };

        let mut removed = false;
        if let Some(pos) = subs.sync.iter().position(|h| handler_addr(h) == target) {
            subs.sync.remove(pos);
            removed = true;
        }
        if let Some(pos) = subs
            .asynchronous
            .iter()
            .position(|h| handler_addr(h) == target)
        {
            subs.asynchronous.remove(pos);
            removed = true;
        }
        if subs.is_empty() {
            registry.remove(&kind);
        }

        if removed {
            tracing::debug!(event = %kind, "Handler unsubscribed");
        }
        removed
    }

    /// Number of handlers (sync + async) registered for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .registry
            .read()
            .get(&kind)
            .map_or(0, |s| s.sync.len() + s.asynchronous.len())
    }

    /// Publish an event and wait until every handler has finished
    pub async fn publish(&self, event: impl Into<Event>) -> Delivery {
        self.publish_shared(Arc::new(event.into())).await
    }

    /// Publish an already shared event instance
    pub async fn publish_shared(&self, event: Arc<Event>) -> Delivery {
        let kind = event.kind();
        let (sync, asynchronous) = {
            let registry = self.inner.registry.read();
            match registry.get(&kind) {
                Some(subs) => (subs.sync.clone(), subs.asynchronous.clone()),
                None => {
                    tracing::trace!(event = %kind, "No subscribers");
                    return Delivery::default();
                }
            }
        };

        tracing::debug!(
            event = %kind,
            sync = sync.len(),
            asynchronous = asynchronous.len(),
            "Publishing event"
        );

        let mut delivery = Delivery::default();

        for (index, handler) in sync.into_iter().enumerate() {
            let shared = event.clone();
            match self.inner.workers.run(move || handler(&shared)).await {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    tracing::error!(event = %kind, handler = index, error = %e, "Sync subscriber failed");
                }
                Err(e) => {
                    delivery.failed += 1;
                    tracing::error!(event = %kind, handler = index, error = %e, "Sync subscriber aborted");
                }
            }
        }

        let pending = asynchronous.iter().map(|handler| {
            let shared = event.clone();
            AssertUnwindSafe(async move { handler(shared).await }).catch_unwind()
        });

        for (index, outcome) in futures::future::join_all(pending).await.into_iter().enumerate() {
            match outcome {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    tracing::error!(event = %kind, handler = index, error = %e, "Async subscriber failed");
                }
                Err(_) => {
                    delivery.failed += 1;
                    tracing::error!(event = %kind, handler = index, "Async subscriber panicked");
                }
            }
        }

        tracing::trace!(
            event = %kind,
            dispatched = delivery.dispatched(),
            failed = delivery.failed,
            "Event dispatched"
        );
        delivery
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(WorkerPool::default())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.registry.read();
        let mut kinds: Vec<_> = registry.keys().copied().collect();
        kinds.sort();
        f.debug_struct("EventBus")
            .field("kinds", &kinds)
            .field("workers", &self.inner.workers.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::app_event::{SpeakRequest, UiLog};
    use crate::eventing::handler::{async_handler, sync_handler};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn explode() -> crate::eventing::HandlerResult {
        panic!("async panic")
    }

    fn bus() -> EventBus {
        EventBus::new(WorkerPool::new(2))
    }

    fn counter_handler(count: &Arc<AtomicUsize>) -> SyncHandler {
        let count = count.clone();
        sync_handler(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::UiLog, counter_handler(&count));
        bus.subscribe(EventKind::UiLog, sync_handler(|_| Err(anyhow::anyhow!("sync boom"))));
        bus.subscribe(EventKind::UiLog, sync_handler(|_| panic!("sync panic")));
        bus.subscribe(EventKind::UiLog, counter_handler(&count));
        bus.subscribe_async(
            EventKind::UiLog,
            async_handler(|_| async { Err(anyhow::anyhow!("async boom")) }),
        );
        bus.subscribe_async(
            EventKind::UiLog,
            async_handler(|_| async { explode() }),
        );
        let async_count = count.clone();
        bus.subscribe_async(
            EventKind::UiLog,
            async_handler(move |_| {
                let count = async_count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let delivery = bus.publish(UiLog::info("hello")).await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(delivery.delivered, 3);
        assert_eq!(delivery.failed, 4);
        assert_eq!(delivery.dispatched(), 7);
    }

    #[tokio::test]
    async fn test_publish_waits_for_all_handlers() {
        let bus = bus();
        bus.subscribe(
            EventKind::SpeakRequest,
            sync_handler(|_| {
                std::thread::sleep(Duration::from_millis(80));
                Ok(())
            }),
        );
        bus.subscribe_async(
            EventKind::SpeakRequest,
            async_handler(|_| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok(())
            }),
        );
        bus.subscribe_async(
            EventKind::SpeakRequest,
            async_handler(|_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }),
        );

        let started = Instant::now();
        let delivery = bus.publish(SpeakRequest::new("hi")).await;

        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(delivery.delivered, 3);
    }

    #[tokio::test]
    async fn test_sync_handlers_dispatch_in_registration_order() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["H1", "H2", "H3"] {
            let log = log.clone();
            bus.subscribe(
                EventKind::UiLog,
                sync_handler(move |_| {
                    log.lock().push(name);
                    Ok(())
                }),
            );
        }

        bus.publish(UiLog::info("order")).await;
        assert_eq!(*log.lock(), vec!["H1", "H2", "H3"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_handler_is_noop() {
        let bus = bus();
        let never = sync_handler(|_| Ok(()));
        assert!(!bus.unsubscribe(EventKind::UiLog, &never));

        let registered = sync_handler(|_| Ok(()));
        bus.subscribe(EventKind::SpeakRequest, registered.clone());
        assert!(!bus.unsubscribe(EventKind::UiLog, &registered));
        assert_eq!(bus.subscriber_count(EventKind::SpeakRequest), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_handler() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counter_handler(&count);
        let other = async_handler(|_| async { Ok(()) });

        bus.subscribe(EventKind::UiLog, handler.clone());
        bus.subscribe_async(EventKind::UiLog, other.clone());
        assert!(bus.unsubscribe(EventKind::UiLog, &handler));
        assert!(bus.unsubscribe(EventKind::UiLog, &other));
        assert_eq!(bus.subscriber_count(EventKind::UiLog), 0);

        bus.publish(UiLog::info("nobody")).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_duplicates_delivery() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counter_handler(&count);

        bus.subscribe(EventKind::UiLog, handler.clone());
        bus.subscribe(EventKind::UiLog, handler.clone());
        bus.publish(UiLog::info("twice")).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(bus.unsubscribe(EventKind::UiLog, &handler));
        bus.publish(UiLog::info("once")).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_completes() {
        let bus = bus();
        let started = Instant::now();
        let delivery = bus.publish(SpeakRequest::new("anyone?")).await;

        assert_eq!(delivery, Delivery::default());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_handlers_observe_same_instance() {
        let bus = bus();
        let sync_seen = Arc::new(Mutex::new(None::<usize>));
        let async_seen = Arc::new(Mutex::new(None::<usize>));

        let seen = sync_seen.clone();
        bus.subscribe(
            EventKind::UiLog,
            sync_handler(move |event| {
                *seen.lock() = Some(event as *const Event as usize);
                Ok(())
            }),
        );
        let seen = async_seen.clone();
        bus.subscribe_async(
            EventKind::UiLog,
            async_handler(move |event| {
                let seen = seen.clone();
                async move {
                    *seen.lock() = Some(Arc::as_ptr(&event) as usize);
                    Ok(())
                }
            }),
        );

        let event = Arc::new(Event::from(UiLog::info("hello")));
        let expected = Arc::as_ptr(&event) as usize;
        let delivery = bus.publish_shared(event.clone()).await;

        assert_eq!(delivery.delivered, 2);
        assert_eq!(*sync_seen.lock(), Some(expected));
        assert_eq!(*async_seen.lock(), Some(expected));
        assert_eq!(*event, Event::from(UiLog::info("hello")));
    }

    #[tokio::test]
    async fn test_subscribe_during_publish_does_not_fail() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let inner_bus = bus.clone();
        let inner_count = count.clone();

        bus.subscribe_async(
            EventKind::UiLog,
            async_handler(move |_| {
                let bus = inner_bus.clone();
                let count = inner_count.clone();
                async move {
                    bus.subscribe(EventKind::UiLog, counter_handler(&count));
                    Ok(())
                }
            }),
        );

        bus.publish(UiLog::info("first")).await;
        assert_eq!(bus.subscriber_count(EventKind::UiLog), 2);

        bus.publish(UiLog::info("second")).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_handler_receives_next_event() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        bus.subscribe(
            EventKind::UiLog,
            sync_handler(move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first call fails");
                }
                Ok(())
            }),
        );

        assert_eq!(bus.publish(UiLog::info("a")).await.failed, 1);
        assert_eq!(bus.publish(UiLog::info("b")).await.delivered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
