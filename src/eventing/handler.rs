//! Subscriber handler types
//!
//! Synchronous handlers run on the bounded worker pool; asynchronous handlers
//! are futures driven on the cooperative scheduler. Identity of a handler is
//! its `Arc` allocation, which is what [`EventBus::unsubscribe`] compares.
//!
//! [`EventBus::unsubscribe`]: crate::eventing::EventBus::unsubscribe

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::eventing::app_event::Event;

/// Outcome of a single handler invocation
pub type HandlerResult = anyhow::Result<()>;

/// Synchronous subscriber callback
pub type SyncHandler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Asynchronous subscriber callback
pub type AsyncHandler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap a closure as a [`SyncHandler`]
pub fn sync_handler<F>(f: F) -> SyncHandler
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as an [`AsyncHandler`]
///
/// ```ignore
/// let echo = async_handler(move |event| {
///     let bus = bus.clone();
///     async move { bus.publish(event.as_ref().clone()).await; Ok(()) }
/// });
/// ```
pub fn async_handler<F, Fut>(f: F) -> AsyncHandler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Thin data pointer of a handler, stable across trait-object casts
pub(crate) fn handler_addr<H: ?Sized>(handler: &Arc<H>) -> *const () {
    Arc::as_ptr(handler) as *const ()
}
