//! Scheduler Bridges
//!
//! Everything async in Penny Hub runs on one cooperative tokio scheduler.
//! This module provides the two ways work leaves that scheduler:
//!
//! ```text
//! sync subscriber / blocking call          long-running service work
//!       │                                          │
//!       ▼                                          ▼
//! WorkerPool::run(f)                      BackgroundTasks::spawn(name, f)
//!       │  (semaphore, N permits)                  │  (tracked, cancellable)
//!       ▼                                          ▼
//! tokio blocking pool                      tokio task / blocking thread
//!       │                                          │
//!       ▼                                          ▼
//! result awaited by caller               cancelled at shutdown step 3
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bounded pool for synchronous callbacks
///
/// At most `size` callbacks run at once; further callers wait for a permit
/// without blocking the scheduler.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` workers (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a blocking closure off the scheduler and wait for its result
    ///
    /// A panic inside `f` is returned as an error instead of unwinding into
    /// the caller.
    pub async fn run<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        match handle.await {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => Err(anyhow::anyhow!("worker callback panicked")),
            Err(e) => Err(anyhow::anyhow!("worker callback cancelled: {e}")),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::constants::SYNC_WORKERS)
    }
}

struct TrackedTask {
    name: Arc<str>,
    handle: JoinHandle<()>,
}

struct TasksInner {
    token: CancellationToken,
    closed: AtomicBool,
    tasks: Mutex<Vec<TrackedTask>>,
}

/// Registry of background work not owned by a service hook
///
/// Cheap to clone; all clones share one set of tasks and one cancellation
/// token. Once [`cancel_all`](Self::cancel_all) has run, new spawns are
/// refused.
#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<TasksInner>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TasksInner {
                token: CancellationToken::new(),
                closed: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Token cancelled when shutdown reaches the stray-task step
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Spawn a tracked task on the scheduler
    ///
    /// The closure receives the shared cancellation token; tasks are also
    /// aborted at their next await point once cancellation starts.
    pub fn spawn<F, Fut>(&self, name: impl Into<Arc<str>>, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.is_closed() {
            tracing::warn!(task = %name, "Refusing to spawn task after shutdown began");
            return false;
        }

        tracing::debug!(task = %name, "Spawning background task");
        let handle = tokio::spawn(f(self.token()));
        self.track(name, handle);
        true
    }

    /// Spawn a tracked blocking closure on the blocking pool
    ///
    /// Blocking work cannot be aborted; it must poll the token itself or it
    /// will be abandoned when the grace window runs out.
    pub fn spawn_blocking<F>(&self, name: impl Into<Arc<str>>, f: F) -> bool
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let name = name.into();
        if self.is_closed() {
            tracing::warn!(task = %name, "Refusing to spawn blocking task after shutdown began");
            return false;
        }

        tracing::debug!(task = %name, "Spawning blocking background task");
        let token = self.token();
        let handle = tokio::task::spawn_blocking(move || f(token));
        self.track(name, handle);
        true
    }

    fn track(&self, name: Arc<str>, handle: JoinHandle<()>) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.handle.is_finished());
        tasks.push(TrackedTask { name, handle });
    }

    /// Names of tasks that have not finished yet
    pub fn outstanding(&self) -> Vec<Arc<str>> {
        self.inner
            .tasks
            .lock()
            .iter()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Whether cancellation has started
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Cancel every outstanding task and wait up to `grace` for them to end
    ///
    /// Returns the names of tasks that were still running when the grace
    /// window closed; those are abandoned.
    pub async fn cancel_all(&self, grace: Duration) -> Vec<Arc<str>> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.token.cancel();

        let pending: Vec<TrackedTask> = {
            let mut tasks = self.inner.tasks.lock();
            tasks.drain(..).filter(|t| !t.handle.is_finished()).collect()
        };

        if pending.is_empty() {
            tracing::info!("No outstanding background tasks to cancel");
            return Vec::new();
        }

        tracing::info!(count = pending.len(), "Cancelling outstanding background tasks");
        for task in &pending {
            task.handle.abort();
        }

        let deadline = tokio::time::Instant::now() + grace;
        let mut abandoned = Vec::new();
        for mut task in pending {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(())) => tracing::debug!(task = %task.name, "Background task finished"),
                Ok(Err(e)) if e.is_cancelled() => {
                    tracing::debug!(task = %task.name, "Background task cancelled")
                }
                Ok(Err(e)) => tracing::error!(task = %task.name, error = %e, "Background task failed"),
                Err(_) => {
                    tracing::warn!(
                        task = %task.name,
                        grace = ?grace,
                        "Background task ignored cancellation, abandoning it"
                    );
                    abandoned.push(task.name);
                }
            }
        }

        abandoned
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("outstanding", &self.outstanding())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[tokio::test]
    async fn test_worker_pool_returns_value() {
        let pool = WorkerPool::new(2);
        let value = pool.run(|| 21 * 2).await.expect("run");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_worker_pool_catches_panic() {
        let pool = WorkerPool::new(1);
        let result = pool.run(|| -> u32 { panic!("boom") }).await;
        assert!(result.is_err());

        // Pool is still usable afterwards
        assert_eq!(pool.run(|| 1).await.expect("run"), 1);
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let running = running.clone();
            let peak = peak.clone();
            pool.run(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
            })
        });
        futures::future::join_all(jobs).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_cooperative_tasks() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("ticker", |token| async move {
            token.cancelled().await;
        });
        tasks.spawn("sleeper", |_| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert_eq!(tasks.outstanding().len(), 2);

        let abandoned = tasks.cancel_all(Duration::from_millis(500)).await;
        assert!(abandoned.is_empty());
        assert!(tasks.outstanding().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_abandons_stuck_blocking_task() {
        let tasks = BackgroundTasks::new();
        let running = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let (entered, flag) = (running.clone(), release.clone());
        tasks.spawn_blocking("stuck", move |_token| {
            entered.store(true, Ordering::SeqCst);
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
        });
        while !running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = Instant::now();
        let abandoned = tasks.cancel_all(Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(abandoned.len(), 1);
        assert_eq!(&*abandoned[0], "stuck");

        release.store(true, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_spawn_refused_after_cancel() {
        let tasks = BackgroundTasks::new();
        tasks.cancel_all(Duration::from_millis(10)).await;
        assert!(!tasks.spawn("late", |_| async {}));
        assert!(tasks.is_closed());
    }
}
