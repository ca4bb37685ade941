//! Service Supervisor
//!
//! Owns the bus and the ordered service registry, sequences startup, and runs
//! the single shutdown path every trigger converges on.
//!
//! ## Lifecycle
//!
//! ```text
//! Constructed ──start_services()──► Running ──trigger──► ShuttingDown ──► Terminated
//!                 │                                          │
//!                 │ phase 1: S1 ┐                            │ 1. publish AppShutdown, notice grace
//!                 │          S2 ┴ (concurrent)               │ 2. stop hooks, reverse order,
//!                 │ phase 2: S3   (after phase 1)            │    concurrent, each bounded by stop_grace
//!                 │                                          │ 3. cancel stray tasks, bounded by task_grace
//!                 │                                          │ 4. terminate
//! ```
//!
//! Faults never escape: a failing start or stop hook, a hung stop hook and
//! an abandoned task are logged, published as `UILog`, and listed in the
//! returned report.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::domain::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::eventing::{AppShutdown, Delivery, EventBus, UiLog};
use crate::services::runtime::{BackgroundTasks, WorkerPool};
use crate::services::service::{Service, ServiceFault};
use crate::services::shutdown::{ShutdownFlag, ShutdownHandle, ShutdownSignals, ShutdownSource};

/// Outcome of [`Supervisor::start_services`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Services whose start hook succeeded, in completion order per phase
    pub started: Vec<String>,
    /// Services whose start hook failed or panicked
    pub failed: Vec<ServiceFault>,
}

/// Outcome of one completed shutdown sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Trigger that won the shutdown flag
    pub source: ShutdownSource,
    /// Handlers reached by the shutdown notice
    pub notice: Delivery,
    /// Services whose stop hook returned successfully
    pub stopped: Vec<String>,
    /// Services whose stop hook failed or panicked
    pub failed: Vec<ServiceFault>,
    /// Services whose stop hook exceeded the grace window
    pub hung: Vec<String>,
    /// Background tasks abandoned after ignoring cancellation
    pub abandoned_tasks: Vec<String>,
}

/// Result of a shutdown request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call ran the full sequence
    Completed(ShutdownReport),
    /// Another trigger got there first; nothing was done
    AlreadyInProgress,
}

/// Builder registering services in ordered start phases
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    bus: EventBus,
    tasks: BackgroundTasks,
    phases: Vec<Vec<Arc<dyn Service>>>,
}

impl SupervisorBuilder {
    /// Create a builder with a fresh bus and task registry
    pub fn new(config: SupervisorConfig) -> Self {
        let bus = EventBus::new(WorkerPool::new(config.sync_workers));
        Self {
            config,
            bus,
            tasks: BackgroundTasks::new(),
            phases: Vec::new(),
        }
    }

    /// The bus services must be constructed with
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The task registry services spawn long-running work on
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Add a phase; its services start concurrently after every earlier phase
    pub fn phase(mut self, services: impl IntoIterator<Item = Arc<dyn Service>>) -> Self {
        let phase: Vec<_> = services.into_iter().collect();
        if !phase.is_empty() {
            self.phases.push(phase);
        }
        self
    }

    /// Add a service to the last phase, opening one if none exists
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        match self.phases.last_mut() {
            Some(phase) => phase.push(service),
            None => self.phases.push(vec![service]),
        }
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor {
            config: self.config,
            bus: self.bus,
            tasks: self.tasks,
            phases: self.phases,
            flag: ShutdownFlag::new(),
            handle: ShutdownHandle::new(),
            terminated: CancellationToken::new(),
        }
    }
}

/// Application coordinator
pub struct Supervisor {
    /// Timing configuration
    config: SupervisorConfig,
    /// Bus shared with every service
    bus: EventBus,
    /// Stray work cancelled at shutdown
    tasks: BackgroundTasks,
    /// Service registry, grouped by start phase; fixed after construction
    phases: Vec<Vec<Arc<dyn Service>>>,
    /// Guards the single shutdown sequence
    flag: ShutdownFlag,
    /// Non-signal shutdown trigger
    handle: ShutdownHandle,
    /// Cancelled when the sequence reaches Terminated
    terminated: CancellationToken,
}

impl Supervisor {
    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Handle for the host UI or any other caller to request shutdown
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.flag.is_set()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Wait until the shutdown sequence has finished
    pub async fn wait_terminated(&self) {
        self.terminated.cancelled().await;
    }

    /// Services in registration order
    pub fn services(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Service>> {
        self.phases.iter().flatten()
    }

    /// Start every service, phase by phase
    pub async fn start_services(&self) -> StartReport {
        let mut report = StartReport::default();
        if self.is_shutting_down() {
            tracing::warn!("Shutdown in progress, not starting services");
            return report;
        }

        tracing::info!(phases = self.phases.len(), "Starting all services");

        for (index, phase) in self.phases.iter().enumerate() {
            tracing::debug!(phase = index + 1, services = phase.len(), "Starting phase");

            let starts = phase.iter().filter_map(|service| {
                let startable = service.as_startable()?;
                let name = service.name();
                Some(async move {
                    tracing::info!(service = name, "Starting service");
                    let outcome = AssertUnwindSafe(startable.start()).catch_unwind().await;
                    (name, outcome)
                })
            });

            for (name, outcome) in futures::future::join_all(starts).await {
                match outcome {
                    Ok(Ok(())) => {
                        tracing::info!(service = name, "Service started");
                        report.started.push(name.to_string());
                    }
                    Ok(Err(e)) => {
                        tracing::error!(service = name, error = %e, "Error starting service");
                        report.failed.push(ServiceFault::new(name, e));
                    }
                    Err(_) => {
                        tracing::error!(service = name, "Service start panicked");
                        report.failed.push(ServiceFault::new(name, "start panicked"));
                    }
                }
            }
        }

        for fault in &report.failed {
            self.bus
                .publish(UiLog::error(format!("Failed to start {fault}")))
                .await;
        }

        tracing::info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "All service start routines attempted"
        );
        report
    }

    /// Run the shutdown sequence once; later calls are no-ops
    pub async fn shutdown(&self, source: ShutdownSource) -> ShutdownOutcome {
        if !self.flag.try_begin() {
            tracing::info!(%source, "Shutdown already in progress, ignoring request");
            return ShutdownOutcome::AlreadyInProgress;
        }

        tracing::info!(%source, "Shutdown initiated");

        let notice = self.bus.publish(AppShutdown).await;
        tracing::debug!(
            handlers = notice.dispatched(),
            failed = notice.failed,
            "Shutdown notice delivered"
        );
        tokio::time::sleep(self.config.shutdown_notice()).await;

        let mut report = ShutdownReport {
            source,
            notice,
            stopped: Vec::new(),
            failed: Vec::new(),
            hung: Vec::new(),
            abandoned_tasks: Vec::new(),
        };

        self.stop_services(&mut report).await;

        let abandoned = self.tasks.cancel_all(self.config.task_grace()).await;
        for name in &abandoned {
            self.bus
                .publish(UiLog::warn(format!("Task {name} ignored cancellation and was abandoned")))
                .await;
        }
        report.abandoned_tasks = abandoned.iter().map(|n| n.to_string()).collect();

        self.terminated.cancel();
        tracing::info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            hung = report.hung.len(),
            abandoned = report.abandoned_tasks.len(),
            "Shutdown sequence complete"
        );
        ShutdownOutcome::Completed(report)
    }

    async fn stop_services(&self, report: &mut ShutdownReport) {
        let grace = self.config.stop_grace();
        let stops: Vec<_> = self
            .services()
            .rev()
            .filter_map(|service| {
                let stoppable = service.as_stoppable()?;
                let name = service.name();
                Some(async move {
                    tracing::info!(service = name, "Stopping service");
                    let stop = AssertUnwindSafe(stoppable.stop()).catch_unwind();
                    (name, tokio::time::timeout(grace, stop).await)
                })
            })
            .collect();

        if stops.is_empty() {
            tracing::info!("No service stop hooks to run");
            return;
        }

        tracing::info!(count = stops.len(), "Awaiting service stop hooks");
        for (name, outcome) in futures::future::join_all(stops).await {
            match outcome {
                Ok(Ok(Ok(()))) => {
                    tracing::info!(service = name, "Service stopped");
                    report.stopped.push(name.to_string());
                }
                Ok(Ok(Err(e))) => {
                    tracing::error!(service = name, error = %e, "Error stopping service");
                    report.failed.push(ServiceFault::new(name, e));
                }
                Ok(Err(_)) => {
                    tracing::error!(service = name, "Service stop panicked");
                    report.failed.push(ServiceFault::new(name, "stop panicked"));
                }
                Err(_) => {
                    tracing::warn!(service = name, grace = ?grace, "Service stop hook hung, abandoning it");
                    report.hung.push(name.to_string());
                }
            }
        }

        for name in &report.hung {
            self.bus
                .publish(UiLog::warn(format!("Service {name} did not stop within {grace:?}")))
                .await;
        }
    }

    /// Start services, wait for a trigger, then shut down under the hard timeout
    ///
    /// Signal listeners are installed before the first start hook runs, and a
    /// trigger that arrives mid-startup abandons the remaining start hooks.
    ///
    /// Returns [`Error::ShutdownTimeout`] when shutdown cannot reach
    /// Terminated in time; the caller is expected to force-exit.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Supervisor starting up");
        let mut signals = ShutdownSignals::install();

        // Triggers stay live while services start
        let mut starting = Box::pin(self.start_services());
        let mut started = false;
        let source = loop {
            tokio::select! {
                source = signals.recv() => break source,
                source = self.handle.requested() => break source,
                _ = self.terminated.cancelled() => {
                    tracing::info!("Supervisor terminated by a direct shutdown call");
                    return Ok(());
                }
                _ = &mut starting, if !started => started = true,
            }
        };
        if !started {
            tracing::warn!(%source, "Shutdown requested before all services finished starting");
        }
        drop(starting);

        let hard = self.config.hard_exit();
        match tokio::time::timeout(hard, self.shutdown(source)).await {
            Ok(ShutdownOutcome::Completed(_)) => Ok(()),
            Ok(ShutdownOutcome::AlreadyInProgress) => {
                tokio::time::timeout(hard, self.wait_terminated())
                    .await
                    .map_err(|_| Error::ShutdownTimeout { timeout: hard })
            }
            Err(_) => {
                tracing::error!(timeout = ?hard, "Shutdown exceeded hard timeout");
                Err(Error::ShutdownTimeout { timeout: hard })
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.services().map(|s| s.name()).collect();
        f.debug_struct("Supervisor")
            .field("services", &names)
            .field("shutting_down", &self.is_shutting_down())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
