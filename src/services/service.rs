//! Service Contract
//!
//! A service is a long-lived collaborator that talks to the rest of the
//! application only through the bus. Lifecycle hooks are optional
//! capabilities: a service exposes [`Startable`] and/or [`Stoppable`] by
//! returning itself from [`Service::as_startable`] / [`Service::as_stoppable`].
//!
//! Expectations the supervisor relies on:
//! - `start` subscribes and spawns; it is called at most once.
//! - `stop` must be safe without a prior (or after a failed) `start`, and the
//!   service publishes nothing once it has returned.
//! - Neither hook blocks the scheduler; blocking work goes through
//!   [`WorkerPool`](crate::services::WorkerPool).

use async_trait::async_trait;

/// Start capability
#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
}

/// Stop capability
#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self) -> anyhow::Result<()>;
}

/// A supervised collaborator
pub trait Service: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }
}

/// A service fault recorded by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    pub service: String,
    pub error: String,
}

impl ServiceFault {
    pub fn new(service: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            service: service.into(),
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}
