//! Shutdown Triggers
//!
//! Every way the process can be asked to stop converges on one path:
//!
//! ```text
//! SIGINT / SIGTERM / SIGQUIT ──► ShutdownSignals::recv() ─────┐
//! host UI "about to quit"    ──► ShutdownHandle::request() ───┼──► Supervisor::shutdown(source)
//! programmatic caller        ──► ShutdownHandle::request() ───┘        │
//!                                                            ShutdownFlag::try_begin()
//!                                                            (first caller wins, rest no-op)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What asked for the shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownSource {
    /// OS signal, by name
    Signal(&'static str),
    /// Host GUI is about to quit
    HostQuit,
    /// Any other caller, with a reason
    Programmatic(String),
}

impl fmt::Display for ShutdownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSource::Signal(name) => write!(f, "OS signal {name}"),
            ShutdownSource::HostQuit => f.write_str("host quit"),
            ShutdownSource::Programmatic(reason) => write!(f, "programmatic ({reason})"),
        }
    }
}

/// Write-once process shutdown flag
#[derive(Debug, Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Flip the flag; `true` only for the single caller that flipped it
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct HandleInner {
    token: CancellationToken,
    source: Mutex<Option<ShutdownSource>>,
}

/// Cloneable handle used by non-signal triggers to request shutdown
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<HandleInner>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for shutdown; only the first request's source is kept
    pub fn request(&self, source: ShutdownSource) {
        {
            let mut slot = self.inner.source.lock();
            if let Some(first) = slot.as_ref() {
                tracing::info!(%source, first = %first, "Shutdown already requested, ignoring");
                return;
            }
            tracing::info!(%source, "Shutdown requested");
            *slot = Some(source);
        }
        self.inner.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Wait for the first request and return its source
    pub async fn requested(&self) -> ShutdownSource {
        self.inner.token.cancelled().await;
        self.inner
            .source
            .lock()
            .clone()
            .unwrap_or_else(|| ShutdownSource::Programmatic("unknown".to_string()))
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("source", &*self.inner.source.lock())
            .finish()
    }
}

/// Installed OS termination signal listeners
///
/// On Unix this listens for SIGINT, SIGTERM and SIGQUIT from the moment
/// [`install`](Self::install) returns. If those handlers cannot be installed
/// it falls back to Ctrl-C only; elsewhere Ctrl-C is the only signal honored
/// and termination otherwise arrives through the host quit path.
pub struct ShutdownSignals {
    #[cfg(unix)]
    unix: Option<UnixSignals>,
}

#[cfg(unix)]
struct UnixSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl UnixSignals {
    fn install() -> crate::error::Result<Self> {
        use snafu::ResultExt;
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt()).context(crate::error::SignalSnafu)?,
            sigterm: signal(SignalKind::terminate()).context(crate::error::SignalSnafu)?,
            sigquit: signal(SignalKind::quit()).context(crate::error::SignalSnafu)?,
        })
    }

    async fn recv(&mut self) -> ShutdownSource {
        let name = tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        };
        tracing::info!(signal = name, "OS signal received");
        ShutdownSource::Signal(name)
    }
}

impl ShutdownSignals {
    /// Install the listeners; must be called inside the runtime
    pub fn install() -> Self {
        Self {
            #[cfg(unix)]
            unix: UnixSignals::install()
                .inspect_err(|e| {
                    tracing::warn!(
                        error = %e,
                        "Unix signal handlers not supported, relying on Ctrl-C or host quit"
                    )
                })
                .ok(),
        }
    }

    /// Wait for the next termination signal
    ///
    /// Cancel safe. If no handler could be installed at all this never
    /// completes.
    pub async fn recv(&mut self) -> ShutdownSource {
        #[cfg(unix)]
        if let Some(signals) = self.unix.as_mut() {
            return signals.recv().await;
        }

        ctrl_c_only().await
    }
}

impl fmt::Debug for ShutdownSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ShutdownSignals");
        #[cfg(unix)]
        debug.field("unix", &self.unix.is_some());
        debug.finish()
    }
}

async fn ctrl_c_only() -> ShutdownSource {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl-C received");
            ShutdownSource::Signal("SIGINT")
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable, only host quit can stop the app");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flag_is_write_once() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        assert!(flag.try_begin());
        assert!(!flag.try_begin());
        assert!(flag.is_set());
    }

    #[test]
    fn test_flag_has_single_winner_across_threads() {
        let flag = Arc::new(ShutdownFlag::new());
        let winners: usize = (0..8)
            .map(|_| {
                let flag = flag.clone();
                std::thread::spawn(move || flag.try_begin())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().map(usize::from).unwrap_or(0))
            .sum();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_handle_keeps_first_source() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let wait = tokio::spawn(async move { waiter.requested().await });

        handle.request(ShutdownSource::HostQuit);
        handle.request(ShutdownSource::Programmatic("second".into()));

        let source = tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("timely")
            .expect("join");
        assert_eq!(source, ShutdownSource::HostQuit);
        assert!(handle.is_requested());
    }

    #[tokio::test]
    async fn test_signal_listeners_wait_without_signal() {
        let mut signals = ShutdownSignals::install();
        #[cfg(unix)]
        assert!(signals.unix.is_some());

        let waited = tokio::time::timeout(Duration::from_millis(20), signals.recv()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ShutdownSource::Signal("SIGTERM").to_string(), "OS signal SIGTERM");
        assert_eq!(ShutdownSource::HostQuit.to_string(), "host quit");
    }
}
