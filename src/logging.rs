//! Logging setup
//!
//! Stdout always; a daily rolling file as well when `logging.directory` is
//! set. `RUST_LOG` overrides the configured level.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::config::LogConfig;
use crate::error::{Error, Result};

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stdout_layer = fmt::layer().with_timer(LocalTime::rfc_3339());

    let Some(directory) = &config.directory else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|e| Error::Invalid {
                message: format!("Failed to install log subscriber: {e}"),
            })?;
        return Ok(None);
    };

    std::fs::create_dir_all(directory)?;
    let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Invalid {
            message: format!("Failed to install log subscriber: {e}"),
        })?;

    tracing::info!(directory = %directory.display(), "File logging enabled");
    Ok(Some(guard))
}
