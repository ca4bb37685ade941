//! Penny Hub - Main Entry Point
//!
//! Usage: `penny-hub [config.toml]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use penny_hub::domain::config::AppConfig;
use penny_hub::helpers::{default_config_path, is_development, load_config, save_config};
use penny_hub::services::{
    ChatCommands, LogSpeaker, Service, SpeechQueue, Supervisor, UiLogSink,
};
use penny_hub::{logging, Error};

fn main() -> ExitCode {
    let (config_path, explicit) = match std::env::args_os().nth(1) {
        Some(path) => (PathBuf::from(path), true),
        None => match default_config_path() {
            Ok(path) => (path, false),
            Err(e) => {
                eprintln!("Cannot locate config directory: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Cannot load {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Cannot initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // First run writes the defaults so there is a file to edit
    if !explicit && !config_path.exists() {
        match save_config(&config_path, &config) {
            Ok(()) => tracing::info!(path = %config_path.display(), "Wrote default config"),
            Err(e) => tracing::warn!(error = %e, "Failed to write default config"),
        }
    }

    tracing::info!(
        config = %config_path.display(),
        development = is_development(),
        "Starting Penny Hub..."
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(config));
    // Abandoned blocking work must not hold the process open
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            tracing::info!("Penny Hub exited cleanly");
            ExitCode::SUCCESS
        }
        Err(Error::ShutdownTimeout { timeout }) => {
            tracing::error!(timeout = ?timeout, "Forcing exit after shutdown timeout");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "Penny Hub failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> penny_hub::Result<()> {
    let builder = Supervisor::builder(config.supervisor.clone());
    let bus = builder.bus().clone();
    let tasks = builder.tasks().clone();

    let ui_log: Arc<dyn Service> = Arc::new(UiLogSink::new(bus.clone(), config.ui_log.history_capacity));
    let speech: Arc<dyn Service> = Arc::new(SpeechQueue::new(
        bus.clone(),
        tasks,
        Arc::new(LogSpeaker),
        &config.speech,
    ));
    let chat: Arc<dyn Service> = Arc::new(ChatCommands::new(bus, &config.chat));

    let supervisor = builder.phase([ui_log]).phase([speech, chat]).build();
    supervisor.run().await
}
