//! Config - Application Configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BOT_NAME, COMMAND_PREFIX, HARD_EXIT_MS, LOG_FILE_PREFIX, LOG_LEVEL, SHUTDOWN_NOTICE_MS,
    SPEECH_QUEUE_CAPACITY, STOP_GRACE_MS, SYNC_WORKERS, TASK_GRACE_MS, UI_LOG_HISTORY_CAPACITY,
};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Bus and lifecycle timing
    pub supervisor: SupervisorConfig,
    /// Log output
    pub logging: LogConfig,
    /// Speech queue
    pub speech: SpeechConfig,
    /// Chat command routing
    pub chat: ChatConfig,
    /// UI log sink
    pub ui_log: UiLogConfig,
}

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Worker pool size for synchronous subscribers
    pub sync_workers: usize,
    /// Grace after the shutdown notice, before stop hooks run
    pub shutdown_notice_ms: u64,
    /// Bounded wait for each stop hook
    pub stop_grace_ms: u64,
    /// Bounded wait for stray tasks to honor cancellation
    pub task_grace_ms: u64,
    /// Hard limit for the whole shutdown
    pub hard_exit_ms: u64,
}

impl SupervisorConfig {
    pub fn shutdown_notice(&self) -> Duration {
        Duration::from_millis(self.shutdown_notice_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn task_grace(&self) -> Duration {
        Duration::from_millis(self.task_grace_ms)
    }

    pub fn hard_exit(&self) -> Duration {
        Duration::from_millis(self.hard_exit_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sync_workers: SYNC_WORKERS,
            shutdown_notice_ms: SHUTDOWN_NOTICE_MS,
            stop_grace_ms: STOP_GRACE_MS,
            task_grace_ms: TASK_GRACE_MS,
            hard_exit_ms: HARD_EXIT_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive (`RUST_LOG` overrides it)
    pub level: String,
    /// Directory for the rolling log file; stdout only when unset
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LOG_LEVEL.to_string(),
            directory: None,
            file_prefix: LOG_FILE_PREFIX.to_string(),
        }
    }
}

/// Speech queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    /// Pending requests kept before the oldest is dropped
    pub queue_capacity: usize,
    /// Drop every request while muted
    pub muted: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            queue_capacity: SPEECH_QUEUE_CAPACITY,
            muted: false,
        }
    }
}

/// Chat command configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Name that triggers a reply when mentioned
    pub bot_name: String,
    /// Prefix marking a command
    pub command_prefix: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_name: BOT_NAME.to_string(),
            command_prefix: COMMAND_PREFIX.to_string(),
        }
    }
}

/// UI log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiLogConfig {
    /// Entries retained in memory
    pub history_capacity: usize,
}

impl Default for UiLogConfig {
    fn default() -> Self {
        Self {
            history_capacity: UI_LOG_HISTORY_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [supervisor]
            stop_grace_ms = 500

            [chat]
            bot_name = "nova"
            "#,
        )
        .expect("parse");

        assert_eq!(config.supervisor.stop_grace(), Duration::from_millis(500));
        assert_eq!(config.supervisor.sync_workers, SYNC_WORKERS);
        assert_eq!(config.chat.bot_name, "nova");
        assert_eq!(config.chat.command_prefix, "!");
        assert_eq!(config.speech, SpeechConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(config, AppConfig::default());
    }
}
