//! Runtime Constants
//!
//! Centralized defaults for the bus, the supervisor and the built-in services.

/// Worker pool size for synchronous subscriber callbacks
pub const SYNC_WORKERS: usize = 4;

/// Grace period after publishing `AppShutdown`, before stop hooks run
pub const SHUTDOWN_NOTICE_MS: u64 = 100;

/// Bounded wait for each service stop hook
pub const STOP_GRACE_MS: u64 = 2000;

/// Bounded wait for stray background tasks to honor cancellation
pub const TASK_GRACE_MS: u64 = 2000;

/// Hard limit for the whole shutdown sequence
pub const HARD_EXIT_MS: u64 = 10_000;

/// Pending speech requests kept before the oldest is dropped
pub const SPEECH_QUEUE_CAPACITY: usize = 20;

/// UI log entries retained by the log sink
pub const UI_LOG_HISTORY_CAPACITY: usize = 500;

/// Chat command prefix
pub const COMMAND_PREFIX: &str = "!";

/// Bot name matched in plain chat messages
pub const BOT_NAME: &str = "penny";

/// Characters of speech text shown in log lines
pub const LOG_PREVIEW_CHARS: usize = 50;

/// Default log level
pub const LOG_LEVEL: &str = "info";

/// Default log file prefix
pub const LOG_FILE_PREFIX: &str = "penny-hub.log";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";
