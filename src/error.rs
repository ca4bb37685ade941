//! Error types for Penny Hub
//!
//! Centralized error handling using snafu for ergonomic error definitions.
//! Faults raised by event handlers and service hooks are `anyhow::Error`
//! values; the bus and the supervisor only ever log those.

use snafu::Snafu;
use std::time::Duration;

/// Main error type for the application
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Invalid input or configuration
    #[snafu(display("Invalid: {message}"))]
    Invalid { message: String },

    /// IO error (config files, log directory, etc.)
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// TOML deserialization error
    #[snafu(display("TOML parse error: {source}"))]
    TomlDe { source: toml::de::Error },

    /// TOML serialization error
    #[snafu(display("TOML serialize error: {source}"))]
    TomlSe { source: toml::ser::Error },

    /// OS signal handler could not be installed
    #[snafu(display("Signal handler error: {source}"))]
    Signal { source: std::io::Error },

    /// Shutdown did not reach termination within the hard timeout
    #[snafu(display("Shutdown did not finish within {timeout:?}"))]
    ShutdownTimeout { timeout: Duration },
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { source }
    }
}

impl From<toml::de::Error> for Error {
    fn from(source: toml::de::Error) -> Self {
        Error::TomlDe { source }
    }
}

impl From<toml::ser::Error> for Error {
    fn from(source: toml::ser::Error) -> Self {
        Error::TomlSe { source }
    }
}

/// Result type alias for convenience
pub type Result<T, E = Error> = std::result::Result<T, E>;
