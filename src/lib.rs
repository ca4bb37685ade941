//! Penny Hub Library
//!
//! Event-driven core of the Penny streaming assistant: an in-process event
//! bus, the service contract, and a supervisor that starts services in
//! phases and drives a single, bounded shutdown sequence.

pub mod constants;
pub mod domain;
pub mod error;
pub mod eventing;
pub mod helpers;
pub mod logging;
pub mod services;

pub use error::{Error, Result};
