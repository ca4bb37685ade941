//! Service Layer
//!
//! Lifecycle of the application's services and the bridges off the
//! cooperative scheduler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Supervisor                           │
//! │   phases ──► start hooks      triggers ──► shutdown sequence │
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────────┐           │
//! │  │ UiLogSink  │  │ SpeechQueue │  │ ChatCommands │  ...      │
//! │  └────────────┘  └─────────────┘  └──────────────┘           │
//! └──────────────────────────────────────────────────────────────┘
//!                │ publish / subscribe          │ spawn
//!                ▼                              ▼
//!           EventBus ──► WorkerPool       BackgroundTasks
//! ```

mod chat_commands;
mod runtime;
mod service;
mod shutdown;
mod speech_queue;
mod supervisor;
mod ui_log;

pub use chat_commands::*;
pub use runtime::*;
pub use service::*;
pub use shutdown::*;
pub use speech_queue::*;
pub use supervisor::*;
pub use ui_log::*;
