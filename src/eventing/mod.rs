//! Eventing Layer
//!
//! The bus and the closed event catalogue it carries.
//!
//! ```text
//!  service A ──publish──┐                     ┌──► sync handlers  (WorkerPool)
//!  service B ──publish──┼──► EventBus ────────┤
//!  supervisor ─publish──┘   (kind → handlers) └──► async handlers (join_all)
//! ```

mod app_event;
mod bus;
mod handler;

pub use app_event::*;
pub use bus::*;
pub use handler::*;
