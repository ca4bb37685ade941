//! Helper Utilities
//!
//! Common utilities used across the application.

mod bounded;
mod fs;
mod string;

pub use bounded::*;
pub use fs::*;
pub use string::*;
