//! Domain - Pure Data Structures
//!
//! Configuration types shared by the binary and the services.

pub mod config;
