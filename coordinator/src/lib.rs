//! # Networks Coordinator
//!
//! Process wiring for the network provisioning saga: configuration and the
//! dispatcher that routes bus messages to the runtime handlers. The binary in
//! `main.rs` connects the production bus and store and runs the dispatcher
//! until shutdown.

pub mod config;
pub mod dispatcher;

pub use config::{Config, ConfigError};
pub use dispatcher::{Dispatched, Dispatcher};
