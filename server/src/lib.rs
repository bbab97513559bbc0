//! # restmq Server
//!
//! The gateway binary's library side: environment-driven configuration
//! shared by the `restmq` gateway and the `echo-worker` example backend.

pub mod config;

pub use config::{AppConfig, ConfigError, MqConfig};
