//! Shared utilities for bizobj crates
//!
//! Holds the ambient concerns every bizobj crate relies on: logging setup
//! and the layered runtime configuration.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigLoader, LogSettings, RuntimeConfig};
pub use logging::{format_error, LogLevel, LogOptions, Timer};
