//! Agent Wallet Platform Service Library
//!
//! This library provides the production service around the ledger and the
//! Buffalo gateway: configuration management, component initialization, the
//! HTTP server and graceful shutdown handling.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use crate::config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from files and environment variables
pub fn load_configuration(config_file: Option<&Path>) -> Result<ServiceConfig> {
    let default_path = crate::config::default_config_path();
    let path = config_file.or(default_path.as_deref());
    crate::config::load_config(path).context("Failed to load service configuration")
}
