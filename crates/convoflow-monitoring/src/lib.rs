//! Monitoring for the convoflow engine.
//!
//! [`init`] installs the global tracing subscriber; [`MetricsEventHandler`]
//! turns execution events into `metrics` counters.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogExt, LoggingGuard};
pub use crate::metrics::{ExecutionTallies, MetricsEventHandler};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,convoflow_core=debug"); `RUST_LOG` wins
    pub log_filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
    /// Daily-rotated log file, in addition to stderr
    pub log_file: Option<String>,
    /// Record execution counters
    pub metrics_enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "convoflow".to_string(),
            log_filter: "info".to_string(),
            json: false,
            log_file: None,
            metrics_enabled: true,
        }
    }
}

impl MonitoringConfig {
    /// Load from `CONVOFLOW_*` environment variables over the defaults
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`MonitoringConfig::load`] over an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("CONVOFLOW_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Some(filter) = lookup("CONVOFLOW_LOG_FILTER") {
            config.log_filter = filter;
        }
        if let Some(format) = lookup("CONVOFLOW_LOG_FORMAT") {
            match format.as_str() {
                "json" => config.json = true,
                "pretty" | "text" => config.json = false,
                other => warn!("Invalid CONVOFLOW_LOG_FORMAT value: {}", other),
            }
        }
        if let Some(file) = lookup("CONVOFLOW_LOG_FILE") {
            config.log_file = (!file.is_empty()).then_some(file);
        }
        if let Some(raw) = lookup("CONVOFLOW_METRICS_ENABLED") {
            match raw.parse() {
                Ok(enabled) => config.metrics_enabled = enabled,
                Err(_) => warn!("Invalid CONVOFLOW_METRICS_ENABLED value: {}", raw),
            }
        }

        config
    }
}

/// Initialize logging and return the event handler to wire into the engine.
///
/// Keep the returned guard alive for the life of the process, or buffered
/// file output is lost.
pub fn init(config: &MonitoringConfig) -> anyhow::Result<(LoggingGuard, MetricsEventHandler)> {
    let guard = init_logging(config)?;
    Ok((guard, MetricsEventHandler::new(config.metrics_enabled)))
}
