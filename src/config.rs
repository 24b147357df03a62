//! Configuration module for the printwatch agent.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Operating mode (local embedded store vs remote delivery)
//! - SNMP protocol parameters and polling cadence
//! - Upstream delivery, buffering, and retry policy
//! - Status server and database settings

mod app;
mod validation;

pub use app::{
    AppConfig, DatabaseConfig, ExhaustedPolicy, Mode, MonitorConfig, RemoteConfig, RetryConfig,
    ServerConfig, SnmpConfig, TargetConfig,
};
pub use validation::{expand_env_vars, parse_duration, ConfigError};

// Re-export constants
pub use app::{DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX, MIN_POLL_INTERVAL};
