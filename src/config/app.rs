//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::validation::{expand_env_vars, ConfigError};

// =============================================================================
// Constants
// =============================================================================

/// Default polling interval (5 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Minimum polling interval (10 seconds).
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default SNMP query timeout (2 seconds).
pub const DEFAULT_SNMP_TIMEOUT: Duration = Duration::from_secs(2);

/// Default retry base delay (5 seconds).
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(5);

/// Default retry delay cap (1 hour).
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(3600);

fn default_snmp_community() -> String {
    "public".to_string()
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_timeout() -> Duration {
    DEFAULT_SNMP_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_base() -> Duration {
    DEFAULT_RETRY_BASE
}

fn default_retry_max() -> Duration {
    DEFAULT_RETRY_MAX
}

fn default_pool_size() -> u32 {
    4
}

// =============================================================================
// Mode
// =============================================================================

/// Operating mode, fixed for the process lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Record samples in the embedded store.
    Local,
    /// Deliver samples to the upstream service, buffering across outages.
    Remote,
}

/// Policy applied when a buffered record exhausts its attempt cap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExhaustedPolicy {
    /// Keep the record and keep retrying at the maximum delay.
    Hold,
    /// Remove the record with a logged, counted loss event.
    Drop,
}

// =============================================================================
// Sections
// =============================================================================

/// Status server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "printwatch.db".to_string(),
            pool_size: default_pool_size(),
        }
    }
}

/// SNMP protocol parameters, shared by both modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    /// Community string (default: "public").
    pub community: String,

    /// Agent UDP port (default: 161).
    pub port: u16,

    /// Per-query timeout (default: 2s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: default_snmp_community(),
            port: default_snmp_port(),
            timeout: default_snmp_timeout(),
        }
    }
}

/// Polling cadence and target discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between polling cycles (default: 5m, minimum: 10s).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum startup/cycle jitter added to the interval (default: none).
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,

    /// Refresh the target set from upstream each cycle (remote mode).
    pub discover: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            jitter: Duration::ZERO,
            discover: true,
        }
    }
}

/// Retry and backoff policy for buffered delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First retry delay; doubles per failed attempt (default: 5s).
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Delay cap (default: 1h).
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Attempt cap per record; unlimited when absent.
    pub max_attempts: Option<u32>,

    /// What to do when the attempt cap is exhausted (default: hold).
    pub on_exhausted: ExhaustedPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_retry_base(),
            max_delay: default_retry_max(),
            max_attempts: None,
            on_exhausted: ExhaustedPolicy::Hold,
        }
    }
}

/// Upstream delivery configuration (remote mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the upstream API.
    pub api_url: String,

    /// Long-lived agent credential sent as a bearer token.
    pub api_key: String,

    /// Buffer undeliverable uploads instead of dropping them (default: true).
    #[serde(default = "default_true")]
    pub buffering: bool,

    /// Per-request timeout (default: 10s).
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retry/backoff policy for the sync engine.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// A statically configured printer target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Network address (IP).
    pub address: String,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Physical location.
    #[serde(default)]
    pub location: Option<String>,

    /// Device model.
    #[serde(default)]
    pub model: Option<String>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Operating mode.
    pub mode: Mode,

    /// Status server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// SNMP protocol parameters.
    #[serde(default)]
    pub snmp: SnmpConfig,

    /// Polling cadence.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Upstream delivery settings (required in remote mode).
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Statically configured targets, seeded into the store at startup.
    #[serde(default)]
    pub printers: Vec<TargetConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment variables in the file are expanded (`${VAR}` and
    /// `${VAR:-default}`) before parsing, so credentials can stay out of
    /// the file itself.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&expand_env_vars(&content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "database pool_size must be positive".to_string(),
            ));
        }

        if self.monitor.interval < MIN_POLL_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "monitor interval must be at least {}s",
                MIN_POLL_INTERVAL.as_secs()
            )));
        }

        if self.snmp.port == 0 {
            return Err(ConfigError::ValidationError(
                "snmp port must be non-zero".to_string(),
            ));
        }

        if self.snmp.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "snmp timeout must be non-zero".to_string(),
            ));
        }

        for target in &self.printers {
            target.address.parse::<IpAddr>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "invalid printer address: '{}'",
                    target.address
                ))
            })?;
        }

        match (self.mode, &self.remote) {
            (Mode::Remote, None) => {
                return Err(ConfigError::ValidationError(
                    "remote mode requires a [remote] section".to_string(),
                ));
            }
            (Mode::Remote, Some(remote)) => {
                if !remote.api_url.starts_with("http://") && !remote.api_url.starts_with("https://")
                {
                    return Err(ConfigError::ValidationError(format!(
                        "remote api_url must be an http(s) URL, got '{}'",
                        remote.api_url
                    )));
                }
                if remote.api_key.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "remote api_key must not be empty".to_string(),
                    ));
                }
                if remote.retry.base_delay.is_zero() {
                    return Err(ConfigError::ValidationError(
                        "retry base_delay must be non-zero".to_string(),
                    ));
                }
                if remote.retry.max_delay < remote.retry.base_delay {
                    return Err(ConfigError::ValidationError(
                        "retry max_delay must be >= base_delay".to_string(),
                    ));
                }
            }
            (Mode::Local, _) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> AppConfig {
        AppConfig {
            mode: Mode::Local,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            snmp: SnmpConfig::default(),
            monitor: MonitorConfig::default(),
            remote: None,
            printers: vec![TargetConfig {
                address: "192.0.2.10".to_string(),
                name: Some("Front desk".to_string()),
                location: None,
                model: None,
            }],
        }
    }

    #[test]
    fn test_local_config_valid() {
        assert!(local_config().validate().is_ok());
    }

    #[test]
    fn test_remote_mode_requires_remote_section() {
        let mut config = local_config();
        config.mode = Mode::Remote;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("remote mode requires"));
    }

    #[test]
    fn test_invalid_printer_address() {
        let mut config = local_config();
        config.printers[0].address = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_minimum() {
        let mut config = local_config();
        config.monitor.interval = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = local_config();
        config.mode = Mode::Remote;
        config.remote = Some(RemoteConfig {
            api_url: "https://api.example.net".to_string(),
            api_key: "agent-key".to_string(),
            buffering: true,
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig {
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(5),
                max_attempts: None,
                on_exhausted: ExhaustedPolicy::Hold,
            },
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_delay"));
    }

    #[test]
    fn test_yaml_parse_with_defaults() {
        let yaml = r#"
mode: remote
database:
  path: /var/lib/printwatch/agent.db
remote:
  api_url: https://api.example.net
  api_key: agent-key
printers:
  - address: 192.0.2.10
    name: Front desk
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mode, Mode::Remote);
        assert_eq!(config.snmp.community, "public");
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.monitor.interval, DEFAULT_POLL_INTERVAL);

        let remote = config.remote.unwrap();
        assert!(remote.buffering);
        assert_eq!(remote.retry.base_delay, DEFAULT_RETRY_BASE);
        assert_eq!(remote.retry.on_exhausted, ExhaustedPolicy::Hold);
        assert!(remote.retry.max_attempts.is_none());
    }

    #[test]
    fn test_mode_parse() {
        use std::str::FromStr;
        assert_eq!(Mode::from_str("local").unwrap(), Mode::Local);
        assert_eq!(Mode::from_str("REMOTE").unwrap(), Mode::Remote);
        assert!(Mode::from_str("cloud").is_err());
    }
}
