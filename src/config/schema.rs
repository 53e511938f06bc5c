//! Configuration schema definitions.
//!
//! The file form uses plain integers (milliseconds, seconds) so it stays
//! readable; [`StationConfig::client_options`] turns it into the typed
//! [`ClientOptions`] the client is constructed with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{ConfigError, ConfigResult};
use crate::model::Version;

/// Default TCP port of the command station.
pub const DEFAULT_PORT: u16 = 2560;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
/// Oldest firmware the client is known to work with.
pub const DEFAULT_MIN_VERSION: &str = "5.4.0";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command station endpoint and timing
    pub station: StationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Station configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Host name or IP address of the command station
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// How long a correlated request waits for its reply
    pub response_timeout_ms: u64,
    /// Silence longer than this marks the link as dead
    pub heartbeat_timeout_ms: u64,
    /// Upper bound of the reconnect delay
    pub max_backoff_secs: u64,
    /// Minimum firmware version, dotted (e.g. "5.4.0")
    pub min_version: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            min_version: DEFAULT_MIN_VERSION.to_string(),
        }
    }
}

impl StationConfig {
    /// Check every field and build the client options.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ValidationError` naming the first offending key
    pub fn client_options(&self) -> ConfigResult<ClientOptions> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("station.host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("station.port", "must not be 0"));
        }
        for (key, value) in [
            ("station.connect_timeout_ms", self.connect_timeout_ms),
            ("station.response_timeout_ms", self.response_timeout_ms),
            ("station.heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("station.max_backoff_secs", self.max_backoff_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::validation(key, "must be greater than 0"));
            }
        }
        let min_version: Version = self
            .min_version
            .parse()
            .map_err(|e| ConfigError::validation("station.min_version", format!("{e}")))?;
        if min_version.is_empty() {
            return Err(ConfigError::validation(
                "station.min_version",
                "must have at least one component",
            ));
        }

        Ok(ClientOptions {
            host: self.host.trim().to_string(),
            port: self.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            min_version,
        })
    }
}

/// Options fixed at client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub max_backoff: Duration,
    pub min_version: Version,
}

impl ClientOptions {
    /// Defaults for everything but the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            min_version: Version::new(vec![5, 4, 0]),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = version;
        self
    }

    /// `host:port` as shown in logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Multi-line with colors
    #[default]
    Pretty,
    Compact,
}
