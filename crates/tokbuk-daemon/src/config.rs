//! Configuration module for tokbukd.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder for command-line
//! overrides. The limiter crates never read configuration themselves; the
//! daemon turns this into a `RateLimit` policy at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokbuk_core::{validate_limits, LimiterError};
use tokbuk_http::HeaderKey;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for tokbukd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Rate-limited HTTP endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:8080`.
    pub listen: String,
    /// Path of the rate-limited route.
    pub route: String,
}

/// How clients are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Connection source IP address.
    PeerIp,
    /// Value of `rate_limit.header_name`, falling back to the source IP.
    Header,
    /// One bucket shared by every client (`rate_limit.static_key`).
    Static,
}

/// Token bucket policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst allowance: tokens in a full bucket.
    pub capacity: u64,
    /// Tokens regained per second.
    pub rate: f64,
    pub key: KeyStrategy,
    /// Header carrying the client identity when `key` is `header`.
    pub header_name: String,
    /// Bucket key when `key` is `static`.
    pub static_key: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    pub format: LogFormat,
}

/// Prometheus endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address of the `/metrics` endpoint.
    pub listen: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tokbuk/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tokbuk")
            .join("config.yaml")
    }

    /// Serialize back to YAML, e.g. for `--print-config`.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            route: "/test".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            rate: 5.0,
            key: KeyStrategy::PeerIp,
            header_name: "x-api-key".to_string(),
            static_key: "global".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:9100".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"rate_limit.capacity"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- server ---
        let server_addr = self.server.listen.parse::<SocketAddr>();
        if server_addr.is_err() {
            errors.push(ValidationError {
                field: "server.listen".into(),
                message: format!("not a socket address: '{}'", self.server.listen),
            });
        }
        if !self.server.route.starts_with('/') {
            errors.push(ValidationError {
                field: "server.route".into(),
                message: "must start with '/'".into(),
            });
        }

        // --- rate_limit ---
        // Checked one at a time so that both fields are reported.
        let limit_checks = [
            validate_limits(self.rate_limit.capacity, 1.0),
            validate_limits(1, self.rate_limit.rate),
        ];
        for LimiterError::InvalidConfiguration { field, reason } in
            limit_checks.into_iter().filter_map(Result::err)
        {
            errors.push(ValidationError {
                field: format!("rate_limit.{field}"),
                message: reason,
            });
        }
        match self.rate_limit.key {
            KeyStrategy::Header if HeaderKey::new(&self.rate_limit.header_name).is_err() => {
                errors.push(ValidationError {
                    field: "rate_limit.header_name".into(),
                    message: format!(
                        "invalid header name '{}'",
                        self.rate_limit.header_name
                    ),
                });
            }
            KeyStrategy::Static if self.rate_limit.static_key.is_empty() => {
                errors.push(ValidationError {
                    field: "rate_limit.static_key".into(),
                    message: "must not be empty".into(),
                });
            }
            _ => {}
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- metrics ---
        if self.metrics.enabled {
            match self.metrics.listen.parse::<SocketAddr>() {
                Err(_) => errors.push(ValidationError {
                    field: "metrics.listen".into(),
                    message: format!("not a socket address: '{}'", self.metrics.listen),
                }),
                Ok(addr) if server_addr.as_ref().is_ok_and(|s| *s == addr) => {
                    errors.push(ValidationError {
                        field: "metrics.listen".into(),
                        message: "must differ from server.listen".into(),
                    })
                }
                Ok(_) => {}
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] (or an existing config) and allows
/// selective overrides, which is how command-line flags are applied.
///
/// # Example
///
/// ```rust,ignore
/// let config = ConfigBuilder::new()
///     .server_listen("0.0.0.0:8080")
///     .rate_limit_capacity(20)
///     .rate_limit_rate(2.5)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    /// Create a builder that overrides values of an existing config.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- server ---

    pub fn server_listen(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen = addr.into();
        self
    }

    pub fn server_route(mut self, route: impl Into<String>) -> Self {
        self.config.server.route = route.into();
        self
    }

    // --- rate_limit ---

    pub fn rate_limit_capacity(mut self, capacity: u64) -> Self {
        self.config.rate_limit.capacity = capacity;
        self
    }

    pub fn rate_limit_rate(mut self, rate: f64) -> Self {
        self.config.rate_limit.rate = rate;
        self
    }

    /// Key clients by `header`, falling back to their IP address.
    pub fn rate_limit_header(mut self, header: impl Into<String>) -> Self {
        self.config.rate_limit.key = KeyStrategy::Header;
        self.config.rate_limit.header_name = header.into();
        self
    }

    pub fn rate_limit_key(mut self, key: KeyStrategy) -> Self {
        self.config.rate_limit.key = key;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    // --- metrics ---

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    pub fn metrics_listen(mut self, addr: impl Into<String>) -> Self {
        self.config.metrics.listen = addr.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
