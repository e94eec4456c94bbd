//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broadcast server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest payload accepted by the HTTP publish endpoint
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// How long shutdown waits for connections to close
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024 // 1 MB
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_payload_bytes: default_max_payload_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Order book feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_feed_url")]
    pub base_url: String,

    /// Instruments to poll; each is published under its own name as topic
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Optional API credentials for authenticated requests
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

fn default_feed_url() -> String {
    "https://test.deribit.com/api/v2".to_string()
}

fn default_instruments() -> Vec<String> {
    vec!["BTC-PERPETUAL".to_string(), "ETH-PERPETUAL".to_string()]
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_feed_url(),
            instruments: default_instruments(),
            poll_interval_ms: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> (Self, ConfigSource) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("bookcast").join("config.toml")),
            Some(PathBuf::from("/etc/bookcast/config.toml")),
            Some(PathBuf::from("./bookcast.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file that parses, falling back to defaults
    pub fn load_first(paths: &[PathBuf]) -> (Self, ConfigSource) {
        let mut skipped = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => return (config, ConfigSource::File(path.clone())),
                Err(e) => skipped.push(e),
            }
        }

        (Self::from_env(), ConfigSource::Defaults { skipped })
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = var("BOOKCAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("BOOKCAST_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Feed overrides
        if let Some(url) = var("BOOKCAST_FEED_URL") {
            self.feed.base_url = url;
            self.feed.enabled = true;
        }
        if let Some(instruments) = var("BOOKCAST_FEED_INSTRUMENTS") {
            self.feed.instruments = instruments
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(interval) = var("BOOKCAST_FEED_INTERVAL_MS").and_then(|i| i.parse().ok()) {
            self.feed.poll_interval_ms = interval;
        }
        if let Some(client_id) = var("BOOKCAST_CLIENT_ID") {
            self.feed.client_id = Some(client_id);
        }
        if let Some(client_secret) = var("BOOKCAST_CLIENT_SECRET") {
            self.feed.client_secret = Some(client_secret);
        }

        // Logging overrides
        if let Some(level) = var("BOOKCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("BOOKCAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Where a loaded configuration came from
///
/// Loading happens before logging is set up, so callers report it with
/// [`ConfigSource::log`] once a subscriber is installed.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// No usable file; defaults plus environment overrides
    Defaults { skipped: Vec<ConfigError> },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => tracing::info!("Loaded config from {:?}", path),
            ConfigSource::Defaults { skipped } => {
                for error in skipped {
                    tracing::warn!("Skipped config file: {}", error);
                }
                tracing::info!("Using default config with environment overrides");
            }
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Bookcast Configuration
#
# Environment variables override these settings:
# - BOOKCAST_HOST
# - BOOKCAST_PORT
# - BOOKCAST_FEED_URL (also enables the feed)
# - BOOKCAST_FEED_INSTRUMENTS (comma-separated)
# - BOOKCAST_FEED_INTERVAL_MS
# - BOOKCAST_CLIENT_ID / BOOKCAST_CLIENT_SECRET
# - BOOKCAST_LOG_LEVEL
# - BOOKCAST_LOG_FORMAT

[server]
# Listen address; WebSocket clients connect to ws://<host>:<port>/ws
host = "0.0.0.0"
port = 8080

# Largest payload accepted by POST /api/v1/publish (bytes)
max_payload_bytes = 1048576

# How long shutdown waits for connections to close (seconds)
shutdown_timeout_secs = 10

[feed]
# Poll the exchange order book and publish it to subscribers
enabled = false

# Exchange JSON-RPC base URL
base_url = "https://test.deribit.com/api/v2"

# Instruments to poll; each is published with its name as the topic
instruments = ["BTC-PERPETUAL", "ETH-PERPETUAL"]

# Poll interval (ms)
poll_interval_ms = 1000

# Per-request timeout (ms)
request_timeout_ms = 5000

# Optional API credentials
# client_id = ""
# client_secret = ""

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
