//! Service configuration with validation.
//!
//! Defaults come from [`SignalingConfig::default`], an optional JSON file, and
//! then environment overrides, in that order.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Port used when `SSHX_SIGNALING_PORT` is unset
pub const DEFAULT_PORT: u16 = 8080;

/// Pending payloads allowed per key
pub const DEFAULT_SLOT_CAPACITY: usize = 64;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// HTTP listener configuration
    pub http: HttpConfig,
    /// Push/pull deadlines
    pub timeouts: TimeoutConfig,
    /// Slot and request limits
    pub limits: LimitsConfig,
    /// Idle slot eviction
    pub eviction: EvictionConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl SignalingConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.slot_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "slot_capacity cannot be 0".into(),
            ));
        }

        if self.limits.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_payload_bytes cannot be 0".into(),
            ));
        }

        if self.timeouts.pull.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "pull timeout cannot be 0".into(),
            ));
        }

        if self.eviction.enabled && self.eviction.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "eviction sweep_interval cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// HTTP bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Load configuration: defaults, then `SSHX_SIGNALING_CONFIG` (if set), then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("SSHX_SIGNALING_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Environment Variables
    ///
    /// - `SSHX_SIGNALING_HOST`: bind address (default: 0.0.0.0)
    /// - `SSHX_SIGNALING_PORT`: listen port (default: 8080)
    /// - `SSHX_PULL_TIMEOUT`: pull deadline (default: 5s)
    /// - `SSHX_PUSH_TIMEOUT`: wait for space in a full slot (default: 10s)
    /// - `SSHX_SLOT_IDLE_TTL`: idle time before an empty slot is evicted (default: 300s)
    /// - `SSHX_LOG_LEVEL` or `RUST_LOG`: log filter (default: info)
    /// - `SSHX_JSON_LOGS`: JSON formatted logs (default: false)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SSHX_SIGNALING_HOST") {
            self.http.host = host
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SSHX_SIGNALING_HOST={}", host)))?;
        }

        if let Some(port) = lookup("SSHX_SIGNALING_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SSHX_SIGNALING_PORT={}", port)))?;
        }

        if let Some(value) = lookup("SSHX_PULL_TIMEOUT") {
            self.timeouts.pull = parse_env_duration("SSHX_PULL_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("SSHX_PUSH_TIMEOUT") {
            self.timeouts.push = parse_env_duration("SSHX_PUSH_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("SSHX_SLOT_IDLE_TTL") {
            self.eviction.idle_ttl = parse_env_duration("SSHX_SLOT_IDLE_TTL", &value)?;
        }

        if let Some(level) = lookup("SSHX_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            self.logging.level = level;
        }
        if let Some(json) = lookup("SSHX_JSON_LOGS") {
            self.logging.json = json.eq_ignore_ascii_case("true") || json == "1";
        }

        Ok(())
    }
}

fn parse_env_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::parse_duration(value).map_err(|e| {
        warn!(variable = name, value = value, "Rejecting duration override");
        ConfigError::InvalidTimeout(format!("{}={}: {}", name, value, e))
    })
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/// Push/pull deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a pull waits for a payload
    #[serde(with = "humantime_serde")]
    pub pull: Duration,
    /// How long a push waits for space in a full slot before it is rejected
    #[serde(with = "humantime_serde")]
    pub push: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            pull: Duration::from_secs(5),
            push: Duration::from_secs(10),
        }
    }
}

/// Slot and request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Pending payloads per key (default: 64)
    pub slot_capacity: usize,
    /// Max push body size in bytes (default: 64KB)
    pub max_payload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_payload_bytes: 64 * 1024,
        }
    }
}

/// Idle slot eviction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Run the background sweep
    pub enabled: bool,
    /// Empty, unleased slots idle longer than this are removed
    #[serde(with = "humantime_serde")]
    pub idle_ttl: Duration,
    /// Sweep period
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as `"5s"`, `"250ms"`, `"2m"` or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
