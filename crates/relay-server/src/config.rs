//! Broker configuration with validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Endpoint listener configuration (client traffic)
    pub endpoint: ListenerConfig,
    /// Auth listener configuration (auth-service traffic, localhost only by default)
    pub auth: ListenerConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: ListenerConfig::endpoint_default(),
            auth: ListenerConfig::auth_default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Build configuration from defaults plus environment overrides.
    ///
    /// A variable that is present but unparsable is an error, not a
    /// silent fallback to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = read_env("RELAY_ENDPOINT_PORT")? {
            config.endpoint.port = port;
        }
        if let Some(port) = read_env("RELAY_AUTH_PORT")? {
            config.auth.port = port;
        }
        if let Some(host) = read_env("RELAY_ENDPOINT_HOST")? {
            config.endpoint.host = host;
        }
        if let Some(host) = read_env("RELAY_AUTH_HOST")? {
            config.auth.host = host;
        }
        if let Some(max) = read_env("RELAY_MAX_CONNECTIONS")? {
            config.endpoint.max_connections = max;
        }
        if let Some(max) = read_env("RELAY_MAX_AUTH_CONNECTIONS")? {
            config.auth.max_connections = max;
        }
        if let Some(ms) = read_env::<u64>("RELAY_AUTH_TIMEOUT_MS")? {
            config.timeouts.auth = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>("RELAY_SHUTDOWN_DRAIN_MS")? {
            config.timeouts.shutdown_drain = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ports = [self.endpoint.port, self.auth.port];
        let unique_ports: HashSet<_> = ports.iter().collect();
        if unique_ports.len() != ports.len() {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.endpoint.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "endpoint max_connections cannot be 0".into(),
            ));
        }

        if self.auth.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "auth max_connections cannot be 0".into(),
            ));
        }

        if self.timeouts.auth.as_millis() == 0 {
            return Err(ConfigError::InvalidTimeout(
                "auth timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get endpoint listener bind address
    pub fn endpoint_addr(&self) -> SocketAddr {
        SocketAddr::new(self.endpoint.host, self.endpoint.port)
    }

    /// Get auth listener bind address
    pub fn auth_addr(&self) -> SocketAddr {
        SocketAddr::new(self.auth.host, self.auth.port)
    }
}

/// Single WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port
    pub port: u16,
    /// Maximum concurrent sessions; further upgrades are refused
    pub max_connections: usize,
}

impl ListenerConfig {
    fn endpoint_default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            max_connections: 10,
        }
    }

    fn auth_default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9092,
            max_connections: 1,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::endpoint_default()
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a delegated login may take before the broker gives up
    #[serde(rename = "auth_ms", with = "duration_ms")]
    pub auth: Duration,
    /// How long client-side response registrations live before expiry
    #[serde(rename = "response_ttl_ms", with = "duration_ms")]
    pub response_ttl: Duration,
    /// Pause between signaling shutdown and dropping the listeners
    #[serde(rename = "shutdown_drain_ms", with = "duration_ms")]
    pub shutdown_drain: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            auth: Duration::from_secs(30),
            response_ttl: Duration::from_secs(30),
            shutdown_drain: Duration::from_secs(2),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Both listeners using the same port
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Unparsable environment override
    #[error("invalid value for {variable}: {value}")]
    InvalidEnv { variable: String, value: String },
}

fn read_env<T: std::str::FromStr>(variable: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(variable) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                variable: variable.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Timeouts serialize as integer milliseconds, matching the `_MS` env knobs.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
