//! Runtime parameters for the network-backed connect policies.
//!
//! Which policy a client uses is fixed at compile time by its
//! [`Profile`](crate::Profile); these structs only carry addresses, timeouts
//! and pool sizes. They deserialize from TOML:
//!
//! ```
//! use memcache_policy::config::PoolConfig;
//!
//! let config = PoolConfig::from_toml_str(r#"
//!     max_idle = 8
//!
//!     [endpoint]
//!     server = "10.0.0.5:11211"
//!     connect_timeout_ms = 250
//! "#).unwrap();
//! assert_eq!(config.max_idle, 8);
//! assert_eq!(config.endpoint.io_timeout_ms, 0);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Where and how to dial one memcache server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// `host:port` of the server.
    pub server: String,
    /// Connect timeout in milliseconds. 0 means no timeout.
    pub connect_timeout_ms: u64,
    /// Read/write timeout in milliseconds. 0 means no timeout.
    pub io_timeout_ms: u64,
    /// Enable TCP_NODELAY on dialed sockets.
    pub tcp_nodelay: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:11211".to_string(),
            connect_timeout_ms: 1000,
            io_timeout_ms: 0,
            tcp_nodelay: true,
        }
    }
}

impl EndpointConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Invalid("server must not be empty"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        millis(self.io_timeout_ms)
    }
}

/// Configuration for a [`Pooled`](crate::connect::Pooled) connect policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub endpoint: EndpointConfig,
    /// Idle endpoints kept for reuse. Releases beyond this are closed.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            max_idle: 4,
        }
    }
}

impl PoolConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.endpoint.validate()?;
        Ok(config)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.endpoint.server, "127.0.0.1:11211");
        assert_eq!(config.endpoint.connect_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.endpoint.io_timeout(), None);
        assert_eq!(config.max_idle, 4);
    }

    #[test]
    fn test_endpoint_from_toml() {
        let config = EndpointConfig::from_toml_str(
            r#"
            server = "cache:11211"
            io_timeout_ms = 50
            tcp_nodelay = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server, "cache:11211");
        assert_eq!(config.io_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.connect_timeout_ms, 1000);
        assert!(!config.tcp_nodelay);
    }

    #[test]
    fn test_rejects_unknown_fields_and_empty_server() {
        assert!(matches!(
            EndpointConfig::from_toml_str("sever = \"typo\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EndpointConfig::from_toml_str("server = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PoolConfig::from_toml_str("max_idle = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
