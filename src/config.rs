//! Session configuration
//!
//! All fields have defaults matching the drone's access-point network, so an
//! empty YAML document (or [`SessionConfig::default`]) is a working setup.
//!
//! ```rust
//! use tellolink::SessionConfig;
//!
//! let yaml = "response_timeout_ms: 5000\nserialize_commands: true\n";
//! let config = SessionConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.response_timeout().as_secs(), 5);
//! assert_eq!(config.telemetry_capacity, 100);
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::history::{DEFAULT_CAPACITY, DEFAULT_VIDEO_CAPACITY};
use crate::{Result, TelloError};

/// Settings for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Where commands are sent
    pub drone_addr: SocketAddr,
    /// Local bind address for commands, replies and telemetry
    pub local_addr: SocketAddr,
    /// Local address the video stream arrives on
    pub video_addr: SocketAddr,
    /// Age after which a response reports `is_timeout`
    pub response_timeout_ms: u64,
    pub response_capacity: usize,
    pub telemetry_capacity: usize,
    pub video_capacity: usize,
    /// Hold each command until the previous one completed or timed out
    pub serialize_commands: bool,
    /// Consecutive receive errors before a loop gives up
    pub max_consecutive_errors: u32,
    pub recv_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drone_addr: SocketAddr::from(([192, 168, 10, 1], 8889)),
            local_addr: SocketAddr::from(([0, 0, 0, 0], 8890)),
            video_addr: SocketAddr::from(([0, 0, 0, 0], 11111)),
            response_timeout_ms: 15_000,
            response_capacity: DEFAULT_CAPACITY,
            telemetry_capacity: DEFAULT_CAPACITY,
            video_capacity: DEFAULT_VIDEO_CAPACITY,
            serialize_commands: false,
            max_consecutive_errors: 10,
            recv_buffer_size: 2048,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| {
            TelloError::config_error_with_source("Failed to parse configuration", Box::new(e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading session configuration");
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TelloError::config_error_with_source(
                format!("Cannot read {}", path.display()),
                Box::new(e),
            )
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| {
            TelloError::config_error_with_source("Failed to serialize configuration", Box::new(e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(TelloError::config_error("response_timeout_ms must be non-zero"));
        }
        for (name, capacity) in [
            ("response_capacity", self.response_capacity),
            ("telemetry_capacity", self.telemetry_capacity),
            ("video_capacity", self.video_capacity),
            ("recv_buffer_size", self.recv_buffer_size),
        ] {
            if capacity == 0 {
                return Err(TelloError::config_error(format!("{} must be non-zero", name)));
            }
        }
        if self.max_consecutive_errors == 0 {
            return Err(TelloError::config_error("max_consecutive_errors must be non-zero"));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_access_point_network() {
        let config = SessionConfig::default();
        assert_eq!(config.drone_addr.to_string(), "192.168.10.1:8889");
        assert_eq!(config.local_addr.port(), 8890);
        assert_eq!(config.video_addr.port(), 11111);
        assert_eq!(config.response_timeout(), Duration::from_secs(15));
        assert_eq!(config.video_capacity, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(SessionConfig::from_yaml_str("{}").unwrap(), SessionConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let yaml = "drone_addr: 10.0.0.5:8889\ntelemetry_capacity: 20\nserialize_commands: true\n";
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.drone_addr.to_string(), "10.0.0.5:8889");
        assert_eq!(config.telemetry_capacity, 20);
        assert!(config.serialize_commands);
        assert_eq!(config.response_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = SessionConfig::from_yaml_str("video_capacity: 0").unwrap_err();
        assert!(err.to_string().contains("video_capacity"));

        let err = SessionConfig::from_yaml_str("unknown_key: 1").unwrap_err();
        assert!(matches!(err, TelloError::Config { source: Some(_), .. }));
    }

    #[test]
    fn yaml_roundtrip_preserves_settings() {
        let config = SessionConfig { serialize_commands: true, ..SessionConfig::default() };
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(SessionConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = SessionConfig::load("/nonexistent/tellolink.yaml").unwrap_err();
        assert!(matches!(err, TelloError::Config { .. }));
    }
}
