//! Configuration structures for the Modbus slave.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.
//! Memory-bank capacities are fixed in source and have no config entry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Lowest valid slave identifier.
pub const MIN_SLAVE_ID: u8 = 1;

/// Highest valid slave identifier.
pub const MAX_SLAVE_ID: u8 = 247;

/// Top-level slave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unit identifier this slave answers to (1-247).
    pub slave_id: u8,

    /// Emit human-readable request/response traces.
    pub debug: bool,

    /// Trace sink configuration.
    pub trace: TraceConfig,

    /// Modbus TCP listener; `None` disables it.
    pub tcp: Option<TcpConfig>,

    /// Modbus RTU serial listener; `None` disables it.
    pub rtu: Option<RtuConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            slave_id: 1,
            debug: false,
            trace: TraceConfig::default(),
            tcp: None,
            rtu: None,
        }
    }
}

/// Trace sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Bounded queue length; lines are dropped once it is full.
    pub capacity: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Modbus TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Listen address (host:port).
    pub address: String,

    /// Socket read timeout, also the interval at which readers notice shutdown.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:502"),
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit.
    None,
    /// Odd parity.
    Odd,
    /// Even parity (Modbus RTU default).
    #[default]
    Even,
}

/// Modbus RTU serial listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuConfig {
    /// Serial device path (e.g., "/dev/ttyUSB0", "COM3").
    pub port: String,

    /// Line speed in baud.
    pub baud_rate: u32,

    /// Data bits per character (5-8).
    pub data_bits: u8,

    /// Parity setting.
    pub parity: Parity,

    /// Stop bits (1 or 2).
    pub stop_bits: u8,

    /// Line silence that terminates a frame of unknown length.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyUSB0"),
            baud_rate: 19200,
            data_bits: 8,
            parity: Parity::Even,
            stop_bits: 1,
            timeout: Duration::from_millis(50),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&self.slave_id) {
            return Err(ConfigError::Invalid(format!(
                "slave_id {} outside {MIN_SLAVE_ID}..={MAX_SLAVE_ID}",
                self.slave_id
            )));
        }
        if self.trace.capacity == 0 {
            return Err(ConfigError::Invalid("trace.capacity must be non-zero".into()));
        }
        if let Some(rtu) = &self.rtu {
            if !(5..=8).contains(&rtu.data_bits) {
                return Err(ConfigError::Invalid(format!(
                    "rtu.data_bits {} outside 5..=8",
                    rtu.data_bits
                )));
            }
            if !matches!(rtu.stop_bits, 1 | 2) {
                return Err(ConfigError::Invalid(format!(
                    "rtu.stop_bits {} must be 1 or 2",
                    rtu.stop_bits
                )));
            }
            if rtu.baud_rate == 0 {
                return Err(ConfigError::Invalid("rtu.baud_rate must be non-zero".into()));
            }
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.slave_id, 1);
        assert!(!config.debug);
        assert!(config.tcp.is_none());
        assert!(config.rtu.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            slave_id = 17
            debug = true

            [trace]
            capacity = 64

            [tcp]
            address = "127.0.0.1:1502"
            read_timeout = "250ms"

            [rtu]
            port = "/dev/ttyS1"
            baud_rate = 9600
            parity = "none"
            stop_bits = 2
        "#;

        let config = ServerConfig::from_toml(toml).unwrap();
        assert_eq!(config.slave_id, 17);
        assert!(config.debug);
        assert_eq!(config.trace.capacity, 64);

        let tcp = config.tcp.as_ref().unwrap();
        assert_eq!(tcp.address, "127.0.0.1:1502");
        assert_eq!(tcp.read_timeout, Duration::from_millis(250));

        let rtu = config.rtu.as_ref().unwrap();
        assert_eq!(rtu.port, "/dev/ttyS1");
        assert_eq!(rtu.baud_rate, 9600);
        assert_eq!(rtu.parity, Parity::None);
        assert_eq!(rtu.stop_bits, 2);
        // Unspecified fields fall back to defaults
        assert_eq!(rtu.data_bits, 8);
        assert_eq!(rtu.timeout, Duration::from_millis(50));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = ServerConfig::default();
        config.tcp = Some(TcpConfig::default());
        let toml = config.to_toml().unwrap();
        let parsed = ServerConfig::from_toml(&toml).unwrap();
        assert_eq!(config.slave_id, parsed.slave_id);
        assert_eq!(
            parsed.tcp.unwrap().read_timeout,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_validate_slave_id_range() {
        let mut config = ServerConfig::default();

        config.slave_id = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.slave_id = 248;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.slave_id = 247;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rtu_settings() {
        let mut config = ServerConfig::default();
        config.rtu = Some(RtuConfig {
            stop_bits: 3,
            ..RtuConfig::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stop_bits"));

        config.rtu = Some(RtuConfig {
            data_bits: 9,
            ..RtuConfig::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("data_bits"));
    }

    #[test]
    fn test_parity_names() {
        let parity: Parity = serde_json::from_str("\"odd\"").unwrap();
        assert_eq!(parity, Parity::Odd);
        assert_eq!(serde_json::to_string(&Parity::Even).unwrap(), "\"even\"");
    }

    #[test]
    fn test_zero_trace_capacity_rejected() {
        let mut config = ServerConfig::default();
        config.trace.capacity = 0;
        assert!(config.validate().is_err());
    }
}
