//! # Machine Configuration
//!
//! Startup configuration for the bender host. Every field has a serde default, so an empty
//! file (or no file at all) yields a working machine.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [machine]
//! x_feedrate = 1500
//! z_feedrate = 1200
//! load_offset = -1000
//! servo_min_angle = 170
//! servo_max_angle = 345
//!
//! [indicator]
//! blink_interval_ms = 150
//! blink_toggles = 6
//!
//! [transport]
//! serial_port = "/dev/ttyUSB0"
//! http_bind = "0.0.0.0:8080"
//! ```
//!
//! Values persisted by the settings store (feedrates, offsets, delays) override the `[machine]`
//! section at startup; see `src/persistence.rs`.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the machine, status indicator, transports and storage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Motion defaults. These seed `AxisConfig` and `GlobalParameters`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default = "default_feedrate")]
    pub x_feedrate: u32,
    #[serde(default = "default_feedrate")]
    pub z_feedrate: u32,
    #[serde(default = "default_load_offset")]
    pub load_offset: i32,
    #[serde(default)]
    pub settle_delay_ms: u32,
    #[serde(default = "default_servo_settle_ms")]
    pub servo_settle_ms: u32,
    #[serde(default)]
    pub servo_min_angle: i32,
    #[serde(default = "default_servo_max_angle")]
    pub servo_max_angle: i32,
    /// Control byte that acts as the emergency stop opcode (ASCII ETX by default).
    #[serde(default = "default_abort_code")]
    pub abort_code: u8,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            x_feedrate: default_feedrate(),
            z_feedrate: default_feedrate(),
            load_offset: default_load_offset(),
            settle_delay_ms: 0,
            servo_settle_ms: default_servo_settle_ms(),
            servo_min_angle: 0,
            servo_max_angle: default_servo_max_angle(),
            abort_code: default_abort_code(),
        }
    }
}

/// Blink timing for the status light.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_blink_interval_ms")]
    pub blink_interval_ms: u32,
    #[serde(default = "default_blink_toggles")]
    pub blink_toggles: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            blink_interval_ms: default_blink_interval_ms(),
            blink_toggles: default_blink_toggles(),
        }
    }
}

/// Ingestion transports.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Serial device to read commands from. Standard input is used when unset.
    #[serde(default)]
    pub serial_port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Silence after which an unterminated streamed command is flushed.
    #[serde(default = "default_flush_idle_ms")]
    pub flush_idle_ms: u64,
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud: default_baud(),
            flush_idle_ms: default_flush_idle_ms(),
            http_bind: default_http_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Reject values the machine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.machine;
        if m.x_feedrate == 0 || m.z_feedrate == 0 {
            return Err(ConfigError::Invalid("feedrates must be > 0".to_string()));
        }
        if !(0..=360).contains(&m.servo_min_angle) || !(0..=360).contains(&m.servo_max_angle) {
            return Err(ConfigError::Invalid(
                "servo soft limits must lie within 0..=360".to_string(),
            ));
        }
        if m.servo_min_angle > m.servo_max_angle {
            return Err(ConfigError::Invalid(format!(
                "servo_min_angle {} is above servo_max_angle {}",
                m.servo_min_angle, m.servo_max_angle
            )));
        }
        if self.transport.flush_idle_ms == 0 {
            return Err(ConfigError::Invalid("flush_idle_ms must be > 0".to_string()));
        }
        if self.indicator.blink_interval_ms == 0 {
            return Err(ConfigError::Invalid("blink_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

// Default value functions
fn default_feedrate() -> u32 { 1000 }
fn default_load_offset() -> i32 { -1000 }
fn default_servo_settle_ms() -> u32 { 20 }
fn default_servo_max_angle() -> i32 { 360 }
fn default_abort_code() -> u8 { 0x03 }
fn default_blink_interval_ms() -> u32 { 150 }
fn default_blink_toggles() -> u32 { 6 }
fn default_baud() -> u32 { 115200 }
fn default_flush_idle_ms() -> u64 { 50 }
fn default_http_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_storage_path() -> PathBuf { PathBuf::from("bender_state.toml") }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            return Err(ConfigError::Io(e));
        }
    };
    let config: Config = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file falls back to defaults.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("Config file '{}' not found, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.machine.x_feedrate, 1000);
        assert_eq!(config.machine.load_offset, -1000);
        assert_eq!(config.machine.abort_code, 0x03);
        assert_eq!(config.indicator.blink_toggles, 6);
        assert!(config.transport.serial_port.is_none());
        assert_eq!(config.transport.flush_idle_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            "[machine]\nx_feedrate = 1500\nservo_min_angle = 170\nservo_max_angle = 345\n",
        )
        .unwrap();
        assert_eq!(config.machine.x_feedrate, 1500);
        assert_eq!(config.machine.z_feedrate, 1000);
        assert_eq!(config.machine.servo_min_angle, 170);
        assert_eq!(config.machine.servo_settle_ms, 20);
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let mut config = Config::default();
        config.machine.servo_min_angle = 300;
        config.machine.servo_max_angle = 200;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.machine.servo_min_angle = 0;
        config.machine.servo_max_angle = 400;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_feedrate() {
        let mut config = Config::default();
        config.machine.z_feedrate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config_or_default("/nonexistent/bender.toml").unwrap();
        assert_eq!(config.machine.x_feedrate, 1000);
    }
}
