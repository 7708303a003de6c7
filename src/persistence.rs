// src/persistence.rs - Best-effort settings file
//!
//! Feedrates, offsets, delays and the last program buffer survive a restart through a
//! small TOML file. Every field is optional on load; anything missing or invalid keeps the
//! running value. Writes are plain overwrites with no journaling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::dispatcher::MachineState;
use crate::motion::servo::SoftLimits;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Settings storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("Settings file is corrupt: {0}")]
    Corrupt(#[from] toml::de::Error),
    #[error("Failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// On-disk snapshot of the machine's tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub x_feedrate: Option<u32>,
    #[serde(default)]
    pub z_feedrate: Option<u32>,
    #[serde(default)]
    pub load_offset: Option<i32>,
    #[serde(default)]
    pub settle_delay_ms: Option<u32>,
    #[serde(default)]
    pub servo_settle_ms: Option<u32>,
    #[serde(default)]
    pub saved_buffer: Option<String>,
    // Kept last: TOML writes tables after plain values.
    #[serde(default)]
    pub soft_limits: Option<SoftLimits>,
}

impl PersistedSettings {
    pub fn capture(state: &MachineState, saved_buffer: &str) -> Self {
        Self {
            x_feedrate: Some(state.x.feedrate),
            z_feedrate: Some(state.z.feedrate),
            load_offset: Some(state.globals.load_offset),
            settle_delay_ms: Some(state.globals.settle_delay_ms),
            servo_settle_ms: Some(state.globals.servo_settle_ms),
            saved_buffer: Some(saved_buffer.to_string()),
            soft_limits: Some(state.globals.soft_limits),
        }
    }

    /// Overlay the stored values onto `state`, skipping any that would be invalid.
    pub fn apply_to(&self, state: &mut MachineState) {
        match self.x_feedrate {
            Some(0) => tracing::warn!("Ignoring stored X feedrate of 0"),
            Some(rate) => state.x.feedrate = rate,
            None => {}
        }
        match self.z_feedrate {
            Some(0) => tracing::warn!("Ignoring stored Z feedrate of 0"),
            Some(rate) => state.z.feedrate = rate,
            None => {}
        }
        if let Some(offset) = self.load_offset {
            state.globals.load_offset = offset;
        }
        if let Some(delay) = self.settle_delay_ms {
            state.globals.settle_delay_ms = delay;
        }
        if let Some(delay) = self.servo_settle_ms {
            state.globals.servo_settle_ms = delay;
        }
        if let Some(limits) = self.soft_limits {
            if limits.is_valid() {
                state.globals.soft_limits = limits;
            } else {
                tracing::warn!("Ignoring stored soft limits [{}, {}]", limits.low, limits.high);
            }
        }
    }
}

/// The persistence collaborator. All operations are fallible and never retried.
pub trait SettingsStore: Send {
    fn load(&self) -> Result<PersistedSettings, PersistenceError>;
    fn save(&self, settings: &PersistedSettings) -> Result<(), PersistenceError>;
    /// Remove the stored file. `Ok(false)` when there was nothing to remove.
    fn delete(&self) -> Result<bool, PersistenceError>;
    /// Stored text as-is, `None` when nothing is stored.
    fn raw(&self) -> Result<Option<String>, PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> Result<PersistedSettings, PersistenceError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let settings = toml::from_str(&contents)?;
        tracing::info!("Values loaded from {}", self.path.display());
        Ok(settings)
    }

    fn save(&self, settings: &PersistedSettings) -> Result<(), PersistenceError> {
        let contents = toml::to_string(settings)?;
        std::fs::write(&self.path, contents)?;
        tracing::info!("Values saved to {}", self.path.display());
        Ok(())
    }

    fn delete(&self) -> Result<bool, PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Deleted {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn raw(&self) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
