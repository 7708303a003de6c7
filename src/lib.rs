//! Command execution core for a two-axis stepper + servo wire bender.
//!
//! Text arrives from a transport, is split into tokens, queued, and executed one command
//! at a time against the actuators while a status light reports progress.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod hardware;
pub mod machine;
pub mod motion;
pub mod persistence;
pub mod status;
pub mod transport;
pub mod web;

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use command::{Command, CommandError, CommandQueue, CommandToken, StreamAssembler, tokenize};
pub use config::{Config, ConfigError, load_config, load_config_or_default};
pub use dispatcher::{AxisConfig, Dispatcher, GlobalParameters, MachineState, Outcome};
pub use machine::{Machine, MachineError, MachineRequest, MachineStatus};
pub use persistence::{FileStore, PersistedSettings, PersistenceError, SettingsStore};
pub use status::{IndicatorState, StatusIndicator};
