//! The web module for handling the Axum API.
//! Handlers never touch machine state; they send `MachineRequest`s to the machine task.

pub mod api;
pub mod models;
