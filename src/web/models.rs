//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

/// A whole comma-delimited program, optionally prefixed with `(<repeat>)`.
#[derive(Debug, Deserialize, Serialize)]
pub struct BufferRequest {
    pub buffer: String,
}

/// A single command such as `F1500`.
#[derive(Debug, Deserialize, Serialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Acknowledges text handed to the tokenizer.
#[derive(Debug, Deserialize, Serialize)]
pub struct QueuedResponse {
    pub received: String,
    pub queued: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoadWireResponse {
    pub command: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
