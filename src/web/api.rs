//! Defines the Axum API routes and handlers.

use crate::machine::{MachineError, MachineRequest, MachineStatus};
use crate::web::models::{
    BufferRequest, CommandRequest, ErrorResponse, LoadWireResponse, MessageResponse,
    QueuedResponse,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

pub type AppState = Sender<MachineRequest>;

/// Error returned by every handler: a status code plus `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Machine task is not running")
    }
}

impl From<MachineError> for ApiError {
    fn from(err: MachineError) -> Self {
        let status = match err {
            MachineError::LoadOffsetUnset | MachineError::NoSavedBuffer => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(machine_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/buffer", post(send_buffer))
        .route("/api/v1/buffer/replay", post(replay_buffer))
        .route("/api/v1/command", post(send_command))
        .route("/api/v1/load-wire", post(load_wire))
        .route("/api/v1/save", post(save_values))
        .route("/api/v1/config", get(view_config).delete(delete_config))
        .with_state(machine_tx)
}

/// Send one request and wait for the machine's reply.
async fn ask<T>(
    machine_tx: &AppState,
    request: impl FnOnce(oneshot::Sender<T>) -> MachineRequest,
) -> Result<T, oneshot::error::RecvError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if machine_tx.send(request(resp_tx)).await.is_err() {
        // Dropping the request drops its sender, so the receive below fails.
        tracing::error!("Machine request channel is closed");
    }
    resp_rx.await
}

/// Handler to get the current status of the machine.
async fn get_status(State(machine_tx): State<AppState>) -> Result<Json<MachineStatus>, ApiError> {
    ask(&machine_tx, |respond_to| MachineRequest::Status { respond_to })
        .await
        .map(Json)
        .map_err(|_| ApiError::unavailable())
}

/// Handler to queue a whole command buffer. The buffer is kept as the saved buffer.
async fn send_buffer(
    State(machine_tx): State<AppState>,
    Json(payload): Json<BufferRequest>,
) -> Result<Json<QueuedResponse>, ApiError> {
    let buffer = payload.buffer.trim().to_string();
    if buffer.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Command buffer cannot be empty"));
    }
    let text = buffer.clone();
    let queued = ask(&machine_tx, |respond_to| MachineRequest::Buffer { text, respond_to })
        .await
        .map_err(|_| ignored())?;
    Ok(Json(QueuedResponse {
        received: buffer,
        queued,
    }))
}

/// Handler to queue one command.
async fn send_command(
    State(machine_tx): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> Result<Json<QueuedResponse>, ApiError> {
    let command = payload.command.trim().to_string();
    if command.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Command cannot be empty"));
    }
    let text = command.clone();
    let queued = ask(&machine_tx, |respond_to| MachineRequest::Command { text, respond_to })
        .await
        .map_err(|_| ignored())?;
    Ok(Json(QueuedResponse {
        received: command,
        queued,
    }))
}

async fn replay_buffer(State(machine_tx): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let queued = ask(&machine_tx, |respond_to| MachineRequest::ReplaySaved { respond_to })
        .await
        .map_err(|_| ApiError::unavailable())??;
    Ok(Json(MessageResponse {
        message: format!("Saved buffer queued ({} commands)", queued),
    }))
}

async fn load_wire(State(machine_tx): State<AppState>) -> Result<Json<LoadWireResponse>, ApiError> {
    let command = ask(&machine_tx, |respond_to| MachineRequest::LoadWire { respond_to })
        .await
        .map_err(|_| ApiError::unavailable())??;
    Ok(Json(LoadWireResponse { command }))
}

async fn save_values(State(machine_tx): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    ask(&machine_tx, |respond_to| MachineRequest::Save { respond_to })
        .await
        .map_err(|_| ApiError::unavailable())??;
    Ok(Json(MessageResponse {
        message: "Values saved successfully.".to_string(),
    }))
}

async fn view_config(State(machine_tx): State<AppState>) -> Result<String, ApiError> {
    let contents = ask(&machine_tx, |respond_to| MachineRequest::ReadSettings { respond_to })
        .await
        .map_err(|_| ApiError::unavailable())??;
    contents.ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Config file not found."))
}

async fn delete_config(State(machine_tx): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = ask(&machine_tx, |respond_to| MachineRequest::DeleteSettings { respond_to })
        .await
        .map_err(|_| ApiError::unavailable())??;
    let message = if deleted {
        "Config file deleted."
    } else {
        "Config file does not exist."
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

/// Command text dropped without a reply: the machine was holding a delay, or is gone.
fn ignored() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "Input ignored: machine was busy with a delay or is not running",
    )
}
