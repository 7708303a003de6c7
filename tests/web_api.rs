// HTTP API against a machine running on its own thread with a simulated board.

mod common;

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use wirebend_rs::web::api::create_router;
use wirebend_rs::{FIRMWARE_VERSION, FileStore, MachineRequest};

use common::{rig, test_config};

/// Router wired to a running machine. The machine thread exits once the router is dropped.
fn app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel::<MachineRequest>(16);
    let rig = rig(&test_config());
    let machine = rig
        .machine
        .with_store(Box::new(FileStore::new(dir.path().join("state.toml"))))
        .with_requests(rx);
    std::thread::spawn(move || machine.run());
    (create_router(tx), dir)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, text) = call_raw(app, method, uri, body).await;
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, value)
}

async fn call_raw(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Poll the status route until `done` holds for it.
async fn wait_for(app: &Router, done: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..500 {
        let (status, body) = call(app, "GET", "/api/v1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        if done(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("machine never reached the expected state");
}

#[tokio::test]
async fn status_reports_version_and_ready() {
    let (app, _dir) = app();
    let body = wait_for(&app, |s| s["indicator"] == "ready").await;
    assert_eq!(body["version"], FIRMWARE_VERSION);
    assert_eq!(body["queue_len"], 0);
    assert_eq!(body["x_feedrate"], 1000);
    assert_eq!(body["soft_limits"], json!({ "low": 0, "high": 360 }));
}

#[tokio::test]
async fn buffer_is_queued_and_executed() {
    let (app, _dir) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/buffer",
        Some(json!({ "buffer": " (2)F1500,X5 " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], "(2)F1500,X5");
    assert_eq!(body["queued"], 4);

    let body = wait_for(&app, |s| s["dispatched"] == 4 && s["queue_len"] == 0).await;
    assert_eq!(body["x_feedrate"], 1500);
    assert_eq!(body["saved_buffer"], "(2)F1500,X5");

    let (status, body) = call(&app, "POST", "/api/v1/buffer/replay", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Saved buffer queued (4 commands)");
    wait_for(&app, |s| s["dispatched"] == 8).await;
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let (app, _dir) = app();
    let (status, body) = call(&app, "POST", "/api/v1/buffer", Some(json!({ "buffer": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Command buffer cannot be empty");

    let (status, _) = call(&app, "POST", "/api/v1/command", Some(json!({ "command": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_command_updates_settings() {
    let (app, _dir) = app();
    let (status, body) = call(&app, "POST", "/api/v1/command", Some(json!({ "command": "G2500" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], 1);
    let body = wait_for(&app, |s| s["dispatched"] == 1).await;
    assert_eq!(body["z_feedrate"], 2500);
    assert_eq!(body["saved_buffer"], "");
}

#[tokio::test]
async fn replay_without_a_buffer_is_a_bad_request() {
    let (app, _dir) = app();
    let (status, body) = call(&app, "POST", "/api/v1/buffer/replay", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No saved buffer to replay");
}

#[tokio::test]
async fn load_wire_uses_the_offset() {
    let (app, _dir) = app();
    let (status, body) = call(&app, "POST", "/api/v1/load-wire", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "X-1000");

    call(&app, "POST", "/api/v1/command", Some(json!({ "command": "H0" }))).await;
    wait_for(&app, |s| s["load_offset"] == 0).await;
    let (status, body) = call(&app, "POST", "/api/v1/load-wire", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Load offset is not set");
}

#[tokio::test]
async fn config_file_lifecycle() {
    let (app, _dir) = app();
    let (status, body) = call(&app, "GET", "/api/v1/config", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Config file not found.");

    call(&app, "POST", "/api/v1/command", Some(json!({ "command": "F1750" }))).await;
    wait_for(&app, |s| s["x_feedrate"] == 1750).await;

    let (status, body) = call(&app, "POST", "/api/v1/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Values saved successfully.");

    let (status, text) = call_raw(&app, "GET", "/api/v1/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("x_feedrate = 1750"));

    let (status, body) = call(&app, "DELETE", "/api/v1/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Config file deleted.");
    let (_, body) = call(&app, "DELETE", "/api/v1/config", None).await;
    assert_eq!(body["message"], "Config file does not exist.");
}

#[tokio::test]
async fn stopped_machine_is_reported() {
    let (tx, rx) = mpsc::channel::<MachineRequest>(4);
    drop(rx);
    let app = create_router(tx);

    let (status, _) = call(&app, "GET", "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = call(&app, "POST", "/api/v1/command", Some(json!({ "command": "X1" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().starts_with("Input ignored"));
}

#[tokio::test]
async fn oversized_repeat_group_is_queued_once() {
    let (app, _dir) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/buffer",
        Some(json!({ "buffer": "(4294967295)X1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], 1);
    wait_for(&app, |s| s["dispatched"] == 1).await;
}
