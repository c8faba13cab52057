//! Integration tests for IPC command dispatch and authentication.
//!
//! Validates:
//! - `fleet` returns `null` before the first tick, then the summary
//! - `projects` lists the store and `sessions` lists prefixed sessions
//! - `stop` moves a project to `Stopping` and the next tick tears it down
//! - Unknown commands, missing ids and bad tokens are rejected

use std::sync::Arc;
use std::time::Duration;

use hub_orchestrator::backend::SessionBackend;
use hub_orchestrator::ipc::server::{dispatch_command, IpcRequest, IpcState};
use hub_orchestrator::models::project::ProjectStatus;
use hub_orchestrator::store::StateStore;

use super::test_helpers::{project, session_of, Harness};

fn ipc_state(h: &Harness, auth_token: Option<&str>) -> IpcState {
    IpcState {
        store: Arc::clone(&h.store) as Arc<dyn StateStore>,
        backend: Arc::clone(&h.backend) as Arc<dyn SessionBackend>,
        summary: h.cycle.summary_handle(),
        auth_token: auth_token.map(str::to_owned),
        session_prefix: "proj-".into(),
        call_timeout: Duration::from_secs(5),
    }
}

fn request(command: &str) -> IpcRequest {
    IpcRequest {
        command: command.into(),
        ..IpcRequest::default()
    }
}

// ── fleet ────────────────────────────────────────────────

#[tokio::test]
async fn fleet_before_and_after_first_tick() {
    let mut h = Harness::new(&[project("app", ProjectStatus::Running)]).await;
    let state = ipc_state(&h, None);

    let before = dispatch_command(&request("fleet"), &state).await;
    assert!(before.ok);
    assert_eq!(before.data, Some(serde_json::Value::Null));

    h.tick().await;
    let after = dispatch_command(&request("fleet"), &state).await;
    assert!(after.ok);
    let data = after.data.expect("summary payload");
    assert_eq!(data["tick"], 1);
    assert_eq!(data["projects_seen"], 1);
}

// ── projects / sessions ──────────────────────────────────

#[tokio::test]
async fn projects_lists_every_status() {
    let h = Harness::new(&[
        project("api", ProjectStatus::Running),
        project("docs", ProjectStatus::Stopped),
    ])
    .await;
    let state = ipc_state(&h, None);

    let resp = dispatch_command(&request("projects"), &state).await;
    assert!(resp.ok);
    let projects = resp.data.expect("data")["projects"]
        .as_array()
        .cloned()
        .expect("array");
    assert_eq!(projects.len(), 2);
}

#[tokio::test]
async fn sessions_lists_only_project_sessions() {
    let h = Harness::new(&[]).await;
    h.backend.add_session(&session_of("api"));
    h.backend.add_session("pm-api");
    h.backend.add_session("scratch");
    let state = ipc_state(&h, None);

    let resp = dispatch_command(&request("sessions"), &state).await;
    assert!(resp.ok);
    assert_eq!(
        resp.data.expect("data")["sessions"],
        serde_json::json!([session_of("api")])
    );
}

// ── stop ─────────────────────────────────────────────────

#[tokio::test]
async fn stop_requests_teardown_on_next_tick() {
    let app = project("app", ProjectStatus::Running);
    let mut h = Harness::new(std::slice::from_ref(&app)).await;
    h.backend.add_session(&session_of("app"));
    let state = ipc_state(&h, None);

    let resp = dispatch_command(
        &IpcRequest {
            command: "stop".into(),
            id: Some(app.id.clone()),
            auth_token: None,
        },
        &state,
    )
    .await;
    assert!(resp.ok, "stop failed: {:?}", resp.error);
    assert_eq!(resp.data.expect("data")["status"], "stopping");
    assert_eq!(h.status_of(&app.id).await, ProjectStatus::Stopping);

    h.tick().await;
    assert_eq!(h.status_of(&app.id).await, ProjectStatus::Stopped);
    assert!(!h.backend.has_session(&session_of("app")));
}

#[tokio::test]
async fn stop_without_id_is_rejected() {
    let h = Harness::new(&[]).await;
    let state = ipc_state(&h, None);

    let resp = dispatch_command(&request("stop"), &state).await;
    assert!(!resp.ok);
    assert_eq!(resp.error.as_deref(), Some("missing required 'id' field"));
}

#[tokio::test]
async fn stop_unknown_project_is_not_found() {
    let h = Harness::new(&[]).await;
    let state = ipc_state(&h, None);

    let resp = dispatch_command(
        &IpcRequest {
            command: "stop".into(),
            id: Some("ghost".into()),
            auth_token: None,
        },
        &state,
    )
    .await;
    assert!(!resp.ok);
    assert!(resp.error.expect("error").starts_with("not found"));
}

#[tokio::test]
async fn stop_of_stopped_project_is_invalid() {
    let done = project("done", ProjectStatus::Stopped);
    let h = Harness::new(std::slice::from_ref(&done)).await;
    let state = ipc_state(&h, None);

    let resp = dispatch_command(
        &IpcRequest {
            command: "stop".into(),
            id: Some(done.id.clone()),
            auth_token: None,
        },
        &state,
    )
    .await;
    assert!(!resp.ok);
    assert!(resp.error.expect("error").starts_with("invalid transition"));
    assert_eq!(h.status_of(&done.id).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let h = Harness::new(&[]).await;
    let state = ipc_state(&h, None);

    let resp = dispatch_command(&request("frobnicate"), &state).await;
    assert!(!resp.ok);
    assert_eq!(resp.error.as_deref(), Some("unknown command: frobnicate"));
}

// ── auth ─────────────────────────────────────────────────

#[tokio::test]
async fn auth_token_is_enforced() {
    let h = Harness::new(&[]).await;
    let state = ipc_state(&h, Some("s3cret"));

    let missing = dispatch_command(&request("sessions"), &state).await;
    assert_eq!(missing.error.as_deref(), Some("unauthorized"));

    let wrong = dispatch_command(
        &IpcRequest {
            command: "sessions".into(),
            id: None,
            auth_token: Some("guess".into()),
        },
        &state,
    )
    .await;
    assert_eq!(wrong.error.as_deref(), Some("unauthorized"));

    let valid = dispatch_command(
        &IpcRequest {
            command: "sessions".into(),
            id: None,
            auth_token: Some("s3cret".into()),
        },
        &state,
    )
    .await;
    assert!(valid.ok);
}

#[test]
fn request_parses_from_ctl_json() {
    let request: IpcRequest =
        serde_json::from_str(r#"{"command":"stop","id":"p1","auth_token":"t"}"#).expect("parse");
    assert_eq!(request.command, "stop");
    assert_eq!(request.id.as_deref(), Some("p1"));
    assert_eq!(request.auth_token.as_deref(), Some("t"));
}
