//! Local IPC server for `hub-orchestrator-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and answers each with one JSON line.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "fleet"}
//! {"command": "projects"}
//! {"command": "sessions"}
//! {"command": "stop", "id": "project-id"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "not found"}
//! ```

use std::sync::Arc;
use std::time::Duration;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::backend::SessionBackend;
use crate::models::project::{ProjectStatus, ProjectUpdate};
use crate::orchestrator::bounded;
use crate::orchestrator::lifecycle;
use crate::orchestrator::summary::SummaryHandle;
use crate::store::StateStore;
use crate::{AppError, Result};

/// Everything the IPC commands need from the daemon.
pub struct IpcState {
    /// Project store.
    pub store: Arc<dyn StateStore>,
    /// Session backend, for listing live sessions.
    pub backend: Arc<dyn SessionBackend>,
    /// Latest fleet summary.
    pub summary: SummaryHandle,
    /// Shared secret required on every request, if set.
    pub auth_token: Option<String>,
    /// Prefix of project session names.
    pub session_prefix: String,
    /// Upper bound for store and backend calls.
    pub call_timeout: Duration,
}

/// Inbound IPC request from `hub-orchestrator-ctl`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Project identifier (for `stop`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Shared-secret authentication token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Outbound IPC response to `hub-orchestrator-ctl`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task listening on `name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: &str,
    state: Arc<IpcState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(handle_connection(stream, state));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    state: Arc<IpcState>,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &state).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route an IPC command to its handler.
pub async fn dispatch_command(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    async move {
        if let Some(ref expected) = state.auth_token {
            match request.auth_token {
                Some(ref provided) if provided == expected => {}
                _ => {
                    warn!("IPC request rejected: invalid auth token");
                    return IpcResponse::error("unauthorized");
                }
            }
        }

        let result = match request.command.as_str() {
            "fleet" => handle_fleet(state).await,
            "projects" => handle_projects(state).await,
            "sessions" => handle_sessions(state).await,
            "stop" => handle_stop(request, state).await,
            other => return IpcResponse::error(format!("unknown command: {other}")),
        };

        result.unwrap_or_else(|err| IpcResponse::error(err.to_string()))
    }
    .instrument(span)
    .await
}

/// Latest fleet summary, `null` before the first tick.
async fn handle_fleet(state: &IpcState) -> Result<IpcResponse> {
    let summary = state.summary.latest().await;
    Ok(IpcResponse::success(to_json(&summary)?))
}

/// Every project known to the store.
async fn handle_projects(state: &IpcState) -> Result<IpcResponse> {
    let projects = bounded(
        state.call_timeout,
        "list_projects",
        state.store.list_projects(None),
    )
    .await?;
    Ok(IpcResponse::success(serde_json::json!({
        "projects": to_json(&projects)?,
    })))
}

/// Live project sessions on the backend.
async fn handle_sessions(state: &IpcState) -> Result<IpcResponse> {
    let sessions = bounded(
        state.call_timeout,
        "list_sessions",
        state.backend.list_sessions(&state.session_prefix),
    )
    .await?;
    Ok(IpcResponse::success(serde_json::json!({ "sessions": sessions })))
}

/// Request teardown; the next tick kills the session.
async fn handle_stop(request: &IpcRequest, state: &IpcState) -> Result<IpcResponse> {
    let Some(ref id) = request.id else {
        return Ok(IpcResponse::error("missing required 'id' field"));
    };

    let project = bounded(state.call_timeout, "get_project", state.store.get_project(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("project {id} not found")))?;

    let updated = bounded(
        state.call_timeout,
        "update_project",
        lifecycle::transition(
            state.store.as_ref(),
            &project,
            ProjectStatus::Stopping,
            ProjectUpdate::default(),
        ),
    )
    .await?;

    info!(project_id = %id, "stop requested via IPC");
    Ok(IpcResponse::success(serde_json::json!({
        "project_id": id,
        "status": updated.status,
    })))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| AppError::Ipc(format!("encode response: {err}")))
}
