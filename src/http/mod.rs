//! Observability HTTP endpoint.
//!
//! * `GET /health` → `200 ok`
//! * `GET /fleet`  → latest fleet summary as JSON, `null` before the first tick

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::summary::FleetSummary;
use crate::orchestrator::summary::SummaryHandle;
use crate::{AppError, Result};

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Handler for `GET /fleet`.
async fn fleet(State(summary): State<SummaryHandle>) -> Json<Option<FleetSummary>> {
    Json(summary.latest().await)
}

/// Router serving the observability endpoints.
#[must_use]
pub fn router(summary: SummaryHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fleet", get(fleet))
        .with_state(summary)
}

/// Bind `127.0.0.1:{port}` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the port cannot be bound, or
/// `AppError::Io` if the server fails.
pub async fn serve_http(port: u16, summary: SummaryHandle, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind http on {bind}: {err}")))?;
    serve_listener(listener, summary, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    summary: SummaryHandle,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "starting observability http endpoint");

    axum::serve(listener, router(summary))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("observability http endpoint shut down");
    Ok(())
}
