//! Orchestration modules.
//!
//! Covers the per-tick cycle, the bookkeeping it owns, the launch
//! briefing, project status transitions, the fixed-interval scheduler and
//! the summary handle read by observability surfaces.

pub mod bookkeeping;
pub mod briefing;
pub mod clock;
pub mod cycle;
pub mod lifecycle;
pub mod scheduler;
pub mod summary;

use std::future::Future;
use std::time::Duration;

use crate::{AppError, Result};

/// Await `fut`, converting an elapsed `timeout` into `AppError::Timeout`.
///
/// # Errors
///
/// Returns `AppError::Timeout` if the call does not finish in time, or the
/// call's own error.
pub async fn bounded<T, F>(timeout: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        AppError::Timeout(format!("{op} did not finish within {}ms", timeout.as_millis()))
    })?
}
