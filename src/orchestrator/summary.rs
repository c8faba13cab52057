//! Read-only access to the most recent fleet summary.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::summary::FleetSummary;

/// Shared handle to the latest [`FleetSummary`].
///
/// The cycle is the only writer; observability surfaces hold clones and
/// read.
#[derive(Debug, Clone, Default)]
pub struct SummaryHandle {
    inner: Arc<RwLock<Option<FleetSummary>>>,
}

impl SummaryHandle {
    /// Empty handle; `latest` returns `None` until the first tick.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent summary, if any tick has completed.
    pub async fn latest(&self) -> Option<FleetSummary> {
        self.inner.read().await.clone()
    }

    pub(crate) async fn store(&self, summary: FleetSummary) {
        *self.inner.write().await = Some(summary);
    }
}
