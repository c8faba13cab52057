//! Notification bus.
//!
//! The cycle announces what it did on named topics. Publishing is
//! fire-and-forget: a bus failure is logged and never aborts a tick.

pub mod consumer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::models::intervention::GuidanceKind;
use crate::models::project::ProjectStatus;
use crate::models::summary::FleetSummary;
use crate::{AppError, Result};

/// A confirmation prompt was answered.
pub const TOPIC_AUTO_ANSWER: &str = "agent.auto_answer";
/// A guidance message was typed into a stuck session.
pub const TOPIC_GUIDANCE: &str = "agent.guidance";
/// A dead session was killed and recreated.
pub const TOPIC_RESTART: &str = "agent.restart";
/// A project exhausted its restart budget.
pub const TOPIC_REPROVISION: &str = "agent.reprovision";
/// A missing session was recreated before probing.
pub const TOPIC_RECREATED: &str = "agent.recreated";
/// A project changed lifecycle status.
pub const TOPIC_STATUS: &str = "project.status";
/// End-of-tick fleet summary.
pub const TOPIC_FLEET_SUMMARY: &str = "fleet.summary";

/// One published notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusMessage {
    /// Topic name.
    pub topic: String,
    /// JSON payload.
    pub payload: Value,
    /// When the message was published.
    pub published_at: DateTime<Utc>,
}

/// Pub/sub sink for orchestration notifications.
pub trait EventBus: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the message cannot be handed off.
    fn publish(&self, topic: &str, payload: Value) -> Result<()>;
}

/// In-process bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BusMessage>,
}

impl BroadcastBus {
    /// Create a bus buffering up to `capacity` messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every message published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let message = BusMessage {
            topic: topic.to_owned(),
            payload,
            published_at: Utc::now(),
        };
        // No subscribers is not an error.
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// Typed orchestration notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A known prompt was answered.
    AutoAnswered {
        /// Project identifier.
        project_id: String,
        /// Session typed into.
        session: String,
        /// Marker that recognised the prompt.
        marker: String,
    },
    /// Guidance was sent.
    GuidanceSent {
        /// Project identifier.
        project_id: String,
        /// Session typed into.
        session: String,
        /// Guidance bucket.
        kind: GuidanceKind,
    },
    /// Session restarted.
    Restarted {
        /// Project identifier.
        project_id: String,
        /// Recreated session.
        session: String,
        /// Restarts inside the tracking window, including this one.
        attempts: usize,
    },
    /// Restart budget exhausted; project moved to `Error`.
    Reprovisioned {
        /// Project identifier.
        project_id: String,
        /// Abandoned session.
        session: String,
        /// Restarts inside the tracking window.
        attempts: usize,
    },
    /// Missing session recreated.
    SessionRecreated {
        /// Project identifier.
        project_id: String,
        /// Recreated session.
        session: String,
    },
    /// Lifecycle status changed.
    StatusChanged {
        /// Project identifier.
        project_id: String,
        /// Previous status.
        from: ProjectStatus,
        /// New status.
        to: ProjectStatus,
    },
}

impl OrchestrationEvent {
    /// Topic the event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::AutoAnswered { .. } => TOPIC_AUTO_ANSWER,
            Self::GuidanceSent { .. } => TOPIC_GUIDANCE,
            Self::Restarted { .. } => TOPIC_RESTART,
            Self::Reprovisioned { .. } => TOPIC_REPROVISION,
            Self::SessionRecreated { .. } => TOPIC_RECREATED,
            Self::StatusChanged { .. } => TOPIC_STATUS,
        }
    }
}

/// Publish a typed event, logging instead of failing.
pub fn emit(bus: &dyn EventBus, event: &OrchestrationEvent) {
    publish_json(bus, event.topic(), event);
}

/// Publish a fleet summary, logging instead of failing.
pub fn emit_summary(bus: &dyn EventBus, summary: &FleetSummary) {
    publish_json(bus, TOPIC_FLEET_SUMMARY, summary);
}

fn publish_json<T: Serialize>(bus: &dyn EventBus, topic: &str, value: &T) {
    let result = serde_json::to_value(value)
        .map_err(|err| AppError::Bus(format!("failed to encode {topic} payload: {err}")))
        .and_then(|payload| bus.publish(topic, payload));
    if let Err(err) = result {
        warn!(topic, %err, "bus publish failed");
    }
}
