//! Per-probe session evidence.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a marker hit says about the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarkerClass {
    /// Blocked on an interactive confirmation.
    Stuck,
    /// Shell-level failure the agent cannot recover from in place.
    Dead,
}

/// Classification input produced by the probe from one capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSignal {
    /// Tail of the captured pane text that was matched.
    pub text: String,
    /// Ids of every stuck marker that matched, ordered by id.
    pub stuck_markers: BTreeSet<String>,
    /// Ids of every dead marker that matched, ordered by id.
    pub dead_markers: BTreeSet<String>,
    /// When the capture was taken.
    pub captured_at: DateTime<Utc>,
}

impl SessionSignal {
    /// Whether the capture contained no visible text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Union of all matched marker ids.
    #[must_use]
    pub fn markers(&self) -> BTreeSet<String> {
        self.stuck_markers
            .union(&self.dead_markers)
            .cloned()
            .collect()
    }

    /// Whether a specific marker matched.
    #[must_use]
    pub fn has_marker(&self, id: &str) -> bool {
        self.stuck_markers.contains(id) || self.dead_markers.contains(id)
    }
}

/// What the cycle learned about a session this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The session could not be reached (absent after recreation, or
    /// processing failed).
    Unreachable,
    /// The session exists but its output could not be captured.
    CaptureFailed,
    /// Output was captured and probed.
    Captured(SessionSignal),
}
