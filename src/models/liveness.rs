//! Per-session liveness bookkeeping.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a session at one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Producing output, no blocking prompt.
    Healthy,
    /// Waiting on an interactive confirmation.
    Stuck,
    /// Gone, or showing a failure banner.
    Dead,
    /// Not enough evidence yet.
    Unknown,
}

impl Liveness {
    /// Lower-case label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Stuck => "stuck",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for Liveness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a project's manager session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// No manager session exists.
    Absent,
    /// Session exists and its pane shows every activity marker.
    Active,
    /// Session exists but the activity markers are missing.
    Inactive,
}

impl ManagerState {
    /// Whether a manager session exists at all.
    #[must_use]
    pub fn is_present(self) -> bool {
        self != Self::Absent
    }

    /// Lower-case label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl Display for ManagerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness classification plus the counters the policy reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessState {
    /// Current classification.
    pub liveness: Liveness,
    /// When `liveness` last changed value.
    pub changed_at: DateTime<Utc>,
    /// Consecutive ticks classified `Stuck`.
    pub consecutive_stuck: u32,
    /// Consecutive ticks classified `Healthy`.
    pub consecutive_healthy: u32,
    /// Consecutive ticks with an empty or failed capture.
    pub consecutive_empty: u32,
    /// Markers matched by the most recent capture.
    pub markers: BTreeSet<String>,
}

impl LivenessState {
    /// Fresh state for a session that has not been classified yet.
    #[must_use]
    pub fn new(liveness: Liveness, at: DateTime<Utc>) -> Self {
        Self {
            liveness,
            changed_at: at,
            consecutive_stuck: 0,
            consecutive_healthy: 0,
            consecutive_empty: 0,
            markers: BTreeSet::new(),
        }
    }

    /// Healthy for exactly one tick: the agent just came up or recovered.
    #[must_use]
    pub fn just_recovered(&self) -> bool {
        self.liveness == Liveness::Healthy && self.consecutive_healthy == 1
    }
}
