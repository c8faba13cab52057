//! Liveness classifier.
//!
//! Folds one [`Observation`] into the previous [`LivenessState`] of a
//! session. Rules are evaluated in priority order; the first that holds
//! wins:
//!
//! 1. unreachable session → `Dead`
//! 2. any dead marker → `Dead`
//! 3. any stuck marker → `Stuck`
//! 4. empty or failed capture → `Unknown`, `Dead` once the empty streak
//!    reaches the configured threshold
//! 5. otherwise → `Healthy`

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::config::ClassifierConfig;
use crate::models::liveness::{Liveness, LivenessState};
use crate::models::signal::Observation;

/// Stateless classifier; all history lives in the `LivenessState` passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessClassifier {
    empty_capture_dead_after: u32,
}

impl Default for LivenessClassifier {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl LivenessClassifier {
    /// Classifier declaring a session dead after `empty_capture_dead_after`
    /// consecutive empty captures.
    #[must_use]
    pub fn new(empty_capture_dead_after: u32) -> Self {
        Self {
            empty_capture_dead_after: empty_capture_dead_after.max(1),
        }
    }

    /// Classifier configured from the `[classifier]` section.
    #[must_use]
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.empty_capture_dead_after)
    }

    /// Classify `observation` given the previous state of the session.
    #[must_use]
    pub fn classify(
        &self,
        previous: Option<&LivenessState>,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> LivenessState {
        let was = |state: Liveness| previous.is_some_and(|p| p.liveness == state);
        let prev_stuck = previous.map_or(0, |p| p.consecutive_stuck);
        let prev_healthy = previous.map_or(0, |p| p.consecutive_healthy);
        let prev_empty = previous.map_or(0, |p| p.consecutive_empty);

        let (liveness, markers, stuck, healthy, empty) = match observation {
            Observation::Unreachable => (Liveness::Dead, BTreeSet::new(), 0, 0, 0),
            Observation::CaptureFailed => {
                let empty = prev_empty.saturating_add(1);
                (self.empty_verdict(empty), BTreeSet::new(), 0, 0, empty)
            }
            Observation::Captured(signal) => {
                let markers = signal.markers();
                if !signal.dead_markers.is_empty() {
                    (Liveness::Dead, markers, 0, 0, 0)
                } else if !signal.stuck_markers.is_empty() {
                    let stuck = if was(Liveness::Stuck) {
                        prev_stuck.saturating_add(1)
                    } else {
                        1
                    };
                    (Liveness::Stuck, markers, stuck, 0, 0)
                } else if signal.is_empty() {
                    let empty = prev_empty.saturating_add(1);
                    (self.empty_verdict(empty), markers, 0, 0, empty)
                } else {
                    let healthy = if was(Liveness::Healthy) {
                        prev_healthy.saturating_add(1)
                    } else {
                        1
                    };
                    (Liveness::Healthy, markers, 0, healthy, 0)
                }
            }
        };

        let changed_at = match previous {
            Some(prev) if prev.liveness == liveness => prev.changed_at,
            _ => now,
        };

        LivenessState {
            liveness,
            changed_at,
            consecutive_stuck: stuck,
            consecutive_healthy: healthy,
            consecutive_empty: empty,
            markers,
        }
    }

    fn empty_verdict(&self, streak: u32) -> Liveness {
        if streak >= self.empty_capture_dead_after {
            Liveness::Dead
        } else {
            Liveness::Unknown
        }
    }
}
