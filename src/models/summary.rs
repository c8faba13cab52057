//! Fleet-level tick summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intervention::{ActionKind, DecisionReason, InterventionAction};
use super::liveness::{Liveness, ManagerState};
use super::project::ProjectStatus;

/// What happened to one project during a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionReport {
    /// Project identifier.
    pub project_id: String,
    /// Session name supervised for the project.
    pub session: String,
    /// Project status after the tick.
    pub status: ProjectStatus,
    /// Classification this tick, if the session was probed.
    pub liveness: Option<Liveness>,
    /// Rate-limit-free recommendation.
    pub recommended: InterventionAction,
    /// Executed action.
    pub action: InterventionAction,
    /// Policy explanation, if the policy ran.
    pub reason: Option<DecisionReason>,
    /// Manager session state, for projects that can have a manager.
    #[serde(default)]
    pub manager: Option<ManagerState>,
    /// Whether the session had to be recreated before probing.
    pub recreated: bool,
    /// Error contained while processing this project.
    pub error: Option<String>,
}

impl SessionReport {
    /// Report with no classification and no action.
    #[must_use]
    pub fn new(project_id: String, session: String, status: ProjectStatus) -> Self {
        Self {
            project_id,
            session,
            status,
            liveness: None,
            recommended: InterventionAction::None,
            action: InterventionAction::None,
            reason: None,
            manager: None,
            recreated: false,
            error: None,
        }
    }
}

/// Summary record emitted once per completed tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetSummary {
    /// Monotonic tick number, starting at 1.
    pub tick: u64,
    /// When the tick started.
    pub started_at: DateTime<Utc>,
    /// When the tick finished.
    pub finished_at: DateTime<Utc>,
    /// Projects returned by the store.
    pub projects_seen: usize,
    /// Sessions classified this tick, by liveness.
    pub liveness: BTreeMap<Liveness, usize>,
    /// Executed actions, by kind (excluding `none`).
    pub actions: BTreeMap<ActionKind, usize>,
    /// Manager sessions inspected this tick, by state.
    #[serde(default)]
    pub managers: BTreeMap<ManagerState, usize>,
    /// Projects escalated to `Error` this tick.
    pub escalations: Vec<String>,
    /// Projects whose processing hit a contained error.
    pub errors: usize,
    /// Per-project detail.
    pub sessions: Vec<SessionReport>,
}

impl FleetSummary {
    /// Aggregate per-session reports into a summary.
    #[must_use]
    pub fn from_reports(
        tick: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        projects_seen: usize,
        sessions: Vec<SessionReport>,
    ) -> Self {
        let mut liveness = BTreeMap::new();
        let mut actions = BTreeMap::new();
        let mut managers = BTreeMap::new();
        let mut escalations = Vec::new();
        let mut errors = 0;

        for report in &sessions {
            if let Some(state) = report.liveness {
                *liveness.entry(state).or_insert(0) += 1;
            }
            if let Some(state) = report.manager {
                *managers.entry(state).or_insert(0) += 1;
            }
            let kind = report.action.kind();
            if kind != ActionKind::None {
                *actions.entry(kind).or_insert(0) += 1;
            }
            if kind == ActionKind::Reprovision {
                escalations.push(report.project_id.clone());
            }
            if report.error.is_some() {
                errors += 1;
            }
        }

        Self {
            tick,
            started_at,
            finished_at,
            projects_seen,
            liveness,
            actions,
            managers,
            escalations,
            errors,
            sessions,
        }
    }

    /// Sessions classified as `state` this tick.
    #[must_use]
    pub fn count(&self, state: Liveness) -> usize {
        self.liveness.get(&state).copied().unwrap_or(0)
    }

    /// Executed actions of `kind` this tick.
    #[must_use]
    pub fn action_count(&self, kind: ActionKind) -> usize {
        self.actions.get(&kind).copied().unwrap_or(0)
    }

    /// Manager sessions observed in `state` this tick.
    #[must_use]
    pub fn manager_count(&self, state: ManagerState) -> usize {
        self.managers.get(&state).copied().unwrap_or(0)
    }

    /// Report for one project, if it was processed.
    #[must_use]
    pub fn report(&self, project_id: &str) -> Option<&SessionReport> {
        self.sessions.iter().find(|r| r.project_id == project_id)
    }
}
