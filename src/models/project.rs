//! Project record and lifecycle graph.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Lifecycle status for a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Registered but no session exists yet.
    Pending,
    /// Session created, agent not yet observed healthy.
    Starting,
    /// Agent observed healthy at least once.
    Running,
    /// A manager agent supervises the project.
    Managed,
    /// Teardown requested; the cycle kills the session next.
    Stopping,
    /// Torn down. Terminal.
    Stopped,
    /// Recovery abandoned. Terminal.
    Error,
}

impl ProjectStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Starting,
        Self::Running,
        Self::Managed,
        Self::Stopping,
        Self::Stopped,
        Self::Error,
    ];

    /// Statuses whose session is supervised by the cycle.
    pub const SUPERVISED: [Self; 3] = [Self::Starting, Self::Running, Self::Managed];

    /// Wire representation used by the store and the Hub API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Managed => "managed",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Whether the cycle supervises a session for this status.
    #[must_use]
    pub fn is_supervised(self) -> bool {
        Self::SUPERVISED.contains(&self)
    }

    /// Terminal statuses require a new project to resume.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Running`/`Managed` → `Starting` is the restart edge: the session
    /// was recreated and has to prove itself healthy again.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Running, Self::Managed)
                | (Self::Running | Self::Managed, Self::Starting)
                | (
                    Self::Starting | Self::Running | Self::Managed,
                    Self::Error
                )
                | (
                    Self::Pending | Self::Starting | Self::Running | Self::Managed,
                    Self::Stopping
                )
                | (Self::Stopping, Self::Stopped)
        )
    }
}

impl Display for ProjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::Db(format!("invalid project status: {s}")))
    }
}

/// Project record owned by the state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Unique record identifier.
    pub id: String,
    /// Human-readable project name; the session name is derived from it.
    pub name: String,
    /// Project type (`python`, `nodejs`, ...).
    #[serde(default)]
    pub project_type: String,
    /// Working directory for the agent session; empty means the daemon's
    /// own working directory.
    #[serde(default, alias = "project_path")]
    pub path: String,
    /// Current lifecycle status.
    pub status: ProjectStatus,
    /// Last time the agent was observed healthy.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Name of the bound terminal session, if any.
    #[serde(default)]
    pub session_ref: Option<String>,
}

impl Project {
    /// Construct a new pending project with a generated identifier.
    #[must_use]
    pub fn new(name: String, project_type: String, path: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            project_type,
            path,
            status: ProjectStatus::Pending,
            last_heartbeat: None,
            session_ref: None,
        }
    }

    /// Lower-case project name with every space replaced by a dash.
    ///
    /// Runs of spaces are not collapsed, so `"My  App"` becomes `my--app`
    /// and matches sessions created by earlier Hub deployments.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }

    /// Resolve the session name: the stored reference wins over the
    /// `{prefix}{slug}` convention.
    #[must_use]
    pub fn session_name(&self, prefix: &str) -> String {
        self.session_ref
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{prefix}{}", self.slug()))
    }
}

/// Partial update applied through the state store.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectUpdate {
    /// New lifecycle status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    /// New heartbeat timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// New session reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<String>,
}

impl ProjectUpdate {
    /// Update carrying only a status change.
    #[must_use]
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Update carrying only a heartbeat.
    #[must_use]
    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat: Some(at),
            ..Self::default()
        }
    }

    /// Attach a session reference to this update.
    #[must_use]
    pub fn with_session_ref(mut self, session: impl Into<String>) -> Self {
        self.session_ref = Some(session.into());
        self
    }

    /// Attach a heartbeat to this update.
    #[must_use]
    pub fn with_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    /// Apply the update to a project in place.
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(at) = self.last_heartbeat {
            project.last_heartbeat = Some(at);
        }
        if let Some(ref session) = self.session_ref {
            project.session_ref = Some(session.clone());
        }
    }
}
