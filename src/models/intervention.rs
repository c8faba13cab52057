//! Intervention actions and the per-session history used for rate limits.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stuck-duration bucket selecting the guidance message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceKind {
    /// Short reminder to keep going.
    Nudge,
    /// Restate the mission and working agreements.
    Refocus,
    /// Long-stuck: tell the agent to pick a default and move on.
    Unblock,
}

impl GuidanceKind {
    /// Lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Refocus => "refocus",
            Self::Unblock => "unblock",
        }
    }
}

/// Corrective action chosen by the policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterventionAction {
    /// Leave the session alone.
    None,
    /// Answer a recognised confirmation prompt.
    AutoAnswer {
        /// Marker that recognised the prompt.
        marker: String,
        /// Text typed into the pane before submitting.
        answer: String,
    },
    /// Send a guidance message to a long-stuck agent.
    SendGuidance {
        /// Which message to send.
        kind: GuidanceKind,
    },
    /// Kill and recreate the session.
    Restart,
    /// Give up on the project; it moves to `Error`.
    Reprovision,
}

impl InterventionAction {
    /// Kind of this action, without payload.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::None => ActionKind::None,
            Self::AutoAnswer { .. } => ActionKind::AutoAnswer,
            Self::SendGuidance { .. } => ActionKind::SendGuidance,
            Self::Restart => ActionKind::Restart,
            Self::Reprovision => ActionKind::Reprovision,
        }
    }

    /// Whether this is the no-op action.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl Display for InterventionAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::AutoAnswer { marker, answer } => write!(f, "auto_answer({marker}={answer:?})"),
            Self::SendGuidance { kind } => write!(f, "send_guidance({})", kind.as_str()),
            Self::Restart => f.write_str("restart"),
            Self::Reprovision => f.write_str("reprovision"),
        }
    }
}

/// Payload-free action discriminant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// No action.
    None,
    /// Confirmation prompt answered.
    AutoAnswer,
    /// Guidance message sent.
    SendGuidance,
    /// Session restarted.
    Restart,
    /// Project escalated to `Error`.
    Reprovision,
}

/// One executed intervention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterventionEntry {
    /// The executed action.
    pub action: InterventionAction,
    /// When it was executed.
    pub at: DateTime<Utc>,
}

/// Per-session history of executed interventions.
///
/// Entries are appended in timestamp order and only ever read for rate
/// limits; they are never replayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterventionRecord {
    entries: Vec<InterventionEntry>,
}

impl InterventionRecord {
    /// Append an executed action. A timestamp older than the newest entry
    /// is clamped so the history stays monotonic.
    pub fn push(&mut self, action: InterventionAction, at: DateTime<Utc>) {
        let at = self.entries.last().map_or(at, |last| at.max(last.at));
        self.entries.push(InterventionEntry { action, at });
    }

    /// Entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[InterventionEntry] {
        &self.entries
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry of `kind`.
    #[must_use]
    pub fn last_of(&self, kind: ActionKind) -> Option<&InterventionEntry> {
        self.entries.iter().rev().find(|e| e.action.kind() == kind)
    }

    /// Whether exactly `action` was executed at or after `since`.
    #[must_use]
    pub fn sent_since(&self, action: &InterventionAction, since: DateTime<Utc>) -> bool {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.at >= since)
            .any(|e| &e.action == action)
    }

    /// Whether any action of `kind` was executed at or after `since`.
    #[must_use]
    pub fn kind_since(&self, kind: ActionKind, since: DateTime<Utc>) -> bool {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.at >= since)
            .any(|e| e.action.kind() == kind)
    }

    /// Drop entries older than `horizon` before `now`.
    pub fn prune(&mut self, now: DateTime<Utc>, horizon: Duration) {
        let cutoff = now - horizon;
        self.entries.retain(|e| e.at >= cutoff);
    }
}

/// Restart attempts for one project, kept across session recreation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartLedger {
    attempts: Vec<DateTime<Utc>>,
}

impl RestartLedger {
    /// Record a restart attempt.
    pub fn record(&mut self, at: DateTime<Utc>) {
        let at = self.attempts.last().map_or(at, |last| at.max(*last));
        self.attempts.push(at);
    }

    /// Number of attempts at or after `since`.
    #[must_use]
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.attempts.iter().filter(|at| **at >= since).count()
    }

    /// Most recent attempt.
    #[must_use]
    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.attempts.last().copied()
    }

    /// Drop attempts that fell out of the tracking window.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now - window;
        self.attempts.retain(|at| *at >= cutoff);
    }
}

/// Why the policy chose what it chose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Nothing to do for this liveness.
    NoActionNeeded,
    /// Waiting for more samples.
    AwaitingSamples,
    /// Dead, restart budget available.
    RestartDue,
    /// Dead, but a restart happened inside the cooldown.
    RestartCoolingDown,
    /// Dead, restart budget exhausted.
    RetryBudgetExhausted,
    /// Stuck on a prompt with a known safe answer.
    KnownPrompt,
    /// Same answer sent inside the debounce window.
    AnswerDebounced,
    /// Stuck long enough to warrant guidance.
    GuidanceDue,
    /// Guidance sent inside the cooldown.
    GuidanceCoolingDown,
    /// Stuck, but neither an answer nor guidance applies yet.
    StuckWaiting,
}

/// Policy output for one session at one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    /// What the state alone calls for, ignoring rate limits.
    pub recommended: InterventionAction,
    /// What will actually be executed.
    pub action: InterventionAction,
    /// Explanation for `action`.
    pub reason: DecisionReason,
}

impl Decision {
    /// Decision whose executed action equals the recommendation.
    #[must_use]
    pub fn act(action: InterventionAction, reason: DecisionReason) -> Self {
        Self {
            recommended: action.clone(),
            action,
            reason,
        }
    }

    /// Decision suppressed by a rate limit.
    #[must_use]
    pub fn suppressed(recommended: InterventionAction, reason: DecisionReason) -> Self {
        Self {
            recommended,
            action: InterventionAction::None,
            reason,
        }
    }

    /// Decision with nothing recommended.
    #[must_use]
    pub fn idle(reason: DecisionReason) -> Self {
        Self::act(InterventionAction::None, reason)
    }
}
