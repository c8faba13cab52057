//! Guidance messages typed into long-stuck agent sessions.

use crate::models::intervention::GuidanceKind;

/// Stuck ticks from which guidance escalates to [`GuidanceKind::Refocus`].
pub const REFOCUS_AFTER_TICKS: u32 = 30;

/// Stuck ticks from which guidance escalates to [`GuidanceKind::Unblock`].
pub const UNBLOCK_AFTER_TICKS: u32 = 60;

/// Pick the guidance bucket for a session stuck for `consecutive_stuck` ticks.
#[must_use]
pub fn kind_for(consecutive_stuck: u32) -> GuidanceKind {
    if consecutive_stuck < REFOCUS_AFTER_TICKS {
        GuidanceKind::Nudge
    } else if consecutive_stuck < UNBLOCK_AFTER_TICKS {
        GuidanceKind::Refocus
    } else {
        GuidanceKind::Unblock
    }
}

/// Text sent to the agent for `kind`.
#[must_use]
pub fn message(kind: GuidanceKind) -> &'static str {
    match kind {
        GuidanceKind::Nudge => NUDGE,
        GuidanceKind::Refocus => REFOCUS,
        GuidanceKind::Unblock => UNBLOCK,
    }
}

const NUDGE: &str = "Orchestrator check-in: your session has been waiting for input for a while. \
If a confirmation is pending, choose the safe default and carry on with the current task.";

const REFOCUS: &str = "Orchestrator check-in: you appear to be blocked. Re-read the project goals, \
commit what you have (git commit -am \"wip: <summary>\"), then continue with the next feature. \
Work autonomously and do not wait for confirmations.";

const UNBLOCK: &str = "Orchestrator notice: this session has been stuck for a long time. \
Abandon the current prompt, pick a reasonable default, and resume development. \
If the task is genuinely blocked, write the blocker to BLOCKED.md and move to another item.";
