//! Intervention policy.
//!
//! Pure decision function: given the classified state of a session, its
//! intervention history and the project's restart ledger, choose at most
//! one corrective action. Rate limits are applied here, so a suppressed
//! action still surfaces as the `recommended` field of the [`Decision`].

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::PolicyConfig;
use crate::models::intervention::{
    ActionKind, Decision, DecisionReason, InterventionAction, InterventionRecord, RestartLedger,
};
use crate::models::liveness::{Liveness, LivenessState};
use crate::probe::markers::MarkerTable;

use super::guidance;

/// Maps liveness to corrective actions under the configured rate limits.
#[derive(Debug, Clone)]
pub struct InterventionPolicy {
    config: PolicyConfig,
    table: MarkerTable,
}

impl InterventionPolicy {
    /// Policy over `config`, resolving answers from `table`.
    #[must_use]
    pub fn new(config: PolicyConfig, table: MarkerTable) -> Self {
        Self { config, table }
    }

    /// Active rate limits.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decide what to do about one session at `now`.
    #[must_use]
    pub fn decide(
        &self,
        state: &LivenessState,
        record: &InterventionRecord,
        ledger: &RestartLedger,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = match state.liveness {
            Liveness::Dead => self.decide_dead(ledger, now),
            Liveness::Stuck => self.decide_stuck(state, record, now),
            Liveness::Healthy => Decision::idle(DecisionReason::NoActionNeeded),
            Liveness::Unknown => Decision::idle(DecisionReason::AwaitingSamples),
        };

        debug!(
            liveness = %state.liveness,
            recommended = %decision.recommended,
            action = %decision.action,
            reason = ?decision.reason,
            "policy decision"
        );

        decision
    }

    fn decide_dead(&self, ledger: &RestartLedger, now: DateTime<Utc>) -> Decision {
        // ── Retry budget ────────────────────────────────────
        let window_start = now - self.config.restart_tracking_window();
        let attempts = ledger.count_since(window_start);
        if attempts >= usize::try_from(self.config.max_restart_attempts).unwrap_or(usize::MAX) {
            return Decision::act(
                InterventionAction::Reprovision,
                DecisionReason::RetryBudgetExhausted,
            );
        }

        // ── Restart cooldown ────────────────────────────────
        let cooldown_start = now - self.config.restart_cooldown();
        if ledger.last().is_some_and(|last| last > cooldown_start) {
            return Decision::suppressed(
                InterventionAction::Restart,
                DecisionReason::RestartCoolingDown,
            );
        }

        Decision::act(InterventionAction::Restart, DecisionReason::RestartDue)
    }

    fn decide_stuck(
        &self,
        state: &LivenessState,
        record: &InterventionRecord,
        now: DateTime<Utc>,
    ) -> Decision {
        // ── Known prompt ────────────────────────────────────
        let answer = self
            .table
            .first_answer(&state.markers)
            .map(|(marker, answer)| InterventionAction::AutoAnswer {
                marker: marker.to_owned(),
                answer: answer.to_owned(),
            });

        if let Some(action) = &answer {
            let debounce_start = now - self.config.auto_answer_debounce();
            if !record.sent_since(action, debounce_start) {
                return Decision::act(action.clone(), DecisionReason::KnownPrompt);
            }
        }

        // ── Periodic guidance ───────────────────────────────
        let every = self.config.guidance_every_stuck_ticks.max(1);
        if state.consecutive_stuck > 0 && state.consecutive_stuck % every == 0 {
            let guidance = InterventionAction::SendGuidance {
                kind: guidance::kind_for(state.consecutive_stuck),
            };
            let cooldown_start = now - self.config.guidance_cooldown();
            if record.kind_since(ActionKind::SendGuidance, cooldown_start) {
                return Decision::suppressed(
                    answer.unwrap_or(guidance),
                    DecisionReason::GuidanceCoolingDown,
                );
            }
            return Decision::act(guidance, DecisionReason::GuidanceDue);
        }

        match answer {
            Some(action) => Decision::suppressed(action, DecisionReason::AnswerDebounced),
            None => Decision::idle(DecisionReason::StuckWaiting),
        }
    }
}
