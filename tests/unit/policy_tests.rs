//! Unit tests for `InterventionPolicy`.
//!
//! Validates:
//! - AutoAnswer fires once per debounce window for a known prompt
//! - Guidance is periodic, bucketed and rate-limited
//! - Restart respects the cooldown; Reprovision after the retry budget
//! - Suppressed actions still surface as the recommendation

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use hub_orchestrator::config::PolicyConfig;
use hub_orchestrator::models::intervention::{
    DecisionReason, GuidanceKind, InterventionAction, InterventionRecord, RestartLedger,
};
use hub_orchestrator::models::liveness::{Liveness, LivenessState};
use hub_orchestrator::policy::guidance;
use hub_orchestrator::policy::InterventionPolicy;
use hub_orchestrator::probe::markers::MarkerTable;

fn policy() -> InterventionPolicy {
    InterventionPolicy::new(
        PolicyConfig::default(),
        MarkerTable::builtin().expect("builtin"),
    )
}

fn stuck(markers: &[&str], ticks: u32, at: DateTime<Utc>) -> LivenessState {
    let mut state = LivenessState::new(Liveness::Stuck, at);
    state.consecutive_stuck = ticks;
    state.markers = markers.iter().map(|s| (*s).to_owned()).collect::<BTreeSet<_>>();
    state
}

fn dead(at: DateTime<Utc>) -> LivenessState {
    LivenessState::new(Liveness::Dead, at)
}

fn confirm_answer() -> InterventionAction {
    InterventionAction::AutoAnswer {
        marker: "confirm_dialog".into(),
        answer: "2".into(),
    }
}

#[test]
fn known_prompt_is_answered_then_debounced() {
    let policy = policy();
    let t0 = Utc::now();
    let markers = ["confirm_dialog", "dont_ask_again_option"];
    let mut record = InterventionRecord::default();
    let ledger = RestartLedger::default();

    let first = policy.decide(&stuck(&markers, 1, t0), &record, &ledger, t0);
    assert_eq!(first.action, confirm_answer());
    assert_eq!(first.reason, DecisionReason::KnownPrompt);
    record.push(first.action.clone(), t0);

    let t1 = t0 + Duration::seconds(3);
    let second = policy.decide(&stuck(&markers, 2, t1), &record, &ledger, t1);
    assert_eq!(second.action, InterventionAction::None);
    assert_eq!(second.recommended, confirm_answer());
    assert_eq!(second.reason, DecisionReason::AnswerDebounced);
}

#[test]
fn at_most_one_answer_per_debounce_window() {
    let policy = policy();
    let t0 = Utc::now();
    let mut record = InterventionRecord::default();
    let ledger = RestartLedger::default();
    let mut sent = Vec::new();

    // One stuck tick per second for twenty seconds.
    for tick in 0..20u32 {
        let now = t0 + Duration::seconds(i64::from(tick));
        let state = stuck(&["yes_no_prompt"], tick + 1, now);
        let decision = policy.decide(&state, &record, &ledger, now);
        if decision.action.is_none() {
            continue;
        }
        if matches!(decision.action, InterventionAction::AutoAnswer { .. }) {
            sent.push(now);
        }
        record.push(decision.action.clone(), now);
    }

    assert_eq!(sent.len(), 4);
    for pair in sent.windows(2) {
        assert!(pair[1] - pair[0] > Duration::seconds(5));
    }
}

#[test]
fn answer_is_sent_again_after_debounce() {
    let policy = policy();
    let t0 = Utc::now();
    let mut record = InterventionRecord::default();
    record.push(confirm_answer(), t0);

    let later = t0 + Duration::seconds(6);
    let decision = policy.decide(
        &stuck(&["confirm_dialog"], 3, later),
        &record,
        &RestartLedger::default(),
        later,
    );
    assert_eq!(decision.action, confirm_answer());
}

#[test]
fn unknown_prompt_waits_for_guidance() {
    let policy = policy();
    let now = Utc::now();
    let decision = policy.decide(
        &stuck(&["waiting_for_input"], 3, now),
        &InterventionRecord::default(),
        &RestartLedger::default(),
        now,
    );

    assert_eq!(decision.action, InterventionAction::None);
    assert_eq!(decision.reason, DecisionReason::StuckWaiting);
}

#[test]
fn guidance_fires_on_period_boundary() {
    let policy = policy();
    let now = Utc::now();
    let decision = policy.decide(
        &stuck(&["waiting_for_input"], 10, now),
        &InterventionRecord::default(),
        &RestartLedger::default(),
        now,
    );

    assert_eq!(
        decision.action,
        InterventionAction::SendGuidance {
            kind: GuidanceKind::Nudge
        }
    );
    assert_eq!(decision.reason, DecisionReason::GuidanceDue);
}

#[test]
fn guidance_is_rate_limited_by_cooldown() {
    let policy = policy();
    let t0 = Utc::now();
    let mut record = InterventionRecord::default();
    record.push(
        InterventionAction::SendGuidance {
            kind: GuidanceKind::Nudge,
        },
        t0,
    );

    let t1 = t0 + Duration::seconds(300);
    let decision = policy.decide(
        &stuck(&["waiting_for_input"], 20, t1),
        &record,
        &RestartLedger::default(),
        t1,
    );
    assert_eq!(decision.action, InterventionAction::None);
    assert_eq!(decision.reason, DecisionReason::GuidanceCoolingDown);
    assert!(matches!(
        decision.recommended,
        InterventionAction::SendGuidance { .. }
    ));
}

#[test]
fn guidance_escalates_with_stuck_duration() {
    assert_eq!(guidance::kind_for(10), GuidanceKind::Nudge);
    assert_eq!(guidance::kind_for(29), GuidanceKind::Nudge);
    assert_eq!(guidance::kind_for(30), GuidanceKind::Refocus);
    assert_eq!(guidance::kind_for(60), GuidanceKind::Unblock);
    assert_ne!(
        guidance::message(GuidanceKind::Nudge),
        guidance::message(GuidanceKind::Unblock)
    );
}

#[test]
fn first_dead_tick_restarts() {
    let policy = policy();
    let now = Utc::now();
    let decision = policy.decide(
        &dead(now),
        &InterventionRecord::default(),
        &RestartLedger::default(),
        now,
    );

    assert_eq!(decision.action, InterventionAction::Restart);
    assert_eq!(decision.reason, DecisionReason::RestartDue);
}

#[test]
fn restart_inside_cooldown_is_suppressed() {
    let policy = policy();
    let t0 = Utc::now();
    let mut ledger = RestartLedger::default();
    ledger.record(t0);

    let t1 = t0 + Duration::seconds(30);
    let decision = policy.decide(&dead(t1), &InterventionRecord::default(), &ledger, t1);

    assert_eq!(decision.action, InterventionAction::None);
    assert_eq!(decision.recommended, InterventionAction::Restart);
    assert_eq!(decision.reason, DecisionReason::RestartCoolingDown);
}

#[test]
fn third_restart_in_window_exhausts_budget() {
    let policy = policy();
    let t0 = Utc::now();
    let mut ledger = RestartLedger::default();
    for minute in [0, 2, 4] {
        ledger.record(t0 + Duration::minutes(minute));
    }

    let now = t0 + Duration::minutes(6);
    let decision = policy.decide(&dead(now), &InterventionRecord::default(), &ledger, now);

    assert_eq!(decision.action, InterventionAction::Reprovision);
    assert_eq!(decision.reason, DecisionReason::RetryBudgetExhausted);
}

#[test]
fn restarts_outside_window_do_not_count() {
    let policy = policy();
    let t0 = Utc::now();
    let mut ledger = RestartLedger::default();
    for minute in [0, 2, 4] {
        ledger.record(t0 + Duration::minutes(minute));
    }

    // The tracking window is ten minutes; only the last attempt remains.
    let now = t0 + Duration::minutes(13);
    let decision = policy.decide(&dead(now), &InterventionRecord::default(), &ledger, now);

    assert_eq!(decision.action, InterventionAction::Restart);
}

#[test]
fn healthy_and_unknown_are_idle() {
    let policy = policy();
    let now = Utc::now();
    let record = InterventionRecord::default();
    let ledger = RestartLedger::default();

    let healthy_state = LivenessState::new(Liveness::Healthy, now);
    let unknown_state = LivenessState::new(Liveness::Unknown, now);
    let healthy = policy.decide(&healthy_state, &record, &ledger, now);
    let unknown = policy.decide(&unknown_state, &record, &ledger, now);

    assert_eq!(healthy.recommended, InterventionAction::None);
    assert_eq!(healthy.reason, DecisionReason::NoActionNeeded);
    assert_eq!(unknown.reason, DecisionReason::AwaitingSamples);
}
