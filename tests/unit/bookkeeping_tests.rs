//! Unit tests for the cycle's in-memory `Bookkeeping`.

use std::collections::HashSet;

use chrono::{Duration, Utc};

use hub_orchestrator::models::intervention::InterventionAction;
use hub_orchestrator::models::liveness::{Liveness, LivenessState};
use hub_orchestrator::orchestrator::bookkeeping::Bookkeeping;

#[test]
fn book_is_created_on_first_use() {
    let mut books = Bookkeeping::new();
    assert!(books.is_empty());

    books.book_mut("p-1", "proj-a").liveness = Some(LivenessState::new(Liveness::Healthy, Utc::now()));

    assert_eq!(books.len(), 1);
    assert_eq!(
        books.liveness("p-1").map(|s| s.liveness),
        Some(Liveness::Healthy)
    );
}

#[test]
fn switching_session_discards_the_old_book() {
    let mut books = Bookkeeping::new();
    let now = Utc::now();
    books
        .book_mut("p-1", "proj-a")
        .record
        .push(InterventionAction::Restart, now);

    let book = books.book_mut("p-1", "proj-b");
    assert_eq!(book.session, "proj-b");
    assert!(book.record.is_empty());
}

#[test]
fn reset_session_keeps_the_restart_ledger() {
    let mut books = Bookkeeping::new();
    let now = Utc::now();
    books.book_mut("p-1", "proj-a").liveness = Some(LivenessState::new(Liveness::Dead, now));
    books.ledger_mut("p-1").record(now);

    books.reset_session("p-1", "proj-a");

    assert!(books.liveness("p-1").is_none());
    assert!(books.record("p-1").is_some_and(|r| r.is_empty()));
    assert_eq!(books.ledger("p-1").map(|l| l.count_since(now)), Some(1));
}

#[test]
fn drop_project_forgets_everything() {
    let mut books = Bookkeeping::new();
    let now = Utc::now();
    books.book_mut("p-1", "proj-a");
    books.ledger_mut("p-1").record(now);
    books.mark_known("proj-a");

    books.drop_project("p-1");

    assert!(books.book("p-1").is_none());
    assert!(books.ledger("p-1").is_none());
    assert!(!books.is_known("proj-a"));
}

#[test]
fn retain_projects_drops_unlisted_ids() {
    let mut books = Bookkeeping::new();
    books.book_mut("keep", "proj-keep");
    books.book_mut("gone", "proj-gone");
    books.ledger_mut("ledger-only").record(Utc::now());

    let active: HashSet<&str> = std::iter::once("keep").collect();
    books.retain_projects(&active);

    assert!(books.book("keep").is_some());
    assert!(books.book("gone").is_none());
    assert!(books.ledger("ledger-only").is_none());
}

#[test]
fn prune_trims_histories_independently() {
    let mut books = Bookkeeping::new();
    let t0 = Utc::now();
    books
        .book_mut("p-1", "proj-a")
        .record
        .push(InterventionAction::Restart, t0);
    books.ledger_mut("p-1").record(t0);

    books.prune(t0 + Duration::minutes(30), Duration::minutes(20), Duration::hours(1));

    assert!(books.record("p-1").is_some_and(|r| r.is_empty()));
    assert_eq!(books.ledger("p-1").map(|l| l.count_since(t0)), Some(1));
}
