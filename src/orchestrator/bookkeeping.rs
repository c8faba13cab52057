//! In-memory per-project state owned by the orchestration cycle.
//!
//! Keyed by project id. Liveness and intervention history belong to the
//! current session and are reset whenever it is recreated; the restart
//! ledger belongs to the project and survives recreation.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::intervention::{InterventionRecord, RestartLedger};
use crate::models::liveness::LivenessState;

/// Session-scoped bookkeeping for one project.
#[derive(Debug, Clone, Default)]
pub struct SessionBook {
    /// Session the state below was observed on.
    pub session: String,
    /// Last classification, `None` until the first probe.
    pub liveness: Option<LivenessState>,
    /// Interventions executed on this session.
    pub record: InterventionRecord,
}

/// All bookkeeping held by the cycle.
#[derive(Debug, Default)]
pub struct Bookkeeping {
    books: HashMap<String, SessionBook>,
    ledgers: HashMap<String, RestartLedger>,
    known_sessions: HashSet<String>,
}

impl Bookkeeping {
    /// Empty bookkeeping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Book for `project_id`, if any.
    #[must_use]
    pub fn book(&self, project_id: &str) -> Option<&SessionBook> {
        self.books.get(project_id)
    }

    /// Book for `project_id` bound to `session`. A book for a different
    /// session is discarded first.
    pub fn book_mut(&mut self, project_id: &str, session: &str) -> &mut SessionBook {
        let book = self.books.entry(project_id.to_owned()).or_default();
        if book.session != session {
            *book = SessionBook {
                session: session.to_owned(),
                ..SessionBook::default()
            };
        }
        book
    }

    /// Last classification of the project's session.
    #[must_use]
    pub fn liveness(&self, project_id: &str) -> Option<&LivenessState> {
        self.books.get(project_id).and_then(|b| b.liveness.as_ref())
    }

    /// Intervention history of the project's session.
    #[must_use]
    pub fn record(&self, project_id: &str) -> Option<&InterventionRecord> {
        self.books.get(project_id).map(|b| &b.record)
    }

    /// Restart ledger of the project.
    #[must_use]
    pub fn ledger(&self, project_id: &str) -> Option<&RestartLedger> {
        self.ledgers.get(project_id)
    }

    /// Mutable restart ledger, created on first use.
    pub fn ledger_mut(&mut self, project_id: &str) -> &mut RestartLedger {
        self.ledgers.entry(project_id.to_owned()).or_default()
    }

    /// Forget liveness and intervention history after the session was
    /// recreated. The restart ledger is kept.
    pub fn reset_session(&mut self, project_id: &str, session: &str) {
        self.books.insert(
            project_id.to_owned(),
            SessionBook {
                session: session.to_owned(),
                ..SessionBook::default()
            },
        );
    }

    /// Forget everything about a project.
    pub fn drop_project(&mut self, project_id: &str) {
        if let Some(book) = self.books.remove(project_id) {
            self.known_sessions.remove(&book.session);
        }
        self.ledgers.remove(project_id);
    }

    /// Drop every project not in `active`.
    pub fn retain_projects(&mut self, active: &HashSet<&str>) {
        let stale: Vec<String> = self
            .books
            .keys()
            .chain(self.ledgers.keys())
            .filter(|id| !active.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            self.drop_project(&id);
        }
    }

    /// Remember that `session` was seen alive or created by the cycle.
    pub fn mark_known(&mut self, session: &str) {
        self.known_sessions.insert(session.to_owned());
    }

    /// Whether `session` was ever seen alive or created by the cycle.
    #[must_use]
    pub fn is_known(&self, session: &str) -> bool {
        self.known_sessions.contains(session)
    }

    /// Trim histories past their horizons.
    pub fn prune(&mut self, now: DateTime<Utc>, history: TimeDelta, ledger_window: TimeDelta) {
        for book in self.books.values_mut() {
            book.record.prune(now, history);
        }
        for ledger in self.ledgers.values_mut() {
            ledger.prune(now, ledger_window);
        }
    }

    /// Number of projects with session bookkeeping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no project has session bookkeeping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
