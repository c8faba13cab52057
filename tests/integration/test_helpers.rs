//! Shared fakes for orchestration integration tests.
//!
//! Provides a scripted in-memory session backend, a manually advanced
//! clock, a bus that records every publish, a store wrapper that can be
//! told to fail, a plain in-memory store for paused-time tests, and a
//! harness wiring them into an `OrchestrationCycle` over an in-memory
//! `SQLite` project repository.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use hub_orchestrator::backend::{BackendFuture, SessionBackend};
use hub_orchestrator::bus::EventBus;
use hub_orchestrator::config::GlobalConfig;
use hub_orchestrator::models::project::{Project, ProjectStatus, ProjectUpdate};
use hub_orchestrator::orchestrator::clock::Clock;
use hub_orchestrator::orchestrator::cycle::OrchestrationCycle;
use hub_orchestrator::persistence::db::{self, Database};
use hub_orchestrator::persistence::project_repo::ProjectRepo;
use hub_orchestrator::store::{self, StateStore, StoreFuture};
use hub_orchestrator::{AppError, Result};

// ── Backend ─────────────────────────────────────────────

/// One call observed by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Exists(String),
    Create(String, PathBuf),
    Kill(String),
    Capture(String),
    Send {
        session: String,
        text: String,
        submit: bool,
    },
    List(String),
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: BTreeSet<String>,
    captures: HashMap<String, String>,
    failing_captures: HashSet<String>,
    failing_creates: HashSet<String>,
    hanging_exists: HashSet<String>,
    hanging_captures: HashSet<String>,
    calls: Vec<BackendCall>,
}

/// In-memory session backend with scripted pane contents.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().expect("fake backend lock");
        f(&mut state)
    }

    /// Make `session` exist without recording a call.
    pub fn add_session(&self, session: &str) {
        self.with(|s| s.sessions.insert(session.to_owned()));
    }

    /// Simulate the session dying underneath the cycle.
    pub fn remove_session(&self, session: &str) {
        self.with(|s| s.sessions.remove(session));
    }

    pub fn has_session(&self, session: &str) -> bool {
        self.with(|s| s.sessions.contains(session))
    }

    /// Text returned by every capture of `session` from now on.
    pub fn set_capture(&self, session: &str, text: &str) {
        self.with(|s| s.captures.insert(session.to_owned(), text.to_owned()));
    }

    /// Make captures of `session` fail with a backend error.
    pub fn fail_capture(&self, session: &str) {
        self.with(|s| s.failing_captures.insert(session.to_owned()));
    }

    /// Make every creation of `session` fail with a backend error.
    pub fn fail_create(&self, session: &str) {
        self.with(|s| s.failing_creates.insert(session.to_owned()));
    }

    /// Make existence checks for `session` never complete.
    pub fn hang_exists(&self, session: &str) {
        self.with(|s| s.hanging_exists.insert(session.to_owned()));
    }

    /// Make captures of `session` never complete.
    pub fn hang_capture(&self, session: &str) {
        self.with(|s| s.hanging_captures.insert(session.to_owned()));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Texts typed into `session`, in order.
    pub fn sent_to(&self, session: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Send { session: s, text, .. } if s == session => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Create(name, _) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Kill(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl SessionBackend for FakeBackend {
    fn session_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        let result: Option<Result<bool>> = self.with(|s| {
            s.calls.push(BackendCall::Exists(name.to_owned()));
            (!s.hanging_exists.contains(name)).then(|| Ok(s.sessions.contains(name)))
        });
        match result {
            Some(result) => Box::pin(async move { result }),
            None => Box::pin(std::future::pending::<Result<bool>>()),
        }
    }

    fn create_session<'a>(&'a self, name: &'a str, cwd: &'a Path) -> BackendFuture<'a, ()> {
        let result: Result<()> = self.with(|s| {
            s.calls
                .push(BackendCall::Create(name.to_owned(), cwd.to_path_buf()));
            if s.failing_creates.contains(name) {
                Err(AppError::Backend(format!("cannot create session {name}")))
            } else if s.sessions.insert(name.to_owned()) {
                Ok(())
            } else {
                Err(AppError::Backend(format!("duplicate session: {name}")))
            }
        });
        Box::pin(async move { result })
    }

    fn kill_session<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        let result: Result<()> = self.with(|s| {
            s.calls.push(BackendCall::Kill(name.to_owned()));
            if s.sessions.remove(name) {
                Ok(())
            } else {
                Err(AppError::NotFound(format!("session {name}")))
            }
        });
        Box::pin(async move { result })
    }

    fn capture_output<'a>(
        &'a self,
        name: &'a str,
        _pane: &'a str,
        _max_lines: usize,
    ) -> BackendFuture<'a, String> {
        let result: Option<Result<String>> = self.with(|s| {
            s.calls.push(BackendCall::Capture(name.to_owned()));
            if s.hanging_captures.contains(name) {
                None
            } else if s.failing_captures.contains(name) {
                Some(Err(AppError::Backend(format!("capture failed: {name}"))))
            } else if s.sessions.contains(name) {
                Some(Ok(s.captures.get(name).cloned().unwrap_or_default()))
            } else {
                Some(Err(AppError::NotFound(format!("session {name}"))))
            }
        });
        match result {
            Some(result) => Box::pin(async move { result }),
            None => Box::pin(std::future::pending::<Result<String>>()),
        }
    }

    fn send_input<'a>(
        &'a self,
        name: &'a str,
        _pane: &'a str,
        text: &'a str,
        submit: bool,
    ) -> BackendFuture<'a, ()> {
        let result: Result<()> = self.with(|s| {
            if !s.sessions.contains(name) {
                return Err(AppError::NotFound(format!("session {name}")));
            }
            s.calls.push(BackendCall::Send {
                session: name.to_owned(),
                text: text.to_owned(),
                submit,
            });
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn list_sessions<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>> {
        let result: Result<Vec<String>> = self.with(|s| {
            s.calls.push(BackendCall::List(prefix.to_owned()));
            Ok(s.sessions
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        });
        Box::pin(async move { result })
    }
}

// ── Clock ───────────────────────────────────────────────

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
            .single()
            .expect("valid start");
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

// ── Bus ─────────────────────────────────────────────────

/// Bus that keeps every published message.
#[derive(Debug, Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<(String, Value)>>,
}

impl RecordingBus {
    pub fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("bus lock")
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.topics().iter().filter(|t| *t == topic).count()
    }

    pub fn payloads(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .expect("bus lock")
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        self.messages
            .lock()
            .expect("bus lock")
            .push((topic.to_owned(), payload));
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────

/// Project repository wrapper with switchable failures.
pub struct FlakyStore {
    inner: Arc<ProjectRepo>,
    fail_list: AtomicBool,
    fail_updates_for: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<ProjectRepo>) -> Self {
        Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_updates_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates_for(&self, id: &str) {
        self.fail_updates_for
            .lock()
            .expect("store lock")
            .insert(id.to_owned());
    }
}

impl StateStore for FlakyStore {
    fn list_projects<'a>(
        &'a self,
        statuses: Option<&'a [ProjectStatus]>,
    ) -> StoreFuture<'a, Vec<Project>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Box::pin(async { Err::<Vec<Project>, _>(AppError::Http("hub unavailable".into())) });
        }
        self.inner.list_projects(statuses)
    }

    fn get_project<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Project>> {
        self.inner.get_project(id)
    }

    fn update_project<'a>(
        &'a self,
        id: &'a str,
        update: ProjectUpdate,
    ) -> StoreFuture<'a, Option<Project>> {
        let failing = self
            .fail_updates_for
            .lock()
            .expect("store lock")
            .contains(id);
        if failing {
            return Box::pin(async { Err::<Option<Project>, _>(AppError::Db("disk I/O error".into())) });
        }
        self.inner.update_project(id, update)
    }
}

/// Store held entirely in memory; every call resolves immediately.
///
/// Used under paused tokio time, where `SQLite` I/O would let the runtime
/// auto-advance the clock past call timeouts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: Mutex<Vec<Project>>,
}

impl MemoryStore {
    pub fn new(projects: &[Project]) -> Self {
        Self {
            projects: Mutex::new(projects.to_vec()),
        }
    }

    pub fn status_of(&self, id: &str) -> ProjectStatus {
        self.projects
            .lock()
            .expect("store lock")
            .iter()
            .find(|p| p.id == id)
            .expect("project exists")
            .status
    }
}

impl StateStore for MemoryStore {
    fn list_projects<'a>(
        &'a self,
        statuses: Option<&'a [ProjectStatus]>,
    ) -> StoreFuture<'a, Vec<Project>> {
        let projects = self.projects.lock().expect("store lock").clone();
        Box::pin(async move { Ok(store::filter_by_status(projects, statuses)) })
    }

    fn get_project<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Project>> {
        let found = self
            .projects
            .lock()
            .expect("store lock")
            .iter()
            .find(|p| p.id == id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn update_project<'a>(
        &'a self,
        id: &'a str,
        update: ProjectUpdate,
    ) -> StoreFuture<'a, Option<Project>> {
        let updated = self
            .projects
            .lock()
            .expect("store lock")
            .iter_mut()
            .find(|p| p.id == id)
            .map(|p| {
                update.apply_to(p);
                p.clone()
            });
        Box::pin(async move { Ok(updated) })
    }
}

// ── Fixtures ────────────────────────────────────────────

/// Defaults with a launch command so session creation is observable.
///
/// The briefing is off so launch input is just the command; tests that
/// cover the briefing turn it back on.
pub fn test_config() -> GlobalConfig {
    let mut config = GlobalConfig::default();
    config.cycle.agent_command = Some("claude".into());
    config.briefing.enabled = false;
    config
}

/// Project with `status`; its session is `proj-{name}`.
pub fn project(name: &str, status: ProjectStatus) -> Project {
    let mut project = Project::new(name.into(), "python".into(), format!("/work/{name}"));
    project.status = status;
    project
}

pub fn session_of(name: &str) -> String {
    format!("proj-{name}")
}

pub async fn seeded_repo(projects: &[Project]) -> (Arc<Database>, Arc<ProjectRepo>) {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let repo = Arc::new(ProjectRepo::new(Arc::clone(&db)));
    for project in projects {
        repo.create(project).await.expect("seed project");
    }
    (db, repo)
}

/// Everything a cycle test needs to drive and inspect a tick.
pub struct Harness {
    pub cycle: OrchestrationCycle,
    pub db: Arc<Database>,
    pub repo: Arc<ProjectRepo>,
    pub store: Arc<FlakyStore>,
    pub backend: Arc<FakeBackend>,
    pub bus: Arc<RecordingBus>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new(projects: &[Project]) -> Self {
        Self::with_config(projects, &test_config()).await
    }

    pub async fn with_config(projects: &[Project], config: &GlobalConfig) -> Self {
        let (db, repo) = seeded_repo(projects).await;
        let store = Arc::new(FlakyStore::new(Arc::clone(&repo)));
        let backend = Arc::new(FakeBackend::new());
        let bus = Arc::new(RecordingBus::default());
        let clock = Arc::new(ManualClock::new());
        let cycle = OrchestrationCycle::new(
            config,
            Arc::clone(&store) as Arc<dyn StateStore>,
            Arc::clone(&backend) as Arc<dyn SessionBackend>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .expect("cycle");
        Self {
            cycle,
            db,
            repo,
            store,
            backend,
            bus,
            clock,
        }
    }

    pub async fn status_of(&self, id: &str) -> ProjectStatus {
        self.repo
            .get_by_id(id)
            .await
            .expect("query")
            .expect("project exists")
            .status
    }

    /// Advance the clock by one default interval and run a tick.
    pub async fn tick(&mut self) -> hub_orchestrator::models::summary::FleetSummary {
        self.clock.advance(Duration::seconds(30));
        self.cycle.run_tick().await.expect("tick")
    }
}

// ── Logs ────────────────────────────────────────────────

/// Captures formatted log output while the returned guard is alive.
///
/// `#[tokio::test]` runs on a current-thread runtime, so a thread-local
/// default subscriber sees every event the cycle emits.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().expect("log lock")).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().expect("log lock").extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
