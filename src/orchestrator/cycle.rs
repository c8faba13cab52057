//! One orchestration tick over every project.
//!
//! Each tick lists projects from the store and handles each one according
//! to its status: pending projects get a session, stopping projects lose
//! theirs, and supervised projects run probe → classify → decide →
//! execute. A failure while handling one project is recorded in its
//! report and never stops the rest of the tick. Only a failed project
//! listing aborts the tick.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::backend::SessionBackend;
use crate::bus::{emit, emit_summary, EventBus, OrchestrationEvent};
use crate::classifier::LivenessClassifier;
use crate::config::{BriefingConfig, CycleConfig, GlobalConfig};
use crate::models::intervention::{InterventionAction, InterventionRecord, RestartLedger};
use crate::models::liveness::{Liveness, LivenessState, ManagerState};
use crate::models::project::{Project, ProjectStatus, ProjectUpdate};
use crate::models::signal::Observation;
use crate::models::summary::{FleetSummary, SessionReport};
use crate::policy::guidance;
use crate::policy::InterventionPolicy;
use crate::probe::markers::MarkerTable;
use crate::probe::SessionProbe;
use crate::store::StateStore;
use crate::{AppError, Result};

use super::bookkeeping::Bookkeeping;
use super::bounded;
use super::briefing;
use super::clock::Clock;
use super::lifecycle;
use super::summary::SummaryHandle;

/// The orchestration control loop body.
///
/// `run_tick` takes `&mut self`, so two ticks over the same cycle can
/// never run concurrently.
pub struct OrchestrationCycle {
    cycle: CycleConfig,
    briefing: BriefingConfig,
    store: Arc<dyn StateStore>,
    backend: Arc<dyn SessionBackend>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    probe: SessionProbe,
    classifier: LivenessClassifier,
    policy: InterventionPolicy,
    books: Bookkeeping,
    summary: SummaryHandle,
    tick: u64,
}

impl OrchestrationCycle {
    /// Build a cycle from configuration and its collaborators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured marker table is invalid.
    pub fn new(
        config: &GlobalConfig,
        store: Arc<dyn StateStore>,
        backend: Arc<dyn SessionBackend>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let table = MarkerTable::with_overrides(&config.markers)?;
        Ok(Self {
            cycle: config.cycle.clone(),
            briefing: config.briefing.clone(),
            store,
            backend,
            bus,
            clock,
            probe: SessionProbe::new(table.clone(), config.cycle.capture_lines),
            classifier: LivenessClassifier::from_config(&config.classifier),
            policy: InterventionPolicy::new(config.policy.clone(), table),
            books: Bookkeeping::new(),
            summary: SummaryHandle::new(),
            tick: 0,
        })
    }

    /// Read-only handle to the latest fleet summary.
    #[must_use]
    pub fn summary_handle(&self) -> SummaryHandle {
        self.summary.clone()
    }

    /// Bookkeeping held by the cycle.
    #[must_use]
    pub fn bookkeeping(&self) -> &Bookkeeping {
        &self.books
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    fn call_timeout(&self) -> Duration {
        self.cycle.call_timeout()
    }

    /// Run one tick over all projects.
    ///
    /// # Errors
    ///
    /// Returns the store error if the project list cannot be fetched; the
    /// tick is skipped and no summary is produced. Per-project failures
    /// are reported in the summary instead.
    pub async fn run_tick(&mut self) -> Result<FleetSummary> {
        let span = info_span!("tick", tick = self.tick + 1);
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&mut self) -> Result<FleetSummary> {
        let started_at = self.clock.now();

        let projects = bounded(
            self.call_timeout(),
            "list_projects",
            self.store.list_projects(None),
        )
        .await
        .inspect_err(|err| warn!(%err, "project listing failed, skipping tick"))?;

        self.tick += 1;

        let listed: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        self.books.retain_projects(&listed);

        let mut reports = Vec::with_capacity(projects.len());
        for project in &projects {
            let session = project.session_name(&self.cycle.session_prefix);
            let span = info_span!(
                "project",
                project_id = %project.id,
                session = %session,
                status = %project.status
            );
            let report = self.process_project(project, session).instrument(span).await;
            reports.push(report);
        }

        let now = self.clock.now();
        let policy = self.policy.config();
        let ledger_window = policy
            .restart_tracking_window()
            .max(policy.restart_cooldown());
        self.books.prune(now, policy.history_retention(), ledger_window);

        let summary =
            FleetSummary::from_reports(self.tick, started_at, now, projects.len(), reports);

        info!(
            projects = summary.projects_seen,
            healthy = summary.count(Liveness::Healthy),
            stuck = summary.count(Liveness::Stuck),
            dead = summary.count(Liveness::Dead),
            unknown = summary.count(Liveness::Unknown),
            actions = summary.actions.values().sum::<usize>(),
            escalations = summary.escalations.len(),
            errors = summary.errors,
            "tick complete"
        );

        self.summary.store(summary.clone()).await;
        emit_summary(self.bus.as_ref(), &summary);
        Ok(summary)
    }

    async fn process_project(&mut self, project: &Project, session: String) -> SessionReport {
        let mut report = SessionReport::new(project.id.clone(), session, project.status);

        let outcome = match project.status {
            ProjectStatus::Pending => self.launch(project, &mut report).await,
            ProjectStatus::Stopping => self.stop(project, &mut report).await,
            ProjectStatus::Starting | ProjectStatus::Running | ProjectStatus::Managed => {
                self.supervise(project, &mut report).await;
                Ok(())
            }
            ProjectStatus::Stopped | ProjectStatus::Error => {
                self.books.drop_project(&project.id);
                Ok(())
            }
        };

        if let Err(err) = outcome {
            warn!(%err, transient = err.is_transient(), "project handling failed");
            report.error = Some(err.to_string());
        }
        report
    }

    // ── Pending ─────────────────────────────────────────────

    async fn launch(&mut self, project: &Project, report: &mut SessionReport) -> Result<()> {
        let session = report.session.clone();
        let timeout = self.call_timeout();

        let exists = bounded(
            timeout,
            "session_exists",
            self.backend.session_exists(&session),
        )
        .await?;
        if exists {
            info!("adopting existing session for pending project");
        } else {
            self.create_and_launch(project, &session).await?;
        }
        self.books.mark_known(&session);
        self.books.reset_session(&project.id, &session);

        let updated = self
            .transition(
                project,
                ProjectStatus::Starting,
                ProjectUpdate::default().with_session_ref(session),
            )
            .await?;
        report.status = updated.status;
        Ok(())
    }

    // ── Stopping ────────────────────────────────────────────

    async fn stop(&mut self, project: &Project, report: &mut SessionReport) -> Result<()> {
        self.kill_if_present(&report.session).await?;
        let updated = self
            .transition(project, ProjectStatus::Stopped, ProjectUpdate::default())
            .await?;
        self.books.drop_project(&project.id);
        report.status = updated.status;
        Ok(())
    }

    // ── Supervised ──────────────────────────────────────────

    async fn supervise(&mut self, project: &Project, report: &mut SessionReport) {
        let now = self.clock.now();
        let session = report.session.clone();

        // A failed recreate still lets the policy run so the restart budget
        // can escalate; any other observation failure skips the decision.
        let (observation, may_act) = match self.observe(project, &session, now, report).await {
            Ok(observation) => (observation, true),
            Err(err) => {
                warn!(%err, "session unreachable, classifying dead");
                report.error = Some(err.to_string());
                (Observation::Unreachable, false)
            }
        };

        let previous = self
            .books
            .book(&project.id)
            .filter(|book| book.session == session)
            .and_then(|book| book.liveness.as_ref());
        let state = self.classifier.classify(previous, &observation, now);
        report.liveness = Some(state.liveness);
        debug!(
            liveness = %state.liveness,
            stuck = state.consecutive_stuck,
            empty = state.consecutive_empty,
            markers = ?state.markers,
            "classified"
        );
        self.books.book_mut(&project.id, &session).liveness = Some(state.clone());

        let manager = if matches!(
            project.status,
            ProjectStatus::Running | ProjectStatus::Managed
        ) {
            self.inspect_manager(project).await
        } else {
            None
        };
        report.manager = manager;

        if !may_act {
            return;
        }

        let decision = {
            let book = self.books.book(&project.id);
            let empty_record = InterventionRecord::default();
            let empty_ledger = RestartLedger::default();
            self.policy.decide(
                &state,
                book.map_or(&empty_record, |b| &b.record),
                self.books.ledger(&project.id).unwrap_or(&empty_ledger),
                now,
            )
        };
        report.recommended = decision.recommended.clone();
        report.reason = Some(decision.reason);

        let result = if state.liveness == Liveness::Healthy {
            self.reconcile_healthy(project, &session, &state, manager, now)
                .await
        } else {
            self.execute(project, &session, &decision.action, now).await
        };

        match result {
            Ok(status) => {
                report.status = status;
                report.action = decision.action;
            }
            Err(err) => {
                warn!(%err, action = %decision.action, "intervention failed");
                report.error = Some(err.to_string());
            }
        }
    }

    /// Ensure the session exists, then capture and probe it.
    async fn observe(
        &mut self,
        project: &Project,
        session: &str,
        now: DateTime<Utc>,
        report: &mut SessionReport,
    ) -> Result<Observation> {
        let timeout = self.call_timeout();

        let exists = bounded(timeout, "session_exists", self.backend.session_exists(session)).await?;
        if exists {
            self.books.mark_known(session);
        } else {
            if let Err(err) = self.recreate_missing(project, session, now).await {
                warn!(%err, "session could not be recreated");
                report.error = Some(err.to_string());
                return Ok(Observation::Unreachable);
            }
            report.recreated = true;
        }

        let captured = bounded(
            timeout,
            "capture_output",
            self.backend
                .capture_output(session, &self.cycle.pane, self.cycle.capture_lines),
        )
        .await;

        Ok(match captured {
            Ok(raw) => Observation::Captured(self.probe.probe(&raw, now)),
            Err(err) => {
                debug!(%err, "capture failed");
                Observation::CaptureFailed
            }
        })
    }

    async fn recreate_missing(
        &mut self,
        project: &Project,
        session: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.books.is_known(session) {
            warn!("session disappeared, recreating");
        } else {
            let err = AppError::StateInconsistency(format!(
                "project {} is {} but session {session} has never existed",
                project.id, project.status
            ));
            error!(%err, "recreating session");
        }

        self.books.ledger_mut(&project.id).record(now);
        self.create_and_launch(project, session).await?;
        self.books.mark_known(session);
        self.books.reset_session(&project.id, session);

        emit(
            self.bus.as_ref(),
            &OrchestrationEvent::SessionRecreated {
                project_id: project.id.clone(),
                session: session.to_owned(),
            },
        );
        Ok(())
    }

    /// Healthy: heartbeat, promote `Starting` → `Running`, detect managers.
    async fn reconcile_healthy(
        &mut self,
        project: &Project,
        session: &str,
        state: &LivenessState,
        manager: Option<ManagerState>,
        now: DateTime<Utc>,
    ) -> Result<ProjectStatus> {
        let heartbeat = ProjectUpdate::heartbeat(now);
        let managed = project.status == ProjectStatus::Running
            && manager.is_some_and(ManagerState::is_present);

        match project.status {
            ProjectStatus::Starting => {
                if state.just_recovered() {
                    info!(session, "agent came up healthy");
                }
                let updated = self
                    .transition(project, ProjectStatus::Running, heartbeat)
                    .await?;
                Ok(updated.status)
            }
            ProjectStatus::Running if managed => {
                let updated = self
                    .transition(project, ProjectStatus::Managed, heartbeat)
                    .await?;
                Ok(updated.status)
            }
            _ => {
                let updated = bounded(
                    self.call_timeout(),
                    "update_project",
                    lifecycle::touch(self.store.as_ref(), project, heartbeat),
                )
                .await?;
                Ok(updated.status)
            }
        }
    }

    /// Manager state for `project`, or `None` when it could not be read.
    async fn inspect_manager(&self, project: &Project) -> Option<ManagerState> {
        let manager = format!("{}{}", self.cycle.manager_prefix, project.slug());
        match self.manager_state(&manager).await {
            Ok(ManagerState::Inactive) => {
                warn!(manager = %manager, "project manager may be inactive");
                Some(ManagerState::Inactive)
            }
            Ok(state) => Some(state),
            Err(err) => {
                warn!(manager = %manager, %err, "manager check failed");
                None
            }
        }
    }

    async fn manager_state(&self, manager: &str) -> Result<ManagerState> {
        let timeout = self.call_timeout();
        let exists = bounded(timeout, "session_exists", self.backend.session_exists(manager)).await?;
        if !exists {
            return Ok(ManagerState::Absent);
        }

        let pane = bounded(
            timeout,
            "capture_output",
            self.backend
                .capture_output(manager, &self.cycle.pane, self.cycle.capture_lines),
        )
        .await?;
        let active = self
            .cycle
            .manager_markers
            .iter()
            .all(|marker| pane.contains(marker.as_str()));
        Ok(if active {
            ManagerState::Active
        } else {
            ManagerState::Inactive
        })
    }

    // ── Actions ─────────────────────────────────────────────

    async fn execute(
        &mut self,
        project: &Project,
        session: &str,
        action: &InterventionAction,
        now: DateTime<Utc>,
    ) -> Result<ProjectStatus> {
        match action {
            InterventionAction::None => Ok(project.status),
            InterventionAction::AutoAnswer { marker, answer } => {
                self.type_into(session, answer).await?;
                self.books
                    .book_mut(&project.id, session)
                    .record
                    .push(action.clone(), now);
                info!(marker, answer, "answered prompt");
                emit(
                    self.bus.as_ref(),
                    &OrchestrationEvent::AutoAnswered {
                        project_id: project.id.clone(),
                        session: session.to_owned(),
                        marker: marker.clone(),
                    },
                );
                Ok(project.status)
            }
            InterventionAction::SendGuidance { kind } => {
                self.type_into(session, guidance::message(*kind)).await?;
                self.books
                    .book_mut(&project.id, session)
                    .record
                    .push(action.clone(), now);
                info!(kind = kind.as_str(), "sent guidance");
                emit(
                    self.bus.as_ref(),
                    &OrchestrationEvent::GuidanceSent {
                        project_id: project.id.clone(),
                        session: session.to_owned(),
                        kind: *kind,
                    },
                );
                Ok(project.status)
            }
            InterventionAction::Restart => self.restart(project, session, now).await,
            InterventionAction::Reprovision => self.reprovision(project, session, now).await,
        }
    }

    async fn restart(
        &mut self,
        project: &Project,
        session: &str,
        now: DateTime<Utc>,
    ) -> Result<ProjectStatus> {
        self.kill_if_present(session).await?;
        self.books.ledger_mut(&project.id).record(now);
        self.create_and_launch(project, session).await?;

        self.books.reset_session(&project.id, session);
        self.books.mark_known(session);
        let attempts = self.restart_attempts(&project.id, now);

        let updated = self
            .transition(project, ProjectStatus::Starting, ProjectUpdate::default())
            .await?;

        warn!(attempts, "session restarted");
        emit(
            self.bus.as_ref(),
            &OrchestrationEvent::Restarted {
                project_id: project.id.clone(),
                session: session.to_owned(),
                attempts,
            },
        );
        Ok(updated.status)
    }

    async fn reprovision(
        &mut self,
        project: &Project,
        session: &str,
        now: DateTime<Utc>,
    ) -> Result<ProjectStatus> {
        let attempts = self.restart_attempts(&project.id, now);
        let updated = self
            .transition(project, ProjectStatus::Error, ProjectUpdate::default())
            .await?;
        self.books.drop_project(&project.id);

        error!(attempts, "restart budget exhausted, project escalated to error");
        emit(
            self.bus.as_ref(),
            &OrchestrationEvent::Reprovisioned {
                project_id: project.id.clone(),
                session: session.to_owned(),
                attempts,
            },
        );
        Ok(updated.status)
    }

    fn restart_attempts(&self, project_id: &str, now: DateTime<Utc>) -> usize {
        let since = now - self.policy.config().restart_tracking_window();
        self.books
            .ledger(project_id)
            .map_or(0, |ledger| ledger.count_since(since))
    }

    // ── Backend helpers ─────────────────────────────────────

    async fn create_and_launch(&self, project: &Project, session: &str) -> Result<()> {
        let timeout = self.call_timeout();
        let cwd = working_dir(project);
        bounded(
            timeout,
            "create_session",
            self.backend.create_session(session, &cwd),
        )
        .await?;
        info!(session, cwd = %cwd.display(), "session created");

        if let Some(command) = self.cycle.agent_command.as_deref() {
            self.type_into(session, command).await?;
        }
        if self.briefing.enabled {
            let text = briefing::render(&self.briefing.template, project, session);
            self.type_into(session, &text).await?;
            debug!(session, "briefing sent");
        }
        Ok(())
    }

    async fn kill_if_present(&self, session: &str) -> Result<()> {
        match bounded(
            self.call_timeout(),
            "kill_session",
            self.backend.kill_session(session),
        )
        .await
        {
            Ok(()) => {
                info!(session, "session killed");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                debug!(session, "session already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn type_into(&self, session: &str, text: &str) -> Result<()> {
        bounded(
            self.call_timeout(),
            "send_input",
            self.backend.send_input(session, &self.cycle.pane, text, true),
        )
        .await
    }

    async fn transition(
        &self,
        project: &Project,
        next: ProjectStatus,
        extra: ProjectUpdate,
    ) -> Result<Project> {
        let updated = bounded(
            self.call_timeout(),
            "update_project",
            lifecycle::transition(self.store.as_ref(), project, next, extra),
        )
        .await?;
        if project.status != updated.status {
            emit(
                self.bus.as_ref(),
                &OrchestrationEvent::StatusChanged {
                    project_id: project.id.clone(),
                    from: project.status,
                    to: updated.status,
                },
            );
        }
        Ok(updated)
    }
}

fn working_dir(project: &Project) -> PathBuf {
    if project.path.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(&project.path)
    }
}
