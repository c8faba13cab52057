//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::models::signal::MarkerClass;
use crate::{AppError, Result};

/// Orchestration cycle cadence and session conventions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CycleConfig {
    /// Seconds between tick starts.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Upper bound for any single backend or store call.
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,
    /// Lines of scroll-back handed to the probe.
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
    /// Pane (window index or name) the agent runs in.
    #[serde(default = "default_pane")]
    pub pane: String,
    /// Prefix for project session names.
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    /// Prefix for manager-agent session names.
    #[serde(default = "default_manager_prefix")]
    pub manager_prefix: String,
    /// Texts a manager pane must all show to count as active.
    #[serde(default = "default_manager_markers")]
    pub manager_markers: Vec<String>,
    /// Command typed into a freshly created session to launch the agent.
    #[serde(default)]
    pub agent_command: Option<String>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            call_timeout_seconds: default_call_timeout_seconds(),
            capture_lines: default_capture_lines(),
            pane: default_pane(),
            session_prefix: default_session_prefix(),
            manager_prefix: default_manager_prefix(),
            manager_markers: default_manager_markers(),
            agent_command: None,
        }
    }
}

impl CycleConfig {
    /// Tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Per-call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_call_timeout_seconds() -> u64 {
    5
}

fn default_capture_lines() -> usize {
    50
}

fn default_pane() -> String {
    "0".into()
}

fn default_session_prefix() -> String {
    "proj-".into()
}

fn default_manager_prefix() -> String {
    "pm-".into()
}

fn default_manager_markers() -> Vec<String> {
    vec!["PROJECT_MANAGER".into(), "CYCLE".into()]
}

/// Briefing typed into every newly created agent session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BriefingConfig {
    /// Send the briefing after the launch command.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Template with `{name}`, `{project_type}`, `{path}` and `{session}`
    /// placeholders.
    #[serde(default = "default_briefing_template")]
    pub template: String,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template: default_briefing_template(),
        }
    }
}

fn default_briefing_template() -> String {
    crate::orchestrator::briefing::DEFAULT_TEMPLATE.into()
}

/// Liveness classifier thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Consecutive empty captures after which a session is dead.
    #[serde(default = "default_empty_capture_dead_after")]
    pub empty_capture_dead_after: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            empty_capture_dead_after: default_empty_capture_dead_after(),
        }
    }
}

fn default_empty_capture_dead_after() -> u32 {
    3
}

/// Intervention rate limits and retry budget.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    /// Minimum spacing between restarts of one project.
    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown_seconds: u64,
    /// Window in which restart attempts are counted.
    #[serde(default = "default_restart_tracking_window")]
    pub restart_tracking_window_seconds: u64,
    /// Restarts inside the window before escalating to reprovision.
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    /// Minimum spacing between identical auto-answers.
    #[serde(default = "default_auto_answer_debounce")]
    pub auto_answer_debounce_seconds: u64,
    /// Guidance fires on every Nth consecutive stuck tick.
    #[serde(default = "default_guidance_every_stuck_ticks")]
    pub guidance_every_stuck_ticks: u32,
    /// Minimum spacing between guidance messages.
    #[serde(default = "default_guidance_cooldown")]
    pub guidance_cooldown_seconds: u64,
    /// How long intervention history is retained.
    #[serde(default = "default_history_retention")]
    pub history_retention_seconds: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            restart_cooldown_seconds: default_restart_cooldown(),
            restart_tracking_window_seconds: default_restart_tracking_window(),
            max_restart_attempts: default_max_restart_attempts(),
            auto_answer_debounce_seconds: default_auto_answer_debounce(),
            guidance_every_stuck_ticks: default_guidance_every_stuck_ticks(),
            guidance_cooldown_seconds: default_guidance_cooldown(),
            history_retention_seconds: default_history_retention(),
        }
    }
}

impl PolicyConfig {
    /// Minimum spacing between restarts.
    #[must_use]
    pub fn restart_cooldown(&self) -> TimeDelta {
        window(self.restart_cooldown_seconds)
    }

    /// Window in which restart attempts are counted.
    #[must_use]
    pub fn restart_tracking_window(&self) -> TimeDelta {
        window(self.restart_tracking_window_seconds)
    }

    /// Minimum spacing between identical auto-answers.
    #[must_use]
    pub fn auto_answer_debounce(&self) -> TimeDelta {
        window(self.auto_answer_debounce_seconds)
    }

    /// Minimum spacing between guidance messages.
    #[must_use]
    pub fn guidance_cooldown(&self) -> TimeDelta {
        window(self.guidance_cooldown_seconds)
    }

    /// Retention horizon for intervention history.
    #[must_use]
    pub fn history_retention(&self) -> TimeDelta {
        window(self.history_retention_seconds)
    }

    fn windows(&self) -> [(&'static str, u64); 5] {
        [
            ("restart_cooldown_seconds", self.restart_cooldown_seconds),
            (
                "restart_tracking_window_seconds",
                self.restart_tracking_window_seconds,
            ),
            ("auto_answer_debounce_seconds", self.auto_answer_debounce_seconds),
            ("guidance_cooldown_seconds", self.guidance_cooldown_seconds),
            ("history_retention_seconds", self.history_retention_seconds),
        ]
    }
}

/// Upper bound for any policy window.
const MAX_WINDOW_SECONDS: u64 = 366 * 24 * 60 * 60;

fn window(secs: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(secs.min(MAX_WINDOW_SECONDS)).unwrap_or(0))
}

fn default_restart_cooldown() -> u64 {
    60
}

fn default_restart_tracking_window() -> u64 {
    600
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_auto_answer_debounce() -> u64 {
    5
}

fn default_guidance_every_stuck_ticks() -> u32 {
    10
}

fn default_guidance_cooldown() -> u64 {
    600
}

fn default_history_retention() -> u64 {
    3600
}

/// Which state store implementation the daemon uses.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Local `SQLite` database.
    Sqlite,
    /// Remote Hub HTTP API.
    HubApi,
}

/// State store selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Store implementation.
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,
    /// `SQLite` database file (for `sqlite`).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Base URL of the Hub API (for `hub_api`).
    #[serde(default)]
    pub hub_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            db_path: default_db_path(),
            hub_url: None,
        }
    }
}

fn default_store_kind() -> StoreKind {
    StoreKind::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/hub-orchestrator.db")
}

/// Terminal session backend settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Path or name of the tmux binary.
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            tmux_binary: default_tmux_binary(),
        }
    }
}

fn default_tmux_binary() -> String {
    "tmux".into()
}

/// Observability HTTP endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    /// Whether to serve `/health` and `/fleet`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local port; 0 lets the OS pick.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_http_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_http_port() -> u16 {
    8090
}

/// Local IPC settings for the ctl companion.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IpcConfig {
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub name: String,
    /// Shared secret the ctl must present, if set.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            name: default_ipc_name(),
            auth_token: None,
        }
    }
}

fn default_ipc_name() -> String {
    "hub-orchestrator".into()
}

/// Extra or overriding marker declared in config.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MarkerConfig {
    /// Marker id; replaces a built-in marker with the same id.
    pub id: String,
    /// Whether a hit means stuck or dead.
    pub class: MarkerClass,
    /// Substring or regular expression.
    pub pattern: String,
    /// Treat `pattern` as a regular expression.
    #[serde(default)]
    pub regex: bool,
    /// Substring match sensitivity (ignored for regexes; use `(?i)`).
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    /// Safe default answer for stuck prompts.
    #[serde(default)]
    pub answer: Option<String>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Tick cadence and session conventions.
    #[serde(default)]
    pub cycle: CycleConfig,
    /// Briefing sent to new agent sessions.
    #[serde(default)]
    pub briefing: BriefingConfig,
    /// Classifier thresholds.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Intervention policy limits.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// State store selection.
    #[serde(default)]
    pub store: StoreConfig,
    /// Session backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Observability endpoint.
    #[serde(default)]
    pub http: HttpConfig,
    /// Local IPC endpoint.
    #[serde(default)]
    pub ipc: IpcConfig,
    /// Additional probe markers.
    #[serde(default)]
    pub markers: Vec<MarkerConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cycle.interval_seconds == 0 {
            return Err(AppError::Config(
                "cycle.interval_seconds must be greater than zero".into(),
            ));
        }

        if self.cycle.call_timeout_seconds == 0 {
            return Err(AppError::Config(
                "cycle.call_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.cycle.capture_lines == 0 {
            return Err(AppError::Config(
                "cycle.capture_lines must be greater than zero".into(),
            ));
        }

        if self.cycle.session_prefix == self.cycle.manager_prefix {
            return Err(AppError::Config(
                "cycle.session_prefix and cycle.manager_prefix must differ".into(),
            ));
        }

        if self.briefing.enabled && self.briefing.template.trim().is_empty() {
            return Err(AppError::Config(
                "briefing.template must not be empty while briefing.enabled = true".into(),
            ));
        }

        if self.classifier.empty_capture_dead_after == 0 {
            return Err(AppError::Config(
                "classifier.empty_capture_dead_after must be greater than zero".into(),
            ));
        }

        if self.policy.max_restart_attempts == 0 {
            return Err(AppError::Config(
                "policy.max_restart_attempts must be greater than zero".into(),
            ));
        }

        if self.policy.guidance_every_stuck_ticks == 0 {
            return Err(AppError::Config(
                "policy.guidance_every_stuck_ticks must be greater than zero".into(),
            ));
        }

        for (field, secs) in self.policy.windows() {
            if secs > MAX_WINDOW_SECONDS {
                return Err(AppError::Config(format!(
                    "policy.{field} must not exceed {MAX_WINDOW_SECONDS} seconds"
                )));
            }
        }

        if self.store.kind == StoreKind::HubApi
            && !self.store.hub_url.as_deref().is_some_and(|url| !url.is_empty())
        {
            return Err(AppError::Config(
                "store.hub_url is required when store.kind = \"hub_api\"".into(),
            ));
        }

        // Compiling the table surfaces bad regexes at load time.
        crate::probe::markers::MarkerTable::with_overrides(&self.markers)?;

        Ok(())
    }
}
