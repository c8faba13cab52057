//! tmux-backed session backend.
//!
//! Every operation shells out to the tmux binary through
//! `tokio::process`. Session targets use the `=name` form so tmux never
//! falls back to prefix matching against a similarly named session.

use std::path::Path;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::config::BackendConfig;
use crate::{AppError, Result};

use super::{BackendFuture, SessionBackend};

/// stderr fragments tmux prints when the target session is absent.
const MISSING_SESSION: &[&str] = &["can't find session", "session not found", "can't find pane"];

/// stderr fragments tmux prints when no server is running at all.
const NO_SERVER: &[&str] = &["no server running", "error connecting to", "no sessions"];

/// Session backend driving a local tmux server.
#[derive(Debug, Clone)]
pub struct TmuxBackend {
    binary: String,
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxBackend {
    /// Backend invoking `binary` (name on `PATH` or absolute path).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Backend configured from the `[backend]` section.
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.tmux_binary.clone())
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(binary = %self.binary, ?args, "tmux");
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AppError::Backend(format!("failed to run {}: {err}", self.binary)))
    }

    /// Run tmux and map a non-zero exit to `NotFound` or `Backend`.
    async fn run_checked(&self, session: &str, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if mentions(&stderr, MISSING_SESSION) || mentions(&stderr, NO_SERVER) {
            return Err(AppError::NotFound(format!("session {session} not found")));
        }
        Err(AppError::Backend(format!(
            "tmux {} failed for {session}: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )))
    }
}

fn target(name: &str) -> String {
    format!("={name}")
}

fn pane_target(name: &str, pane: &str) -> String {
    format!("={name}:{pane}")
}

fn mentions(stderr: &str, needles: &[&str]) -> bool {
    let lowered = stderr.to_lowercase();
    needles.iter().any(|needle| lowered.contains(needle))
}

impl SessionBackend for TmuxBackend {
    fn session_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let output = self.run(&["has-session", "-t", &target(name)]).await?;
            if output.status.success() {
                return Ok(true);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.trim().is_empty()
                || mentions(&stderr, MISSING_SESSION)
                || mentions(&stderr, NO_SERVER)
            {
                return Ok(false);
            }
            Err(AppError::Backend(format!(
                "tmux has-session failed for {name}: {}",
                stderr.trim()
            )))
        })
    }

    fn create_session<'a>(&'a self, name: &'a str, cwd: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let cwd = cwd.to_string_lossy();
            let output = self
                .run(&["new-session", "-d", "-s", name, "-c", &cwd])
                .await?;
            if output.status.success() {
                return Ok(());
            }
            Err(AppError::Backend(format!(
                "tmux new-session failed for {name}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        })
    }

    fn kill_session<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run_checked(name, &["kill-session", "-t", &target(name)])
                .await
                .map(|_| ())
        })
    }

    fn capture_output<'a>(
        &'a self,
        name: &'a str,
        pane: &'a str,
        max_lines: usize,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let start = format!("-{max_lines}");
            let output = self
                .run_checked(
                    name,
                    &[
                        "capture-pane",
                        "-p",
                        "-t",
                        &pane_target(name, pane),
                        "-S",
                        &start,
                    ],
                )
                .await?;
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn send_input<'a>(
        &'a self,
        name: &'a str,
        pane: &'a str,
        text: &'a str,
        submit: bool,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let target = pane_target(name, pane);
            if !text.is_empty() {
                self.run_checked(name, &["send-keys", "-t", &target, "-l", text])
                    .await?;
            }
            if submit {
                self.run_checked(name, &["send-keys", "-t", &target, "Enter"])
                    .await?;
            }
            Ok(())
        })
    }

    fn list_sessions<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let output = self
                .run(&["list-sessions", "-F", "#{session_name}"])
                .await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if mentions(&stderr, NO_SERVER) {
                    return Ok(Vec::new());
                }
                return Err(AppError::Backend(format!(
                    "tmux list-sessions failed: {}",
                    stderr.trim()
                )));
            }
            Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|name| !name.is_empty() && name.starts_with(prefix))
                .map(str::to_owned)
                .collect())
        })
    }
}
