//! Terminal session backend abstraction.
//!
//! The [`SessionBackend`] trait decouples the orchestration cycle from the
//! terminal multiplexer that actually hosts agent sessions. The cycle only
//! ever names sessions; how they are created, captured and typed into is
//! the backend's business.

pub mod tmux;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::Result;

/// Boxed future returned by backend methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Operations the cycle needs from a terminal multiplexer.
pub trait SessionBackend: Send + Sync {
    /// Whether a session called `name` currently exists.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`](crate::AppError::Backend) if the
    /// multiplexer cannot be queried.
    fn session_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool>;

    /// Create a detached session called `name` rooted at `cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`](crate::AppError::Backend) if the session
    /// cannot be created.
    fn create_session<'a>(&'a self, name: &'a str, cwd: &'a Path) -> BackendFuture<'a, ()>;

    /// Kill the session called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if no such
    /// session exists, or `AppError::Backend` on any other failure.
    fn kill_session<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()>;

    /// Capture the last `max_lines` lines of `pane` in session `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the
    /// session is gone, or `AppError::Backend` if the capture fails.
    fn capture_output<'a>(
        &'a self,
        name: &'a str,
        pane: &'a str,
        max_lines: usize,
    ) -> BackendFuture<'a, String>;

    /// Type `text` into `pane` of session `name`, pressing Enter afterwards
    /// when `submit` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the
    /// session is gone, or `AppError::Backend` if the keys cannot be sent.
    fn send_input<'a>(
        &'a self,
        name: &'a str,
        pane: &'a str,
        text: &'a str,
        submit: bool,
    ) -> BackendFuture<'a, ()>;

    /// Names of all sessions starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`](crate::AppError::Backend) if the
    /// multiplexer cannot be queried.
    fn list_sessions<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>>;
}
