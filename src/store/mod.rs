//! Project state store abstraction.
//!
//! The cycle reads the project list and writes partial updates through
//! [`StateStore`]; it never owns project records. Two implementations
//! ship with the daemon: the local `SQLite` repository in
//! [`crate::persistence::project_repo`] and the Hub HTTP client in
//! [`hub_api`].

pub mod hub_api;

use std::future::Future;
use std::pin::Pin;

use crate::models::project::{Project, ProjectStatus, ProjectUpdate};
use crate::Result;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Registry of projects and their lifecycle status.
pub trait StateStore: Send + Sync {
    /// List projects, optionally restricted to `statuses`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Http` if the store is unreachable.
    fn list_projects<'a>(
        &'a self,
        statuses: Option<&'a [ProjectStatus]>,
    ) -> StoreFuture<'a, Vec<Project>>;

    /// Fetch one project; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Http` if the store is unreachable.
    fn get_project<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Project>>;

    /// Apply a partial update; `None` if the project does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Http` if the write fails.
    fn update_project<'a>(
        &'a self,
        id: &'a str,
        update: ProjectUpdate,
    ) -> StoreFuture<'a, Option<Project>>;
}

/// Keep only projects whose status is in `statuses` (all when `None`).
#[must_use]
pub fn filter_by_status(projects: Vec<Project>, statuses: Option<&[ProjectStatus]>) -> Vec<Project> {
    match statuses {
        Some(wanted) => projects
            .into_iter()
            .filter(|p| wanted.contains(&p.status))
            .collect(),
        None => projects,
    }
}
