//! Project status transitions.
//!
//! Every status write the cycle makes goes through [`transition`], which
//! checks the lifecycle graph before touching the store.

use tracing::info;

use crate::models::project::{Project, ProjectStatus, ProjectUpdate};
use crate::store::StateStore;
use crate::{AppError, Result};

/// Move `project` to `next`, writing `extra` fields in the same update.
///
/// A transition to the current status is a no-op write of `extra` only.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` if the edge is not in the
/// lifecycle graph, `AppError::StateInconsistency` if the store no longer
/// has the project, or the store's own error if the write fails.
pub async fn transition(
    store: &dyn StateStore,
    project: &Project,
    next: ProjectStatus,
    extra: ProjectUpdate,
) -> Result<Project> {
    let from = project.status;
    let update = if from == next {
        extra
    } else {
        if !from.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "project {} cannot move from {from} to {next}",
                project.id
            )));
        }
        ProjectUpdate {
            status: Some(next),
            ..extra
        }
    };

    let updated = store
        .update_project(&project.id, update)
        .await?
        .ok_or_else(|| {
            AppError::StateInconsistency(format!(
                "project {} disappeared from the store during {from} -> {next}",
                project.id
            ))
        })?;

    if from != next {
        info!(project_id = %project.id, %from, to = %next, "project status changed");
    }
    Ok(updated)
}

/// Write a partial update that must hit an existing project.
///
/// # Errors
///
/// Returns `AppError::StateInconsistency` if the store has no record for
/// the project, or the store's own error if the write fails.
pub async fn touch(store: &dyn StateStore, project: &Project, update: ProjectUpdate) -> Result<Project> {
    store
        .update_project(&project.id, update)
        .await?
        .ok_or_else(|| {
            AppError::StateInconsistency(format!("project {} not found in store", project.id))
        })
}
