//! Project repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::project::{Project, ProjectStatus, ProjectUpdate};
use crate::store::{StateStore, StoreFuture};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for project records.
#[derive(Clone)]
pub struct ProjectRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    project_type: String,
    path: String,
    status: String,
    last_heartbeat: Option<String>,
    session_ref: Option<String>,
}

impl ProjectRow {
    /// Convert a database row into the domain model.
    fn into_project(self) -> Result<Project> {
        let status = self.status.parse::<ProjectStatus>()?;
        let last_heartbeat = self
            .last_heartbeat
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(Project {
            id: self.id,
            name: self.name,
            project_type: self.project_type,
            path: self.path,
            status,
            last_heartbeat,
            session_ref: self.session_ref,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid last_heartbeat: {e}")))
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, project_type, path, status, last_heartbeat, session_ref FROM project";

impl ProjectRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new project record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails (including duplicate ids).
    pub async fn create(&self, project: &Project) -> Result<Project> {
        let now = Utc::now().to_rfc3339();
        let last_heartbeat = project.last_heartbeat.map(|at| at.to_rfc3339());

        sqlx::query(
            "INSERT INTO project (id, name, project_type, path, status, last_heartbeat,
             session_ref, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.project_type)
        .bind(&project.path)
        .bind(project.status.as_str())
        .bind(&last_heartbeat)
        .bind(&project.session_ref)
        .bind(&now)
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        Ok(project.clone())
    }

    /// Retrieve a project by identifier.
    ///
    /// Returns `Ok(None)` if the project does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(ProjectRow::into_project).transpose()
    }

    /// List projects in insertion order, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, statuses: Option<&[ProjectStatus]>) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = match statuses {
            Some([]) => return Ok(Vec::new()),
            Some(wanted) => {
                let placeholders = (1..=wanted.len())
                    .map(|n| format!("?{n}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql =
                    format!("{SELECT_COLUMNS} WHERE status IN ({placeholders}) ORDER BY rowid");
                let mut query = sqlx::query_as::<_, ProjectRow>(&sql);
                for status in wanted {
                    query = query.bind(status.as_str());
                }
                query.fetch_all(self.db.as_ref()).await?
            }
            None => {
                sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
                    .fetch_all(self.db.as_ref())
                    .await?
            }
        };

        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Apply a partial update. Fields left `None` keep their stored value.
    ///
    /// Returns `Ok(None)` if the project does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update(&self, id: &str, update: &ProjectUpdate) -> Result<Option<Project>> {
        let now = Utc::now().to_rfc3339();
        let status = update.status.map(ProjectStatus::as_str);
        let last_heartbeat = update.last_heartbeat.map(|at| at.to_rfc3339());

        let result = sqlx::query(
            "UPDATE project SET
                status = COALESCE(?1, status),
                last_heartbeat = COALESCE(?2, last_heartbeat),
                session_ref = COALESCE(?3, session_ref),
                updated_at = ?4
             WHERE id = ?5",
        )
        .bind(status)
        .bind(&last_heartbeat)
        .bind(&update.session_ref)
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }
}

impl StateStore for ProjectRepo {
    fn list_projects<'a>(
        &'a self,
        statuses: Option<&'a [ProjectStatus]>,
    ) -> StoreFuture<'a, Vec<Project>> {
        Box::pin(self.list(statuses))
    }

    fn get_project<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Project>> {
        Box::pin(self.get_by_id(id))
    }

    fn update_project<'a>(
        &'a self,
        id: &'a str,
        update: ProjectUpdate,
    ) -> StoreFuture<'a, Option<Project>> {
        Box::pin(async move { self.update(id, &update).await })
    }
}
