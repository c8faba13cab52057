//! `SQLite` schema bootstrap logic.
//!
//! Table definitions use `CREATE TABLE IF NOT EXISTS` and are re-run on
//! every daemon startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS project (
    id              TEXT PRIMARY KEY NOT NULL,
    name            TEXT NOT NULL,
    project_type    TEXT NOT NULL DEFAULT '',
    path            TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL CHECK(status IN ('pending','starting','running','managed','stopping','stopped','error')),
    last_heartbeat  TEXT,
    session_ref     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_project_status ON project(status);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
