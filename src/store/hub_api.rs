//! State store backed by the Hub's HTTP API.
//!
//! Endpoints used:
//!
//! * `GET  /api/projects`      → JSON array of projects
//! * `GET  /api/projects/{id}` → one project, `404` when absent
//! * `PUT  /api/projects/{id}` → partial update, returns the merged project

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::models::project::{Project, ProjectStatus, ProjectUpdate};
use crate::{AppError, Result};

use super::{filter_by_status, StateStore, StoreFuture};

/// HTTP client for the Hub project registry.
#[derive(Debug, Clone)]
pub struct HubApiStore {
    client: Client,
    base_url: String,
}

impl HubApiStore {
    /// Store talking to the Hub at `base_url` (trailing slashes ignored).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Store reusing an existing client.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn projects_url(&self) -> String {
        format!("{}/api/projects", self.base_url)
    }

    fn project_url(&self, id: &str) -> String {
        format!("{}/api/projects/{id}", self.base_url)
    }

    async fn fetch_all(&self) -> Result<Vec<Project>> {
        let response = self.client.get(self.projects_url()).send().await?;
        let response = ensure_success(response, "list projects")?;
        Ok(response.json::<Vec<Project>>().await?)
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<Project>> {
        let response = self.client.get(self.project_url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, "get project")?;
        Ok(Some(response.json::<Project>().await?))
    }

    async fn put(&self, id: &str, update: &ProjectUpdate) -> Result<Option<Project>> {
        // PUT upserts unknown ids on the Hub; an absent project stays absent.
        if self.fetch_one(id).await?.is_none() {
            return Ok(None);
        }
        let response = self
            .client
            .put(self.project_url(id))
            .json(update)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, "update project")?;
        let project = response.json::<Project>().await?;
        debug!(project_id = id, status = %project.status, "hub project updated");
        Ok(Some(project))
    }
}

fn ensure_success(response: reqwest::Response, op: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::Http(format!("{op}: hub returned {status}")))
    }
}

impl StateStore for HubApiStore {
    fn list_projects<'a>(
        &'a self,
        statuses: Option<&'a [ProjectStatus]>,
    ) -> StoreFuture<'a, Vec<Project>> {
        Box::pin(async move {
            let projects = self.fetch_all().await?;
            Ok(filter_by_status(projects, statuses))
        })
    }

    fn get_project<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Project>> {
        Box::pin(self.fetch_one(id))
    }

    fn update_project<'a>(
        &'a self,
        id: &'a str,
        update: ProjectUpdate,
    ) -> StoreFuture<'a, Option<Project>> {
        Box::pin(async move { self.put(id, &update).await })
    }
}
