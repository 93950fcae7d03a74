// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{api::models::*, errors::ApiError};
use async_trait::async_trait;
use debug_ignore::DebugIgnore;
use reqwest::{Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

static USER_AGENT: &str = concat!("skybench/", env!("CARGO_PKG_VERSION"));

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The number of response-body bytes retained in error messages.
const BODY_SNIPPET_LEN: usize = 256;

/// The platform operations the supervision core consumes.
///
/// The production implementation is [`ApiClient`]. Handing the capability to
/// each component, rather than holding a process-global client, is what lets
/// the test suite run scripted platforms in parallel.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Retrieves a single batch.
    async fn get_batch(&self, project_id: ProjectId, batch_id: BatchId)
    -> Result<Batch, ApiError>;

    /// Retrieves one page of a project's batches, ordered newest-first by
    /// creation timestamp.
    async fn list_batches(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<BatchPage, ApiError>;

    /// Retrieves one page of a batch's jobs.
    async fn list_jobs(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<JobPage, ApiError>;

    /// Submits a rerun of `job_ids` against a parent batch, returning the new
    /// batch's identifier. An empty job list reruns the aggregation phase
    /// only.
    async fn rerun_batch(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
        job_ids: &[JobId],
    ) -> Result<BatchId, ApiError>;

    /// Asks the platform to cancel a batch.
    async fn cancel_batch(&self, project_id: ProjectId, batch_id: BatchId)
    -> Result<(), ApiError>;
}

/// Builder for [`ApiClient`].
#[derive(Clone, Debug)]
#[must_use]
pub struct ApiClientBuilder {
    base_url: String,
    token: DebugIgnore<String>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl ApiClientBuilder {
    /// Creates a builder for the given base URL and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: DebugIgnore(token.into()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the connect timeout (default 10 seconds).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-request timeout (default 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|err| ApiError::BuildClient { err })?;
        Ok(ApiClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            token: self.token,
        })
    }
}

/// HTTP client for the platform API.
///
/// Wire format is JSON; authentication is a bearer token attached to every
/// request; pagination is token-based with opaque continuation tokens.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: DebugIgnore<String>,
}

impl ApiClient {
    /// Returns a builder for the given base URL and bearer token.
    pub fn builder(base_url: impl Into<String>, token: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url, token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        debug!(target: "skybench_client::api", "GET {path}");
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&*self.token)
            .query(query)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                path: path.to_owned(),
                err,
            })?;
        self.decode(path, response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!(target: "skybench_client::api", "POST {path}");
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&*self.token)
            .json(body)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                path: path.to_owned(),
                err,
            })?;
        self.decode(path, response).await
    }

    /// POST whose response body carries no information. Used for operations
    /// like cancel where only the status matters.
    async fn post_no_content<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        debug!(target: "skybench_client::api", "POST {path}");
        let mut request = self.client.post(self.url(path)).bearer_auth(&*self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|err| ApiError::Transport {
            path: path.to_owned(),
            err,
        })?;
        self.check_status(path, response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        debug!(target: "skybench_client::api", "DELETE {path}");
        let response = self
            .client
            .delete(self.url(path))
            .bearer_auth(&*self.token)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                path: path.to_owned(),
                err,
            })?;
        self.check_status(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }
        response.json().await.map_err(|err| ApiError::Decode {
            path: path.to_owned(),
            err,
        })
    }

    async fn check_status(&self, path: &str, response: Response) -> Result<(), ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }
        Ok(())
    }
}

/// Maps a non-success response to the [`ApiError`] variant with the right
/// semantics.
fn status_error(path: &str, status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound {
            path: path.to_owned(),
        },
        StatusCode::CONFLICT => ApiError::Conflict {
            path: path.to_owned(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized { status },
        _ => ApiError::Http {
            path: path.to_owned(),
            status,
            body: snippet(body),
        },
    }
}

fn snippet(body: String) -> String {
    if body.len() <= BODY_SNIPPET_LEN {
        return body;
    }
    let mut cut = BODY_SNIPPET_LEN;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

fn push_page_token<'a>(query: &mut Vec<(&'static str, &'a str)>, page_token: Option<&'a str>) {
    if let Some(token) = page_token {
        query.push(("page_token", token));
    }
}

#[async_trait]
impl Platform for ApiClient {
    async fn get_batch(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
    ) -> Result<Batch, ApiError> {
        self.get_json(&format!("/projects/{project_id}/batches/{batch_id}"), &[])
            .await
    }

    async fn list_batches(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<BatchPage, ApiError> {
        let mut query = vec![("order_by", "timestamp")];
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/batches"), &query)
            .await
    }

    async fn list_jobs(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<JobPage, ApiError> {
        let page_size = page_size.to_string();
        let mut query = vec![("page_size", page_size.as_str())];
        push_page_token(&mut query, page_token);
        self.get_json(
            &format!("/projects/{project_id}/batches/{batch_id}/jobs"),
            &query,
        )
        .await
    }

    async fn rerun_batch(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
        job_ids: &[JobId],
    ) -> Result<BatchId, ApiError> {
        let body = RerunBatchRequest {
            job_ids: job_ids.to_vec(),
        };
        let response: RerunBatchResponse = self
            .post_json(
                &format!("/projects/{project_id}/batches/{batch_id}/rerun"),
                &body,
            )
            .await?;
        Ok(response.batch_id)
    }

    async fn cancel_batch(
        &self,
        project_id: ProjectId,
        batch_id: BatchId,
    ) -> Result<(), ApiError> {
        self.post_no_content::<RerunBatchRequest>(
            &format!("/projects/{project_id}/batches/{batch_id}/cancel"),
            None,
        )
        .await
    }
}

impl ApiClient {
    /// Retrieves one page of the projects visible to the caller.
    pub async fn list_projects(&self, page_token: Option<&str>) -> Result<ProjectPage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json("/projects", &query).await
    }

    /// Retrieves a single project.
    pub async fn get_project(&self, project_id: ProjectId) -> Result<Project, ApiError> {
        self.get_json(&format!("/projects/{project_id}"), &[]).await
    }

    /// Creates a project.
    pub async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, ApiError> {
        self.post_json("/projects", request).await
    }

    /// Retrieves one page of a project's systems.
    pub async fn list_systems(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<SystemPage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/systems"), &query)
            .await
    }

    /// Registers a system.
    pub async fn create_system(
        &self,
        project_id: ProjectId,
        request: &CreateSystemRequest,
    ) -> Result<System, ApiError> {
        self.post_json(&format!("/projects/{project_id}/systems"), request)
            .await
    }

    /// Retrieves one page of a project's builds.
    pub async fn list_builds(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<BuildPage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/builds"), &query)
            .await
    }

    /// Registers a build.
    pub async fn create_build(
        &self,
        project_id: ProjectId,
        request: &CreateBuildRequest,
    ) -> Result<Build, ApiError> {
        self.post_json(&format!("/projects/{project_id}/builds"), request)
            .await
    }

    /// Retrieves one page of a project's experiences.
    pub async fn list_experiences(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<ExperiencePage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/experiences"), &query)
            .await
    }

    /// Creates an experience.
    pub async fn create_experience(
        &self,
        project_id: ProjectId,
        request: &CreateExperienceRequest,
    ) -> Result<Experience, ApiError> {
        self.post_json(&format!("/projects/{project_id}/experiences"), request)
            .await
    }

    /// Attaches a tag to an experience.
    pub async fn tag_experience(
        &self,
        project_id: ProjectId,
        experience_id: ExperienceId,
        tag: &str,
    ) -> Result<(), ApiError> {
        let body = TagExperienceRequest {
            tag: tag.to_owned(),
        };
        self.post_no_content(
            &format!("/projects/{project_id}/experiences/{experience_id}/tags"),
            Some(&body),
        )
        .await
    }

    /// Detaches a tag from an experience.
    pub async fn untag_experience(
        &self,
        project_id: ProjectId,
        experience_id: ExperienceId,
        tag: &str,
    ) -> Result<(), ApiError> {
        self.delete(&format!(
            "/projects/{project_id}/experiences/{experience_id}/tags/{tag}"
        ))
        .await
    }

    /// Retrieves one page of a project's test suites.
    pub async fn list_suites(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<SuitePage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/suites"), &query)
            .await
    }

    /// Retrieves a single test suite.
    pub async fn get_suite(
        &self,
        project_id: ProjectId,
        suite_id: SuiteId,
    ) -> Result<Suite, ApiError> {
        self.get_json(&format!("/projects/{project_id}/suites/{suite_id}"), &[])
            .await
    }

    /// Retrieves one page of a project's parameter sweeps.
    pub async fn list_sweeps(
        &self,
        project_id: ProjectId,
        page_token: Option<&str>,
    ) -> Result<SweepPage, ApiError> {
        let mut query = Vec::new();
        push_page_token(&mut query, page_token);
        self.get_json(&format!("/projects/{project_id}/sweeps"), &query)
            .await
    }

    /// Retrieves a single parameter sweep.
    pub async fn get_sweep(
        &self,
        project_id: ProjectId,
        sweep_id: SweepId,
    ) -> Result<Sweep, ApiError> {
        self.get_json(&format!("/projects/{project_id}/sweeps/{sweep_id}"), &[])
            .await
    }

    /// Submits a new batch.
    pub async fn create_batch(
        &self,
        project_id: ProjectId,
        request: &CreateBatchRequest,
    ) -> Result<Batch, ApiError> {
        self.post_json(&format!("/projects/{project_id}/batches"), request)
            .await
    }
}
