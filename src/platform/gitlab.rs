//! GitLab platform service implementation

use crate::error::{Error, Result};
use crate::platform::{GitLabApi, GitLabVersion};
use crate::types::{ApprovalsInfo, Branch, Commit, MergeRequest, Pipeline, Project, User};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How long to wait for a forge-side rebase to finish
const REBASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Polling interval while a forge-side rebase is in progress
const REBASE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Page size used when collecting paginated listings
const PER_PAGE: &str = "100";

/// GitLab service using reqwest
pub struct GitLabService {
    client: Client,
    token: String,
    base_url: String,
    version: OnceCell<GitLabVersion>,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl GitLabService {
    /// Create a service talking to `https://{host}`
    pub fn new(token: String, host: &str) -> Result<Self> {
        Self::with_base_url(token, &format!("https://{host}"))
    }

    /// Create a service for an explicit base URL (scheme included)
    pub fn with_base_url(token: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            version: OnceCell::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    fn mr_path(project_id: u64, iid: u64) -> String {
        format!("/projects/{project_id}/merge_requests/{iid}")
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.api_url(path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.client
            .put(self.api_url(path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.api_url(path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    /// Send a request, turning non-success statuses into [`Error::GitLabApi`]
    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .ok()
            .and_then(|m| {
                m.message
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from))
                    .or(m.error)
            })
            .unwrap_or(body);
        Err(Error::api(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        Ok(Self::send(request).await?.json().await?)
    }

    /// Follow `x-next-page` until the listing is exhausted
    async fn collect_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = String::from("1");
        loop {
            let response = Self::send(
                self.get(path)
                    .query(&[("page", page.as_str()), ("per_page", PER_PAGE)]),
            )
            .await?;
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from);
            let batch: Vec<T> = response.json().await?;
            items.extend(batch);
            match next {
                Some(n) => page = n,
                None => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl GitLabApi for GitLabService {
    async fn version(&self) -> Result<GitLabVersion> {
        let version = self
            .version
            .get_or_try_init(|| async {
                let response: VersionResponse = Self::send_json(self.get("/version")).await?;
                let version = GitLabVersion::parse(&response.version)?;
                debug!(%version, "detected GitLab version");
                Ok::<_, Error>(version)
            })
            .await?;
        Ok(*version)
    }

    async fn current_user(&self) -> Result<User> {
        Self::send_json(self.get("/user")).await
    }

    async fn user(&self, user_id: u64) -> Result<User> {
        Self::send_json(self.get(&format!("/users/{user_id}"))).await
    }

    async fn project(&self, project_id: u64) -> Result<Project> {
        debug!(project_id, "fetching project");
        Self::send_json(self.get(&format!("/projects/{project_id}"))).await
    }

    async fn branch(&self, project_id: u64, name: &str) -> Result<Branch> {
        debug!(project_id, branch = name, "fetching branch");
        Self::send_json(self.get(&format!(
            "/projects/{project_id}/repository/branches/{}",
            urlencoding::encode(name)
        )))
        .await
    }

    async fn merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest> {
        debug!(project_id, mr_iid = iid, "fetching MR");
        Self::send_json(self.get(&Self::mr_path(project_id, iid))).await
    }

    async fn merge_request_commits(&self, project_id: u64, iid: u64) -> Result<Vec<Commit>> {
        let commits: Vec<Commit> = self
            .collect_all_pages(&format!("{}/commits", Self::mr_path(project_id, iid)))
            .await?;
        debug!(mr_iid = iid, count = commits.len(), "listed MR commits");
        Ok(commits)
    }

    async fn merge_request_pipelines(&self, project_id: u64, iid: u64) -> Result<Vec<Pipeline>> {
        let pipelines: Vec<Pipeline> = self
            .collect_all_pages(&format!("{}/pipelines", Self::mr_path(project_id, iid)))
            .await?;
        debug!(mr_iid = iid, count = pipelines.len(), "listed MR pipelines");
        Ok(pipelines)
    }

    async fn approvals(&self, path: &str) -> Result<ApprovalsInfo> {
        Self::send_json(self.get(path)).await
    }

    async fn approve(&self, path: &str, sudo_user: u64) -> Result<()> {
        debug!(path, sudo_user, "approving");
        Self::send(self.post(path).header("Sudo", sudo_user.to_string())).await?;
        Ok(())
    }

    async fn set_assignees(&self, project_id: u64, iid: u64, assignee_ids: &[u64]) -> Result<()> {
        debug!(mr_iid = iid, ?assignee_ids, "setting assignees");
        Self::send(
            self.put(&Self::mr_path(project_id, iid))
                .json(&serde_json::json!({ "assignee_ids": assignee_ids })),
        )
        .await?;
        Ok(())
    }

    async fn rebase_merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest> {
        debug!(mr_iid = iid, "requesting GitLab rebase");
        let path = Self::mr_path(project_id, iid);
        Self::send(self.put(&format!("{path}/rebase"))).await?;

        let started = tokio::time::Instant::now();
        while started.elapsed() < REBASE_TIMEOUT {
            let mr: MergeRequest = Self::send_json(
                self.get(&path)
                    .query(&[("include_rebase_in_progress", "true")]),
            )
            .await?;
            if !mr.rebase_in_progress {
                if let Some(err) = mr.merge_error.as_deref().filter(|e| !e.is_empty()) {
                    return Err(Error::RebaseFailed(err.to_string()));
                }
                debug!(mr_iid = iid, sha = mr.head_sha(), "GitLab rebase finished");
                return Ok(mr);
            }
            tokio::time::sleep(REBASE_POLL_INTERVAL).await;
        }
        Err(Error::RebaseTimeout)
    }

    async fn accept_merge_request(
        &self,
        project_id: u64,
        iid: u64,
        sha: &str,
        remove_source_branch: bool,
    ) -> Result<MergeRequest> {
        debug!(mr_iid = iid, sha, "accepting MR");
        Self::send_json(
            self.put(&format!("{}/merge", Self::mr_path(project_id, iid)))
                .json(&serde_json::json!({
                    "sha": sha,
                    "should_remove_source_branch": remove_source_branch,
                })),
        )
        .await
    }

    async fn create_note(&self, project_id: u64, iid: u64, body: &str) -> Result<()> {
        debug!(mr_iid = iid, "creating MR note");
        Self::send(
            self.post(&format!("{}/notes", Self::mr_path(project_id, iid)))
                .json(&serde_json::json!({ "body": body })),
        )
        .await?;
        Ok(())
    }
}
