//! Merge job state machine
//!
//! One [`MergeJob`] lands one merge request:
//! validate → resolve source → fuse → rewrite trailers → synchronize →
//! await CI → await merge status → accept → release assignment.
//!
//! Each stage returns a [`JobResult`]; domain aborts travel as
//! [`MergeError`] and are folded into a [`JobOutcome`] by [`MergeJob::execute`].

use crate::approvals::{ApprovalPolicy, Approvals};
use crate::error::Error;
use crate::git::{Repository, SOURCE_REMOTE};
use crate::merge::{JobOutcome, JobResult, MergeError, MergeJobOptions};
use crate::platform::GitLabApi;
use crate::types::{AccessLevel, MergeRequest, MrState, PipelineStatus, Project, User};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Spacing between CI status lookups
pub const CI_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Transient CI lookup failures tolerated in a row
pub const MAX_CONSECUTIVE_CI_ERRORS: u32 = 5;

/// Merge status lookups before giving up on a transitional status
pub const MERGE_STATUS_ATTEMPTS: u32 = 3;

/// Spacing between merge status lookups
pub const MERGE_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spacing between approval checks while waiting for a reset
pub const APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// `detailed_merge_status` values that mean "ask again later"
const TRANSITIONAL_MERGE_STATUSES: &[&str] = &["unchecked", "checking", "approvals_syncing"];

/// How the asynchronous mergeability check ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatusResolution {
    /// GitLab reports the MR as mergeable
    Mergeable,
    /// Still transitional after every attempt (or not reported at all)
    Unresolved(String),
}

/// Project owning the source branch, and the remote it was fetched from
#[derive(Debug, Clone)]
pub struct SourceProject {
    /// The source project snapshot
    pub project: Project,
    /// Clone URL of the `source` remote; `None` when source and target are the same project
    pub remote_url: Option<String>,
}

/// Lands a single merge request
pub struct MergeJob<'a> {
    pub(super) api: &'a dyn GitLabApi,
    pub(super) repo: &'a dyn Repository,
    pub(super) user: User,
    pub(super) project: Project,
    pub(super) options: MergeJobOptions,
    pub(super) approval_policy: ApprovalPolicy,
}

impl<'a> MergeJob<'a> {
    /// Create a job acting as `user` on `project`
    pub fn new(
        api: &'a dyn GitLabApi,
        repo: &'a dyn Repository,
        user: User,
        project: Project,
        options: MergeJobOptions,
    ) -> Self {
        let approval_policy = options.approval_policy();
        Self {
            api,
            repo,
            user,
            project,
            options,
            approval_policy,
        }
    }

    /// Options this job was built with
    pub const fn options(&self) -> &MergeJobOptions {
        &self.options
    }

    /// Target project
    pub const fn project(&self) -> &Project {
        &self.project
    }

    /// Approval policy selected for this job
    pub const fn approval_policy(&self) -> &ApprovalPolicy {
        &self.approval_policy
    }

    /// Run the whole job.
    ///
    /// Every domain outcome comes back as `Ok`; only unexpected git or API
    /// failures are `Err`. Unless the job was skipped, the MR is handed back
    /// to its author afterwards; a failure to do so is logged and does not
    /// replace the outcome.
    pub async fn execute(&self, mr: &MergeRequest) -> JobResult<JobOutcome> {
        info!(mr_iid = mr.iid, url = %mr.web_url, "starting merge job");
        let outcome = match self.run(mr).await {
            Ok(sha) => JobOutcome::Merged { sha },
            Err(err) => err.into_outcome()?,
        };

        match &outcome {
            JobOutcome::Merged { sha } => info!(mr_iid = mr.iid, sha, "merged"),
            JobOutcome::Skipped(reason) => info!(mr_iid = mr.iid, reason, "skipped"),
            JobOutcome::Failed(reason) => warn!(mr_iid = mr.iid, reason, "cannot merge"),
            JobOutcome::Inconsistent { expected, actual } => {
                warn!(mr_iid = mr.iid, expected, actual, "GitLab rebase mismatch");
            }
        }

        if !outcome.is_skipped()
            && let Err(err) = self.release_assignment(mr).await
        {
            warn!(mr_iid = mr.iid, error = %err, "failed to hand MR back to its author");
        }
        Ok(outcome)
    }

    async fn run(&self, mr: &MergeRequest) -> JobResult<String> {
        let (mr, approvals) = self.validate_preconditions(mr).await?;
        let source = self.resolve_source_project(&mr).await?;

        let shas = self
            .synchronize_and_push(&mr, source.remote_url.as_deref(), self.options.skip_ci, true)
            .await?;
        debug!(
            mr_iid = mr.iid,
            target = shas.target_sha,
            fused = shas.fused_sha,
            sha = shas.final_sha,
            "branch synchronized"
        );

        let mr = self.api.merge_request(mr.project_id, mr.iid).await?;
        self.maybe_reapprove(&mr, &approvals).await?;

        if self.project.only_allow_merge_if_pipeline_succeeds && !self.options.skip_ci {
            self.await_ci_success(&mr, Some(&shas.final_sha)).await?;
        }

        if let MergeStatusResolution::Unresolved(status) =
            self.await_merge_status_resolution(&mr).await?
        {
            warn!(mr_iid = mr.iid, status, "merge status never settled, accepting anyway");
        }

        self.accept(&mr, &shas.final_sha).await
    }

    /// Refetch `mr` and check every gate.
    ///
    /// Returns the fresh snapshot together with the approvals it was judged on.
    pub async fn validate_preconditions(
        &self,
        mr: &MergeRequest,
    ) -> JobResult<(MergeRequest, Approvals)> {
        let mr = self.api.merge_request(mr.project_id, mr.iid).await?;
        info!(mr_iid = mr.iid, "ensuring MR is mergeable");

        if self.project.access_level() < AccessLevel::Developer {
            return Err(MergeError::cannot_merge(
                "Sorry, I need at least developer access to this project to merge!",
            ));
        }

        if mr.is_draft() {
            return Err(MergeError::cannot_merge(
                "Sorry, I can't merge requests marked as Draft!",
            ));
        }

        if mr.squash && self.options.requests_commit_tagging() {
            return Err(MergeError::cannot_merge(
                "Sorry, merging requests marked as auto-squash would ruin my commit tagging!",
            ));
        }

        let approvals = self.fetch_approvals(&mr).await?;
        if !approvals.sufficient() {
            return Err(MergeError::cannot_merge(format!(
                "Insufficient approvals (have: {:?} missing: {})",
                approvals.approver_usernames(),
                approvals.approvals_left()
            )));
        }

        if !mr.blocking_discussions_resolved {
            return Err(MergeError::cannot_merge(
                "Sorry, I can't merge requests which have unresolved discussions!",
            ));
        }

        match &mr.state {
            state if state.is_open() => {}
            state @ (MrState::Merged | MrState::Closed) => {
                return Err(MergeError::skip(format!(
                    "The merge request is already {state}!"
                )));
            }
            state => {
                return Err(MergeError::cannot_merge(format!(
                    "The merge request is in an unknown state: {state}"
                )));
            }
        }

        if self.during_merge_embargo(Utc::now()) {
            return Err(MergeError::skip("Merge embargo!"));
        }

        if !mr.assignee_ids().contains(&self.user.id) {
            return Err(MergeError::skip("It is not assigned to me anymore!"));
        }

        Ok((mr, approvals))
    }

    /// Approvals of `mr` under this job's policy
    pub async fn fetch_approvals(&self, mr: &MergeRequest) -> JobResult<Approvals> {
        Ok(Approvals::fetch(self.api, mr, &self.approval_policy).await?)
    }

    /// Status of the pipeline built for `sha` (default: the MR head).
    ///
    /// Pipelines are scanned in GitLab's order; the first one on `sha` wins.
    pub async fn poll_ci_status(
        &self,
        mr: &MergeRequest,
        sha: Option<&str>,
    ) -> JobResult<(Option<PipelineStatus>, String)> {
        let sha = sha.unwrap_or_else(|| mr.head_sha());
        let pipelines = self
            .api
            .merge_request_pipelines(mr.target_project_id, mr.iid)
            .await?;

        match pipelines.into_iter().find(|p| p.sha == sha) {
            Some(pipeline) => Ok((
                Some(pipeline.status),
                format!("See pipeline {}.", pipeline.web_url),
            )),
            None => {
                warn!(sha, branch = mr.source_branch, "no pipeline listed");
                Ok((None, "No pipeline associated.".to_string()))
            }
        }
    }

    /// Poll CI until it passes, fails, or would exceed the CI timeout
    pub async fn await_ci_success(&self, mr: &MergeRequest, sha: Option<&str>) -> JobResult<()> {
        let start = Instant::now();
        let sha = sha.unwrap_or_else(|| mr.head_sha()).to_string();
        info!(mr_iid = mr.iid, sha, url = %mr.web_url, "waiting for CI to pass");

        let mut consecutive_errors = 0;
        loop {
            let (status, pipeline_msg) = match self.poll_ci_status(mr, Some(&sha)).await {
                Ok(found) => {
                    consecutive_errors = 0;
                    found
                }
                Err(MergeError::Api(err)) if err.is_transient() => {
                    consecutive_errors += 1;
                    if consecutive_errors > MAX_CONSECUTIVE_CI_ERRORS {
                        return Err(err.into());
                    }
                    warn!(mr_iid = mr.iid, error = %err, attempt = consecutive_errors, "CI lookup failed");
                    sleep(CI_POLL_INTERVAL).await;
                    continue;
                }
                Err(err) => return Err(err),
            };

            match status {
                Some(PipelineStatus::Success) => {
                    info!(mr_iid = mr.iid, "CI passed. {pipeline_msg}");
                    return Ok(());
                }
                Some(PipelineStatus::Skipped) => {
                    info!(mr_iid = mr.iid, "CI skipped. {pipeline_msg}");
                    return Ok(());
                }
                Some(PipelineStatus::Failed) => {
                    return Err(MergeError::cannot_merge(format!("CI failed! {pipeline_msg}")));
                }
                Some(PipelineStatus::Canceling | PipelineStatus::Canceled) => {
                    return Err(MergeError::cannot_merge(format!(
                        "Someone canceled the CI. {pipeline_msg}"
                    )));
                }
                Some(ref status) if status.is_in_progress() => {}
                other => {
                    let status = other.map_or_else(|| "none".to_string(), |s| s.to_string());
                    warn!(mr_iid = mr.iid, status, "suspicious CI status. {pipeline_msg}");
                }
            }

            if start.elapsed() + CI_POLL_INTERVAL >= self.options.ci_timeout {
                return Err(MergeError::cannot_merge(format!(
                    "CI is taking too long. {pipeline_msg}"
                )));
            }
            debug!(secs = CI_POLL_INTERVAL.as_secs(), "waiting before polling CI again");
            sleep(CI_POLL_INTERVAL).await;
        }
    }

    /// Wait for GitLab's asynchronous mergeability check to settle.
    ///
    /// A status that is neither mergeable nor transitional fails at once.
    /// There is no wait after the last attempt.
    pub async fn await_merge_status_resolution(
        &self,
        mr: &MergeRequest,
    ) -> JobResult<MergeStatusResolution> {
        info!(mr_iid = mr.iid, "waiting for detailed merge status to become mergeable");
        let mut last = String::new();

        for attempt in 1..=MERGE_STATUS_ATTEMPTS {
            let current = self.api.merge_request(mr.project_id, mr.iid).await?;
            let Some(status) = current.detailed_merge_status else {
                debug!(mr_iid = mr.iid, "GitLab does not report detailed merge status");
                return Ok(MergeStatusResolution::Unresolved(String::new()));
            };

            if status == "mergeable" {
                info!(mr_iid = mr.iid, attempt, "MR can be merged");
                return Ok(MergeStatusResolution::Mergeable);
            }
            if !TRANSITIONAL_MERGE_STATUSES.contains(&status.as_str()) {
                info!(mr_iid = mr.iid, attempt, status, "MR cannot be merged");
                return Err(MergeError::cannot_merge(format!(
                    "MR has status '{status}' and cannot be merged."
                )));
            }

            info!(mr_iid = mr.iid, attempt, status, "merge status not settled yet");
            last = status;
            if attempt < MERGE_STATUS_ATTEMPTS {
                sleep(MERGE_STATUS_POLL_INTERVAL).await;
            }
        }

        Ok(MergeStatusResolution::Unresolved(last))
    }

    /// Restore approvals our push may have reset.
    ///
    /// Approving is not idempotent, so this first waits (up to the approval
    /// timeout) for GitLab to actually drop them, and only replays them when
    /// they are gone.
    pub async fn maybe_reapprove(&self, mr: &MergeRequest, approvals: &Approvals) -> JobResult<()> {
        if !self.options.reapprove {
            return Ok(());
        }

        let interval_ms = APPROVAL_POLL_INTERVAL.as_millis();
        let mut iterations = (self.options.approval_timeout.as_millis() + interval_ms / 2) / interval_ms;
        info!(mr_iid = mr.iid, "checking if approvals have reset");

        let mut current = approvals.refetch(self.api).await?;
        while current.sufficient() && iterations > 0 {
            debug!(
                mr_iid = mr.iid,
                secs = APPROVAL_POLL_INTERVAL.as_secs(),
                "approvals haven't reset yet"
            );
            sleep(APPROVAL_POLL_INTERVAL).await;
            iterations -= 1;
            current = current.refetch(self.api).await?;
        }

        if !current.sufficient() {
            info!(mr_iid = mr.iid, approvers = ?approvals.approver_usernames(), "re-approving");
            approvals.reapprove(self.api).await?;
        }
        Ok(())
    }

    /// Project owning the source branch.
    ///
    /// For forks, the fork is fetched into the `source` remote.
    pub async fn resolve_source_project(&self, mr: &MergeRequest) -> JobResult<SourceProject> {
        if mr.source_project_id == self.project.id {
            return Ok(SourceProject {
                project: self.project.clone(),
                remote_url: None,
            });
        }

        let project = self.api.project(mr.source_project_id).await?;
        let remote_url = self.options.clone_protocol.clone_url(&project)?;
        debug!(mr_iid = mr.iid, project = project.path_with_namespace, "fetching fork");
        self.repo.fetch(SOURCE_REMOTE, &remote_url).await?;
        Ok(SourceProject {
            project,
            remote_url: Some(remote_url),
        })
    }

    /// Hand the MR back to its author, or unassign when the bot is the author
    pub async fn release_assignment(&self, mr: &MergeRequest) -> JobResult<()> {
        info!(mr_iid = mr.iid, "unassigning from MR");
        let assignees: &[u64] = if mr.author_id() == self.user.id {
            &[]
        } else {
            &[mr.author_id()]
        };
        self.api
            .set_assignees(mr.project_id, mr.iid, assignees)
            .await?;
        Ok(())
    }

    /// Whether `now` falls inside the configured embargo
    pub fn during_merge_embargo(&self, now: DateTime<Utc>) -> bool {
        self.options.embargo.covers(now)
    }

    async fn accept(&self, mr: &MergeRequest, sha: &str) -> JobResult<String> {
        info!(mr_iid = mr.iid, sha, "accepting merge request");
        let accepted = self
            .api
            .accept_merge_request(mr.project_id, mr.iid, sha, self.options.remove_source_branch)
            .await
            .map_err(|err| match err {
                Error::GitLabApi {
                    status: Some(401 | 403),
                    ..
                } => MergeError::cannot_merge("My user cannot accept merge requests!"),
                Error::GitLabApi {
                    status: Some(405 | 406 | 422),
                    message,
                } => MergeError::cannot_merge(format!(
                    "GitLab refused to merge this request: {message}"
                )),
                Error::GitLabApi {
                    status: Some(409), ..
                } => MergeError::cannot_merge(
                    "Someone pushed to branch while we were trying to merge",
                ),
                other => other.into(),
            })?;

        Ok(accepted
            .merge_commit_sha
            .or(accepted.sha)
            .unwrap_or_else(|| sha.to_string()))
    }
}
