//! GitLab platform access
//!
//! The merge engine talks to the forge exclusively through [`GitLabApi`],
//! so tests can substitute a scripted implementation.

mod capabilities;
mod gitlab;

pub use capabilities::{ApprovalTarget, Capabilities, GitLabVersion, MrKey};
pub use gitlab::GitLabService;

use crate::error::Result;
use crate::types::{
    ApprovalsInfo, Branch, Commit, MergeRequest, Pipeline, Project, User,
};
use async_trait::async_trait;

/// GitLab operations needed to land a merge request
///
/// Every read returns a fresh snapshot; nothing is cached across calls
/// except the instance version.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Version and edition of the instance
    async fn version(&self) -> Result<GitLabVersion>;

    /// The authenticated user (the bot)
    async fn current_user(&self) -> Result<User>;

    /// Fetch a user by ID
    async fn user(&self, user_id: u64) -> Result<User>;

    /// Fetch a project by ID
    async fn project(&self, project_id: u64) -> Result<Project>;

    /// Fetch a branch of a project
    async fn branch(&self, project_id: u64, name: &str) -> Result<Branch>;

    /// Fetch a merge request
    async fn merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest>;

    /// Commits of a merge request
    async fn merge_request_commits(&self, project_id: u64, iid: u64) -> Result<Vec<Commit>>;

    /// Pipelines of a merge request, in GitLab's default order (newest first)
    async fn merge_request_pipelines(&self, project_id: u64, iid: u64) -> Result<Vec<Pipeline>>;

    /// Fetch approvals from a path resolved by [`Capabilities::approvals_path`]
    async fn approvals(&self, path: &str) -> Result<ApprovalsInfo>;

    /// Approve as `sudo_user` via a path resolved by [`Capabilities::approve_path`]
    async fn approve(&self, path: &str, sudo_user: u64) -> Result<()>;

    /// Replace the assignees of a merge request (empty slice unassigns)
    async fn set_assignees(&self, project_id: u64, iid: u64, assignee_ids: &[u64]) -> Result<()>;

    /// Trigger a forge-side rebase and wait for it to finish.
    ///
    /// Returns the refreshed merge request. A rebase GitLab reports as failed
    /// yields [`Error::RebaseFailed`](crate::error::Error::RebaseFailed), one
    /// that never finishes yields
    /// [`Error::RebaseTimeout`](crate::error::Error::RebaseTimeout).
    async fn rebase_merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest>;

    /// Accept (merge) a merge request, pinned to `sha`
    async fn accept_merge_request(
        &self,
        project_id: u64,
        iid: u64,
        sha: &str,
        remove_source_branch: bool,
    ) -> Result<MergeRequest>;

    /// Post a note on a merge request
    async fn create_note(&self, project_id: u64, iid: u64, body: &str) -> Result<()>;
}
