//! Core types for mergebot
//!
//! Snapshots of forge resources as GitLab reports them. Every fetch produces
//! a fresh value; nothing here is refreshed in place.

use serde::{Deserialize, Serialize};

/// Minimal user reference embedded in other resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    /// User ID
    pub id: u64,
    /// Login name
    pub username: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// A GitLab user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// User ID
    pub id: u64,
    /// Login name
    pub username: String,
    /// Display name
    pub name: String,
    /// Primary email (only visible to admins and the user themselves)
    #[serde(default)]
    pub email: Option<String>,
    /// Public profile email
    #[serde(default)]
    pub public_email: Option<String>,
}

impl User {
    /// Best known email address for this user
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.public_email.as_deref())
            .filter(|e| !e.is_empty())
    }
}

/// Merge request state (opened, closed, merged, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MrState {
    /// Open for review
    Opened,
    /// Re-opened after being closed
    Reopened,
    /// Locked while GitLab processes it
    Locked,
    /// Already merged
    Merged,
    /// Closed without merging
    Closed,
    /// Anything GitLab adds later
    Other(String),
}

impl MrState {
    /// Whether the MR is still open for merging
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Opened | Self::Reopened | Self::Locked)
    }
}

impl From<String> for MrState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "opened" => Self::Opened,
            "reopened" => Self::Reopened,
            "locked" => Self::Locked,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Other(s),
        }
    }
}

impl From<MrState> for String {
    fn from(s: MrState) -> Self {
        s.to_string()
    }
}

impl std::fmt::Display for MrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Reopened => write!(f, "reopened"),
            Self::Locked => write!(f, "locked"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A merge request snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct MergeRequest {
    /// Global ID
    pub id: u64,
    /// Per-project internal ID
    pub iid: u64,
    /// Project the MR lives in (the target project)
    pub project_id: u64,
    /// Project owning the source branch
    pub source_project_id: u64,
    /// Project owning the target branch
    pub target_project_id: u64,
    /// Source branch name
    pub source_branch: String,
    /// Target branch name
    pub target_branch: String,
    /// Head commit of the source branch
    #[serde(default)]
    pub sha: Option<String>,
    /// Commit created by accepting the MR (absent for fast-forward merges)
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    /// Coarse state
    pub state: MrState,
    /// MR title
    #[serde(default)]
    pub title: String,
    /// Marked as draft
    #[serde(default)]
    pub draft: bool,
    /// Older GitLab name for `draft`
    #[serde(default)]
    pub work_in_progress: bool,
    /// Squash on merge requested
    #[serde(default)]
    pub squash: bool,
    /// Current assignees
    #[serde(default)]
    pub assignees: Vec<UserRef>,
    /// Author of the MR
    pub author: UserRef,
    /// Web URL
    pub web_url: String,
    /// Asynchronous mergeability assessment
    #[serde(default)]
    pub detailed_merge_status: Option<String>,
    /// All blocking discussions resolved
    #[serde(default = "default_true")]
    pub blocking_discussions_resolved: bool,
    /// Forge-side rebase still running (only with `include_rebase_in_progress`)
    #[serde(default)]
    pub rebase_in_progress: bool,
    /// Error left behind by the last forge-side merge/rebase
    #[serde(default)]
    pub merge_error: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl MergeRequest {
    /// Whether the MR is marked as draft (under either field name)
    pub const fn is_draft(&self) -> bool {
        self.draft || self.work_in_progress
    }

    /// IDs of the current assignees
    pub fn assignee_ids(&self) -> Vec<u64> {
        self.assignees.iter().map(|a| a.id).collect()
    }

    /// Author ID
    pub const fn author_id(&self) -> u64 {
        self.author.id
    }

    /// Head sha, or an empty string when GitLab has not reported one
    pub fn head_sha(&self) -> &str {
        self.sha.as_deref().unwrap_or_default()
    }
}

/// A commit as listed for a merge request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// Commit sha
    pub id: String,
    /// First line of the message
    #[serde(default)]
    pub title: String,
    /// Author display name
    pub author_name: String,
    /// Author email
    pub author_email: String,
}

/// Pipeline status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PipelineStatus {
    /// Created, not yet queued
    Created,
    /// Waiting for a runner resource
    WaitingForResource,
    /// Preparing the environment
    Preparing,
    /// Queued
    Pending,
    /// Executing
    Running,
    /// Passed
    Success,
    /// Failed
    Failed,
    /// Cancellation in progress
    Canceling,
    /// Cancelled
    Canceled,
    /// Skipped entirely
    Skipped,
    /// Waiting for a manual action
    Manual,
    /// Scheduled for later
    Scheduled,
    /// Anything GitLab adds later
    Other(String),
}

impl PipelineStatus {
    /// Statuses where the pipeline is simply still on its way
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Created | Self::Pending | Self::Running)
    }
}

impl From<String> for PipelineStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => Self::Created,
            "waiting_for_resource" => Self::WaitingForResource,
            "preparing" => Self::Preparing,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceling" => Self::Canceling,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            "manual" => Self::Manual,
            "scheduled" => Self::Scheduled,
            _ => Self::Other(s),
        }
    }
}

impl From<PipelineStatus> for String {
    fn from(s: PipelineStatus) -> Self {
        s.to_string()
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::WaitingForResource => "waiting_for_resource",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// A CI pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline ID
    pub id: u64,
    /// Commit the pipeline ran on
    pub sha: String,
    /// Current status
    pub status: PipelineStatus,
    /// Web URL
    #[serde(default)]
    pub web_url: String,
}

/// A repository branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name
    pub name: String,
    /// Whether pushes are restricted
    #[serde(default)]
    pub protected: bool,
}

/// Project access level
///
/// See <https://docs.gitlab.com/ee/api/access_requests.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// No access
    None,
    /// Minimal access
    Minimal,
    /// Guest
    Guest,
    /// Reporter
    Reporter,
    /// Developer
    Developer,
    /// Maintainer
    Maintainer,
    /// Owner
    Owner,
}

impl AccessLevel {
    /// Map GitLab's numeric level, rounding down to the nearest known level
    pub const fn from_level(level: u32) -> Self {
        match level {
            50.. => Self::Owner,
            40..=49 => Self::Maintainer,
            30..=39 => Self::Developer,
            20..=29 => Self::Reporter,
            10..=19 => Self::Guest,
            5..=9 => Self::Minimal,
            _ => Self::None,
        }
    }
}

/// Access grant as embedded in project permissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Numeric access level
    pub access_level: u32,
}

/// Permissions of the current user on a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    /// Direct project membership
    #[serde(default)]
    pub project_access: Option<AccessGrant>,
    /// Membership inherited from the group
    #[serde(default)]
    pub group_access: Option<AccessGrant>,
}

/// A GitLab project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project ID
    pub id: u64,
    /// `group/name`
    #[serde(default)]
    pub path_with_namespace: String,
    /// Default branch
    pub default_branch: String,
    /// SSH clone URL
    pub ssh_url_to_repo: String,
    /// HTTPS clone URL
    pub http_url_to_repo: String,
    /// Pipelines must succeed before merging
    #[serde(default)]
    pub only_allow_merge_if_pipeline_succeeds: bool,
    /// Permissions of the authenticated user
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

impl Project {
    /// Effective access level of the bot on this project.
    ///
    /// GitLab does not always report permissions for nested groups; projects
    /// are only ever handed to the bot with at least developer access, so
    /// that is the fallback.
    pub fn access_level(&self) -> AccessLevel {
        self.permissions
            .as_ref()
            .and_then(|p| p.project_access.as_ref().or(p.group_access.as_ref()))
            .map_or(AccessLevel::Developer, |grant| {
                AccessLevel::from_level(grant.access_level)
            })
    }
}

/// Approver entry in the approvals response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovedBy {
    /// The approving user
    pub user: UserRef,
}

/// Raw approvals response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalsInfo {
    /// Approvals still missing according to GitLab
    #[serde(default)]
    pub approvals_left: u32,
    /// Users who approved
    #[serde(default)]
    pub approved_by: Vec<ApprovedBy>,
}
