//! Merge job configuration

use crate::approvals::ApprovalPolicy;
use crate::error::{Error, Result};
use crate::merge::Embargo;
use crate::types::Project;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default time to wait for CI to finish
pub const DEFAULT_CI_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default time to wait for approvals to reset after a push
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(0);

/// How source-branch commits are integrated onto the target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fusion {
    /// Merge the target branch into the source branch
    Merge,
    /// Rebase locally and force-push
    #[default]
    Rebase,
    /// Let GitLab rebase, checking its result against a local rebase
    GitlabRebase,
}

impl std::fmt::Display for Fusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
            Self::GitlabRebase => write!(f, "gitlab_rebase"),
        }
    }
}

impl std::str::FromStr for Fusion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(Self::Merge),
            "rebase" => Ok(Self::Rebase),
            "gitlab_rebase" | "gitlab-rebase" => Ok(Self::GitlabRebase),
            _ => Err(Error::Config(format!(
                "unknown fusion {s:?} (expected merge, rebase or gitlab_rebase)"
            ))),
        }
    }
}

/// How the bot reaches project repositories
#[derive(Clone, Default, PartialEq, Eq)]
pub enum CloneProtocol {
    /// `ssh_url_to_repo`, authenticated by the ambient SSH agent/key
    #[default]
    Ssh,
    /// `http_url_to_repo` with the API token as `oauth2` credentials
    Https {
        /// Token injected into the URL
        token: String,
    },
}

impl std::fmt::Debug for CloneProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssh => write!(f, "Ssh"),
            Self::Https { .. } => write!(f, "Https {{ token: <redacted> }}"),
        }
    }
}

impl CloneProtocol {
    /// Clone URL of `project` under this protocol
    pub fn clone_url(&self, project: &Project) -> Result<String> {
        match self {
            Self::Ssh => Ok(project.ssh_url_to_repo.clone()),
            Self::Https { token } => {
                let mut url = Url::parse(&project.http_url_to_repo).map_err(|e| {
                    Error::Config(format!("bad clone URL {}: {e}", project.http_url_to_repo))
                })?;
                url.set_username("oauth2")
                    .and_then(|()| url.set_password(Some(token)))
                    .map_err(|()| {
                        Error::Config(format!(
                            "cannot add credentials to {}",
                            project.http_url_to_repo
                        ))
                    })?;
                Ok(url.into())
            }
        }
    }
}

/// Behavior switches for one merge job, fixed at construction
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct MergeJobOptions {
    /// Add `Tested-by` trailers (rebase fusion on pipeline-gated projects only)
    pub add_tested: bool,
    /// Add a `Part-of` trailer pointing at the MR
    pub add_part_of: bool,
    /// Add `Reviewed-by` trailers for every approver
    pub add_reviewers: bool,
    /// Keep `Reviewed-by` trailers already present
    pub keep_reviewers: bool,
    /// Restore approvals lost by the bot's push
    pub reapprove: bool,
    /// How long to wait for approvals to reset after pushing
    pub approval_timeout: Duration,
    /// Windows during which nothing is merged
    pub embargo: Embargo,
    /// How long to wait for CI
    pub ci_timeout: Duration,
    /// Branch update strategy
    pub fusion: Fusion,
    /// Usernames whose approvals count (custom approval policy)
    pub custom_allowed_approvers: Option<Vec<String>>,
    /// Approvals required under the custom policy
    pub custom_required_approvals: u32,
    /// Delete the source branch when accepting
    pub remove_source_branch: bool,
    /// Push with `ci.skip`, skipping the CI wait
    pub skip_ci: bool,
    /// How fork remotes are reached
    pub clone_protocol: CloneProtocol,
}

impl Default for MergeJobOptions {
    fn default() -> Self {
        Self {
            add_tested: false,
            add_part_of: false,
            add_reviewers: false,
            keep_reviewers: false,
            reapprove: false,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            embargo: Embargo::empty(),
            ci_timeout: DEFAULT_CI_TIMEOUT,
            fusion: Fusion::default(),
            custom_allowed_approvers: None,
            custom_required_approvals: 0,
            remove_source_branch: false,
            skip_ci: false,
            clone_protocol: CloneProtocol::default(),
        }
    }
}

impl MergeJobOptions {
    /// Whether any trailer rewriting is requested
    pub const fn requests_commit_tagging(&self) -> bool {
        self.add_tested || self.add_part_of || self.add_reviewers
    }

    /// Approval policy selected by these options
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::select(
            self.custom_allowed_approvers.as_deref(),
            self.custom_required_approvals,
        )
    }
}
