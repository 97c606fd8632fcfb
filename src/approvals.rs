//! Approval gate
//!
//! Answers whether a merge request has enough qualifying approvals and can
//! restore approvals on behalf of earlier approvers after the bot pushed.
//!
//! Two policies exist: trust GitLab's own arithmetic, or count only
//! approvers from an allow-list against a fixed required number (useful on
//! Community Edition, which has no approval rules).

use crate::error::Result;
use crate::platform::{ApprovalTarget, Capabilities, GitLabApi};
use crate::types::{ApprovalsInfo, UserRef};
use tracing::debug;

/// How sufficiency is computed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    /// Use GitLab's `approvals_left`
    #[default]
    Native,
    /// Count only allow-listed approvers against `required`
    Custom {
        /// Usernames whose approval counts
        allowed_approvers: Vec<String>,
        /// Minimum number of allow-listed approvals
        required: u32,
    },
}

impl ApprovalPolicy {
    /// Pick the policy for a job.
    ///
    /// The custom policy only applies when there is a non-empty allow-list
    /// and a positive requirement.
    pub fn select(allowed_approvers: Option<&[String]>, required: u32) -> Self {
        match allowed_approvers {
            Some(allowed) if !allowed.is_empty() && required > 0 => Self::Custom {
                allowed_approvers: allowed.to_vec(),
                required,
            },
            _ => Self::Native,
        }
    }
}

/// Approval state of one merge request at fetch time
#[derive(Debug, Clone)]
pub struct Approvals {
    project_id: u64,
    iid: u64,
    id: u64,
    info: ApprovalsInfo,
    policy: ApprovalPolicy,
}

impl Approvals {
    /// Fetch approvals for `target` under `policy`.
    ///
    /// Instances without native approvals (CE before 13.2) have no
    /// endpoint to call; they get an empty result that needs nothing.
    pub async fn fetch(
        api: &dyn GitLabApi,
        target: &dyn ApprovalTarget,
        policy: &ApprovalPolicy,
    ) -> Result<Self> {
        let caps = Capabilities::resolve(&api.version().await?);
        let info = if caps.native_approvals {
            api.approvals(&caps.approvals_path(target)).await?
        } else {
            debug!(mr_iid = target.iid(), "no native approvals on this GitLab");
            ApprovalsInfo::default()
        };

        Ok(Self::from_info(
            target.project_id(),
            target.iid(),
            target.id(),
            info,
            policy.clone(),
        ))
    }

    /// Build a snapshot from already-fetched data
    pub const fn from_info(
        project_id: u64,
        iid: u64,
        id: u64,
        info: ApprovalsInfo,
        policy: ApprovalPolicy,
    ) -> Self {
        Self {
            project_id,
            iid,
            id,
            info,
            policy,
        }
    }

    /// Fetch a fresh snapshot of the same merge request
    pub async fn refetch(&self, api: &dyn GitLabApi) -> Result<Self> {
        Self::fetch(api, self, &self.policy).await
    }

    /// Approvals still missing under the active policy
    pub fn approvals_left(&self) -> u32 {
        match &self.policy {
            ApprovalPolicy::Native => self.info.approvals_left,
            ApprovalPolicy::Custom { required, .. } => {
                let counted = u32::try_from(self.allowed_approver_usernames().len())
                    .unwrap_or(u32::MAX);
                required.saturating_sub(counted)
            }
        }
    }

    /// Whether nothing more is needed
    pub fn sufficient(&self) -> bool {
        self.approvals_left() == 0
    }

    /// Everyone who approved
    pub fn approvers(&self) -> impl Iterator<Item = &UserRef> {
        self.info.approved_by.iter().map(|a| &a.user)
    }

    /// Usernames of everyone who approved
    pub fn approver_usernames(&self) -> Vec<String> {
        self.approvers().map(|u| u.username.clone()).collect()
    }

    /// User IDs of everyone who approved
    pub fn approver_ids(&self) -> Vec<u64> {
        self.approvers().map(|u| u.id).collect()
    }

    /// Approvers that count under a custom policy (all of them otherwise)
    pub fn allowed_approver_usernames(&self) -> Vec<String> {
        match &self.policy {
            ApprovalPolicy::Native => self.approver_usernames(),
            ApprovalPolicy::Custom {
                allowed_approvers, ..
            } => self
                .approvers()
                .filter(|u| allowed_approvers.contains(&u.username))
                .map(|u| u.username.clone())
                .collect(),
        }
    }

    /// Re-approve this merge request as each remembered approver.
    ///
    /// Approving is not idempotent; callers must make sure the approvals
    /// were actually reset first.
    pub async fn reapprove(&self, api: &dyn GitLabApi) -> Result<()> {
        self.approve(api, self).await
    }

    /// Approve `target` once per remembered approver, impersonating each
    pub async fn approve(&self, api: &dyn GitLabApi, target: &dyn ApprovalTarget) -> Result<()> {
        let caps = Capabilities::resolve(&api.version().await?);
        let path = caps.approve_path(target);
        for uid in self.approver_ids() {
            debug!(mr_iid = target.iid(), uid, "re-approving");
            api.approve(&path, uid).await?;
        }
        Ok(())
    }
}

impl ApprovalTarget for Approvals {
    fn project_id(&self) -> u64 {
        self.project_id
    }

    fn iid(&self) -> u64 {
        self.iid
    }

    fn id(&self) -> u64 {
        self.id
    }
}
