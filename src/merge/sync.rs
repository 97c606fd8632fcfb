//! Fusing, trailer rewriting and branch synchronization
//!
//! The local half of a merge job: bring the source branch up to date with
//! its target, optionally rewrite commit trailers, then publish the result
//! either by force-pushing or by asking GitLab to rebase and checking that
//! it got the same commit.

use crate::error::Error;
use crate::git::GitResult;
use crate::merge::{Fusion, JobResult, MergeError, MergeJob};
use crate::types::{Commit, MergeRequest, User};
use std::collections::HashSet;
use tracing::{debug, info, warn};

const PROTECTED_BRANCH: &str = "Sorry, I can't modify protected branches!";

/// Commit hashes recorded while synchronizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedShas {
    /// Tip of `origin/<target>` the branch was fused onto
    pub target_sha: String,
    /// Head right after fusing
    pub fused_sha: String,
    /// Head after trailer rewriting (same as `fused_sha` without trailers)
    pub final_sha: String,
}

/// How far synchronization got before a git failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fusing,
    RewritingTrailers,
    Publishing,
}

/// `Reviewed-by` values for `reviewers`.
///
/// Fails when an approver also authored one of the commits and nobody else
/// approved.
pub fn reviewer_trailers(commits: &[Commit], reviewers: &[User]) -> JobResult<Vec<String>> {
    let reviewer_emails: HashSet<&str> = reviewers.iter().filter_map(User::contact_email).collect();
    let self_reviewed = commits
        .iter()
        .any(|c| reviewer_emails.contains(c.author_email.as_str()));
    if self_reviewed && reviewers.len() <= 1 {
        return Err(MergeError::cannot_merge(
            "Commits require at least one independent reviewer.",
        ));
    }

    Ok(reviewers
        .iter()
        .map(|u| format!("{} <{}>", u.name, u.contact_email().unwrap_or_default()))
        .collect())
}

impl MergeJob<'_> {
    /// Fuse `source` onto `origin/<target>` with the configured strategy.
    ///
    /// GitLab-side rebases still rebase locally first, to learn the
    /// resulting sha. Leaves `source` checked out.
    pub async fn fuse(
        &self,
        source: &str,
        target: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String> {
        match self.options.fusion {
            Fusion::Merge => self.repo.merge(source, target, source_repo_url, local).await,
            Fusion::Rebase | Fusion::GitlabRebase => {
                self.repo.rebase(source, target, source_repo_url, local).await
            }
        }
    }

    /// Rewrite `Reviewed-by`, `Tested-by` and `Part-of` trailers as configured.
    ///
    /// Returns the new head, or `None` if nothing was rewritten.
    pub async fn inject_trailers(&self, mr: &MergeRequest) -> JobResult<Option<String>> {
        info!(mr_iid = mr.iid, "adding trailers");
        let fusion = self.options.fusion;
        let target_start = format!("origin/{}", mr.target_branch);
        let mut sha = None;

        if self.options.add_reviewers && fusion != Fusion::GitlabRebase {
            let commits = self
                .api
                .merge_request_commits(mr.project_id, mr.iid)
                .await?;
            let approvals = self.fetch_approvals(mr).await?;
            let mut reviewers = Vec::new();
            for uid in approvals.approver_ids() {
                reviewers.push(self.api.user(uid).await?);
            }
            let values = reviewer_trailers(&commits, &reviewers)?;
            sha = Some(
                self.repo
                    .tag_with_trailer(
                        "Reviewed-by",
                        &values,
                        &mr.source_branch,
                        &target_start,
                        self.options.keep_reviewers,
                    )
                    .await?,
            );
        }

        if self.options.add_tested
            && self.project.only_allow_merge_if_pipeline_succeeds
            && fusion == Fusion::Rebase
        {
            // Only the fused head is certified by CI
            let values = [format!("{} <{}>", self.user.name, mr.web_url)];
            sha = Some(
                self.repo
                    .tag_with_trailer(
                        "Tested-by",
                        &values,
                        &mr.source_branch,
                        &format!("{}^", mr.source_branch),
                        false,
                    )
                    .await?,
            );
        }

        if self.options.add_part_of && fusion != Fusion::GitlabRebase {
            let values = [format!("<{}>", mr.web_url)];
            sha = Some(
                self.repo
                    .tag_with_trailer("Part-of", &values, &mr.source_branch, &target_start, false)
                    .await?,
            );
        }

        Ok(sha)
    }

    /// Fuse, rewrite trailers and publish the source branch.
    ///
    /// A git failure first restores the working copy (default branch checked
    /// out, local source branch deleted); if that cleanup fails, its error is
    /// what surfaces. Otherwise the failure is reported by the stage it hit.
    /// A separate source remote must not point at `origin`.
    pub async fn synchronize_and_push(
        &self,
        mr: &MergeRequest,
        source_repo_url: Option<&str>,
        skip_ci: bool,
        add_trailers: bool,
    ) -> JobResult<FusedShas> {
        if source_repo_url == Some(self.repo.remote_url()) {
            return Err(MergeError::Api(Error::Internal(format!(
                "source remote {} is the target's origin",
                self.repo.remote_url()
            ))));
        }
        if source_repo_url.is_none() && mr.source_branch == mr.target_branch {
            return Err(MergeError::cannot_merge(
                "source and target branch seem to coincide!",
            ));
        }

        let mut stage = Stage::Fusing;
        let err = match self
            .fuse_and_publish(mr, source_repo_url, skip_ci, add_trailers, &mut stage)
            .await
        {
            Err(MergeError::Git(err)) => err,
            other => return other,
        };

        warn!(mr_iid = mr.iid, ?stage, error = %err, "git failure while synchronizing");
        let default_branch = &self.project.default_branch;
        if mr.source_branch != *default_branch {
            self.repo.checkout_branch(default_branch).await?;
            self.repo.remove_branch(&mr.source_branch).await?;
        }

        Err(match stage {
            Stage::Fusing => {
                MergeError::cannot_merge("got conflicts while rebasing, your problem now...")
            }
            Stage::RewritingTrailers => {
                MergeError::cannot_merge("failed on filter-branch; check my logs!")
            }
            Stage::Publishing => MergeError::Git(err),
        })
    }

    async fn fuse_and_publish(
        &self,
        mr: &MergeRequest,
        source_repo_url: Option<&str>,
        skip_ci: bool,
        add_trailers: bool,
        stage: &mut Stage,
    ) -> JobResult<FusedShas> {
        let initial_sha = mr.head_sha().to_string();
        let fused_sha = self
            .fuse(&mr.source_branch, &mr.target_branch, source_repo_url, false)
            .await?;
        *stage = Stage::RewritingTrailers;

        // Fusing fetched origin, so the remote target ref is current
        let target_sha = self
            .repo
            .get_commit_hash(&format!("origin/{}", mr.target_branch))
            .await?;
        if fused_sha == target_sha {
            return Err(MergeError::cannot_merge(format!(
                "these changes already exist in branch `{}`",
                mr.target_branch
            )));
        }

        let rewritten = if add_trailers {
            self.inject_trailers(mr).await?
        } else {
            None
        };
        let final_sha = rewritten.unwrap_or_else(|| fused_sha.clone());
        *stage = Stage::Publishing;

        let branch_was_modified = final_sha != initial_sha;
        if self.options.fusion == Fusion::GitlabRebase {
            self.synchronize_via_forge_rebase(mr, Some(&final_sha))
                .await?;
        } else {
            self.push_with_force(mr, branch_was_modified, source_repo_url, skip_ci)
                .await?;
        }

        Ok(FusedShas {
            target_sha,
            fused_sha,
            final_sha,
        })
    }

    /// Force-push the fused source branch
    pub async fn push_with_force(
        &self,
        mr: &MergeRequest,
        branch_was_modified: bool,
        source_repo_url: Option<&str>,
        skip_ci: bool,
    ) -> JobResult<()> {
        let Err(err) = self
            .repo
            .push(&mr.source_branch, source_repo_url, true, skip_ci)
            .await
        else {
            return Ok(());
        };

        warn!(mr_iid = mr.iid, branch = mr.source_branch, error = %err, "push failed");
        if branch_was_modified && self.source_branch_protected(mr).await? {
            return Err(MergeError::cannot_merge(PROTECTED_BRANCH));
        }
        let change_type = if self.options.fusion == Fusion::Merge {
            "merged"
        } else {
            "rebased"
        };
        Err(MergeError::cannot_merge(format!(
            "Failed to push {change_type} changes, check my logs!"
        )))
    }

    /// Let GitLab rebase the MR and check it arrived at `expected_sha`
    /// (default: the local `HEAD`).
    ///
    /// Returns the rebased MR snapshot.
    pub async fn synchronize_via_forge_rebase(
        &self,
        mr: &MergeRequest,
        expected_sha: Option<&str>,
    ) -> JobResult<MergeRequest> {
        let expected = match expected_sha {
            Some(sha) => sha.to_string(),
            None => self.repo.get_commit_hash("HEAD").await?,
        };

        debug!(mr_iid = mr.iid, expected, "asking GitLab to rebase");
        let rebased = match self.api.rebase_merge_request(mr.project_id, mr.iid).await {
            Ok(rebased) => rebased,
            Err(Error::RebaseFailed(reason)) => {
                return Err(MergeError::cannot_merge(format!(
                    "GitLab failed to rebase the branch saying: {reason}"
                )));
            }
            Err(Error::RebaseTimeout) => {
                return Err(MergeError::cannot_merge(
                    "GitLab was taking too long to rebase the branch...",
                ));
            }
            Err(err @ Error::GitLabApi { .. }) => {
                if self.source_branch_protected(mr).await? {
                    return Err(MergeError::cannot_merge(PROTECTED_BRANCH));
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let actual = rebased.head_sha();
        if actual != expected {
            return Err(MergeError::RebaseMismatch {
                expected,
                actual: actual.to_string(),
            });
        }
        Ok(rebased)
    }

    async fn source_branch_protected(&self, mr: &MergeRequest) -> JobResult<bool> {
        let branch = self
            .api
            .branch(mr.source_project_id, &mr.source_branch)
            .await?;
        Ok(branch.protected)
    }
}
