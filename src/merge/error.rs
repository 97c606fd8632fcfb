//! Merge job control-flow vocabulary
//!
//! Every abort path of a job ends in one of three domain errors: fail with
//! a reason for the user, stop silently, or report a forge rebase that
//! disagreed with the local one. Anything else is unexpected and propagates.

use crate::error::Error;
use crate::git::GitError;
use thiserror::Error as ThisError;

/// Why a merge job stopped early
#[derive(Debug, ThisError)]
pub enum MergeError {
    /// Abort and tell the user why
    #[error("{0}")]
    CannotMerge(String),

    /// Abort without reporting a failure
    #[error("{0}")]
    Skip(String),

    /// GitLab's rebase produced a different head than the local rebase
    #[error("GitLab rebase ended up with a different commit: I expected {expected} but they got {actual}")]
    RebaseMismatch {
        /// Sha computed locally
        expected: String,
        /// Sha GitLab ended up with
        actual: String,
    },

    /// Unexpected git failure
    #[error(transparent)]
    Git(#[from] GitError),

    /// Unexpected forge failure
    #[error(transparent)]
    Api(#[from] Error),
}

impl MergeError {
    /// Abort with a user-visible reason
    pub fn cannot_merge(reason: impl Into<String>) -> Self {
        Self::CannotMerge(reason.into())
    }

    /// Abort silently
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    /// Map onto a [`JobOutcome`], handing unexpected failures back unchanged
    pub fn into_outcome(self) -> Result<JobOutcome, Self> {
        match self {
            Self::CannotMerge(reason) => Ok(JobOutcome::Failed(reason)),
            Self::Skip(reason) => Ok(JobOutcome::Skipped(reason)),
            Self::RebaseMismatch { expected, actual } => {
                Ok(JobOutcome::Inconsistent { expected, actual })
            }
            other => Err(other),
        }
    }
}

/// Result type alias using [`MergeError`]
pub type JobResult<T> = std::result::Result<T, MergeError>;

/// Terminal state of one merge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The MR was accepted
    Merged {
        /// Merge (or head) commit GitLab reported
        sha: String,
    },
    /// Stopped without failure
    Skipped(String),
    /// Stopped with a reason for the user
    Failed(String),
    /// GitLab's rebase disagreed with the local rebase
    Inconsistent {
        /// Sha computed locally
        expected: String,
        /// Sha GitLab ended up with
        actual: String,
    },
}

impl JobOutcome {
    /// Reason worth reporting on the MR, if any
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Failed(reason) => Some(reason.clone()),
            Self::Inconsistent { expected, actual } => Some(
                MergeError::RebaseMismatch {
                    expected: expected.clone(),
                    actual: actual.clone(),
                }
                .to_string(),
            ),
            Self::Merged { .. } | Self::Skipped(_) => None,
        }
    }

    /// Whether the job stopped silently
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_outcomes() {
        assert_eq!(
            MergeError::cannot_merge("CI failed!").into_outcome().unwrap(),
            JobOutcome::Failed("CI failed!".into())
        );
        assert_eq!(
            MergeError::skip("Merge embargo!").into_outcome().unwrap(),
            JobOutcome::Skipped("Merge embargo!".into())
        );
        assert_eq!(
            MergeError::RebaseMismatch {
                expected: "aaa".into(),
                actual: "bbb".into()
            }
            .into_outcome()
            .unwrap(),
            JobOutcome::Inconsistent {
                expected: "aaa".into(),
                actual: "bbb".into()
            }
        );
    }

    #[test]
    fn test_unexpected_errors_propagate() {
        let err = MergeError::from(Error::api(500, "boom"));
        assert!(matches!(err.into_outcome(), Err(MergeError::Api(_))));
    }

    #[test]
    fn test_failure_reason() {
        let outcome = JobOutcome::Inconsistent {
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        assert_eq!(
            outcome.failure_reason().unwrap(),
            "GitLab rebase ended up with a different commit: I expected aaa but they got bbb"
        );
        assert!(JobOutcome::Skipped("x".into()).failure_reason().is_none());
        assert!(JobOutcome::Skipped("x".into()).is_skipped());
    }
}
