//! Git working copy operations
//!
//! The merge engine drives the working copy through [`Repository`]; the
//! production implementation [`GitRepo`] shells out to `git`. Every failure
//! at this layer surfaces as a [`GitError`].

mod repo;
mod trailers;

pub use repo::GitRepo;
pub use trailers::trailer_filter_script;

use async_trait::async_trait;
use thiserror::Error;

/// Remote name under which a fork's source project is fetched
pub const SOURCE_REMOTE: &str = "source";

/// Any git-layer failure
#[derive(Debug, Error)]
pub enum GitError {
    /// `git` ran and exited unsuccessfully
    #[error("git {args} failed ({status}): {stderr}")]
    Command {
        /// Arguments, space separated
        args: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// `git` could not be started
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    /// Refused to push with uncommitted changes around
    #[error("working copy is dirty: {0}")]
    Dirty(String),
}

/// Result type alias using [`GitError`]
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Local clone the merge job rewrites and pushes from.
///
/// Not safe for concurrent jobs: one job owns the working copy for its
/// whole duration.
#[async_trait]
pub trait Repository: Send + Sync {
    /// URL of the `origin` remote
    fn remote_url(&self) -> &str;

    /// Add (or repoint) `remote_name` at `remote_url` and fetch it
    async fn fetch(&self, remote_name: &str, remote_url: &str) -> GitResult<()>;

    /// Rebase `source` onto `origin/<target>`, leaving `source` checked out.
    ///
    /// Returns the resulting head sha.
    async fn rebase(
        &self,
        source: &str,
        target: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String>;

    /// Merge `origin/<target>` into `source`, leaving `source` checked out.
    ///
    /// Returns the resulting head sha.
    async fn merge(
        &self,
        source: &str,
        target: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String>;

    /// Push `branch` to `origin`, or to the `source` remote for forks
    async fn push(
        &self,
        branch: &str,
        source_repo_url: Option<&str>,
        force: bool,
        skip_ci: bool,
    ) -> GitResult<()>;

    /// Append `trailer_name: value` lines to every commit in `start_commit..branch`.
    ///
    /// Returns the new head sha.
    async fn tag_with_trailer(
        &self,
        trailer_name: &str,
        trailer_values: &[String],
        branch: &str,
        start_commit: &str,
        keep_trailers: bool,
    ) -> GitResult<String>;

    /// Switch to an existing local branch
    async fn checkout_branch(&self, branch: &str) -> GitResult<()>;

    /// Delete a local branch
    async fn remove_branch(&self, branch: &str) -> GitResult<()>;

    /// Resolve a revision to a sha
    async fn get_commit_hash(&self, rev: &str) -> GitResult<String>;
}
