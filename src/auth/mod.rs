//! Authentication for GitLab
//!
//! Tokens come from environment variables or the `glab` CLI.

mod gitlab;

pub use gitlab::{GitLabAuthConfig, get_gitlab_auth, test_gitlab_auth};

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from the `glab` CLI
    Cli,
    /// Token from environment variable
    EnvVar,
}
