//! GitLab authentication

use crate::auth::AuthSource;
use crate::error::{Error, Result};
use crate::platform::GitLabApi;
use std::env;
use tokio::process::Command;
use tracing::debug;

/// GitLab authentication configuration
#[derive(Clone)]
pub struct GitLabAuthConfig {
    /// Authentication token
    pub token: String,
    /// Where the token was obtained from
    pub source: AuthSource,
    /// GitLab host (e.g., "gitlab.com")
    pub host: String,
}

impl std::fmt::Debug for GitLabAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabAuthConfig")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .field("host", &self.host)
            .finish()
    }
}

/// Get GitLab authentication for `host`
///
/// Priority:
/// 1. `GITLAB_TOKEN` environment variable
/// 2. `GL_TOKEN` environment variable
/// 3. glab CLI (`glab auth token`)
pub async fn get_gitlab_auth(host: &str) -> Result<GitLabAuthConfig> {
    for var in ["GITLAB_TOKEN", "GL_TOKEN"] {
        if let Some(token) = env::var(var).ok().filter(|t| !t.trim().is_empty()) {
            debug!(var, "using token from environment");
            return Ok(GitLabAuthConfig {
                token,
                source: AuthSource::EnvVar,
                host: host.to_string(),
            });
        }
    }

    if let Some(token) = get_glab_cli_token(host).await {
        return Ok(GitLabAuthConfig {
            token,
            source: AuthSource::Cli,
            host: host.to_string(),
        });
    }

    Err(Error::Auth(
        "No GitLab authentication found. Set GITLAB_TOKEN or run `glab auth login`".to_string(),
    ))
}

async fn get_glab_cli_token(host: &str) -> Option<String> {
    let output = Command::new("glab")
        .args(["auth", "token", "--hostname", host])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() { None } else { Some(token) }
}

/// Check the token against the instance, returning the bot's username
pub async fn test_gitlab_auth(api: &dyn GitLabApi) -> Result<String> {
    match api.current_user().await {
        Ok(user) => Ok(user.username),
        Err(Error::GitLabApi {
            status: Some(401 | 403),
            message,
        }) => Err(Error::Auth(format!("Invalid token: {message}"))),
        Err(e) => Err(e),
    }
}
