//! Shared command context for CLI commands

use mergebot::auth::{GitLabAuthConfig, get_gitlab_auth};
use mergebot::config::{Config, load_config};
use mergebot::error::Result;
use mergebot::platform::GitLabService;
use std::path::Path;
use tracing::debug;

/// Setup shared by every command: configuration, token and API client
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Token and where it came from
    pub auth: GitLabAuthConfig,
    /// GitLab client
    pub api: GitLabService,
}

impl CommandContext {
    /// Load config (default location unless `config_path`), find a token
    /// and build the API client
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        let auth = get_gitlab_auth(&config.gitlab.host).await?;
        debug!(host = config.gitlab.host, source = ?auth.source, "authenticated");
        let api = GitLabService::with_base_url(auth.token.clone(), &config.base_url())?;
        Ok(Self { config, auth, api })
    }
}
