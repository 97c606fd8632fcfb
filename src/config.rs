//! Configuration file
//!
//! `<config_dir>/mergebot/config.toml` by default:
//!
//! ```toml
//! [gitlab]
//! host = "gitlab.example.com"
//!
//! [git]
//! use_https = true
//!
//! [job]
//! fusion = "rebase"
//! add_reviewers = true
//! ci_timeout_secs = 1800
//! embargo = "Fri 18:00 - Mon 08:00"
//! ```

use crate::error::{Error, Result};
use crate::merge::{CloneProtocol, Embargo, Fusion, MergeJobOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform config/cache dirs
const APP_DIR: &str = "mergebot";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Forge connection
    pub gitlab: GitLabConfig,
    /// Local working copy
    pub git: GitConfig,
    /// Merge job behavior
    pub job: JobConfig,
}

/// `[gitlab]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitLabConfig {
    /// Instance host name
    pub host: String,
    /// Talk plain HTTP to the instance
    pub insecure_http: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            host: "gitlab.com".to_string(),
            insecure_http: false,
        }
    }
}

/// `[git]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    /// Where clones live (one subdirectory per project)
    pub workdir: Option<PathBuf>,
    /// Clone and push over HTTPS with the API token instead of SSH
    pub use_https: bool,
}

/// `[job]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct JobConfig {
    /// Branch update strategy
    pub fusion: Fusion,
    /// Add `Tested-by` trailers
    pub add_tested: bool,
    /// Add `Part-of` trailers
    pub add_part_of: bool,
    /// Add `Reviewed-by` trailers
    pub add_reviewers: bool,
    /// Keep existing `Reviewed-by` trailers
    pub keep_reviewers: bool,
    /// Restore approvals reset by our push
    pub reapprove: bool,
    /// Seconds to wait for approvals to reset
    pub approval_timeout_secs: Option<u64>,
    /// Seconds to wait for CI
    pub ci_timeout_secs: Option<u64>,
    /// Embargo windows, e.g. `"Fri 18:00 - Mon 08:00"`
    pub embargo: Option<String>,
    /// Usernames whose approvals count
    pub custom_allowed_approvers: Option<Vec<String>>,
    /// Approvals required from the allow-list
    pub custom_required_approvals: u32,
    /// Delete the source branch on merge
    pub remove_source_branch: bool,
    /// Push with `ci.skip`
    pub skip_ci: bool,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// API base URL of the instance
    pub fn base_url(&self) -> String {
        let scheme = if self.gitlab.insecure_http {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}", self.gitlab.host)
    }

    /// Working copy for `project_id`
    pub fn workdir(&self, project_id: u64) -> Result<PathBuf> {
        let base = match &self.git.workdir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .ok_or_else(|| Error::Config("no cache directory; set git.workdir".to_string()))?
                .join(APP_DIR),
        };
        Ok(base.join(project_id.to_string()))
    }

    /// Build job options; `token` is needed for HTTPS clone URLs
    pub fn job_options(&self, token: &str) -> Result<MergeJobOptions> {
        let job = &self.job;
        let defaults = MergeJobOptions::default();
        let embargo = match &job.embargo {
            Some(spec) => spec.parse::<Embargo>()?,
            None => Embargo::empty(),
        };
        let clone_protocol = if self.git.use_https {
            CloneProtocol::Https {
                token: token.to_string(),
            }
        } else {
            CloneProtocol::Ssh
        };

        Ok(MergeJobOptions {
            add_tested: job.add_tested,
            add_part_of: job.add_part_of,
            add_reviewers: job.add_reviewers,
            keep_reviewers: job.keep_reviewers,
            reapprove: job.reapprove,
            approval_timeout: job
                .approval_timeout_secs
                .map_or(defaults.approval_timeout, Duration::from_secs),
            embargo,
            ci_timeout: job
                .ci_timeout_secs
                .map_or(defaults.ci_timeout, Duration::from_secs),
            fusion: job.fusion,
            custom_allowed_approvers: job.custom_allowed_approvers.clone(),
            custom_required_approvals: job.custom_required_approvals,
            remove_source_branch: job.remove_source_branch,
            skip_ci: job.skip_ci,
            clone_protocol,
        })
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, a missing default file
/// means all defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    Config::from_toml(&content)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}
