//! `git` command-line backed repository

use super::{GitError, GitResult, Repository, SOURCE_REMOTE, trailer_filter_script};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
enum FuseStrategy {
    Rebase,
    Merge,
}

/// A local clone driven through the `git` binary
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    remote_url: String,
    identity: Option<(String, String)>,
}

impl GitRepo {
    /// Use the clone at `path` whose `origin` is `remote_url`
    pub fn new(path: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            remote_url: remote_url.into(),
            identity: None,
        }
    }

    /// Commit as `name <email>` when rewriting history
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    /// Path of the working copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone `origin` into the working copy path unless a clone is already there
    pub async fn ensure_cloned(&self) -> GitResult<()> {
        if self.path.join(".git").exists() {
            debug!(path = %self.path.display(), "reusing existing clone");
            return self.run(&["remote", "set-url", "origin", self.remote_url.as_str()]).await.map(drop);
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(path = %self.path.display(), "cloning");
        let path = self.path.to_string_lossy().into_owned();
        let output = self
            .command(None)
            .args(["clone", "--origin", "origin", self.remote_url.as_str(), path.as_str()])
            .output()
            .await?;
        check_output(&["clone", self.remote_url.as_str(), path.as_str()], &output).map(drop)
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={name}"))
                .arg("-c")
                .arg(format!("user.email={email}"));
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_MERGE_AUTOEDIT", "no")
            .env("FILTER_BRANCH_SQUELCH_WARNING", "1")
            .kill_on_drop(true);
        cmd
    }

    /// Run `git <args>` in the working copy, returning trimmed stdout
    async fn run(&self, args: &[&str]) -> GitResult<String> {
        debug!(args = args.join(" "), "git");
        let output = self.command(Some(&self.path)).args(args).output().await?;
        check_output(args, &output)
    }

    async fn fuse_branch(
        &self,
        strategy: FuseStrategy,
        branch: &str,
        target_branch: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String> {
        if local {
            self.run(&["checkout", branch, "--"]).await?;
        } else {
            self.run(&["fetch", "--prune", "origin"]).await?;
            let start = if source_repo_url.is_some() {
                self.run(&["fetch", SOURCE_REMOTE]).await?;
                format!("{SOURCE_REMOTE}/{branch}")
            } else {
                format!("origin/{branch}")
            };
            self.run(&["checkout", "-B", branch, start.as_str(), "--"]).await?;
        }

        let target_ref = format!("origin/{target_branch}");
        let (verb, args): (&str, Vec<&str>) = match strategy {
            FuseStrategy::Rebase => ("rebase", vec!["rebase", target_ref.as_str()]),
            FuseStrategy::Merge => ("merge", vec!["merge", "--no-edit", target_ref.as_str()]),
        };
        if let Err(err) = self.run(&args).await {
            if let Err(abort_err) = self.run(&[verb, "--abort"]).await {
                warn!(error = %abort_err, "failed to abort {verb}");
            }
            return Err(err);
        }
        self.get_commit_hash("HEAD").await
    }
}

fn check_output(args: &[&str], output: &std::process::Output) -> GitResult<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    Err(GitError::Command {
        args: args.join(" "),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[async_trait]
impl Repository for GitRepo {
    fn remote_url(&self) -> &str {
        &self.remote_url
    }

    async fn fetch(&self, remote_name: &str, remote_url: &str) -> GitResult<()> {
        let remotes = self.run(&["remote"]).await?;
        if remotes.lines().any(|r| r.trim() == remote_name) {
            self.run(&["remote", "set-url", remote_name, remote_url]).await?;
        } else {
            self.run(&["remote", "add", remote_name, remote_url]).await?;
        }
        self.run(&["fetch", "--prune", remote_name]).await?;
        Ok(())
    }

    async fn rebase(
        &self,
        source: &str,
        target: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String> {
        self.fuse_branch(FuseStrategy::Rebase, source, target, source_repo_url, local)
            .await
    }

    async fn merge(
        &self,
        source: &str,
        target: &str,
        source_repo_url: Option<&str>,
        local: bool,
    ) -> GitResult<String> {
        self.fuse_branch(FuseStrategy::Merge, source, target, source_repo_url, local)
            .await
    }

    async fn push(
        &self,
        branch: &str,
        source_repo_url: Option<&str>,
        force: bool,
        skip_ci: bool,
    ) -> GitResult<()> {
        let status = self.run(&["status", "--porcelain"]).await?;
        if !status.is_empty() {
            return Err(GitError::Dirty(status));
        }

        let remote = if source_repo_url.is_some() {
            SOURCE_REMOTE
        } else {
            "origin"
        };
        let refspec = format!("{branch}:{branch}");
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        if skip_ci {
            args.extend(["-o", "ci.skip"]);
        }
        args.extend([remote, refspec.as_str()]);
        self.run(&args).await.map(drop)
    }

    async fn tag_with_trailer(
        &self,
        trailer_name: &str,
        trailer_values: &[String],
        branch: &str,
        start_commit: &str,
        keep_trailers: bool,
    ) -> GitResult<String> {
        let script = trailer_filter_script(trailer_name, trailer_values, keep_trailers);
        let range = format!("{start_commit}..{branch}");
        if let Err(err) = self
            .run(&["filter-branch", "--force", "--msg-filter", script.as_str(), range.as_str()])
            .await
        {
            if let Err(reset_err) = self.run(&["reset", "--hard"]).await {
                warn!(error = %reset_err, "failed to reset after filter-branch");
            }
            return Err(err);
        }
        self.get_commit_hash("HEAD").await
    }

    async fn checkout_branch(&self, branch: &str) -> GitResult<()> {
        self.run(&["checkout", branch, "--"]).await.map(drop)
    }

    async fn remove_branch(&self, branch: &str) -> GitResult<()> {
        self.run(&["branch", "-D", branch]).await.map(drop)
    }

    async fn get_commit_hash(&self, rev: &str) -> GitResult<String> {
        self.run(&["rev-parse", rev]).await
    }
}
