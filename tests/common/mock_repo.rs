//! Mock working copy for testing

#![allow(dead_code)]

use async_trait::async_trait;
use mergebot::git::{GitError, GitResult, Repository};
use std::sync::Mutex;

/// Call record for `tag_with_trailer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCall {
    pub trailer_name: String,
    pub values: Vec<String>,
    pub branch: String,
    pub start_commit: String,
    pub keep_trailers: bool,
}

/// Call record for `push`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCall {
    pub branch: String,
    pub source_repo_url: Option<String>,
    pub force: bool,
    pub skip_ci: bool,
}

/// Which operation should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Fuse,
    Tag,
    Push,
    Checkout,
}

/// Scripted working copy.
///
/// Fusing yields `fused_sha`, each trailer rewrite yields `<name>-sha`, and
/// `origin/*` resolves to `target_sha`.
pub struct MockRepo {
    remote_url: String,
    pub fused_sha: Mutex<String>,
    pub target_sha: Mutex<String>,
    head: Mutex<String>,
    fail_at: Mutex<Vec<FailAt>>,
    // Call tracking
    pub calls: Mutex<Vec<String>>,
    pub tag_calls: Mutex<Vec<TagCall>>,
    pub push_calls: Mutex<Vec<PushCall>>,
}

impl Default for MockRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRepo {
    pub fn new() -> Self {
        Self {
            remote_url: "git@gitlab.example.com:group/project.git".into(),
            fused_sha: Mutex::new("fused".into()),
            target_sha: Mutex::new("target".into()),
            head: Mutex::new("fused".into()),
            fail_at: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            tag_calls: Mutex::new(Vec::new()),
            push_calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `op` fail from now on
    pub fn fail(&self, op: FailAt) {
        self.fail_at.lock().unwrap().push(op);
    }

    pub fn set_fused_sha(&self, sha: &str) {
        *self.fused_sha.lock().unwrap() = sha.to_string();
    }

    pub fn set_target_sha(&self, sha: &str) {
        *self.target_sha.lock().unwrap() = sha.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tag_calls(&self) -> Vec<TagCall> {
        self.tag_calls.lock().unwrap().clone()
    }

    pub fn push_calls(&self) -> Vec<PushCall> {
        self.push_calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: FailAt, args: &str) -> GitResult<()> {
        if self.fail_at.lock().unwrap().contains(&op) {
            return Err(GitError::Command {
                args: args.to_string(),
                status: "exit status: 1".into(),
                stderr: format!("{args} failed"),
            });
        }
        Ok(())
    }

    fn fuse(&self, verb: &str, source: &str, target: &str) -> GitResult<String> {
        self.record(format!("{verb} {source} {target}"));
        self.check(FailAt::Fuse, verb)?;
        let sha = self.fused_sha.lock().unwrap().clone();
        self.head.lock().unwrap().clone_from(&sha);
        Ok(sha)
    }
}

#[async_trait]
impl Repository for MockRepo {
    fn remote_url(&self) -> &str {
        &self.remote_url
    }

    async fn fetch(&self, remote_name: &str, remote_url: &str) -> GitResult<()> {
        self.record(format!("fetch {remote_name} {remote_url}"));
        Ok(())
    }

    async fn rebase(
        &self,
        source: &str,
        target: &str,
        _source_repo_url: Option<&str>,
        _local: bool,
    ) -> GitResult<String> {
        self.fuse("rebase", source, target)
    }

    async fn merge(
        &self,
        source: &str,
        target: &str,
        _source_repo_url: Option<&str>,
        _local: bool,
    ) -> GitResult<String> {
        self.fuse("merge", source, target)
    }

    async fn push(
        &self,
        branch: &str,
        source_repo_url: Option<&str>,
        force: bool,
        skip_ci: bool,
    ) -> GitResult<()> {
        self.push_calls.lock().unwrap().push(PushCall {
            branch: branch.to_string(),
            source_repo_url: source_repo_url.map(String::from),
            force,
            skip_ci,
        });
        self.check(FailAt::Push, "push")
    }

    async fn tag_with_trailer(
        &self,
        trailer_name: &str,
        trailer_values: &[String],
        branch: &str,
        start_commit: &str,
        keep_trailers: bool,
    ) -> GitResult<String> {
        self.tag_calls.lock().unwrap().push(TagCall {
            trailer_name: trailer_name.to_string(),
            values: trailer_values.to_vec(),
            branch: branch.to_string(),
            start_commit: start_commit.to_string(),
            keep_trailers,
        });
        self.check(FailAt::Tag, "filter-branch")?;
        let sha = format!("{}-sha", trailer_name.to_lowercase());
        self.head.lock().unwrap().clone_from(&sha);
        Ok(sha)
    }

    async fn checkout_branch(&self, branch: &str) -> GitResult<()> {
        self.record(format!("checkout {branch}"));
        self.check(FailAt::Checkout, "checkout")
    }

    async fn remove_branch(&self, branch: &str) -> GitResult<()> {
        self.record(format!("remove_branch {branch}"));
        Ok(())
    }

    async fn get_commit_hash(&self, rev: &str) -> GitResult<String> {
        if rev.starts_with("origin/") {
            Ok(self.target_sha.lock().unwrap().clone())
        } else {
            Ok(self.head.lock().unwrap().clone())
        }
    }
}
