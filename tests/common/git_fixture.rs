//! Real git repositories for working copy and CLI tests

#![allow(dead_code)]

use mergebot::git::GitRepo;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run `git` in `dir`, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Seed", "-c", "user.email=seed@example.com"])
        .args(args)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn commit_file(dir: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
    git(dir, &["add", name]);
    git(dir, &["commit", "-m", message]);
}

/// A bare `origin` with `main` and a `feature` branch that forked before
/// `main` moved on
pub struct GitFixture {
    pub tmp: TempDir,
    pub origin: PathBuf,
    pub seed: PathBuf,
    pub work: PathBuf,
}

impl GitFixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin.git");
        let seed = tmp.path().join("seed");
        let work = tmp.path().join("work");

        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--bare", "-b", "main"]);
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "-b", "main"]);
        git(&seed, &["remote", "add", "origin", origin.to_str().unwrap()]);

        commit_file(&seed, "README", "hello\n", "Initial commit");
        git(&seed, &["push", "origin", "main"]);

        git(&seed, &["checkout", "-b", "feature"]);
        commit_file(&seed, "feature.txt", "feature\n", "Add feature");
        git(&seed, &["push", "origin", "feature"]);

        git(&seed, &["checkout", "main"]);
        commit_file(&seed, "main.txt", "main\n", "Move main on");
        git(&seed, &["push", "origin", "main"]);

        Self {
            tmp,
            origin,
            seed,
            work,
        }
    }

    pub fn origin_url(&self) -> &str {
        self.origin.to_str().unwrap()
    }

    /// Clone of `origin` at `work`, committing as the bot
    pub async fn repo(&self) -> GitRepo {
        let repo = GitRepo::new(&self.work, self.origin_url())
            .with_identity("Merge Bot", "bot@example.com");
        repo.ensure_cloned().await.unwrap();
        repo
    }

    pub fn origin_sha(&self, rev: &str) -> String {
        git(&self.origin, &["rev-parse", rev])
    }
}
