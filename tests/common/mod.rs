//! Shared test utilities

#![allow(dead_code)]

pub mod git_fixture;
pub mod mock_gitlab;
pub mod mock_repo;

// Each test crate uses a different subset
#[allow(unused_imports)]
pub use mock_gitlab::{AcceptCall, ApproveCall, MockError, MockGitLab};
#[allow(unused_imports)]
pub use mock_repo::{FailAt, MockRepo, PushCall, TagCall};

use mergebot::types::{
    ApprovalsInfo, ApprovedBy, Commit, MergeRequest, MrState, Pipeline, PipelineStatus, Project,
    User, UserRef,
};

pub const BOT_ID: u64 = 99;
pub const AUTHOR_ID: u64 = 3;
pub const MR_URL: &str = "https://gitlab.example.com/group/project/-/merge_requests/7";

pub fn bot() -> User {
    User {
        id: BOT_ID,
        username: "mergebot".into(),
        name: "Merge Bot".into(),
        email: Some("bot@example.com".into()),
        public_email: None,
    }
}

pub fn user(id: u64, username: &str, email: &str) -> User {
    User {
        id,
        username: username.into(),
        name: username.to_uppercase(),
        email: Some(email.into()),
        public_email: None,
    }
}

pub fn user_ref(id: u64, username: &str) -> UserRef {
    UserRef {
        id,
        username: username.into(),
        name: username.to_uppercase(),
    }
}

/// Open, assigned-to-the-bot MR `!7` from `feature` into `main`
pub fn mr() -> MergeRequest {
    MergeRequest {
        id: 100,
        iid: 7,
        project_id: 1,
        source_project_id: 1,
        target_project_id: 1,
        source_branch: "feature".into(),
        target_branch: "main".into(),
        sha: Some("abc0".into()),
        merge_commit_sha: None,
        state: MrState::Opened,
        title: "Add feature".into(),
        draft: false,
        work_in_progress: false,
        squash: false,
        assignees: vec![user_ref(BOT_ID, "mergebot")],
        author: user_ref(AUTHOR_ID, "alice"),
        web_url: MR_URL.into(),
        detailed_merge_status: Some("mergeable".into()),
        blocking_discussions_resolved: true,
        rebase_in_progress: false,
        merge_error: None,
    }
}

/// `mr()` with a different head sha
pub fn mr_at(sha: &str) -> MergeRequest {
    MergeRequest {
        sha: Some(sha.into()),
        ..mr()
    }
}

/// `mr()` with a different detailed merge status
pub fn mr_with_status(status: &str) -> MergeRequest {
    MergeRequest {
        detailed_merge_status: Some(status.into()),
        ..mr()
    }
}

pub fn project() -> Project {
    Project {
        id: 1,
        path_with_namespace: "group/project".into(),
        default_branch: "main".into(),
        ssh_url_to_repo: "git@gitlab.example.com:group/project.git".into(),
        http_url_to_repo: "https://gitlab.example.com/group/project.git".into(),
        only_allow_merge_if_pipeline_succeeds: true,
        permissions: None,
    }
}

pub fn pipeline(sha: &str, status: &str) -> Pipeline {
    Pipeline {
        id: 55,
        sha: sha.into(),
        status: PipelineStatus::from(status.to_string()),
        web_url: "https://gitlab.example.com/group/project/-/pipelines/55".into(),
    }
}

pub fn approvals(approvals_left: u32, approvers: &[(u64, &str)]) -> ApprovalsInfo {
    ApprovalsInfo {
        approvals_left,
        approved_by: approvers
            .iter()
            .map(|(id, name)| ApprovedBy {
                user: user_ref(*id, name),
            })
            .collect(),
    }
}

pub fn commit(author_email: &str) -> Commit {
    Commit {
        id: "c0ffee".into(),
        title: "Do the thing".into(),
        author_name: "someone".into(),
        author_email: author_email.into(),
    }
}
