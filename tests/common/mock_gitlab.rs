//! Mock GitLab API for testing
//!
//! Hand-written like the rest of the test doubles: every method records its
//! call and replays a scripted response. Scripts are queues whose last entry
//! sticks, so `[pending, pending, success]` answers `success` forever after
//! the third call.

#![allow(dead_code)]

use async_trait::async_trait;
use mergebot::error::{Error, Result};
use mergebot::platform::{GitLabApi, GitLabVersion};
use mergebot::types::{ApprovalsInfo, Branch, Commit, MergeRequest, Pipeline, Project, User};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Cloneable stand-in for [`Error`], which is not `Clone`
#[derive(Debug, Clone)]
pub enum MockError {
    /// `Error::RequestTimeout`
    Timeout,
    /// `Error::GitLabApi` with a status
    Status(u16, String),
    /// `Error::RebaseFailed`
    RebaseFailed(String),
    /// `Error::RebaseTimeout`
    RebaseTimeout,
}

impl MockError {
    fn to_error(&self) -> Error {
        match self {
            Self::Timeout => Error::RequestTimeout("operation timed out".into()),
            Self::Status(status, message) => Error::api(*status, message.clone()),
            Self::RebaseFailed(msg) => Error::RebaseFailed(msg.clone()),
            Self::RebaseTimeout => Error::RebaseTimeout,
        }
    }
}

type Scripted<T> = std::result::Result<T, MockError>;

/// Response queue; the last response repeats once the rest are used up
pub struct Script<T> {
    queue: Mutex<VecDeque<Scripted<T>>>,
}

impl<T: Clone> Script<T> {
    fn new(initial: Scripted<T>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from([initial])),
        }
    }

    /// Replace the script
    pub fn set(&self, responses: Vec<Scripted<T>>) {
        assert!(!responses.is_empty(), "script needs at least one response");
        *self.queue.lock().unwrap() = responses.into();
    }

    fn next(&self) -> Result<T> {
        let mut queue = self.queue.lock().unwrap();
        let response = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };
        response.map_err(|e| e.to_error())
    }
}

/// Call record for `approve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveCall {
    pub path: String,
    pub sudo_user: u64,
}

/// Call record for `accept_merge_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptCall {
    pub iid: u64,
    pub sha: String,
    pub remove_source_branch: bool,
}

/// Scripted GitLab
pub struct MockGitLab {
    pub version: Mutex<GitLabVersion>,
    pub bot: User,
    current_user_error: Mutex<Option<MockError>>,
    assignees_error: Mutex<Option<MockError>>,
    users: Mutex<HashMap<u64, User>>,
    projects: Mutex<HashMap<u64, Project>>,
    protected_branches: Mutex<Vec<String>>,
    pub commits: Mutex<Vec<Commit>>,
    pub merge_requests: Script<MergeRequest>,
    pub pipelines: Script<Vec<Pipeline>>,
    pub approvals: Script<ApprovalsInfo>,
    pub rebase: Script<MergeRequest>,
    pub accept: Script<MergeRequest>,
    // Call tracking
    pub merge_request_calls: Mutex<usize>,
    pub pipeline_calls: Mutex<usize>,
    pub approvals_calls: Mutex<Vec<String>>,
    pub approve_calls: Mutex<Vec<ApproveCall>>,
    pub assignee_calls: Mutex<Vec<Vec<u64>>>,
    pub rebase_calls: Mutex<usize>,
    pub branch_calls: Mutex<Vec<String>>,
    pub accept_calls: Mutex<Vec<AcceptCall>>,
    pub notes: Mutex<Vec<String>>,
}

impl MockGitLab {
    /// A GitLab EE instance serving `mr`, with the bot as `bot`
    pub fn new(bot: User, mr: MergeRequest) -> Self {
        let mut users = HashMap::new();
        users.insert(bot.id, bot.clone());
        Self {
            version: Mutex::new(GitLabVersion::parse("16.0.0-ee").unwrap()),
            bot,
            current_user_error: Mutex::new(None),
            assignees_error: Mutex::new(None),
            users: Mutex::new(users),
            projects: Mutex::new(HashMap::new()),
            protected_branches: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            merge_requests: Script::new(Ok(mr.clone())),
            pipelines: Script::new(Ok(Vec::new())),
            approvals: Script::new(Ok(ApprovalsInfo::default())),
            rebase: Script::new(Ok(mr.clone())),
            accept: Script::new(Ok(mr)),
            merge_request_calls: Mutex::new(0),
            pipeline_calls: Mutex::new(0),
            approvals_calls: Mutex::new(Vec::new()),
            approve_calls: Mutex::new(Vec::new()),
            assignee_calls: Mutex::new(Vec::new()),
            rebase_calls: Mutex::new(0),
            branch_calls: Mutex::new(Vec::new()),
            accept_calls: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
        }
    }

    /// Pretend to be another GitLab version
    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = GitLabVersion::parse(version).unwrap();
    }

    /// Make `current_user` fail, as with a bad token
    pub fn reject_token(&self, err: MockError) {
        *self.current_user_error.lock().unwrap() = Some(err);
    }

    /// Make `set_assignees` fail after recording the call
    pub fn fail_assignment(&self, err: MockError) {
        *self.assignees_error.lock().unwrap() = Some(err);
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn add_project(&self, project: Project) {
        self.projects.lock().unwrap().insert(project.id, project);
    }

    pub fn protect_branch(&self, name: &str) {
        self.protected_branches.lock().unwrap().push(name.to_string());
    }

    pub fn merge_request_call_count(&self) -> usize {
        *self.merge_request_calls.lock().unwrap()
    }

    pub fn pipeline_call_count(&self) -> usize {
        *self.pipeline_calls.lock().unwrap()
    }

    pub fn approve_calls(&self) -> Vec<ApproveCall> {
        self.approve_calls.lock().unwrap().clone()
    }

    pub fn assignee_calls(&self) -> Vec<Vec<u64>> {
        self.assignee_calls.lock().unwrap().clone()
    }

    pub fn accept_calls(&self) -> Vec<AcceptCall> {
        self.accept_calls.lock().unwrap().clone()
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitLabApi for MockGitLab {
    async fn version(&self) -> Result<GitLabVersion> {
        Ok(*self.version.lock().unwrap())
    }

    async fn current_user(&self) -> Result<User> {
        if let Some(err) = self.current_user_error.lock().unwrap().as_ref() {
            return Err(err.to_error());
        }
        Ok(self.bot.clone())
    }

    async fn user(&self, user_id: u64) -> Result<User> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::api(404, "404 User Not Found"))
    }

    async fn project(&self, project_id: u64) -> Result<Project> {
        self.projects
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .ok_or_else(|| Error::api(404, "404 Project Not Found"))
    }

    async fn branch(&self, _project_id: u64, name: &str) -> Result<Branch> {
        self.branch_calls.lock().unwrap().push(name.to_string());
        Ok(Branch {
            name: name.to_string(),
            protected: self.protected_branches.lock().unwrap().iter().any(|b| b == name),
        })
    }

    async fn merge_request(&self, _project_id: u64, _iid: u64) -> Result<MergeRequest> {
        *self.merge_request_calls.lock().unwrap() += 1;
        self.merge_requests.next()
    }

    async fn merge_request_commits(&self, _project_id: u64, _iid: u64) -> Result<Vec<Commit>> {
        Ok(self.commits.lock().unwrap().clone())
    }

    async fn merge_request_pipelines(&self, _project_id: u64, _iid: u64) -> Result<Vec<Pipeline>> {
        *self.pipeline_calls.lock().unwrap() += 1;
        self.pipelines.next()
    }

    async fn approvals(&self, path: &str) -> Result<ApprovalsInfo> {
        self.approvals_calls.lock().unwrap().push(path.to_string());
        self.approvals.next()
    }

    async fn approve(&self, path: &str, sudo_user: u64) -> Result<()> {
        self.approve_calls.lock().unwrap().push(ApproveCall {
            path: path.to_string(),
            sudo_user,
        });
        Ok(())
    }

    async fn set_assignees(&self, _project_id: u64, _iid: u64, assignee_ids: &[u64]) -> Result<()> {
        self.assignee_calls.lock().unwrap().push(assignee_ids.to_vec());
        match self.assignees_error.lock().unwrap().as_ref() {
            Some(err) => Err(err.to_error()),
            None => Ok(()),
        }
    }

    async fn rebase_merge_request(&self, _project_id: u64, _iid: u64) -> Result<MergeRequest> {
        *self.rebase_calls.lock().unwrap() += 1;
        self.rebase.next()
    }

    async fn accept_merge_request(
        &self,
        _project_id: u64,
        iid: u64,
        sha: &str,
        remove_source_branch: bool,
    ) -> Result<MergeRequest> {
        self.accept_calls.lock().unwrap().push(AcceptCall {
            iid,
            sha: sha.to_string(),
            remove_source_branch,
        });
        self.accept.next()
    }

    async fn create_note(&self, _project_id: u64, _iid: u64, body: &str) -> Result<()> {
        self.notes.lock().unwrap().push(body.to_string());
        Ok(())
    }
}
