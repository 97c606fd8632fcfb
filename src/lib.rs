//! mergebot - lands GitLab merge requests
//!
//! A bot assigned to a merge request checks its gates (approvals, CI,
//! discussions, embargo windows), brings the source branch up to date with
//! its target, optionally stamps `Reviewed-by`/`Tested-by`/`Part-of`
//! trailers, and accepts it.
//!
//! The forge is reached through [`platform::GitLabApi`] and the working copy
//! through [`git::Repository`]; [`merge::MergeJob`] drives both.

pub mod approvals;
pub mod auth;
pub mod config;
pub mod error;
pub mod git;
pub mod merge;
pub mod platform;
pub mod types;
