//! CLI commands
//!
//! Command implementations for the `mergebot` binary.

mod auth;
mod context;
mod merge;
pub mod style;

pub use auth::run_auth_test;
pub use merge::run_merge;
