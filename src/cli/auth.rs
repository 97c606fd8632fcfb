//! Auth command - check the configured token

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check};
use anstream::println;
use mergebot::auth::test_gitlab_auth;
use mergebot::error::Result;
use std::path::Path;

/// Run the auth test command
pub async fn run_auth_test(config_path: Option<&Path>) -> Result<()> {
    let ctx = CommandContext::new(config_path).await?;
    println!("{}", format!("Testing GitLab authentication against {}...", ctx.config.base_url()).muted());
    let username = test_gitlab_auth(&ctx.api).await?;
    println!("{} Authenticated as: {}", check(), username.accent());
    println!("{}", format!("Token source: {:?}", ctx.auth.source).muted());
    Ok(())
}
