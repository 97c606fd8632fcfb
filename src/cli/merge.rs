//! Merge command - land one merge request

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, arrow, check, cross};
use anstream::{eprintln, println};
use anyhow::Context;
use mergebot::git::GitRepo;
use mergebot::merge::{JobOutcome, MergeJob};
use mergebot::platform::GitLabApi;
use std::path::Path;
use tracing::warn;

/// Run one merge job for `!iid` of `project_id`.
///
/// Failure reasons are posted on the MR as a note. Returns the outcome so
/// the caller can pick an exit status.
pub async fn run_merge(
    config_path: Option<&Path>,
    project_id: u64,
    iid: u64,
) -> anyhow::Result<JobOutcome> {
    let ctx = CommandContext::new(config_path).await?;
    let options = ctx.config.job_options(&ctx.auth.token)?;
    let api: &dyn GitLabApi = &ctx.api;

    let user = api.current_user().await.context("fetching bot user")?;
    let project = api.project(project_id).await.context("fetching project")?;
    let mr = api
        .merge_request(project_id, iid)
        .await
        .with_context(|| format!("fetching merge request !{iid}"))?;

    println!(
        "{} {} {}",
        arrow(),
        format!("{}!{iid}", project.path_with_namespace).accent(),
        mr.title
    );

    let email = user
        .contact_email()
        .map_or_else(|| format!("{}@{}", user.username, ctx.config.gitlab.host), String::from);
    let repo = GitRepo::new(
        ctx.config.workdir(project.id)?,
        options.clone_protocol.clone_url(&project)?,
    )
    .with_identity(user.name.clone(), email);
    repo.ensure_cloned().await.context("preparing working copy")?;

    let job = MergeJob::new(api, &repo, user, project, options);
    let outcome = job.execute(&mr).await?;

    if let Some(reason) = outcome.failure_reason() {
        let note = format!("I couldn't merge this branch: {reason}");
        if let Err(err) = api.create_note(project_id, iid, &note).await {
            warn!(mr_iid = iid, error = %err, "failed to post failure note");
        }
    }

    match &outcome {
        JobOutcome::Merged { sha } => {
            println!("{} {} {}", check(), "Merged".success(), sha.muted());
        }
        JobOutcome::Skipped(reason) => {
            eprintln!("{} {}", "Skipped:".warn(), reason);
        }
        JobOutcome::Failed(reason) => {
            eprintln!("{} {}", cross(), reason.error());
        }
        JobOutcome::Inconsistent { expected, actual } => {
            eprintln!(
                "{} {}",
                cross(),
                format!("GitLab rebase produced {actual}, expected {expected}").error()
            );
        }
    }
    Ok(outcome)
}
