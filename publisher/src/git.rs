//! Commit published changes back to the repository.

use anyhow::Error;
use std::env;
use std::path::Path;
use std::process::{Command, Output};

const DEFAULT_NAME: &str = "github-actions[bot]";
const DEFAULT_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// Commit all changes in `repo_dir` and push them, if running in GitHub Actions.
///
/// Outside of GitHub Actions this does nothing, so that running locally never pushes.
pub fn commit_and_push_if_github_actions(repo_dir: &Path, message: &str) -> Result<(), Error> {
    if env::var("GITHUB_ACTIONS").as_deref() != Ok("true") {
        tracing::info!("not running in GitHub Actions, skipping commit");
        return Ok(());
    }
    let name = env::var("GIT_AUTHOR_NAME").unwrap_or_else(|_| DEFAULT_NAME.into());
    let email = env::var("GIT_AUTHOR_EMAIL").unwrap_or_else(|_| DEFAULT_EMAIL.into());
    git(repo_dir, &["config", "user.name", &name])?;
    git(repo_dir, &["config", "user.email", &email])?;
    if commit(repo_dir, message)? {
        git(repo_dir, &["push"])?;
        tracing::info!("pushed changes");
    }
    Ok(())
}

/// Commit all changes in `repo_dir`.
///
/// Returns `false` if there was nothing to commit.
pub fn commit(repo_dir: &Path, message: &str) -> Result<bool, Error> {
    git(repo_dir, &["add", "-A"])?;
    // `git diff --quiet` exits with 1 if there are differences.
    let diff = run(repo_dir, &["diff", "--cached", "--quiet"])?;
    match diff.status.code() {
        Some(0) => {
            tracing::info!("no changes to commit");
            return Ok(false);
        }
        Some(1) => {}
        _ => return Err(failure(&["diff", "--cached", "--quiet"], &diff)),
    }
    git(repo_dir, &["commit", "--no-verify", "-m", message])?;
    tracing::info!("committed changes: {message}");
    Ok(true)
}

fn git(repo_dir: &Path, args: &[&str]) -> Result<(), Error> {
    let output = run(repo_dir, args)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(failure(args, &output))
    }
}

fn run(repo_dir: &Path, args: &[&str]) -> Result<Output, Error> {
    tracing::debug!(?args, "git");
    Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|err| Error::msg(format!("unable to run git: {err}")))
}

fn failure(args: &[&str], output: &Output) -> Error {
    Error::msg(format!(
        "git {} failed ({}): {}",
        args.join(" "),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}
