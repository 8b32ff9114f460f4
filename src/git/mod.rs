use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Configure local repository path for {0} first")]
    NotConfigured(String),
    #[error("{path} is not a valid directory (local copy of {repo})")]
    NotADirectory { repo: String, path: PathBuf },
    #[error("invalid branch name: {0}")]
    InvalidRef(String),
    /// A git step exited non-zero; the message is its output, verbatim.
    #[error("{output}")]
    StepFailed { command: String, output: String },
    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

/// A git operation requested from the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRequest {
    Checkout {
        repo: String,
        branch: String,
    },
    PullAndSync {
        repo: String,
        source_branch: String,
        target_branch: String,
    },
}

impl GitRequest {
    pub fn repo(&self) -> &str {
        match self {
            GitRequest::Checkout { repo, .. } | GitRequest::PullAndSync { repo, .. } => repo,
        }
    }
}

/// Resolve the configured local clone of `repo`.
pub fn resolve_local_dir(local_repos: &HashMap<String, PathBuf>, repo: &str) -> Result<PathBuf> {
    let path = local_repos
        .get(repo)
        .ok_or_else(|| GitError::NotConfigured(repo.to_string()))?;

    if !path.is_dir() {
        return Err(GitError::NotADirectory {
            repo: repo.to_string(),
            path: path.clone(),
        });
    }

    Ok(path.clone())
}

/// Validate a branch name before handing it to git.
///
/// Allows: alphanumeric, dash, underscore, slash, dot, plus
pub fn validate_branch(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GitError::InvalidRef("empty branch name".to_string()));
    }
    if name.starts_with('-') {
        return Err(GitError::InvalidRef(name.to_string()));
    }

    for ch in name.chars() {
        if !ch.is_alphanumeric() && !matches!(ch, '-' | '_' | '/' | '.' | '+') {
            return Err(GitError::InvalidRef(format!(
                "Invalid character in branch name: '{}'",
                ch
            )));
        }
    }

    Ok(())
}

/// Run `git <args>` in `dir`, returning trimmed combined output.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let command = format!("git {}", args.join(" "));
    debug!(%command, dir = %dir.display(), "running git");

    let output = Command::new("git").args(args).current_dir(dir).output()?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !output.status.success() {
        return Err(GitError::StepFailed {
            command,
            output: combined,
        });
    }

    Ok(combined)
}

/// Check out `branch` in the local clone.
pub fn checkout(dir: &Path, branch: &str) -> Result<String> {
    validate_branch(branch)?;
    run_git(dir, &["checkout", branch])
}

/// Merge the target branch into the source branch and push it.
///
/// Uncommitted changes to tracked files are stashed first and restored at the
/// end, also when a step fails. Stops at the first failing step and reports
/// its output. `on_step` receives the output of every step that succeeded.
pub fn pull_and_sync(
    dir: &Path,
    source_branch: &str,
    target_branch: &str,
    mut on_step: impl FnMut(&str),
) -> Result<String> {
    validate_branch(source_branch)?;
    validate_branch(target_branch)?;

    let stashed = stash_changes(dir)?;
    let result = sync_steps(dir, source_branch, target_branch, &mut on_step);

    if stashed && let Err(e) = run_git(dir, &["stash", "pop"]) {
        warn!(error = %e, "failed to restore stashed changes");
        // A failed step keeps its own message.
        return result.and(Err(e));
    }

    result
}

/// Stash tracked changes. Returns whether a new stash entry was created.
fn stash_changes(dir: &Path) -> Result<bool> {
    if run_git(dir, &["status", "--short", "--untracked-files=no"])?.is_empty() {
        return Ok(false);
    }

    let before = stash_head(dir);
    run_git(dir, &["stash"])?;
    Ok(stash_head(dir) != before)
}

fn stash_head(dir: &Path) -> Option<String> {
    run_git(dir, &["rev-parse", "-q", "--verify", "refs/stash"]).ok()
}

fn sync_steps(
    dir: &Path,
    source_branch: &str,
    target_branch: &str,
    on_step: &mut impl FnMut(&str),
) -> Result<String> {
    let steps: [&[&str]; 4] = [
        &["checkout", source_branch],
        &["pull", "origin", target_branch, "--no-edit"],
        &["push", "--no-verify"],
        &["checkout", "-"],
    ];

    for args in steps {
        let output = run_git(dir, args)?;
        if !output.is_empty() {
            on_step(&output);
        }
    }

    info!(source_branch, target_branch, "pulled and pushed");
    Ok("Pulled & pushed".to_string())
}

/// Execute a request against the configured local clones.
///
/// Intermediate output of multi-step requests goes to `on_step`.
pub fn execute(
    local_repos: &HashMap<String, PathBuf>,
    request: &GitRequest,
    on_step: impl FnMut(&str),
) -> Result<String> {
    let dir = resolve_local_dir(local_repos, request.repo())?;
    match request {
        GitRequest::Checkout { branch, .. } => checkout(&dir, branch),
        GitRequest::PullAndSync {
            source_branch,
            target_branch,
            ..
        } => pull_and_sync(&dir, source_branch, target_branch, on_step),
    }
}
