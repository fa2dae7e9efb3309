//! Git operations for the fix-and-ship workflow
//!
//! Clones a disposable working copy, then provides branch, write, commit,
//! and push. Clone and push shell out to `git` so credentials and transports
//! behave exactly like the user's own git; everything else goes through git2.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use git2::{IndexAddOption, Repository, Signature};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::util::{resolve_repo_path_allow_new, run_command_with_timeout, CommandRunResult};

const CLONE_TIMEOUT_SECS: u64 = 300;
const PUSH_TIMEOUT_SECS: u64 = 120;
const FALLBACK_DEFAULT_BRANCH: &str = "main";
const MAX_SLUG_CHARS: usize = 40;

pub const COMMIT_AUTHOR_NAME: &str = "issue-mender";
pub const COMMIT_AUTHOR_EMAIL: &str = "issue-mender@users.noreply.github.com";

/// Version-control operations one fix attempt needs.
///
/// Callers create the branch before writing any file; `commit` includes
/// everything written since.
pub trait SourceControl: Send {
    /// Fresh clone of the repository. Returns the default branch name.
    fn clone_repo(&mut self) -> Result<String, PipelineError>;

    fn working_dir(&self) -> &Path;

    /// Create `name` from HEAD and check it out.
    fn create_branch(&mut self, name: &str) -> Result<(), PipelineError>;

    /// Replace (or create) a file at a repository-relative path.
    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), PipelineError>;

    /// Stage everything and commit. Returns the new commit id.
    fn commit(&mut self, message: &str) -> Result<String, PipelineError>;

    fn push(&mut self, branch: &str) -> Result<(), PipelineError>;
}

/// Branch name for an issue: `fix/<number>-<slug>`.
///
/// The slug is the lowercased title with whitespace and `/` turned into
/// dashes, anything outside `[a-z0-9_-]` dropped, runs of dashes collapsed,
/// and at most 40 characters.
pub fn fix_branch_name(issue_number: u64, title: &str) -> String {
    let mut slug = String::new();
    for c in title.to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '/' {
            '-'
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            c
        } else {
            continue;
        };
        if mapped == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(mapped);
    }

    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        format!("fix/{}", issue_number)
    } else {
        format!("fix/{}-{}", issue_number, slug)
    }
}

/// Default branch as advertised by `origin`, else the checked-out branch, else `main`.
pub fn default_branch(repo: &Repository) -> String {
    if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD") {
        if let Some(target) = reference.symbolic_target() {
            if let Some(name) = target.strip_prefix("refs/remotes/origin/") {
                return name.to_string();
            }
        }
    }

    repo.head()
        .ok()
        .filter(|head| head.is_branch())
        .and_then(|head| head.shorthand().map(str::to_string))
        .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string())
}

/// Checkout an existing branch
fn checkout_branch(repo: &Repository, name: &str) -> Result<()> {
    let (object, reference) = repo
        .revparse_ext(name)
        .with_context(|| format!("Branch '{}' not found", name))?;

    repo.checkout_tree(&object, None)?;

    match reference {
        Some(r) => repo.set_head(r.name().unwrap_or("HEAD"))?,
        None => repo.set_head_detached(object.id())?,
    }

    Ok(())
}

fn create_and_checkout_branch(repo_path: &Path, name: &str) -> Result<()> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.head()?.peel_to_commit()?;
    repo.branch(name, &commit, false)
        .with_context(|| format!("Failed to create branch '{}'", name))?;
    checkout_branch(&repo, name)
}

fn stage_all(repo: &Repository) -> Result<()> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;
    Ok(())
}

fn commit_all(repo_path: &Path, message: &str) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    stage_all(&repo)?;

    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let parent = repo.head()?.peel_to_commit()?;

    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| COMMIT_AUTHOR_NAME.to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| COMMIT_AUTHOR_EMAIL.to_string());
    let sig = Signature::now(&name, &email)?;

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
    Ok(oid.to_string())
}

fn configure_identity(repo_path: &Path) -> Result<()> {
    let repo = Repository::open(repo_path)?;
    let mut config = repo.config()?;
    config.set_str("user.name", COMMIT_AUTHOR_NAME)?;
    config.set_str("user.email", COMMIT_AUTHOR_EMAIL)?;
    Ok(())
}

/// A clone of `owner/repo` living at `<work_dir>/<owner>/<repo>`.
pub struct GitWorkingCopy {
    repo_path: PathBuf,
    owner: String,
    repo: String,
    token: String,
    clone_timeout: Duration,
    push_timeout: Duration,
}

impl GitWorkingCopy {
    pub fn new(work_dir: &Path, owner: &str, repo: &str, token: &str) -> Self {
        Self {
            repo_path: work_dir.join(owner).join(repo),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
            clone_timeout: Duration::from_secs(CLONE_TIMEOUT_SECS),
            push_timeout: Duration::from_secs(PUSH_TIMEOUT_SECS),
        }
    }

    /// Operate on an existing checkout without cloning.
    pub fn at(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            owner: String::new(),
            repo: String::new(),
            token: String::new(),
            clone_timeout: Duration::from_secs(CLONE_TIMEOUT_SECS),
            push_timeout: Duration::from_secs(PUSH_TIMEOUT_SECS),
        }
    }

    fn clone_url(&self) -> String {
        if self.token.is_empty() {
            format!("https://github.com/{}/{}.git", self.owner, self.repo)
        } else {
            format!(
                "https://x-access-token:{}@github.com/{}/{}.git",
                self.token, self.owner, self.repo
            )
        }
    }

    /// Keep the token out of anything that ends up in logs or comments.
    fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, "***")
        }
    }

    fn failure_detail(&self, action: &str, result: &CommandRunResult, timeout: Duration) -> String {
        if result.timed_out {
            format!("{} timed out after {}s", action, timeout.as_secs())
        } else {
            format!("{} failed: {}", action, self.redact(result.stderr.trim()))
        }
    }

    fn clone_fresh(&self) -> Result<()> {
        if self.repo_path.exists() {
            fs::remove_dir_all(&self.repo_path).with_context(|| {
                format!("Failed to remove old working copy {}", self.repo_path.display())
            })?;
        }
        if let Some(parent) = self.repo_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg(self.clone_url())
            .arg(&self.repo_path)
            .env("GIT_TERMINAL_PROMPT", "0");

        let result = run_command_with_timeout(&mut cmd, self.clone_timeout)
            .map_err(|e| anyhow::anyhow!("Failed to execute git clone: {}", e))?;
        if !result.success() {
            return Err(anyhow::anyhow!(
                self.failure_detail("git clone", &result, self.clone_timeout)
            ));
        }

        configure_identity(&self.repo_path)
    }

    /// Delete the working copy. Missing directories are fine.
    pub fn remove(&self) -> Result<()> {
        if self.repo_path.exists() {
            fs::remove_dir_all(&self.repo_path)
                .with_context(|| format!("Failed to remove {}", self.repo_path.display()))?;
        }
        Ok(())
    }
}

fn filesystem(err: anyhow::Error) -> PipelineError {
    PipelineError::Filesystem(format!("{:#}", err))
}

impl SourceControl for GitWorkingCopy {
    fn clone_repo(&mut self) -> Result<String, PipelineError> {
        info!(owner = %self.owner, repo = %self.repo, path = %self.repo_path.display(), "cloning");
        self.clone_fresh().map_err(filesystem)?;

        let repo = Repository::open(&self.repo_path)
            .context("Failed to open fresh clone")
            .map_err(filesystem)?;
        let branch = default_branch(&repo);
        debug!(%branch, "detected default branch");
        Ok(branch)
    }

    fn working_dir(&self) -> &Path {
        &self.repo_path
    }

    fn create_branch(&mut self, name: &str) -> Result<(), PipelineError> {
        create_and_checkout_branch(&self.repo_path, name).map_err(filesystem)
    }

    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), PipelineError> {
        let resolved = resolve_repo_path_allow_new(&self.repo_path, Path::new(path))
            .map_err(PipelineError::Filesystem)?;
        if let Some(parent) = resolved.absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&resolved.absolute, contents).map_err(|e| {
            PipelineError::Filesystem(format!("Failed to write {}: {}", path, e))
        })?;
        debug!(path = %resolved.relative.display(), bytes = contents.len(), "wrote file");
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<String, PipelineError> {
        commit_all(&self.repo_path, message).map_err(filesystem)
    }

    fn push(&mut self, branch: &str) -> Result<(), PipelineError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(["push", "-u", "origin", branch])
            .env("GIT_TERMINAL_PROMPT", "0");

        let result = run_command_with_timeout(&mut cmd, self.push_timeout)
            .map_err(|e| PipelineError::transport("git", e))?;
        if !result.success() {
            return Err(PipelineError::transport(
                "git",
                self.failure_detail("git push", &result, self.push_timeout),
            ));
        }
        info!(%branch, "pushed branch");
        Ok(())
    }
}
