//! Git access for mirrors: the git CLI for anything that talks to the
//! remote or rewrites the working tree, libgit2 for local reads.
//!
//! CLI, hardened:
//! - `clone` - full clone into an (empty) target directory
//! - `fetch` / `pull` - refresh from `origin`
//! - `checkout` - switch the working copy to another branch
//!
//! libgit2:
//! - `open_repository` - open an existing working copy
//! - `is_working_copy` - validity check before reuse
//! - `current_branch`, `remote_branch_names` - ref inspection

use git2::{BranchType, Repository};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use thiserror::Error;

/// Name of the remote every mirror is cloned from.
pub const REMOTE: &str = "origin";

/// Failures of the git CLI or of libgit2 reads.
#[derive(Error, Debug)]
pub enum GitError {
    /// Error from libgit2.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// No repository at the given path.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Fetch failed.
    #[error("fetch failed: {0}")]
    FetchError(String),
    /// Pull failed.
    #[error("pull failed: {0}")]
    PullError(String),
    /// Checkout failed.
    #[error("checkout failed: {0}")]
    CheckoutError(String),
    /// Git data could not be interpreted.
    #[error("failed to parse git data: {0}")]
    ParseError(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Rejected before running git.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Reject branch names that git could misread as options or ranges.
///
/// Rejects:
/// - Empty values
/// - Values containing `..`
/// - Values starting with `-`
/// - Values with NUL or other control bytes
pub fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::ParseError(format!("{} path is not valid UTF-8", what)))
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Runs the system `git` with prompts, hooks and LFS smudging disabled.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Use `git` from PATH.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Base command: no terminal prompts, no LFS downloads, no hooks, stdin closed.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Command running inside the working copy at `repo_path`.
    fn command_in(&self, repo_path: &Path) -> Result<Command, GitError> {
        let repo_str = path_str(repo_path, "repository")?;
        let mut cmd = self.command();
        cmd.arg("-C").arg(repo_str);
        Ok(cmd)
    }

    /// Returns true if the git executable can be run.
    pub fn is_available(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Clone `url` into `dest` with a working tree.
    ///
    /// `dest` may exist but must be empty.
    pub fn clone(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        if url.is_empty() || url.starts_with('-') {
            return Err(GitError::InvalidInput(format!("invalid clone url: {}", url)));
        }
        let dest_str = path_str(dest, "destination")?;

        let output = self
            .command()
            .args(["clone", "--origin", REMOTE, "--"])
            .arg(url)
            .arg(dest_str)
            .output()?;

        if !output.status.success() {
            return Err(GitError::CloneError(stderr_of(&output)));
        }

        Ok(())
    }

    /// Fetch every branch from origin.
    pub fn fetch(&self, repo_path: &Path) -> Result<(), GitError> {
        let output = self
            .command_in(repo_path)?
            .args(["fetch", REMOTE])
            .output()?;

        if !output.status.success() {
            return Err(GitError::FetchError(stderr_of(&output)));
        }

        Ok(())
    }

    /// Fast-forward the checked-out branch to its upstream.
    pub fn pull(&self, repo_path: &Path) -> Result<(), GitError> {
        let output = self
            .command_in(repo_path)?
            .args(["pull", "--ff-only"])
            .output()?;

        if !output.status.success() {
            return Err(GitError::PullError(stderr_of(&output)));
        }

        Ok(())
    }

    /// Check out `branch`, creating a tracking branch from origin if needed.
    pub fn checkout(&self, repo_path: &Path, branch: &str) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;

        let output = self
            .command_in(repo_path)?
            .arg("checkout")
            .arg(branch)
            .arg("--")
            .output()?;

        if !output.status.success() {
            return Err(GitError::CheckoutError(stderr_of(&output)));
        }

        Ok(())
    }
}

/// Open the repository at `path`, mapping a missing one to [`GitError::NotFound`].
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })
}

/// Check if `path` is the root of a non-bare working copy.
pub fn is_working_copy(path: &Path) -> bool {
    let Ok(repo) = Repository::open(path) else {
        return false;
    };
    if repo.is_bare() {
        return false;
    }
    match (repo.workdir(), path.canonicalize()) {
        (Some(workdir), Ok(expected)) => workdir
            .canonicalize()
            .map(|actual| actual == expected)
            .unwrap_or(false),
        _ => false,
    }
}

/// Name of the checked-out branch, or None for a detached or unborn HEAD.
pub fn current_branch(repo: &Repository) -> Option<String> {
    let head = repo.head().ok()?;
    if !head.is_branch() {
        return None;
    }
    head.shorthand().map(str::to_string)
}

/// Names of the branches on origin, without the `origin/` prefix.
///
/// The symbolic `origin/HEAD` is skipped. Names are sorted.
pub fn remote_branch_names(repo: &Repository) -> Result<Vec<String>, GitError> {
    let prefix = format!("{}/", REMOTE);
    let mut names = Vec::new();

    for branch in repo.branches(Some(BranchType::Remote))? {
        let (branch, _) = branch?;
        if branch.get().symbolic_target().is_some() {
            continue;
        }
        let Some(name) = branch.name()? else {
            continue;
        };
        if let Some(short) = name.strip_prefix(&prefix)
            && short != "HEAD"
        {
            names.push(short.to_string());
        }
    }

    names.sort();
    names.dedup();
    Ok(names)
}

/// Full ref name of `branch` on origin.
pub fn remote_ref_name(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE, branch)
}
