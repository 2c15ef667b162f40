//! Repository cache manager
//!
//! This module provides the `Mirror` struct which owns one local working copy
//! of one remote repository: existence check, clone, fetch/pull and branch
//! checkout. Every write to the working copy happens under the host-wide
//! [`RefreshLock`].

use super::git::{GitCli, current_branch, is_working_copy, open_repository};
use super::wipe::remove_tree;
use super::{CachePaths, RefreshLock};
use crate::error::{Error, Result};
use crate::types::RepoLocator;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default refresh window. Carried for callers; never consulted here.
const DEFAULT_REFRESH_TIME: Duration = Duration::from_secs(10 * 60);

/// A local working copy of a remote repository.
#[derive(Debug)]
pub struct Mirror {
    locator: RepoLocator,
    path: PathBuf,
    default_branch: String,
    cloned: bool,
    refresh_time: Duration,
    git: GitCli,
    lock: RefreshLock,
}

impl Mirror {
    /// Make sure the working copy for `locator` exists, is fresh and has
    /// `default_branch` checked out.
    ///
    /// This will, under the lock:
    /// 1. Refresh an existing valid working copy
    /// 2. Otherwise wipe the target directory and clone
    /// 3. Check out `default_branch` if another branch is current
    pub fn ensure(
        locator: RepoLocator,
        paths: &CachePaths,
        default_branch: &str,
        lock: RefreshLock,
    ) -> Result<Self> {
        let mut mirror = Self {
            path: paths.mirror_dir(&locator),
            locator,
            default_branch: default_branch.to_string(),
            cloned: false,
            refresh_time: DEFAULT_REFRESH_TIME,
            git: GitCli::new(),
            lock,
        };

        let lock = mirror.lock.clone();
        let _guard = lock.acquire()?;

        if is_working_copy(&mirror.path) {
            log::debug!("Refreshing existing mirror at {}", mirror.path.display());
            mirror.refresh()?;
        } else {
            mirror.initial_clone()?;
            mirror.cloned = true;
        }

        if mirror.current_branch()?.as_deref() != Some(default_branch) {
            mirror.checkout(default_branch)?;
            mirror.refresh()?;
        }

        Ok(mirror)
    }

    /// Set the refresh window reported by [`Mirror::refresh_time`].
    pub fn with_refresh_time(mut self, refresh_time: Duration) -> Self {
        self.refresh_time = refresh_time;
        self
    }

    /// The locator this mirror was created for.
    pub fn locator(&self) -> &RepoLocator {
        &self.locator
    }

    /// Filesystem path of the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Branch requested when the mirror was ensured.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// True if the working copy was cloned by [`Mirror::ensure`] rather than reused.
    pub fn is_cloned(&self) -> bool {
        self.cloned
    }

    pub fn refresh_time(&self) -> Duration {
        self.refresh_time
    }

    /// Always true: the decision to skip a refresh belongs to the caller.
    pub fn is_update_required(&self) -> bool {
        true
    }

    /// Branch currently checked out in the working copy.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let repo = open_repository(&self.path)?;
        Ok(current_branch(&repo))
    }

    /// Fetch and pull from origin under the lock.
    pub fn update(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        self.refresh()
    }

    /// Fetch and pull. The caller must hold the lock.
    fn refresh(&self) -> Result<()> {
        let unavailable = |source| Error::RepositoryUnavailable {
            locator: self.locator.to_string(),
            source,
        };

        self.git.fetch(&self.path).map_err(unavailable)?;
        self.git.pull(&self.path).map_err(unavailable)?;
        log::debug!("Updated {} from origin", self.locator);
        Ok(())
    }

    fn initial_clone(&self) -> Result<()> {
        if self.path.exists() {
            log::warn!(
                "{} is not a valid working copy, removing it",
                self.path.display()
            );
            remove_tree(&self.path)?;
        }
        std::fs::create_dir_all(&self.path)?;

        log::info!("Cloning {} into {}", self.locator, self.path.display());
        if let Err(source) = self.git.clone(self.locator.url(), &self.path) {
            if let Err(e) = remove_tree(&self.path) {
                log::warn!(
                    "Failed to clean up {} after failed clone: {}",
                    self.path.display(),
                    e
                );
            }
            return Err(Error::RepositoryUnavailable {
                locator: self.locator.to_string(),
                source,
            });
        }

        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        log::info!("Checking out {} in {}", branch, self.locator);
        self.git
            .checkout(&self.path, branch)
            .map_err(|source| Error::BranchCheckoutFailed {
                locator: self.locator.to_string(),
                branch: branch.to_string(),
                source,
            })
    }
}
