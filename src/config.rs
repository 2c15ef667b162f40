//! Runtime settings read from the environment.

use std::path::{Path, PathBuf};

use crate::cache::{CachePaths, DEFAULT_LOCK_KEY, DEFAULT_ROOT, RefreshLock};

pub const DEFAULT_GIT_BRANCH: &str = "main";

pub const ENV_DEFAULT_BRANCH: &str = "DEFAULT_GIT_BRANCH";
pub const ENV_ROOT: &str = "GIT_HANDLER_ROOT";
pub const ENV_LOCK_DIR: &str = "GIT_HANDLER_LOCK_DIR";
pub const ENV_LOCK_KEY: &str = "GIT_HANDLER_LOCK_KEY";

/// Where mirrors live, which branch is the default and where the lock marker goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub default_branch: String,
    pub root: PathBuf,
    pub lock_dir: PathBuf,
    pub lock_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_GIT_BRANCH.to_string(),
            root: PathBuf::from(DEFAULT_ROOT),
            lock_dir: PathBuf::from("."),
            lock_key: DEFAULT_LOCK_KEY.to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset or empty values keep the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Self {
            default_branch: get(ENV_DEFAULT_BRANCH).unwrap_or(defaults.default_branch),
            root: get(ENV_ROOT).map(PathBuf::from).unwrap_or(defaults.root),
            lock_dir: get(ENV_LOCK_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.lock_dir),
            lock_key: get(ENV_LOCK_KEY).unwrap_or(defaults.lock_key),
        }
    }

    /// Use the isolated test root, `/tmp/test_repositories`.
    pub fn with_test_root(mut self) -> Self {
        self.root = CachePaths::test().root().to_path_buf();
        self
    }

    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn paths(&self) -> CachePaths {
        CachePaths::new(&self.root)
    }

    pub fn lock(&self) -> RefreshLock {
        RefreshLock::in_dir(&self.lock_dir, &self.lock_key)
    }
}
