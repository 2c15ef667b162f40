//! Mirror directory path management
//!
//! This module provides the `CachePaths` struct which maps locators onto the
//! on-disk layout:
//!
//! ```text
//! /tmp/                                  # root (overridable)
//! └── repositories/
//!     └── <namespace>/
//!         └── <path>/.../                # working copy (git clone)
//!
//! /tmp/test_repositories/                # root used in test mode
//! └── repositories/...
//! ```

use std::path::{Path, PathBuf};

use crate::types::RepoLocator;

/// Default root for mirrors.
pub const DEFAULT_ROOT: &str = "/tmp";

/// Directory below the root that holds every mirror.
pub const REPOSITORIES_DIR: &str = "repositories";

/// Root subdirectory used for isolated test environments.
pub const TEST_ROOT_DIR: &str = "test_repositories";

/// Manages the filesystem paths of the mirror layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the CachePaths used in test mode: `/tmp/test_repositories`
    pub fn test() -> Self {
        Self::new(Path::new(DEFAULT_ROOT).join(TEST_ROOT_DIR))
    }

    /// Returns the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the repositories directory path: `{root}/repositories`
    pub fn repositories_dir(&self) -> PathBuf {
        self.root.join(REPOSITORIES_DIR)
    }

    /// Returns the namespace directory: `{root}/repositories/{namespace}`
    pub fn namespace_dir(&self, locator: &RepoLocator) -> PathBuf {
        self.repositories_dir().join(locator.namespace())
    }

    /// Returns the mirror directory: `{root}/repositories/{namespace}/{path...}`
    pub fn mirror_dir(&self, locator: &RepoLocator) -> PathBuf {
        let mut path = self.namespace_dir(locator);
        path.extend(locator.path());
        path
    }
}

impl Default for CachePaths {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}
