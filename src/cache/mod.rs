//! Git + mirror manager

mod branches;
mod git;
mod lock;
mod paths;
mod repo;
mod wipe;

pub use branches::ResolvedBranch;
pub use git::{GitCli, GitError, REMOTE, open_repository};
pub use lock::{DEFAULT_LOCK_KEY, LockGuard, RefreshLock, hostname};
pub use paths::{CachePaths, DEFAULT_ROOT, REPOSITORIES_DIR, TEST_ROOT_DIR};
pub use repo::Mirror;
pub use wipe::remove_tree;
