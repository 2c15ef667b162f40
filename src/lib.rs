//! Local mirrors of remote git repositories, served as branches, trees
//! and file contents.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod tree;
pub mod types;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use auth::{AllowAll, Authorizer};
pub use cache::{CachePaths, Mirror, RefreshLock};
pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use handler::{Handler, SyncOutcome, SyncStatus};
pub use tree::{Enrichment, FileRecord, TreeNode, TreePath};
pub use types::RepoLocator;
pub use verify::{FileCheck, Phrase};
