//! Error type shared by the cache, tree and verification layers.

use thiserror::Error;

use crate::cache::GitError;
use crate::types::ParseError;

/// Errors surfaced to callers of the handler.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote could not be cloned or refreshed.
    #[error("repository {locator} is unavailable: {source}")]
    RepositoryUnavailable {
        locator: String,
        #[source]
        source: GitError,
    },

    /// The requested branch could not be checked out.
    #[error("cannot check out branch {branch} of {locator}: {source}")]
    BranchCheckoutFailed {
        locator: String,
        branch: String,
        #[source]
        source: GitError,
    },

    /// The branch is not among the remote references.
    #[error("branch {branch} does not exist in {locator}")]
    UnknownBranch { locator: String, branch: String },

    /// The file does not exist in the working copy.
    #[error("file {filename} not found in repository {locator}")]
    FileNotFound { locator: String, filename: String },

    /// A required phrase line is missing from a checked file.
    #[error("file {locator}/blob/{branch}/{filename} must contain {phrase}")]
    ContentMismatch {
        locator: String,
        branch: String,
        filename: String,
        phrase: String,
    },

    /// The locator could not be parsed.
    #[error("invalid repository locator: {0}")]
    InvalidLocator(#[from] ParseError),

    /// The authorization collaborator denied access.
    #[error("access to {locator} denied")]
    Unauthorized { locator: String },

    /// A local git read failed.
    #[error("git error: {0}")]
    Git(#[from] GitError),

    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of [`Error`] for the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RepositoryUnavailable,
    BranchCheckoutFailed,
    UnknownBranch,
    FileNotFound,
    ContentMismatch,
    InvalidLocator,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    /// True when the caller supplied a bad locator, branch, file or expectation.
    ///
    /// `RepositoryUnavailable` counts as a client error; a transient network
    /// failure is reported the same way.
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorKind::Internal)
    }
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RepositoryUnavailable { .. } => ErrorKind::RepositoryUnavailable,
            Error::BranchCheckoutFailed { .. } => ErrorKind::BranchCheckoutFailed,
            Error::UnknownBranch { .. } => ErrorKind::UnknownBranch,
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::ContentMismatch { .. } => ErrorKind::ContentMismatch,
            Error::InvalidLocator(_) => ErrorKind::InvalidLocator,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::Git(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for handler operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
