//! Response documents printed by the command-line front end.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::handler::SyncOutcome;

/// Result of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub detail: String,
}

impl From<&SyncOutcome> for UpdateResponse {
    fn from(outcome: &SyncOutcome) -> Self {
        Self {
            success: true,
            detail: outcome.detail(),
        }
    }
}

/// A single file and its text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    pub filename: String,
    pub content: String,
}

/// Failure report carrying the error classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            success: false,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}
