//! Branch listing and resolution against the mirror's remote references.

use git2::{ErrorCode, Oid};

use super::Mirror;
use super::git::{GitError, open_repository, remote_branch_names, remote_ref_name, validate_git_ref};
use crate::error::{Error, Result};

/// A branch name resolved to the commit its remote reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBranch {
    pub name: String,
    pub commit: Oid,
}

impl Mirror {
    /// Names of the branches known on origin, without the remote prefix.
    pub fn branch_names(&self) -> Result<Vec<String>> {
        let repo = open_repository(self.path())?;
        Ok(remote_branch_names(&repo)?)
    }

    /// Resolve `branch` (or the mirror's default branch) to its remote commit.
    ///
    /// Fails with [`Error::UnknownBranch`] when origin has no such branch.
    pub fn resolve_branch(&self, branch: Option<&str>) -> Result<ResolvedBranch> {
        let name = branch.unwrap_or(self.default_branch());
        let unknown = || Error::UnknownBranch {
            locator: self.locator().to_string(),
            branch: name.to_string(),
        };

        if validate_git_ref(name, "branch").is_err() {
            return Err(unknown());
        }

        let repo = open_repository(self.path())?;
        let reference = match repo.find_reference(&remote_ref_name(name)) {
            Ok(reference) => reference,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Err(unknown());
            }
            Err(e) => return Err(GitError::Git(e).into()),
        };
        let commit = reference.peel_to_commit().map_err(GitError::Git)?;

        Ok(ResolvedBranch {
            name: name.to_string(),
            commit: commit.id(),
        })
    }
}
