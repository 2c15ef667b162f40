//! Request-level operations over mirrors.
//!
//! A [`Handler`] is what the outer layer talks to: it turns settings into
//! mirror locations and the lock, consults the [`Authorizer`], and hands
//! out [`Mirror`] handles for the per-request operations.

use crate::auth::{AllowAll, Authorizer};
use crate::cache::Mirror;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::tree::{Enrichment, TreeNode, TreePath};
use crate::types::RepoLocator;
use crate::verify::FileCheck;

/// What a sync request did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The mirror did not exist and was cloned.
    Cloned,
    /// The mirror existed and was refreshed.
    Updated,
    /// The mirror existed and no refresh was needed.
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub locator: RepoLocator,
    pub status: SyncStatus,
}

impl SyncOutcome {
    /// Human-readable summary, e.g. `https://github.com/a/b cloned`.
    pub fn detail(&self) -> String {
        let what = match self.status {
            SyncStatus::Cloned => "cloned",
            SyncStatus::Updated => "updated",
            SyncStatus::UpToDate => "does not require update",
        };
        format!("{} {}", self.locator, what)
    }
}

pub struct Handler {
    settings: Settings,
    authorizer: Box<dyn Authorizer>,
}

impl Handler {
    /// Handler that allows every request.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            authorizer: Box::new(AllowAll),
        }
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fail with [`Error::Unauthorized`] unless the authorizer allows access.
    pub fn authorize(&self, locator: &RepoLocator, credential: Option<&str>) -> Result<()> {
        if self.authorizer.is_allowed(locator, credential) {
            Ok(())
        } else {
            log::info!("Access to {} denied", locator);
            Err(Error::Unauthorized {
                locator: locator.to_string(),
            })
        }
    }

    /// Ensure the mirror exists with `branch` (or the configured default)
    /// checked out. `force_update` adds one more refresh afterwards.
    pub fn ensure_mirror(
        &self,
        locator: &RepoLocator,
        branch: Option<&str>,
        force_update: bool,
    ) -> Result<Mirror> {
        let branch = branch.unwrap_or(&self.settings.default_branch);
        let mirror = Mirror::ensure(
            locator.clone(),
            &self.settings.paths(),
            branch,
            self.settings.lock(),
        )?;
        if force_update {
            mirror.update()?;
        }
        Ok(mirror)
    }

    /// Clone the mirror if missing, otherwise refresh it when asked or required.
    pub fn sync(
        &self,
        locator: &RepoLocator,
        branch: Option<&str>,
        force_update: bool,
    ) -> Result<SyncOutcome> {
        let mirror = self.ensure_mirror(locator, branch, false)?;

        let status = if mirror.is_cloned() {
            SyncStatus::Cloned
        } else if force_update || mirror.is_update_required() {
            mirror.update()?;
            SyncStatus::Updated
        } else {
            SyncStatus::UpToDate
        };

        log::info!("Synced {}: {:?}", locator, status);
        Ok(SyncOutcome {
            locator: locator.clone(),
            status,
        })
    }

    pub fn list_branches(&self, mirror: &Mirror) -> Result<Vec<String>> {
        mirror.branch_names()
    }

    pub fn materialize_tree(
        &self,
        mirror: &Mirror,
        branch: Option<&str>,
        path: Option<&TreePath>,
        enrichments: &[Enrichment],
    ) -> Result<TreeNode> {
        mirror.materialize_tree(branch, path, enrichments)
    }

    pub fn read_file(&self, mirror: &Mirror, filename: &str) -> Result<String> {
        mirror.read_file(filename)
    }

    pub fn verify_file_checks(&self, mirror: &Mirror, checks: &[FileCheck]) -> Result<()> {
        mirror.files_contains(checks)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{OriginRepo, require_git};
    use crate::verify::Phrase;
    use tempfile::{TempDir, tempdir};

    fn handler_in(temp: &TempDir) -> Handler {
        let settings = Settings {
            root: temp.path().join("root"),
            lock_dir: temp.path().to_path_buf(),
            ..Settings::default()
        };
        Handler::new(settings)
    }

    #[test]
    fn detail_strings() {
        let locator: RepoLocator = "https://github.com/acme/widgets".parse().unwrap();
        let outcome = |status| SyncOutcome {
            locator: locator.clone(),
            status,
        };
        assert_eq!(
            outcome(SyncStatus::Cloned).detail(),
            "https://github.com/acme/widgets cloned"
        );
        assert_eq!(
            outcome(SyncStatus::Updated).detail(),
            "https://github.com/acme/widgets updated"
        );
        assert_eq!(
            outcome(SyncStatus::UpToDate).detail(),
            "https://github.com/acme/widgets does not require update"
        );
    }

    #[test]
    fn authorizer_denial_is_unauthorized() {
        let temp = tempdir().unwrap();
        let locator: RepoLocator = "https://github.com/acme/secret".parse().unwrap();

        let handler = handler_in(&temp);
        handler.authorize(&locator, None).unwrap();

        let handler = handler_in(&temp).with_authorizer(
            |locator: &RepoLocator, credential: Option<&str>| {
                credential == Some("token") && locator.namespace() == "acme"
            },
        );
        handler.authorize(&locator, Some("token")).unwrap();
        let err = handler.authorize(&locator, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn sync_clones_then_updates() {
        if !require_git() {
            return;
        }
        let temp = tempdir().unwrap();
        let origin = OriginRepo::create(temp.path());
        let handler = handler_in(&temp);
        let locator: RepoLocator = origin.url().parse().unwrap();

        let first = handler.sync(&locator, None, false).unwrap();
        assert_eq!(first.status, SyncStatus::Cloned);
        let second = handler.sync(&locator, None, false).unwrap();
        assert_eq!(second.status, SyncStatus::Updated);
        assert!(second.detail().ends_with(" updated"));
    }

    #[test]
    fn request_flow() {
        if !require_git() {
            return;
        }
        let temp = tempdir().unwrap();
        let origin = OriginRepo::create(temp.path());
        let handler = handler_in(&temp);
        let locator: RepoLocator = origin.url().parse().unwrap();

        let mirror = handler.ensure_mirror(&locator, None, true).unwrap();
        assert_eq!(mirror.default_branch(), "main");
        assert_eq!(
            handler.list_branches(&mirror).unwrap(),
            ["main".to_string(), "test".to_string()]
        );

        let tree = handler
            .materialize_tree(&mirror, None, None, &[Enrichment::AddBlobContent])
            .unwrap();
        assert!(tree.get("").unwrap().files().is_some());

        assert!(
            handler
                .read_file(&mirror, "main.py")
                .unwrap()
                .contains("def healthcheck():")
        );
        handler
            .verify_file_checks(
                &mirror,
                &[FileCheck {
                    filename: "main.py".into(),
                    phrases: vec![Phrase::new("import os")],
                }],
            )
            .unwrap();
    }

    #[test]
    fn ensure_mirror_on_other_branch() {
        if !require_git() {
            return;
        }
        let temp = tempdir().unwrap();
        let origin = OriginRepo::create(temp.path());
        let handler = handler_in(&temp);
        let locator: RepoLocator = origin.url().parse().unwrap();

        let mirror = handler.ensure_mirror(&locator, Some("test"), false).unwrap();
        assert_eq!(handler.read_file(&mirror, "TEST.md").unwrap(), "only on test\n");
    }
}
