//! Authorization collaborator queried before a repository is touched.

use crate::types::RepoLocator;

/// Decides whether `credential` may access `locator`.
pub trait Authorizer: Send + Sync {
    fn is_allowed(&self, locator: &RepoLocator, credential: Option<&str>) -> bool;
}

/// Permits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_allowed(&self, _locator: &RepoLocator, _credential: Option<&str>) -> bool {
        true
    }
}

impl<F> Authorizer for F
where
    F: Fn(&RepoLocator, Option<&str>) -> bool + Send + Sync,
{
    fn is_allowed(&self, locator: &RepoLocator, credential: Option<&str>) -> bool {
        self(locator, credential)
    }
}
