//! Shared types for git-handler

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for locator parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0:?}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("locator has no namespace segment")]
    MissingNamespace,
    #[error("invalid path segment: {0}")]
    InvalidSegment(String),
}

/// Identifies a remote repository by its URL.
///
/// The segments after `scheme://host/` are kept for local path derivation:
/// the first one is the namespace (organization or user), the rest is the
/// nested repository path.
///
/// Validation rules:
/// - Non-empty, no control characters
/// - Cannot start with `-`
/// - At least one segment after the host
/// - No `.` or `..` segments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoLocator {
    url: String,
    namespace: String,
    path: Vec<String>,
}

impl RepoLocator {
    /// Parses a locator, see [`FromStr`].
    pub fn parse(url: &str) -> Result<Self, ParseError> {
        url.parse()
    }

    /// Returns the URL the locator was parsed from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the namespace (first segment after the host)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the segments following the namespace
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

fn validate_segment(segment: &str) -> Result<(), ParseError> {
    if segment == "." || segment == ".." || segment.contains('\\') {
        return Err(ParseError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl FromStr for RepoLocator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.starts_with('-') {
            return Err(ParseError::InvalidStart('-'));
        }

        if let Some(c) = s.chars().find(|c| c.is_control()) {
            return Err(ParseError::InvalidCharacter(c));
        }

        // "scheme:", "", "host", segments...
        let mut segments = s
            .split('/')
            .skip(3)
            .filter(|segment| !segment.is_empty());

        let namespace = segments.next().ok_or(ParseError::MissingNamespace)?;
        validate_segment(namespace)?;

        let path = segments
            .map(|segment| validate_segment(segment).map(|()| segment.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RepoLocator {
            url: s.to_string(),
            namespace: namespace.to_string(),
            path,
        })
    }
}

impl fmt::Display for RepoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
