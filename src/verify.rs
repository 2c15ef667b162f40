//! File retrieval and phrase verification against the working copy.

use std::io;
use std::path::{Component, Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::Mirror;
use crate::error::{Error, Result};

/// A literal block of lines a file must contain.
///
/// `pre` and `post` only decorate the failure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pre: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub post: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Phrase {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            pre: String::new(),
            post: String::new(),
        }
    }

    /// First trimmed line of the phrase that does not occur in `haystack`.
    pub fn missing_line<'a>(&'a self, haystack: &str) -> Option<&'a str> {
        self.content
            .trim()
            .lines()
            .map(str::trim)
            .find(|line| !haystack.contains(line))
    }

    /// The phrase with its annotations, as shown in a mismatch report.
    pub fn render(&self) -> String {
        let mut out = format!("{}{}", self.pre, self.content.trim());
        if !self.post.is_empty() {
            out.push('\n');
            out.push_str(&self.post);
        }
        out
    }
}

/// Phrases expected in one file of the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCheck {
    pub filename: String,
    pub phrases: Vec<Phrase>,
}

/// First phrase with a line missing from `haystack`. Stops at the first miss.
pub fn first_missing<'a, I>(haystack: &str, phrases: I) -> Option<&'a Phrase>
where
    I: IntoIterator<Item = &'a Phrase>,
{
    phrases
        .into_iter()
        .find(|phrase| phrase.missing_line(haystack).is_some())
}

/// Only plain relative paths stay inside the working copy.
fn is_contained(filename: &str) -> bool {
    let path = Path::new(filename);
    !filename.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl Mirror {
    /// Text content of `filename`, relative to the working copy root.
    pub fn read_file(&self, filename: &str) -> Result<String> {
        let not_found = || Error::FileNotFound {
            locator: self.locator().to_string(),
            filename: filename.to_string(),
        };

        if !is_contained(filename) {
            return Err(not_found());
        }
        let full_path = self.path().join(filename);
        if !full_path.is_file() {
            return Err(not_found());
        }
        // Symlinks may point anywhere; only targets under the root are served.
        let resolved = full_path.canonicalize().map_err(|_| not_found())?;
        let root = self.path().canonicalize()?;
        if !resolved.starts_with(&root) {
            log::warn!(
                "{} in {} resolves outside the working copy",
                filename,
                self.locator()
            );
            return Err(not_found());
        }

        let bytes = std::fs::read(&resolved)?;
        String::from_utf8(bytes).map_err(|e| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8: {}", filename, e),
            ))
        })
    }

    /// Refresh the mirror, then require every phrase line in every file.
    ///
    /// Fails on the first missing file or phrase; later checks are not evaluated.
    pub fn files_contains(&self, checks: &[FileCheck]) -> Result<()> {
        self.update()?;

        for check in checks {
            let content = self.read_file(&check.filename)?;
            if let Some(phrase) = first_missing(&content, &check.phrases) {
                log::debug!(
                    "{} in {} is missing {:?}",
                    check.filename,
                    self.locator(),
                    phrase.missing_line(&content)
                );
                return Err(Error::ContentMismatch {
                    locator: self.locator().to_string(),
                    branch: self.default_branch().to_string(),
                    filename: check.filename.clone(),
                    phrase: phrase.render(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const MAIN_PY: &str = "import os\n\n\ndef healthcheck():\n    return 'ok'\n";

    #[test]
    fn every_trimmed_line_must_occur() {
        let phrase = Phrase::new("  import os\n    def healthcheck():  \n");
        assert_eq!(phrase.missing_line(MAIN_PY), None);

        let phrase = Phrase::new("import os\nimport sys");
        assert_eq!(phrase.missing_line(MAIN_PY), Some("import sys"));
    }

    #[test]
    fn empty_phrase_always_matches() {
        assert_eq!(Phrase::new("   \n").missing_line(MAIN_PY), None);
    }

    #[test]
    fn render_includes_annotations() {
        let phrase = Phrase {
            content: "\nimport sys\n".into(),
            pre: "the line ".into(),
            post: "see the docs".into(),
        };
        assert_eq!(phrase.render(), "the line import sys\nsee the docs");
        assert_eq!(Phrase::new("x").render(), "x");
    }

    #[test]
    fn first_missing_stops_early() {
        let phrases = vec![
            Phrase::new("import os"),
            Phrase::new("import sys"),
            Phrase::new("import re"),
        ];
        let evaluated = Cell::new(0);
        let missing = first_missing(
            MAIN_PY,
            phrases.iter().inspect(|_| evaluated.set(evaluated.get() + 1)),
        );
        assert_eq!(missing.map(|p| p.content.as_str()), Some("import sys"));
        assert_eq!(evaluated.get(), 2);
    }

    #[test]
    fn containment_rejects_escapes() {
        assert!(is_contained("main.py"));
        assert!(is_contained("resources/conf.py"));
        assert!(is_contained("./main.py"));
        assert!(!is_contained(""));
        assert!(!is_contained("../secret"));
        assert!(!is_contained("/etc/passwd"));
        assert!(!is_contained("resources/../../x"));
    }

    #[test]
    fn check_deserializes_without_annotations() {
        let check: FileCheck = serde_json::from_str(
            r#"{"filename": "main.py", "phrases": [{"content": "import os"}]}"#,
        )
        .unwrap();
        assert_eq!(check.phrases[0], Phrase::new("import os"));
    }

    #[test]
    fn null_annotations_read_as_empty() {
        let phrase: Phrase =
            serde_json::from_str(r#"{"content": "import os", "pre": null, "post": null}"#)
                .unwrap();
        assert_eq!(phrase, Phrase::new("import os"));

        let phrase: Phrase =
            serde_json::from_str(r#"{"content": "x", "pre": "a ", "post": null}"#).unwrap();
        assert_eq!(phrase.render(), "a x");
    }

    mod through_mirror {
        use super::*;
        use crate::cache::{CachePaths, RefreshLock};
        use crate::error::ErrorKind;
        use crate::test_support::{OriginRepo, require_git};
        use std::time::Duration;
        use tempfile::tempdir;

        fn mirror_of(origin: &OriginRepo, root: &Path) -> Mirror {
            let lock =
                RefreshLock::in_dir(root, "lock").with_poll_interval(Duration::from_millis(10));
            Mirror::ensure(
                origin.url().parse().unwrap(),
                &CachePaths::new(root.join("root")),
                "main",
                lock,
            )
            .unwrap()
        }

        fn check(filename: &str, phrases: &[&str]) -> FileCheck {
            FileCheck {
                filename: filename.to_string(),
                phrases: phrases.iter().map(|p| Phrase::new(*p)).collect(),
            }
        }

        #[test]
        fn read_file_returns_exact_content() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            assert_eq!(mirror.read_file("main.py").unwrap(), MAIN_PY);
            assert_eq!(
                mirror.read_file("resources/conf.py").unwrap(),
                "DEFAULT_GIT_BRANCH = 'main'\n"
            );
        }

        #[test]
        fn read_missing_file_or_directory_fails() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            for name in ["tests/NOT_EXIST.cfg", "resources", "../origin"] {
                let err = mirror.read_file(name).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::FileNotFound, "{}", name);
                assert!(err.to_string().contains(name));
            }
        }

        #[test]
        fn files_contains_passes() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            let checks = [
                check("main.py", &["import os", "def healthcheck():"]),
                check("resources/conf.py", &["DEFAULT_GIT_BRANCH"]),
            ];
            mirror.files_contains(&checks).unwrap();
        }

        #[test]
        fn files_contains_reports_first_mismatch() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            let checks = [
                check("main.py", &["import os", "import sys\nimport os", "import re"]),
                check("NOT_EXIST.cfg", &["x"]),
            ];
            match mirror.files_contains(&checks).unwrap_err() {
                Error::ContentMismatch {
                    branch,
                    filename,
                    phrase,
                    ..
                } => {
                    assert_eq!(branch, "main");
                    assert_eq!(filename, "main.py");
                    assert_eq!(phrase, "import sys\nimport os");
                }
                other => panic!("unexpected error: {}", other),
            }
        }

        #[test]
        fn files_contains_missing_file() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            let err = mirror
                .files_contains(&[check("tests/NOT_EXIST.cfg", &["x"])])
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FileNotFound);
        }

        #[test]
        fn files_contains_sees_fresh_commits() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            origin.commit_file("main", "main.py", "import sys\n");
            mirror
                .files_contains(&[check("main.py", &["import sys"])])
                .unwrap();
        }

        #[test]
        fn symlink_outside_working_copy_is_not_found() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let secret = temp.path().join("secret.txt");
            std::fs::write(&secret, "password=hunter2\n").unwrap();
            let origin = OriginRepo::create(temp.path());
            let mirror = mirror_of(&origin, temp.path());

            let depth = mirror
                .path()
                .strip_prefix(temp.path())
                .unwrap()
                .components()
                .count();
            let relative = format!("{}secret.txt", "../".repeat(depth + 1));
            origin.commit_symlink("main", "leak.txt", secret.to_str().unwrap());
            origin.commit_symlink("main", "docs/up.txt", &relative);
            mirror.update().unwrap();

            for name in ["leak.txt", "docs/up.txt"] {
                assert!(mirror.path().join(name).is_file(), "{}", name);
                let err = mirror.read_file(name).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::FileNotFound, "{}", name);
            }
            let err = mirror
                .files_contains(&[check("leak.txt", &["password"])])
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FileNotFound);
        }

        #[test]
        fn symlink_inside_working_copy_is_served() {
            if !require_git() {
                return;
            }
            let temp = tempdir().unwrap();
            let origin = OriginRepo::create(temp.path());
            origin.commit_symlink("main", "docs/readme-link.md", "../README.md");
            let mirror = mirror_of(&origin, temp.path());

            assert_eq!(
                mirror.read_file("docs/readme-link.md").unwrap(),
                "# widgets\n"
            );
        }
    }
}
