//! Local origin repositories for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository, RepositoryInitOptions, Signature, TreeWalkMode, TreeWalkResult};

use crate::cache::GitCli;

/// Returns false (and says so) when the git executable is missing.
pub fn require_git() -> bool {
    if GitCli::new().is_available() {
        true
    } else {
        eprintln!("skipping test: git executable not found");
        false
    }
}

/// Files committed on `main` in every origin.
pub const MAIN_FILES: &[(&str, &str)] = &[
    ("README.md", "# widgets\n"),
    (
        "main.py",
        "import os\n\n\ndef healthcheck():\n    return 'ok'\n",
    ),
    ("resources/conf.py", "DEFAULT_GIT_BRANCH = 'main'\n"),
    ("resources/handler.py", "class Handler:\n    pass\n"),
    ("resources/templates/index.html", "<html></html>\n"),
    ("docs/guide.md", "guide\n"),
];

/// A repository with `main` and `test` branches, cloneable over `file://`.
pub struct OriginRepo {
    path: PathBuf,
    repo: Repository,
}

impl OriginRepo {
    /// Create the origin at `{base}/origin/acme/widgets`.
    pub fn create(base: &Path) -> Self {
        let path = base.join("origin").join("acme").join("widgets");
        std::fs::create_dir_all(&path).unwrap();

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&path, &opts).unwrap();

        let origin = Self { path, repo };
        for (name, content) in MAIN_FILES {
            origin.commit_file("main", name, content);
        }

        {
            let head = origin
                .repo
                .find_reference("refs/heads/main")
                .unwrap()
                .peel_to_commit()
                .unwrap();
            origin.repo.branch("test", &head, false).unwrap();
        }
        origin.commit_file("test", "TEST.md", "only on test\n");
        origin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// `file://` URL of the origin.
    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }

    /// Commit `content` at `name` on top of `branch`.
    pub fn commit_file(&self, branch: &str, name: &str, content: &str) -> Oid {
        self.commit_bytes(branch, name, content.as_bytes())
    }

    /// Commit raw bytes at `name` on top of `branch`.
    pub fn commit_bytes(&self, branch: &str, name: &str, content: &[u8]) -> Oid {
        self.commit_entry(branch, name, content, FILE_MODE)
    }

    /// Commit a symbolic link `name` pointing at `target`.
    pub fn commit_symlink(&self, branch: &str, name: &str, target: &str) -> Oid {
        self.commit_entry(branch, name, target.as_bytes(), SYMLINK_MODE)
    }

    fn commit_entry(&self, branch: &str, name: &str, content: &[u8], mode: i32) -> Oid {
        let repo = &self.repo;
        let ref_name = format!("refs/heads/{}", branch);
        let parent = repo
            .find_reference(&ref_name)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());

        let mut entries = BTreeMap::new();
        if let Some(parent) = &parent {
            let tree = parent.tree().unwrap();
            tree.walk(TreeWalkMode::PreOrder, |root, entry| {
                if entry.kind() == Some(git2::ObjectType::Blob) {
                    entries.insert(
                        format!("{}{}", root, entry.name().unwrap()),
                        (entry.id(), entry.filemode()),
                    );
                }
                TreeWalkResult::Ok
            })
            .unwrap();
        }
        entries.insert(name.to_string(), (repo.blob(content).unwrap(), mode));

        let tree_id = build_tree(repo, &entries);
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(
            Some(&ref_name),
            &sig,
            &sig,
            &format!("add {}", name),
            &tree,
            &parents,
        )
        .unwrap()
    }
}

const FILE_MODE: i32 = 0o100644;
const SYMLINK_MODE: i32 = 0o120000;

fn build_tree(repo: &Repository, entries: &BTreeMap<String, (Oid, i32)>) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let mut subdirs: BTreeMap<&str, BTreeMap<String, (Oid, i32)>> = BTreeMap::new();

    for (path, (oid, mode)) in entries {
        match path.split_once('/') {
            Some((dir, rest)) => {
                subdirs
                    .entry(dir)
                    .or_default()
                    .insert(rest.to_string(), (*oid, *mode));
            }
            None => {
                builder.insert(path, *oid, *mode).unwrap();
            }
        }
    }

    for (dir, children) in subdirs {
        let oid = build_tree(repo, &children);
        builder.insert(dir, oid, 0o040000).unwrap();
    }

    builder.write().unwrap()
}
