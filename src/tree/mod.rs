//! Tree materialization
//!
//! Walks the git tree of a resolved branch and produces a nested,
//! name-keyed [`TreeNode`]. A path prefix prunes the walk: at depth `idx`
//! a directory whose name does not match `path[idx]` (ignoring case) is
//! dropped together with everything below it. Directories deeper than the
//! path are kept in full.

mod enrich;

pub use enrich::{Enrichment, FileRecord, UnknownEnrichment, decode_text};

use std::collections::BTreeMap;

use git2::{ObjectType, Repository, Tree};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::cache::{GitError, Mirror, open_repository};
use crate::error::Result;

/// Key under which a directory lists its files.
pub const FILES_KEY: &str = "files";

/// Path filter for [`Mirror::materialize_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreePath {
    /// A `/`-separated path such as `resources/templates`.
    Unparsed(String),
    /// An already split path.
    Segments(Vec<String>),
}

impl From<&str> for TreePath {
    fn from(path: &str) -> Self {
        TreePath::Unparsed(path.to_string())
    }
}

impl From<String> for TreePath {
    fn from(path: String) -> Self {
        TreePath::Unparsed(path)
    }
}

impl From<Vec<String>> for TreePath {
    fn from(segments: Vec<String>) -> Self {
        TreePath::Segments(segments)
    }
}

impl TreePath {
    /// Segments anchored at the unnamed root: always starts with `""`.
    ///
    /// Empty segments after the anchor (`a//b`, trailing `/`) are dropped.
    pub fn segments(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            TreePath::Unparsed(path) => path.split('/').collect(),
            TreePath::Segments(segments) => segments.iter().map(String::as_str).collect(),
        };

        std::iter::once(String::new())
            .chain(
                raw.into_iter()
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string),
            )
            .collect()
    }
}

fn normalize(path: Option<&TreePath>) -> Vec<String> {
    path.map_or_else(|| vec![String::new()], TreePath::segments)
}

/// One directory of a materialized tree.
///
/// Serializes as a map: `files` first (when the directory holds files),
/// then one key per surviving subdirectory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    files: Option<Vec<FileRecord>>,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    /// Files directly in this directory, `None` when it has none.
    pub fn files(&self) -> Option<&[FileRecord]> {
        self.files.as_deref()
    }

    pub fn children(&self) -> &BTreeMap<String, TreeNode> {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        self.children.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_none() && self.children.is_empty()
    }

    /// Follow `names` down from this node.
    pub fn descend<'a, I>(&self, names: I) -> Option<&TreeNode>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .try_fold(self, |node, name| node.children.get(name))
    }

    /// Subdirectories that serialize without clashing with the files key.
    fn visible_children(&self) -> impl Iterator<Item = (&String, &TreeNode)> {
        let has_files = self.files.is_some();
        self.children
            .iter()
            .filter(move |(name, _)| !(has_files && name.as_str() == FILES_KEY))
    }
}

impl Serialize for TreeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = usize::from(self.files.is_some()) + self.visible_children().count();
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(files) = &self.files {
            map.serialize_entry(FILES_KEY, files)?;
        }
        for (name, child) in self.visible_children() {
            map.serialize_entry(name, child)?;
        }
        map.end()
    }
}

/// Materialize `tree` into a single-key structure keyed by the root name `""`.
pub(crate) fn materialize(
    repo: &Repository,
    tree: &Tree<'_>,
    path: Option<&TreePath>,
    enrichments: &[Enrichment],
) -> Result<TreeNode> {
    let path = normalize(path);
    let mut top = TreeNode::default();
    walk(repo, tree, "", &path, 0, enrichments, &mut top.children)?;
    Ok(top)
}

fn walk(
    repo: &Repository,
    tree: &Tree<'_>,
    name: &str,
    path: &[String],
    idx: usize,
    enrichments: &[Enrichment],
    parent: &mut BTreeMap<String, TreeNode>,
) -> Result<()> {
    if let Some(expected) = path.get(idx)
        && name.to_lowercase() != expected.to_lowercase()
    {
        return Ok(());
    }

    let mut node = TreeNode::default();
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in tree.iter() {
        let entry_name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
        match entry.kind() {
            Some(ObjectType::Blob) => {
                let mut record = FileRecord::new(entry_name);
                if !enrichments.is_empty() {
                    let blob = repo.find_blob(entry.id()).map_err(GitError::Git)?;
                    for enrichment in enrichments {
                        enrichment.apply(&mut record, blob.content());
                    }
                }
                files.push(record);
            }
            Some(ObjectType::Tree) => subdirs.push((entry_name, entry.id())),
            // Submodule commits have no content in this repository.
            _ => log::trace!("Skipping tree entry {} ({:?})", entry_name, entry.kind()),
        }
    }

    if !files.is_empty() {
        node.files = Some(files);
    }

    for (child_name, id) in subdirs {
        let subtree = repo.find_tree(id).map_err(GitError::Git)?;
        walk(
            repo,
            &subtree,
            &child_name,
            path,
            idx + 1,
            enrichments,
            &mut node.children,
        )?;
    }

    parent.insert(name.to_string(), node);
    Ok(())
}

impl Mirror {
    /// Materialize the tree of `branch` (default branch when `None`),
    /// filtered by `path` and enriched per file.
    ///
    /// An unknown branch fails with [`crate::Error::UnknownBranch`]; a path
    /// matching nothing just yields the root with its own files.
    pub fn materialize_tree(
        &self,
        branch: Option<&str>,
        path: Option<&TreePath>,
        enrichments: &[Enrichment],
    ) -> Result<TreeNode> {
        let resolved = self.resolve_branch(branch)?;
        let repo = open_repository(self.path())?;
        let commit = repo.find_commit(resolved.commit).map_err(GitError::Git)?;
        let tree = commit.tree().map_err(GitError::Git)?;

        log::debug!(
            "Materializing {} at {} ({} enrichments)",
            self.locator(),
            resolved.name,
            enrichments.len()
        );
        materialize(&repo, &tree, path, enrichments)
    }
}
