//! Working tree enumeration and ignore rules.

use crate::error::{Error, Result};
use crate::repo::{DEFAULT_REMOTE_DIR, REPO_DIR};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Ignore file at the working tree root.
pub const IGNORE_FILE: &str = ".fobignore";

/// Names excluded from `add`.
///
/// A path is ignored when any of its components equals one of the names.
/// The repository directory and the default push target are always ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    names: HashSet<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::parse("")
    }
}

impl IgnoreRules {
    /// Read `.fobignore` from the working tree root; a missing file means defaults only.
    pub fn load(work_tree: &Path) -> Result<Self> {
        let path = work_tree.join(IGNORE_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::file_io("read", &path)(e)),
        }
    }

    /// Parse newline-separated names; blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        let mut names: HashSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        names.insert(REPO_DIR.to_string());
        names.insert(DEFAULT_REMOTE_DIR.to_string());
        Self { names }
    }

    /// Whether any component of `rel_path` is an ignored name.
    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        rel_path.components().any(|component| match component {
            Component::Normal(name) => name.to_str().is_some_and(|n| self.names.contains(n)),
            _ => false,
        })
    }
}

/// Convert a path relative to the working tree into its index key.
///
/// Returns `None` for paths that leave the tree, are empty, or are not UTF-8.
pub fn index_key(rel_path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel_path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Result of [`walk_files`]. All paths are relative to the working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeListing {
    /// Regular files, sorted.
    pub files: Vec<PathBuf>,
    /// Symlinks and other entries that are neither files nor directories, sorted.
    pub unsupported: Vec<PathBuf>,
}

/// Entries under `start`, relative to `work_tree`, skipping ignored paths.
///
/// Symlinks are not followed; they are listed in [`TreeListing::unsupported`].
pub fn walk_files(work_tree: &Path, start: &Path, rules: &IgnoreRules) -> Result<TreeListing> {
    let root = Arc::new(work_tree.to_path_buf());
    let rules = Arc::new(rules.clone());

    let walker = ignore::WalkBuilder::new(start)
        .standard_filters(false) // .fobignore semantics only
        .hidden(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry({
            let root = Arc::clone(&root);
            let rules = Arc::clone(&rules);
            move |entry| {
                let rel = entry.path().strip_prefix(root.as_path()).unwrap_or(entry.path());
                !rules.is_ignored(rel)
            }
        })
        .build();

    let mut listing = TreeListing::default();
    for entry in walker {
        let entry = entry?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root.as_path()) else {
            continue;
        };
        if file_type.is_file() {
            listing.files.push(rel.to_path_buf());
        } else {
            listing.unsupported.push(rel.to_path_buf());
        }
    }

    listing.files.sort();
    listing.unsupported.sort();
    Ok(listing)
}
