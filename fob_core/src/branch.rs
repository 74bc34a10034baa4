//! Branch table and HEAD.
//!
//! `branches.json` maps each branch name to the commit it points at and the
//! branch it was created from; `HEAD` holds the name of the active branch on a
//! single line. The recorded parent branch is lineage only and never takes
//! part in ancestry queries.

use crate::atomic::{read_optional, write_atomic};
use crate::error::{Error, Result};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Name of the branch table file inside the repository directory.
pub const BRANCHES_FILE: &str = "branches.json";

/// Name of the HEAD file inside the repository directory.
pub const HEAD_FILE: &str = "HEAD";

/// A named pointer into the commit graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub head: Option<Hash>,
    pub parent_branch: Option<String>,
}

/// On-disk record of a branch; the name is the map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BranchRecord {
    commit_id: Option<Hash>,
    parent: Option<String>,
}

/// Outcome of [`BranchTable::create_or_switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSwitch {
    /// A new branch was created and HEAD moved to it.
    Created,
    /// HEAD moved to an existing branch; nothing else changed.
    Switched,
}

/// All branches plus the HEAD pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchTable {
    branches: BTreeMap<String, BranchRecord>,
    head: Option<String>,
}

/// Validate a branch name.
///
/// Names end up as JSON keys and in the single-line HEAD file, so they must not
/// contain path traversal, separators, whitespace or control characters.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_branch_name(name, "name cannot be empty"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_branch_name(
            name,
            "must not contain .. or path separators",
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid_branch_name(
            name,
            "must not contain whitespace or control characters",
        ));
    }
    if name == HEAD_FILE {
        return Err(Error::invalid_branch_name(name, "HEAD is reserved"));
    }
    Ok(())
}

impl BranchTable {
    /// Create an empty table with no HEAD.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `branches.json` and `HEAD` from a repository directory.
    ///
    /// Missing files mean an empty table and unset HEAD. Unparseable
    /// `branches.json` is `CorruptState`.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let branches_path = repo_dir.join(BRANCHES_FILE);
        let branches = match read_optional(&branches_path)? {
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| Error::corrupt_state(&branches_path, e.to_string()))?,
            None => BTreeMap::new(),
        };

        let head_path = repo_dir.join(HEAD_FILE);
        let head = read_optional(&head_path)?
            .map(|content| content.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self { branches, head })
    }

    /// Atomically write `branches.json` and `HEAD`.
    ///
    /// The branch table is written first so HEAD never names a branch that is
    /// missing on disk.
    pub fn save(&self, repo_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.branches)?;
        write_atomic(&repo_dir.join(BRANCHES_FILE), json.as_bytes())?;

        let head = match &self.head {
            Some(name) => format!("{}\n", name),
            None => String::new(),
        };
        write_atomic(&repo_dir.join(HEAD_FILE), head.as_bytes())
    }

    /// Switch to `name`, creating it from the current branch if it does not exist.
    pub fn create_or_switch(&mut self, name: &str) -> Result<(Branch, BranchSwitch)> {
        validate_branch_name(name)?;

        if self.branches.contains_key(name) {
            self.head = Some(name.to_string());
            info!(branch = name, "switched branch");
            return Ok((self.branch(name)?, BranchSwitch::Switched));
        }

        let parent = self.head.clone();
        let commit_id = parent
            .as_deref()
            .and_then(|current| self.branches.get(current))
            .and_then(|record| record.commit_id);

        self.branches.insert(
            name.to_string(),
            BranchRecord {
                commit_id,
                parent: parent.clone(),
            },
        );
        self.head = Some(name.to_string());

        info!(
            branch = name,
            from = parent.as_deref().unwrap_or("-"),
            head = %commit_id.map(|h| h.short()).unwrap_or_default(),
            "created branch"
        );
        Ok((self.branch(name)?, BranchSwitch::Created))
    }

    /// Name of the active branch.
    pub fn current(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// The active branch, failing if HEAD is unset or names a missing branch.
    pub fn current_branch(&self) -> Result<Branch> {
        let name = self.current().ok_or(Error::NoCurrentBranch)?;
        self.branch(name)
    }

    /// Look up a branch.
    pub fn get(&self, name: &str) -> Option<Branch> {
        self.branches.get(name).map(|record| Branch {
            name: name.to_string(),
            head: record.commit_id,
            parent_branch: record.parent.clone(),
        })
    }

    /// Look up a branch, failing with `BranchNotFound`.
    pub fn branch(&self, name: &str) -> Result<Branch> {
        self.get(name).ok_or_else(|| Error::branch_not_found(name))
    }

    /// Check whether a branch exists.
    pub fn contains(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// All branches, sorted by name.
    pub fn list(&self) -> Vec<Branch> {
        self.branches
            .keys()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Point `name` at `commit_id`.
    ///
    /// The commit must already be persisted; this only moves the pointer.
    pub fn advance(&mut self, name: &str, commit_id: Hash) -> Result<()> {
        let record = self
            .branches
            .get_mut(name)
            .ok_or_else(|| Error::branch_not_found(name))?;
        record.commit_id = Some(commit_id);
        info!(branch = name, head = %commit_id.short(), "advanced branch");
        Ok(())
    }

    /// Insert or replace a branch record as-is, leaving HEAD alone.
    pub(crate) fn set(&mut self, branch: &Branch) -> Result<()> {
        validate_branch_name(&branch.name)?;
        self.branches.insert(
            branch.name.clone(),
            BranchRecord {
                commit_id: branch.head,
                parent: branch.parent_branch.clone(),
            },
        );
        Ok(())
    }

    /// Heads of every branch that points at a commit.
    pub fn heads(&self) -> impl Iterator<Item = Hash> + '_ {
        self.branches.values().filter_map(|record| record.commit_id)
    }
}
