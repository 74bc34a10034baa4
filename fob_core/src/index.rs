//! The staging area: pending path → blob associations persisted in `index.json`.

use crate::atomic::{read_optional, write_atomic};
use crate::error::Result;
use crate::hash::Hash;
use crate::store::Store;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Name of the index file inside the repository directory.
pub const INDEX_FILE: &str = "index.json";

/// Staged entries keyed by working-tree path (`/`-separated, relative to the root).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, Hash>,
}

/// Result of loading an index from disk.
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: Index,
    /// True when the file was unreadable JSON and has been reset to empty.
    pub recovered_corrupt: bool,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from `repo_dir/index.json`.
    ///
    /// A missing file is an empty index. A file that fails to parse is reset to
    /// empty: this lossy recovery is logged and reported via
    /// [`LoadedIndex::recovered_corrupt`].
    pub fn load(repo_dir: &Path) -> Result<LoadedIndex> {
        let path = repo_dir.join(INDEX_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(LoadedIndex {
                index: Index::new(),
                recovered_corrupt: false,
            });
        };

        match serde_json::from_str::<BTreeMap<String, Hash>>(&content) {
            Ok(entries) => Ok(LoadedIndex {
                index: Index { entries },
                recovered_corrupt: false,
            }),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "index is corrupt; discarding staged entries and starting from an empty index"
                );
                Ok(LoadedIndex {
                    index: Index::new(),
                    recovered_corrupt: true,
                })
            }
        }
    }

    /// Atomically write the index to `repo_dir/index.json`.
    pub fn save(&self, repo_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&repo_dir.join(INDEX_FILE), json.as_bytes())
    }

    /// Store `content` and stage it under `path`, replacing any prior entry.
    pub fn stage(&mut self, store: &Store, path: &str, content: &[u8]) -> Result<Hash> {
        let hash = store.put(content)?;
        self.stage_hash(path, hash);
        Ok(hash)
    }

    /// Stage an already-stored blob under `path`.
    pub fn stage_hash(&mut self, path: &str, hash: Hash) {
        self.entries.insert(path.to_string(), hash);
    }

    /// Copy of the current staged set.
    pub fn snapshot(&self) -> BTreeMap<String, Hash> {
        self.entries.clone()
    }

    /// Remove every staged entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Look up the staged blob for a path.
    pub fn get(&self, path: &str) -> Option<&Hash> {
        self.entries.get(path)
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over staged blobs.
    pub fn hashes(&self) -> impl Iterator<Item = &Hash> {
        self.entries.values()
    }
}
