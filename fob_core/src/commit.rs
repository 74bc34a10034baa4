//! Commits and the commit graph.
//!
//! A commit is stored as `commits/<id>.json`. Its id is the BLAKE3 digest of a
//! canonical encoding of its body, so identical commits share an id and any
//! stored commit can be checked by rehashing:
//!
//! ```text
//! {"message":"…","timestamp":"2024-05-01T12:00:00.000000Z","parent":"<hex>"|null,"files":{"<path>":"<hex>",…}}
//! ```
//!
//! Keys appear in exactly that order, `files` is sorted by path and there is
//! no whitespace. Parent links are the only ancestry edges.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::hash::Hash;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory holding commit files inside the repository directory.
pub const COMMITS_DIR: &str = "commits";

/// An immutable snapshot of staged files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(rename = "commit_id")]
    pub id: Hash,
    pub message: String,
    #[serde(rename = "commit_time")]
    pub timestamp: DateTime<Utc>,
    pub parent: Option<Hash>,
    pub files: BTreeMap<String, Hash>,
}

/// Borrowed view of the hashed fields, in canonical key order.
#[derive(Serialize)]
struct CanonicalCommit<'a> {
    message: &'a str,
    timestamp: String,
    parent: Option<&'a Hash>,
    files: &'a BTreeMap<String, Hash>,
}

impl Commit {
    /// Build a commit, deriving its id from the other fields.
    ///
    /// The timestamp is truncated to microseconds so that it survives the
    /// on-disk representation unchanged.
    pub fn new(
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        parent: Option<Hash>,
        files: BTreeMap<String, Hash>,
    ) -> Result<Self> {
        let message = message.into();
        let timestamp = timestamp.trunc_subsecs(6);
        let id = Self::compute_id(&message, &timestamp, parent.as_ref(), &files)?;
        Ok(Self {
            id,
            message,
            timestamp,
            parent,
            files,
        })
    }

    /// Canonical byte encoding of the hashed fields.
    pub fn canonical_bytes(
        message: &str,
        timestamp: &DateTime<Utc>,
        parent: Option<&Hash>,
        files: &BTreeMap<String, Hash>,
    ) -> Result<Vec<u8>> {
        let body = CanonicalCommit {
            message,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            parent,
            files,
        };
        Ok(serde_json::to_vec(&body)?)
    }

    /// Digest of the canonical encoding.
    pub fn compute_id(
        message: &str,
        timestamp: &DateTime<Utc>,
        parent: Option<&Hash>,
        files: &BTreeMap<String, Hash>,
    ) -> Result<Hash> {
        let bytes = Self::canonical_bytes(message, timestamp, parent, files)?;
        Ok(Hash::hash_bytes(&bytes))
    }

    /// Recompute the digest from the current field values.
    pub fn recompute_id(&self) -> Result<Hash> {
        Self::compute_id(
            &self.message,
            &self.timestamp,
            self.parent.as_ref(),
            &self.files,
        )
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Order commits newest first; equal timestamps fall back to ascending id.
pub fn sort_newest_first(commits: &mut [Commit]) {
    commits.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// The set of stored commits, linked by parent ids.
#[derive(Debug, Clone)]
pub struct CommitGraph {
    dir: PathBuf,
}

impl CommitGraph {
    /// Open the commit directory under `repo_dir`, creating it if missing.
    pub fn open(repo_dir: &Path) -> Result<Self> {
        let dir = repo_dir.join(COMMITS_DIR);
        fs::create_dir_all(&dir).map_err(Error::file_io("create", &dir))?;
        Ok(Self { dir })
    }

    /// Path of the file holding a commit.
    pub fn commit_path(&self, id: &Hash) -> PathBuf {
        self.dir.join(format!("{}.json", id.to_hex()))
    }

    /// Create and persist a commit timestamped now.
    pub fn create_commit(
        &self,
        message: &str,
        parent: Option<Hash>,
        files: BTreeMap<String, Hash>,
    ) -> Result<Commit> {
        self.create_commit_at(message, Utc::now(), parent, files)
    }

    /// Create and persist a commit with an explicit timestamp.
    ///
    /// Fails with `CommitNotFound` if `parent` is not stored.
    pub fn create_commit_at(
        &self,
        message: &str,
        timestamp: DateTime<Utc>,
        parent: Option<Hash>,
        files: BTreeMap<String, Hash>,
    ) -> Result<Commit> {
        if let Some(parent) = &parent
            && !self.contains(parent)
        {
            return Err(Error::commit_not_found(parent.to_hex()));
        }

        let commit = Commit::new(message, timestamp, parent, files)?;
        self.put(&commit)?;
        Ok(commit)
    }

    /// Persist a commit unless already present. Returns `true` if it was written.
    ///
    /// Refuses commits whose id does not match their content.
    pub fn put(&self, commit: &Commit) -> Result<bool> {
        let path = self.commit_path(&commit.id);

        let computed = commit.recompute_id()?;
        if computed != commit.id {
            return Err(Error::corrupted_object(
                &path,
                format!("Commit id {} does not match content hash {}", commit.id, computed),
            ));
        }

        if path.exists() {
            return Ok(false);
        }

        let json = serde_json::to_string_pretty(commit)?;
        write_atomic(&path, json.as_bytes())?;
        debug!(commit = %commit.id.short(), files = commit.files.len(), "stored commit");
        Ok(true)
    }

    /// Load a commit, verifying that it hashes to its id.
    pub fn get_commit(&self, id: &Hash) -> Result<Commit> {
        let path = self.commit_path(id);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::commit_not_found(id.to_hex()));
            }
            Err(e) => return Err(Error::file_io("read", &path)(e)),
        };

        let commit: Commit = serde_json::from_str(&content)
            .map_err(|e| Error::corrupted_object(&path, format!("Invalid commit JSON: {}", e)))?;

        if commit.id != *id {
            return Err(Error::corrupted_object(
                &path,
                format!("File holds commit {} instead of {}", commit.id, id),
            ));
        }

        let computed = commit.recompute_id()?;
        if computed != *id {
            return Err(Error::corrupted_object(
                &path,
                format!("Hash mismatch: expected {}, got {}", id, computed),
            ));
        }

        Ok(commit)
    }

    /// Check whether a commit is stored.
    pub fn contains(&self, id: &Hash) -> bool {
        self.commit_path(id).is_file()
    }

    /// Walk from `id` to the root along parent links, starting with `id` itself.
    pub fn ancestors(&self, id: &Hash) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            next: Some(*id),
        }
    }

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor).
    pub fn is_ancestor(&self, ancestor: &Hash, descendant: &Hash) -> Result<bool> {
        for commit in self.ancestors(descendant) {
            if commit?.id == *ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Commits reachable from `head`, newest first. An empty head has no history.
    pub fn log(&self, head: Option<&Hash>) -> Result<Vec<Commit>> {
        let Some(head) = head else {
            return Ok(Vec::new());
        };

        let mut commits = self.ancestors(head).collect::<Result<Vec<_>>>()?;
        sort_newest_first(&mut commits);
        Ok(commits)
    }

    /// Every stored commit, newest first.
    ///
    /// Unreadable commit files are logged and skipped.
    pub fn all(&self) -> Result<Vec<Commit>> {
        let mut commits = Vec::new();
        for id in self.list_ids()? {
            match self.get_commit(&id) {
                Ok(commit) => commits.push(commit),
                Err(e) => warn!(commit = %id, error = %e, "skipping unreadable commit"),
            }
        }
        sort_newest_first(&mut commits);
        Ok(commits)
    }

    /// Ids of every commit file, sorted. Names that are not `<hex>.json` are ignored.
    pub fn list_ids(&self) -> Result<Vec<Hash>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(Error::file_io("list", &self.dir))? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(id) = Hash::from_hex(stem)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every commit reachable from any of `heads`.
    pub fn reachable(&self, heads: impl IntoIterator<Item = Hash>) -> Result<HashSet<Hash>> {
        let mut seen = HashSet::new();
        for head in heads {
            for commit in self.ancestors(&head) {
                let commit = commit?;
                // Everything older was visited from an earlier head.
                if !seen.insert(commit.id) {
                    break;
                }
            }
        }
        Ok(seen)
    }

    /// Delete a commit file, returning the number of bytes freed.
    pub(crate) fn remove(&self, id: &Hash) -> Result<u64> {
        let path = self.commit_path(id);
        let size = fs::metadata(&path).map_err(Error::file_io("stat", &path))?.len();
        fs::remove_file(&path).map_err(Error::file_io("remove", &path))?;
        Ok(size)
    }
}

/// Lazy parent-link walk produced by [`CommitGraph::ancestors`].
///
/// Yields an error and stops if a commit along the way is missing or corrupt.
#[derive(Debug, Clone)]
pub struct Ancestors<'g> {
    graph: &'g CommitGraph,
    next: Option<Hash>,
}

impl Iterator for Ancestors<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match self.graph.get_commit(&id) {
            Ok(commit) => {
                self.next = commit.parent;
                Some(Ok(commit))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::iter::FusedIterator for Ancestors<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn files(entries: &[(&str, &[u8])]) -> BTreeMap<String, Hash> {
        entries
            .iter()
            .map(|(path, content)| (path.to_string(), Hash::hash_bytes(content)))
            .collect()
    }

    #[test]
    fn test_commit_id_is_deterministic() {
        let a = Commit::new("first", at(0), None, files(&[("file.txt", b"hello")])).unwrap();
        let b = Commit::new("first", at(0), None, files(&[("file.txt", b"hello")])).unwrap();
        assert_eq!(a.id, b.id);

        let c = Commit::new("second", at(0), None, files(&[("file.txt", b"hello")])).unwrap();
        assert_ne!(a.id, c.id);

        let d = Commit::new("first", at(1), None, files(&[("file.txt", b"hello")])).unwrap();
        assert_ne!(a.id, d.id);

        let e = Commit::new("first", at(0), Some(a.id), files(&[("file.txt", b"hello")]))
            .unwrap();
        assert_ne!(a.id, e.id);
    }

    #[test]
    fn test_canonical_encoding_layout() {
        let parent = Hash::hash_bytes(b"parent");
        let bytes = Commit::canonical_bytes(
            "msg",
            &at(0),
            Some(&parent),
            &files(&[("b.txt", b"b"), ("a.txt", b"a")]),
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();

        let expected = format!(
            r#"{{"message":"msg","timestamp":"2023-11-14T22:13:20.000000Z","parent":"{}","files":{{"a.txt":"{}","b.txt":"{}"}}}}"#,
            parent,
            Hash::hash_bytes(b"a"),
            Hash::hash_bytes(b"b")
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_id_is_digest_of_canonical_bytes() {
        let files = files(&[("file.txt", b"hello")]);
        let commit = Commit::new("first", at(0), None, files.clone()).unwrap();
        let bytes = Commit::canonical_bytes("first", &at(0), None, &files).unwrap();

        assert!(!bytes.is_empty());
        assert_eq!(commit.id, Hash::hash_bytes(&bytes));
        assert_ne!(commit.id, Hash::hash_bytes(b""));
        assert_eq!(commit.recompute_id().unwrap(), commit.id);
    }

    #[test]
    fn test_json_roundtrip_preserves_id() {
        let commit = Commit::new(
            "with subsecond time",
            Utc::now(),
            None,
            files(&[("x", b"1")]),
        )
        .unwrap();
        let json = serde_json::to_string_pretty(&commit).unwrap();
        let parsed: Commit = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, commit);
        assert_eq!(parsed.recompute_id().unwrap(), commit.id);
    }

    #[test]
    fn test_create_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let commit = graph
            .create_commit("first", None, files(&[("file.txt", b"hello")]))
            .unwrap();

        assert!(graph.contains(&commit.id));
        assert!(graph.commit_path(&commit.id).ends_with(format!("commits/{}.json", commit.id)));
        assert_eq!(graph.get_commit(&commit.id).unwrap(), commit);
    }

    #[test]
    fn test_create_rejects_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let dangling = Hash::hash_bytes(b"nope");
        let result = graph.create_commit("orphan", Some(dangling), BTreeMap::new());
        assert!(matches!(result, Err(Error::CommitNotFound { .. })));
        assert!(graph.list_ids().unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_commit() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let result = graph.get_commit(&Hash::hash_bytes(b"missing"));
        assert!(matches!(result, Err(Error::CommitNotFound { .. })));
    }

    #[test]
    fn test_get_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let commit = graph.create_commit("honest", None, BTreeMap::new()).unwrap();
        let path = graph.commit_path(&commit.id);
        let tampered = fs::read_to_string(&path).unwrap().replace("honest", "forged");
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            graph.get_commit(&commit.id),
            Err(Error::CorruptedObject { .. })
        ));
    }

    #[test]
    fn test_put_rejects_mismatched_id() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let mut commit = Commit::new("msg", at(0), None, BTreeMap::new()).unwrap();
        commit.message = "changed after hashing".to_string();

        assert!(graph.put(&commit).is_err());
    }

    #[test]
    fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let commit = Commit::new("msg", at(0), None, BTreeMap::new()).unwrap();
        assert!(graph.put(&commit).unwrap());
        assert!(!graph.put(&commit).unwrap());
        assert_eq!(graph.list_ids().unwrap(), vec![commit.id]);
    }

    #[test]
    fn test_ancestors_follow_parents() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let a = graph.create_commit_at("A", at(1), None, BTreeMap::new()).unwrap();
        let b = graph.create_commit_at("B", at(2), Some(a.id), BTreeMap::new()).unwrap();
        let c = graph.create_commit_at("C", at(3), Some(b.id), BTreeMap::new()).unwrap();
        // Unrelated root that must never show up
        graph.create_commit_at("X", at(4), None, BTreeMap::new()).unwrap();

        let ids: Vec<Hash> = graph.ancestors(&c.id).map(|c| c.unwrap().id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        // Restartable between calls
        assert_eq!(graph.ancestors(&c.id).count(), 3);

        assert!(graph.is_ancestor(&a.id, &c.id).unwrap());
        assert!(graph.is_ancestor(&c.id, &c.id).unwrap());
        assert!(!graph.is_ancestor(&c.id, &a.id).unwrap());
    }

    #[test]
    fn test_ancestors_stop_on_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let a = graph.create_commit_at("A", at(1), None, BTreeMap::new()).unwrap();
        let b = graph.create_commit_at("B", at(2), Some(a.id), BTreeMap::new()).unwrap();
        fs::remove_file(graph.commit_path(&a.id)).unwrap();

        let mut walk = graph.ancestors(&b.id);
        assert!(walk.next().unwrap().is_ok());
        assert!(walk.next().unwrap().is_err());
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_log_is_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let t1 = graph.create_commit_at("T1", at(1), None, BTreeMap::new()).unwrap();
        let t2 = graph.create_commit_at("T2", at(2), Some(t1.id), BTreeMap::new()).unwrap();
        let t3 = graph.create_commit_at("T3", at(3), Some(t2.id), BTreeMap::new()).unwrap();

        let log: Vec<String> = graph
            .log(Some(&t3.id))
            .unwrap()
            .into_iter()
            .map(|c| c.message)
            .collect();
        assert_eq!(log, vec!["T3", "T2", "T1"]);

        assert!(graph.log(None).unwrap().is_empty());
    }

    #[test]
    fn test_sort_breaks_timestamp_ties_by_id() {
        let mut commits = vec![
            Commit::new("a", at(5), None, BTreeMap::new()).unwrap(),
            Commit::new("b", at(5), None, BTreeMap::new()).unwrap(),
            Commit::new("c", at(9), None, BTreeMap::new()).unwrap(),
        ];
        sort_newest_first(&mut commits);

        assert_eq!(commits[0].message, "c");
        assert!(commits[1].id < commits[2].id);
    }

    #[test]
    fn test_all_skips_unreadable_files() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let a = graph.create_commit_at("A", at(1), None, BTreeMap::new()).unwrap();
        let b = graph.create_commit_at("B", at(2), None, BTreeMap::new()).unwrap();
        let bogus = Hash::hash_bytes(b"bogus");
        fs::write(graph.commit_path(&bogus), "not json").unwrap();
        fs::write(temp_dir.path().join(COMMITS_DIR).join("notes.txt"), "ignored").unwrap();

        let all: Vec<Hash> = graph.all().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(all, vec![b.id, a.id]);
    }

    #[test]
    fn test_reachable_from_several_heads() {
        let temp_dir = TempDir::new().unwrap();
        let graph = CommitGraph::open(temp_dir.path()).unwrap();

        let a = graph.create_commit_at("A", at(1), None, BTreeMap::new()).unwrap();
        let b = graph.create_commit_at("B", at(2), Some(a.id), BTreeMap::new()).unwrap();
        let c = graph.create_commit_at("C", at(3), Some(a.id), BTreeMap::new()).unwrap();
        let orphan = graph.create_commit_at("O", at(4), None, BTreeMap::new()).unwrap();

        let reachable = graph.reachable([b.id, c.id]).unwrap();
        assert_eq!(reachable.len(), 3);
        assert!(!reachable.contains(&orphan.id));
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Serializing and reparsing a commit keeps its id verifiable
        #[test]
        fn prop_commit_roundtrip_rehashes(
            message in ".*",
            secs in 0i64..4_000_000_000,
            nanos in 0u32..1_000_000_000,
            paths in prop::collection::btree_map("[a-z/._-]{1,16}", any::<Vec<u8>>(), 0..6),
        ) {
            let timestamp = Utc.timestamp_opt(secs, nanos).unwrap();
            let files: BTreeMap<String, Hash> = paths
                .iter()
                .map(|(path, content)| (path.clone(), Hash::hash_bytes(content)))
                .collect();

            let commit = Commit::new(message, timestamp, None, files)?;
            let json = serde_json::to_string(&commit)?;
            let parsed: Commit = serde_json::from_str(&json)?;

            prop_assert_eq!(parsed.recompute_id()?, commit.id);
            prop_assert_eq!(parsed, commit);
        }
    }
}
