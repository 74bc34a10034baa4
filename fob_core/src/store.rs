//! Content-addressed blob storage.
//!
//! Blobs live at `objects/{algorithm}/{prefix}/{suffix}` where prefix and suffix
//! are the first 2 and remaining 62 hex characters of the BLAKE3 digest. The
//! file holds the raw content; its digest is re-verified on every read.

use crate::atomic::write_atomic;
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A content-addressed blob store rooted at a repository's `objects/` directory.
#[derive(Debug, Clone)]
pub struct Store {
    objects_dir: PathBuf,
    algorithm: Algorithm,
}

impl Store {
    /// Open the store under `repo_dir`, creating its directory if missing.
    pub fn open<P: AsRef<Path>>(repo_dir: P, algorithm: Algorithm) -> Result<Self> {
        let objects_dir = repo_dir.as_ref().join("objects").join(algorithm.as_str());
        fs::create_dir_all(&objects_dir).map_err(Error::file_io("create", &objects_dir))?;
        Ok(Self {
            objects_dir,
            algorithm,
        })
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Get the path to an object file given its hash.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.objects_dir.join(hash.prefix()).join(hash.suffix())
    }

    /// Store bytes and return their digest.
    ///
    /// Storing content that is already present is a no-op returning the same digest.
    pub fn put(&self, content: &[u8]) -> Result<Hash> {
        let hash = Hash::hash_bytes(content);

        let obj_path = self.object_path(&hash);
        if obj_path.exists() {
            debug!(hash = %hash.short(), "blob already stored");
            return Ok(hash);
        }

        if let Some(parent) = obj_path.parent() {
            fs::create_dir_all(parent).map_err(Error::file_io("create", parent))?;
        }
        write_atomic(&obj_path, content)?;

        debug!(hash = %hash.short(), size = content.len(), "stored blob");
        Ok(hash)
    }

    /// Store everything readable from `reader`.
    pub fn put_reader<R: Read>(&self, mut reader: R) -> Result<Hash> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.put(&content)
    }

    /// Retrieve a blob by hash, verifying its content against the digest.
    pub fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let obj_path = self.object_path(hash);

        let content = match fs::read(&obj_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::object_not_found(hash.to_hex()));
            }
            Err(e) => return Err(Error::file_io("read", &obj_path)(e)),
        };

        // Verify hash matches (corruption detection)
        let computed_hash = Hash::hash_bytes(&content);
        if computed_hash != *hash {
            return Err(Error::corrupted_object(
                &obj_path,
                format!(
                    "Hash mismatch: expected {}, got {}",
                    hash.to_hex(),
                    computed_hash.to_hex()
                ),
            ));
        }

        Ok(content)
    }

    /// Check whether a blob is present.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.object_path(hash).is_file()
    }

    /// List every stored blob hash, sorted.
    ///
    /// Files whose shard/name do not form a valid hash are ignored.
    pub fn list(&self) -> Result<Vec<Hash>> {
        let mut hashes = Vec::new();

        let shards =
            fs::read_dir(&self.objects_dir).map_err(Error::file_io("list", &self.objects_dir))?;
        for shard_entry in shards {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }

            let prefix = shard_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();

            for obj_entry in fs::read_dir(&shard_path).map_err(Error::file_io("list", &shard_path))? {
                let obj_path = obj_entry?.path();
                if !obj_path.is_file() {
                    continue;
                }

                let suffix = obj_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if let Ok(hash) = Hash::from_hex(&format!("{}{}", prefix, suffix)) {
                    hashes.push(hash);
                }
            }
        }

        hashes.sort();
        Ok(hashes)
    }

    /// Delete a blob, returning the number of bytes freed.
    pub(crate) fn remove(&self, hash: &Hash) -> Result<u64> {
        let obj_path = self.object_path(hash);
        let size = fs::metadata(&obj_path)
            .map_err(Error::file_io("stat", &obj_path))?
            .len();
        fs::remove_file(&obj_path).map_err(Error::file_io("remove", &obj_path))?;

        // Drop the shard directory once empty; a concurrent writer recreates it.
        if let Some(shard) = obj_path.parent() {
            let _ = fs::remove_dir(shard);
        }

        Ok(size)
    }

    /// On-disk size of a blob.
    pub(crate) fn size_of(&self, hash: &Hash) -> Result<u64> {
        let obj_path = self.object_path(hash);
        Ok(fs::metadata(&obj_path)
            .map_err(Error::file_io("stat", &obj_path))?
            .len())
    }
}
