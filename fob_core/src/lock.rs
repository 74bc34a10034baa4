//! Advisory repository lock serializing read-modify-write cycles.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file inside the repository directory.
pub const LOCK_FILE: &str = "lock";

/// Exclusive lock on a repository, released on drop.
///
/// The lock file itself is never removed; only the OS-level lock on it matters,
/// so a crashed holder cannot leave the repository locked.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Block until the exclusive lock on `repo_dir/lock` is held.
    pub fn acquire(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(Error::file_io("open", &path))?;

        file.lock_exclusive().map_err(Error::file_io("lock", &path))?;
        debug!(path = %path.display(), "acquired repository lock");

        Ok(Self { file, path })
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "failed to release repository lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let temp_dir = TempDir::new().unwrap();

        let lock = RepoLock::acquire(temp_dir.path()).unwrap();
        drop(lock);

        let _again = RepoLock::acquire(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_lock_excludes_other_holders() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Arc::new(temp_dir.path().to_path_buf());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _lock = RepoLock::acquire(&dir).unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
