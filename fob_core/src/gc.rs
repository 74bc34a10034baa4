//! Garbage collection.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::repo::Repository;
use std::collections::HashSet;
use std::fs;
use tracing::{debug, info};

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of commit files deleted.
    pub commits_deleted: usize,
    /// Number of blobs deleted.
    pub blobs_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

impl Repository {
    /// Run garbage collection.
    ///
    /// Commits reachable from any branch head are live, as are their blobs and
    /// every blob in the index. Everything else is deleted. If `dry_run` is true,
    /// reports what would be deleted without actually deleting.
    pub fn gc(&self, dry_run: bool) -> Result<GcStats> {
        let _lock = self.lock()?;

        // Mark phase
        let live_commits = self.commits().reachable(self.branches()?.heads())?;
        let live_blobs = self.mark_blobs(&live_commits)?;

        // Sweep phase
        let mut stats = GcStats::default();
        self.sweep_commits(&live_commits, dry_run, &mut stats)?;
        self.sweep_blobs(&live_blobs, dry_run, &mut stats)?;

        info!(
            dry_run,
            commits = stats.commits_deleted,
            blobs = stats.blobs_deleted,
            bytes = stats.bytes_freed,
            "garbage collection finished"
        );
        Ok(stats)
    }

    fn mark_blobs(&self, live_commits: &HashSet<Hash>) -> Result<HashSet<Hash>> {
        let mut live = HashSet::new();
        for id in live_commits {
            let commit = self.commits().get_commit(id)?;
            live.extend(commit.files.into_values());
        }
        live.extend(self.index()?.index.hashes().copied());
        Ok(live)
    }

    fn sweep_commits(
        &self,
        live: &HashSet<Hash>,
        dry_run: bool,
        stats: &mut GcStats,
    ) -> Result<()> {
        for id in self.commits().list_ids()? {
            if live.contains(&id) {
                continue;
            }
            debug!(commit = %id.short(), dry_run, "unreachable commit");
            stats.bytes_freed += if dry_run {
                let path = self.commits().commit_path(&id);
                fs::metadata(&path).map_err(Error::file_io("stat", &path))?.len()
            } else {
                self.commits().remove(&id)?
            };
            stats.commits_deleted += 1;
        }
        Ok(())
    }

    fn sweep_blobs(&self, live: &HashSet<Hash>, dry_run: bool, stats: &mut GcStats) -> Result<()> {
        for hash in self.store().list()? {
            if live.contains(&hash) {
                continue;
            }
            debug!(blob = %hash.short(), dry_run, "unreferenced blob");
            stats.bytes_freed += if dry_run {
                self.store().size_of(&hash)?
            } else {
                self.store().remove(&hash)?
            };
            stats.blobs_deleted += 1;
        }
        Ok(())
    }
}
