//! Pushing a branch into another repository.

use crate::commit::Commit;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::repo::Repository;
use tracing::{debug, info};

/// What a push transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub branch: String,
    /// Destination head before the push.
    pub old_head: Option<Hash>,
    /// Destination head after the push (the source head).
    pub new_head: Option<Hash>,
    pub commits_copied: usize,
    pub blobs_copied: usize,
    /// True when the destination already matched and nothing was written.
    pub up_to_date: bool,
}

/// Copy `branch` and everything it references from `source` into `destination`.
///
/// Only fast-forwards are allowed: when the destination already has the branch,
/// its head must be an ancestor of the source head, otherwise the push fails with
/// `DivergentHistory` before anything is copied. Objects are written oldest commit
/// first and each commit's blobs before the commit itself, so an interrupted push
/// never leaves a destination commit with missing parents or blobs. The branch
/// record is written last.
pub fn push(source: &Repository, destination: &Repository, branch: &str) -> Result<PushReport> {
    let local = source.branches()?.branch(branch)?;

    let _lock = destination.lock()?;
    let mut remote_branches = destination.branches()?;
    let remote = remote_branches.get(branch);
    let old_head = remote.as_ref().and_then(|b| b.head);

    if let Some(remote_head) = old_head {
        let fast_forward = match &local.head {
            Some(local_head) => source.commits().is_ancestor(&remote_head, local_head)?,
            None => false,
        };
        if !fast_forward {
            return Err(Error::divergent_history(branch, local.head, remote_head));
        }
    }

    let missing = missing_commits(source, destination, local.head.as_ref())?;

    let mut blobs_copied = 0;
    let mut commits_copied = 0;
    for commit in missing.iter().rev() {
        for hash in commit.files.values() {
            if destination.store().contains(hash) {
                continue;
            }
            let content = source.store().get(hash)?;
            destination.store().put(&content)?;
            blobs_copied += 1;
        }
        if destination.commits().put(commit)? {
            commits_copied += 1;
        }
    }

    let up_to_date = remote.as_ref() == Some(&local) && commits_copied == 0 && blobs_copied == 0;
    if !up_to_date {
        remote_branches.set(&local)?;
        remote_branches.save(destination.dir())?;
    }

    info!(
        branch,
        commits = commits_copied,
        blobs = blobs_copied,
        up_to_date,
        "pushed"
    );

    Ok(PushReport {
        branch: branch.to_string(),
        old_head,
        new_head: local.head,
        commits_copied,
        blobs_copied,
        up_to_date,
    })
}

/// Commits reachable from `head` that the destination lacks, newest first.
///
/// The walk stops at the first commit the destination already stores; pushes
/// copy oldest-first, so everything behind it is present too.
fn missing_commits(
    source: &Repository,
    destination: &Repository,
    head: Option<&Hash>,
) -> Result<Vec<Commit>> {
    let Some(head) = head else {
        return Ok(Vec::new());
    };

    let mut missing = Vec::new();
    for commit in source.commits().ancestors(head) {
        let commit = commit?;
        if destination.commits().contains(&commit.id) {
            debug!(commit = %commit.id.short(), "destination already has commit");
            break;
        }
        missing.push(commit);
    }
    Ok(missing)
}
