//! # Fob Core
//!
//! A minimal local version control system.
//!
//! File contents are stored as content-addressed blobs (BLAKE3). Staged paths live
//! in a persistent index until committed; commits are immutable snapshots linked to
//! their parent; named branches point at commits, with HEAD selecting the active
//! one. A branch and everything it references can be pushed to another repository.
//!
//! ## Layout
//!
//! ```text
//! .fob/
//!   config               key=value settings
//!   objects/blake3-256/  blobs, sharded by the first two hex digits
//!   commits/<id>.json    commit objects
//!   index.json           staged path -> blob
//!   branches.json        name -> {commit_id, parent}
//!   HEAD                 active branch name
//!   lock                 exclusive lock held by mutating operations
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use fob_core::Repository;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::init("./project")?;
//!
//! repo.add(&["notes.txt"])?;
//! let outcome = repo.commit("first")?;
//! println!("{} on {}", outcome.commit.id.short(), outcome.branch);
//!
//! repo.branch("feature")?;
//! for commit in repo.log()? {
//!     println!("{} {}", commit.id.short(), commit.message);
//! }
//!
//! let report = repo.push(repo.default_remote(), None)?;
//! println!("copied {} commits", report.commits_copied);
//! # Ok(())
//! # }
//! ```

mod atomic;
mod branch;
mod commit;
mod config;
mod error;
mod gc;
mod hash;
mod index;
mod lock;
mod repo;
mod store;
mod sync;
mod verify;
mod walk;

pub use branch::{BRANCHES_FILE, Branch, BranchSwitch, BranchTable, HEAD_FILE, validate_branch_name};
pub use commit::{Ancestors, COMMITS_DIR, Commit, CommitGraph, sort_newest_first};
pub use config::{BinaryPolicy, CONFIG_FILE, Config, DEFAULT_INITIAL_BRANCH};
pub use error::{Error, Result};
pub use gc::GcStats;
pub use hash::{Algorithm, HASH_SIZE, Hash};
pub use index::{INDEX_FILE, Index, LoadedIndex};
pub use lock::{LOCK_FILE, RepoLock};
pub use repo::{
    AddReport, CommitOutcome, DEFAULT_REMOTE_DIR, REPO_DIR, Repository, SkipReason, SkippedPath,
    StagedFile,
};
pub use store::Store;
pub use sync::{PushReport, push};
pub use verify::{Problem, VerifyReport};
pub use walk::{IGNORE_FILE, IgnoreRules, TreeListing, index_key, walk_files};
