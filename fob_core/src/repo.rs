//! Repository handle: ties the store, index, commit graph and branch table to a
//! directory and runs each user-level operation as one load-mutate-save cycle.

use crate::branch::{BRANCHES_FILE, Branch, BranchSwitch, BranchTable};
use crate::commit::{Commit, CommitGraph};
use crate::config::{BinaryPolicy, CONFIG_FILE, Config};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::{Index, LoadedIndex};
use crate::lock::RepoLock;
use crate::store::Store;
use crate::sync::{self, PushReport};
use crate::walk::{IgnoreRules, index_key, walk_files};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Repository directory inside a working tree.
pub const REPO_DIR: &str = ".fob";

/// Default push destination, relative to the working tree.
pub const DEFAULT_REMOTE_DIR: &str = ".fob_remote";

/// An opened repository.
///
/// A working repository lives in `<work tree>/.fob`; a bare repository (used
/// as a push destination) is the directory itself and has no working tree.
#[derive(Debug)]
pub struct Repository {
    work_tree: Option<PathBuf>,
    dir: PathBuf,
    config: Config,
    store: Store,
    commits: CommitGraph,
}

/// A file staged by [`Repository::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    pub hash: Hash,
}

/// Why a path given to [`Repository::add`] was not staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Ignored,
    OutsideWorkTree,
    Binary,
    Unsupported,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not found",
            SkipReason::Ignored => "ignored",
            SkipReason::OutsideWorkTree => "outside working tree",
            SkipReason::Binary => "binary",
            SkipReason::Unsupported => "not a regular file",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A path [`Repository::add`] reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: String,
    pub reason: SkipReason,
}

/// Result of [`Repository::add`].
#[derive(Debug, Clone, Default)]
pub struct AddReport {
    pub staged: Vec<StagedFile>,
    pub skipped: Vec<SkippedPath>,
    pub recovered_corrupt_index: bool,
}

/// Result of [`Repository::commit`].
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub commit: Commit,
    pub branch: String,
    pub recovered_corrupt_index: bool,
}

impl Repository {
    /// Initialize a repository in `work_tree` with the default config.
    pub fn init<P: AsRef<Path>>(work_tree: P) -> Result<Self> {
        Self::init_with_config(work_tree, Config::default())
    }

    /// Initialize a repository in `work_tree` and switch to the initial branch.
    ///
    /// Creates:
    /// - `.fob/objects/` and `.fob/commits/`
    /// - empty `index.json`, then `branches.json` and `HEAD` holding the initial branch
    /// - `.fob/config`, written last
    ///
    /// If any step fails the partially built `.fob` is removed again.
    pub fn init_with_config<P: AsRef<Path>>(work_tree: P, config: Config) -> Result<Self> {
        let work_tree = work_tree.as_ref();
        fs::create_dir_all(work_tree).map_err(Error::file_io("create", work_tree))?;
        let work_tree = fs::canonicalize(work_tree).map_err(Error::file_io("resolve", work_tree))?;

        let dir = work_tree.join(REPO_DIR);
        // create_dir (not create_dir_all) so two racing inits cannot both succeed
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::already_initialized(&work_tree));
            }
            Err(e) => return Err(Error::file_io("create", &dir)(e)),
        }

        if let Err(e) = Self::populate(&dir, &config) {
            warn!(path = %dir.display(), error = %e, "init failed, removing partial repository");
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %cleanup, "could not remove partial repository");
            }
            return Err(e);
        }

        let repo = Self::load(Some(work_tree), dir)?;
        info!(path = %repo.dir.display(), branch = %repo.config.initial_branch, "initialized repository");
        Ok(repo)
    }

    /// Lay out a fresh working repository. The config file marks the directory
    /// as initialized, so it is written only after everything else succeeded.
    fn populate(dir: &Path, config: &Config) -> Result<()> {
        let _lock = RepoLock::acquire(dir)?;
        Store::open(dir, config.algorithm)?;
        CommitGraph::open(dir)?;
        Index::new().save(dir)?;

        let mut branches = BranchTable::new();
        branches.create_or_switch(&config.initial_branch)?;
        branches.save(dir)?;

        config.save(dir)
    }

    /// Initialize a bare repository directly in `dir` (no working tree, no branch).
    ///
    /// Runs under the lock of `dir`. Existing `commits/` and `branches.json` are
    /// adopted untouched; a `branches.json` that does not parse is `CorruptState`
    /// and nothing is written.
    pub fn init_bare<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(Error::file_io("create", dir))?;
        let dir = fs::canonicalize(dir).map_err(Error::file_io("resolve", dir))?;

        let _lock = RepoLock::acquire(&dir)?;
        if dir.join(CONFIG_FILE).exists() {
            return Err(Error::already_initialized(&dir));
        }

        let branches = BranchTable::load(&dir)?;
        let adopted = dir.join(BRANCHES_FILE).exists();
        if !adopted {
            branches.save(&dir)?;
        }

        let config = Config::default();
        Store::open(&dir, config.algorithm)?;
        CommitGraph::open(&dir)?;
        config.save(&dir)?;

        info!(
            path = %dir.display(),
            adopted,
            branches = branches.list().len(),
            "initialized bare repository"
        );
        Self::load(None, dir)
    }

    /// Open the repository of a working tree.
    pub fn open<P: AsRef<Path>>(work_tree: P) -> Result<Self> {
        let work_tree = work_tree.as_ref();
        let dir = work_tree.join(REPO_DIR);
        if !dir.join(CONFIG_FILE).is_file() {
            return Err(Error::not_a_repository(work_tree));
        }
        let work_tree = fs::canonicalize(work_tree).map_err(Error::file_io("resolve", work_tree))?;
        Self::load(Some(work_tree.clone()), work_tree.join(REPO_DIR))
    }

    /// Open a bare repository.
    pub fn open_bare<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.join(CONFIG_FILE).is_file() {
            return Err(Error::not_a_repository(dir));
        }
        let dir = fs::canonicalize(dir).map_err(Error::file_io("resolve", dir))?;
        Self::load(None, dir)
    }

    /// Open a bare repository, creating it on first use.
    pub fn open_or_init_bare<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.join(CONFIG_FILE).is_file() {
            return Self::open_bare(dir);
        }
        match Self::init_bare(dir) {
            // Lost the race against another first push
            Err(Error::AlreadyInitialized { .. }) => Self::open_bare(dir),
            result => result,
        }
    }

    fn load(work_tree: Option<PathBuf>, dir: PathBuf) -> Result<Self> {
        let config = Config::load(&dir)?;
        let store = Store::open(&dir, config.algorithm)?;
        let commits = CommitGraph::open(&dir)?;
        debug!(path = %dir.display(), "opened repository");

        Ok(Self {
            work_tree,
            dir,
            config,
            store,
            commits,
        })
    }

    /// Working tree root, `None` for bare repositories.
    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    /// The repository directory (`.fob` or the bare directory).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn commits(&self) -> &CommitGraph {
        &self.commits
    }

    /// Take the exclusive repository lock for a read-modify-write cycle.
    pub fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(&self.dir)
    }

    /// Load the staging area.
    pub fn index(&self) -> Result<LoadedIndex> {
        Index::load(&self.dir)
    }

    /// Load the branch table and HEAD.
    pub fn branches(&self) -> Result<BranchTable> {
        BranchTable::load(&self.dir)
    }

    /// Default push destination for this repository.
    pub fn default_remote(&self) -> PathBuf {
        match &self.work_tree {
            Some(work_tree) => work_tree.join(DEFAULT_REMOTE_DIR),
            None => self.dir.with_file_name(DEFAULT_REMOTE_DIR),
        }
    }

    fn require_work_tree(&self) -> Result<&Path> {
        self.work_tree
            .as_deref()
            .ok_or_else(|| Error::not_a_repository(&self.dir))
    }

    /// Stage files. Directories (including `.`) are added recursively.
    ///
    /// Relative paths are resolved against the working tree root. Missing,
    /// ignored, out-of-tree and (under `binary=skip`) non-UTF-8 paths are
    /// reported in the returned [`AddReport`] and skipped. Symlinks and other
    /// non-regular files are reported as unsupported, whether named directly
    /// or met during a recursive walk.
    pub fn add<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AddReport> {
        let work_tree = self.require_work_tree()?;
        let rules = IgnoreRules::load(work_tree)?;

        let _lock = self.lock()?;
        let LoadedIndex {
            mut index,
            recovered_corrupt,
        } = self.index()?;

        let mut report = AddReport {
            recovered_corrupt_index: recovered_corrupt,
            ..AddReport::default()
        };

        for path in paths {
            let path = path.as_ref();
            let shown = path.display().to_string();
            let skip = |reason| SkippedPath {
                path: shown.clone(),
                reason,
            };

            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                work_tree.join(path)
            };

            let Ok(absolute) = resolve_parent(&absolute) else {
                report.skipped.push(skip(SkipReason::NotFound));
                continue;
            };
            let Ok(rel) = absolute.strip_prefix(work_tree) else {
                report.skipped.push(skip(SkipReason::OutsideWorkTree));
                continue;
            };
            if rules.is_ignored(rel) {
                report.skipped.push(skip(SkipReason::Ignored));
                continue;
            }
            let Ok(metadata) = fs::symlink_metadata(&absolute) else {
                report.skipped.push(skip(SkipReason::NotFound));
                continue;
            };

            let file_type = metadata.file_type();
            if file_type.is_dir() {
                let listing = walk_files(work_tree, &absolute, &rules)?;
                for file in &listing.files {
                    self.stage_file(&mut index, &mut report, work_tree, file)?;
                }
                report
                    .skipped
                    .extend(listing.unsupported.iter().map(|other| SkippedPath {
                        path: other.display().to_string(),
                        reason: SkipReason::Unsupported,
                    }));
            } else if file_type.is_file() {
                self.stage_file(&mut index, &mut report, work_tree, rel)?;
            } else {
                // Symlinks are never followed or recorded
                report.skipped.push(skip(SkipReason::Unsupported));
            }
        }

        index.save(&self.dir)?;
        info!(
            staged = report.staged.len(),
            skipped = report.skipped.len(),
            "updated index"
        );
        Ok(report)
    }

    fn stage_file(
        &self,
        index: &mut Index,
        report: &mut AddReport,
        work_tree: &Path,
        rel: &Path,
    ) -> Result<()> {
        let Some(key) = index_key(rel) else {
            report.skipped.push(SkippedPath {
                path: rel.display().to_string(),
                reason: SkipReason::Unsupported,
            });
            return Ok(());
        };

        let absolute = work_tree.join(rel);
        let content = fs::read(&absolute).map_err(Error::file_io("read", &absolute))?;

        if self.config.binary == BinaryPolicy::Skip && std::str::from_utf8(&content).is_err() {
            debug!(path = %key, "skipping binary file");
            report.skipped.push(SkippedPath {
                path: key,
                reason: SkipReason::Binary,
            });
            return Ok(());
        }

        let hash = index.stage(&self.store, &key, &content)?;
        debug!(path = %key, hash = %hash.short(), "staged");
        report.staged.push(StagedFile { path: key, hash });
        Ok(())
    }

    /// Commit the staged files on the current branch.
    ///
    /// Ordering: the commit object is persisted, then the branch pointer moves,
    /// then the index is cleared. An interruption leaves at worst an orphan
    /// commit or a still-populated index, never a branch pointing at nothing.
    pub fn commit(&self, message: &str) -> Result<CommitOutcome> {
        let _lock = self.lock()?;

        let mut branches = self.branches()?;
        let branch = branches.current_branch()?;

        let LoadedIndex {
            mut index,
            recovered_corrupt,
        } = self.index()?;
        let files = index.snapshot();

        for hash in files.values() {
            if !self.store.contains(hash) {
                return Err(Error::object_not_found(hash.to_hex()));
            }
        }

        let commit = self.commits.create_commit(message, branch.head, files)?;

        branches.advance(&branch.name, commit.id)?;
        branches.save(&self.dir)?;

        index.clear();
        index.save(&self.dir)?;

        info!(
            commit = %commit.id.short(),
            branch = %branch.name,
            files = commit.files.len(),
            "committed"
        );

        Ok(CommitOutcome {
            commit,
            branch: branch.name,
            recovered_corrupt_index: recovered_corrupt,
        })
    }

    /// History of the current branch, newest first.
    pub fn log(&self) -> Result<Vec<Commit>> {
        let branch = self.branches()?.current_branch()?;
        self.commits.log(branch.head.as_ref())
    }

    /// History of a named branch, newest first.
    pub fn log_branch(&self, name: &str) -> Result<Vec<Commit>> {
        let branch = self.branches()?.branch(name)?;
        self.commits.log(branch.head.as_ref())
    }

    /// Every stored commit, newest first.
    pub fn log_all(&self) -> Result<Vec<Commit>> {
        self.commits.all()
    }

    /// Switch to `name`, creating it from the current branch if needed.
    pub fn branch(&self, name: &str) -> Result<(Branch, BranchSwitch)> {
        let _lock = self.lock()?;
        let mut branches = self.branches()?;
        let result = branches.create_or_switch(name)?;
        branches.save(&self.dir)?;
        Ok(result)
    }

    /// Name of the active branch, if any.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.branches()?.current().map(str::to_string))
    }

    /// Push a branch (the current one by default) to a bare repository at `remote`.
    ///
    /// The destination is created on first push.
    pub fn push<P: AsRef<Path>>(&self, remote: P, branch: Option<&str>) -> Result<PushReport> {
        let branch = match branch {
            Some(name) => name.to_string(),
            None => self
                .current_branch()?
                .ok_or(Error::NoCurrentBranch)?,
        };

        let destination = Self::open_or_init_bare(remote)?;
        sync::push(self, &destination, &branch)
    }
}

/// Make `path` absolute without resolving its final component, so a symlink
/// stays a symlink instead of turning into its target.
fn resolve_parent(path: &Path) -> std::io::Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok(fs::canonicalize(parent)?.join(name)),
        _ => fs::canonicalize(path),
    }
}
