//! Error types for fob_core.

use crate::hash::Hash;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using fob_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error without a known path.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// I/O error tied to a specific file operation.
    #[error("Failed to {op} {path}: {source}")]
    FileIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding error.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// The directory does not contain an initialized repository.
    #[error("Not a fob repository: {path} (run `fob init` first)")]
    NotARepository { path: PathBuf },

    /// `init` was run on a directory that already holds a repository.
    #[error("Repository already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    /// Blob not found in the content store.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// Commit not found in the commit graph.
    #[error("Commit not found: {id}")]
    CommitNotFound { id: String },

    /// Branch not found in the branch table.
    #[error("No such branch: {name}")]
    BranchNotFound { name: String },

    /// HEAD does not name any branch.
    #[error("HEAD does not point to any branch")]
    NoCurrentBranch,

    /// A mutable state file (index, branch table, HEAD) failed to parse.
    #[error("Corrupt repository state at {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// A stored object does not match its content address.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// A push would need a non-fast-forward update of the destination branch.
    #[error(
        "Divergent history on branch '{branch}': remote head {remote} is not an ancestor of local head {}",
        display_head(.local)
    )]
    DivergentHistory {
        branch: String,
        local: Option<Hash>,
        remote: Hash,
    },

    /// Invalid branch name.
    #[error("Invalid branch name '{name}': {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Invalid repository configuration.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
}

impl Error {
    /// Build a closure that wraps an `io::Error` with the operation and path.
    ///
    /// Intended for `map_err`: `fs::read(&p).map_err(Error::file_io("read", &p))`.
    pub fn file_io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::FileIo { op, path, source }
    }

    /// Create a NotARepository error.
    pub fn not_a_repository(path: impl Into<PathBuf>) -> Self {
        Error::NotARepository { path: path.into() }
    }

    /// Create an AlreadyInitialized error.
    pub fn already_initialized(path: impl Into<PathBuf>) -> Self {
        Error::AlreadyInitialized { path: path.into() }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create a CommitNotFound error.
    pub fn commit_not_found(id: impl Into<String>) -> Self {
        Error::CommitNotFound { id: id.into() }
    }

    /// Create a BranchNotFound error.
    pub fn branch_not_found(name: impl Into<String>) -> Self {
        Error::BranchNotFound { name: name.into() }
    }

    /// Create a CorruptState error.
    pub fn corrupt_state(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a DivergentHistory error.
    pub fn divergent_history(branch: impl Into<String>, local: Option<Hash>, remote: Hash) -> Self {
        Error::DivergentHistory {
            branch: branch.into(),
            local,
            remote,
        }
    }

    /// Create an InvalidBranchName error.
    pub fn invalid_branch_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidBranchName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }
}

fn display_head(head: &Option<Hash>) -> String {
    match head {
        Some(hash) => hash.to_hex(),
        None => "(none)".to_string(),
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
