//! Error types for the key store, persistence strategies, and path tree.

use thiserror::Error;

/// Failures raised below the path tree: transport, consensus, and encoding.
#[derive(Debug, Error)]
pub enum StoreError {
    /// DHT unreachable or timed out
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    /// Replicas did not agree within the retry budget
    #[error("replicas disagree on key {key} after {attempts} attempts")]
    Inconsistent { key: String, attempts: usize },

    /// A chunk referenced by a manifest could not be resolved
    #[error("missing chunk {chunk} for key {key}")]
    MissingChunk { key: String, chunk: String },

    /// Versioned strategy could not archive the previous value
    #[error("failed to archive previous version: {0}")]
    Archive(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(#[from] sled::Error),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Failures surfaced to the filesystem binding.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such path: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("path already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FsError {
    /// Positive errno value for this failure; callers negate it at the binding.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::Store(_) => libc::EIO,
        }
    }

    /// Whether retrying the same operation cannot succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FsError::NotFound(_)
                | FsError::Store(StoreError::Archive(_))
                | FsError::Store(StoreError::MissingChunk { .. })
        )
    }
}

/// Errors raised while wiring the system together (configuration, logging, startup).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
