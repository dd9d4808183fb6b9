//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Error`], whose variants map
//! onto the retry/propagation policy of each component: `Transport` errors stay
//! queued and get retried by the engine, `Capability` errors cause an op to be
//! skipped rather than failed, and so on.

use std::path::PathBuf;

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage I/O error at {path}: {source}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("capability not supported: {0}")]
    Capability(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn task_not_found(id: Uuid) -> Self {
        Error::not_found("task", id.to_string())
    }

    pub fn list_not_found(id: Uuid) -> Self {
        Error::not_found("list", id.to_string())
    }

    /// Coarse classification used by the engine's retry policy and by the
    /// CLI's exit-code/result-marker mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Invariant(_) => ErrorKind::Invariant,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Storage(_) | Error::StorageIo { .. } => ErrorKind::Storage,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Capability(_) => ErrorKind::Capability,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Fatal(_) => ErrorKind::Fatal,
            Error::Serde(_) => ErrorKind::Storage,
        }
    }

    /// Transport is the only retryable kind; the engine relies on this to
    /// decide whether to bump `retry_count` and keep an op queued.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invariant,
    Conflict,
    Storage,
    Transport,
    Capability,
    Cancelled,
    Fatal,
}
