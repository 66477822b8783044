//! Error types.

use thiserror::Error;

/// Failure reported by a storage engine behind an adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// redb error.
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    /// sled error.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Key or value the engine cannot store as-is.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Operation on a handle that was already closed.
    #[error("backend is closed")]
    Closed,

    /// Fault injected by the in-memory backend.
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Phase of a run in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Begin,
    Write,
    Commit,
    Setup,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Open => write!(f, "open"),
            Phase::Begin => write!(f, "begin"),
            Phase::Write => write!(f, "write"),
            Phase::Commit => write!(f, "commit"),
            Phase::Setup => write!(f, "setup"),
        }
    }
}

/// Fatal harness errors. None of them is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be opened; the run never started.
    #[error("failed to open {backend} backend: {source}")]
    Connection {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Beginning a transaction failed.
    #[error("iteration {iteration}: failed to begin transaction: {source}")]
    Transaction {
        iteration: usize,
        #[source]
        source: BackendError,
    },

    /// Staging a write failed; the transaction was aborted.
    #[error("iteration {iteration}: write of {} failed: {source}", describe_item(.item))]
    Write {
        iteration: usize,
        /// Item index, or `None` when the whole batch was staged in one call.
        item: Option<usize>,
        #[source]
        source: BackendError,
    },

    /// Commit failed.
    #[error("iteration {iteration}: commit failed: {source}")]
    Commit {
        iteration: usize,
        #[source]
        source: BackendError,
    },

    /// Invalid harness configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn describe_item(item: &Option<usize>) -> String {
    match item {
        Some(index) => format!("item {}", index),
        None => "batch".to_string(),
    }
}

impl Error {
    /// The phase the error was raised in.
    pub fn phase(&self) -> Phase {
        match self {
            Error::Connection { .. } => Phase::Open,
            Error::Transaction { .. } => Phase::Begin,
            Error::Write { .. } => Phase::Write,
            Error::Commit { .. } => Phase::Commit,
            Error::Config(_) => Phase::Setup,
        }
    }

    /// The iteration the error was raised in, if the run had started.
    pub fn iteration(&self) -> Option<usize> {
        match self {
            Error::Transaction { iteration, .. }
            | Error::Write { iteration, .. }
            | Error::Commit { iteration, .. } => Some(*iteration),
            Error::Connection { .. } | Error::Config(_) => None,
        }
    }
}
