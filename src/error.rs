//! Error and Result types.

/// Errors produced by the checkpoint orchestrator or propagated from a
/// collaborator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Caller misuse: a running transaction, a malformed target/drop
    /// directive, a reserved name, or a missing metadata handle.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A doomed snapshot is pinned by a cursor or backup and the
    /// reserved-prefix squelch rule didn't apply.
    #[error("busy: {0}")]
    Busy(String),

    #[cfg(feature = "full")]
    #[error(transparent)]
    RocksDb(#[from] rocksdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other collaborator error, propagated verbatim.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Error {
        Error::InvalidArgument(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Error {
        Error::Busy(msg.into())
    }

    /// Whether this error is one a caller can safely retry (misuse and
    /// contention leave the database untouched; I/O errors may not).
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::Busy(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
