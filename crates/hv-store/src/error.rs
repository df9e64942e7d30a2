//! Coordination-store error type.

use hv_core::{Error as CoreError, ErrorKind};
use thiserror::Error;

/// A result type using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the coordination-store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists at the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record already exists where creation requires absence.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A compare-and-swap write lost the race.
    #[error("cas conflict: {0}")]
    CasConflict(String),

    /// The stored bytes did not decode as the expected record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying etcd client reported an error.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// A watch stream was disconnected and must be resumed by the caller.
    #[error("watch disconnected: {0}")]
    WatchDisconnected(String),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        let kind = match &e {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::CasConflict(_) => ErrorKind::FailedPrecondition,
            StoreError::Serialization(_) => ErrorKind::Internal,
            StoreError::Unavailable(_) | StoreError::WatchDisconnected(_) => ErrorKind::Unavailable,
        };
        CoreError::new(kind, e.to_string())
    }
}
