//! Driver-local error type, mapped into [`hv_core::Error`] at the agent
//! boundary the same way `hv_store::StoreError` is mapped at the
//! controller boundary.

use hv_core::{Error as CoreError, ErrorKind};
use thiserror::Error;

/// A result type using [`DriverError`].
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors a driver implementation can report.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No instance with the given id is known to this driver.
    #[error("instance not found: {0}")]
    NotFound(String),

    /// A console is already attached and must be detached first.
    #[error("console already attached: {0}")]
    AlreadyAttached(String),

    /// The back-end rejected the call or is unreachable.
    #[error("driver back-end unavailable: {0}")]
    Unavailable(String),

    /// The back-end took longer than the caller's deadline allowed.
    #[error("driver operation timed out: {0}")]
    Timeout(String),

    /// Any other back-end failure.
    #[error("driver error: {0}")]
    Internal(String),
}

impl From<bollard::errors::Error> for DriverError {
    fn from(e: bollard::errors::Error) -> Self {
        match &e {
            bollard::errors::Error::DockerResponseServerError { status_code, .. }
                if *status_code == 404 =>
            {
                Self::NotFound(e.to_string())
            }
            _ => Self::Unavailable(e.to_string()),
        }
    }
}

impl From<DriverError> for CoreError {
    fn from(e: DriverError) -> Self {
        let kind = match &e {
            DriverError::NotFound(_) => ErrorKind::NotFound,
            DriverError::AlreadyAttached(_) => ErrorKind::FailedPrecondition,
            DriverError::Unavailable(_) => ErrorKind::Unavailable,
            DriverError::Timeout(_) => ErrorKind::DeadlineExceeded,
            DriverError::Internal(_) => ErrorKind::Internal,
        };
        CoreError::new(kind, e.to_string())
    }
}
