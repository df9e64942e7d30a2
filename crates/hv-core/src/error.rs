//! The shared error kind taxonomy used throughout the control plane and agent.
//!
//! Every crate's local error type ultimately carries one of these kinds so
//! that gRPC status mapping, retry policy, and CLI exit codes can all be
//! derived from a single classification instead of per-crate ad hoc logic.

use thiserror::Error;

/// A result type using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Semantic error classification, independent of transport.
///
/// Wrapping an error (e.g. a store error surfacing through a scheduler call)
/// must preserve the original kind rather than collapsing it to `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested resource does not exist.
    NotFound,
    /// A resource with the same identity already exists.
    AlreadyExists,
    /// The caller supplied a malformed or semantically invalid argument.
    InvalidArgument,
    /// The requested operation would violate the instance state machine.
    PreconditionFailed,
    /// No node (or no capacity) could satisfy a scheduling request.
    ResourceExhausted,
    /// The coordination store or an agent could not be reached.
    Unavailable,
    /// The caller's deadline elapsed before the operation completed.
    DeadlineExceeded,
    /// A compare-and-swap write lost the race after exhausting its retry budget.
    FailedPrecondition,
    /// An unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Whether an operation that failed with this kind may be safely retried
    /// when the underlying call was idempotent.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Unavailable | Self::DeadlineExceeded)
    }
}

/// A classified error carrying a machine-readable [`ErrorKind`] and a
/// human-readable message.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Construct an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error, preserving `self`'s kind.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The semantic kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether this error should be retried by an idempotent caller.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    /// Build a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Build an `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Build an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Build a `PreconditionFailed` error (state machine violation).
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, message)
    }

    /// Build a `ResourceExhausted` error.
    #[must_use]
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    /// Build an `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Build a `DeadlineExceeded` error.
    #[must_use]
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    /// Build a `FailedPrecondition` error (CAS conflict after retries).
    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    /// Build an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<crate::ids::IdError> for Error {
    fn from(e: crate::ids::IdError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(ErrorKind::Unavailable.is_retriable());
        assert!(ErrorKind::DeadlineExceeded.is_retriable());
        assert!(!ErrorKind::NotFound.is_retriable());
        assert!(!ErrorKind::Internal.is_retriable());
    }

    #[test]
    fn kind_is_preserved_through_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::unavailable("dial failed").with_source(inner);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_retriable());
    }
}
