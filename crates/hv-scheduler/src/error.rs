//! Error types for the scheduler crate.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// No ready node satisfies the placement request.
    #[error("no schedulable node for the requested spec")]
    NoSchedulableNode,

    /// Every admission retry lost the CAS race.
    #[error("admission retries exhausted after {0} attempts")]
    RetriesExhausted(u32),

    /// The coordination store could not be reached or returned an error.
    #[error("store error: {0}")]
    Store(#[from] hv_store::StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Whether retrying the whole schedule-then-admit cycle might succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(e) if matches!(e, hv_store::StoreError::CasConflict(_) | hv_store::StoreError::Unavailable(_)))
    }
}

/// A specialized Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
