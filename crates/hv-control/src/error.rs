//! Error types for the control plane.

use hv_core::{InstanceId, InstanceState, NodeId};
use thiserror::Error;

/// A result type using [`ControlError`].
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested instance was not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// The requested node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// No ready node could satisfy the placement request.
    #[error("no schedulable node for the requested spec")]
    NoSchedulableNode,

    /// The requested state transition is not valid.
    #[error("invalid state transition for instance {instance_id}: cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        /// The instance being transitioned.
        instance_id: InstanceId,
        /// The current state.
        from: InstanceState,
        /// The requested target state.
        to: InstanceState,
    },

    /// An instance with the same `(owner, name)` already exists.
    #[error("instance {owner}/{name} already exists")]
    AlreadyExists {
        /// The owner namespace the name collided in.
        owner: String,
        /// The colliding name.
        name: String,
    },

    /// A graceful stop did not complete within its timeout and `force` was
    /// not set (§4.2 stop semantics).
    #[error("stop timed out for instance {0}")]
    StopTimedOut(InstanceId),

    /// The node's agent could not be reached.
    #[error("node {0} unreachable: {1}")]
    NodeUnreachable(NodeId, String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] hv_store::StoreError),

    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] hv_scheduler::SchedulerError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Whether this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::NodeUnreachable(..) | Self::Internal(_))
    }
}

impl From<ControlError> for hv_core::Error {
    fn from(e: ControlError) -> Self {
        use hv_core::ErrorKind;
        let kind = match &e {
            ControlError::InstanceNotFound(_) | ControlError::NodeNotFound(_) => ErrorKind::NotFound,
            ControlError::NoSchedulableNode => ErrorKind::ResourceExhausted,
            ControlError::InvalidTransition { .. } => ErrorKind::PreconditionFailed,
            ControlError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ControlError::StopTimedOut(_) => ErrorKind::DeadlineExceeded,
            ControlError::NodeUnreachable(..) => ErrorKind::Unavailable,
            ControlError::Store(hv_store::StoreError::CasConflict(_)) => ErrorKind::FailedPrecondition,
            ControlError::Store(hv_store::StoreError::NotFound(_)) => ErrorKind::NotFound,
            ControlError::Store(_) | ControlError::Scheduler(_) | ControlError::Internal(_) => {
                ErrorKind::Internal
            }
        };
        hv_core::Error::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_retriable() {
        let err = ControlError::InstanceNotFound(InstanceId::generate());
        assert!(!err.is_retriable());
    }

    #[test]
    fn node_unreachable_is_retriable() {
        let err = ControlError::NodeUnreachable(NodeId::generate(), "dial failed".into());
        assert!(err.is_retriable());
    }
}
