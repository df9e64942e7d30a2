//! Agent-local error type, mapped to `tonic::Status` at the RPC boundary
//! the same way `hv-proto::error_to_status` maps `hv_core::Error` on the
//! controller side.

use thiserror::Error;

/// A result type using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors the agent process can encounter.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No driver is registered for the requested instance kind.
    #[error("no driver registered for kind {0:?}")]
    UnsupportedKind(hv_core::InstanceKind),

    /// The underlying driver rejected or failed the call.
    #[error(transparent)]
    Driver(#[from] hv_driver::DriverError),

    /// The wire message failed to convert into a domain type.
    #[error("malformed request: {0}")]
    InvalidArgument(String),

    /// The controller's `ClusterService` could not be reached or rejected
    /// the call.
    #[error("controller unreachable: {0}")]
    ControllerUnavailable(String),

    /// Registration completed but the controller's response was
    /// inconsistent (missing fields, unparsable id).
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
}

impl From<AgentError> for tonic::Status {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::UnsupportedKind(_) | AgentError::InvalidArgument(_) => {
                Self::invalid_argument(err.to_string())
            }
            AgentError::Driver(driver_err) => {
                let core_err: hv_core::Error = driver_err.into();
                hv_proto::error_to_status(&core_err)
            }
            AgentError::ControllerUnavailable(_) | AgentError::RegistrationFailed(_) => {
                Self::unavailable(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found_status() {
        let status: tonic::Status =
            AgentError::Driver(hv_driver::DriverError::NotFound("x".into())).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[test]
    fn unsupported_kind_is_invalid_argument() {
        let status: tonic::Status =
            AgentError::UnsupportedKind(hv_core::InstanceKind::Vm).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
