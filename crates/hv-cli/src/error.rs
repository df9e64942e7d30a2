//! Exit-code mapping for CLI failures (§6).

/// Exit codes the binary returns, per the documented CLI contract: 0
/// success, 2 usage error, 3 not found, 4 conflict, 5 unreachable, 1 other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Other = 1,
    Usage = 2,
    NotFound = 3,
    Conflict = 4,
    Unreachable = 5,
}

/// A CLI-level error carrying the exit code it should produce.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CliError {
    message: String,
    code: ExitCode,
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: ExitCode::Usage }
    }

    pub fn exit_code(&self) -> i32 {
        self.code as i32
    }
}

impl From<tonic::Status> for CliError {
    fn from(status: tonic::Status) -> Self {
        let code = match status.code() {
            tonic::Code::NotFound => ExitCode::NotFound,
            tonic::Code::AlreadyExists | tonic::Code::Aborted | tonic::Code::FailedPrecondition => {
                ExitCode::Conflict
            }
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => ExitCode::Unreachable,
            tonic::Code::InvalidArgument => ExitCode::Usage,
            _ => ExitCode::Other,
        };
        Self { message: status.message().to_string(), code }
    }
}

impl From<tonic::transport::Error> for CliError {
    fn from(err: tonic::transport::Error) -> Self {
        Self { message: err.to_string(), code: ExitCode::Unreachable }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self { message: err.to_string(), code: ExitCode::Other }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_status_maps_to_exit_code_three() {
        let err = CliError::from(tonic::Status::not_found("no such node"));
        assert_eq!(err.exit_code(), ExitCode::NotFound as i32);
    }

    #[test]
    fn already_exists_maps_to_conflict() {
        let err = CliError::from(tonic::Status::already_exists("name taken"));
        assert_eq!(err.exit_code(), ExitCode::Conflict as i32);
    }

    #[test]
    fn unavailable_maps_to_unreachable() {
        let err = CliError::from(tonic::Status::unavailable("no route"));
        assert_eq!(err.exit_code(), ExitCode::Unreachable as i32);
    }

    #[test]
    fn invalid_argument_maps_to_usage() {
        let err = CliError::from(tonic::Status::invalid_argument("bad id"));
        assert_eq!(err.exit_code(), ExitCode::Usage as i32);
    }

    #[test]
    fn internal_maps_to_other() {
        let err = CliError::from(tonic::Status::internal("boom"));
        assert_eq!(err.exit_code(), ExitCode::Other as i32);
    }
}
