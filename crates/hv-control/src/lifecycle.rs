//! Instance lifecycle state machine.
//!
//! # State Machine
//!
//! ```text
//!                    ┌──────────┐
//!                    │ pending  │
//!                    └────┬─────┘
//!                         │ agent Create ack
//!                         ▼
//!                    ┌──────────┐
//!          ┌────────▶│ creating │
//!          │         └────┬─────┘
//!          │              │ driver reports alive
//!          │ Start        ▼
//!          │         ┌──────────┐
//!          │         │ running  │
//!          │         └────┬─────┘
//!          │              │ Stop / agent reports stopped
//!          │              ▼
//!          │         ┌──────────┐
//!          └─────────┤ stopped  │
//!                    └────┬─────┘
//!                         │ Delete
//!     any non-terminal ──▶│
//!     state on failure    ▼
//!                    ┌──────────┐      ┌──────────┐
//!                    │  failed  │─────▶│ deleted  │
//!                    └──────────┘      └──────────┘
//! ```

use hv_core::{InstanceId, InstanceState};

use crate::error::{ControlError, Result};

/// Validate a requested transition, returning the target state on success.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if `to` is not reachable from
/// `from`.
pub fn validate_transition(
    instance_id: InstanceId,
    from: InstanceState,
    to: InstanceState,
) -> Result<InstanceState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            instance_id,
            from,
            to,
        })
    }
}

/// Whether `to` is a legal target state from `from` (§4.2 transition table).
#[must_use]
pub const fn is_valid_transition(from: InstanceState, to: InstanceState) -> bool {
    use InstanceState::{Creating, Deleted, Failed, Pending, Running, Stopped};

    matches!(
        (from, to),
        (Pending, Creating)
            | (Creating, Running)
            | (Running, Stopped)
            | (Stopped, Creating)
            | (Pending | Creating | Running | Stopped, Failed)
            | (Stopped | Failed, Deleted)
    )
}

/// The set of states reachable from `state` in one transition.
#[must_use]
pub fn valid_transitions_from(state: InstanceState) -> Vec<InstanceState> {
    use InstanceState::{Creating, Deleted, Failed, Pending, Running, Stopped};

    match state {
        Pending => vec![Creating, Failed],
        Creating => vec![Running, Failed],
        Running => vec![Stopped, Failed],
        Stopped => vec![Creating, Failed, Deleted],
        Failed => vec![Deleted],
        Deleted => vec![],
    }
}

/// Whether the instance is in a terminal state with no further lifecycle
/// transitions (`deleted` is terminal; `failed` can still be deleted, so it
/// is reported separately by callers that need to distinguish them).
#[must_use]
pub const fn is_terminal(state: InstanceState) -> bool {
    matches!(state, InstanceState::Deleted)
}

/// Whether the instance currently occupies capacity on its node and is
/// expected to be reachable through its driver.
#[must_use]
pub const fn is_live(state: InstanceState) -> bool {
    matches!(
        state,
        InstanceState::Creating | InstanceState::Running
    )
}

/// Idempotence check for mutating calls (§4.2: "issuing Start on a running
/// instance returns success without side effects"). Returns true when `to`
/// is already the current state and the call should be treated as a no-op
/// success rather than re-validated as a transition.
#[must_use]
pub const fn is_noop_target(current: InstanceState, requested: InstanceState) -> bool {
    matches!(
        (current, requested),
        (InstanceState::Running, InstanceState::Running)
            | (InstanceState::Stopped, InstanceState::Stopped)
            | (InstanceState::Deleted, InstanceState::Deleted)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use InstanceState::{Creating, Failed, Pending, Running, Stopped};

        assert!(is_valid_transition(Pending, Creating));
        assert!(is_valid_transition(Creating, Running));
        assert!(is_valid_transition(Running, Stopped));
        assert!(is_valid_transition(Stopped, Creating));
        assert!(is_valid_transition(Running, Failed));
        assert!(is_valid_transition(Stopped, InstanceState::Deleted));
        assert!(is_valid_transition(Failed, InstanceState::Deleted));
    }

    #[test]
    fn invalid_transitions() {
        use InstanceState::{Creating, Deleted, Pending, Running};

        assert!(!is_valid_transition(Pending, Running));
        assert!(!is_valid_transition(Running, Creating));
        assert!(!is_valid_transition(Deleted, Running));
        assert!(!is_valid_transition(Pending, Deleted));
    }

    #[test]
    fn validate_transition_ok() {
        let id = InstanceId::generate();
        let result = validate_transition(id, InstanceState::Running, InstanceState::Stopped);
        assert_eq!(result.unwrap(), InstanceState::Stopped);
    }

    #[test]
    fn validate_transition_err() {
        let id = InstanceId::generate();
        let result = validate_transition(id, InstanceState::Pending, InstanceState::Running);
        match result {
            Err(ControlError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, InstanceState::Pending);
                assert_eq!(to, InstanceState::Running);
            }
            _ => panic!("expected InvalidTransition error"),
        }
    }

    #[test]
    fn terminal_and_live_states() {
        assert!(is_terminal(InstanceState::Deleted));
        assert!(!is_terminal(InstanceState::Failed));
        assert!(is_live(InstanceState::Running));
        assert!(is_live(InstanceState::Creating));
        assert!(!is_live(InstanceState::Stopped));
    }

    #[test]
    fn start_on_running_is_a_noop() {
        assert!(is_noop_target(InstanceState::Running, InstanceState::Running));
        assert!(!is_noop_target(InstanceState::Stopped, InstanceState::Running));
    }

    #[test]
    fn valid_transitions_from_stopped() {
        let transitions = valid_transitions_from(InstanceState::Stopped);
        assert!(transitions.contains(&InstanceState::Creating));
        assert!(transitions.contains(&InstanceState::Deleted));
        assert!(transitions.contains(&InstanceState::Failed));
        assert!(!transitions.contains(&InstanceState::Running));
    }
}
