//! Strongly-typed identifiers used across the control plane and agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, controller- or agent-assigned node identifier.
///
/// Node IDs are immutable once a node record is created (§3 invariant);
/// an agent re-registering after a lease expiry should reuse its previous
/// ID so in-flight instance placements remain bound to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(uuid::Uuid);

/// A controller-assigned instance identifier.
///
/// The controller is the only party that mints instance IDs; agents and
/// clients only ever observe IDs the controller has already issued.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(uuid::Uuid);

/// A coordination-store lease identifier (opaque to everything but the store).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(i64);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id!(NodeId);
uuid_id!(InstanceId);

impl LeaseId {
    /// Wrap a raw lease id returned by the coordination store.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Return the raw lease id as understood by the coordination store client.
    #[must_use]
    pub const fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeaseId({})", self.0)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonically increasing coordination-store revision, used for
/// compare-and-swap writes and as a watch resume cursor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// The revision before any write has ever occurred.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw revision number as reported by the coordination store.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw revision number.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrip() {
        let id = NodeId::generate();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_invalid() {
        assert!(matches!(
            NodeId::from_str("not-a-uuid"),
            Err(IdError::InvalidUuid)
        ));
    }

    #[test]
    fn instance_id_serde_json() {
        let id = InstanceId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_distinct() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }

    #[test]
    fn revision_ordering() {
        assert!(Revision::from_raw(1) < Revision::from_raw(2));
        assert_eq!(Revision::ZERO.as_raw(), 0);
    }

    #[test]
    fn lease_id_roundtrip() {
        let lease = LeaseId::from_raw(42);
        assert_eq!(lease.as_raw(), 42);
        assert_eq!(lease.to_string(), "42");
    }
}
