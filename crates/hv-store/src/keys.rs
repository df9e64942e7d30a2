//! Coordination-store key layout (§6): `/hv/nodes/<id>`, `/hv/instances/<id>`.

use std::str::FromStr;

use hv_core::{InstanceId, NodeId};

/// Key prefix under which every node record lives.
pub const NODE_PREFIX: &str = "/hv/nodes/";
/// Key prefix under which every instance record lives.
pub const INSTANCE_PREFIX: &str = "/hv/instances/";

/// The key for a single node record.
#[must_use]
pub fn node_key(id: &NodeId) -> String {
    format!("{NODE_PREFIX}{id}")
}

/// The key for a single instance record.
#[must_use]
pub fn instance_key(id: &InstanceId) -> String {
    format!("{INSTANCE_PREFIX}{id}")
}

/// Recover a [`NodeId`] from a key produced by [`node_key`].
#[must_use]
pub fn extract_node_id(key: &str) -> Option<NodeId> {
    key.strip_prefix(NODE_PREFIX).and_then(|s| NodeId::from_str(s).ok())
}

/// Recover an [`InstanceId`] from a key produced by [`instance_key`].
#[must_use]
pub fn extract_instance_id(key: &str) -> Option<InstanceId> {
    key.strip_prefix(INSTANCE_PREFIX)
        .and_then(|s| InstanceId::from_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_roundtrips() {
        let id = NodeId::generate();
        let key = node_key(&id);
        assert!(key.starts_with(NODE_PREFIX));
        assert_eq!(extract_node_id(&key), Some(id));
    }

    #[test]
    fn instance_key_roundtrips() {
        let id = InstanceId::generate();
        let key = instance_key(&id);
        assert_eq!(extract_instance_id(&key), Some(id));
    }

    #[test]
    fn wrong_prefix_does_not_parse() {
        assert_eq!(extract_node_id("/hv/instances/not-a-node"), None);
    }
}
