//! Request/response shapes used at the `Store` trait boundary that do not
//! belong on the domain types themselves (filters, watch events, the
//! register/heartbeat contract of §4.1).

use std::collections::BTreeMap;
use std::time::Duration;

use hv_core::{InstanceKind, InstanceState, LeaseId, Node, NodeCondition, NodeId, NodeRole, NodeStatus, Resources};

/// What an agent supplies when registering (§4.1 `Register(desc)`).
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Reuse this id if the agent previously held one (crash/restart recovery).
    pub rejoin_node_id: Option<NodeId>,
    /// Human hostname.
    pub hostname: String,
    /// Reachable agent RPC address.
    pub address: String,
    /// Cluster role.
    pub role: NodeRole,
    /// Region label.
    pub region: String,
    /// Zone label.
    pub zone: String,
    /// Free-form labels.
    pub labels: BTreeMap<String, String>,
    /// Total physical capacity.
    pub capacity: Resources,
    /// Allocatable capacity (after any operator reservation).
    pub allocatable: Resources,
    /// Instance kinds this agent's drivers support.
    pub supported_kinds: Vec<InstanceKind>,
}

/// What Register returns (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct RegisterOutcome {
    /// The assigned (or reused) node id.
    pub node_id: NodeId,
    /// The lease backing the node record and its hints.
    pub lease_id: LeaseId,
    /// Recommended heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// The lease TTL in effect.
    pub lease_ttl: Duration,
}

/// The mutable fields a heartbeat refreshes (§4.1).
#[derive(Debug, Clone)]
pub struct NodeHeartbeatUpdate {
    pub status: NodeStatus,
    pub conditions: Vec<NodeCondition>,
    pub allocated: Resources,
}

/// Filters accepted by `List`/`Watch` for nodes (§4.1, §6).
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub status: Option<NodeStatus>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl NodeFilter {
    /// Whether `node` satisfies every predicate in this filter.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(status) = self.status {
            if node.status != status {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if &node.region != region {
                return false;
            }
        }
        if let Some(zone) = &self.zone {
            if &node.zone != zone {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| node.labels.get(k) == Some(v))
    }
}

/// Filters accepted by `List` for instances (§6).
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub state: Option<InstanceState>,
    pub node_id: Option<NodeId>,
}

impl InstanceFilter {
    /// Whether `instance` satisfies every predicate in this filter.
    #[must_use]
    pub fn matches(&self, instance: &hv_core::Instance) -> bool {
        if let Some(state) = self.state {
            if instance.state != state {
                return false;
            }
        }
        if let Some(node_id) = self.node_id {
            if instance.placement != Some(node_id) {
                return false;
            }
        }
        true
    }
}

/// A single delivered watch notification (§4.1 watch semantics).
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    /// A new record appeared.
    Added(T),
    /// An existing record changed.
    Modified(T),
    /// A record was removed (lease expiry or explicit delete).
    Deleted(T),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node() -> Node {
        Node {
            id: NodeId::generate(),
            hostname: "h".into(),
            address: "a:1".into(),
            role: NodeRole::Worker,
            region: "us-west".into(),
            zone: "us-west-1a".into(),
            labels: BTreeMap::from([("gpu".to_string(), "true".to_string())]),
            capacity: Resources::default(),
            allocatable: Resources::default(),
            allocated: Resources::default(),
            supported_kinds: vec![InstanceKind::Vm],
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn filter_matches_region_and_label() {
        let n = node();
        let filter = NodeFilter {
            region: Some("us-west".into()),
            labels: BTreeMap::from([("gpu".to_string(), "true".to_string())]),
            ..Default::default()
        };
        assert!(filter.matches(&n));

        let mismatched = NodeFilter {
            region: Some("eu-west".into()),
            ..Default::default()
        };
        assert!(!mismatched.matches(&n));
    }
}
