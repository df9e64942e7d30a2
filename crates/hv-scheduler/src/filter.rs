//! Phase one of placement: narrow the full node list down to candidates
//! that can legally host the request (§4.3 step 1).

use hv_core::{InstanceSpec, Node, PlacementPrefs};

/// Whether `node` passes every hard constraint in `spec`/`prefs`.
#[must_use]
pub fn passes_filter(node: &Node, kind: hv_core::InstanceKind, spec: &InstanceSpec, prefs: &PlacementPrefs) -> bool {
    if node.status != hv_core::NodeStatus::Ready {
        return false;
    }
    if !node.supported_kinds.contains(&kind) {
        return false;
    }
    if !node.can_admit(&spec.limits) {
        return false;
    }
    if let Some(region) = &prefs.region {
        if &node.region != region {
            return false;
        }
    }
    if let Some(zone) = &prefs.zone {
        if &node.zone != zone {
            return false;
        }
    }
    prefs
        .label_selector
        .iter()
        .all(|(k, v)| node.labels.get(k) == Some(v))
}

/// Apply the filter to every candidate, honoring the preferred-node-id
/// shortcut when that node itself passes.
#[must_use]
pub fn filter_nodes<'a>(
    nodes: &'a [Node],
    kind: hv_core::InstanceKind,
    spec: &InstanceSpec,
    prefs: &PlacementPrefs,
) -> Vec<&'a Node> {
    if let Some(preferred) = prefs.preferred_node_id {
        if let Some(node) = nodes
            .iter()
            .find(|n| n.id == preferred && passes_filter(n, kind, spec, prefs))
        {
            return vec![node];
        }
    }
    nodes
        .iter()
        .filter(|n| passes_filter(n, kind, spec, prefs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hv_core::{InstanceKind, NodeRole, NodeStatus, Resources};
    use std::collections::BTreeMap;

    fn node(id_seed: u8, region: &str) -> Node {
        Node {
            id: hv_core::NodeId::from_uuid(uuid::Uuid::from_bytes([id_seed; 16])),
            hostname: "h".into(),
            address: "a:1".into(),
            role: NodeRole::Worker,
            region: region.into(),
            zone: "z".into(),
            labels: BTreeMap::new(),
            capacity: Resources {
                cpu_millicores: 8000,
                memory_bytes: 16 * 1024 * 1024 * 1024,
                disk_bytes: 0,
                gpu_count: 0,
            },
            allocatable: Resources {
                cpu_millicores: 8000,
                memory_bytes: 16 * 1024 * 1024 * 1024,
                disk_bytes: 0,
                gpu_count: 0,
            },
            allocated: Resources::default(),
            supported_kinds: vec![InstanceKind::Container],
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn filters_out_region_mismatch() {
        let nodes = vec![node(1, "us-west"), node(2, "eu-west")];
        let spec = InstanceSpec::default();
        let prefs = PlacementPrefs {
            region: Some("us-west".into()),
            ..Default::default()
        };
        let candidates = filter_nodes(&nodes, InstanceKind::Container, &spec, &prefs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].region, "us-west");
    }

    #[test]
    fn rejects_unsupported_kind() {
        let nodes = vec![node(1, "us-west")];
        let spec = InstanceSpec::default();
        let prefs = PlacementPrefs::default();
        assert!(filter_nodes(&nodes, InstanceKind::Vm, &spec, &prefs).is_empty());
    }
}
