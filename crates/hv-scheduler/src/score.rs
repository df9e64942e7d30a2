//! Phase two of placement: rank filtered candidates (§4.3 step 2).

use hv_core::{Instance, InstanceSpec, Node, PlacementPrefs};

use crate::types::SchedulerConfig;

/// Score one candidate node on bin-packing and anti-affinity alone; the
/// topology bonus is applied by [`rank_candidates`], which has the peer's
/// resolved zone.
#[must_use]
fn base_score(node: &Node, spec: &InstanceSpec, prefs: &PlacementPrefs, siblings: &[&Instance], config: &SchedulerConfig) -> f64 {
    let projected = node.allocated.saturating_add(&spec.limits);
    let utilisation = if node.allocatable.cpu_millicores == 0 {
        0.0
    } else {
        projected.cpu_millicores as f64 / node.allocatable.cpu_millicores as f64
    };
    let mut score = utilisation * config.bin_packing_weight;

    if let Some(label) = &prefs.anti_affinity_label {
        let colocated = siblings
            .iter()
            .filter(|s| s.placement == Some(node.id) && s.labels.contains_key(label))
            .count();
        score -= colocated as f64 * config.anti_affinity_weight;
    }

    score
}

/// Rank `candidates`, returning the winner, when any exist. `peer_zone` is
/// the zone of `prefs.topology_peer`'s current placement, already resolved
/// by the caller (the scheduler holds the full node list; this module does
/// not look nodes up by id).
#[must_use]
pub fn rank_candidates<'a>(
    candidates: &[&'a Node],
    spec: &InstanceSpec,
    prefs: &PlacementPrefs,
    siblings: &[&Instance],
    peer_zone: Option<&str>,
    config: &SchedulerConfig,
) -> Option<&'a Node> {
    candidates
        .iter()
        .map(|&node| {
            let mut score = base_score(node, spec, prefs, siblings, config);
            if prefs.topology_peer.is_some() && peer_zone == Some(node.zone.as_str()) {
                score += config.topology_weight;
            }
            (node, score)
        })
        .max_by(|(a_node, a_score), (b_node, b_score)| {
            a_score
                .partial_cmp(b_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_node.id.to_string().cmp(&b_node.id.to_string()))
        })
        .map(|(node, _)| node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hv_core::{InstanceKind, NodeRole, NodeStatus, Resources};
    use std::collections::BTreeMap;

    fn node(seed: u8, allocated_cpu: u64) -> Node {
        Node {
            id: hv_core::NodeId::from_uuid(uuid::Uuid::from_bytes([seed; 16])),
            hostname: "h".into(),
            address: "a:1".into(),
            role: NodeRole::Worker,
            region: "us-west".into(),
            zone: "us-west-1a".into(),
            labels: BTreeMap::new(),
            capacity: Resources { cpu_millicores: 8000, memory_bytes: 0, disk_bytes: 0, gpu_count: 0 },
            allocatable: Resources { cpu_millicores: 8000, memory_bytes: 0, disk_bytes: 0, gpu_count: 0 },
            allocated: Resources { cpu_millicores: allocated_cpu, memory_bytes: 0, disk_bytes: 0, gpu_count: 0 },
            supported_kinds: vec![InstanceKind::Container],
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn prefers_tighter_bin_packing() {
        let loose = node(1, 0);
        let tight = node(2, 6000);
        let spec = InstanceSpec {
            limits: Resources { cpu_millicores: 1000, memory_bytes: 0, disk_bytes: 0, gpu_count: 0 },
            ..Default::default()
        };
        let candidates = vec![&loose, &tight];
        let winner = rank_candidates(
            &candidates,
            &spec,
            &PlacementPrefs::default(),
            &[],
            None,
            &SchedulerConfig::default(),
        )
        .unwrap();
        assert_eq!(winner.id, tight.id);
    }

    #[test]
    fn ties_break_on_node_id_lexicographic_order() {
        let a = node(1, 0);
        let b = node(2, 0);
        let candidates = vec![&b, &a];
        let winner = rank_candidates(
            &candidates,
            &InstanceSpec::default(),
            &PlacementPrefs::default(),
            &[],
            None,
            &SchedulerConfig::default(),
        )
        .unwrap();
        let expected = if a.id.to_string() < b.id.to_string() { a.id } else { b.id };
        assert_eq!(winner.id, expected);
    }
}
