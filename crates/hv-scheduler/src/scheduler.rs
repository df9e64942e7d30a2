//! The placement entry point: filter, score, then admit via CAS with
//! bounded retry (§4.3).

use std::sync::Arc;

use hv_core::{Instance, InstanceKind, InstanceSpec, NodeId, PlacementPrefs};
use hv_store::{InstanceFilter, NodeFilter, Store};
use rand::Rng;

use crate::error::{Result, SchedulerError};
use crate::filter::filter_nodes;
use crate::score::rank_candidates;
use crate::types::SchedulerConfig;

/// Picks a node for one instance, retrying the whole filter-then-score
/// cycle on CAS conflict up to `config.admission_retry_budget` times.
pub struct Scheduler<S: Store + ?Sized> {
    store: Arc<S>,
    config: SchedulerConfig,
}

impl<S: Store + ?Sized> Scheduler<S> {
    /// Build a scheduler over `store` using `config`.
    #[must_use]
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Run the filter-then-score algorithm once and return the winning
    /// node id, without performing the CAS admission write (§4.3 steps
    /// 1-2). Callers that need the full admission race should use
    /// [`Scheduler::place`].
    pub async fn pick_node(
        &self,
        kind: InstanceKind,
        spec: &InstanceSpec,
        prefs: &PlacementPrefs,
    ) -> Result<NodeId> {
        let nodes = self.store.list_nodes(NodeFilter::default()).await?;
        let nodes: Vec<_> = nodes.into_iter().map(|(n, _)| n).collect();

        let siblings = if prefs.anti_affinity_label.is_some() || prefs.topology_peer.is_some() {
            self.store
                .list_instances(InstanceFilter::default())
                .await?
                .into_iter()
                .map(|(i, _)| i)
                .collect::<Vec<Instance>>()
        } else {
            Vec::new()
        };
        let sibling_refs: Vec<&Instance> = siblings.iter().collect();

        let peer_zone = prefs
            .topology_peer
            .and_then(|peer_id| siblings.iter().find(|i| i.id == peer_id))
            .and_then(|peer| peer.placement)
            .and_then(|node_id| nodes.iter().find(|n| n.id == node_id))
            .map(|n| n.zone.clone());

        let candidates = filter_nodes(&nodes, kind, spec, prefs);
        if candidates.is_empty() {
            return Err(SchedulerError::NoSchedulableNode);
        }

        rank_candidates(
            &candidates,
            spec,
            prefs,
            &sibling_refs,
            peer_zone.as_deref(),
            &self.config,
        )
        .map(|n| n.id)
        .ok_or(SchedulerError::NoSchedulableNode)
    }

    /// Pick a node and perform the CAS admission write that books the
    /// instance's demand against `allocated`, retrying the whole cycle on
    /// conflict up to the configured budget.
    pub async fn place(
        &self,
        kind: InstanceKind,
        spec: &InstanceSpec,
        prefs: &PlacementPrefs,
    ) -> Result<NodeId> {
        let mut attempt = 0;
        loop {
            let node_id = self.pick_node(kind, spec, prefs).await?;
            let (_, revision) = self.store.get_node(node_id).await?;

            match self
                .store
                .reserve_capacity(node_id, spec.limits, revision)
                .await
            {
                Ok(_) => return Ok(node_id),
                Err(hv_store::StoreError::CasConflict(_)) => {
                    attempt += 1;
                    if attempt > self.config.admission_retry_budget {
                        return Err(SchedulerError::RetriesExhausted(attempt - 1));
                    }
                    let jitter_ms = rand::thread_rng()
                        .gen_range(0..=self.config.admission_retry_base_delay.as_millis() as u64);
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::{NodeRole, Resources};
    use hv_store::{InMemoryStore, NodeDescriptor};

    async fn seed_node(store: &InMemoryStore) -> NodeId {
        let outcome = store
            .register_node(NodeDescriptor {
                rejoin_node_id: None,
                hostname: "h".into(),
                address: "a:1".into(),
                role: NodeRole::Worker,
                region: "us-west".into(),
                zone: "us-west-1a".into(),
                labels: Default::default(),
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
                supported_kinds: vec![InstanceKind::Container],
            })
            .await
            .unwrap();
        outcome.node_id
    }

    #[tokio::test]
    async fn places_on_the_only_ready_node() {
        let store = Arc::new(InMemoryStore::new());
        let node_id = seed_node(&store).await;
        let scheduler = Scheduler::new(store, SchedulerConfig::default());
        let picked = scheduler
            .place(InstanceKind::Container, &InstanceSpec::default(), &PlacementPrefs::default())
            .await
            .unwrap();
        assert_eq!(picked, node_id);
    }

    #[tokio::test]
    async fn errors_when_no_node_supports_the_kind() {
        let store = Arc::new(InMemoryStore::new());
        seed_node(&store).await;
        let scheduler = Scheduler::new(store, SchedulerConfig::default());
        let result = scheduler
            .place(InstanceKind::Vm, &InstanceSpec::default(), &PlacementPrefs::default())
            .await;
        assert!(matches!(result, Err(SchedulerError::NoSchedulableNode)));
    }
}
