//! An in-memory `Store` implementation used by unit and integration tests
//! that should not require a live etcd cluster.
//!
//! Grounded on the same shape as the etcd-backed implementation (CAS by
//! revision, lease-attached deletion, list-then-watch), but backed by a
//! `tokio::sync::RwLock<HashMap<..>>` in the style of a plain in-process
//! repository rather than a real replicated store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use hv_core::{Instance, InstanceId, LeaseId, Node, NodeId, NodeStatus, Resources, Revision};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{Result, StoreError};
use crate::model::{
    InstanceFilter, NodeDescriptor, NodeFilter, NodeHeartbeatUpdate, RegisterOutcome, WatchEvent,
};
use crate::store_trait::Store;

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct NodeEntry {
    node: Node,
    revision: u64,
    lease_id: LeaseId,
}

#[derive(Clone)]
struct InstanceEntry {
    instance: Instance,
    revision: u64,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, NodeEntry>,
    instances: HashMap<InstanceId, InstanceEntry>,
    node_history: Vec<(u64, WatchEvent<Node>)>,
}

/// An in-memory coordination store for tests.
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    revision_counter: Arc<AtomicI64>,
    lease_counter: Arc<AtomicI64>,
    node_events: broadcast::Sender<(u64, WatchEvent<Node>)>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (node_events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            revision_counter: Arc::new(AtomicI64::new(1)),
            lease_counter: Arc::new(AtomicI64::new(1)),
            node_events,
        }
    }

    fn next_revision(&self) -> u64 {
        u64::try_from(self.revision_counter.fetch_add(1, Ordering::SeqCst)).unwrap_or(u64::MAX)
    }

    fn next_lease_id(&self) -> LeaseId {
        LeaseId::from_raw(self.lease_counter.fetch_add(1, Ordering::SeqCst))
    }

    async fn record_node_event(&self, inner: &mut Inner, revision: u64, event: WatchEvent<Node>) {
        inner.node_history.push((revision, event.clone()));
        let _ = self.node_events.send((revision, event));
    }

    /// Test-only hook simulating lease expiry: deletes the node record and
    /// emits the `DELETED` watch event a real store would produce (§8
    /// scenario 1).
    pub async fn expire_lease(&self, node_id: NodeId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .nodes
            .remove(&node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        let revision = self.next_revision();
        self.record_node_event(&mut inner, revision, WatchEvent::Deleted(entry.node))
            .await;
        Ok(())
    }
}

fn node_filter_matches(filter: &NodeFilter, event: &WatchEvent<Node>) -> bool {
    let node = match event {
        WatchEvent::Added(n) | WatchEvent::Modified(n) | WatchEvent::Deleted(n) => n,
    };
    filter.matches(node)
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn register_node(&self, desc: NodeDescriptor) -> Result<RegisterOutcome> {
        let mut inner = self.inner.write().await;
        let node_id = desc.rejoin_node_id.unwrap_or_else(NodeId::generate);
        let lease_id = self.next_lease_id();
        let now = Utc::now();
        let node = Node {
            id: node_id,
            hostname: desc.hostname,
            address: desc.address,
            role: desc.role,
            region: desc.region,
            zone: desc.zone,
            labels: desc.labels,
            capacity: desc.capacity,
            allocatable: desc.allocatable,
            allocated: hv_core::Resources::default(),
            supported_kinds: desc.supported_kinds,
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: now,
            last_seen_at: now,
        };
        let revision = self.next_revision();
        inner.nodes.insert(
            node_id,
            NodeEntry {
                node: node.clone(),
                revision,
                lease_id,
            },
        );
        self.record_node_event(&mut inner, revision, WatchEvent::Added(node))
            .await;
        Ok(RegisterOutcome {
            node_id,
            lease_id,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            lease_ttl: DEFAULT_LEASE_TTL,
        })
    }

    async fn heartbeat_node(
        &self,
        node_id: NodeId,
        lease_id: LeaseId,
        update: NodeHeartbeatUpdate,
    ) -> Result<(Node, Revision)> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        if entry.lease_id != lease_id {
            return Err(StoreError::Unavailable(format!(
                "stale lease for node {node_id}"
            )));
        }
        entry.node.status = update.status;
        entry.node.conditions = update.conditions;
        entry.node.allocated = update.allocated;
        entry.node.last_seen_at = Utc::now();
        let revision = self.next_revision();
        entry.revision = revision;
        let node = entry.node.clone();
        self.record_node_event(&mut inner, revision, WatchEvent::Modified(node.clone()))
            .await;
        Ok((node, Revision::from_raw(revision)))
    }

    async fn keep_alive(&self, _lease_id: LeaseId) -> Result<()> {
        Ok(())
    }

    async fn deregister_node(&self, node_id: NodeId, lease_id: LeaseId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .nodes
            .get(&node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        if entry.lease_id != lease_id {
            return Err(StoreError::Unavailable(format!(
                "stale lease for node {node_id}"
            )));
        }
        let node = inner.nodes.remove(&node_id).unwrap().node;
        let revision = self.next_revision();
        self.record_node_event(&mut inner, revision, WatchEvent::Deleted(node))
            .await;
        Ok(())
    }

    async fn get_node(&self, node_id: NodeId) -> Result<(Node, Revision)> {
        let inner = self.inner.read().await;
        inner
            .nodes
            .get(&node_id)
            .map(|e| (e.node.clone(), Revision::from_raw(e.revision)))
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))
    }

    async fn list_nodes(&self, filter: NodeFilter) -> Result<Vec<(Node, Revision)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .values()
            .filter(|e| filter.matches(&e.node))
            .map(|e| (e.node.clone(), Revision::from_raw(e.revision)))
            .collect())
    }

    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        if entry.revision != expected_revision.as_raw() {
            return Err(StoreError::CasConflict(format!(
                "node {node_id} revision mismatch"
            )));
        }
        entry.node.status = status;
        let revision = self.next_revision();
        entry.revision = revision;
        let node = entry.node.clone();
        self.record_node_event(&mut inner, revision, WatchEvent::Modified(node.clone()))
            .await;
        Ok((node, Revision::from_raw(revision)))
    }

    async fn reserve_capacity(
        &self,
        node_id: NodeId,
        demand: Resources,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        if entry.revision != expected_revision.as_raw() {
            return Err(StoreError::CasConflict(format!(
                "node {node_id} revision mismatch"
            )));
        }
        entry.node.allocated = entry.node.allocated.saturating_add(&demand);
        let revision = self.next_revision();
        entry.revision = revision;
        let node = entry.node.clone();
        self.record_node_event(&mut inner, revision, WatchEvent::Modified(node.clone()))
            .await;
        Ok((node, Revision::from_raw(revision)))
    }

    async fn watch_nodes(
        &self,
        filter: NodeFilter,
        start_revision: Revision,
    ) -> Result<BoxStream<'static, Result<WatchEvent<Node>>>> {
        let rx = self.node_events.subscribe();
        let snapshot: Vec<(u64, WatchEvent<Node>)> = {
            let inner = self.inner.read().await;
            inner
                .node_history
                .iter()
                .filter(|(rev, _)| *rev >= start_revision.as_raw())
                .cloned()
                .collect()
        };
        let last_seen = snapshot
            .last()
            .map_or(start_revision.as_raw().saturating_sub(1), |(rev, _)| *rev);

        let filter_for_history = filter.clone();
        let historical = stream::iter(
            snapshot
                .into_iter()
                .filter(move |(_, ev)| node_filter_matches(&filter_for_history, ev))
                .map(|(_, ev)| Ok(ev)),
        );

        let live = BroadcastStream::new(rx).filter_map(move |item| {
            let filter = filter.clone();
            async move {
                match item {
                    Ok((rev, ev)) if rev > last_seen && node_filter_matches(&filter, &ev) => {
                        Some(Ok(ev))
                    }
                    Ok(_) => None,
                    Err(_) => Some(Err(StoreError::WatchDisconnected(
                        "watch consumer fell behind".into(),
                    ))),
                }
            }
        });

        Ok(Box::pin(historical.chain(live)))
    }

    async fn create_instance(&self, instance: Instance) -> Result<(Instance, Revision)> {
        let mut inner = self.inner.write().await;
        let exists = inner.instances.values().any(|e| {
            e.instance.owner == instance.owner
                && e.instance.name == instance.name
                && !e.instance.is_terminal()
        });
        if exists {
            return Err(StoreError::AlreadyExists(format!(
                "instance {}/{}",
                instance.owner, instance.name
            )));
        }
        let revision = self.next_revision();
        let id = instance.id;
        inner.instances.insert(
            id,
            InstanceEntry {
                instance: instance.clone(),
                revision,
            },
        );
        Ok((instance, Revision::from_raw(revision)))
    }

    async fn get_instance(&self, instance_id: InstanceId) -> Result<(Instance, Revision)> {
        let inner = self.inner.read().await;
        inner
            .instances
            .get(&instance_id)
            .map(|e| (e.instance.clone(), Revision::from_raw(e.revision)))
            .ok_or_else(|| StoreError::NotFound(format!("instance {instance_id}")))
    }

    async fn find_instance_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<(Instance, Revision)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .instances
            .values()
            .find(|e| e.instance.owner == owner && e.instance.name == name && !e.instance.is_terminal())
            .map(|e| (e.instance.clone(), Revision::from_raw(e.revision))))
    }

    async fn list_instances(&self, filter: InstanceFilter) -> Result<Vec<(Instance, Revision)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .instances
            .values()
            .filter(|e| filter.matches(&e.instance))
            .map(|e| (e.instance.clone(), Revision::from_raw(e.revision)))
            .collect())
    }

    async fn cas_update_instance(
        &self,
        instance: Instance,
        expected_revision: Revision,
    ) -> Result<(Instance, Revision)> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| StoreError::NotFound(format!("instance {}", instance.id)))?;
        if entry.revision != expected_revision.as_raw() {
            return Err(StoreError::CasConflict(format!(
                "instance {} revision mismatch",
                instance.id
            )));
        }
        let revision = self.next_revision();
        entry.instance = instance.clone();
        entry.revision = revision;
        Ok((instance, Revision::from_raw(revision)))
    }

    async fn purge_instance(&self, instance_id: InstanceId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .instances
            .remove(&instance_id)
            .ok_or_else(|| StoreError::NotFound(format!("instance {instance_id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::{InstanceKind, NodeRole};
    use std::collections::BTreeMap;

    fn descriptor() -> NodeDescriptor {
        NodeDescriptor {
            rejoin_node_id: None,
            hostname: "n1".into(),
            address: "10.0.0.1:7443".into(),
            role: NodeRole::Worker,
            region: "us-west".into(),
            zone: "us-west-1a".into(),
            labels: BTreeMap::new(),
            capacity: hv_core::Resources {
                cpu_millicores: 8000,
                memory_bytes: 16 * 1024 * 1024 * 1024,
                disk_bytes: 0,
                gpu_count: 0,
            },
            allocatable: hv_core::Resources {
                cpu_millicores: 8000,
                memory_bytes: 16 * 1024 * 1024 * 1024,
                disk_bytes: 0,
                gpu_count: 0,
            },
            supported_kinds: vec![InstanceKind::Vm],
        }
    }

    #[tokio::test]
    async fn register_then_list_returns_one_ready_node() {
        let store = InMemoryStore::new();
        let outcome = store.register_node(descriptor()).await.unwrap();
        let nodes = store.list_nodes(NodeFilter::default()).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].0.id, outcome.node_id);
        assert_eq!(nodes[0].0.status, NodeStatus::Ready);
    }

    #[tokio::test]
    async fn lease_expiry_removes_node_and_emits_deleted() {
        let store = InMemoryStore::new();
        let outcome = store.register_node(descriptor()).await.unwrap();
        let mut events = store
            .watch_nodes(NodeFilter::default(), Revision::ZERO)
            .await
            .unwrap();
        // Drain the initial ADDED event from history.
        let _ = events.next().await;

        store.expire_lease(outcome.node_id).await.unwrap();
        let nodes = store.list_nodes(NodeFilter::default()).await.unwrap();
        assert!(nodes.is_empty());

        match events.next().await {
            Some(Ok(WatchEvent::Deleted(node))) => assert_eq!(node.id, outcome.node_id),
            other => panic!("expected a DELETED event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cas_conflict_on_stale_revision() {
        let store = InMemoryStore::new();
        let outcome = store.register_node(descriptor()).await.unwrap();
        let (node, revision) = store.get_node(outcome.node_id).await.unwrap();
        // Advance the revision behind our back.
        store
            .update_node_status(outcome.node_id, NodeStatus::Draining, revision)
            .await
            .unwrap();

        let result = store
            .update_node_status(outcome.node_id, NodeStatus::Maintenance, revision)
            .await;
        assert!(matches!(result, Err(StoreError::CasConflict(_))));
        let _ = node;
    }

    #[tokio::test]
    async fn create_instance_rejects_duplicate_live_name() {
        let store = InMemoryStore::new();
        let instance = sample_instance("a");
        store.create_instance(instance.clone()).await.unwrap();
        let result = store.create_instance(sample_instance("a")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    fn sample_instance(name: &str) -> Instance {
        Instance {
            id: InstanceId::generate(),
            name: name.into(),
            owner: "tester".into(),
            kind: InstanceKind::Vm,
            spec: hv_core::InstanceSpec::default(),
            placement: None,
            state: hv_core::InstanceState::Pending,
            state_reason: String::new(),
            observed_ip: None,
            created_at: Utc::now(),
            started_at: None,
            deleted_at: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}
