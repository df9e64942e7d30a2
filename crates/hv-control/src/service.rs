//! Control plane service implementation: node registry and instance
//! lifecycle, backed by `hv-store`, `hv-scheduler`, and agent RPC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hv_core::{
    Instance, InstanceId, InstanceState, InstanceStats, LeaseId, Node, NodeId, NodeStatus,
    PlacementPrefs,
};
use hv_scheduler::Scheduler;
use hv_store::{
    InstanceFilter, NodeDescriptor, NodeFilter, NodeHeartbeatUpdate, RegisterOutcome, Store,
};
use parking_lot::Mutex;

use crate::agent_client::{AgentClient, NoopAgentClient};
use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::locks::InstanceLocks;
use crate::types::{ClusterInfo, ControlConfig, CreateInstanceRequest, StopOptions};

/// The complete control plane API surface: node registry (§4.1) plus
/// instance lifecycle (§4.2).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register a new (or rejoining) node, issuing its lease (§4.1).
    async fn register_node(&self, desc: NodeDescriptor) -> Result<RegisterOutcome>;

    /// Refresh a node's heartbeat fields under its lease (§4.1).
    async fn heartbeat_node(
        &self,
        node_id: NodeId,
        lease_id: LeaseId,
        update: NodeHeartbeatUpdate,
    ) -> Result<(bool, Duration)>;

    /// Revoke a node's lease, removing it and every key it owns (§4.1).
    async fn deregister_node(&self, node_id: NodeId, lease_id: LeaseId) -> Result<()>;

    /// Read a single node by id.
    async fn get_node(&self, node_id: NodeId) -> Result<Node>;

    /// List nodes matching `filter`.
    async fn list_nodes(&self, filter: NodeFilter) -> Result<Vec<Node>>;

    /// Stream node change events starting at the current revision, preceded
    /// by an initial list so no history is missed (§4.1 watch semantics).
    async fn watch_nodes(
        &self,
        filter: NodeFilter,
    ) -> Result<futures::stream::BoxStream<'static, Result<hv_store::WatchEvent<Node>>>>;

    /// Aggregate counters for `GetClusterInfo` (§6): node/instance totals
    /// and this build's version.
    async fn cluster_info(&self) -> Result<ClusterInfo>;

    /// Administratively flip a node's status (e.g. into `maintenance` or
    /// `draining`); preserves agent-owned fields via CAS (§4.1).
    async fn update_node_status(&self, node_id: NodeId, status: NodeStatus) -> Result<Node>;

    /// Create and schedule a new instance, idempotent on `(owner, name)`
    /// (§4.2, §8).
    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<Instance>;

    /// Read a single instance by id.
    async fn get_instance(&self, instance_id: InstanceId) -> Result<Instance>;

    /// List instances matching `filter`.
    async fn list_instances(&self, filter: InstanceFilter) -> Result<Vec<Instance>>;

    /// Start a stopped instance. A no-op success if already `running` (§4.2).
    async fn start_instance(&self, instance_id: InstanceId) -> Result<Instance>;

    /// Stop a running instance, honoring `opts.force`/`opts.timeout_seconds`
    /// (§4.2 stop semantics). A no-op success if already `stopped`.
    async fn stop_instance(&self, instance_id: InstanceId, opts: StopOptions) -> Result<Instance>;

    /// Restart an instance via its owning agent.
    async fn restart_instance(&self, instance_id: InstanceId, force: bool) -> Result<Instance>;

    /// Delete a `stopped`/`failed` instance, retaining a tombstone (§4.2).
    async fn delete_instance(&self, instance_id: InstanceId, force: bool) -> Result<()>;

    /// Read runtime counters for an instance from its owning agent.
    async fn get_instance_stats(&self, instance_id: InstanceId) -> Result<InstanceStats>;

    /// Instances on `node_id` currently flagged by reconciliation as
    /// diverging from their desired state, surfaced to the agent as
    /// `HeartbeatCommand`s (§4.2 reconciliation).
    async fn divergent_instances(&self, node_id: NodeId) -> Result<Vec<InstanceId>>;
}

/// The main control plane implementation, generic over the coordination
/// store so tests can swap in `hv_store::InMemoryStore`.
pub struct ControlPlaneService<S: Store, A: AgentClient = NoopAgentClient> {
    store: Arc<S>,
    scheduler: Scheduler<S>,
    agents: Arc<A>,
    config: ControlConfig,
    locks: InstanceLocks,
    /// When each instance's desired/observed divergence was first seen by
    /// reconciliation; cleared once it resolves or is corrected (§4.2).
    divergence: Mutex<HashMap<InstanceId, DateTime<Utc>>>,
}

impl<S: Store + 'static> ControlPlaneService<S, NoopAgentClient> {
    /// Build a service with no live agent RPC client (local development or
    /// tests that only exercise the store/scheduler paths).
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(
            store,
            Arc::new(NoopAgentClient),
            ControlConfig::default(),
            hv_scheduler::SchedulerConfig::default(),
        )
    }
}

impl<S: Store + 'static, A: AgentClient + 'static> ControlPlaneService<S, A> {
    /// Build a service over `store`, dispatching instance RPCs through
    /// `agents`.
    pub fn new(
        store: Arc<S>,
        agents: Arc<A>,
        config: ControlConfig,
        scheduler_config: hv_scheduler::SchedulerConfig,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone(), scheduler_config);
        Self {
            store,
            scheduler,
            agents,
            config,
            locks: InstanceLocks::new(),
            divergence: Mutex::new(HashMap::new()),
        }
    }

    /// The coordination store this service reads from and writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The tunables this service was built with.
    #[must_use]
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    async fn get_and_lock(
        &self,
        instance_id: InstanceId,
    ) -> Result<(Instance, hv_core::Revision, tokio::sync::OwnedMutexGuard<()>)> {
        let guard = self.locks.lock(instance_id).await;
        let (instance, revision) = self.store.get_instance(instance_id).await?;
        Ok((instance, revision, guard))
    }

    /// Read-validate-RPC-CAS, retrying the whole cycle on CAS conflict
    /// (§4.2 authoritative write path). `rpc` performs the call to the
    /// instance's owning agent and returns the instance's new observed
    /// state plus reason; it is re-run on every retry since the instance
    /// may have changed underneath a racing write.
    async fn apply_transition<F, Fut>(
        &self,
        instance_id: InstanceId,
        target: InstanceState,
        rpc: F,
    ) -> Result<Instance>
    where
        F: Fn(Instance) -> Fut,
        Fut: std::future::Future<Output = Result<(InstanceState, String)>>,
    {
        loop {
            let (instance, revision, _guard) = self.get_and_lock(instance_id).await?;

            if lifecycle::is_noop_target(instance.state, target) {
                return Ok(instance);
            }
            lifecycle::validate_transition(instance_id, instance.state, target)?;

            let (new_state, reason) = rpc(instance.clone()).await?;

            let mut updated = instance;
            updated.state = new_state;
            updated.state_reason = reason;
            if new_state == InstanceState::Running && updated.started_at.is_none() {
                updated.started_at = Some(Utc::now());
            }

            match self.store.cas_update_instance(updated, revision).await {
                Ok((instance, _)) => return Ok(instance),
                Err(hv_store::StoreError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn owning_node(instance: &Instance) -> Result<NodeId> {
        instance
            .placement
            .ok_or_else(|| ControlError::Internal(format!("instance {} has no placement", instance.id)))
    }

    async fn dial_agent_for(&self, node_id: NodeId) -> Result<()> {
        let (node, _) = self.store.get_node(node_id).await?;
        self.agents.note_address(node_id, &node.address);
        Ok(())
    }

    /// Record the moment `instance_id` entered `deleted`, so the tombstone
    /// sweep knows when its retention window starts (§4.2 tombstones).
    async fn stamp_deleted_at(&self, instance_id: InstanceId) -> Result<()> {
        loop {
            let (instance, revision) = self.store.get_instance(instance_id).await?;
            if instance.deleted_at.is_some() {
                return Ok(());
            }
            let mut updated = instance;
            updated.deleted_at = Some(Utc::now());
            match self.store.cas_update_instance(updated, revision).await {
                Ok(_) => return Ok(()),
                Err(hv_store::StoreError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove `deleted` instance records whose tombstone has outlived
    /// `tombstone_retention` (§4.2 tombstones). Returns the count purged.
    pub async fn purge_tombstones_once(&self) -> Result<usize> {
        let deleted = self
            .store
            .list_instances(InstanceFilter {
                state: Some(InstanceState::Deleted),
                node_id: None,
            })
            .await?;

        let mut purged = 0;
        for (instance, _) in deleted {
            let Some(deleted_at) = instance.deleted_at else { continue };
            let age = Utc::now().signed_duration_since(deleted_at);
            let retention = chrono::Duration::from_std(self.config.tombstone_retention)
                .unwrap_or(chrono::Duration::zero());
            if age < retention {
                continue;
            }
            match self.store.purge_instance(instance.id).await {
                Ok(()) => {
                    purged += 1;
                    tracing::debug!(instance_id = %instance.id, "purged tombstoned instance");
                }
                Err(hv_store::StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(purged)
    }

    /// One pass of reconciliation (§4.2): compare each non-terminal, placed
    /// instance's persisted state against its owning agent's observed state,
    /// and correct divergences that have persisted past
    /// `reconciliation_interval` by retrying the RPC that should have
    /// produced the desired state, or marking the instance `failed` if the
    /// agent has lost track of it entirely. Returns the count corrected.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let instances = self.store.list_instances(InstanceFilter::default()).await?;
        let mut seen = std::collections::HashSet::new();
        let mut corrected = 0;

        for (instance, _) in instances {
            if lifecycle::is_terminal(instance.state) {
                continue;
            }
            let Some(node_id) = instance.placement else { continue };
            seen.insert(instance.id);

            if self.dial_agent_for(node_id).await.is_err() {
                continue;
            }
            let observed = self.agents.get_instance(node_id, instance.id).await;
            let divergent = match &observed {
                Ok(agent_instance) => agent_instance.state != instance.state,
                Err(_) => true,
            };

            if !divergent {
                self.divergence.lock().remove(&instance.id);
                continue;
            }

            let since = *self
                .divergence
                .lock()
                .entry(instance.id)
                .or_insert_with(Utc::now);
            let elapsed = Utc::now().signed_duration_since(since);
            let threshold = chrono::Duration::from_std(self.config.reconciliation_interval)
                .unwrap_or(chrono::Duration::zero());
            if elapsed < threshold {
                continue;
            }

            self.divergence.lock().remove(&instance.id);
            if self.correct_divergence(&instance, node_id, observed).await? {
                corrected += 1;
            }
        }

        self.divergence.lock().retain(|id, _| seen.contains(id));
        Ok(corrected)
    }

    /// List instances on `node_id` currently flagged as divergent by
    /// reconciliation, for surfacing as heartbeat commands.
    async fn divergent_instances_for(&self, node_id: NodeId) -> Result<Vec<InstanceId>> {
        let divergence = self.divergence.lock().clone();
        if divergence.is_empty() {
            return Ok(Vec::new());
        }
        let instances = self.store.list_instances(InstanceFilter::default()).await?;
        Ok(instances
            .into_iter()
            .filter(|(i, _)| i.placement == Some(node_id) && divergence.contains_key(&i.id))
            .map(|(i, _)| i.id)
            .collect())
    }

    /// Issue the corrective RPC for a divergent instance: retry the action
    /// that should have driven the agent to the desired state, or mark the
    /// instance `failed` if the agent can no longer account for it.
    async fn correct_divergence(
        &self,
        instance: &Instance,
        node_id: NodeId,
        observed: Result<Instance>,
    ) -> Result<bool> {
        let (_, revision) = self.store.get_instance(instance.id).await?;
        let mut updated = instance.clone();

        match observed {
            Ok(agent_instance) if agent_instance.state == InstanceState::Failed => {
                updated.state = InstanceState::Failed;
                updated.state_reason = agent_instance.state_reason;
            }
            Ok(_) => {
                let retried = match instance.state {
                    InstanceState::Pending | InstanceState::Creating => {
                        self.agents
                            .create_instance(
                                node_id,
                                instance.id,
                                &instance.name,
                                &instance.owner,
                                instance.kind,
                                &instance.spec,
                                &PlacementPrefs::default(),
                            )
                            .await
                    }
                    InstanceState::Running => self.agents.start_instance(node_id, instance.id).await,
                    InstanceState::Stopped => {
                        self.agents
                            .stop_instance(node_id, instance.id, true, Duration::from_secs(30))
                            .await
                    }
                    InstanceState::Failed | InstanceState::Deleted => return Ok(false),
                };
                match retried {
                    Ok(agent_instance) => {
                        updated.state = agent_instance.state;
                        updated.state_reason = agent_instance.state_reason;
                    }
                    Err(e) => {
                        updated.state = InstanceState::Failed;
                        updated.state_reason = e.to_string();
                    }
                }
            }
            Err(_) => {
                // The agent no longer has any record of this instance: it's
                // orphaned (§4.2, §7), so there is nothing left to adopt.
                updated.state = InstanceState::Failed;
                updated.state_reason = "owning agent lost the instance".into();
            }
        }

        match self.store.cas_update_instance(updated, revision).await {
            Ok((instance, _)) => {
                tracing::warn!(
                    instance_id = %instance.id,
                    node_id = %node_id,
                    state = ?instance.state,
                    "reconciliation corrected a divergent instance"
                );
                Ok(true)
            }
            Err(hv_store::StoreError::CasConflict(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<S: Store + 'static, A: AgentClient + 'static> ControlPlane for ControlPlaneService<S, A> {
    async fn register_node(&self, desc: NodeDescriptor) -> Result<RegisterOutcome> {
        let outcome = self.store.register_node(desc).await?;
        tracing::info!(node_id = %outcome.node_id, "registered node");
        Ok(outcome)
    }

    async fn heartbeat_node(
        &self,
        node_id: NodeId,
        lease_id: LeaseId,
        update: NodeHeartbeatUpdate,
    ) -> Result<(bool, Duration)> {
        self.store.heartbeat_node(node_id, lease_id, update).await?;
        Ok((true, self.config.node_heartbeat_interval))
    }

    async fn deregister_node(&self, node_id: NodeId, lease_id: LeaseId) -> Result<()> {
        self.store.deregister_node(node_id, lease_id).await?;
        tracing::info!(node_id = %node_id, "deregistered node");
        Ok(())
    }

    async fn get_node(&self, node_id: NodeId) -> Result<Node> {
        let (node, _) = self.store.get_node(node_id).await?;
        Ok(node)
    }

    async fn list_nodes(&self, filter: NodeFilter) -> Result<Vec<Node>> {
        Ok(self
            .store
            .list_nodes(filter)
            .await?
            .into_iter()
            .map(|(n, _)| n)
            .collect())
    }

    async fn watch_nodes(
        &self,
        filter: NodeFilter,
    ) -> Result<futures::stream::BoxStream<'static, Result<hv_store::WatchEvent<Node>>>> {
        use futures::StreamExt;
        let stream = self
            .store
            .watch_nodes(filter, hv_core::Revision::ZERO)
            .await?;
        Ok(stream.map(|event| event.map_err(Into::into)).boxed())
    }

    async fn cluster_info(&self) -> Result<ClusterInfo> {
        let nodes = self.store.list_nodes(NodeFilter::default()).await?;
        let ready_node_count = u32::try_from(
            nodes
                .iter()
                .filter(|(node, _)| node.status == NodeStatus::Ready)
                .count(),
        )
        .unwrap_or(u32::MAX);
        let instances = self
            .store
            .list_instances(hv_store::InstanceFilter::default())
            .await?;
        Ok(ClusterInfo {
            node_count: u32::try_from(nodes.len()).unwrap_or(u32::MAX),
            ready_node_count,
            instance_count: u32::try_from(instances.len()).unwrap_or(u32::MAX),
            controller_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn update_node_status(&self, node_id: NodeId, status: NodeStatus) -> Result<Node> {
        loop {
            let (_, revision) = self.store.get_node(node_id).await?;
            match self.store.update_node_status(node_id, status, revision).await {
                Ok((node, _)) => return Ok(node),
                Err(hv_store::StoreError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<Instance> {
        if let Some((existing, _)) = self
            .store
            .find_instance_by_name(&request.owner, &request.name)
            .await?
        {
            if existing.spec == request.spec && existing.kind == request.kind {
                return Ok(existing);
            }
            return Err(ControlError::AlreadyExists {
                owner: request.owner,
                name: request.name,
            });
        }

        let node_id = self
            .scheduler
            .place(request.kind, &request.spec, &request.placement_prefs)
            .await
            .map_err(|e| match e {
                hv_scheduler::SchedulerError::NoSchedulableNode
                | hv_scheduler::SchedulerError::RetriesExhausted(_) => ControlError::NoSchedulableNode,
                other => other.into(),
            })?;

        let now = Utc::now();
        let instance = Instance {
            id: InstanceId::generate(),
            name: request.name,
            owner: request.owner,
            kind: request.kind,
            spec: request.spec,
            placement: Some(node_id),
            state: InstanceState::Pending,
            state_reason: String::new(),
            observed_ip: None,
            created_at: now,
            started_at: None,
            deleted_at: None,
            labels: Default::default(),
            annotations: Default::default(),
        };

        let (instance, _revision) = self.store.create_instance(instance).await?;

        self.dial_agent_for(node_id).await?;
        let created = self
            .agents
            .create_instance(
                node_id,
                instance.id,
                &instance.name,
                &instance.owner,
                instance.kind,
                &instance.spec,
                &request.placement_prefs,
            )
            .await;

        let (new_state, reason) = match created {
            Ok(agent_instance) => (agent_instance.state, agent_instance.state_reason),
            Err(e) => (InstanceState::Failed, e.to_string()),
        };

        loop {
            let (_, revision) = self.store.get_instance(instance.id).await?;
            let mut updated = instance.clone();
            updated.state = new_state;
            updated.state_reason = reason.clone();
            match self.store.cas_update_instance(updated, revision).await {
                Ok((instance, _)) => {
                    tracing::info!(instance_id = %instance.id, node_id = %node_id, "created instance");
                    return Ok(instance);
                }
                Err(hv_store::StoreError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get_instance(&self, instance_id: InstanceId) -> Result<Instance> {
        let (instance, _) = self.store.get_instance(instance_id).await?;
        Ok(instance)
    }

    async fn list_instances(&self, filter: InstanceFilter) -> Result<Vec<Instance>> {
        Ok(self
            .store
            .list_instances(filter)
            .await?
            .into_iter()
            .map(|(i, _)| i)
            .collect())
    }

    async fn start_instance(&self, instance_id: InstanceId) -> Result<Instance> {
        self.apply_transition(instance_id, InstanceState::Creating, |instance| async move {
            let node_id = Self::owning_node(&instance)?;
            self.dial_agent_for(node_id).await?;
            let updated = self.agents.start_instance(node_id, instance.id).await?;
            Ok((updated.state, updated.state_reason))
        })
        .await
    }

    async fn stop_instance(&self, instance_id: InstanceId, opts: StopOptions) -> Result<Instance> {
        self.apply_transition(instance_id, InstanceState::Stopped, |instance| async move {
            let node_id = Self::owning_node(&instance)?;
            self.dial_agent_for(node_id).await?;
            let updated = self
                .agents
                .stop_instance(node_id, instance.id, opts.force, opts.timeout())
                .await?;
            Ok((updated.state, updated.state_reason))
        })
        .await
    }

    async fn restart_instance(&self, instance_id: InstanceId, force: bool) -> Result<Instance> {
        self.apply_transition(instance_id, InstanceState::Running, |instance| async move {
            let node_id = Self::owning_node(&instance)?;
            self.dial_agent_for(node_id).await?;
            let updated = self
                .agents
                .restart_instance(node_id, instance.id, force)
                .await?;
            Ok((updated.state, updated.state_reason))
        })
        .await
    }

    async fn delete_instance(&self, instance_id: InstanceId, force: bool) -> Result<()> {
        let instance = self.apply_transition(instance_id, InstanceState::Deleted, |instance| async move {
            let node_id = Self::owning_node(&instance)?;
            self.dial_agent_for(node_id).await?;
            self.agents.delete_instance(node_id, instance.id, force).await?;
            Ok((InstanceState::Deleted, String::new()))
        })
        .await?;

        self.stamp_deleted_at(instance.id).await?;
        self.locks.sweep(instance_id);
        self.divergence.lock().remove(&instance_id);
        tracing::info!(instance_id = %instance.id, "deleted instance (tombstoned)");
        Ok(())
    }

    async fn get_instance_stats(&self, instance_id: InstanceId) -> Result<InstanceStats> {
        let (instance, _) = self.store.get_instance(instance_id).await?;
        let node_id = Self::owning_node(&instance)?;
        self.dial_agent_for(node_id).await?;
        self.agents.get_instance_stats(node_id, instance_id).await
    }

    async fn divergent_instances(&self, node_id: NodeId) -> Result<Vec<InstanceId>> {
        self.divergent_instances_for(node_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::{InstanceKind, InstanceSpec, NodeRole, PlacementPrefs, Resources};
    use hv_store::InMemoryStore;

    async fn seed_node(store: &InMemoryStore) -> NodeId {
        store
            .register_node(NodeDescriptor {
                rejoin_node_id: None,
                hostname: "h".into(),
                address: "127.0.0.1:9000".into(),
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
            .unwrap()
            .node_id
    }

    fn service(store: Arc<InMemoryStore>) -> ControlPlaneService<InMemoryStore, NoopAgentClient> {
        ControlPlaneService::with_defaults(store)
    }

    #[tokio::test]
    async fn create_instance_lands_in_pending_then_failed_without_an_agent() {
        let store = Arc::new(InMemoryStore::new());
        seed_node(&store).await;
        let svc = service(store);

        let instance = svc
            .create_instance(CreateInstanceRequest {
                name: "web".into(),
                owner: "team-a".into(),
                kind: InstanceKind::Container,
                spec: InstanceSpec::default(),
                placement_prefs: PlacementPrefs::default(),
            })
            .await
            .unwrap();

        // NoopAgentClient always errors, so the create settles into `failed`
        // rather than hanging in `pending`.
        assert_eq!(instance.state, InstanceState::Failed);
        assert!(instance.placement.is_some());
    }

    #[tokio::test]
    async fn create_instance_is_idempotent_on_owner_and_name() {
        let store = Arc::new(InMemoryStore::new());
        seed_node(&store).await;
        let svc = service(store);

        let request = CreateInstanceRequest {
            name: "web".into(),
            owner: "team-a".into(),
            kind: InstanceKind::Container,
            spec: InstanceSpec::default(),
            placement_prefs: PlacementPrefs::default(),
        };

        let first = svc.create_instance(request.clone()).await.unwrap();
        let second = svc.create_instance(request).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn start_on_a_missing_instance_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);
        let result = svc.start_instance(InstanceId::generate()).await;
        assert!(matches!(result, Err(ControlError::Store(_))));
    }

    #[tokio::test]
    async fn concurrent_creates_that_overcommit_admit_exactly_one() {
        let store = Arc::new(InMemoryStore::new());
        let node_id = store
            .register_node(NodeDescriptor {
                rejoin_node_id: None,
                hostname: "h".into(),
                address: "127.0.0.1:9000".into(),
                role: NodeRole::Worker,
                region: "us-west".into(),
                zone: "us-west-1a".into(),
                labels: Default::default(),
                capacity: Resources {
                    cpu_millicores: 6000,
                    memory_bytes: 16 * 1024 * 1024 * 1024,
                    disk_bytes: 0,
                    gpu_count: 0,
                },
                allocatable: Resources {
                    cpu_millicores: 6000,
                    memory_bytes: 16 * 1024 * 1024 * 1024,
                    disk_bytes: 0,
                    gpu_count: 0,
                },
                supported_kinds: vec![InstanceKind::Container],
            })
            .await
            .unwrap()
            .node_id;

        let svc = Arc::new(service(store.clone()));

        // Each demand fits the node alone (4000 <= 6000) but not together
        // (8000 > 6000): exactly one of the two concurrent admissions must
        // win the capacity race (§8 scenario 4).
        let demand = Resources {
            cpu_millicores: 4000,
            memory_bytes: 1024 * 1024 * 1024,
            disk_bytes: 0,
            gpu_count: 0,
        };
        let spec = InstanceSpec {
            limits: demand,
            ..Default::default()
        };

        let request = |owner: &str| CreateInstanceRequest {
            name: "web".into(),
            owner: owner.into(),
            kind: InstanceKind::Container,
            spec: spec.clone(),
            placement_prefs: PlacementPrefs::default(),
        };

        let svc_a = svc.clone();
        let req_a = request("team-a");
        let task_a = tokio::spawn(async move { svc_a.create_instance(req_a).await });

        let svc_b = svc.clone();
        let req_b = request("team-b");
        let task_b = tokio::spawn(async move { svc_b.create_instance(req_b).await });

        let (result_a, result_b) = tokio::join!(task_a, task_b);
        let results = [result_a.unwrap(), result_b.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(ControlError::NoSchedulableNode)))
            .count();
        assert_eq!(successes, 1, "exactly one create should be admitted");
        assert_eq!(exhausted, 1, "the loser should see resource exhaustion");

        let (node, _) = store.get_node(node_id).await.unwrap();
        assert_eq!(node.allocated.cpu_millicores, demand.cpu_millicores);
    }
}
