//! The coordination-store contract shared by the etcd-backed implementation
//! and the in-memory fake used in unit tests.

use futures::stream::BoxStream;
use hv_core::{Instance, InstanceId, LeaseId, Node, NodeId, NodeStatus, Resources, Revision};

use crate::error::Result;
use crate::model::{InstanceFilter, NodeDescriptor, NodeFilter, NodeHeartbeatUpdate, RegisterOutcome, WatchEvent};

/// Coordination-store operations needed by the controller (§4.1, §4.2, §4.3,
/// §6). The agent never implements or calls this trait directly (§2):
/// all store access is centralized behind the controller's gRPC surface.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Issue a lease, write the node record under it, and return the
    /// assigned id plus recommended cadence (§4.1 `Register`).
    async fn register_node(&self, desc: NodeDescriptor) -> Result<RegisterOutcome>;

    /// Refresh `last_seen`, status, conditions, and `allocated` for a node
    /// whose lease the caller still holds (§4.1 `Heartbeat`).
    async fn heartbeat_node(
        &self,
        node_id: NodeId,
        lease_id: LeaseId,
        update: NodeHeartbeatUpdate,
    ) -> Result<(Node, Revision)>;

    /// Send one keep-alive for `lease_id`, extending its TTL.
    async fn keep_alive(&self, lease_id: LeaseId) -> Result<()>;

    /// Revoke the lease, atomically deleting every key attached to it.
    async fn deregister_node(&self, node_id: NodeId, lease_id: LeaseId) -> Result<()>;

    /// Read a single node record and the revision it was read at.
    async fn get_node(&self, node_id: NodeId) -> Result<(Node, Revision)>;

    /// List nodes matching `filter`.
    async fn list_nodes(&self, filter: NodeFilter) -> Result<Vec<(Node, Revision)>>;

    /// Flip `status` via CAS on `expected_revision`, leaving agent-owned
    /// fields untouched (§4.1: control-plane-only fields must not race a
    /// concurrent heartbeat).
    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)>;

    /// Add `demand` to `allocated` via CAS against `expected_revision`
    /// (§4.3 admission race: the scheduler's chosen write path). Fails with
    /// `CasConflict` if another writer moved the revision first, which the
    /// scheduler treats as a signal to re-run filter-then-score.
    async fn reserve_capacity(
        &self,
        node_id: NodeId,
        demand: Resources,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)>;

    /// Stream node change events starting at `start_revision`, preceded by
    /// an initial list so no history is missed (§4.1 watch semantics).
    async fn watch_nodes(
        &self,
        filter: NodeFilter,
        start_revision: Revision,
    ) -> Result<BoxStream<'static, Result<WatchEvent<Node>>>>;

    /// Create a new instance record. Fails with `AlreadyExists` if a live
    /// instance with the same `(owner, name)` already exists.
    async fn create_instance(&self, instance: Instance) -> Result<(Instance, Revision)>;

    /// Read a single instance record and the revision it was read at.
    async fn get_instance(&self, instance_id: InstanceId) -> Result<(Instance, Revision)>;

    /// Look up a live instance by `(owner, name)`, used to make
    /// `CreateInstance` idempotent against retries (§8).
    async fn find_instance_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<(Instance, Revision)>>;

    /// List instances matching `filter`.
    async fn list_instances(&self, filter: InstanceFilter) -> Result<Vec<(Instance, Revision)>>;

    /// Write `instance` via CAS against `expected_revision` (§4.2
    /// authoritative write path).
    async fn cas_update_instance(
        &self,
        instance: Instance,
        expected_revision: Revision,
    ) -> Result<(Instance, Revision)>;

    /// Remove an instance record entirely (after the tombstone retention
    /// window has elapsed).
    async fn purge_instance(&self, instance_id: InstanceId) -> Result<()>;
}
