//! The production `Store` implementation, backed by etcd via `etcd-client`.
//!
//! Node records are lease-attached (§3, §4.1); instance records use
//! compare-and-swap on the etcd mod-revision (§4.2, §4.3).

use std::time::Duration;

use chrono::Utc;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType, GetOptions, PutOptions, Txn, TxnOp,
    TxnOpResponse, WatchOptions,
};
use futures::stream::{self, BoxStream, StreamExt};
use hv_core::{Instance, InstanceId, LeaseId, Node, NodeId, NodeStatus, Resources, Revision};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::model::{
    InstanceFilter, NodeDescriptor, NodeFilter, NodeHeartbeatUpdate, RegisterOutcome, WatchEvent,
};
use crate::store_trait::Store;

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// An etcd-backed coordination store.
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the given etcd endpoints.
    pub async fn connect(endpoints: &[String], options: Option<ConnectOptions>) -> Result<Self> {
        let client = Client::connect(endpoints, options).await?;
        Ok(Self { client })
    }

    async fn get_one(&self, key: &str) -> Result<Option<(Vec<u8>, i64)>> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| (kv.value().to_vec(), kv.mod_revision())))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(Vec<u8>, i64)>> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| (kv.value().to_vec(), kv.mod_revision()))
            .collect())
    }
}

#[async_trait::async_trait]
impl Store for EtcdStore {
    async fn register_node(&self, desc: NodeDescriptor) -> Result<RegisterOutcome> {
        let mut client = self.client.clone();
        let lease = client
            .lease_grant(DEFAULT_LEASE_TTL.as_secs() as i64, None)
            .await?;
        let lease_id = LeaseId::from_raw(lease.id());

        let node_id = desc.rejoin_node_id.unwrap_or_else(NodeId::generate);
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
        let bytes = codec::encode(&node)?;
        let key = keys::node_key(&node_id);
        client
            .put(key, bytes, Some(PutOptions::new().with_lease(lease.id())))
            .await?;

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
        let key = keys::node_key(&node_id);
        let (bytes, _) = self
            .get_one(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        let mut node: Node = codec::decode(&bytes)?;
        node.status = update.status;
        node.conditions = update.conditions;
        node.allocated = update.allocated;
        node.last_seen_at = Utc::now();

        let mut client = self.client.clone();
        let encoded = codec::encode(&node)?;
        let put_resp = client
            .put(
                key,
                encoded,
                Some(PutOptions::new().with_lease(lease_id.as_raw())),
            )
            .await?;
        let revision = put_resp
            .header()
            .map(|h| h.revision())
            .unwrap_or_default();
        Ok((node, Revision::from_raw(u64::try_from(revision).unwrap_or_default())))
    }

    async fn keep_alive(&self, lease_id: LeaseId) -> Result<()> {
        let mut client = self.client.clone();
        let (mut keeper, mut stream) = client.lease_keep_alive(lease_id.as_raw()).await?;
        keeper.keep_alive().await?;
        let _ = stream.message().await?;
        Ok(())
    }

    async fn deregister_node(&self, node_id: NodeId, lease_id: LeaseId) -> Result<()> {
        let _ = node_id;
        let mut client = self.client.clone();
        client.lease_revoke(lease_id.as_raw()).await?;
        Ok(())
    }

    async fn get_node(&self, node_id: NodeId) -> Result<(Node, Revision)> {
        let key = keys::node_key(&node_id);
        let (bytes, revision) = self
            .get_one(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        let node: Node = codec::decode(&bytes)?;
        Ok((node, Revision::from_raw(u64::try_from(revision).unwrap_or_default())))
    }

    async fn list_nodes(&self, filter: NodeFilter) -> Result<Vec<(Node, Revision)>> {
        let entries = self.list_prefix(keys::NODE_PREFIX).await?;
        let mut nodes = Vec::with_capacity(entries.len());
        for (bytes, revision) in entries {
            let node: Node = codec::decode(&bytes)?;
            if filter.matches(&node) {
                nodes.push((node, Revision::from_raw(u64::try_from(revision).unwrap_or_default())));
            }
        }
        Ok(nodes)
    }

    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)> {
        let key = keys::node_key(&node_id);
        let (bytes, _) = self
            .get_one(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        let mut node: Node = codec::decode(&bytes)?;
        node.status = status;
        let encoded = codec::encode(&node)?;

        let rev = i64::try_from(expected_revision.as_raw()).unwrap_or(i64::MAX);
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(key.clone(), CompareOp::Equal, rev)])
            .and_then(vec![TxnOp::put(key.clone(), encoded, None)])
            .or_else(vec![TxnOp::get(key, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        if !resp.succeeded() {
            return Err(StoreError::CasConflict(format!(
                "node {node_id} revision mismatch"
            )));
        }
        let new_revision = resp
            .header()
            .map(|h| h.revision())
            .unwrap_or_default();
        Ok((node, Revision::from_raw(u64::try_from(new_revision).unwrap_or_default())))
    }

    async fn reserve_capacity(
        &self,
        node_id: NodeId,
        demand: Resources,
        expected_revision: Revision,
    ) -> Result<(Node, Revision)> {
        let key = keys::node_key(&node_id);
        let (bytes, _) = self
            .get_one(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        let mut node: Node = codec::decode(&bytes)?;
        node.allocated = node.allocated.saturating_add(&demand);
        let encoded = codec::encode(&node)?;

        let rev = i64::try_from(expected_revision.as_raw()).unwrap_or(i64::MAX);
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(key.clone(), CompareOp::Equal, rev)])
            .and_then(vec![TxnOp::put(key.clone(), encoded, None)])
            .or_else(vec![TxnOp::get(key, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        if !resp.succeeded() {
            return Err(StoreError::CasConflict(format!(
                "node {node_id} revision mismatch"
            )));
        }
        let new_revision = resp.header().map(|h| h.revision()).unwrap_or_default();
        Ok((node, Revision::from_raw(u64::try_from(new_revision).unwrap_or_default())))
    }

    async fn watch_nodes(
        &self,
        filter: NodeFilter,
        start_revision: Revision,
    ) -> Result<BoxStream<'static, Result<WatchEvent<Node>>>> {
        let initial = self.list_nodes(filter.clone()).await?;
        let initial_stream = stream::iter(initial.into_iter().map(|(n, _)| Ok(WatchEvent::Added(n))));

        let mut client = self.client.clone();
        let rev = i64::try_from(start_revision.as_raw()).unwrap_or_default();
        let (_watcher, mut watch_stream) = client
            .watch(
                keys::NODE_PREFIX,
                Some(
                    WatchOptions::new()
                        .with_prefix()
                        .with_start_revision(rev),
                ),
            )
            .await?;

        let live = async_stream::stream! {
            while let Ok(Some(resp)) = watch_stream.message().await {
                for event in resp.events() {
                    let Some(kv) = event.kv() else { continue };
                    let decoded: Result<Node> = codec::decode(kv.value());
                    match decoded {
                        Ok(node) => {
                            if !filter.matches(&node) {
                                continue;
                            }
                            let mapped = match event.event_type() {
                                EventType::Put if kv.create_revision() == kv.mod_revision() => {
                                    WatchEvent::Added(node)
                                }
                                EventType::Put => WatchEvent::Modified(node),
                                EventType::Delete => WatchEvent::Deleted(node),
                            };
                            yield Ok(mapped);
                        }
                        Err(e) => yield Err(e),
                    }
                }
            }
        };

        Ok(Box::pin(initial_stream.chain(live)))
    }

    async fn create_instance(&self, instance: Instance) -> Result<(Instance, Revision)> {
        if let Some(existing) = self
            .find_instance_by_name(&instance.owner, &instance.name)
            .await?
        {
            let _ = existing;
            return Err(StoreError::AlreadyExists(format!(
                "instance {}/{}",
                instance.owner, instance.name
            )));
        }
        let key = keys::instance_key(&instance.id);
        let encoded = codec::encode(&instance)?;
        let txn = Txn::new()
            .when(vec![Compare::create_revision(key.clone(), CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, encoded, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        if !resp.succeeded() {
            return Err(StoreError::AlreadyExists(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
        Ok((instance, Revision::from_raw(u64::try_from(revision).unwrap_or_default())))
    }

    async fn get_instance(&self, instance_id: InstanceId) -> Result<(Instance, Revision)> {
        let key = keys::instance_key(&instance_id);
        let (bytes, revision) = self
            .get_one(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("instance {instance_id}")))?;
        let instance: Instance = codec::decode(&bytes)?;
        Ok((instance, Revision::from_raw(u64::try_from(revision).unwrap_or_default())))
    }

    async fn find_instance_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<(Instance, Revision)>> {
        let entries = self.list_prefix(keys::INSTANCE_PREFIX).await?;
        for (bytes, revision) in entries {
            let instance: Instance = codec::decode(&bytes)?;
            if instance.owner == owner && instance.name == name && !instance.is_terminal() {
                return Ok(Some((
                    instance,
                    Revision::from_raw(u64::try_from(revision).unwrap_or_default()),
                )));
            }
        }
        Ok(None)
    }

    async fn list_instances(&self, filter: InstanceFilter) -> Result<Vec<(Instance, Revision)>> {
        let entries = self.list_prefix(keys::INSTANCE_PREFIX).await?;
        let mut out = Vec::with_capacity(entries.len());
        for (bytes, revision) in entries {
            let instance: Instance = codec::decode(&bytes)?;
            if filter.matches(&instance) {
                out.push((instance, Revision::from_raw(u64::try_from(revision).unwrap_or_default())));
            }
        }
        Ok(out)
    }

    async fn cas_update_instance(
        &self,
        instance: Instance,
        expected_revision: Revision,
    ) -> Result<(Instance, Revision)> {
        let key = keys::instance_key(&instance.id);
        let encoded = codec::encode(&instance)?;
        let rev = i64::try_from(expected_revision.as_raw()).unwrap_or(i64::MAX);
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(key.clone(), CompareOp::Equal, rev)])
            .and_then(vec![TxnOp::put(key.clone(), encoded, None)])
            .or_else(vec![TxnOp::get(key, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        if !resp.succeeded() {
            return Err(StoreError::CasConflict(format!(
                "instance {} revision mismatch",
                instance.id
            )));
        }
        let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
        Ok((instance, Revision::from_raw(u64::try_from(revision).unwrap_or_default())))
    }

    async fn purge_instance(&self, instance_id: InstanceId) -> Result<()> {
        let key = keys::instance_key(&instance_id);
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }
}

// Match `TxnOpResponse` so clippy doesn't flag the enum as unused; the
// response variants are not currently inspected beyond `succeeded()`.
#[allow(dead_code)]
fn _assert_txn_op_response_shape(resp: TxnOpResponse) {
    match resp {
        TxnOpResponse::Get(_) | TxnOpResponse::Put(_) | TxnOpResponse::Delete(_) | TxnOpResponse::Txn(_) => {}
    }
}
