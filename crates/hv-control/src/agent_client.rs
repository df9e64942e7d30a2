//! Client-side connection management for the controller-to-agent RPC
//! surface (§4.4).
//!
//! `AgentClientPool` generalizes the teacher's `EndpointCache` (a plain
//! `RwLock<HashMap<K, V>>` keyed cache) from pod endpoints to tonic
//! `Channel`s keyed by node id, and `AgentClient`/`NoopAgentClient`
//! generalize `SchedulerClient`/`NoopSchedulerClient`'s real/noop split from
//! HTTP to gRPC.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hv_core::{Instance, InstanceId, InstanceKind, InstanceSpec, InstanceStats, NodeId, PlacementPrefs};
use hv_proto::v1::agent_service_client::AgentServiceClient;
use hv_proto::v1::{
    CreateInstanceRequest as ProtoCreateInstanceRequest, DeleteInstanceRequest,
    GetInstanceRequest, GetInstanceStatsRequest, RestartInstanceRequest, StartInstanceRequest,
    StopInstanceRequest,
};
use parking_lot::RwLock;
use tonic::transport::Channel;

use crate::error::{ControlError, Result};

/// The RPC surface the controller drives against an agent (§4.4).
///
/// Abstracted so tests can exercise `hv-control` logic without a live
/// `hv-agent` process to dial.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Dispatch a create to the owning agent, carrying the id the
    /// controller already assigned and persisted (§4.4 idempotency: "the
    /// first argument of every mutating RPC is the controller-assigned id").
    #[allow(clippy::too_many_arguments)]
    async fn create_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        name: &str,
        owner: &str,
        kind: InstanceKind,
        spec: &InstanceSpec,
        prefs: &PlacementPrefs,
    ) -> Result<Instance>;

    /// Ask the owning agent to start a stopped instance.
    async fn start_instance(&self, node_id: NodeId, instance_id: InstanceId) -> Result<Instance>;

    /// Ask the owning agent to stop a running instance.
    async fn stop_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
        timeout: Duration,
    ) -> Result<Instance>;

    /// Ask the owning agent to restart an instance.
    async fn restart_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
    ) -> Result<Instance>;

    /// Ask the owning agent to destroy an instance.
    async fn delete_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
    ) -> Result<()>;

    /// Read the agent's own view of an instance (used during reconciliation).
    async fn get_instance(&self, node_id: NodeId, instance_id: InstanceId) -> Result<Instance>;

    /// Read runtime counters for an instance from its owning agent.
    async fn get_instance_stats(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
    ) -> Result<InstanceStats>;

    /// Record the dial address the caller most recently observed for
    /// `node_id`. Implementations that don't cache connections may ignore
    /// this entirely.
    fn note_address(&self, _node_id: NodeId, _address: &str) {}
}

/// A tonic-channel connection pool keyed by node id (§4.4).
///
/// Channels are cheap to clone and multiplex multiple RPCs internally, so
/// the cache exists only to avoid repeated DNS/TCP/TLS handshakes against
/// the same agent address.
pub struct AgentClientPool {
    channels: RwLock<HashMap<NodeId, Channel>>,
}

impl AgentClientPool {
    /// Build an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn channel_for(&self, node_id: NodeId, address: &str) -> Result<Channel> {
        if let Some(channel) = self.channels.read().get(&node_id).cloned() {
            return Ok(channel);
        }

        let endpoint = format!("http://{address}");
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| ControlError::NodeUnreachable(node_id, e.to_string()))?
            .connect()
            .await
            .map_err(|e| ControlError::NodeUnreachable(node_id, e.to_string()))?;

        self.channels.write().insert(node_id, channel.clone());
        Ok(channel)
    }

    /// Drop any cached channel for `node_id`, forcing a fresh dial on next use.
    pub fn evict(&self, node_id: NodeId) {
        self.channels.write().remove(&node_id);
    }

    async fn client_for(&self, node_id: NodeId, address: &str) -> Result<AgentServiceClient<Channel>> {
        let channel = self.channel_for(node_id, address).await?;
        Ok(AgentServiceClient::new(channel))
    }
}

impl Default for AgentClientPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A live gRPC client talking to agents through a cached connection pool.
///
/// Callers supply the node's dial address at each call site rather than the
/// pool resolving it itself, since address resolution is the caller's
/// (`hv-store`-backed) responsibility.
pub struct GrpcAgentClient {
    pool: AgentClientPool,
    addresses: RwLock<HashMap<NodeId, String>>,
}

impl GrpcAgentClient {
    /// Build a client with an empty connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: AgentClientPool::new(),
            addresses: RwLock::new(HashMap::new()),
        }
    }

    /// Record (or refresh) the dial address for `node_id`, evicting any
    /// stale cached channel.
    pub fn set_address(&self, node_id: NodeId, address: String) {
        let changed = self
            .addresses
            .read()
            .get(&node_id)
            .is_none_or(|existing| existing != &address);
        if changed {
            self.pool.evict(node_id);
        }
        self.addresses.write().insert(node_id, address);
    }

    async fn client(&self, node_id: NodeId) -> Result<AgentServiceClient<Channel>> {
        let address = self
            .addresses
            .read()
            .get(&node_id)
            .cloned()
            .ok_or(ControlError::NodeNotFound(node_id))?;
        self.pool.client_for(node_id, &address).await
    }

    fn map_status(node_id: NodeId, status: tonic::Status) -> ControlError {
        if status.code() == tonic::Code::Unavailable || status.code() == tonic::Code::DeadlineExceeded {
            ControlError::NodeUnreachable(node_id, status.message().to_string())
        } else {
            ControlError::Internal(format!("agent rpc failed: {status}"))
        }
    }
}

impl Default for GrpcAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentClient for GrpcAgentClient {
    async fn create_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        name: &str,
        owner: &str,
        kind: InstanceKind,
        spec: &InstanceSpec,
        prefs: &PlacementPrefs,
    ) -> Result<Instance> {
        let mut client = self.client(node_id).await?;
        let request = ProtoCreateInstanceRequest {
            name: name.to_string(),
            owner: owner.to_string(),
            kind: hv_proto::v1::InstanceKind::from(kind) as i32,
            spec: Some(spec.clone().into()),
            placement_prefs: Some(prefs.clone().into()),
            instance_id: instance_id.to_string(),
        };
        let response = client
            .create_instance(request)
            .await
            .map_err(|e| Self::map_status(node_id, e))?
            .into_inner();
        let proto = response
            .instance
            .ok_or_else(|| ControlError::Internal("agent returned an empty instance".into()))?;
        hv_proto::instance_from_proto(proto)
            .map(|(instance, _)| instance)
            .map_err(|e| ControlError::Internal(e.to_string()))
    }

    async fn start_instance(&self, node_id: NodeId, instance_id: InstanceId) -> Result<Instance> {
        let mut client = self.client(node_id).await?;
        let response = client
            .start_instance(StartInstanceRequest {
                instance_id: instance_id.to_string(),
            })
            .await
            .map_err(|e| Self::map_status(node_id, e))?
            .into_inner();
        let proto = response
            .instance
            .ok_or_else(|| ControlError::Internal("agent returned an empty instance".into()))?;
        hv_proto::instance_from_proto(proto)
            .map(|(instance, _)| instance)
            .map_err(|e| ControlError::Internal(e.to_string()))
    }

    async fn stop_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
        timeout: Duration,
    ) -> Result<Instance> {
        let mut client = self.client(node_id).await?;
        let response = client
            .stop_instance(StopInstanceRequest {
                instance_id: instance_id.to_string(),
                force,
                timeout_seconds: u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX),
            })
            .await
            .map_err(|e| {
                if e.code() == tonic::Code::DeadlineExceeded && !force {
                    ControlError::StopTimedOut(instance_id)
                } else {
                    Self::map_status(node_id, e)
                }
            })?
            .into_inner();
        let proto = response
            .instance
            .ok_or_else(|| ControlError::Internal("agent returned an empty instance".into()))?;
        hv_proto::instance_from_proto(proto)
            .map(|(instance, _)| instance)
            .map_err(|e| ControlError::Internal(e.to_string()))
    }

    async fn restart_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
    ) -> Result<Instance> {
        let mut client = self.client(node_id).await?;
        let response = client
            .restart_instance(RestartInstanceRequest {
                instance_id: instance_id.to_string(),
                force,
            })
            .await
            .map_err(|e| Self::map_status(node_id, e))?
            .into_inner();
        let proto = response
            .instance
            .ok_or_else(|| ControlError::Internal("agent returned an empty instance".into()))?;
        hv_proto::instance_from_proto(proto)
            .map(|(instance, _)| instance)
            .map_err(|e| ControlError::Internal(e.to_string()))
    }

    async fn delete_instance(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
        force: bool,
    ) -> Result<()> {
        let mut client = self.client(node_id).await?;
        client
            .delete_instance(DeleteInstanceRequest {
                instance_id: instance_id.to_string(),
                force,
            })
            .await
            .map_err(|e| Self::map_status(node_id, e))?;
        Ok(())
    }

    async fn get_instance(&self, node_id: NodeId, instance_id: InstanceId) -> Result<Instance> {
        let mut client = self.client(node_id).await?;
        let response = client
            .get_instance(GetInstanceRequest {
                instance_id: instance_id.to_string(),
            })
            .await
            .map_err(|e| Self::map_status(node_id, e))?
            .into_inner();
        let proto = response
            .instance
            .ok_or_else(|| ControlError::Internal("agent returned an empty instance".into()))?;
        hv_proto::instance_from_proto(proto)
            .map(|(instance, _)| instance)
            .map_err(|e| ControlError::Internal(e.to_string()))
    }

    async fn get_instance_stats(
        &self,
        node_id: NodeId,
        instance_id: InstanceId,
    ) -> Result<InstanceStats> {
        let mut client = self.client(node_id).await?;
        let response = client
            .get_instance_stats(GetInstanceStatsRequest {
                instance_id: instance_id.to_string(),
            })
            .await
            .map_err(|e| Self::map_status(node_id, e))?
            .into_inner();
        response
            .stats
            .map(InstanceStats::from)
            .ok_or_else(|| ControlError::Internal("agent returned empty stats".into()))
    }

    fn note_address(&self, node_id: NodeId, address: &str) {
        self.set_address(node_id, address.to_string());
    }
}

/// A no-op agent client for when no live agent fleet is configured (local
/// development, or `hv-control` unit tests that stub the RPC boundary).
#[derive(Debug, Clone, Default)]
pub struct NoopAgentClient;

#[async_trait]
impl AgentClient for NoopAgentClient {
    async fn create_instance(
        &self,
        node_id: NodeId,
        _instance_id: InstanceId,
        _name: &str,
        _owner: &str,
        _kind: InstanceKind,
        _spec: &InstanceSpec,
        _prefs: &PlacementPrefs,
    ) -> Result<Instance> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn start_instance(&self, node_id: NodeId, _instance_id: InstanceId) -> Result<Instance> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn stop_instance(
        &self,
        node_id: NodeId,
        _instance_id: InstanceId,
        _force: bool,
        _timeout: Duration,
    ) -> Result<Instance> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn restart_instance(
        &self,
        node_id: NodeId,
        _instance_id: InstanceId,
        _force: bool,
    ) -> Result<Instance> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn delete_instance(
        &self,
        node_id: NodeId,
        _instance_id: InstanceId,
        _force: bool,
    ) -> Result<()> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn get_instance(&self, node_id: NodeId, _instance_id: InstanceId) -> Result<Instance> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }

    async fn get_instance_stats(
        &self,
        node_id: NodeId,
        _instance_id: InstanceId,
    ) -> Result<InstanceStats> {
        Err(ControlError::NodeUnreachable(
            node_id,
            "no agent client configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_client_reports_unreachable() {
        let client = NoopAgentClient;
        let node_id = NodeId::generate();
        let result = client
            .start_instance(node_id, InstanceId::generate())
            .await;
        assert!(matches!(result, Err(ControlError::NodeUnreachable(..))));
    }

    #[test]
    fn pool_starts_empty() {
        let pool = AgentClientPool::new();
        assert!(pool.channels.read().is_empty());
    }
}
