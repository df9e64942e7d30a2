//! Registration and heartbeat loop against the controller's
//! `ClusterService` (§4.1).
//!
//! The agent owns its node record through a lease it must keep alive by
//! heartbeating faster than the lease TTL; losing that race is a terminal
//! event for this incarnation (§4.1 failure: "the agent must fully
//! re-register").

use std::time::Duration;

use hv_core::{LeaseId, NodeId, Resources};
use hv_proto::v1::cluster_service_client::ClusterServiceClient;
use hv_proto::v1::{HeartbeatRequest, RegisterNodeRequest};
use tonic::transport::Channel;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

/// The outcome of a successful registration: the id the controller assigned
/// (or confirmed, on rejoin) and the cadence it wants heartbeats on.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    /// This agent's node id.
    pub node_id: NodeId,
    /// The lease backing this node's record; must accompany every
    /// subsequent heartbeat and the final deregister call.
    pub lease_id: LeaseId,
    /// Recommended heartbeat interval (`H < T/2`).
    pub heartbeat_interval: Duration,
    /// Lease TTL backing the node record.
    pub lease_ttl: Duration,
}

/// A thin wrapper around the generated `ClusterService` client, scoped to
/// the calls the agent makes (register, heartbeat, deregister).
pub struct ControllerClient {
    inner: ClusterServiceClient<Channel>,
}

impl ControllerClient {
    /// Dial the controller at `address` (e.g. `http://10.0.0.1:7443`).
    pub async fn connect(address: &str) -> Result<Self> {
        let inner = ClusterServiceClient::connect(address.to_string())
            .await
            .map_err(|e| AgentError::ControllerUnavailable(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Register this node, optionally rejoining a previous id.
    pub async fn register(
        &mut self,
        config: &AgentConfig,
        capacity: Resources,
        allocatable: Resources,
        rejoin_node_id: Option<NodeId>,
    ) -> Result<Registration> {
        let request = RegisterNodeRequest {
            hostname: config.hostname.clone(),
            address: config.address.clone(),
            role: hv_proto::v1::NodeRole::from(config.role) as i32,
            region: config.region.clone(),
            zone: config.zone.clone(),
            labels: config.labels.clone().into_iter().collect(),
            capacity: Some(capacity.into()),
            allocatable: Some(allocatable.into()),
            supported_kinds: config
                .supported_kinds
                .iter()
                .map(|k| hv_proto::v1::InstanceKind::from(*k) as i32)
                .collect(),
            rejoin_node_id: rejoin_node_id.map(|id| id.to_string()),
        };

        let response = self
            .inner
            .register_node(request)
            .await
            .map_err(|status| AgentError::ControllerUnavailable(status.message().to_string()))?
            .into_inner();

        let node_id: NodeId = response
            .node_id
            .parse()
            .map_err(|_| AgentError::RegistrationFailed("controller returned a malformed node id".into()))?;

        info!(node_id = %node_id, "registered with controller");

        Ok(Registration {
            node_id,
            lease_id: LeaseId::from_raw(response.lease_id),
            heartbeat_interval: Duration::from_secs(u64::from(response.heartbeat_interval_seconds)),
            lease_ttl: Duration::from_secs(u64::from(response.lease_ttl_seconds)),
        })
    }

    /// Send one heartbeat, reporting current status, conditions, and
    /// aggregated allocated resources.
    pub async fn heartbeat(
        &mut self,
        node_id: NodeId,
        lease_id: LeaseId,
        status: hv_core::NodeStatus,
        conditions: Vec<hv_core::NodeCondition>,
        allocated: Resources,
    ) -> Result<hv_proto::v1::HeartbeatResponse> {
        let request = HeartbeatRequest {
            node_id: node_id.to_string(),
            status: hv_proto::v1::NodeStatus::from(status) as i32,
            conditions: conditions.into_iter().map(Into::into).collect(),
            allocated: Some(allocated.into()),
            lease_id: lease_id.as_raw(),
        };

        self.inner
            .heartbeat(request)
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| AgentError::ControllerUnavailable(status.message().to_string()))
    }

    /// Release this node's lease ahead of a graceful shutdown.
    pub async fn deregister(&mut self, node_id: NodeId, lease_id: LeaseId) -> Result<()> {
        self.inner
            .deregister_node(hv_proto::v1::DeregisterNodeRequest {
                node_id: node_id.to_string(),
                lease_id: lease_id.as_raw(),
            })
            .await
            .map_err(|status| AgentError::ControllerUnavailable(status.message().to_string()))?;
        Ok(())
    }
}

/// Run the heartbeat loop until `node_id`'s lease can no longer be kept
/// alive. `sample` is called once per tick to produce the aggregated
/// allocated resources and conditions to report (driven by the driver
/// registry's current view, per §4.2's reconciliation description).
pub async fn run_heartbeat_loop<F>(
    mut client: ControllerClient,
    node_id: NodeId,
    lease_id: LeaseId,
    mut interval: Duration,
    mut sample: F,
) where
    F: FnMut() -> (hv_core::NodeStatus, Vec<hv_core::NodeCondition>, Resources),
{
    loop {
        tokio::time::sleep(interval).await;
        let (status, conditions, allocated) = sample();
        match client
            .heartbeat(node_id, lease_id, status, conditions, allocated)
            .await
        {
            Ok(response) => {
                if response.next_interval_seconds > 0 {
                    interval = Duration::from_secs(u64::from(response.next_interval_seconds));
                }
                for command in response.commands {
                    log_command(&command);
                }
            }
            Err(err) => warn!(error = %err, "heartbeat failed; will retry next tick"),
        }
    }
}

fn log_command(command: &hv_proto::v1::HeartbeatCommand) {
    match &command.command {
        Some(hv_proto::v1::heartbeat_command::Command::ReconcileInstanceId(id)) => {
            info!(instance_id = %id, "controller requested reconciliation");
        }
        Some(hv_proto::v1::heartbeat_command::Command::FullResync(_)) => {
            info!("controller requested a full resync");
        }
        None => {}
    }
}
