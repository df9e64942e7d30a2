//! `ClusterService` server: node registry RPCs over gRPC (§4.1, §6).

use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use hv_control::ControlPlane;
use hv_core::{LeaseId, NodeId, NodeStatus};
use hv_proto::v1::cluster_service_server::ClusterService;
use hv_proto::v1::{
    DeregisterNodeRequest, DeregisterNodeResponse, GetClusterInfoRequest, GetClusterInfoResponse,
    GetNodeRequest, GetNodeResponse, HeartbeatRequest, HeartbeatResponse, ListNodesRequest,
    ListNodesResponse, RegisterNodeRequest, RegisterNodeResponse, UpdateNodeStatusRequest,
    UpdateNodeStatusResponse, WatchEventType, WatchNodesEvent, WatchNodesRequest,
};
use tonic::{Request, Response, Status};

fn parse_node_id(raw: &str) -> Result<NodeId, Status> {
    NodeId::from_str(raw).map_err(|e| Status::invalid_argument(e.to_string()))
}

/// `ClusterService` wrapping any [`ControlPlane`] implementation.
pub struct ClusterRpc<C: ControlPlane> {
    control: Arc<C>,
}

impl<C: ControlPlane> ClusterRpc<C> {
    /// Wrap `control` as the `ClusterService` gRPC surface.
    pub fn new(control: Arc<C>) -> Self {
        Self { control }
    }
}

#[tonic::async_trait]
impl<C: ControlPlane + 'static> ClusterService for ClusterRpc<C> {
    async fn register_node(
        &self,
        request: Request<RegisterNodeRequest>,
    ) -> Result<Response<RegisterNodeResponse>, Status> {
        let req = request.into_inner();
        let role = hv_proto::v1::NodeRole::try_from(req.role)
            .unwrap_or(hv_proto::v1::NodeRole::Unspecified)
            .try_into()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;
        let rejoin_node_id = req
            .rejoin_node_id
            .map(|id| parse_node_id(&id))
            .transpose()?;
        let supported_kinds = req
            .supported_kinds
            .into_iter()
            .map(|k| {
                hv_proto::v1::InstanceKind::try_from(k)
                    .unwrap_or(hv_proto::v1::InstanceKind::Unspecified)
                    .try_into()
            })
            .collect::<Result<Vec<_>, hv_core::Error>>()
            .map_err(|e| hv_proto::error_to_status(&e))?;

        let descriptor = hv_store::NodeDescriptor {
            rejoin_node_id,
            hostname: req.hostname,
            address: req.address,
            role,
            region: req.region,
            zone: req.zone,
            labels: req.labels.into_iter().collect(),
            capacity: req.capacity.map(Into::into).unwrap_or_default(),
            allocatable: req.allocatable.map(Into::into).unwrap_or_default(),
            supported_kinds,
        };

        let outcome = self
            .control
            .register_node(descriptor)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        Ok(Response::new(RegisterNodeResponse {
            node_id: outcome.node_id.to_string(),
            heartbeat_interval_seconds: u32::try_from(outcome.heartbeat_interval.as_secs())
                .unwrap_or(u32::MAX),
            lease_ttl_seconds: u32::try_from(outcome.lease_ttl.as_secs()).unwrap_or(u32::MAX),
            lease_id: outcome.lease_id.as_raw(),
        }))
    }

    async fn deregister_node(
        &self,
        request: Request<DeregisterNodeRequest>,
    ) -> Result<Response<DeregisterNodeResponse>, Status> {
        let req = request.into_inner();
        let node_id = parse_node_id(&req.node_id)?;
        self.control
            .deregister_node(node_id, LeaseId::from_raw(req.lease_id))
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(DeregisterNodeResponse {}))
    }

    async fn get_node(
        &self,
        request: Request<GetNodeRequest>,
    ) -> Result<Response<GetNodeResponse>, Status> {
        let node_id = parse_node_id(&request.into_inner().node_id)?;
        let node = self
            .control
            .get_node(node_id)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(GetNodeResponse {
            node: Some(hv_proto::node_to_proto(&node, hv_core::Revision::ZERO)),
        }))
    }

    async fn list_nodes(
        &self,
        request: Request<ListNodesRequest>,
    ) -> Result<Response<ListNodesResponse>, Status> {
        let req = request.into_inner();
        let status = req
            .status_filter
            .map(|s| {
                hv_proto::v1::NodeStatus::try_from(s)
                    .unwrap_or(hv_proto::v1::NodeStatus::Unspecified)
                    .try_into()
            })
            .transpose()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;

        let filter = hv_store::NodeFilter {
            status,
            region: req.region_filter,
            zone: req.zone_filter,
            labels: req.label_selector.into_iter().collect(),
        };

        let nodes = self
            .control
            .list_nodes(filter)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        Ok(Response::new(ListNodesResponse {
            nodes: nodes
                .iter()
                .map(|n| hv_proto::node_to_proto(n, hv_core::Revision::ZERO))
                .collect(),
            next_page_token: String::new(),
        }))
    }

    async fn update_node_status(
        &self,
        request: Request<UpdateNodeStatusRequest>,
    ) -> Result<Response<UpdateNodeStatusResponse>, Status> {
        let req = request.into_inner();
        let node_id = parse_node_id(&req.node_id)?;
        let status: NodeStatus = hv_proto::v1::NodeStatus::try_from(req.status)
            .unwrap_or(hv_proto::v1::NodeStatus::Unspecified)
            .try_into()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;

        let node = self
            .control
            .update_node_status(node_id, status)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        Ok(Response::new(UpdateNodeStatusResponse {
            node: Some(hv_proto::node_to_proto(&node, hv_core::Revision::ZERO)),
        }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        let node_id = parse_node_id(&req.node_id)?;
        let status: NodeStatus = hv_proto::v1::NodeStatus::try_from(req.status)
            .unwrap_or(hv_proto::v1::NodeStatus::Unspecified)
            .try_into()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;
        let conditions = req
            .conditions
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, hv_core::Error>>()
            .map_err(|e| hv_proto::error_to_status(&e))?;

        let update = hv_store::NodeHeartbeatUpdate {
            status,
            conditions,
            allocated: req.allocated.map(Into::into).unwrap_or_default(),
        };

        let (accepted, next_interval) = self
            .control
            .heartbeat_node(node_id, LeaseId::from_raw(req.lease_id), update)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        // Surface any instances reconciliation has flagged as divergent on
        // this node so the agent's logs corroborate the controller's
        // corrective RPCs (§4.2). The corrective action itself is driven
        // unilaterally by the controller's reconciliation sweep, not by the
        // agent acting on this hint.
        let commands = self
            .control
            .divergent_instances(node_id)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?
            .into_iter()
            .map(|instance_id| hv_proto::v1::HeartbeatCommand {
                command: Some(hv_proto::v1::heartbeat_command::Command::ReconcileInstanceId(
                    instance_id.to_string(),
                )),
            })
            .collect();

        Ok(Response::new(HeartbeatResponse {
            accepted,
            next_interval_seconds: u32::try_from(next_interval.as_secs()).unwrap_or(u32::MAX),
            commands,
        }))
    }

    type WatchNodesStream =
        std::pin::Pin<Box<dyn futures::Stream<Item = Result<WatchNodesEvent, Status>> + Send>>;

    async fn watch_nodes(
        &self,
        request: Request<WatchNodesRequest>,
    ) -> Result<Response<Self::WatchNodesStream>, Status> {
        let req = request.into_inner();
        let status = req
            .status_filter
            .map(|s| {
                hv_proto::v1::NodeStatus::try_from(s)
                    .unwrap_or(hv_proto::v1::NodeStatus::Unspecified)
                    .try_into()
            })
            .transpose()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;

        let filter = hv_store::NodeFilter {
            status,
            ..Default::default()
        };

        let existing = self
            .control
            .list_nodes(filter.clone())
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        let initial = existing.into_iter().map(|node| {
            Ok(WatchNodesEvent {
                event_type: WatchEventType::Added as i32,
                node: Some(hv_proto::node_to_proto(&node, hv_core::Revision::ZERO)),
            })
        });

        let changes = self
            .control
            .watch_nodes(filter)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?
            .map(|event| {
                let event = event.map_err(|e| hv_proto::error_to_status(&e.into()))?;
                let (event_type, node) = match event {
                    hv_store::WatchEvent::Added(n) => (WatchEventType::Added as i32, n),
                    hv_store::WatchEvent::Modified(n) => (WatchEventType::Modified as i32, n),
                    hv_store::WatchEvent::Deleted(n) => (WatchEventType::Deleted as i32, n),
                };
                Ok(WatchNodesEvent {
                    event_type,
                    node: Some(hv_proto::node_to_proto(&node, hv_core::Revision::ZERO)),
                })
            });

        let stream = futures::stream::iter(initial).chain(changes);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_cluster_info(
        &self,
        _request: Request<GetClusterInfoRequest>,
    ) -> Result<Response<GetClusterInfoResponse>, Status> {
        let info = self
            .control
            .cluster_info()
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(GetClusterInfoResponse {
            node_count: info.node_count,
            ready_node_count: info.ready_node_count,
            instance_count: info.instance_count,
            controller_version: info.controller_version,
        }))
    }
}
