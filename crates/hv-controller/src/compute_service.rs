//! `ComputeService` server: client-facing instance lifecycle RPCs (§4.2, §6).

use std::str::FromStr;
use std::sync::Arc;

use hv_control::ControlPlane;
use hv_core::InstanceId;
use hv_proto::v1::compute_service_server::ComputeService;
use hv_proto::v1::{
    CreateInstanceRequest, CreateInstanceResponse, DeleteInstanceRequest, DeleteInstanceResponse,
    GetInstanceRequest, GetInstanceResponse, GetInstanceStatsRequest, GetInstanceStatsResponse,
    ListInstancesRequest, ListInstancesResponse, RestartInstanceRequest, RestartInstanceResponse,
    StartInstanceRequest, StartInstanceResponse, StopInstanceRequest, StopInstanceResponse,
};
use tonic::{Request, Response, Status};

fn parse_instance_id(raw: &str) -> Result<InstanceId, Status> {
    InstanceId::from_str(raw).map_err(|e| Status::invalid_argument(e.to_string()))
}

/// `ComputeService` wrapping any [`ControlPlane`] implementation.
///
/// This is the client-facing surface (dispatched from `hv-cli`/third-party
/// callers); the controller-to-agent `CreateInstance`/`StopInstance`/etc.
/// calls in `hv-agent` implement the structurally-identical `AgentService`
/// instead (§4.2, §4.4).
pub struct ComputeRpc<C: ControlPlane> {
    control: Arc<C>,
}

impl<C: ControlPlane> ComputeRpc<C> {
    /// Wrap `control` as the `ComputeService` gRPC surface.
    pub fn new(control: Arc<C>) -> Self {
        Self { control }
    }
}

#[tonic::async_trait]
impl<C: ControlPlane + 'static> ComputeService for ComputeRpc<C> {
    async fn create_instance(
        &self,
        request: Request<CreateInstanceRequest>,
    ) -> Result<Response<CreateInstanceResponse>, Status> {
        let req = request.into_inner();
        let kind = hv_proto::v1::InstanceKind::try_from(req.kind)
            .unwrap_or(hv_proto::v1::InstanceKind::Unspecified)
            .try_into()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;
        let spec = req.spec.map(Into::into).unwrap_or_default();
        let placement_prefs = req
            .placement_prefs
            .map(TryInto::try_into)
            .transpose()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?
            .unwrap_or_default();

        let instance = self
            .control
            .create_instance(hv_control::CreateInstanceRequest {
                name: req.name,
                owner: req.owner,
                kind,
                spec,
                placement_prefs,
            })
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        Ok(Response::new(CreateInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn delete_instance(
        &self,
        request: Request<DeleteInstanceRequest>,
    ) -> Result<Response<DeleteInstanceResponse>, Status> {
        let req = request.into_inner();
        let instance_id = parse_instance_id(&req.instance_id)?;
        self.control
            .delete_instance(instance_id, req.force)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(DeleteInstanceResponse {}))
    }

    async fn get_instance(
        &self,
        request: Request<GetInstanceRequest>,
    ) -> Result<Response<GetInstanceResponse>, Status> {
        let instance_id = parse_instance_id(&request.into_inner().instance_id)?;
        let instance = self
            .control
            .get_instance(instance_id)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(GetInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn list_instances(
        &self,
        request: Request<ListInstancesRequest>,
    ) -> Result<Response<ListInstancesResponse>, Status> {
        let req = request.into_inner();
        let state = req
            .state_filter
            .map(|s| {
                hv_proto::v1::InstanceState::try_from(s)
                    .unwrap_or(hv_proto::v1::InstanceState::Unspecified)
                    .try_into()
            })
            .transpose()
            .map_err(|e: hv_core::Error| hv_proto::error_to_status(&e))?;
        let node_id = req
            .node_filter
            .map(|id| hv_core::NodeId::from_str(&id))
            .transpose()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let instances = self
            .control
            .list_instances(hv_store::InstanceFilter { state, node_id })
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;

        Ok(Response::new(ListInstancesResponse {
            instances: instances
                .iter()
                .map(|i| hv_proto::instance_to_proto(i, hv_core::Revision::ZERO))
                .collect(),
            next_page_token: String::new(),
        }))
    }

    async fn start_instance(
        &self,
        request: Request<StartInstanceRequest>,
    ) -> Result<Response<StartInstanceResponse>, Status> {
        let instance_id = parse_instance_id(&request.into_inner().instance_id)?;
        let instance = self
            .control
            .start_instance(instance_id)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(StartInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn stop_instance(
        &self,
        request: Request<StopInstanceRequest>,
    ) -> Result<Response<StopInstanceResponse>, Status> {
        let req = request.into_inner();
        let instance_id = parse_instance_id(&req.instance_id)?;
        let instance = self
            .control
            .stop_instance(
                instance_id,
                hv_control::StopOptions {
                    force: req.force,
                    timeout_seconds: req.timeout_seconds,
                },
            )
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(StopInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn restart_instance(
        &self,
        request: Request<RestartInstanceRequest>,
    ) -> Result<Response<RestartInstanceResponse>, Status> {
        let req = request.into_inner();
        let instance_id = parse_instance_id(&req.instance_id)?;
        let instance = self
            .control
            .restart_instance(instance_id, req.force)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(RestartInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn get_instance_stats(
        &self,
        request: Request<GetInstanceStatsRequest>,
    ) -> Result<Response<GetInstanceStatsResponse>, Status> {
        let instance_id = parse_instance_id(&request.into_inner().instance_id)?;
        let stats = self
            .control
            .get_instance_stats(instance_id)
            .await
            .map_err(|e| hv_proto::error_to_status(&e.into()))?;
        Ok(Response::new(GetInstanceStatsResponse {
            stats: Some(stats.into()),
        }))
    }
}
