//! The `AgentService` gRPC surface: dispatches controller RPCs onto the
//! driver registry and tracks enough local state to answer idempotently
//! (§4.4: "the agent checks its local instance table before executing and
//! returns success if the instance is already in the requested state").

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use hv_core::{Instance, InstanceId, InstanceKind, InstanceSpec, InstanceState, NodeId};
use hv_driver::{AttachOptions, DriverRegistry};
use hv_proto::v1::agent_service_server::AgentService;
use hv_proto::v1::{
    ConsoleFrame, CreateInstanceRequest, CreateInstanceResponse, DeleteInstanceRequest,
    DeleteInstanceResponse, GetInstanceRequest, GetInstanceResponse, GetInstanceStatsRequest,
    GetInstanceStatsResponse, ListInstancesRequest, ListInstancesResponse, RestartInstanceRequest,
    RestartInstanceResponse, StartInstanceRequest, StartInstanceResponse, StopInstanceRequest,
    StopInstanceResponse,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::console;

/// Metadata the driver doesn't track itself but a full `Instance` response
/// needs: identity, desired shape, and bookkeeping timestamps.
#[derive(Clone)]
struct InstanceRecord {
    name: String,
    owner: String,
    kind: InstanceKind,
    spec: InstanceSpec,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

/// Implements `AgentService` over a [`DriverRegistry`], the agent's own
/// node id (for filling `Instance::placement`), and a local instance table.
pub struct AgentRpc {
    registry: Arc<DriverRegistry>,
    records: RwLock<std::collections::HashMap<InstanceId, InstanceRecord>>,
    node_id: RwLock<Option<NodeId>>,
}

impl AgentRpc {
    /// Build an agent RPC handler over `registry`. `node_id` is set once
    /// registration with the controller completes.
    #[must_use]
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            records: RwLock::new(std::collections::HashMap::new()),
            node_id: RwLock::new(None),
        }
    }

    /// Record this agent's node id, used to populate `Instance::placement`.
    pub fn set_node_id(&self, node_id: NodeId) {
        *self.node_id.write() = Some(node_id);
    }

    fn placement(&self) -> Option<NodeId> {
        *self.node_id.read()
    }

    fn parse_instance_id(raw: &str) -> Result<InstanceId, Status> {
        raw.parse()
            .map_err(|_| Status::invalid_argument("malformed instance id"))
    }

    async fn instance_view(&self, id: InstanceId) -> Result<Instance, Status> {
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;
        let handle = driver.get(id).await.map_err(crate::error::AgentError::from)?;
        Ok(Self::build_instance(id, &record, &handle, self.placement()))
    }

    fn build_instance(
        id: InstanceId,
        record: &InstanceRecord,
        handle: &hv_driver::DriverHandle,
        placement: Option<NodeId>,
    ) -> Instance {
        Instance {
            id,
            name: record.name.clone(),
            owner: record.owner.clone(),
            kind: record.kind,
            spec: record.spec.clone(),
            placement,
            state: handle.state,
            state_reason: String::new(),
            observed_ip: handle.observed_ip,
            created_at: record.created_at,
            started_at: record.started_at,
            deleted_at: None,
            labels: record.labels.clone(),
            annotations: record.annotations.clone(),
        }
    }

    async fn create(
        &self,
        id: InstanceId,
        name: String,
        owner: String,
        kind: InstanceKind,
        spec: InstanceSpec,
    ) -> Result<Instance, Status> {
        if self.records.read().contains_key(&id) {
            return self.instance_view(id).await;
        }

        let driver = self
            .registry
            .get(kind)
            .ok_or(crate::error::AgentError::UnsupportedKind(kind))?;

        let handle = match driver.create(id, &spec).await {
            Ok(h) => h,
            Err(e) => return Err(crate::error::AgentError::from(e).into()),
        };

        // §7 propagation policy: one automatic delete-and-retry on a
        // start failure before surfacing the instance as failed.
        let handle = match driver.start(id).await {
            Ok(h) => h,
            Err(_) => {
                let _ = driver.delete(id).await;
                driver
                    .create(id, &spec)
                    .await
                    .map_err(crate::error::AgentError::from)?;
                driver
                    .start(id)
                    .await
                    .unwrap_or(hv_driver::DriverHandle {
                        id,
                        state: InstanceState::Failed,
                        observed_ip: None,
                    })
            }
        };

        let now = Utc::now();
        let started_at = (handle.state == InstanceState::Running).then_some(now);
        let record = InstanceRecord {
            name,
            owner,
            kind,
            spec,
            created_at: now,
            started_at,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        };
        self.records.write().insert(id, record.clone());

        Ok(Self::build_instance(id, &record, &handle, self.placement()))
    }
}

#[tonic::async_trait]
impl AgentService for AgentRpc {
    async fn create_instance(
        &self,
        request: Request<CreateInstanceRequest>,
    ) -> Result<Response<CreateInstanceResponse>, Status> {
        let req = request.into_inner();
        let id = Self::parse_instance_id(&req.instance_id)?;
        let kind = hv_proto::v1::InstanceKind::try_from(req.kind)
            .ok()
            .and_then(|k| hv_core::InstanceKind::try_from(k).ok())
            .ok_or_else(|| Status::invalid_argument("unknown instance kind"))?;
        let spec = req
            .spec
            .map(InstanceSpec::from)
            .ok_or_else(|| Status::invalid_argument("missing spec"))?;

        let instance = self.create(id, req.name, req.owner, kind, spec).await?;
        Ok(Response::new(CreateInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn delete_instance(
        &self,
        request: Request<DeleteInstanceRequest>,
    ) -> Result<Response<DeleteInstanceResponse>, Status> {
        let req = request.into_inner();
        let id = Self::parse_instance_id(&req.instance_id)?;
        let Some(record) = self.records.read().get(&id).cloned() else {
            return Ok(Response::new(DeleteInstanceResponse {}));
        };
        if let Some(driver) = self.registry.get(record.kind) {
            driver
                .delete(id)
                .await
                .map_err(crate::error::AgentError::from)?;
        }
        self.records.write().remove(&id);
        Ok(Response::new(DeleteInstanceResponse {}))
    }

    async fn get_instance(
        &self,
        request: Request<GetInstanceRequest>,
    ) -> Result<Response<GetInstanceResponse>, Status> {
        let id = Self::parse_instance_id(&request.into_inner().instance_id)?;
        let instance = self.instance_view(id).await?;
        Ok(Response::new(GetInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn list_instances(
        &self,
        _request: Request<ListInstancesRequest>,
    ) -> Result<Response<ListInstancesResponse>, Status> {
        let ids: Vec<InstanceId> = self.records.read().keys().copied().collect();
        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(instance) = self.instance_view(id).await {
                instances.push(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO));
            }
        }
        Ok(Response::new(ListInstancesResponse {
            instances,
            next_page_token: String::new(),
        }))
    }

    async fn start_instance(
        &self,
        request: Request<StartInstanceRequest>,
    ) -> Result<Response<StartInstanceResponse>, Status> {
        let id = Self::parse_instance_id(&request.into_inner().instance_id)?;
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;

        let current = driver.get(id).await.map_err(crate::error::AgentError::from)?;
        let handle = if current.state == InstanceState::Running {
            current
        } else {
            driver.start(id).await.map_err(crate::error::AgentError::from)?
        };

        if handle.state == InstanceState::Running && record.started_at.is_none() {
            if let Some(entry) = self.records.write().get_mut(&id) {
                entry.started_at = Some(Utc::now());
            }
        }

        let record = self.records.read().get(&id).cloned().unwrap_or(record);
        let instance = Self::build_instance(id, &record, &handle, self.placement());
        Ok(Response::new(StartInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn stop_instance(
        &self,
        request: Request<StopInstanceRequest>,
    ) -> Result<Response<StopInstanceResponse>, Status> {
        let req = request.into_inner();
        let id = Self::parse_instance_id(&req.instance_id)?;
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;

        let current = driver.get(id).await.map_err(crate::error::AgentError::from)?;
        let handle = if current.state == InstanceState::Stopped {
            current
        } else {
            let timeout_secs = if req.timeout_seconds == 0 { 30 } else { req.timeout_seconds };
            let deadline = std::time::Duration::from_secs(u64::from(timeout_secs));
            match tokio::time::timeout(deadline, driver.stop(id, false)).await {
                Ok(result) => result.map_err(crate::error::AgentError::from)?,
                Err(_) if req.force => driver.stop(id, true).await.map_err(crate::error::AgentError::from)?,
                Err(_) => return Err(Status::deadline_exceeded("graceful stop timed out")),
            }
        };

        let instance = Self::build_instance(id, &record, &handle, self.placement());
        Ok(Response::new(StopInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn restart_instance(
        &self,
        request: Request<RestartInstanceRequest>,
    ) -> Result<Response<RestartInstanceResponse>, Status> {
        let req = request.into_inner();
        let id = Self::parse_instance_id(&req.instance_id)?;
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;

        let handle = driver
            .restart(id, req.force)
            .await
            .map_err(crate::error::AgentError::from)?;
        let instance = Self::build_instance(id, &record, &handle, self.placement());
        Ok(Response::new(RestartInstanceResponse {
            instance: Some(hv_proto::instance_to_proto(&instance, hv_core::Revision::ZERO)),
        }))
    }

    async fn get_instance_stats(
        &self,
        request: Request<GetInstanceStatsRequest>,
    ) -> Result<Response<GetInstanceStatsResponse>, Status> {
        let id = Self::parse_instance_id(&request.into_inner().instance_id)?;
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;
        let stats = driver.stats(id).await.map_err(crate::error::AgentError::from)?;
        Ok(Response::new(GetInstanceStatsResponse {
            stats: Some(stats.into()),
        }))
    }

    type AttachConsoleStream = Pin<Box<dyn Stream<Item = Result<ConsoleFrame, Status>> + Send>>;

    async fn attach_console(
        &self,
        request: Request<Streaming<ConsoleFrame>>,
    ) -> Result<Response<Self::AttachConsoleStream>, Status> {
        let mut inbound = request.into_inner();
        let open = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("expected an opening frame"))?;
        let Some(hv_proto::v1::console_frame::Frame::Open(open)) = open.frame else {
            return Err(Status::invalid_argument("first frame must open a console"));
        };
        let id = Self::parse_instance_id(&open.instance_id)?;
        let record = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Status::not_found(id.to_string()))?;
        let driver = self
            .registry
            .get(record.kind)
            .ok_or_else(|| Status::failed_precondition("no driver for this instance's kind"))?;

        let session = driver
            .attach(id, AttachOptions::default())
            .await
            .map_err(crate::error::AgentError::from)?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(console::pump(inbound, session, tx));
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_driver::fake::FakeDriver;

    fn rpc() -> AgentRpc {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(FakeDriver::new(InstanceKind::Container)));
        AgentRpc::new(Arc::new(registry))
    }

    fn create_request(id: InstanceId) -> Request<CreateInstanceRequest> {
        Request::new(CreateInstanceRequest {
            name: "web".into(),
            owner: "alice".into(),
            kind: hv_proto::v1::InstanceKind::Container as i32,
            spec: Some(hv_core::InstanceSpec::default().into()),
            placement_prefs: None,
            instance_id: id.to_string(),
        })
    }

    #[tokio::test]
    async fn create_instance_requires_a_parsable_id() {
        let agent = rpc();
        let mut req = create_request(InstanceId::generate());
        req.get_mut().instance_id = "not-a-uuid".into();
        let status = agent.create_instance(req).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn create_instance_reaches_running_and_is_idempotent() {
        let agent = rpc();
        let id = InstanceId::generate();

        let first = agent.create_instance(create_request(id)).await.unwrap().into_inner();
        let instance = first.instance.expect("instance in response");
        assert_eq!(
            hv_proto::v1::InstanceState::try_from(instance.state).unwrap(),
            hv_proto::v1::InstanceState::Running
        );

        let second = agent.create_instance(create_request(id)).await.unwrap().into_inner();
        assert_eq!(second.instance.unwrap().id, id.to_string());
    }

    #[tokio::test]
    async fn get_instance_on_unknown_id_is_not_found() {
        let agent = rpc();
        let status = agent
            .get_instance(Request::new(GetInstanceRequest {
                instance_id: InstanceId::generate().to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn stop_then_start_round_trips_through_fake_driver() {
        let agent = rpc();
        let id = InstanceId::generate();
        agent.create_instance(create_request(id)).await.unwrap();

        let stopped = agent
            .stop_instance(Request::new(StopInstanceRequest {
                instance_id: id.to_string(),
                force: false,
                timeout_seconds: 5,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            hv_proto::v1::InstanceState::try_from(stopped.instance.unwrap().state).unwrap(),
            hv_proto::v1::InstanceState::Stopped
        );

        let restarted = agent
            .start_instance(Request::new(StartInstanceRequest {
                instance_id: id.to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            hv_proto::v1::InstanceState::try_from(restarted.instance.unwrap().state).unwrap(),
            hv_proto::v1::InstanceState::Running
        );
    }

    #[tokio::test]
    async fn delete_instance_is_idempotent_on_unknown_id() {
        let agent = rpc();
        let status = agent
            .delete_instance(Request::new(DeleteInstanceRequest {
                instance_id: InstanceId::generate().to_string(),
                force: false,
            }))
            .await;
        assert!(status.is_ok());
    }
}
