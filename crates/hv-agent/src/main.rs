//! Per-node agent entry point: registers with the controller, drives
//! instances through the local driver registry, and serves `AgentService`.

use std::sync::Arc;

use hv_core::Resources;
use hv_driver::container::ContainerDriver;
use hv_driver::fake::FakeDriver;
use hv_driver::DriverRegistry;
use hv_proto::v1::agent_service_server::AgentServiceServer;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hv_agent::config::AgentConfig;
use hv_agent::registration::{run_heartbeat_loop, ControllerClient};
use hv_agent::service::AgentRpc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hv_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env();
    tracing::info!(
        hostname = %config.hostname,
        address = %config.address,
        controller_address = %config.controller_address,
        role = ?config.role,
        "agent configuration loaded"
    );

    let registry = Arc::new(build_registry(&config));
    let host_info = probe_host(&registry).await;
    tracing::info!(?host_info, "driver host info collected");

    let capacity = Resources {
        cpu_millicores: u64::from(host_info.cpu_cores) * 1000,
        memory_bytes: host_info.usable_memory_bytes,
        disk_bytes: 0,
        gpu_count: 0,
    };

    let mut client = ControllerClient::connect(&config.controller_address).await?;
    let registration = client
        .register(&config, capacity, capacity, None)
        .await?;
    tracing::info!(node_id = %registration.node_id, "registered with controller");

    let rpc = AgentRpc::new(registry);
    rpc.set_node_id(registration.node_id);

    let node_id = registration.node_id;
    tokio::spawn(run_heartbeat_loop(
        client,
        node_id,
        registration.lease_id,
        registration.heartbeat_interval,
        move || (hv_core::NodeStatus::Ready, Vec::new(), Resources::default()),
    ));

    let addr = config.bind_address.parse()?;
    tracing::info!(%addr, "serving AgentService");
    Server::builder()
        .add_service(AgentServiceServer::new(rpc))
        .serve(addr)
        .await?;

    Ok(())
}

fn build_registry(config: &AgentConfig) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    match ContainerDriver::connect_local() {
        Ok(driver) => registry.register(Arc::new(driver)),
        Err(err) => {
            tracing::warn!(error = %err, "docker unavailable; falling back to the fake driver");
            registry.register(Arc::new(FakeDriver::new(hv_core::InstanceKind::Container)));
        }
    }
    for kind in &config.supported_kinds {
        if registry.get(*kind).is_none() {
            registry.register(Arc::new(FakeDriver::new(*kind)));
        }
    }
    registry
}

async fn probe_host(registry: &DriverRegistry) -> hv_driver::HostInfo {
    for kind in registry.supported_kinds() {
        if let Some(driver) = registry.get(kind) {
            if let Ok(info) = driver.host_info().await {
                return info;
            }
        }
    }
    hv_driver::HostInfo {
        cpu_cores: 1,
        usable_memory_bytes: 0,
        hypervisor: "unknown".into(),
        version: "unknown".into(),
    }
}
