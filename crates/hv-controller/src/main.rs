//! Controller entry point: serves `ClusterService`+`ComputeService` over
//! gRPC and a `/healthz`+`/readyz` sidecar over HTTP (§4.1, §4.2, §6).

use std::sync::Arc;

use hv_control::agent_client::GrpcAgentClient;
use hv_control::{ControlConfig, ControlPlaneService};
use hv_controller::cluster_service::ClusterRpc;
use hv_controller::compute_service::ComputeRpc;
use hv_controller::ControllerConfig;
use hv_proto::v1::cluster_service_server::ClusterServiceServer;
use hv_proto::v1::compute_service_server::ComputeServiceServer;
use hv_scheduler::SchedulerConfig;
use hv_store::Store;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hv_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ControllerConfig::from_env();
    tracing::info!(
        grpc_listen_addr = %config.grpc_listen_addr,
        health_listen_addr = %config.health_listen_addr,
        etcd_endpoints = ?config.etcd_endpoints,
        "controller configuration loaded"
    );

    if config.etcd_endpoints.is_empty() {
        tracing::warn!("no HV_ETCD_ENDPOINTS set; running with an in-memory store (development only)");
        let store = Arc::new(hv_store::InMemoryStore::new());
        run(store, config).await
    } else {
        let store = Arc::new(hv_store::EtcdStore::connect(&config.etcd_endpoints, None).await?);
        run(store, config).await
    }
}

async fn run<S: Store + 'static>(
    store: Arc<S>,
    config: ControllerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let control = Arc::new(ControlPlaneService::new(
        store,
        Arc::new(GrpcAgentClient::new()),
        ControlConfig::from_env(),
        SchedulerConfig::default(),
    ));

    let grpc_addr: std::net::SocketAddr = config.grpc_listen_addr.parse()?;
    let grpc_control = control.clone();
    let grpc_server = tokio::spawn(async move {
        tracing::info!(%grpc_addr, "serving ClusterService and ComputeService");
        Server::builder()
            .add_service(ClusterServiceServer::new(ClusterRpc::new(grpc_control.clone())))
            .add_service(ComputeServiceServer::new(ComputeRpc::new(grpc_control)))
            .serve(grpc_addr)
            .await
    });

    let reconcile_control = control.clone();
    let reconcile_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reconcile_control.config().reconciliation_interval);
        loop {
            ticker.tick().await;
            match reconcile_control.reconcile_once().await {
                Ok(0) => {}
                Ok(corrected) => tracing::info!(corrected, "reconciliation pass corrected divergent instances"),
                Err(e) => tracing::warn!(error = %e, "reconciliation pass failed"),
            }
        }
    });

    let purge_control = control.clone();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_control.config().tombstone_retention);
        loop {
            ticker.tick().await;
            match purge_control.purge_tombstones_once().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "tombstone sweep purged deleted instances"),
                Err(e) => tracing::warn!(error = %e, "tombstone sweep failed"),
            }
        }
    });

    let health_addr: std::net::SocketAddr = config.health_listen_addr.parse()?;
    let health_router = hv_controller::health::router(control, &config);
    let health_server = tokio::spawn(async move {
        tracing::info!(%health_addr, "serving health sidecar");
        let listener = tokio::net::TcpListener::bind(health_addr).await?;
        axum::serve(listener, health_router).await
    });

    tokio::select! {
        result = grpc_server => { result??; }
        result = health_server => { result??; }
        result = reconcile_task => { result?; }
        result = purge_task => { result?; }
    }

    Ok(())
}
