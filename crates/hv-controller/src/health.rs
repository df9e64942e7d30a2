//! Liveness/readiness sidecar, served over plain HTTP alongside the gRPC
//! surface so orchestrators that expect a `/healthz` endpoint (not gRPC
//! health checking) can probe the controller.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hv_control::ControlPlane;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ControllerConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    node_count: u32,
    instance_count: u32,
}

async fn readyz<C: ControlPlane + 'static>(State(control): State<Arc<C>>) -> impl IntoResponse {
    match control.cluster_info().await {
        Ok(info) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                node_count: info.node_count,
                instance_count: info.instance_count,
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed to reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    node_count: 0,
                    instance_count: 0,
                }),
            )
                .into_response()
        }
    }
}

/// Build the health sidecar router, backed by `control` for `/readyz`.
pub fn router<C: ControlPlane + 'static>(control: Arc<C>, config: &ControllerConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<C>))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .with_state(control)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn cors_any_origin() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[test]
    fn cors_specific_origins() {
        let _layer = build_cors_layer(&["https://console.example.com".to_string()]);
    }
}
