//! Controller binary internals: the gRPC server hosting `ClusterService`
//! and `ComputeService`, plus a small HTTP sidecar for liveness/readiness
//! probes (§4.1, §4.2, §6).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          hv-controller                      │
//! │  ┌─────────────────┐ ┌─────────────────┐ ┌──────────────┐ │
//! │  │  ClusterService  │ │  ComputeService  │ │  /healthz    │ │
//! │  │  (gRPC)          │ │  (gRPC)          │ │  /readyz     │ │
//! │  └─────────────────┘ └─────────────────┘ └──────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    hv_control::ControlPlaneService
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Scheduler│   │  Agent   │
//!        │  (etcd)  │   │ (native) │   │  client  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! Both gRPC services are thin RPC-transport wrappers: all business logic
//! (CAS retries, lease handling, the instance state machine) lives in
//! `hv-control` so this crate only translates wire messages to/from the
//! domain types it calls through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cluster_service;
pub mod compute_service;
pub mod config;
pub mod health;

pub use cluster_service::ClusterRpc;
pub use compute_service::ComputeRpc;
pub use config::ControllerConfig;
