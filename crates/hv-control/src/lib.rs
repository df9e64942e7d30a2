//! Control plane: node registry, instance lifecycle, and scheduler
//! integration.
//!
//! This crate holds the business logic shared by the controller binary's
//! `ClusterService` and `ComputeService` gRPC handlers. It coordinates
//! between the coordination store (`hv-store`), the placement algorithm
//! (`hv-scheduler`), and the owning agent's RPC surface (`agent_client`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            hv-controller (ClusterService/ComputeService)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │   Node      │ │  Instance   │ │    Lifecycle        │   │
//! │  │   registry  │ │  CRUD       │ │    state machine     │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Scheduler│   │  Agent   │
//!        │  (etcd)  │   │ (native) │   │  client  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # State machine
//!
//! Instances follow the transition table in [`lifecycle`]:
//!
//! - `pending` → `creating` (agent create acknowledged)
//! - `creating` → `running` (driver reports alive)
//! - `running` → `stopped` (Stop, or agent reports exit)
//! - `stopped` → `creating` (Start)
//! - any non-terminal → `failed` (agent reports failure / unreachable)
//! - `stopped` / `failed` → `deleted` (Delete, tombstoned)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent_client;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod service;
pub mod types;

pub use agent_client::{AgentClient, AgentClientPool, GrpcAgentClient, NoopAgentClient};
pub use error::{ControlError, Result};
pub use locks::InstanceLocks;
pub use service::{ControlPlane, ControlPlaneService};
pub use types::{ClusterInfo, ControlConfig, CreateInstanceRequest, StopOptions};
