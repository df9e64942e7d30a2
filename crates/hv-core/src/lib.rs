//! Shared types and utilities for the hypervisor control plane.
//!
//! This crate has no process affinity: it defines the identifiers, the
//! error-kind taxonomy, and the domain types (`Node`, `Instance`, `Lease`)
//! shared by the coordination-store layer, the scheduler, the controller,
//! and the agent.
//!
//! # Example
//!
//! ```
//! use hv_core::{NodeId, Resources};
//!
//! let node_id = NodeId::generate();
//! let demand = Resources {
//!     cpu_millicores: 4_000,
//!     memory_bytes: 8 * 1024 * 1024 * 1024,
//!     disk_bytes: 0,
//!     gpu_count: 0,
//! };
//! assert!(node_id.to_string().len() > 0);
//! assert!(demand.fits(&demand));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use ids::{IdError, InstanceId, LeaseId, NodeId, Revision};
pub use types::{
    ConditionStatus, DiskSpec, Instance, InstanceKind, InstanceSpec, InstanceState, InstanceStats,
    Node, NodeCondition, NodeRole, NodeStatus, PlacementPrefs, Resources,
};
