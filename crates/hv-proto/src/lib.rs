//! Generated gRPC types for the hypervisor control plane's three services
//! (`ClusterService`, `ComputeService`, `AgentService`), plus the
//! conversions between wire types and `hv-core`'s domain types.

#![allow(clippy::all, clippy::pedantic)]

/// Generated protobuf/tonic code for the `hv.v1` package.
pub mod v1 {
    tonic::include_proto!("hv.v1");
}

mod convert;

pub use convert::{
    error_to_status, instance_from_proto, instance_to_proto, node_from_proto, node_to_proto,
};
