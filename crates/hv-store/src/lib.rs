//! Coordination-store access for the control plane.
//!
//! This crate is the only place in the workspace that is allowed to know
//! about etcd (§2): the controller links it directly, the agent does not
//! link it at all and instead reaches the controller over `hv-proto`'s
//! gRPC surface.
//!
//! ```text
//! controller ──Store trait──> EtcdStore ──etcd-client──> etcd cluster
//!                      \
//!                       `──> InMemoryStore  (tests only)
//! ```
//!
//! Every record is versioned CBOR (see [`codec`]); node records are
//! lease-attached so an agent's disappearance is detected by lease expiry
//! rather than a liveness poll, and instance/hint records are written
//! through compare-and-swap against the coordination store's own
//! mod-revision so concurrent controllers never silently clobber one
//! another.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod etcd;
pub mod keys;
pub mod memory;
pub mod model;
pub mod store_trait;

pub use error::{Result, StoreError};
pub use etcd::EtcdStore;
pub use memory::InMemoryStore;
pub use model::{
    InstanceFilter, NodeDescriptor, NodeFilter, NodeHeartbeatUpdate, RegisterOutcome, WatchEvent,
};
pub use store_trait::Store;
