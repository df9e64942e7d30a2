//! Domain types shared by the controller, the agent, and the coordination
//! store layer: nodes, instances, leases, and scheduler hints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, NodeId};

/// A node's role in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Runs control-plane services.
    Master,
    /// Runs instances.
    Worker,
}

/// A node's admission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Passed filtering and may be scheduled onto.
    Ready,
    /// Failed its last heartbeat check or reports an unhealthy condition.
    NotReady,
    /// Administratively excluded from scheduling, existing instances untouched.
    Maintenance,
    /// Being evacuated; the scheduler must not place new instances here.
    Draining,
}

/// The family of compute an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    /// A traditional virtual machine.
    Vm,
    /// A container.
    Container,
    /// A lightweight, kernel-per-guest microVM.
    MicroVm,
}

/// Tri-state condition status, mirroring Kubernetes-style node conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be evaluated.
    Unknown,
}

/// A single observed node condition (disk pressure, driver health, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    /// Condition name, e.g. `"DriverReady"`.
    pub condition_type: String,
    /// Current tri-state value.
    pub status: ConditionStatus,
    /// Short machine-readable reason code.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
    /// When this condition last flipped value.
    pub last_transition: DateTime<Utc>,
}

/// A resource vector: cpu, memory, disk, and gpu quantities.
///
/// All componentwise comparisons (`fits`, ordering by utilisation) operate
/// on this type; it never carries a negative quantity, so subtraction
/// saturates at zero rather than panicking or wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// CPU demand or capacity, in thousandths of a core.
    pub cpu_millicores: u64,
    /// Memory, in bytes.
    pub memory_bytes: u64,
    /// Disk, in bytes.
    pub disk_bytes: u64,
    /// Number of GPUs.
    pub gpu_count: u32,
}

impl Resources {
    /// Whether `self` (a demand) fits within `available` componentwise.
    #[must_use]
    pub const fn fits(&self, available: &Self) -> bool {
        self.cpu_millicores <= available.cpu_millicores
            && self.memory_bytes <= available.memory_bytes
            && self.disk_bytes <= available.disk_bytes
            && self.gpu_count <= available.gpu_count
    }

    /// Componentwise saturating addition.
    #[must_use]
    pub const fn saturating_add(&self, other: &Self) -> Self {
        Self {
            cpu_millicores: self.cpu_millicores.saturating_add(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            disk_bytes: self.disk_bytes.saturating_add(other.disk_bytes),
            gpu_count: self.gpu_count.saturating_add(other.gpu_count),
        }
    }

    /// Componentwise saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            cpu_millicores: self.cpu_millicores.saturating_sub(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            disk_bytes: self.disk_bytes.saturating_sub(other.disk_bytes),
            gpu_count: self.gpu_count.saturating_sub(other.gpu_count),
        }
    }
}

/// A compute node: identity, topology, capacity, and observed health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity, immutable after creation.
    pub id: NodeId,
    /// Human-readable hostname.
    pub hostname: String,
    /// Reachable `host:port` the controller dials for the agent RPC surface.
    pub address: String,
    /// Role within the cluster.
    pub role: NodeRole,
    /// Region label.
    pub region: String,
    /// Zone label.
    pub zone: String,
    /// Free-form topology/selection labels.
    pub labels: BTreeMap<String, String>,
    /// Total physical capacity.
    pub capacity: Resources,
    /// Capacity minus any operator-imposed reservation; the scheduler's fit
    /// check is always against this field, never `capacity` directly.
    pub allocatable: Resources,
    /// Sum of `spec.demand` over every live instance placed here.
    pub allocated: Resources,
    /// Instance kinds this node's agent can drive.
    pub supported_kinds: Vec<InstanceKind>,
    /// Observed health conditions.
    pub conditions: Vec<NodeCondition>,
    /// Current admission status.
    pub status: NodeStatus,
    /// When the node record was first created.
    pub created_at: DateTime<Utc>,
    /// The most recent heartbeat timestamp.
    pub last_seen_at: DateTime<Utc>,
}

impl Node {
    /// Whether `self.allocated` stays within `self.allocatable` after
    /// hypothetically adding `demand` (§8 invariant).
    #[must_use]
    pub const fn can_admit(&self, demand: &Resources) -> bool {
        let projected = self.allocated.saturating_add(demand);
        projected.fits(&self.allocatable)
    }
}

/// A disk attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Logical name, unique within the instance.
    pub name: String,
    /// Image or volume reference.
    pub source: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// The desired shape of an instance, as given at creation time.
///
/// Immutable after creation except for `labels`/`annotations` (§3 invariant).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Image reference (container image, VM disk image, or microVM rootfs).
    pub image: String,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// Ordered disk list.
    pub disks: Vec<DiskSpec>,
    /// Network attachment references (opaque to the scheduler).
    pub network_attachments: Vec<String>,
    /// Kernel image path, for `vm`/`microvm` kinds.
    pub kernel: Option<String>,
    /// Initrd path, for `vm`/`microvm` kinds.
    pub initrd: Option<String>,
    /// Kernel command line, for `vm`/`microvm` kinds.
    pub cmdline: Option<String>,
    /// Entrypoint command, for `container` kind.
    pub command: Vec<String>,
    /// Entrypoint arguments, for `container` kind.
    pub args: Vec<String>,
    /// Environment variables, for `container` kind.
    pub env: BTreeMap<String, String>,
    /// Resource demand / limits.
    pub limits: Resources,
}

/// Optional placement hints supplied alongside a create request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlacementPrefs {
    /// A specific node to prefer; used directly if it passes filtering.
    pub preferred_node_id: Option<NodeId>,
    /// Required region, if any.
    pub region: Option<String>,
    /// Required zone, if any.
    pub zone: Option<String>,
    /// Labels the chosen node must carry.
    pub label_selector: BTreeMap<String, String>,
    /// Opt-in: spread instances carrying this label away from each other.
    pub anti_affinity_label: Option<String>,
    /// Opt-in: prefer the same zone as this existing instance.
    pub topology_peer: Option<InstanceId>,
}

/// The lifecycle state of an instance (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Accepted and scheduled, not yet dispatched to an agent.
    Pending,
    /// Dispatched; awaiting the agent's create acknowledgement.
    Creating,
    /// The driver reports the instance alive.
    Running,
    /// Stopped, either by request or because the driver reported exit.
    Stopped,
    /// Terminal failure; carries a reason in `state_reason`.
    Failed,
    /// Tombstoned; retained briefly so watchers observe the terminal event.
    Deleted,
}

/// A unit of compute under end-to-end management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Controller-assigned identity.
    pub id: InstanceId,
    /// Caller-supplied name, unique per `owner`.
    pub name: String,
    /// Opaque caller identity used only to scope name uniqueness.
    pub owner: String,
    /// Compute family.
    pub kind: InstanceKind,
    /// Immutable (mostly) desired shape.
    pub spec: InstanceSpec,
    /// Chosen node, set once scheduling succeeds.
    pub placement: Option<NodeId>,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Free-form explanation for the current state (especially `failed`).
    pub state_reason: String,
    /// Observed guest IP, once known.
    pub observed_ip: Option<std::net::IpAddr>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the instance first reached `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the instance was tombstoned by `DeleteInstance`; the purge sweep
    /// removes the record once `tombstone_retention` has elapsed past this
    /// (§4.2 tombstones). `None` for any instance that hasn't been deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Mutable labels.
    pub labels: BTreeMap<String, String>,
    /// Mutable annotations.
    pub annotations: BTreeMap<String, String>,
}

impl Instance {
    /// Whether this instance is in a terminal state (§4.2 state machine).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.state, InstanceState::Deleted)
    }
}

/// Runtime counters reported by a driver for a single instance (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceStats {
    /// Instantaneous CPU utilisation, 0.0-100.0 per core.
    pub cpu_percent: f64,
    /// Cumulative CPU time in nanoseconds.
    pub cpu_ns: u64,
    /// Resident memory in bytes.
    pub memory_used_bytes: u64,
    /// Page cache memory in bytes.
    pub memory_cache_bytes: u64,
    /// Cumulative disk bytes read.
    pub disk_read_bytes: u64,
    /// Cumulative disk bytes written.
    pub disk_write_bytes: u64,
    /// Cumulative network bytes received.
    pub net_rx_bytes: u64,
    /// Cumulative network bytes transmitted.
    pub net_tx_bytes: u64,
    /// When these counters were sampled.
    pub collected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(cpu: u64, mem: u64) -> Resources {
        Resources {
            cpu_millicores: cpu,
            memory_bytes: mem,
            disk_bytes: 0,
            gpu_count: 0,
        }
    }

    #[test]
    fn resources_fit_componentwise() {
        let available = demand(8000, 16 * 1024 * 1024 * 1024);
        assert!(demand(4000, 8 * 1024 * 1024 * 1024).fits(&available));
        assert!(!demand(9000, 1).fits(&available));
    }

    #[test]
    fn resources_saturate_on_subtract() {
        let a = demand(1, 1);
        let b = demand(5, 5);
        let result = a.saturating_sub(&b);
        assert_eq!(result.cpu_millicores, 0);
        assert_eq!(result.memory_bytes, 0);
    }

    #[test]
    fn node_can_admit_respects_allocatable() {
        let mut node = sample_node();
        node.allocatable = demand(8000, 16 * 1024 * 1024 * 1024);
        node.allocated = demand(4000, 8 * 1024 * 1024 * 1024);
        assert!(node.can_admit(&demand(4000, 8 * 1024 * 1024 * 1024)));
        assert!(!node.can_admit(&demand(4001, 0)));
    }

    #[test]
    fn instance_terminal_only_when_deleted() {
        let mut instance = sample_instance();
        instance.state = InstanceState::Failed;
        assert!(!instance.is_terminal());
        instance.state = InstanceState::Deleted;
        assert!(instance.is_terminal());
    }

    fn sample_node() -> Node {
        Node {
            id: NodeId::generate(),
            hostname: "node-1".into(),
            address: "10.0.0.1:7443".into(),
            role: NodeRole::Worker,
            region: "us-west".into(),
            zone: "us-west-1a".into(),
            labels: BTreeMap::new(),
            capacity: Resources::default(),
            allocatable: Resources::default(),
            allocated: Resources::default(),
            supported_kinds: vec![InstanceKind::Vm],
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    fn sample_instance() -> Instance {
        Instance {
            id: InstanceId::generate(),
            name: "a".into(),
            owner: "tester".into(),
            kind: InstanceKind::Vm,
            spec: InstanceSpec::default(),
            placement: None,
            state: InstanceState::Pending,
            state_reason: String::new(),
            observed_ip: None,
            created_at: Utc::now(),
            started_at: None,
            deleted_at: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}
