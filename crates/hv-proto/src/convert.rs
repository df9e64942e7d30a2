//! Conversions between the wire types generated from `hv.proto` and the
//! process-local domain types in `hv-core`.
//!
//! Coordination-store revisions are not part of the domain type itself, so
//! `Node`/`Instance` conversions take or return the revision alongside the
//! value rather than folding it into a `From` impl.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use hv_core::{
    ConditionStatus, DiskSpec, Error, Instance, InstanceId, InstanceKind, InstanceSpec,
    InstanceState, InstanceStats, Node, NodeCondition, NodeId, NodeRole, NodeStatus,
    PlacementPrefs, Resources, Revision,
};

use crate::v1;

fn to_timestamp(dt: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos().try_into().unwrap_or(0),
    }
}

fn from_timestamp(ts: prost_types::Timestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.seconds, u32::try_from(ts.nanos).unwrap_or(0))
        .single()
        .unwrap_or_else(Utc::now)
}

fn parse_node_id(raw: &str) -> Result<NodeId, Error> {
    NodeId::from_str(raw).map_err(Error::from)
}

fn parse_instance_id(raw: &str) -> Result<InstanceId, Error> {
    InstanceId::from_str(raw).map_err(Error::from)
}

impl From<Resources> for v1::Resources {
    fn from(r: Resources) -> Self {
        Self {
            cpu_millicores: r.cpu_millicores,
            memory_bytes: r.memory_bytes,
            disk_bytes: r.disk_bytes,
            gpu_count: r.gpu_count,
        }
    }
}

impl From<v1::Resources> for Resources {
    fn from(r: v1::Resources) -> Self {
        Self {
            cpu_millicores: r.cpu_millicores,
            memory_bytes: r.memory_bytes,
            disk_bytes: r.disk_bytes,
            gpu_count: r.gpu_count,
        }
    }
}

impl From<NodeRole> for v1::NodeRole {
    fn from(role: NodeRole) -> Self {
        match role {
            NodeRole::Master => Self::Master,
            NodeRole::Worker => Self::Worker,
        }
    }
}

impl TryFrom<v1::NodeRole> for NodeRole {
    type Error = Error;

    fn try_from(role: v1::NodeRole) -> Result<Self, Self::Error> {
        match role {
            v1::NodeRole::Master => Ok(Self::Master),
            v1::NodeRole::Worker => Ok(Self::Worker),
            v1::NodeRole::Unspecified => {
                Err(Error::invalid_argument("node role must be specified"))
            }
        }
    }
}

impl From<NodeStatus> for v1::NodeStatus {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Ready => Self::Ready,
            NodeStatus::NotReady => Self::NotReady,
            NodeStatus::Maintenance => Self::Maintenance,
            NodeStatus::Draining => Self::Draining,
        }
    }
}

impl TryFrom<v1::NodeStatus> for NodeStatus {
    type Error = Error;

    fn try_from(status: v1::NodeStatus) -> Result<Self, Self::Error> {
        match status {
            v1::NodeStatus::Ready => Ok(Self::Ready),
            v1::NodeStatus::NotReady => Ok(Self::NotReady),
            v1::NodeStatus::Maintenance => Ok(Self::Maintenance),
            v1::NodeStatus::Draining => Ok(Self::Draining),
            v1::NodeStatus::Unspecified => {
                Err(Error::invalid_argument("node status must be specified"))
            }
        }
    }
}

impl From<InstanceKind> for v1::InstanceKind {
    fn from(kind: InstanceKind) -> Self {
        match kind {
            InstanceKind::Vm => Self::Vm,
            InstanceKind::Container => Self::Container,
            InstanceKind::MicroVm => Self::Microvm,
        }
    }
}

impl TryFrom<v1::InstanceKind> for InstanceKind {
    type Error = Error;

    fn try_from(kind: v1::InstanceKind) -> Result<Self, Self::Error> {
        match kind {
            v1::InstanceKind::Vm => Ok(Self::Vm),
            v1::InstanceKind::Container => Ok(Self::Container),
            v1::InstanceKind::Microvm => Ok(Self::MicroVm),
            v1::InstanceKind::Unspecified => {
                Err(Error::invalid_argument("instance kind must be specified"))
            }
        }
    }
}

impl From<InstanceState> for v1::InstanceState {
    fn from(state: InstanceState) -> Self {
        match state {
            InstanceState::Pending => Self::Pending,
            InstanceState::Creating => Self::Creating,
            InstanceState::Running => Self::Running,
            InstanceState::Stopped => Self::Stopped,
            InstanceState::Failed => Self::Failed,
            InstanceState::Deleted => Self::Deleted,
        }
    }
}

impl TryFrom<v1::InstanceState> for InstanceState {
    type Error = Error;

    fn try_from(state: v1::InstanceState) -> Result<Self, Self::Error> {
        match state {
            v1::InstanceState::Pending => Ok(Self::Pending),
            v1::InstanceState::Creating => Ok(Self::Creating),
            v1::InstanceState::Running => Ok(Self::Running),
            v1::InstanceState::Stopped => Ok(Self::Stopped),
            v1::InstanceState::Failed => Ok(Self::Failed),
            v1::InstanceState::Deleted => Ok(Self::Deleted),
            v1::InstanceState::Unspecified => {
                Err(Error::invalid_argument("instance state must be specified"))
            }
        }
    }
}

impl From<ConditionStatus> for v1::ConditionStatus {
    fn from(status: ConditionStatus) -> Self {
        match status {
            ConditionStatus::True => Self::True,
            ConditionStatus::False => Self::False,
            ConditionStatus::Unknown => Self::Unknown,
        }
    }
}

impl From<v1::ConditionStatus> for ConditionStatus {
    fn from(status: v1::ConditionStatus) -> Self {
        match status {
            v1::ConditionStatus::True => Self::True,
            v1::ConditionStatus::False => Self::False,
            v1::ConditionStatus::Unknown | v1::ConditionStatus::Unspecified => Self::Unknown,
        }
    }
}

impl From<NodeCondition> for v1::NodeCondition {
    fn from(c: NodeCondition) -> Self {
        Self {
            condition_type: c.condition_type,
            status: v1::ConditionStatus::from(c.status) as i32,
            reason: c.reason,
            message: c.message,
            last_transition: Some(to_timestamp(c.last_transition)),
        }
    }
}

impl TryFrom<v1::NodeCondition> for NodeCondition {
    type Error = Error;

    fn try_from(c: v1::NodeCondition) -> Result<Self, Self::Error> {
        let status = v1::ConditionStatus::try_from(c.status)
            .unwrap_or(v1::ConditionStatus::Unspecified)
            .into();
        Ok(Self {
            condition_type: c.condition_type,
            status,
            reason: c.reason,
            message: c.message,
            last_transition: c.last_transition.map(from_timestamp).unwrap_or_else(Utc::now),
        })
    }
}

impl From<DiskSpec> for v1::DiskSpec {
    fn from(d: DiskSpec) -> Self {
        Self {
            name: d.name,
            source: d.source,
            size_bytes: d.size_bytes,
        }
    }
}

impl From<v1::DiskSpec> for DiskSpec {
    fn from(d: v1::DiskSpec) -> Self {
        Self {
            name: d.name,
            source: d.source,
            size_bytes: d.size_bytes,
        }
    }
}

impl From<InstanceSpec> for v1::InstanceSpec {
    fn from(s: InstanceSpec) -> Self {
        Self {
            image: s.image,
            vcpus: s.vcpus,
            memory_bytes: s.memory_bytes,
            disks: s.disks.into_iter().map(v1::DiskSpec::from).collect(),
            network_attachments: s.network_attachments,
            kernel: s.kernel,
            initrd: s.initrd,
            cmdline: s.cmdline,
            command: s.command,
            args: s.args,
            env: s.env.into_iter().collect(),
            limits: Some(s.limits.into()),
        }
    }
}

impl From<v1::InstanceSpec> for InstanceSpec {
    fn from(s: v1::InstanceSpec) -> Self {
        Self {
            image: s.image,
            vcpus: s.vcpus,
            memory_bytes: s.memory_bytes,
            disks: s.disks.into_iter().map(DiskSpec::from).collect(),
            network_attachments: s.network_attachments,
            kernel: s.kernel,
            initrd: s.initrd,
            cmdline: s.cmdline,
            command: s.command,
            args: s.args,
            env: s.env.into_iter().collect::<BTreeMap<_, _>>(),
            limits: s.limits.map(Resources::from).unwrap_or_default(),
        }
    }
}

impl From<PlacementPrefs> for v1::PlacementPrefs {
    fn from(p: PlacementPrefs) -> Self {
        Self {
            preferred_node_id: p.preferred_node_id.map(|id| id.to_string()),
            region: p.region,
            zone: p.zone,
            label_selector: p.label_selector.into_iter().collect(),
            anti_affinity_label: p.anti_affinity_label,
            topology_peer: p.topology_peer.map(|id| id.to_string()),
        }
    }
}

impl TryFrom<v1::PlacementPrefs> for PlacementPrefs {
    type Error = Error;

    fn try_from(p: v1::PlacementPrefs) -> Result<Self, Self::Error> {
        Ok(Self {
            preferred_node_id: p
                .preferred_node_id
                .map(|id| parse_node_id(&id))
                .transpose()?,
            region: p.region,
            zone: p.zone,
            label_selector: p.label_selector.into_iter().collect(),
            anti_affinity_label: p.anti_affinity_label,
            topology_peer: p
                .topology_peer
                .map(|id| parse_instance_id(&id))
                .transpose()?,
        })
    }
}

/// Convert a domain [`Node`] into its wire representation, stamping the
/// coordination-store revision it was read at.
#[must_use]
pub fn node_to_proto(node: &Node, revision: Revision) -> v1::Node {
    v1::Node {
        id: node.id.to_string(),
        hostname: node.hostname.clone(),
        address: node.address.clone(),
        role: v1::NodeRole::from(node.role) as i32,
        region: node.region.clone(),
        zone: node.zone.clone(),
        labels: node.labels.clone().into_iter().collect(),
        capacity: Some(node.capacity.into()),
        allocatable: Some(node.allocatable.into()),
        allocated: Some(node.allocated.into()),
        supported_kinds: node
            .supported_kinds
            .iter()
            .map(|k| v1::InstanceKind::from(*k) as i32)
            .collect(),
        conditions: node
            .conditions
            .iter()
            .cloned()
            .map(v1::NodeCondition::from)
            .collect(),
        status: v1::NodeStatus::from(node.status) as i32,
        created_at: Some(to_timestamp(node.created_at)),
        last_seen_at: Some(to_timestamp(node.last_seen_at)),
        revision: revision.as_raw(),
    }
}

/// Convert a wire [`v1::Node`] back into the domain type plus the revision
/// it was tagged with.
pub fn node_from_proto(node: v1::Node) -> Result<(Node, Revision), Error> {
    let role = v1::NodeRole::try_from(node.role)
        .unwrap_or(v1::NodeRole::Unspecified)
        .try_into()?;
    let status = v1::NodeStatus::try_from(node.status)
        .unwrap_or(v1::NodeStatus::Unspecified)
        .try_into()?;
    let supported_kinds = node
        .supported_kinds
        .into_iter()
        .map(|k| {
            v1::InstanceKind::try_from(k)
                .unwrap_or(v1::InstanceKind::Unspecified)
                .try_into()
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let conditions = node
        .conditions
        .into_iter()
        .map(NodeCondition::try_from)
        .collect::<Result<Vec<_>, Error>>()?;
    let domain = Node {
        id: parse_node_id(&node.id)?,
        hostname: node.hostname,
        address: node.address,
        role,
        region: node.region,
        zone: node.zone,
        labels: node.labels.into_iter().collect(),
        capacity: node.capacity.map(Resources::from).unwrap_or_default(),
        allocatable: node.allocatable.map(Resources::from).unwrap_or_default(),
        allocated: node.allocated.map(Resources::from).unwrap_or_default(),
        supported_kinds,
        conditions,
        status,
        created_at: node.created_at.map(from_timestamp).unwrap_or_else(Utc::now),
        last_seen_at: node
            .last_seen_at
            .map(from_timestamp)
            .unwrap_or_else(Utc::now),
    };
    Ok((domain, Revision::from_raw(node.revision)))
}

/// Convert a domain [`Instance`] into its wire representation, stamping the
/// coordination-store revision it was read at.
#[must_use]
pub fn instance_to_proto(instance: &Instance, revision: Revision) -> v1::Instance {
    v1::Instance {
        id: instance.id.to_string(),
        name: instance.name.clone(),
        owner: instance.owner.clone(),
        kind: v1::InstanceKind::from(instance.kind) as i32,
        spec: Some(instance.spec.clone().into()),
        placement: instance.placement.map(|id| id.to_string()),
        state: v1::InstanceState::from(instance.state) as i32,
        state_reason: instance.state_reason.clone(),
        observed_ip: instance.observed_ip.map(|ip| ip.to_string()),
        created_at: Some(to_timestamp(instance.created_at)),
        started_at: instance.started_at.map(to_timestamp),
        labels: instance.labels.clone().into_iter().collect(),
        annotations: instance.annotations.clone().into_iter().collect(),
        revision: revision.as_raw(),
        deleted_at: instance.deleted_at.map(to_timestamp),
    }
}

/// Convert a wire [`v1::Instance`] back into the domain type plus the
/// revision it was tagged with.
pub fn instance_from_proto(instance: v1::Instance) -> Result<(Instance, Revision), Error> {
    let kind = v1::InstanceKind::try_from(instance.kind)
        .unwrap_or(v1::InstanceKind::Unspecified)
        .try_into()?;
    let state = v1::InstanceState::try_from(instance.state)
        .unwrap_or(v1::InstanceState::Unspecified)
        .try_into()?;
    let observed_ip = instance
        .observed_ip
        .map(|ip| {
            ip.parse()
                .map_err(|_| Error::invalid_argument("invalid observed_ip"))
        })
        .transpose()?;
    let domain = Instance {
        id: parse_instance_id(&instance.id)?,
        name: instance.name,
        owner: instance.owner,
        kind,
        spec: instance.spec.map(InstanceSpec::from).unwrap_or_default(),
        placement: instance.placement.map(|id| parse_node_id(&id)).transpose()?,
        state,
        state_reason: instance.state_reason,
        observed_ip,
        created_at: instance
            .created_at
            .map(from_timestamp)
            .unwrap_or_else(Utc::now),
        started_at: instance.started_at.map(from_timestamp),
        deleted_at: instance.deleted_at.map(from_timestamp),
        labels: instance.labels.into_iter().collect(),
        annotations: instance.annotations.into_iter().collect(),
    };
    Ok((domain, Revision::from_raw(instance.revision)))
}

impl From<InstanceStats> for v1::InstanceStats {
    fn from(s: InstanceStats) -> Self {
        Self {
            cpu_percent: s.cpu_percent,
            cpu_ns: s.cpu_ns,
            memory_used_bytes: s.memory_used_bytes,
            memory_cache_bytes: s.memory_cache_bytes,
            disk_read_bytes: s.disk_read_bytes,
            disk_write_bytes: s.disk_write_bytes,
            net_rx_bytes: s.net_rx_bytes,
            net_tx_bytes: s.net_tx_bytes,
            collected_at: Some(to_timestamp(s.collected_at)),
        }
    }
}

impl From<v1::InstanceStats> for InstanceStats {
    fn from(s: v1::InstanceStats) -> Self {
        Self {
            cpu_percent: s.cpu_percent,
            cpu_ns: s.cpu_ns,
            memory_used_bytes: s.memory_used_bytes,
            memory_cache_bytes: s.memory_cache_bytes,
            disk_read_bytes: s.disk_read_bytes,
            disk_write_bytes: s.disk_write_bytes,
            net_rx_bytes: s.net_rx_bytes,
            net_tx_bytes: s.net_tx_bytes,
            collected_at: s.collected_at.map(from_timestamp).unwrap_or_else(Utc::now),
        }
    }
}

/// Map a domain [`Error`] to the equivalent gRPC status, preserving the
/// original message (§7: "wrapping preserves the original kind").
#[must_use]
pub fn error_to_status(err: &Error) -> tonic::Status {
    use hv_core::ErrorKind as K;
    let code = match err.kind() {
        K::NotFound => tonic::Code::NotFound,
        K::AlreadyExists => tonic::Code::AlreadyExists,
        K::InvalidArgument => tonic::Code::InvalidArgument,
        K::PreconditionFailed => tonic::Code::FailedPrecondition,
        K::ResourceExhausted => tonic::Code::ResourceExhausted,
        K::Unavailable => tonic::Code::Unavailable,
        K::DeadlineExceeded => tonic::Code::DeadlineExceeded,
        K::FailedPrecondition => tonic::Code::Aborted,
        K::Internal => tonic::Code::Internal,
    };
    tonic::Status::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_node() -> Node {
        Node {
            id: NodeId::generate(),
            hostname: "n1".into(),
            address: "10.0.0.1:7443".into(),
            role: NodeRole::Worker,
            region: "us-west".into(),
            zone: "us-west-1a".into(),
            labels: BTreeMap::new(),
            capacity: Resources::default(),
            allocatable: Resources::default(),
            allocated: Resources::default(),
            supported_kinds: vec![InstanceKind::Vm, InstanceKind::Container],
            conditions: Vec::new(),
            status: NodeStatus::Ready,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn node_roundtrips_through_wire_format() {
        let node = sample_node();
        let wire = node_to_proto(&node, Revision::from_raw(7));
        let (decoded, revision) = node_from_proto(wire).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(revision, Revision::from_raw(7));
    }

    #[test]
    fn error_kinds_map_to_expected_grpc_codes() {
        assert_eq!(
            error_to_status(&Error::not_found("x")).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            error_to_status(&Error::resource_exhausted("x")).code(),
            tonic::Code::ResourceExhausted
        );
        assert_eq!(
            error_to_status(&Error::failed_precondition("x")).code(),
            tonic::Code::Aborted
        );
    }
}
