//! Plain-text rendering of wire types for terminal output.

use hv_proto::v1::{Instance, InstanceKind, InstanceStats, Node, NodeRole, NodeStatus};

fn format_timestamp(ts: Option<&prost_types::Timestamp>) -> String {
    ts.and_then(|ts| chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn node_status_str(status: i32) -> &'static str {
    match NodeStatus::try_from(status).unwrap_or(NodeStatus::Unspecified) {
        NodeStatus::Unspecified => "unspecified",
        NodeStatus::Ready => "ready",
        NodeStatus::NotReady => "not-ready",
        NodeStatus::Maintenance => "maintenance",
        NodeStatus::Draining => "draining",
    }
}

fn node_role_str(role: i32) -> &'static str {
    match NodeRole::try_from(role).unwrap_or(NodeRole::Unspecified) {
        NodeRole::Unspecified => "unspecified",
        NodeRole::Master => "master",
        NodeRole::Worker => "worker",
    }
}

fn instance_kind_str(kind: i32) -> &'static str {
    match InstanceKind::try_from(kind).unwrap_or(InstanceKind::Unspecified) {
        InstanceKind::Unspecified => "unspecified",
        InstanceKind::Vm => "vm",
        InstanceKind::Container => "container",
        InstanceKind::Microvm => "microvm",
    }
}

fn instance_state_str(state: i32) -> &'static str {
    use hv_proto::v1::InstanceState;
    match InstanceState::try_from(state).unwrap_or(InstanceState::Unspecified) {
        InstanceState::Unspecified => "unspecified",
        InstanceState::Pending => "pending",
        InstanceState::Creating => "creating",
        InstanceState::Running => "running",
        InstanceState::Stopped => "stopped",
        InstanceState::Failed => "failed",
        InstanceState::Deleted => "deleted",
    }
}

/// One row per node: id, status, role, address, zone.
pub fn print_node_table(nodes: &[Node]) {
    println!("{:<36}  {:<10}  {:<8}  {:<22}  {:<10}", "ID", "STATUS", "ROLE", "ADDRESS", "ZONE");
    for node in nodes {
        println!(
            "{:<36}  {:<10}  {:<8}  {:<22}  {:<10}",
            node.id,
            node_status_str(node.status),
            node_role_str(node.role),
            node.address,
            node.zone
        );
    }
}

/// Full detail view of a single node.
pub fn print_node_detail(node: &Node) {
    println!("id:             {}", node.id);
    println!("hostname:       {}", node.hostname);
    println!("address:        {}", node.address);
    println!("role:           {}", node_role_str(node.role));
    println!("status:         {}", node_status_str(node.status));
    println!("region/zone:    {}/{}", node.region, node.zone);
    if let Some(capacity) = &node.capacity {
        println!(
            "capacity:       cpu={}m mem={}B disk={}B gpu={}",
            capacity.cpu_millicores, capacity.memory_bytes, capacity.disk_bytes, capacity.gpu_count
        );
    }
    if let Some(allocated) = &node.allocated {
        println!(
            "allocated:      cpu={}m mem={}B disk={}B gpu={}",
            allocated.cpu_millicores, allocated.memory_bytes, allocated.disk_bytes, allocated.gpu_count
        );
    }
    println!("created_at:     {}", format_timestamp(node.created_at.as_ref()));
    println!("last_seen_at:   {}", format_timestamp(node.last_seen_at.as_ref()));
    for condition in &node.conditions {
        println!(
            "condition:      {} status={} {}",
            condition.condition_type, condition.status, condition.message
        );
    }
}

/// One row per instance: id, name, state, kind, placement.
pub fn print_instance_table(instances: &[Instance]) {
    println!(
        "{:<36}  {:<20}  {:<10}  {:<10}  {:<36}",
        "ID", "NAME", "STATE", "KIND", "NODE"
    );
    for instance in instances {
        println!(
            "{:<36}  {:<20}  {:<10}  {:<10}  {:<36}",
            instance.id,
            instance.name,
            instance_state_str(instance.state),
            instance_kind_str(instance.kind),
            instance.placement.as_deref().unwrap_or("-")
        );
    }
}

/// Full detail view of a single instance.
pub fn print_instance_detail(instance: &Instance) {
    println!("id:             {}", instance.id);
    println!("name:           {}", instance.name);
    println!("owner:          {}", instance.owner);
    println!("kind:           {}", instance_kind_str(instance.kind));
    println!("state:          {}", instance_state_str(instance.state));
    if !instance.state_reason.is_empty() {
        println!("state_reason:   {}", instance.state_reason);
    }
    println!("placement:      {}", instance.placement.as_deref().unwrap_or("-"));
    println!("observed_ip:    {}", instance.observed_ip.as_deref().unwrap_or("-"));
    println!("created_at:     {}", format_timestamp(instance.created_at.as_ref()));
    println!("started_at:     {}", format_timestamp(instance.started_at.as_ref()));
    if let Some(spec) = &instance.spec {
        println!("image:          {}", spec.image);
        println!("vcpus:          {}", spec.vcpus);
        println!("memory_bytes:   {}", spec.memory_bytes);
    }
}

/// Runtime counters for a single instance.
pub fn print_instance_stats(stats: &InstanceStats) {
    println!("cpu_percent:        {:.2}", stats.cpu_percent);
    println!("cpu_ns:             {}", stats.cpu_ns);
    println!("memory_used_bytes:  {}", stats.memory_used_bytes);
    println!("memory_cache_bytes: {}", stats.memory_cache_bytes);
    println!("disk_read_bytes:    {}", stats.disk_read_bytes);
    println!("disk_write_bytes:   {}", stats.disk_write_bytes);
    println!("net_rx_bytes:       {}", stats.net_rx_bytes);
    println!("net_tx_bytes:       {}", stats.net_tx_bytes);
    println!("collected_at:       {}", format_timestamp(stats.collected_at.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_status_falls_back_to_unspecified() {
        assert_eq!(node_status_str(99), "unspecified");
    }

    #[test]
    fn known_instance_state_renders() {
        assert_eq!(instance_state_str(3), "running");
    }

    #[test]
    fn missing_timestamp_renders_as_dash() {
        assert_eq!(format_timestamp(None), "-");
    }
}
