//! Request types and tunables for control plane operations.

use std::time::Duration;

use hv_core::{InstanceKind, InstanceSpec, PlacementPrefs};
use serde::{Deserialize, Serialize};

/// Request to create a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Caller-supplied name, unique per `owner`.
    pub name: String,
    /// Opaque caller identity used only to scope name uniqueness.
    pub owner: String,
    /// Compute family.
    pub kind: InstanceKind,
    /// Desired shape.
    pub spec: InstanceSpec,
    /// Optional placement hints.
    #[serde(default)]
    pub placement_prefs: PlacementPrefs,
}

/// Options accepted by a stop request (§4.2 stop semantics).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopOptions {
    /// Destroy the instance immediately if the graceful timeout elapses.
    #[serde(default)]
    pub force: bool,
    /// How long to wait for the driver's graceful shutdown before acting
    /// on `force`.
    #[serde(default = "StopOptions::default_timeout_seconds")]
    pub timeout_seconds: u32,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            force: false,
            timeout_seconds: Self::default_timeout_seconds(),
        }
    }
}

impl StopOptions {
    const fn default_timeout_seconds() -> u32 {
        30
    }

    /// The timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds as u64)
    }
}

/// Aggregate cluster counters returned by `GetClusterInfo` (§6).
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    /// Total registered node count.
    pub node_count: u32,
    /// Nodes currently reporting `Ready`.
    pub ready_node_count: u32,
    /// Total live (non-deleted) instance count.
    pub instance_count: u32,
    /// This controller build's version string.
    pub controller_version: String,
}

/// Configuration for the control plane service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Default lease TTL handed out to newly registering nodes.
    pub node_lease_ttl: Duration,
    /// Default heartbeat cadence recommended to agents (`H < T/2`).
    pub node_heartbeat_interval: Duration,
    /// How long a `deleted` instance record is retained before being purged
    /// (§4.2 tombstones: "at least one heartbeat interval").
    pub tombstone_retention: Duration,
    /// How long the controller tolerates desired/observed divergence before
    /// issuing a corrective RPC (§4.2 reconciliation).
    pub reconciliation_interval: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            node_lease_ttl: Duration::from_secs(30),
            node_heartbeat_interval: Duration::from_secs(10),
            tombstone_retention: Duration::from_secs(10),
            reconciliation_interval: Duration::from_secs(30),
        }
    }
}

impl ControlConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let node_lease_ttl = std::env::var("HV_NODE_LEASE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.node_lease_ttl, Duration::from_secs);
        let node_heartbeat_interval = std::env::var("HV_NODE_HEARTBEAT_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.node_heartbeat_interval, Duration::from_secs);
        let reconciliation_interval = std::env::var("HV_RECONCILIATION_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.reconciliation_interval, Duration::from_secs);
        let tombstone_retention = std::env::var("HV_TOMBSTONE_RETENTION_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.tombstone_retention, Duration::from_secs);

        Self {
            node_lease_ttl,
            node_heartbeat_interval,
            reconciliation_interval,
            tombstone_retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_options_default_timeout() {
        let opts = StopOptions::default();
        assert_eq!(opts.timeout(), Duration::from_secs(30));
        assert!(!opts.force);
    }

    #[test]
    fn control_config_defaults_respect_half_ttl_rule() {
        let config = ControlConfig::default();
        assert!(config.node_heartbeat_interval * 2 < config.node_lease_ttl);
    }
}
