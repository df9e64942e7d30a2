//! Agent configuration, read from the environment (§6 agent configuration
//! keys), in the style of `SchedulerConfig::from_env`.

use std::collections::BTreeMap;
use std::time::Duration;

use hv_core::{InstanceKind, NodeRole};

/// Everything the agent needs to register, heartbeat, and serve its RPC
/// surface.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Reported hostname for the node record.
    pub hostname: String,
    /// `host:port` the controller dials for `AgentService`; also the bind
    /// address for this agent's own server unless overridden.
    pub address: String,
    /// `host:port` this process binds `AgentService` on.
    pub bind_address: String,
    /// `host:port` of the controller's `ClusterService`.
    pub controller_address: String,
    /// Node role reported at registration.
    pub role: NodeRole,
    /// Region label.
    pub region: String,
    /// Zone label.
    pub zone: String,
    /// Free-form topology/selection labels.
    pub labels: BTreeMap<String, String>,
    /// Instance kinds this agent's drivers can serve.
    pub supported_kinds: Vec<InstanceKind>,
    /// Heartbeat cadence to request; the controller's response is
    /// authoritative once registration succeeds (§4.1).
    pub heartbeat_interval: Duration,
    /// Lease TTL to request; the controller's response is authoritative.
    pub lease_ttl: Duration,
    /// How often the agent lists driver state to refresh its view of
    /// `allocated` resources ahead of the next heartbeat (§4.2 reconciliation).
    pub reconciliation_interval: Duration,
    /// Docker connection URI for the container driver (`None` uses the
    /// platform default socket / `DOCKER_HOST`).
    pub docker_uri: Option<String>,
}

impl AgentConfig {
    /// Build configuration from environment variables, falling back to
    /// sensible defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let hostname = std::env::var("HV_AGENT_HOSTNAME").unwrap_or_else(|_| {
            hostname_fallback()
        });
        let address = std::env::var("HV_AGENT_ADDRESS").unwrap_or_else(|_| "0.0.0.0:7444".into());
        let bind_address =
            std::env::var("HV_AGENT_BIND_ADDRESS").unwrap_or_else(|_| address.clone());
        let controller_address = std::env::var("HV_CONTROLLER_ADDRESS")
            .unwrap_or_else(|_| "http://127.0.0.1:7443".into());
        let role = match std::env::var("HV_AGENT_ROLE").as_deref() {
            Ok("master") => NodeRole::Master,
            _ => NodeRole::Worker,
        };
        let region = std::env::var("HV_AGENT_REGION").unwrap_or_else(|_| "default".into());
        let zone = std::env::var("HV_AGENT_ZONE").unwrap_or_else(|_| "default".into());
        let labels = std::env::var("HV_AGENT_LABELS")
            .ok()
            .map(|raw| parse_labels(&raw))
            .unwrap_or_default();
        let supported_kinds = std::env::var("HV_AGENT_SUPPORTED_KINDS")
            .ok()
            .map(|raw| parse_kinds(&raw))
            .unwrap_or_else(|| vec![InstanceKind::Container]);
        let heartbeat_interval = std::env::var("HV_AGENT_HEARTBEAT_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(10), Duration::from_secs);
        let lease_ttl = std::env::var("HV_AGENT_LEASE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(30), Duration::from_secs);
        let reconciliation_interval = std::env::var("HV_AGENT_RECONCILIATION_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(30), Duration::from_secs);
        let docker_uri = std::env::var("HV_AGENT_DOCKER_URI").ok();

        Self {
            hostname,
            address,
            bind_address,
            controller_address,
            role,
            region,
            zone,
            labels,
            supported_kinds,
            heartbeat_interval,
            lease_ttl,
            reconciliation_interval,
            docker_uri,
        }
    }
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".into())
}

fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn parse_kinds(raw: &str) -> Vec<InstanceKind> {
    raw.split(',')
        .filter_map(|token| match token.trim() {
            "vm" => Some(InstanceKind::Vm),
            "container" => Some(InstanceKind::Container),
            "microvm" => Some(InstanceKind::MicroVm),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_labels() {
        let labels = parse_labels("rack=3, tier = gpu");
        assert_eq!(labels.get("rack").map(String::as_str), Some("3"));
        assert_eq!(labels.get("tier").map(String::as_str), Some("gpu"));
    }

    #[test]
    fn parses_supported_kinds_and_skips_unknown() {
        let kinds = parse_kinds("container,vm,bogus");
        assert_eq!(kinds, vec![InstanceKind::Container, InstanceKind::Vm]);
    }
}
