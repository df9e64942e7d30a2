//! Controller configuration, read from the environment (§6).

use std::time::Duration;

/// Everything the controller binary needs to dial etcd and serve its two
/// gRPC services plus the health sidecar.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// `host:port` the gRPC server (`ClusterService`/`ComputeService`) binds.
    pub grpc_listen_addr: String,
    /// `host:port` the health sidecar binds.
    pub health_listen_addr: String,
    /// Comma-separated etcd endpoints. Empty uses the in-memory store,
    /// intended for local development and tests only.
    pub etcd_endpoints: Vec<String>,
    /// Allowed CORS origins for the health sidecar.
    pub cors_origins: Vec<String>,
    /// Request timeout applied to the health sidecar.
    pub request_timeout_seconds: u64,
}

impl ControllerConfig {
    fn default_grpc_listen_addr() -> String {
        "0.0.0.0:7443".to_string()
    }

    fn default_health_listen_addr() -> String {
        "0.0.0.0:8081".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Build configuration from environment variables, falling back to
    /// sensible defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let grpc_listen_addr =
            std::env::var("HV_GRPC_LISTEN_ADDR").unwrap_or_else(|_| Self::default_grpc_listen_addr());
        let health_listen_addr = std::env::var("HV_HEALTH_LISTEN_ADDR")
            .unwrap_or_else(|_| Self::default_health_listen_addr());
        let etcd_endpoints = std::env::var("HV_ETCD_ENDPOINTS")
            .ok()
            .map(|raw| raw.split(',').map(str::trim).map(String::from).collect())
            .unwrap_or_default();
        let cors_origins = std::env::var("HV_CORS_ORIGINS")
            .ok()
            .map(|raw| raw.split(',').map(str::trim).map(String::from).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);
        let request_timeout_seconds = std::env::var("HV_HEALTH_REQUEST_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(Self::default_request_timeout);

        Self {
            grpc_listen_addr,
            health_listen_addr,
            etcd_endpoints,
            cors_origins,
            request_timeout_seconds,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grpc_listen_addr: Self::default_grpc_listen_addr(),
            health_listen_addr: Self::default_health_listen_addr(),
            etcd_endpoints: Vec::new(),
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_in_memory_store() {
        let config = ControllerConfig::default();
        assert!(config.etcd_endpoints.is_empty());
        assert_eq!(config.grpc_listen_addr, "0.0.0.0:7443");
    }

    #[test]
    fn timeout_duration() {
        let config = ControllerConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
