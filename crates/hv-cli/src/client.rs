//! Thin gRPC client wrapping the controller's `ClusterService` and
//! `ComputeService` surfaces over a single channel.

use hv_proto::v1::cluster_service_client::ClusterServiceClient;
use hv_proto::v1::compute_service_client::ComputeServiceClient;
use tonic::transport::Channel;

use crate::error::CliError;

/// Dials the controller once and hands out clients for both services over
/// the same connection.
#[derive(Clone)]
pub struct ControlClient {
    cluster: ClusterServiceClient<Channel>,
    compute: ComputeServiceClient<Channel>,
}

impl ControlClient {
    /// Connect to a controller at `addr` (e.g. `http://127.0.0.1:7443`).
    pub async fn connect(addr: &str) -> Result<Self, CliError> {
        let channel = Channel::from_shared(addr.to_string())
            .map_err(|e| CliError::usage(format!("invalid controller address: {e}")))?
            .connect()
            .await?;
        Ok(Self {
            cluster: ClusterServiceClient::new(channel.clone()),
            compute: ComputeServiceClient::new(channel),
        })
    }

    pub fn cluster(&mut self) -> &mut ClusterServiceClient<Channel> {
        &mut self.cluster
    }

    pub fn compute(&mut self) -> &mut ComputeServiceClient<Channel> {
        &mut self.compute
    }
}
