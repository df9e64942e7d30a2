//! An in-memory driver fake, used by agent and control-plane integration
//! tests that must not depend on a Docker daemon (§4.5, grounded in the
//! teacher's `HttpSchedulerClient`/`NoopSchedulerClient` split).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hv_core::{InstanceId, InstanceKind, InstanceSpec, InstanceState, InstanceStats};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{DriverError, Result};
use crate::trait_def::{AttachOptions, ConsoleSession, Driver, DriverHandle, HostInfo};

/// A driver that tracks instance state purely in memory, transitioning
/// instantly on every call.
pub struct FakeDriver {
    kind: InstanceKind,
    handles: RwLock<HashMap<InstanceId, DriverHandle>>,
    attached: RwLock<std::collections::HashSet<InstanceId>>,
}

impl FakeDriver {
    /// Build a fake driver reporting the given kind from [`Driver::kind`].
    #[must_use]
    pub fn new(kind: InstanceKind) -> Self {
        Self {
            kind,
            handles: RwLock::default(),
            attached: RwLock::default(),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn kind(&self) -> InstanceKind {
        self.kind
    }

    async fn create(&self, id: InstanceId, _spec: &InstanceSpec) -> Result<DriverHandle> {
        let handle = DriverHandle {
            id,
            state: InstanceState::Stopped,
            observed_ip: None,
        };
        self.handles.write().insert(id, handle.clone());
        Ok(handle)
    }

    async fn start(&self, id: InstanceId) -> Result<DriverHandle> {
        let mut handles = self.handles.write();
        let handle = handles
            .get_mut(&id)
            .ok_or_else(|| DriverError::NotFound(id.to_string()))?;
        handle.state = InstanceState::Running;
        handle.observed_ip = Some("127.0.0.1".parse().unwrap());
        Ok(handle.clone())
    }

    async fn stop(&self, id: InstanceId, _force: bool) -> Result<DriverHandle> {
        let mut handles = self.handles.write();
        let handle = handles
            .get_mut(&id)
            .ok_or_else(|| DriverError::NotFound(id.to_string()))?;
        handle.state = InstanceState::Stopped;
        handle.observed_ip = None;
        Ok(handle.clone())
    }

    async fn restart(&self, id: InstanceId, force: bool) -> Result<DriverHandle> {
        self.stop(id, force).await?;
        self.start(id).await
    }

    async fn delete(&self, id: InstanceId) -> Result<()> {
        self.handles.write().remove(&id);
        self.attached.write().remove(&id);
        Ok(())
    }

    async fn get(&self, id: InstanceId) -> Result<DriverHandle> {
        self.handles
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DriverHandle>> {
        Ok(self.handles.read().values().cloned().collect())
    }

    async fn stats(&self, id: InstanceId) -> Result<InstanceStats> {
        self.get(id).await?;
        Ok(InstanceStats {
            cpu_percent: 0.0,
            cpu_ns: 0,
            memory_used_bytes: 0,
            memory_cache_bytes: 0,
            disk_read_bytes: 0,
            disk_write_bytes: 0,
            net_rx_bytes: 0,
            net_tx_bytes: 0,
            collected_at: Utc::now(),
        })
    }

    async fn attach(&self, id: InstanceId, _options: AttachOptions) -> Result<ConsoleSession> {
        self.get(id).await?;
        {
            let mut attached = self.attached.write();
            if !attached.insert(id) {
                return Err(DriverError::AlreadyAttached(id.to_string()));
            }
        }
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(16);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(16);
        let (resize_tx, _resize_rx) = mpsc::channel::<(u16, u16)>(4);

        tokio::spawn(async move {
            while let Some(bytes) = input_rx.recv().await {
                if output_tx.send(bytes).await.is_err() {
                    break;
                }
            }
        });

        Ok(ConsoleSession::new(input_tx, output_rx, resize_tx))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn host_info(&self) -> Result<HostInfo> {
        Ok(HostInfo {
            cpu_cores: 4,
            usable_memory_bytes: 8 * 1024 * 1024 * 1024,
            hypervisor: "fake".to_string(),
            version: "0.0.0".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::InstanceSpec;

    #[tokio::test]
    async fn create_then_start_reports_running() {
        let driver = FakeDriver::new(InstanceKind::Container);
        let id = InstanceId::generate();
        driver.create(id, &InstanceSpec::default()).await.unwrap();
        let handle = driver.start(id).await.unwrap();
        assert_eq!(handle.state, InstanceState::Running);
    }

    #[tokio::test]
    async fn double_attach_is_rejected() {
        let driver = FakeDriver::new(InstanceKind::Container);
        let id = InstanceId::generate();
        driver.create(id, &InstanceSpec::default()).await.unwrap();
        let _session = driver.attach(id, AttachOptions::default()).await.unwrap();
        let second = driver.attach(id, AttachOptions::default()).await;
        assert!(matches!(second, Err(DriverError::AlreadyAttached(_))));
    }

    #[tokio::test]
    async fn delete_releases_attachment_slot() {
        let driver = FakeDriver::new(InstanceKind::Vm);
        let id = InstanceId::generate();
        driver.create(id, &InstanceSpec::default()).await.unwrap();
        let _session = driver.attach(id, AttachOptions::default()).await.unwrap();
        driver.delete(id).await.unwrap();
        driver.create(id, &InstanceSpec::default()).await.unwrap();
        assert!(driver.attach(id, AttachOptions::default()).await.is_ok());
    }
}
