//! A container driver backed by the local Docker daemon via `bollard`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    RestartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, ResizeExecOptions};
use bollard::Docker;
use chrono::Utc;
use futures::StreamExt;
use hv_core::{InstanceId, InstanceKind, InstanceSpec, InstanceState, InstanceStats};
use tokio::sync::mpsc;

use crate::error::{DriverError, Result};
use crate::trait_def::{AttachOptions, ConsoleSession, Driver, DriverHandle, HostInfo};

/// Maps a generic [`InstanceSpec`] onto the Docker API and the generic
/// instance interface onto `bollard`'s container operations.
pub struct ContainerDriver {
    docker: Docker,
    stop_timeout: Duration,
}

impl ContainerDriver {
    /// Connect using the daemon reachable through the local defaults
    /// (`DOCKER_HOST` or the platform socket).
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            stop_timeout: Duration::from_secs(15),
        })
    }

    fn container_name(id: InstanceId) -> String {
        format!("hv-{id}")
    }

    fn map_status(status: &str) -> InstanceState {
        match status {
            "created" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "paused" | "exited" | "dead" => InstanceState::Stopped,
            "restarting" => InstanceState::Creating,
            _ => InstanceState::Failed,
        }
    }
}

#[async_trait]
impl Driver for ContainerDriver {
    fn kind(&self) -> InstanceKind {
        InstanceKind::Container
    }

    async fn create(&self, id: InstanceId, spec: &InstanceSpec) -> Result<DriverHandle> {
        let name = Self::container_name(id);
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.iter().chain(spec.args.iter()).cloned().collect())
            },
            env: Some(env),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::try_from(spec.limits.memory_bytes).unwrap_or(i64::MAX)),
                nano_cpus: Some(
                    i64::try_from(spec.limits.cpu_millicores).unwrap_or(i64::MAX) * 1_000_000,
                ),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        self.get(id).await
    }

    async fn start(&self, id: InstanceId) -> Result<DriverHandle> {
        let name = Self::container_name(id);
        self.docker
            .start_container::<String>(&name, None)
            .await?;
        self.get(id).await
    }

    async fn stop(&self, id: InstanceId, force: bool) -> Result<DriverHandle> {
        let name = Self::container_name(id);
        let timeout = if force { 0 } else { self.stop_timeout.as_secs() };
        let options = StopContainerOptions {
            t: i64::try_from(timeout).unwrap_or(i64::MAX),
        };
        self.docker.stop_container(&name, Some(options)).await?;
        self.get(id).await
    }

    async fn restart(&self, id: InstanceId, force: bool) -> Result<DriverHandle> {
        let name = Self::container_name(id);
        let timeout = if force { 0 } else { self.stop_timeout.as_secs() };
        let options = RestartContainerOptions {
            t: isize::try_from(timeout).unwrap_or(isize::MAX),
        };
        self.docker.restart_container(&name, Some(options)).await?;
        self.get(id).await
    }

    async fn delete(&self, id: InstanceId) -> Result<()> {
        let name = Self::container_name(id);
        self.docker
            .remove_container(
                &name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: InstanceId) -> Result<DriverHandle> {
        let name = Self::container_name(id);
        let details = self.docker.inspect_container(&name, None).await?;
        let status = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let ip = details
            .network_settings
            .as_ref()
            .and_then(|n| n.ip_address.as_ref())
            .and_then(|ip| ip.parse().ok());
        Ok(DriverHandle {
            id,
            state: Self::map_status(&status),
            observed_ip: ip,
        })
    }

    async fn list(&self) -> Result<Vec<DriverHandle>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec!["hv-".to_string()]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        let mut handles = Vec::with_capacity(containers.len());
        for c in containers {
            let Some(id_str) = c
                .names
                .as_ref()
                .and_then(|names| names.first())
                .and_then(|n| n.strip_prefix("/hv-").map(str::to_string))
            else {
                continue;
            };
            let Ok(id) = id_str.parse::<InstanceId>() else {
                continue;
            };
            handles.push(DriverHandle {
                id,
                state: Self::map_status(c.state.as_deref().unwrap_or_default()),
                observed_ip: None,
            });
        }
        Ok(handles)
    }

    async fn stats(&self, id: InstanceId) -> Result<InstanceStats> {
        let name = Self::container_name(id);
        let mut stream = self.docker.stats(
            &name,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );
        let sample = stream
            .next()
            .await
            .ok_or_else(|| DriverError::Unavailable(format!("no stats for {id}")))??;

        let cpu_delta = sample
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(sample.precpu_stats.cpu_usage.total_usage);
        let memory_used = sample.memory_stats.usage.unwrap_or_default();
        let memory_cache = sample
            .memory_stats
            .stats
            .as_ref()
            .and_then(|s| match s {
                bollard::container::MemoryStatsStats::V1(v1) => Some(v1.cache),
                bollard::container::MemoryStatsStats::V2(_) => None,
            })
            .unwrap_or_default();
        let (rx, tx) = sample
            .networks
            .as_ref()
            .map(|nets| {
                nets.values().fold((0u64, 0u64), |(rx, tx), n| {
                    (rx + n.rx_bytes, tx + n.tx_bytes)
                })
            })
            .unwrap_or_default();
        let (read, write) = sample
            .blkio_stats
            .io_service_bytes_recursive
            .as_ref()
            .map(|entries| {
                entries.iter().fold((0u64, 0u64), |(r, w), e| match e.op.as_str() {
                    "read" | "Read" => (r + e.value, w),
                    "write" | "Write" => (r, w + e.value),
                    _ => (r, w),
                })
            })
            .unwrap_or_default();

        Ok(InstanceStats {
            cpu_percent: 0.0,
            cpu_ns: cpu_delta,
            memory_used_bytes: memory_used,
            memory_cache_bytes: memory_cache,
            disk_read_bytes: read,
            disk_write_bytes: write,
            net_rx_bytes: rx,
            net_tx_bytes: tx,
            collected_at: Utc::now(),
        })
    }

    async fn attach(&self, id: InstanceId, options: AttachOptions) -> Result<ConsoleSession> {
        let name = Self::container_name(id);
        let exec = self
            .docker
            .create_exec(
                &name,
                CreateExecOptions {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    cmd: Some(vec!["/bin/sh".to_string()]),
                    ..Default::default()
                },
            )
            .await?;
        let started = self
            .docker
            .start_exec(&exec.id, Some(StartExecOptions { detach: false, ..Default::default() }))
            .await?;

        let bollard::exec::StartExecResults::Attached { mut output, mut input } = started else {
            return Err(DriverError::Unavailable(format!(
                "exec for {id} started detached"
            )));
        };

        if options.columns > 0 && options.rows > 0 {
            let _ = self
                .docker
                .resize_exec(
                    &exec.id,
                    ResizeExecOptions {
                        width: options.columns,
                        height: options.rows,
                    },
                )
                .await;
        }

        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(64);
        let (resize_tx, mut resize_rx) = mpsc::channel::<(u16, u16)>(4);

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            while let Some(bytes) = input_rx.recv().await {
                if input.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let docker = self.docker.clone();
        let exec_id = exec.id.clone();
        tokio::spawn(async move {
            while let Some((columns, rows)) = resize_rx.recv().await {
                let _ = docker
                    .resize_exec(
                        &exec_id,
                        ResizeExecOptions {
                            width: columns,
                            height: rows,
                        },
                    )
                    .await;
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = output.next().await {
                if output_tx.send(msg.into_bytes().to_vec()).await.is_err() {
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
        let info = self.docker.info().await?;
        Ok(HostInfo {
            cpu_cores: u32::try_from(info.ncpu.unwrap_or_default()).unwrap_or_default(),
            usable_memory_bytes: u64::try_from(info.mem_total.unwrap_or_default()).unwrap_or_default(),
            hypervisor: "docker".to_string(),
            version: info.server_version.unwrap_or_default(),
        })
    }
}
