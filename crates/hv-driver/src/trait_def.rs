//! The `Driver` contract (§4.5): one flat interface over VM, container, and
//! microVM back-ends, plus host-capability probing.

use async_trait::async_trait;
use hv_core::{InstanceId, InstanceKind, InstanceSpec, InstanceState, InstanceStats};
use tokio::sync::mpsc;

use crate::error::Result;

/// What a driver reports about one instance it manages.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverHandle {
    /// The instance this handle describes.
    pub id: InstanceId,
    /// The driver-observed lifecycle state, using the same names as §4.2.
    pub state: InstanceState,
    /// Observed guest IP, if the back-end can report one.
    pub observed_ip: Option<std::net::IpAddr>,
}

/// Requested terminal geometry for a freshly attached console.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachOptions {
    /// Terminal columns.
    pub columns: u16,
    /// Terminal rows.
    pub rows: u16,
}

/// A live, bidirectional console attachment.
///
/// `input` carries bytes from the caller to the guest; `output` carries
/// bytes from the guest back to the caller. Dropping either half signals
/// the other side that the session is over; the driver releases its
/// underlying attachment when both halves are gone.
pub struct ConsoleSession {
    /// Send raw input bytes (or forward a resize out-of-band, see
    /// [`ConsoleSession::resize`]) to the attached instance.
    pub input: mpsc::Sender<Vec<u8>>,
    /// Receive raw output bytes from the attached instance.
    pub output: mpsc::Receiver<Vec<u8>>,
    resize: mpsc::Sender<(u16, u16)>,
}

impl ConsoleSession {
    /// Build a session from its three channel halves.
    #[must_use]
    pub fn new(
        input: mpsc::Sender<Vec<u8>>,
        output: mpsc::Receiver<Vec<u8>>,
        resize: mpsc::Sender<(u16, u16)>,
    ) -> Self {
        Self {
            input,
            output,
            resize,
        }
    }

    /// Notify the back-end of a terminal resize.
    pub async fn resize(&self, columns: u16, rows: u16) -> bool {
        self.resize.send((columns, rows)).await.is_ok()
    }
}

/// Host capability information collected at agent startup (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    /// Logical CPU core count.
    pub cpu_cores: u32,
    /// Usable memory, in bytes.
    pub usable_memory_bytes: u64,
    /// Back-end name, e.g. `"docker"`, `"libvirt"`, `"firecracker"`.
    pub hypervisor: String,
    /// Back-end version string.
    pub version: String,
}

/// One compute back-end's implementation of the instance interface.
///
/// Implementations must be safe under concurrent calls on distinct ids;
/// serializing calls on the same id is the agent's responsibility, not
/// the driver's (§4.5).
#[async_trait]
pub trait Driver: Send + Sync {
    /// The instance kind this driver implements.
    fn kind(&self) -> InstanceKind;

    /// Create a new instance from `spec`, returning its initial handle.
    async fn create(&self, id: InstanceId, spec: &InstanceSpec) -> Result<DriverHandle>;

    /// Start a previously created instance.
    async fn start(&self, id: InstanceId) -> Result<DriverHandle>;

    /// Stop an instance. Graceful unless `force`, per §4.2 stop semantics.
    async fn stop(&self, id: InstanceId, force: bool) -> Result<DriverHandle>;

    /// Restart an instance. Graceful unless `force`.
    async fn restart(&self, id: InstanceId, force: bool) -> Result<DriverHandle>;

    /// Destroy an instance and release its back-end resources.
    async fn delete(&self, id: InstanceId) -> Result<()>;

    /// Read the current handle for one instance.
    async fn get(&self, id: InstanceId) -> Result<DriverHandle>;

    /// List every instance this driver currently knows about.
    async fn list(&self) -> Result<Vec<DriverHandle>>;

    /// Sample runtime counters for one instance.
    async fn stats(&self, id: InstanceId) -> Result<InstanceStats>;

    /// Open a bidirectional console attachment.
    async fn attach(&self, id: InstanceId, options: AttachOptions) -> Result<ConsoleSession>;

    /// Release any driver-global resources (connection pools, watchers).
    async fn close(&self) -> Result<()>;

    /// Probe host capability for populating the node record at startup.
    async fn host_info(&self) -> Result<HostInfo>;
}
