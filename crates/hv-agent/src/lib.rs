//! Per-node agent: the process that runs on every hypervisor host,
//! registers itself with the controller, keeps its lease alive, and
//! executes instance lifecycle calls against a local [`hv_driver::Driver`].
//!
//! ```text
//! controller --ClusterService (register/heartbeat)--> agent
//! controller --AgentService (create/start/stop/...)--> agent --> driver
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod registration;
pub mod service;

pub use error::{AgentError, Result};
