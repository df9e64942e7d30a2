//! The compute driver abstraction: one interface behind which VM,
//! container, and microVM back-ends live (§4.5).
//!
//! `Driver` implementations map the generic instance spec into their
//! back-end's native shape and report state using the same names the
//! instance lifecycle machine in `hv-control` uses, so the agent's
//! reconciliation loop never needs back-end-specific translation.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod container;
pub mod error;
pub mod fake;
pub mod registry;
mod trait_def;

pub use error::{DriverError, Result};
pub use registry::DriverRegistry;
pub use trait_def::{AttachOptions, ConsoleSession, Driver, DriverHandle, HostInfo};
