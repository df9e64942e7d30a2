//! Instance placement: a two-phase filter-then-score algorithm over nodes
//! read from the coordination store (§4.3).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      hv-control                            │
//! └──────────────────────────────────────────────────────────┘
//!                              │ Scheduler::place
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Scheduler                            │
//! │   ┌────────────┐   ┌────────────┐   ┌───────────────────┐ │
//! │   │   filter   │──▶│   score    │──▶│  CAS admission +   │ │
//! │   │ (hard fit) │   │ (ranking)  │   │  bounded retry      │ │
//! │   └────────────┘   └────────────┘   └───────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                         hv-store                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no Kubernetes delegation here: candidate nodes, their
//! capacity, and the admission write all go through [`hv_store::Store`]
//! directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod filter;
pub mod score;
mod scheduler;
pub mod types;

pub use error::{Result, SchedulerError};
pub use scheduler::Scheduler;
pub use types::SchedulerConfig;
