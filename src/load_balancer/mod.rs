//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Relay hop needs a target
//!     → registry.rs (status table of the group)
//!     → Apply the group's strategy:
//!         - round_robin.rs (rotate through backends, health ignored)
//!         - fastest.rs (probe stale entries, pick lowest response time)
//!     → Backend address, or None when nothing is available
//! ```
//!
//! # Design Decisions
//! - One registry per load balancer role, injected where needed
//! - Strategy is a closed enum chosen by configuration
//! - "No backend" is a normal return value, never an error

pub mod backend;
pub mod fastest;
pub mod registry;
pub mod round_robin;

use serde::{Deserialize, Serialize};

pub use backend::Backend;
pub use registry::BackendRegistry;

/// Backend selection policy of a load balancer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Rotate through backends in configuration order.
    RoundRobin,
    /// Lowest response time among available backends.
    #[default]
    BestAvailable,
}
