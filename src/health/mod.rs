//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Stale status found at selection time (or by the periodic monitor)
//!     → TCP connect probe
//!     → Update state.rs
//!
//! Passive health checks (registry callbacks):
//!     Relay request succeeded / failed
//!     → record_success / record_failure
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Available ←→ Unavailable
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend, owned by the group registry
//! - Probe failures are absorbed into state, never raised to callers

pub mod active;
pub mod state;
