//! Multi-hop relay with per-stage latency accounting.
//!
//! A source sends each request through two load-balanced backend groups in
//! six sequential hops (T1..T6), timing every hop to build a mean response
//! time breakdown.

// Core subsystems
pub mod config;
pub mod net;
pub mod relay;
pub mod service;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use lifecycle::Shutdown;
pub use relay::Relay;
