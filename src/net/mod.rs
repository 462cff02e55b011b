//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound hop:
//!     transport.rs (connect with retry, one exchange per connection)
//!     → frame.rs (8-byte big-endian length + payload, each direction)
//!
//! Inbound request:
//!     listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking for draining)
//!     → server.rs (read frame → handler → write frame → close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One request per connection, no keep-alive or pipelining

pub mod connection;
pub mod frame;
pub mod listener;
pub mod server;
pub mod transport;

pub use server::{FrameHandler, FrameServer};
pub use transport::{Exchange, Transport, TransportError};
