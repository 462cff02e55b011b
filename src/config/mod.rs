//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared by value/Arc with every subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::RelayConfig;
pub use schema::ListenerConfig;
pub use schema::GroupConfig;
pub use schema::TransportConfig;
pub use schema::HealthCheckConfig;
pub use schema::SourceConfig;
pub use schema::AdminConfig;
pub use schema::ObservabilityConfig;
