//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Source node settings (request pacing, payloads, report).
    pub source: SourceConfig,

    /// First load balancer group (hops T1, T2).
    pub load_balancer1: GroupConfig,

    /// Second load balancer group (hops T3..T6).
    pub load_balancer2: GroupConfig,

    /// Per-hop transport settings.
    pub transport: TransportConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Listener configuration for backend services.
    pub listener: ListenerConfig,

    /// Shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Source node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Requests issued per second.
    pub request_rate: f64,

    /// Run length in seconds. `None` runs until interrupted.
    pub duration_secs: Option<u64>,

    /// Directory holding the payload pool (images).
    pub payload_dir: String,

    /// Where the JSON run report is written. `None` disables the report.
    pub report_path: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            request_rate: 1.0,
            duration_secs: Some(30),
            payload_dir: "data/test".to_string(),
            report_path: Some("performance_data.json".to_string()),
        }
    }
}

impl SourceConfig {
    /// Interval between two requests. Never zero.
    ///
    /// Callers must have checked that `request_rate` is positive.
    pub fn pacing(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.request_rate).max(Duration::from_micros(1))
    }
}

/// A named group of backends managed by one load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GroupConfig {
    /// Selection policy for this group.
    pub strategy: Strategy,

    /// Backend addresses (`host:port`), in round-robin order.
    pub services: Vec<String>,
}

/// Transport configuration shared by every hop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-hop deadline in seconds.
    pub timeout_secs: u64,

    /// Connection attempts before a hop fails with a connect error.
    pub connect_attempts: u32,

    /// Delay between connection attempts in milliseconds.
    pub connect_delay_ms: u64,

    /// Largest frame accepted from a peer.
    pub max_frame_bytes: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_attempts: 3,
            connect_delay_ms: 1000,
            max_frame_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the background health monitor.
    pub enabled: bool,

    /// Background monitor interval in seconds.
    pub interval_secs: u64,

    /// Age after which a backend status is re-probed before selection.
    pub stale_after_secs: u64,

    /// Connect-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Number of errors before a backend is marked unavailable. At most 3.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5,
            stale_after_secs: 5,
            probe_timeout_ms: 1000,
            unhealthy_threshold: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8083").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Read/write deadline for one request on an accepted connection.
    pub io_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8083".to_string(),
            max_connections: 1024,
            io_timeout_secs: 10,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight work may drain after an interrupt.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_period_secs: 2 }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
