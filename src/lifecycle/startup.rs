//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Bind one backend service listener per address and start serving
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind aborts the whole fleet
//! - Every listener is bound before any starts serving

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::{self, ConfigError, ListenerConfig, RelayConfig};
use crate::lifecycle::Shutdown;
use crate::net::listener::ListenerError;
use crate::net::FrameServer;
use crate::service::ServiceHandler;

/// Load the configuration file, or defaults when no path is given.
///
/// Runs before logging is initialized, so it does not log.
pub fn load(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    match path {
        Some(path) => config::load_config(path),
        None => Ok(RelayConfig::default()),
    }
}

/// Addresses of every backend in both groups, first occurrence wins.
pub fn service_addresses(config: &RelayConfig) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::new();
    for address in config
        .load_balancer1
        .services
        .iter()
        .chain(config.load_balancer2.services.iter())
    {
        if !addresses.contains(address) {
            addresses.push(address.clone());
        }
    }
    addresses
}

/// Running backend service listeners.
pub struct ServiceFleet {
    addrs: Vec<SocketAddr>,
    tasks: JoinSet<()>,
}

impl ServiceFleet {
    /// Bind a service listener on each address, then start them all.
    pub async fn start(
        addresses: &[String],
        listener: &ListenerConfig,
        max_frame_bytes: u64,
        shutdown: &Shutdown,
        grace: Duration,
    ) -> Result<Self, ListenerError> {
        let mut servers = Vec::with_capacity(addresses.len());
        for address in addresses {
            let config = ListenerConfig {
                bind_address: address.clone(),
                ..listener.clone()
            };
            servers.push(FrameServer::bind(&config, max_frame_bytes, ServiceHandler::new()).await?);
        }

        let mut addrs = Vec::with_capacity(servers.len());
        let mut tasks = JoinSet::new();
        for server in servers {
            addrs.push(server.local_addr().map_err(ListenerError::Bind)?);
            tasks.spawn(server.run(shutdown.subscribe(), grace));
        }

        tracing::info!(services = addrs.len(), "Service fleet started");
        Ok(Self { addrs, tasks })
    }

    /// Bound addresses, in start order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Wait for every listener to stop.
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Service task failed");
            }
        }
        tracing::info!("Service fleet stopped");
    }
}
