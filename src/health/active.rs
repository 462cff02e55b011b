//! Active health checking.
//!
//! # Responsibilities
//! - Probe a backend with a bounded-timeout TCP connect
//! - Optionally refresh stale registry entries on a fixed interval

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;
use crate::config::HealthCheckConfig;
use crate::load_balancer::{Backend, BackendRegistry};

/// Connect to `backend` and report how long the connection took.
///
/// The connection is closed immediately; no frame is exchanged.
pub async fn probe(backend: &Backend, timeout: Duration) -> io::Result<Duration> {
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(backend.connect_addr())).await {
        Ok(Ok(_stream)) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("probe timed out after {:?}", timeout),
        )),
    }
}

/// Background refresher for one or more registries.
pub struct HealthMonitor {
    registries: Vec<Arc<BackendRegistry>>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(registries: Vec<Arc<BackendRegistry>>, config: HealthCheckConfig) -> Self {
        Self { registries, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            stale_after = self.config.stale_after_secs,
            "Health monitor starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        let now = Instant::now();
        for registry in &self.registries {
            registry.refresh_stale(now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_connect_time() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = Backend::from(listener.local_addr().unwrap());

        let elapsed = probe(&backend, Duration::from_secs(1)).await.unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn probe_fails_on_refused_connection() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let backend = Backend::new("127.0.0.1", port);
        assert!(probe(&backend, Duration::from_millis(500)).await.is_err());
    }

    #[tokio::test]
    async fn monitor_refreshes_and_stops() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = Backend::from(listener.local_addr().unwrap());
        let config = HealthCheckConfig {
            enabled: true,
            interval_secs: 1,
            ..Default::default()
        };
        let registry = Arc::new(
            BackendRegistry::new("lb1", vec![backend.clone()], config.clone()).unwrap(),
        );

        let (tx, rx) = broadcast::channel(1);
        let monitor = HealthMonitor::new(vec![registry.clone()], config);
        let handle = tokio::spawn(monitor.run(rx));

        // The first tick fires immediately.
        time::sleep(Duration::from_millis(200)).await;
        assert!(registry.status(&backend).unwrap().last_check.is_some());

        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
