//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use mrt_relay::config::{GroupConfig, HealthCheckConfig, ListenerConfig, RelayConfig, TransportConfig};
use mrt_relay::lifecycle::startup::ServiceFleet;
use mrt_relay::lifecycle::Shutdown;
use mrt_relay::load_balancer::Backend;
use mrt_relay::net::{frame, FrameServer};
use mrt_relay::service::{Classifier, ServiceHandler};

/// Smallest payload the service accepts as a JPEG.
pub fn jpeg(fill: u8, len: usize) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8, 0xff];
    bytes.resize(3 + len, fill);
    bytes
}

/// Start `count` real backend services on ephemeral ports.
pub async fn start_services(count: usize, shutdown: &Shutdown) -> Vec<Backend> {
    let addresses = vec!["127.0.0.1:0".to_string(); count];
    let fleet = ServiceFleet::start(
        &addresses,
        &ListenerConfig::default(),
        TransportConfig::default().max_frame_bytes,
        shutdown,
        Duration::from_millis(500),
    )
    .await
    .unwrap();
    let backends = fleet.local_addrs().iter().map(|a| Backend::from(*a)).collect();
    tokio::spawn(fleet.wait());
    backends
}

/// Start one backend service that classifies with `classifier`.
pub async fn start_service_with<C: Classifier>(classifier: C, shutdown: &Shutdown) -> Backend {
    let config = ListenerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let server = FrameServer::bind(
        &config,
        TransportConfig::default().max_frame_bytes,
        ServiceHandler::with_classifier(classifier),
    )
    .await
    .unwrap();
    let backend = Backend::from(server.local_addr().unwrap());
    tokio::spawn(server.run(shutdown.subscribe(), Duration::from_millis(500)));
    backend
}

/// Start a backend whose reply is computed by `f`. `None` closes without replying.
pub async fn start_programmable_backend<F, Fut>(f: F) -> Backend
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend::from(listener.local_addr().unwrap());
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Ok(request) = frame::read_frame(&mut socket, 1 << 20).await else {
                            return;
                        };
                        if let Some(response) = f(request).await {
                            let _ = frame::write_frame(&mut socket, &response).await;
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    backend
}

/// Backend that announces 100 bytes, sends 10 and hangs up.
pub async fn start_truncating_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend::from(listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = frame::read_frame(&mut socket, 1 << 20).await;
                let _ = socket.write_all(&100u64.to_be_bytes()).await;
                let _ = socket.write_all(&[0u8; 10]).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    backend
}

/// Address nobody listens on.
pub fn closed_backend() -> Backend {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    Backend::from(listener.local_addr().unwrap())
}

/// Relay configuration over the given groups with short timeouts and no probing.
pub fn relay_config(lb1: &[Backend], lb2: &[Backend]) -> RelayConfig {
    let group = |backends: &[Backend]| GroupConfig {
        services: backends.iter().map(|b| b.to_string()).collect(),
        ..Default::default()
    };
    RelayConfig {
        load_balancer1: group(lb1),
        load_balancer2: group(lb2),
        transport: TransportConfig {
            timeout_secs: 2,
            connect_attempts: 3,
            connect_delay_ms: 50,
            ..Default::default()
        },
        health_check: HealthCheckConfig {
            stale_after_secs: 3600,
            ..Default::default()
        },
        ..Default::default()
    }
}
