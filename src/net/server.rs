//! Frame server shell shared by every listener role.
//!
//! # Responsibilities
//! - Accept connections on a bounded listener
//! - Spawn one task per connection: read one frame, call the handler,
//!   write one frame, close
//! - Stop accepting on shutdown, drain in-flight handlers, close the socket

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::ListenerConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::frame;
use crate::net::listener::{Listener, ListenerError};
use crate::net::transport::TransportError;

/// Handles one request frame and produces the response frame.
pub trait FrameHandler: Send + Sync + 'static {
    fn handle(&self, request: Vec<u8>) -> impl Future<Output = Vec<u8>> + Send;
}

/// Accept loop that serves one request per connection.
pub struct FrameServer<H> {
    listener: Listener,
    handler: Arc<H>,
    tracker: ConnectionTracker,
    io_timeout: Duration,
    max_frame_bytes: u64,
}

impl<H: FrameHandler> FrameServer<H> {
    /// Bind the listener described by `config`.
    pub async fn bind(
        config: &ListenerConfig,
        max_frame_bytes: u64,
        handler: H,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(config).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            tracker: ConnectionTracker::new(),
            io_timeout: Duration::from_secs(config.io_timeout_secs),
            max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Tracker of in-flight connections.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Serve until `shutdown` fires, then drain for at most `grace`.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>, grace: Duration) {
        let addr = self.listener.local_addr().ok();
        tracing::info!(address = ?addr, "Frame server starting");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = self.tracker.track();
                    let handler = Arc::clone(&self.handler);
                    let io_timeout = self.io_timeout;
                    let max_frame_bytes = self.max_frame_bytes;

                    tokio::spawn(async move {
                        let _permit = permit;
                        match serve_connection(stream, handler, io_timeout, max_frame_bytes).await {
                            Ok(()) => {}
                            Err(TransportError::Closed) => {
                                tracing::debug!(connection_id = %guard.id(), peer = %peer, "Connection closed without a request");
                            }
                            Err(e) => {
                                tracing::warn!(connection_id = %guard.id(), peer = %peer, error = %e, "Request failed");
                            }
                        }
                        drop(guard);
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed, continuing");
                    time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        // Closing the socket before draining refuses new connections right away.
        drop(self.listener);
        tracing::info!(
            address = ?addr,
            in_flight = self.tracker.active_count(),
            "Frame server stopping, draining connections"
        );
        if !self.tracker.wait_for_drain(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }
        tracing::info!(address = ?addr, "Frame server stopped");
    }
}

async fn serve_connection<H: FrameHandler>(
    mut stream: TcpStream,
    handler: Arc<H>,
    io_timeout: Duration,
    max_frame_bytes: u64,
) -> Result<(), TransportError> {
    let request = time::timeout(io_timeout, frame::read_frame(&mut stream, max_frame_bytes))
        .await
        .map_err(|_| TransportError::Timeout(io_timeout))??;

    let response = handler.handle(request).await;

    time::timeout(io_timeout, frame::write_frame(&mut stream, &response))
        .await
        .map_err(|_| TransportError::Timeout(io_timeout))??;

    stream.shutdown().await.ok();
    Ok(())
}
