//! Per-hop request/response transport.
//!
//! # Responsibilities
//! - Open a fresh connection per exchange (with bounded connect retries)
//! - Write one frame, read one frame, close
//! - Enforce one per-hop deadline, connect retries included, and measure
//!   elapsed time
//!
//! # Design Decisions
//! - No connection reuse: a broken connection affects exactly one hop
//! - Connect retries exist because listeners start asynchronously
//! - Retries stop at connect; a failure mid-exchange is final for the hop

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::TransportConfig;
use crate::load_balancer::Backend;
use crate::net::frame;

/// Errors that can occur during one exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection could be established within the attempt budget.
    #[error("could not connect to {addr} after {attempts} attempt(s): {source}")]
    Connect {
        addr: String,
        attempts: u32,
        source: io::Error,
    },

    /// Peer closed before the declared length was read.
    #[error("peer closed after {received} of {expected} bytes")]
    PeerClosed { expected: u64, received: u64 },

    /// Peer closed without sending any part of a frame.
    #[error("peer closed the connection before sending a frame")]
    Closed,

    /// Deadline exceeded.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Declared frame length above the configured limit.
    #[error("frame of {declared} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { declared: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a completed exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: Vec<u8>,
    /// Wall-clock time from the first connect attempt to the last response byte.
    pub elapsed: Duration,
}

/// Frame transport used by every hop.
#[derive(Debug, Clone)]
pub struct Transport {
    timeout: Duration,
    connect_attempts: u32,
    connect_delay: Duration,
    max_frame_bytes: u64,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            connect_attempts: config.connect_attempts,
            connect_delay: Duration::from_millis(config.connect_delay_ms),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `payload` to `backend` and wait for its response frame.
    ///
    /// The whole hop, connect attempts and retry delays included, runs under
    /// one deadline of `timeout`.
    pub async fn exchange(&self, backend: &Backend, payload: &[u8]) -> Result<Exchange, TransportError> {
        let start = Instant::now();

        let response = time::timeout(self.timeout, async {
            let mut stream =
                connect_with_retry(backend, self.connect_attempts, self.connect_delay, self.timeout).await?;
            frame::write_frame(&mut stream, payload).await?;
            frame::read_frame(&mut stream, self.max_frame_bytes).await
        })
        .await
        .map_err(|_| TransportError::Timeout(self.timeout))??;

        let elapsed = start.elapsed();
        tracing::trace!(
            backend = %backend,
            sent = payload.len(),
            received = response.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Exchange complete"
        );
        Ok(Exchange { response, elapsed })
    }
}

/// Connect to `backend`, trying up to `max_attempts` times with `delay` between attempts.
///
/// Each attempt is bounded by `attempt_timeout`. After the final attempt the
/// last underlying failure is returned inside [`TransportError::Connect`].
pub async fn connect_with_retry(
    backend: &Backend,
    max_attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
) -> Result<TcpStream, TransportError> {
    retry_connect(backend, max_attempts, delay, attempt_timeout, TcpStream::connect).await
}

/// Retry loop behind [`connect_with_retry`], generic over the connect call.
async fn retry_connect<S, F, Fut>(
    backend: &Backend,
    max_attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
    mut connect: F,
) -> Result<S, TransportError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    let mut last_error = None;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        let result = time::timeout(attempt_timeout, connect(backend.to_string())).await;
        let error = match result {
            Ok(Ok(stream)) => {
                if attempt > 1 {
                    tracing::debug!(backend = %backend, attempt, "Connected after retry");
                }
                return Ok(stream);
            }
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", attempt_timeout),
            ),
        };

        tracing::debug!(backend = %backend, attempt, max_attempts, error = %error, "Connect attempt failed");
        last_error = Some(error);

        if attempt < max_attempts {
            time::sleep(delay).await;
        }
    }

    Err(TransportError::Connect {
        addr: backend.to_string(),
        attempts,
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no connection attempts allowed")),
    })
}
