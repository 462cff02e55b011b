//! Source node: issues paced relay requests and reports the results.
//!
//! # Responsibilities
//! - Load the payload pool from disk
//! - Dispatch one request per tick, picking a random payload
//! - Record successes and failures, keep running after either
//! - Stop on deadline or shutdown, letting the in-flight request finish

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::SourceConfig;
use crate::relay::aggregator::MetricsAggregator;
use crate::relay::orchestrator::Relay;
use crate::relay::report::{MetricsSink, RunReport};

/// File extensions accepted into the payload pool.
pub const PAYLOAD_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read payload directory '{path}': {source}")]
    PayloadDir { path: String, source: io::Error },

    #[error("no payloads found in '{0}'")]
    NoPayloads(String),

    #[error("request rate must be a positive number, got {0}")]
    InvalidRate(f64),
}

/// Read every file with an accepted extension from `dir`, in file name order.
pub fn load_payloads(dir: &Path) -> Result<Vec<Vec<u8>>, SourceError> {
    let dir_error = |source| SourceError::PayloadDir {
        path: dir.display().to_string(),
        source,
    };

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(dir_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| PAYLOAD_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut payloads = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read(&path) {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "Payload loaded");
                payloads.push(bytes);
            }
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to read payload"),
        }
    }

    if payloads.is_empty() {
        return Err(SourceError::NoPayloads(dir.display().to_string()));
    }
    tracing::info!(dir = %dir.display(), payloads = payloads.len(), "Payload pool ready");
    Ok(payloads)
}

/// Paced request generator.
pub struct Source {
    relay: Arc<Relay>,
    aggregator: Arc<MetricsAggregator>,
    payloads: Vec<Vec<u8>>,
    pacing: Duration,
    duration: Option<Duration>,
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl Source {
    pub fn new(
        relay: Arc<Relay>,
        aggregator: Arc<MetricsAggregator>,
        payloads: Vec<Vec<u8>>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        if payloads.is_empty() {
            return Err(SourceError::NoPayloads(config.payload_dir.clone()));
        }
        if !(config.request_rate.is_finite() && config.request_rate > 0.0) {
            return Err(SourceError::InvalidRate(config.request_rate));
        }
        Ok(Self {
            relay,
            aggregator,
            payloads,
            pacing: config.pacing(),
            duration: config.duration_secs.map(Duration::from_secs),
            sinks: Vec::new(),
        })
    }

    pub fn with_sink(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Issue requests until the configured duration elapses or `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> RunReport {
        let started = Instant::now();
        let deadline = self.duration.map(|d| started + d);
        let mut ticker = time::interval(self.pacing);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            pacing_ms = self.pacing.as_secs_f64() * 1000.0,
            duration_secs = ?self.duration.map(|d| d.as_secs()),
            payloads = self.payloads.len(),
            "Source run starting"
        );

        let mut requests = 0u64;
        let mut successes = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Source received shutdown signal, stopping");
                    break;
                }
                _ = until(deadline) => break,
                _ = ticker.tick() => {}
            }

            let Some(payload) = self.payloads.choose(&mut rand::thread_rng()) else {
                break;
            };
            requests += 1;

            match self.relay.dispatch(payload).await {
                Ok(outcome) => {
                    successes += 1;
                    for sink in &self.sinks {
                        sink.on_record(&outcome);
                    }
                    self.aggregator.record(outcome.record);
                }
                Err(e) => {
                    tracing::error!(request = requests, error = %e, "Request failed");
                    self.aggregator.record_failure();
                }
            }
        }

        let report = RunReport {
            requests,
            successes,
            failures: requests - successes,
            elapsed: started.elapsed(),
            summary: self.aggregator.summary(),
            records: self.aggregator.records(),
        };
        for sink in &self.sinks {
            if let Err(e) = sink.on_report(&report) {
                tracing::error!(error = %e, "Report sink failed");
            }
        }
        report
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
