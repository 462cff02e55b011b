//! Report sinks for completed requests and run summaries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::relay::aggregator::Summary;
use crate::relay::orchestrator::RelayOutcome;
use crate::relay::timing::{serialize_secs, TimingRecord};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything a source run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Requests issued, successful or not.
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub summary: Summary,
    pub records: Vec<TimingRecord>,
}

/// Consumer of relay results.
pub trait MetricsSink: Send + Sync {
    /// Called once per completed request.
    fn on_record(&self, _outcome: &RelayOutcome) {}

    /// Called once when the run ends.
    fn on_report(&self, report: &RunReport) -> Result<(), ReportError>;
}

/// Logs each request's breakdown and the final averages.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn on_record(&self, outcome: &RelayOutcome) {
        let record = &outcome.record;
        for (stage, elapsed) in record.stages() {
            tracing::info!(
                request_id = %outcome.request_id,
                stage = %stage,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "Stage"
            );
        }
        tracing::info!(
            request_id = %outcome.request_id,
            lb1_backend = %outcome.lb1_backend,
            lb2_backend = %outcome.lb2_backend,
            total_ms = record.total().as_secs_f64() * 1000.0,
            average_intermediate_ms = record.average_intermediate().as_secs_f64() * 1000.0,
            "Request breakdown"
        );
    }

    fn on_report(&self, report: &RunReport) -> Result<(), ReportError> {
        let summary = &report.summary;
        tracing::info!(
            requests = report.requests,
            successes = report.successes,
            failures = report.failures,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Run finished"
        );
        for stage in &summary.stages {
            tracing::info!(stage = stage.label, key = stage.stage, mean_ms = stage.mean.as_secs_f64() * 1000.0, "Stage mean");
        }
        tracing::info!(
            mrt_ms = summary.mrt.as_secs_f64() * 1000.0,
            average_intermediate_ms = summary.average_intermediate.as_secs_f64() * 1000.0,
            network_ms = summary.network.as_secs_f64() * 1000.0,
            processing_ms = summary.processing.as_secs_f64() * 1000.0,
            "Run averages"
        );
        Ok(())
    }
}

/// Writes the run report as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonReportSink {
    fn on_report(&self, report: &RunReport) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), records = report.records.len(), "Report written");
        Ok(())
    }
}
