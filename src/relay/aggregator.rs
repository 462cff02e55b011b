//! Metrics aggregator.
//!
//! Records are appended under a mutex (O(1) per insert); means are computed
//! only when a summary is requested.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::relay::timing::{serialize_secs, Stage, TimingRecord, STAGE_COUNT};

/// Append-only history of completed requests plus a failure counter.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    history: Mutex<Vec<TimingRecord>>,
    failures: AtomicU64,
}

/// Mean of one stage across the history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageMean {
    pub stage: &'static str,
    pub label: &'static str,
    #[serde(serialize_with = "serialize_secs")]
    pub mean: Duration,
}

/// Averages over every recorded request. All zeros for an empty history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub requests: u64,
    pub failures: u64,
    pub stages: Vec<StageMean>,
    /// Mean total, the MRT.
    #[serde(serialize_with = "serialize_secs")]
    pub mrt: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub average_intermediate: Duration,
    /// Mean time of every stage except processing.
    #[serde(serialize_with = "serialize_secs")]
    pub network: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub processing: Duration,
}

impl Summary {
    pub fn mean(&self, stage: Stage) -> Duration {
        self.stages[stage.index()].mean
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: TimingRecord) {
        self.history().push(record);
    }

    /// Count a request that produced no record.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Copy of the history in insertion order.
    pub fn records(&self) -> Vec<TimingRecord> {
        self.history().clone()
    }

    pub fn summary(&self) -> Summary {
        let history = self.history();
        let count = history.len();

        let mut sums = [Duration::ZERO; STAGE_COUNT];
        for record in history.iter() {
            for (stage, elapsed) in record.stages() {
                sums[stage.index()] += elapsed;
            }
        }
        drop(history);

        let means = sums.map(|sum| mean(sum, count));
        let mean_record = TimingRecord::new(means);

        Summary {
            requests: count as u64,
            failures: self.failures(),
            stages: Stage::ALL
                .iter()
                .map(|s| StageMean {
                    stage: s.key(),
                    label: s.label(),
                    mean: means[s.index()],
                })
                .collect(),
            mrt: mean_record.total(),
            average_intermediate: mean_record.average_intermediate(),
            network: mean_record.network(),
            processing: mean_record.processing(),
        }
    }

    fn history(&self) -> MutexGuard<'_, Vec<TimingRecord>> {
        // Appends cannot leave the vector half-written, so a poisoned lock is still usable.
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn mean(sum: Duration, count: usize) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => sum / n,
        Err(_) => Duration::from_secs_f64(sum.as_secs_f64() / count as f64),
    }
}
