//! Latency decomposition of one relay request.
//!
//! ```text
//! T1 source → LB1        T4 LB2 → backend
//! T2 LB1 → backend       T5 backend processing
//! T3 backend → LB2       T6 backend → source
//! ```

use std::fmt;
use std::time::Duration;

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Number of stages in the decomposition.
///
/// `average_intermediate` divides by this constant; it is tied to the six
/// [`Stage`] variants and must change with them.
pub const STAGE_COUNT: usize = 6;

/// Load balancer role that picks the target of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balancer {
    Lb1,
    Lb2,
}

/// One named segment of the end-to-end latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SourceToLb1,
    Lb1ToBackend,
    BackendToLb2,
    Lb2ToBackend,
    Processing,
    BackendToSource,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::SourceToLb1,
        Stage::Lb1ToBackend,
        Stage::BackendToLb2,
        Stage::Lb2ToBackend,
        Stage::Processing,
        Stage::BackendToSource,
    ];

    pub fn index(self) -> usize {
        match self {
            Stage::SourceToLb1 => 0,
            Stage::Lb1ToBackend => 1,
            Stage::BackendToLb2 => 2,
            Stage::Lb2ToBackend => 3,
            Stage::Processing => 4,
            Stage::BackendToSource => 5,
        }
    }

    /// Short label, `T1`..`T6`.
    pub fn label(self) -> &'static str {
        match self {
            Stage::SourceToLb1 => "T1",
            Stage::Lb1ToBackend => "T2",
            Stage::BackendToLb2 => "T3",
            Stage::Lb2ToBackend => "T4",
            Stage::Processing => "T5",
            Stage::BackendToSource => "T6",
        }
    }

    /// Stable key used in reports and metric labels.
    pub fn key(self) -> &'static str {
        match self {
            Stage::SourceToLb1 => "t1_source_lb1",
            Stage::Lb1ToBackend => "t2_lb1_service",
            Stage::BackendToLb2 => "t3_service_lb2",
            Stage::Lb2ToBackend => "t4_lb2_service",
            Stage::Processing => "t5_processing",
            Stage::BackendToSource => "t6_service_source",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::SourceToLb1 => "Source -> LB1",
            Stage::Lb1ToBackend => "LB1 -> Service",
            Stage::BackendToLb2 => "Service -> LB2",
            Stage::Lb2ToBackend => "LB2 -> Service",
            Stage::Processing => "Service processing",
            Stage::BackendToSource => "Service -> Source",
        }
    }

    /// Which load balancer's backend serves this stage.
    pub fn balancer(self) -> Balancer {
        match self {
            Stage::SourceToLb1 | Stage::Lb1ToBackend => Balancer::Lb1,
            _ => Balancer::Lb2,
        }
    }

    /// Whether the stage counts as network time rather than processing time.
    pub fn is_network(self) -> bool {
        self != Stage::Processing
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.description())
    }
}

/// Stage durations of one completed request. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRecord {
    stages: [Duration; STAGE_COUNT],
}

impl TimingRecord {
    pub fn new(stages: [Duration; STAGE_COUNT]) -> Self {
        Self { stages }
    }

    pub fn stage(&self, stage: Stage) -> Duration {
        self.stages[stage.index()]
    }

    /// Stages with their durations, in execution order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        Stage::ALL.iter().map(move |s| (*s, self.stage(*s)))
    }

    /// Sum of T1..T6.
    pub fn total(&self) -> Duration {
        self.stages.iter().sum()
    }

    /// `total / 6`.
    pub fn average_intermediate(&self) -> Duration {
        self.total() / STAGE_COUNT as u32
    }

    /// Time spent moving data (every stage except processing).
    pub fn network(&self) -> Duration {
        self.stages().filter(|(s, _)| s.is_network()).map(|(_, d)| d).sum()
    }

    pub fn processing(&self) -> Duration {
        self.stage(Stage::Processing)
    }
}

impl Serialize for TimingRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TimingRecord", STAGE_COUNT + 2)?;
        for (stage, duration) in self.stages() {
            state.serialize_field(stage.key(), &duration.as_secs_f64())?;
        }
        state.serialize_field("total", &self.total().as_secs_f64())?;
        state.serialize_field("average_intermediate", &self.average_intermediate().as_secs_f64())?;
        state.end()
    }
}

/// Serialize a duration as fractional seconds.
pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn derived_values() {
        let record = TimingRecord::new([ms(10), ms(20), ms(30), ms(40), ms(50), ms(60)]);
        assert_eq!(record.total(), ms(210));
        assert_eq!(record.average_intermediate(), ms(35));
        assert_eq!(record.processing(), ms(50));
        assert_eq!(record.network(), ms(160));
        assert_eq!(record.stage(Stage::Lb2ToBackend), ms(40));
    }

    #[test]
    fn stage_order_and_balancer() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(stage.label(), format!("T{}", i + 1));
        }
        assert_eq!(Stage::Lb1ToBackend.balancer(), Balancer::Lb1);
        assert_eq!(Stage::BackendToLb2.balancer(), Balancer::Lb2);
        assert_eq!(Stage::BackendToSource.balancer(), Balancer::Lb2);
    }

    #[test]
    fn serializes_seconds() {
        let record = TimingRecord::new([ms(500); STAGE_COUNT]);
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["t1_source_lb1"], 0.5);
        assert_eq!(json["t5_processing"], 0.5);
        assert_eq!(json["total"], 3.0);
        assert_eq!(json["average_intermediate"], 0.5);
    }
}
