//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! source.rs (paced loop, random payload)
//!     → orchestrator.rs
//!         → select one backend per group (load_balancer)
//!         → six sequential hops over the transport (net), content
//!           sealed by envelope.rs on every hop except T5
//!         → success/failure fed back to the registries
//!     → timing.rs record (T1..T6)
//!     → aggregator.rs (history + failure count)
//!     → report.rs sinks (logs, JSON file)
//! ```

pub mod aggregator;
pub mod envelope;
pub mod orchestrator;
pub mod report;
pub mod source;
pub mod timing;

pub use aggregator::{MetricsAggregator, Summary};
pub use orchestrator::{Relay, RelayError, RelayOutcome};
pub use report::{JsonReportSink, MetricsSink, RunReport, TracingSink};
pub use source::Source;
pub use timing::{Stage, TimingRecord};
