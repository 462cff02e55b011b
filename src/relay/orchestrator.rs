//! Relay orchestrator.
//!
//! # Responsibilities
//! - Pick one backend per load balancer group for each request
//! - Run the six hops strictly in order, each hop forwarding what the
//!   previous one returned
//! - Seal the content on network hops so only the processing hop (T5)
//!   makes a backend do its work
//! - Feed hop outcomes back into the registries
//! - Produce the request's [`TimingRecord`]
//!
//! # State machine
//! ```text
//! SelectingLb1 → SelectingLb2 → Hop(T1) … Hop(T6) → Complete
//!        │              │             │
//!        └──────────────┴─────────────┴──────────→ Failed
//! ```
//!
//! # Design Decisions
//! - No per-hop retries beyond the transport's connect budget; a failed hop
//!   abandons the request
//! - A selection failure penalises nobody; a hop failure penalises both
//!   selected backends

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::load_balancer::registry::RegistryError;
use crate::load_balancer::{Backend, BackendRegistry, Strategy};
use crate::net::{Transport, TransportError};
use crate::observability::metrics;
use crate::relay::envelope;
use crate::relay::timing::{Balancer, Stage, TimingRecord, STAGE_COUNT};

/// Why a relay request was abandoned.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Selection found no available backend in the group.
    #[error("no backend available in group '{group}'")]
    NoBackendAvailable { group: String },

    /// A hop failed after the backends were selected.
    #[error("hop {stage} failed: {source}")]
    Hop {
        stage: Stage,
        #[source]
        source: TransportError,
    },
}

impl RelayError {
    /// Label used for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::NoBackendAvailable { .. } => "no_backend",
            RelayError::Hop { source: TransportError::Connect { .. }, .. } => "connect_error",
            RelayError::Hop { source: TransportError::Timeout(_), .. } => "timeout",
            RelayError::Hop { .. } => "transport_error",
        }
    }
}

/// Position of a request in the relay state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    SelectingLb1,
    SelectingLb2,
    Hop(Stage),
    Complete,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::SelectingLb1 => write!(f, "selecting_lb1"),
            RelayState::SelectingLb2 => write!(f, "selecting_lb2"),
            RelayState::Hop(stage) => write!(f, "hop_{}", stage.label().to_ascii_lowercase()),
            RelayState::Complete => write!(f, "complete"),
            RelayState::Failed => write!(f, "failed"),
        }
    }
}

/// A completed relay request.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub request_id: Uuid,
    pub record: TimingRecord,
    /// Content carried back by the last hop.
    pub response: Vec<u8>,
    pub lb1_backend: Backend,
    pub lb2_backend: Backend,
}

/// Drives requests through both load balancer groups.
///
/// Cheap to share behind an `Arc`; concurrent dispatches only meet in the
/// registries.
#[derive(Debug)]
pub struct Relay {
    lb1: Arc<BackendRegistry>,
    lb2: Arc<BackendRegistry>,
    lb1_strategy: Strategy,
    lb2_strategy: Strategy,
    transport: Transport,
}

impl Relay {
    /// Relay over two registries, both selecting with [`Strategy::BestAvailable`].
    pub fn new(lb1: Arc<BackendRegistry>, lb2: Arc<BackendRegistry>, transport: Transport) -> Self {
        Self {
            lb1,
            lb2,
            lb1_strategy: Strategy::default(),
            lb2_strategy: Strategy::default(),
            transport,
        }
    }

    pub fn with_strategies(mut self, lb1: Strategy, lb2: Strategy) -> Self {
        self.lb1_strategy = lb1;
        self.lb2_strategy = lb2;
        self
    }

    /// Build both registries and the transport from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RegistryError> {
        let lb1 = BackendRegistry::from_config("lb1", &config.load_balancer1, &config.health_check)?;
        let lb2 = BackendRegistry::from_config("lb2", &config.load_balancer2, &config.health_check)?;
        Ok(Self::new(Arc::new(lb1), Arc::new(lb2), Transport::new(&config.transport))
            .with_strategies(config.load_balancer1.strategy, config.load_balancer2.strategy))
    }

    pub fn lb1(&self) -> &Arc<BackendRegistry> {
        &self.lb1
    }

    pub fn lb2(&self) -> &Arc<BackendRegistry> {
        &self.lb2
    }

    /// Relay `payload` through all six hops.
    pub async fn dispatch(&self, payload: &[u8]) -> Result<RelayOutcome, RelayError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("relay", request_id = %request_id);

        let result = self.run(request_id, payload).instrument(span).await;
        match &result {
            Ok(outcome) => metrics::record_request("success", Some(outcome.record.total())),
            Err(e) => metrics::record_request(e.outcome(), None),
        }
        result
    }

    async fn run(&self, request_id: Uuid, payload: &[u8]) -> Result<RelayOutcome, RelayError> {
        transition(RelayState::SelectingLb1);
        let lb1_backend = select(&self.lb1, self.lb1_strategy).await?;

        transition(RelayState::SelectingLb2);
        let lb2_backend = select(&self.lb2, self.lb2_strategy).await?;

        tracing::debug!(lb1_backend = %lb1_backend, lb2_backend = %lb2_backend, "Backends selected");

        let mut stages = [Duration::ZERO; STAGE_COUNT];
        let mut carried = payload.to_vec();

        for stage in Stage::ALL {
            transition(RelayState::Hop(stage));
            let backend = match stage.balancer() {
                Balancer::Lb1 => &lb1_backend,
                Balancer::Lb2 => &lb2_backend,
            };
            let result = {
                let request: Cow<'_, [u8]> = if stage.is_network() {
                    Cow::Owned(envelope::seal(&carried))
                } else {
                    Cow::Borrowed(carried.as_slice())
                };
                self.transport.exchange(backend, &request).await
            };

            match result {
                Ok(exchange) => {
                    tracing::trace!(
                        stage = %stage,
                        backend = %backend,
                        elapsed_ms = exchange.elapsed.as_secs_f64() * 1000.0,
                        "Hop complete"
                    );
                    metrics::record_hop(stage, exchange.elapsed);
                    stages[stage.index()] = exchange.elapsed;
                    carried = envelope::unseal(exchange.response);
                }
                Err(source) => {
                    transition(RelayState::Failed);
                    tracing::warn!(stage = %stage, backend = %backend, error = %source, "Hop failed, abandoning request");
                    self.lb1.record_failure(&lb1_backend);
                    self.lb2.record_failure(&lb2_backend);
                    return Err(RelayError::Hop { stage, source });
                }
            }
        }

        let record = TimingRecord::new(stages);
        let lb1_elapsed: Duration = Stage::ALL
            .iter()
            .filter(|s| s.balancer() == Balancer::Lb1)
            .map(|s| record.stage(*s))
            .sum();
        self.lb1.record_success(&lb1_backend, lb1_elapsed);
        self.lb2.record_success(&lb2_backend, record.total() - lb1_elapsed);

        transition(RelayState::Complete);
        tracing::info!(
            lb1_backend = %lb1_backend,
            lb2_backend = %lb2_backend,
            total_ms = record.total().as_secs_f64() * 1000.0,
            "Relay complete"
        );

        Ok(RelayOutcome {
            request_id,
            record,
            response: carried,
            lb1_backend,
            lb2_backend,
        })
    }
}

async fn select(registry: &BackendRegistry, strategy: Strategy) -> Result<Backend, RelayError> {
    match registry.select(strategy).await {
        Some(backend) => Ok(backend),
        None => {
            transition(RelayState::Failed);
            Err(RelayError::NoBackendAvailable {
                group: registry.name().to_string(),
            })
        }
    }
}

fn transition(state: RelayState) {
    tracing::debug!(state = %state, "Relay state");
}
