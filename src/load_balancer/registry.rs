//! Backend registry.
//!
//! # Responsibilities
//! - Own the status of every backend of one load balancer group
//! - Apply selection strategies (round-robin, best-available)
//! - Absorb request outcomes and probe results into backend status

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinSet;

use crate::config::{GroupConfig, HealthCheckConfig};
use crate::health::active::probe;
use crate::health::state::BackendStatus;
use crate::load_balancer::{
    Strategy,
    backend::{AddressParseError, Backend},
    fastest::pick_fastest,
    round_robin::RoundRobin,
};
use crate::observability::metrics;

/// Errors raised while building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("backend group '{0}' has no backends")]
    Empty(String),
    #[error(transparent)]
    Address(#[from] AddressParseError),
}

/// Status table for one load balancer group.
///
/// Every status entry is mutated under its map shard lock, so concurrent
/// request workers never lose an `error_count` update.
#[derive(Debug)]
pub struct BackendRegistry {
    name: String,
    /// Configuration order; round-robin and tie-breaks follow it.
    backends: Vec<Backend>,
    statuses: DashMap<Backend, BackendStatus>,
    round_robin: RoundRobin,
    health: HealthCheckConfig,
}

impl BackendRegistry {
    /// Create a registry over `backends`. Duplicates are collapsed, keeping the first.
    pub fn new(
        name: impl Into<String>,
        backends: Vec<Backend>,
        health: HealthCheckConfig,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let statuses = DashMap::new();
        let mut ordered = Vec::with_capacity(backends.len());
        for backend in backends {
            if statuses.insert(backend.clone(), BackendStatus::default()).is_none() {
                ordered.push(backend);
            }
        }

        if ordered.is_empty() {
            return Err(RegistryError::Empty(name));
        }

        tracing::info!(group = %name, backends = ordered.len(), "Backend registry created");

        Ok(Self {
            name,
            backends: ordered,
            statuses,
            round_robin: RoundRobin::new(),
            health,
        })
    }

    /// Create a registry from a configured group.
    pub fn from_config(
        name: impl Into<String>,
        group: &GroupConfig,
        health: &HealthCheckConfig,
    ) -> Result<Self, RegistryError> {
        let backends = group
            .services
            .iter()
            .map(|s| s.parse::<Backend>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, backends, health.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backends in configuration order.
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Select a backend with the given strategy.
    pub async fn select(&self, strategy: Strategy) -> Option<Backend> {
        match strategy {
            Strategy::RoundRobin => self.select_round_robin(),
            Strategy::BestAvailable => self.select_available(Instant::now()).await,
        }
    }

    /// Next backend in rotation, regardless of health.
    ///
    /// Only `None` for an empty registry, which construction rejects.
    pub fn select_round_robin(&self) -> Option<Backend> {
        self.round_robin.next(&self.backends).cloned()
    }

    /// Probe stale backends, then return the available one with the lowest
    /// response time. `None` means no backend is available.
    pub async fn select_available(&self, now: Instant) -> Option<Backend> {
        self.refresh_stale(now).await;

        let candidates: Vec<(&Backend, Option<Duration>)> = self
            .backends
            .iter()
            .filter_map(|b| {
                let status = self.statuses.get(b)?;
                status.available.then_some((b, status.response_time))
            })
            .collect();

        let selected = pick_fastest(candidates).cloned();
        if selected.is_none() {
            tracing::error!(group = %self.name, "No backend available");
        }
        selected
    }

    /// Probe every backend whose status is older than the staleness window.
    pub async fn refresh_stale(&self, now: Instant) {
        let stale_after = self.health.stale_after();
        let stale: Vec<Backend> = self
            .backends
            .iter()
            .filter(|b| {
                self.statuses
                    .get(*b)
                    .map(|s| s.is_stale(now, stale_after))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if stale.is_empty() {
            return;
        }

        let timeout = self.health.probe_timeout();
        let mut probes = JoinSet::new();
        for backend in stale {
            probes.spawn(async move {
                let result = probe(&backend, timeout).await;
                (backend, result)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let (backend, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(group = %self.name, error = %e, "Health probe task failed");
                    continue;
                }
            };
            match result {
                Ok(elapsed) => {
                    tracing::debug!(group = %self.name, backend = %backend, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Probe succeeded");
                    self.record_success(&backend, elapsed);
                }
                Err(e) => {
                    tracing::warn!(group = %self.name, backend = %backend, error = %e, "Backend unavailable");
                    self.record_failure(&backend);
                }
            }
        }
    }

    /// Mark a backend healthy with a fresh response time.
    pub fn record_success(&self, backend: &Backend, elapsed: Duration) {
        let Some(mut status) = self.statuses.get_mut(backend) else {
            return;
        };
        status.mark_success(elapsed, Instant::now());
        drop(status);
        metrics::record_backend_available(&self.name, backend, true);
    }

    /// Count an error against a backend, disabling it at the threshold.
    pub fn record_failure(&self, backend: &Backend) {
        let flipped = match self.statuses.get_mut(backend) {
            Some(mut status) => status.mark_failure(self.health.unhealthy_threshold),
            None => return,
        };
        if flipped {
            tracing::warn!(group = %self.name, backend = %backend, "Backend marked unavailable after repeated errors");
            metrics::record_backend_available(&self.name, backend, false);
        }
    }

    /// Current status of one backend.
    pub fn status(&self, backend: &Backend) -> Option<BackendStatus> {
        self.statuses.get(backend).map(|s| s.value().clone())
    }

    /// Statuses of all backends in configuration order.
    pub fn snapshot(&self) -> Vec<(Backend, BackendStatus)> {
        self.backends
            .iter()
            .filter_map(|b| self.status(b).map(|s| (b.clone(), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn health() -> HealthCheckConfig {
        HealthCheckConfig {
            probe_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn picks_lowest_response_time() {
        let a = Backend::new("A", 1000);
        let b = Backend::new("B", 1001);
        let registry = BackendRegistry::new("lb1", vec![a.clone(), b.clone()], health()).unwrap();

        registry.record_success(&a, Duration::from_millis(10));
        registry.record_success(&b, Duration::from_millis(50));

        assert_eq!(registry.select_available(Instant::now()).await, Some(a));
    }

    #[tokio::test]
    async fn none_when_every_backend_unavailable() {
        let a = Backend::new("127.0.0.1", closed_port());
        let b = Backend::new("127.0.0.1", closed_port());
        let registry = BackendRegistry::new("lb2", vec![a.clone(), b.clone()], health()).unwrap();

        for _ in 0..3 {
            registry.record_failure(&a);
            registry.record_failure(&b);
        }

        assert!(registry.select_available(Instant::now()).await.is_none());
        assert!(!registry.status(&a).unwrap().available);
        assert!(!registry.status(&b).unwrap().available);

        // One fresh success is enough to make selection succeed again.
        registry.record_success(&b, Duration::from_millis(5));
        assert_eq!(registry.select_available(Instant::now()).await, Some(b));
    }

    #[tokio::test]
    async fn stale_backend_is_probed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = Backend::from(listener.local_addr().unwrap());
        let dead = Backend::new("127.0.0.1", closed_port());
        let registry = BackendRegistry::new("lb1", vec![dead.clone(), live.clone()], health()).unwrap();

        let selected = registry.select_available(Instant::now()).await;
        assert_eq!(selected, Some(live.clone()));

        let live_status = registry.status(&live).unwrap();
        assert!(live_status.last_check.is_some());
        assert!(live_status.response_time.is_some());

        let dead_status = registry.status(&dead).unwrap();
        assert_eq!(dead_status.error_count, 1);
        assert!(dead_status.available, "one failed probe stays below the threshold");
    }

    #[tokio::test]
    async fn round_robin_ignores_health() {
        let a = Backend::new("A", 1000);
        let b = Backend::new("B", 1001);
        let registry = BackendRegistry::new("lb1", vec![a.clone(), b.clone()], health()).unwrap();
        for _ in 0..3 {
            registry.record_failure(&a);
        }

        assert_eq!(registry.select(Strategy::RoundRobin).await, Some(a.clone()));
        assert_eq!(registry.select(Strategy::RoundRobin).await, Some(b));
        assert_eq!(registry.select(Strategy::RoundRobin).await, Some(a));
    }

    #[test]
    fn failures_past_threshold_stay_unavailable() {
        let a = Backend::new("A", 1000);
        let registry = BackendRegistry::new("lb1", vec![a.clone()], health()).unwrap();

        for _ in 0..3 {
            registry.record_failure(&a);
        }
        assert!(!registry.status(&a).unwrap().available);
        registry.record_failure(&a);
        let status = registry.status(&a).unwrap();
        assert!(!status.available);
        assert_eq!(status.error_count, 4);
    }

    #[test]
    fn rejects_empty_group() {
        let err = BackendRegistry::from_config("lb1", &GroupConfig::default(), &health()).unwrap_err();
        assert!(matches!(err, RegistryError::Empty(_)));
    }

    #[test]
    fn snapshot_keeps_configuration_order() {
        let group = GroupConfig {
            services: vec!["b:2".into(), "a:1".into(), "b:2".into()],
            ..Default::default()
        };
        let registry = BackendRegistry::from_config("lb1", &group, &health()).unwrap();
        let order: Vec<String> = registry.snapshot().into_iter().map(|(b, _)| b.to_string()).collect();
        assert_eq!(order, vec!["b:2", "a:1"]);
    }
}
