use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::BackendRegistry;
use crate::relay::Summary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub requests: u64,
    pub failures: u64,
}

#[derive(Serialize)]
pub struct BackendView {
    pub address: String,
    pub available: bool,
    pub error_count: u32,
    /// `None` until the first successful exchange or probe.
    pub response_time_ms: Option<f64>,
    pub last_check_age_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct GroupView {
    pub group: String,
    pub backends: Vec<BackendView>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        requests: state.aggregator.len() as u64,
        failures: state.aggregator.failures(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<GroupView>> {
    let now = Instant::now();
    Json(vec![group_view(&state.lb1, now), group_view(&state.lb2, now)])
}

pub async fn get_summary(State(state): State<AdminState>) -> Json<Summary> {
    Json(state.aggregator.summary())
}

fn group_view(registry: &BackendRegistry, now: Instant) -> GroupView {
    let backends = registry
        .snapshot()
        .into_iter()
        .map(|(backend, status)| BackendView {
            address: backend.to_string(),
            available: status.available,
            error_count: status.error_count,
            response_time_ms: status.response_time.map(|d| d.as_secs_f64() * 1000.0),
            last_check_age_ms: status
                .last_check
                .map(|t| now.saturating_duration_since(t).as_millis() as u64),
        })
        .collect();

    GroupView {
        group: registry.name().to_string(),
        backends,
    }
}
