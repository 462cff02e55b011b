//! Backend health state machine.
//!
//! # States
//! - Available: backend may be selected
//! - Unavailable: backend excluded from best-available selection
//!
//! # State Transitions
//! ```text
//! Available → Unavailable: error_count >= unhealthy_threshold
//! Unavailable → Available: any success (probe or completed request)
//! ```
//!
//! # Design Decisions
//! - A single success fully resets the error count
//! - Failures past the threshold keep the backend unavailable (idempotent)
//! - `last_check` only moves on success, so a failing backend stays stale and
//!   is re-probed on every selection until it answers again

use std::time::{Duration, Instant};

/// Status of one backend, owned by its registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendStatus {
    pub available: bool,
    /// When the backend last answered a probe or request. `None` means never.
    pub last_check: Option<Instant>,
    /// Last measured response time. `None` stands for +infinity.
    pub response_time: Option<Duration>,
    pub error_count: u32,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self {
            available: true,
            last_check: None,
            response_time: None,
            error_count: 0,
        }
    }
}

impl BackendStatus {
    /// Report a successful request or probe.
    pub fn mark_success(&mut self, elapsed: Duration, now: Instant) {
        self.available = true;
        self.error_count = 0;
        self.response_time = Some(elapsed);
        self.last_check = Some(now);
    }

    /// Report a failed request. Returns true when this call made the backend unavailable.
    pub fn mark_failure(&mut self, unhealthy_threshold: u32) -> bool {
        self.error_count = self.error_count.saturating_add(1);
        if self.error_count >= unhealthy_threshold && self.available {
            self.available = false;
            return true;
        }
        false
    }

    /// Whether the status is older than `stale_after` at `now`.
    pub fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        match self.last_check {
            None => true,
            Some(checked) => now.saturating_duration_since(checked) > stale_after,
        }
    }
}
