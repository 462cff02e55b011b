//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::backend::Backend;

/// Round-robin cursor.
/// Stores an index that wraps modulo the backend count.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the backend at the cursor and advance it by one.
    ///
    /// Availability is ignored; this is pure load distribution.
    pub fn next<'a>(&self, backends: &'a [Backend]) -> Option<&'a Backend> {
        if backends.is_empty() {
            return None;
        }

        let len = backends.len();
        let index = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
            .unwrap_or_default();
        backends.get(index % len)
    }
}
