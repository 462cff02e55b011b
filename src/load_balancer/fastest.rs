//! Least response time load balancing strategy.

use std::time::Duration;
use crate::load_balancer::backend::Backend;

/// Pick the candidate with the smallest measured response time.
///
/// `None` response times count as infinitely slow. In case of tie, the first
/// candidate in iteration order is selected (stability).
pub fn pick_fastest<'a, I>(candidates: I) -> Option<&'a Backend>
where
    I: IntoIterator<Item = (&'a Backend, Option<Duration>)>,
{
    candidates
        .into_iter()
        .min_by_key(|(_, response_time)| response_time.unwrap_or(Duration::MAX))
        .map(|(backend, _)| backend)
}
