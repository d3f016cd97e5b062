//! Slow-order detection.
//!
//! An order is slow when it has been open longer than a threshold and has not
//! yet left the store (not `DELIVERING`, not terminal).

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use ops_schemas::{Order, OrderStatus};

use crate::types::OrderCache;

/// Orders older than `threshold` at `now` that are still in the store.
pub fn slow_orders<'a>(
    cache: &'a OrderCache,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Vec<&'a Order> {
    cache
        .iter()
        .filter(|o| !o.status.is_terminal() && o.status != OrderStatus::Delivering)
        .filter(|o| now - o.created_at > threshold)
        .collect()
}

/// Remembers which orders already raised a slow-order alert so each order
/// alerts at most once while it stays in the cache.
#[derive(Clone, Debug, Default)]
pub struct SlowOrderWatch {
    alerted: BTreeSet<String>,
}

impl SlowOrderWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return orders that became slow since the last check.
    ///
    /// Ids that have left the cache are forgotten.
    pub fn check<'a>(
        &mut self,
        cache: &'a OrderCache,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Vec<&'a Order> {
        self.alerted.retain(|id| cache.contains(id));
        slow_orders(cache, now, threshold)
            .into_iter()
            .filter(|o| self.alerted.insert(o.order_id.clone()))
            .collect()
    }
}
