use std::collections::BTreeMap;

use ops_schemas::{Order, OrderPatch, OrderStatus};
use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// OrderCache
// ---------------------------------------------------------------------------

/// Local view of every active order, keyed by order id.
///
/// Iteration is in id order so two caches built from the same inputs compare
/// equal and serialize identically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OrderCache {
    orders: BTreeMap<String, Order>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let mut cache = Self::new();
        for o in orders {
            cache.upsert(o);
        }
        cache
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|o| o.status)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn upsert(&mut self, order: Order) -> Option<Order> {
        self.orders.insert(order.order_id.clone(), order)
    }

    pub fn remove(&mut self, order_id: &str) -> Option<Order> {
        self.orders.remove(order_id)
    }

    pub(crate) fn get_mut(&mut self, order_id: &str) -> Option<&mut Order> {
        self.orders.get_mut(order_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.orders.keys().map(|s| s.as_str())
    }

    pub fn to_vec(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

// ---------------------------------------------------------------------------
// IngestEvent
// ---------------------------------------------------------------------------

/// One update to merge into the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    /// Full authoritative order list from a poll that won sequencing.
    PollSnapshot(Vec<Order>),
    /// Push `new_order`.
    PushNewOrder(Order),
    /// Push `order_update`; carries only the fields the server sent.
    PushOrderUpdate(OrderPatch),
    /// Push `order_cancelled`.
    PushOrderCancelled { order_id: String },
    /// Push `inventory_alert`, `staff_update`, `kitchen_update` or an
    /// unrecognised kind. Never mutates the cache.
    PushAlert { kind: String, data: Value },
    /// Locally asserted status for an order with a mutation in flight.
    Optimistic {
        order_id: String,
        status: OrderStatus,
    },
    /// Put back the last server-confirmed version after a failed mutation.
    Revert(Order),
}

impl IngestEvent {
    pub fn label(&self) -> &'static str {
        match self {
            IngestEvent::PollSnapshot(_) => "poll_snapshot",
            IngestEvent::PushNewOrder(_) => "new_order",
            IngestEvent::PushOrderUpdate(_) => "order_update",
            IngestEvent::PushOrderCancelled { .. } => "order_cancelled",
            IngestEvent::PushAlert { .. } => "alert",
            IngestEvent::Optimistic { .. } => "optimistic",
            IngestEvent::Revert(_) => "revert",
        }
    }
}

// ---------------------------------------------------------------------------
// MergeOutcome
// ---------------------------------------------------------------------------

/// Which source produced a cache change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Poll,
    Push,
    Local,
}

impl ChangeSource {
    /// `true` if the new value was confirmed by the server.
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, ChangeSource::Local)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum CacheChange {
    Added {
        order_id: String,
        source: ChangeSource,
    },
    StatusChanged {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
        source: ChangeSource,
    },
    Removed {
        order_id: String,
    },
}

impl CacheChange {
    pub fn order_id(&self) -> &str {
        match self {
            CacheChange::Added { order_id, .. }
            | CacheChange::StatusChanged { order_id, .. }
            | CacheChange::Removed { order_id } => order_id,
        }
    }
}

/// An event passed through to notifications.
#[derive(Clone, Debug, PartialEq)]
pub struct Forwarded {
    pub kind: String,
    pub order_id: Option<String>,
    pub data: Value,
}

/// Result of [`merge`][crate::merge].
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    pub cache: OrderCache,
    /// Ids the caller must remove from the pending tracker.
    pub clear_pending: Vec<String>,
    /// Derived changes, sorted by order id within one merge.
    pub changes: Vec<CacheChange>,
    /// Events passed through without (or beyond) cache mutation.
    pub forwarded: Vec<Forwarded>,
    /// A push referenced an order the cache cannot represent yet; the caller
    /// should schedule a poll.
    pub needs_refresh: bool,
}

impl MergeOutcome {
    pub(crate) fn unchanged(cache: &OrderCache) -> Self {
        Self {
            cache: cache.clone(),
            clear_pending: Vec::new(),
            changes: Vec::new(),
            forwarded: Vec::new(),
            needs_refresh: false,
        }
    }
}
