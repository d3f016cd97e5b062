//! The merge function.
//!
//! # Invariants
//!
//! - **Gating**: a poll snapshot never changes the cached entry of an order
//!   with a mutation in flight.
//! - **Confirmation**: `order_update` is never gated. It always overwrites the
//!   present fields and always clears the id from the tracker.
//! - **Membership**: the poll snapshot is authoritative for which orders
//!   exist, except that a tracked id already in the cache is kept.
//! - **Never fails**: anything that cannot be applied degrades to the last
//!   known good cache (optionally with `needs_refresh`).

use ops_schemas::OrderStatus;
use ops_workflow::PendingMutations;

use crate::types::{CacheChange, ChangeSource, Forwarded, IngestEvent, MergeOutcome, OrderCache};

/// Merge one event into `cache`, returning the new cache and what changed.
pub fn merge(cache: &OrderCache, pending: &PendingMutations, event: IngestEvent) -> MergeOutcome {
    match event {
        IngestEvent::PollSnapshot(orders) => merge_poll(cache, pending, orders),

        IngestEvent::PushNewOrder(order) => {
            let mut out = MergeOutcome::unchanged(cache);
            let before = cache.get(&order.order_id).map(|o| o.status);
            let id = order.order_id.clone();
            let to = order.status;
            out.cache.upsert(order);
            out.changes.extend(change_for(&id, before, Some(to), ChangeSource::Push));
            out
        }

        IngestEvent::PushOrderUpdate(patch) => {
            let mut out = MergeOutcome::unchanged(cache);
            let id = patch.order_id.clone();
            if pending.is_pending(&id) {
                out.clear_pending.push(id.clone());
            }
            match out.cache.get_mut(&id) {
                Some(existing) => {
                    let before = existing.status;
                    patch.apply_to(existing);
                    let after = existing.status;
                    out.changes
                        .extend(change_for(&id, Some(before), Some(after), ChangeSource::Push));
                }
                None => match patch.to_order() {
                    Some(order) => {
                        let to = order.status;
                        out.cache.upsert(order);
                        out.changes.extend(change_for(&id, None, Some(to), ChangeSource::Push));
                    }
                    None => out.needs_refresh = true,
                },
            }
            out
        }

        IngestEvent::PushOrderCancelled { order_id } => {
            let mut out = MergeOutcome::unchanged(cache);
            if pending.is_pending(&order_id) {
                out.clear_pending.push(order_id.clone());
            }
            if let Some(existing) = out.cache.get_mut(&order_id) {
                let before = existing.status;
                existing.status = OrderStatus::Cancelled;
                out.changes.extend(change_for(
                    &order_id,
                    Some(before),
                    Some(OrderStatus::Cancelled),
                    ChangeSource::Push,
                ));
            }
            out.forwarded.push(Forwarded {
                kind: "order_cancelled".to_string(),
                order_id: Some(order_id),
                data: serde_json::Value::Null,
            });
            out
        }

        IngestEvent::PushAlert { kind, data } => {
            let mut out = MergeOutcome::unchanged(cache);
            let order_id = data
                .get("orderId")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            out.forwarded.push(Forwarded {
                kind,
                order_id,
                data,
            });
            out
        }

        IngestEvent::Optimistic { order_id, status } => {
            let mut out = MergeOutcome::unchanged(cache);
            if let Some(existing) = out.cache.get_mut(&order_id) {
                let before = existing.status;
                existing.status = status;
                out.changes.extend(change_for(
                    &order_id,
                    Some(before),
                    Some(status),
                    ChangeSource::Local,
                ));
            }
            out
        }

        IngestEvent::Revert(order) => {
            let mut out = MergeOutcome::unchanged(cache);
            let id = order.order_id.clone();
            if let Some(existing) = out.cache.get_mut(&id) {
                let before = existing.status;
                let after = order.status;
                *existing = order;
                out.changes
                    .extend(change_for(&id, Some(before), Some(after), ChangeSource::Local));
            }
            out
        }
    }
}

fn merge_poll(
    cache: &OrderCache,
    pending: &PendingMutations,
    snapshot: Vec<ops_schemas::Order>,
) -> MergeOutcome {
    let mut next = OrderCache::new();

    for order in snapshot {
        let kept = if pending.is_pending(&order.order_id) {
            cache.get(&order.order_id).cloned()
        } else {
            None
        };
        next.upsert(kept.unwrap_or(order));
    }

    // A tracked id the server no longer lists keeps its optimistic entry.
    for id in pending.ids() {
        if !next.contains(id) {
            if let Some(cached) = cache.get(id) {
                next.upsert(cached.clone());
            }
        }
    }

    let mut changes = Vec::new();
    for o in next.iter() {
        changes.extend(change_for(
            &o.order_id,
            cache.status_of(&o.order_id),
            Some(o.status),
            ChangeSource::Poll,
        ));
    }
    for id in cache.ids() {
        if !next.contains(id) {
            changes.push(CacheChange::Removed {
                order_id: id.to_string(),
            });
        }
    }
    changes.sort_by(|a, b| a.order_id().cmp(b.order_id()));

    MergeOutcome {
        cache: next,
        clear_pending: Vec::new(),
        changes,
        forwarded: Vec::new(),
        needs_refresh: false,
    }
}

fn change_for(
    id: &str,
    before: Option<OrderStatus>,
    after: Option<OrderStatus>,
    source: ChangeSource,
) -> Option<CacheChange> {
    match (before, after) {
        (None, Some(_)) => Some(CacheChange::Added {
            order_id: id.to_string(),
            source,
        }),
        (Some(from), Some(to)) if from != to => Some(CacheChange::StatusChanged {
            order_id: id.to_string(),
            from,
            to,
            source,
        }),
        (Some(_), None) => Some(CacheChange::Removed {
            order_id: id.to_string(),
        }),
        _ => None,
    }
}
