//! Notification dispatcher.
//!
//! Turns merge outcomes and engine events into user-facing notifications,
//! fans them out over a broadcast channel and keeps a bounded history
//! (newest first) for late subscribers.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ops_reconcile::{CacheChange, ChangeSource, Forwarded, OrderCache};
use ops_schemas::OrderStatus;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Order,
    Alert,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub ts: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        order_id: Option<String>,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            order_id,
            ts,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Cloneable handle; clones share one channel and one history.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: broadcast::Sender<Notification>,
    history: Arc<Mutex<VecDeque<Notification>>>,
    cap: usize,
}

impl NotificationDispatcher {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(cap))),
            cap,
        }
    }

    pub fn publish(&self, n: Notification) {
        {
            let mut h = self
                .history
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            h.push_front(n.clone());
            h.truncate(self.cap);
        }
        // No subscribers is fine; history still has it.
        let _ = self.tx.send(n);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Newest first, at most `cap` entries.
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Notifications for one merge.
///
/// `seeding` suppresses new-order notifications for the first poll, which
/// only fills the cache.
pub fn from_merge(
    cache: &OrderCache,
    changes: &[CacheChange],
    forwarded: &[Forwarded],
    seeding: bool,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let cancelled_via_push: BTreeSet<&str> = forwarded
        .iter()
        .filter(|f| f.kind == "order_cancelled")
        .filter_map(|f| f.order_id.as_deref())
        .collect();

    let mut out = Vec::new();

    for change in changes {
        match change {
            CacheChange::Added { order_id, source } if source.is_confirmed() && !seeding => {
                let who = cache
                    .get(order_id)
                    .map(|o| o.customer_name.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("a customer");
                out.push(Notification::new(
                    NotificationKind::Order,
                    "New order",
                    format!("Order {order_id} from {who}"),
                    Some(order_id.clone()),
                    now,
                ));
            }
            CacheChange::StatusChanged {
                order_id,
                to: OrderStatus::Cancelled,
                source,
                ..
            } if source.is_confirmed() && !cancelled_via_push.contains(order_id.as_str()) => {
                out.push(cancelled(order_id, now));
            }
            CacheChange::StatusChanged {
                order_id,
                to,
                source,
                ..
            } if *source != ChangeSource::Local && *to != OrderStatus::Cancelled && !seeding => {
                out.push(Notification::new(
                    NotificationKind::Info,
                    "Order updated",
                    format!("Order {order_id} is now {to}"),
                    Some(order_id.clone()),
                    now,
                ));
            }
            _ => {}
        }
    }

    for f in forwarded {
        match f.kind.as_str() {
            "order_cancelled" => {
                if let Some(id) = &f.order_id {
                    out.push(cancelled(id, now));
                }
            }
            "inventory_alert" => out.push(Notification::new(
                NotificationKind::Alert,
                "Inventory alert",
                text_of(&f.data).unwrap_or_else(|| "Stock level changed".to_string()),
                f.order_id.clone(),
                now,
            )),
            kind => out.push(Notification::new(
                NotificationKind::Info,
                title_of(kind),
                text_of(&f.data).unwrap_or_default(),
                f.order_id.clone(),
                now,
            )),
        }
    }

    out
}

fn cancelled(order_id: &str, now: DateTime<Utc>) -> Notification {
    Notification::new(
        NotificationKind::Alert,
        "Order cancelled",
        format!("Order {order_id} was cancelled"),
        Some(order_id.to_string()),
        now,
    )
}

fn title_of(kind: &str) -> String {
    match kind {
        "staff_update" => "Staff update".to_string(),
        "kitchen_update" => "Kitchen update".to_string(),
        other => other.replace('_', " "),
    }
}

fn text_of(data: &Value) -> Option<String> {
    ["message", "text", "item", "name"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> Notification {
        Notification::new(NotificationKind::Info, format!("t{i}"), "", None, Utc::now())
    }

    #[test]
    fn history_is_capped_newest_first() {
        let d = NotificationDispatcher::new(3);
        for i in 0..5 {
            d.publish(n(i));
        }
        let titles: Vec<_> = d.history().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["t4", "t3", "t2"]);
    }

    #[tokio::test]
    async fn subscribers_receive_published() {
        let d = NotificationDispatcher::new(10);
        let mut rx = d.subscribe();
        d.publish(n(1));
        assert_eq!(rx.recv().await.unwrap().title, "t1");
    }

    #[test]
    fn seeding_poll_raises_no_new_order_notifications() {
        let changes = vec![CacheChange::Added {
            order_id: "A".into(),
            source: ChangeSource::Poll,
        }];
        let none = from_merge(&OrderCache::new(), &changes, &[], true, Utc::now());
        assert!(none.is_empty());
        let some = from_merge(&OrderCache::new(), &changes, &[], false, Utc::now());
        assert_eq!(some[0].kind, NotificationKind::Order);
    }

    #[test]
    fn push_cancellation_alerts_once() {
        let changes = vec![CacheChange::StatusChanged {
            order_id: "A".into(),
            from: OrderStatus::Cooking,
            to: OrderStatus::Cancelled,
            source: ChangeSource::Push,
        }];
        let forwarded = vec![Forwarded {
            kind: "order_cancelled".into(),
            order_id: Some("A".into()),
            data: Value::Null,
        }];
        let out = from_merge(&OrderCache::new(), &changes, &forwarded, false, Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, NotificationKind::Alert);
    }

    #[test]
    fn local_changes_are_silent() {
        let changes = vec![CacheChange::StatusChanged {
            order_id: "A".into(),
            from: OrderStatus::Pending,
            to: OrderStatus::Received,
            source: ChangeSource::Local,
        }];
        assert!(from_merge(&OrderCache::new(), &changes, &[], false, Utc::now()).is_empty());
    }
}
