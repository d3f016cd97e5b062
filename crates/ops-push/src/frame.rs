//! Push frame parsing.
//!
//! Inbound frames are JSON objects. The event type is read from `type`,
//! falling back to `action`; the payload from `data`, falling back to
//! `payload`.
//!
//! ```text
//! { "type": "order_update", "data": { "orderId": "...", "status": "COOKING" } }
//! { "type": "ORDER_UPDATE", "payload": { ... } }
//! { "action": "new_order",  "data": { ... } }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Push event kind. Wire names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    NewOrder,
    OrderUpdate,
    OrderCancelled,
    InventoryAlert,
    StaffUpdate,
    KitchenUpdate,
    /// Any other type name, normalised.
    Other(String),

    // Lifecycle events raised by the client itself, never read off the wire.
    Connected,
    Disconnected,
    MaxReconnectAttemptsReached,
}

impl EventKind {
    pub fn from_wire(raw: &str) -> Self {
        let norm = raw.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "new_order" => EventKind::NewOrder,
            "order_update" => EventKind::OrderUpdate,
            "order_cancelled" => EventKind::OrderCancelled,
            "inventory_alert" => EventKind::InventoryAlert,
            "staff_update" => EventKind::StaffUpdate,
            "kitchen_update" => EventKind::KitchenUpdate,
            _ => EventKind::Other(norm),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::NewOrder => "new_order",
            EventKind::OrderUpdate => "order_update",
            EventKind::OrderCancelled => "order_cancelled",
            EventKind::InventoryAlert => "inventory_alert",
            EventKind::StaffUpdate => "staff_update",
            EventKind::KitchenUpdate => "kitchen_update",
            EventKind::Other(name) => name,
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::MaxReconnectAttemptsReached => "max_reconnect_attempts_reached",
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::Connected | EventKind::Disconnected | EventKind::MaxReconnectAttemptsReached
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub kind: EventKind,
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

impl PushEvent {
    pub fn lifecycle(kind: EventKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            data: Value::Null,
            received_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    NotJson(String),
    NotObject,
    MissingType,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::NotJson(e) => write!(f, "frame is not JSON: {e}"),
            FrameError::NotObject => write!(f, "frame is not a JSON object"),
            FrameError::MissingType => write!(f, "frame has no 'type' or 'action'"),
        }
    }
}

impl std::error::Error for FrameError {}

pub fn parse_frame(text: &str, received_at: DateTime<Utc>) -> Result<PushEvent, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FrameError::NotJson(e.to_string()))?;
    let obj = value.as_object().ok_or(FrameError::NotObject)?;

    let kind = ["type", "action"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .ok_or(FrameError::MissingType)?;

    let data = obj
        .get("data")
        .or_else(|| obj.get("payload"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(PushEvent {
        kind: EventKind::from_wire(kind),
        data,
        received_at,
    })
}

/// The frame sent once per session right after the channel opens.
pub fn subscribe_frame(channels: &[String]) -> String {
    json!({ "action": "subscribe", "channels": channels }).to_string()
}
