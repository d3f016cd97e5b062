//! Push payload decoding.
//!
//! Turns a push event (normalised kind + JSON payload) into an
//! [`IngestEvent`]. The order service has broadcast two payload shapes over
//! time, so both are accepted:
//!
//! ```text
//! { "orderId": "...", "status": "...", ... }              // bare order record
//! { "order": { ... }, "orderId"?, "status"?, "timestamp" } // broadcast envelope
//! ```

use ops_schemas::{Order, OrderPatch, SchemaError};
use serde_json::Value;

use crate::types::IngestEvent;

/// Lower-case a frame type so `NEW_ORDER`, `new-order` and `new_order` agree.
pub fn normalize_kind(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

/// Decode one push payload.
///
/// Errors mean the payload is unusable; the caller drops it and keeps the
/// cache as is.
pub fn decode_push(kind: &str, data: &Value) -> Result<IngestEvent, SchemaError> {
    match normalize_kind(kind).as_str() {
        "new_order" => {
            let record = data.get("order").filter(|o| o.is_object()).unwrap_or(data);
            Ok(IngestEvent::PushNewOrder(Order::from_value(record)?))
        }
        "order_update" => Ok(IngestEvent::PushOrderUpdate(OrderPatch::from_value(data)?)),
        "order_cancelled" => {
            let order_id = order_id_in(data).ok_or(SchemaError::EmptyOrderId)?;
            Ok(IngestEvent::PushOrderCancelled { order_id })
        }
        other => Ok(IngestEvent::PushAlert {
            kind: other.to_string(),
            data: data.clone(),
        }),
    }
}

fn order_id_in(data: &Value) -> Option<String> {
    let pick = |v: &Value| {
        v.get("orderId")
            .or_else(|| v.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    pick(data)
        .or_else(|| data.get("order").and_then(pick))
        .filter(|s| !s.trim().is_empty())
}
