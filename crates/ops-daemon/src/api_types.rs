//! Request and response types for all ops-daemon HTTP endpoints.
//!
//! No business logic lives here.

use ops_push::{ConnectionState, PushStats};
use ops_runtime::{Notification, PollStatus};
use ops_schemas::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub tenant_id: String,
    pub config_hash: Option<String>,
    pub seeded: bool,
    pub connection: ConnectionState,
    pub push_enabled: bool,
    pub push_stats: Option<PushStats>,
    pub last_poll: Option<PollStatus>,
    pub order_count: usize,
    pub pending_count: usize,
}

// ---------------------------------------------------------------------------
// /v1/orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OrdersResponse {
    pub version: u64,
    pub seeded: bool,
    pub orders: Vec<Order>,
    /// Orders with an action in flight; their action buttons stay disabled.
    pub pending: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    pub pending: bool,
}

/// Optional body of POST /v1/orders/:order_id/accept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptResponse {
    pub order_id: String,
    pub accepted: bool,
    /// Cached status right after the accept (optimistic until confirmed).
    pub status: Option<OrderStatus>,
    pub pending: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable cause: "busy" | "unknown_order" | "workflow" |
    /// "conflict" | "rejected" | "transient_network" | "decode" |
    /// "engine_stopped".
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

// ---------------------------------------------------------------------------
// /v1/notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NotificationsResponse {
    /// Newest first.
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub requested: bool,
}
