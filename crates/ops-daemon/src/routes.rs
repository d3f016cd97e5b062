//! Axum router and all HTTP handlers for ops-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Tests compose the bare router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use ops_runtime::{AcceptError, ServiceError, StaffIdentity};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        AcceptRequest, AcceptResponse, ErrorResponse, HealthResponse, NotificationsResponse,
        OrderResponse, OrdersResponse, RefreshResponse, StatusResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/orders", get(orders))
        .route("/v1/orders/:order_id", get(order_one))
        .route("/v1/orders/:order_id/accept", post(accept))
        .route("/v1/refresh", post(refresh))
        .route("/v1/notifications", get(notifications))
        .route("/v1/notifications/clear", post(notifications_clear))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let m = st.engine.read_model();
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            tenant_id: st.tenant_id.clone(),
            config_hash: st.config_hash.clone(),
            seeded: m.seeded,
            connection: m.connection,
            push_enabled: st.push.is_some(),
            push_stats: st.push.as_ref().map(|p| p.stats()),
            last_poll: m.last_poll.clone(),
            order_count: m.orders.len(),
            pending_count: m.pending.len(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/orders  /v1/orders/:order_id
// ---------------------------------------------------------------------------

pub(crate) async fn orders(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let m = st.engine.read_model();
    (
        StatusCode::OK,
        Json(OrdersResponse {
            version: m.version,
            seeded: m.seeded,
            orders: m.orders,
            pending: m.pending,
        }),
    )
}

pub(crate) async fn order_one(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Response {
    let m = st.engine.read_model();
    match m.order(&order_id) {
        Some(order) => (
            StatusCode::OK,
            Json(OrderResponse {
                order: order.clone(),
                pending: m.is_pending(&order_id),
            }),
        )
            .into_response(),
        None => refused(AcceptError::UnknownOrder { order_id }),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/orders/:order_id/accept
// ---------------------------------------------------------------------------

/// Accept a `PENDING` order on behalf of the staff member in the body.
///
/// Resolves once the order service has answered. On success the push
/// channel (when connected) is told the order was taken.
pub(crate) async fn accept(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    body: Option<Json<AcceptRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let staff = StaffIdentity {
        staff_id: req.staff_id,
        staff_name: req.staff_name,
    };

    match st.engine.accept_as(&order_id, staff).await {
        Ok(()) => {
            info!(order_id = %order_id, "order accepted");
            if let Some(push) = &st.push {
                push.notify_order_taken(&order_id);
            }
            let m = st.engine.read_model();
            (
                StatusCode::OK,
                Json(AcceptResponse {
                    status: m.status_of(&order_id),
                    pending: m.is_pending(&order_id),
                    order_id,
                    accepted: true,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!(order_id = %order_id, kind = e.kind(), error = %e, "accept refused");
            refused(e)
        }
    }
}

fn refused(e: AcceptError) -> Response {
    let status = match &e {
        AcceptError::Busy { .. } => StatusCode::CONFLICT,
        AcceptError::UnknownOrder { .. } => StatusCode::NOT_FOUND,
        AcceptError::Workflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AcceptError::Service(ServiceError::Conflict { .. }) => StatusCode::CONFLICT,
        AcceptError::Service(ServiceError::TransientNetwork(_)) => StatusCode::SERVICE_UNAVAILABLE,
        AcceptError::Service(ServiceError::Rejected { .. } | ServiceError::Decode(_)) => {
            StatusCode::BAD_GATEWAY
        }
        AcceptError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    let order_id = match &e {
        AcceptError::Busy { order_id } | AcceptError::UnknownOrder { order_id } => {
            Some(order_id.clone())
        }
        _ => None,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            kind: e.kind().to_string(),
            order_id,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/refresh
// ---------------------------------------------------------------------------

pub(crate) async fn refresh(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let requested = st.engine.refresh();
    let status = if requested {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(RefreshResponse { requested }))
}

// ---------------------------------------------------------------------------
// GET /v1/notifications  POST /v1/notifications/clear
// ---------------------------------------------------------------------------

pub(crate) async fn notifications(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(NotificationsResponse {
            notifications: st.engine.notifications().history(),
        }),
    )
}

pub(crate) async fn notifications_clear(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.engine.notifications().clear();
    (
        StatusCode::OK,
        Json(NotificationsResponse {
            notifications: Vec::new(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Orders(_) => "orders",
                    BusMsg::Notification(_) => "notification",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged
        }
    })
}
