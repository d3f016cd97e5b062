//! Shared runtime state for ops-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The order engine owns
//! all order state; this module only holds handles to it plus the SSE bus.

use std::sync::Arc;
use std::time::Duration;

use ops_push::{ConnectionState, PushClient};
use ops_runtime::{EngineHandle, Notification, ReadModel};
use ops_schemas::Order;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Orders(OrdersSnapshot),
    Notification(Notification),
}

/// Order list as pushed to views after every engine change.
#[derive(Clone, Debug, Serialize)]
pub struct OrdersSnapshot {
    pub version: u64,
    pub seeded: bool,
    pub connection: ConnectionState,
    pub orders: Vec<Order>,
    pub pending: Vec<String>,
}

impl From<&ReadModel> for OrdersSnapshot {
    fn from(m: &ReadModel) -> Self {
        Self {
            version: m.version,
            seeded: m.seeded,
            connection: m.connection,
            orders: m.orders.clone(),
            pending: m.pending.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: EngineHandle,
    /// `None` when the push channel is disabled.
    pub push: Option<PushClient>,
    pub tenant_id: String,
    /// Hash of the merged config the daemon booted with.
    pub config_hash: Option<String>,
}

impl AppState {
    pub fn new(engine: EngineHandle, push: Option<PushClient>, tenant_id: impl Into<String>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "ops-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
            push,
            tenant_id: tenant_id.into(),
            config_hash: None,
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Forward engine read-model changes and notifications onto the SSE bus.
///
/// Both relays end when the engine stops.
pub fn spawn_bus_relay(state: Arc<AppState>) {
    let st = Arc::clone(&state);
    tokio::spawn(async move {
        let mut rx = st.engine.subscribe();
        loop {
            let snap = OrdersSnapshot::from(&*rx.borrow_and_update());
            let _ = st.bus.send(BusMsg::Orders(snap));
            if rx.changed().await.is_err() {
                debug!("engine stopped; orders relay exiting");
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut rx = state.engine.notifications().subscribe();
        loop {
            match rx.recv().await {
                Ok(n) => {
                    let _ = state.bus.send(BusMsg::Notification(n));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "notification relay lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
