//! Push channel client: session supervision, reconnect backoff, fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::frame::{parse_frame, subscribe_frame, EventKind, PushEvent};
use crate::registry::{invoke_all, Handler, HandlerId, Registry};
use crate::transport::{Connection, Transport};

// ---------------------------------------------------------------------------
// Config / state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PushConfig {
    /// Full channel URL including the query string (see [`push_url`]).
    pub url: String,
    pub channels: Vec<String>,
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            channels: ["orders", "kitchen", "inventory", "staff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            base_delay: Duration::from_millis(3_000),
            max_attempts: 5,
        }
    }
}

// The URL carries the auth token in its query string.
impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("PushConfig")
            .field("url", &format!("{base}?<redacted>"))
            .field("channels", &self.channels)
            .field("base_delay", &self.base_delay)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Build the channel URL: `{ws_url}?token=..&tenantId=..&role=staff`.
pub fn push_url(ws_url: &str, token: &str, tenant_id: &str) -> String {
    let sep = if ws_url.contains('?') { '&' } else { '?' };
    format!(
        "{ws_url}{sep}token={}&tenantId={}&role=staff",
        encode_component(token),
        encode_component(tenant_id)
    )
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not connected; the frame was discarded.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub reconnect_attempts: u64,
    pub handler_panics: u64,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    reconnect_attempts: AtomicU64,
    handler_panics: AtomicU64,
}

// ---------------------------------------------------------------------------
// PushClient
// ---------------------------------------------------------------------------

/// Owned push channel client. Cheap to clone; clones share one channel.
#[derive(Clone)]
pub struct PushClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: PushConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ConnectionState>,
    registry: Mutex<Registry>,
    supervisor: Mutex<Option<Supervisor>>,
    /// Bumped by every `connect` and `disconnect`. A supervisor only writes
    /// state or the outbound slot while its generation is still current.
    generation: Mutex<u64>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    counters: Counters,
}

struct Supervisor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum Step {
    Closed(String),
    Shutdown,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PushClient {
    pub fn new(config: PushConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                clock,
                state,
                registry: Mutex::new(Registry::default()),
                supervisor: Mutex::new(None),
                generation: Mutex::new(0),
                outbound: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Open the channel and keep it open.
    ///
    /// No-op while a session or a reconnect cycle is already running. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self) {
        let mut slot = lock(&self.inner.supervisor);
        if slot.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("push connect ignored; session already active");
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let generation = {
            let mut g = lock(&self.inner.generation);
            *g += 1;
            self.inner.state.send_replace(ConnectionState::Connecting);
            *g
        };
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.supervise(generation, stop_rx).await });
        *slot = Some(Supervisor { stop, task });
    }

    /// Close the channel, stop reconnecting and drop every handler.
    pub fn disconnect(&self) {
        lock(&self.inner.registry).clear();
        if let Some(sup) = lock(&self.inner.supervisor).take() {
            let _ = sup.stop.send(true);
        }
        {
            let mut g = lock(&self.inner.generation);
            *g += 1;
            lock(&self.inner.outbound).take();
            self.inner.state.send_replace(ConnectionState::Disconnected);
        }
        info!("push channel disconnected by caller");
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).on(kind, Arc::new(handler) as Handler)
    }

    /// Register for every wire event regardless of kind.
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).on_any(Arc::new(handler) as Handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        lock(&self.inner.registry).off(id)
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> PushStats {
        let c = &self.inner.counters;
        PushStats {
            frames_received: c.frames_received.load(Ordering::Relaxed),
            malformed_frames: c.malformed_frames.load(Ordering::Relaxed),
            reconnect_attempts: c.reconnect_attempts.load(Ordering::Relaxed),
            handler_panics: c.handler_panics.load(Ordering::Relaxed),
        }
    }

    /// Send `{action, data}` on the live session.
    ///
    /// Frames are never queued for a later session: when not connected the
    /// frame is dropped.
    pub fn send(&self, action: &str, data: Value) -> SendOutcome {
        if self.state() != ConnectionState::Connected {
            warn!(action, "push channel not connected; dropping outbound frame");
            return SendOutcome::Dropped;
        }
        let frame = json!({ "action": action, "data": data }).to_string();
        match lock(&self.inner.outbound).as_ref() {
            Some(tx) if tx.send(frame).is_ok() => SendOutcome::Sent,
            _ => {
                warn!(action, "push session closing; dropping outbound frame");
                SendOutcome::Dropped
            }
        }
    }

    pub fn acknowledge_order(&self, order_id: &str) -> SendOutcome {
        self.send("acknowledge_order", json!({ "orderId": order_id }))
    }

    pub fn notify_order_taken(&self, order_id: &str) -> SendOutcome {
        self.send("order_taken", json!({ "orderId": order_id }))
    }

    pub fn update_staff_status(&self, staff_id: &str, status: &str) -> SendOutcome {
        self.send("staff_status", json!({ "staffId": staff_id, "status": status }))
    }
}

// ---------------------------------------------------------------------------
// Session supervision
// ---------------------------------------------------------------------------

impl Inner {
    /// Publish `s` if `generation` is still the current session. Returns
    /// `false` once a later `connect` or `disconnect` has taken over.
    fn set_state(&self, generation: u64, s: ConnectionState) -> bool {
        let current = lock(&self.generation);
        if *current != generation {
            return false;
        }
        self.state.send_replace(s);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        *lock(&self.generation) == generation
    }

    fn install_outbound(&self, generation: u64, tx: mpsc::UnboundedSender<String>) -> bool {
        let current = lock(&self.generation);
        if *current != generation {
            return false;
        }
        *lock(&self.outbound) = Some(tx);
        self.state.send_replace(ConnectionState::Connected);
        true
    }

    fn clear_outbound(&self, generation: u64) {
        let current = lock(&self.generation);
        if *current == generation {
            lock(&self.outbound).take();
        }
    }

    fn dispatch(&self, event: &PushEvent) {
        let handlers = lock(&self.registry).matching(&event.kind);
        let panicked = invoke_all(&handlers, event);
        if panicked > 0 {
            self.counters
                .handler_panics
                .fetch_add(panicked as u64, Ordering::Relaxed);
        }
    }

    fn dispatch_lifecycle(&self, kind: EventKind) {
        self.dispatch(&PushEvent::lifecycle(kind, self.clock.now()));
    }

    async fn supervise(self: Arc<Self>, generation: u64, mut stop: watch::Receiver<bool>) {
        let mut attempts: u32 = 0;

        loop {
            if *stop.borrow() || !self.set_state(generation, ConnectionState::Connecting) {
                break;
            }

            let opened = tokio::select! {
                r = self.transport.connect(&self.config.url) => r,
                _ = stop.changed() => break,
            };

            match opened {
                Ok(mut conn) => {
                    attempts = 0;
                    match self.run_session(generation, &mut *conn, &mut stop).await {
                        Step::Shutdown => {
                            conn.close().await;
                            break;
                        }
                        Step::Closed(reason) => {
                            warn!(reason = %reason, "push channel closed unexpectedly")
                        }
                    }
                }
                Err(e) => warn!(error = %e, attempt = attempts, "push channel failed to open"),
            }

            if !self.set_state(generation, ConnectionState::Disconnected) {
                break;
            }
            self.dispatch_lifecycle(EventKind::Disconnected);

            if attempts >= self.config.max_attempts {
                warn!(
                    max_attempts = self.config.max_attempts,
                    "push reconnect attempts exhausted; live updates stopped"
                );
                if self.is_current(generation) {
                    self.dispatch_lifecycle(EventKind::MaxReconnectAttemptsReached);
                }
                break;
            }

            attempts += 1;
            self.counters
                .reconnect_attempts
                .fetch_add(1, Ordering::Relaxed);
            let delay = self.config.base_delay * attempts;
            info!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "push channel reconnecting"
            );

            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = stop.changed() => break,
            }
        }

        self.set_state(generation, ConnectionState::Disconnected);
    }

    async fn run_session(
        &self,
        generation: u64,
        conn: &mut dyn Connection,
        stop: &mut watch::Receiver<bool>,
    ) -> Step {
        if let Err(e) = conn.send(subscribe_frame(&self.config.channels)).await {
            return Step::Closed(format!("subscribe failed: {e}"));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if !self.install_outbound(generation, tx) {
            return Step::Shutdown;
        }
        info!(channels = ?self.config.channels, "push channel connected");
        self.dispatch_lifecycle(EventKind::Connected);

        let step = loop {
            tokio::select! {
                frame = conn.recv() => match frame {
                    Some(Ok(text)) => self.on_frame(&text),
                    Some(Err(e)) => break Step::Closed(e.to_string()),
                    None => break Step::Closed("closed by peer".to_string()),
                },
                Some(out) = rx.recv() => {
                    if let Err(e) = conn.send(out).await {
                        break Step::Closed(e.to_string());
                    }
                }
                _ = stop.changed() => break Step::Shutdown,
            }
        };

        self.clear_outbound(generation);
        step
    }

    fn on_frame(&self, text: &str) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        match parse_frame(text, self.clock.now()) {
            Ok(event) => {
                debug!(kind = %event.kind, "push event");
                self.dispatch(&event);
            }
            Err(e) => {
                self.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping malformed push frame");
            }
        }
    }
}
