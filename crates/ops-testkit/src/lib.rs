//! In-process fakes for scenario tests.
//!
//! - [`FakeOrderService`]: scripted order service with server-side accept
//!   semantics, call counters and gates to hold calls in flight.
//! - [`ScriptedTransport`]: push transport whose connections are driven by
//!   [`Peer`] handles.
//! - [`TestClock`]: settable `now()`; records every backoff sleep and then
//!   sleeps on tokio time (use with `start_paused`).

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ops_push::{Clock, Connection, Transport, TransportError};
use ops_runtime::{OrderService, ServiceError, StaffIdentity};
use ops_schemas::{LineItem, Order, OrderStatus};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// 2026-10-14T12:00:00Z. Scenario "now".
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

/// Order created two minutes before [`fixed_now`].
pub fn order(id: &str, status: OrderStatus) -> Order {
    order_at(id, status, fixed_now() - chrono::Duration::minutes(2))
}

pub fn order_at(id: &str, status: OrderStatus, created_at: DateTime<Utc>) -> Order {
    Order::new(
        id,
        format!("Customer {id}"),
        vec![LineItem::new("Pad Thai", 1)],
        1_299,
        status,
        created_at,
    )
}

/// Wire form of an order, as the service sends it in push payloads.
pub fn order_json(o: &Order) -> Value {
    serde_json::to_value(o).unwrap_or_else(|_| json!({}))
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Holds calls until released. Cloned handles share permits.
#[derive(Clone, Debug)]
pub struct Gate {
    sem: Arc<Semaphore>,
}

impl Gate {
    fn closed() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn release_one(&self) {
        self.sem.add_permits(1);
    }

    pub fn release_all(&self) {
        self.sem.add_permits(1 << 20);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

// ---------------------------------------------------------------------------
// FakeOrderService
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    orders: BTreeMap<String, Order>,
    list_failures: VecDeque<ServiceError>,
    accept_failures: VecDeque<ServiceError>,
    held_lists: VecDeque<Gate>,
    held_accepts: VecDeque<Gate>,
    accept_gate: Option<Gate>,
    accepted_by: Vec<(String, StaffIdentity)>,
}

/// Server-side order store. `accept_order` behaves like the real take
/// endpoint: only `PENDING` orders move to `RECEIVED`.
#[derive(Default)]
pub struct FakeOrderService {
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
    accept_calls: AtomicUsize,
}

impl FakeOrderService {
    pub fn new(orders: impl IntoIterator<Item = Order>) -> Arc<Self> {
        let svc = Self::default();
        svc.set_orders(orders);
        Arc::new(svc)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_orders(&self, orders: impl IntoIterator<Item = Order>) {
        lock(&self.state).orders = orders
            .into_iter()
            .map(|o| (o.order_id.clone(), o))
            .collect();
    }

    pub fn upsert(&self, order: Order) {
        lock(&self.state).orders.insert(order.order_id.clone(), order);
    }

    pub fn set_status(&self, order_id: &str, status: OrderStatus) {
        if let Some(o) = lock(&self.state).orders.get_mut(order_id) {
            o.status = status;
        }
    }

    pub fn remove(&self, order_id: &str) {
        lock(&self.state).orders.remove(order_id);
    }

    pub fn server_status(&self, order_id: &str) -> Option<OrderStatus> {
        lock(&self.state).orders.get(order_id).map(|o| o.status)
    }

    pub fn fail_next_list(&self, e: ServiceError) {
        lock(&self.state).list_failures.push_back(e);
    }

    /// The next accept call fails with `e`. Bound when the call arrives, so
    /// overlapping accepts fail in call order.
    pub fn fail_next_accept(&self, e: ServiceError) {
        lock(&self.state).accept_failures.push_back(e);
    }

    /// The next list call snapshots the store immediately but does not
    /// answer until the returned gate is released.
    pub fn hold_next_list(&self) -> Gate {
        let gate = Gate::closed();
        lock(&self.state).held_lists.push_back(gate.clone());
        gate
    }

    /// The next accept call waits on the returned gate before answering.
    /// Later calls are not held by it.
    pub fn hold_next_accept(&self) -> Gate {
        let gate = Gate::closed();
        lock(&self.state).held_accepts.push_back(gate.clone());
        gate
    }

    /// Every accept call waits on the returned gate before answering.
    pub fn hold_accepts(&self) -> Gate {
        let gate = Gate::closed();
        lock(&self.state).accept_gate = Some(gate.clone());
        gate
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }

    pub fn accepted_by(&self) -> Vec<(String, StaffIdentity)> {
        lock(&self.state).accepted_by.clone()
    }
}

#[async_trait]
impl OrderService for FakeOrderService {
    async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let (snapshot, hold, failure) = {
            let mut st = lock(&self.state);
            let snapshot: Vec<Order> = st.orders.values().cloned().collect();
            (snapshot, st.held_lists.pop_front(), st.list_failures.pop_front())
        };
        if let Some(gate) = hold {
            gate.pass().await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }

    async fn accept_order(
        &self,
        order_id: &str,
        staff: &StaffIdentity,
    ) -> Result<Order, ServiceError> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let (held, gate, failure) = {
            let mut st = lock(&self.state);
            (
                st.held_accepts.pop_front(),
                st.accept_gate.clone(),
                st.accept_failures.pop_front(),
            )
        };
        if let Some(gate) = held {
            gate.pass().await;
        }
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let mut st = lock(&self.state);
        let updated = match st.orders.get_mut(order_id) {
            None => {
                return Err(ServiceError::Rejected {
                    status: 404,
                    message: "Order not found".to_string(),
                })
            }
            Some(o) if o.status != OrderStatus::Pending => {
                return Err(ServiceError::Conflict {
                    message: format!("Order cannot be taken. Current status: {}", o.status),
                })
            }
            Some(o) => {
                o.status = OrderStatus::Received;
                o.assigned_to = staff.staff_name.clone();
                o.clone()
            }
        };
        st.accepted_by.push((order_id.to_string(), staff.clone()));
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// TestClock
// ---------------------------------------------------------------------------

pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl TestClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

enum PeerMsg {
    Frame(String),
    Close,
}

enum ConnectStep {
    Refuse,
    Open(mpsc::UnboundedReceiver<PeerMsg>, Arc<Mutex<Vec<String>>>),
}

/// Server side of one scripted push connection.
///
/// Dropping the peer closes the connection.
pub struct Peer {
    tx: mpsc::UnboundedSender<PeerMsg>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Peer {
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.tx.send(PeerMsg::Frame(text.into()));
    }

    /// Send `{"type": kind, "data": data}`.
    pub fn push_event(&self, kind: &str, data: Value) {
        self.push(json!({ "type": kind, "data": data }).to_string());
    }

    pub fn close(&self) {
        let _ = self.tx.send(PeerMsg::Close);
    }

    /// Frames the client sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

/// Connect attempts consume scripted steps in order; once the script is
/// exhausted every attempt is refused.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<ConnectStep>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_next(&self) {
        lock(&self.steps).push_back(ConnectStep::Refuse);
    }

    pub fn open_next(&self) -> Peer {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        lock(&self.steps).push_back(ConnectStep::Open(rx, Arc::clone(&sent)));
        Peer { tx, sent }
    }

    pub fn connect_attempts(&self) -> usize {
        lock(&self.urls).len()
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        lock(&self.urls).push(url.to_string());
        let step = lock(&self.steps).pop_front();
        match step {
            Some(ConnectStep::Open(rx, sent)) => Ok(Box::new(ScriptedConnection { rx, sent })),
            Some(ConnectStep::Refuse) | None => {
                Err(TransportError::Connect("connection refused".to_string()))
            }
        }
    }
}

struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<PeerMsg>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        lock(&self.sent).push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        match self.rx.recv().await {
            Some(PeerMsg::Frame(text)) => Some(Ok(text)),
            Some(PeerMsg::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
