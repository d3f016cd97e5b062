//! Single-writer order engine.
//!
//! One tokio task owns the order cache, the pending-mutation tracker and the
//! poll sequencer. Every source (poll loop, push handlers, staff actions)
//! posts a [`Command`]; network calls run on spawned tasks and post their
//! results back as completions. Views read the published [`ReadModel`].
//!
//! # Invariants
//!
//! - **Single writer**: the cache and tracker are only touched inside the
//!   actor, one message at a time.
//! - **Single flight**: `accept` on a tracked order is refused as `Busy`
//!   without a network call.
//! - **Revert on failure**: a failed accept restores the last
//!   server-confirmed version (unless a push already superseded it) and
//!   forces an immediate poll.
//! - **Confirmation**: under [`ConfirmationPolicy::AwaitConfirmation`], a
//!   successful accept stays tracked until a push confirms it or a poll
//!   issued after the success is adopted.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ops_push::{Clock, ConnectionState};
use ops_reconcile::{
    decode_push, merge, IngestEvent, OrderCache, PollSeq, PollSequencer, SlowOrderWatch,
};
use ops_schemas::{Order, OrderStatus};
use ops_workflow::{request_manual, MutationTicket, PendingMutations};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AcceptError, ServiceError};
use crate::notify::{self, Notification, NotificationDispatcher, NotificationKind};
use crate::service::{OrderService, StaffIdentity};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// When a successful accept stops shielding the order from polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Keep the order tracked until a push confirms it or a poll issued after
    /// the success response is adopted. Use when the push channel is on.
    AwaitConfirmation,
    /// Release as soon as the service answers 2xx and trust the next poll.
    OnResponse,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub confirmation: ConfirmationPolicy,
    pub history_cap: usize,
    pub slow_threshold: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirmation: ConfirmationPolicy::AwaitConfirmation,
            history_cap: 50,
            slow_threshold: chrono::Duration::minutes(15),
        }
    }
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    pub seq: u64,
    pub ok: bool,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadModel {
    pub orders: Vec<Order>,
    /// Orders with a staff action in flight; the UI disables their actions.
    pub pending: Vec<String>,
    pub connection: ConnectionState,
    /// `true` once the first poll has filled the cache.
    pub seeded: bool,
    pub last_poll: Option<PollStatus>,
    pub version: u64,
}

impl ReadModel {
    fn empty() -> Self {
        Self {
            orders: Vec::new(),
            pending: Vec::new(),
            connection: ConnectionState::Disconnected,
            seeded: false,
            last_poll: None,
            version: 0,
        }
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }

    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.order(order_id).map(|o| o.status)
    }

    pub fn is_pending(&self, order_id: &str) -> bool {
        self.pending.iter().any(|p| p == order_id)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Scheduled,
    Explicit,
    AfterAccept,
    AcceptFailed,
    PushGap,
    Reconnected,
}

enum Command {
    Refresh(RefreshReason),
    Accept {
        order_id: String,
        staff: StaffIdentity,
        reply: oneshot::Sender<Result<(), AcceptError>>,
    },
    Push {
        kind: String,
        data: Value,
    },
    Connection(ConnectionState),
    PushStalled,
    CheckSlow,
    Shutdown,
}

enum Completion {
    Poll {
        seq: PollSeq,
        result: Result<Vec<Order>, ServiceError>,
    },
    Accept {
        order_id: String,
        ticket: MutationTicket,
        result: Result<Order, ServiceError>,
        reply: oneshot::Sender<Result<(), AcceptError>>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
    model: watch::Receiver<ReadModel>,
    notifier: NotificationDispatcher,
}

impl EngineHandle {
    pub fn orders(&self) -> Vec<Order> {
        self.model.borrow().orders.clone()
    }

    pub fn read_model(&self) -> ReadModel {
        self.model.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadModel> {
        self.model.clone()
    }

    /// Wait until the published model satisfies `pred` and return it.
    pub async fn wait_for<F>(&self, mut pred: F) -> Result<ReadModel, AcceptError>
    where
        F: FnMut(&ReadModel) -> bool,
    {
        let mut rx = self.model.clone();
        let model = rx
            .wait_for(|m| pred(m))
            .await
            .map_err(|_| AcceptError::EngineStopped)?;
        Ok(model.clone())
    }

    pub fn is_busy(&self, order_id: &str) -> bool {
        self.model.borrow().is_pending(order_id)
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Accept a `PENDING` order. Resolves when the service has answered.
    pub async fn accept(&self, order_id: &str) -> Result<(), AcceptError> {
        self.accept_as(order_id, StaffIdentity::default()).await
    }

    pub async fn accept_as(&self, order_id: &str, staff: StaffIdentity) -> Result<(), AcceptError> {
        if self.is_busy(order_id) {
            return Err(AcceptError::Busy {
                order_id: order_id.to_string(),
            });
        }
        let (reply, rx) = oneshot::channel();
        let sent = self.send(Command::Accept {
            order_id: order_id.to_string(),
            staff,
            reply,
        });
        if !sent {
            return Err(AcceptError::EngineStopped);
        }
        rx.await.map_err(|_| AcceptError::EngineStopped)?
    }

    /// Poll now. Returns `false` if the engine has stopped.
    pub fn refresh(&self) -> bool {
        self.send(Command::Refresh(RefreshReason::Explicit))
    }

    pub(crate) fn poll_tick(&self) -> bool {
        self.send(Command::Refresh(RefreshReason::Scheduled))
    }

    /// Hand a push event to the engine. Safe to call from a push handler.
    pub fn ingest_push(&self, kind: &str, data: Value) -> bool {
        self.send(Command::Push {
            kind: kind.to_string(),
            data,
        })
    }

    pub fn set_connection(&self, state: ConnectionState) -> bool {
        self.send(Command::Connection(state))
    }

    pub fn push_stalled(&self) -> bool {
        self.send(Command::PushStalled)
    }

    pub fn check_slow_orders(&self) -> bool {
        self.send(Command::CheckSlow)
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, cmd: Command) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Start the engine actor. The first poll is not issued here; start a poll
/// loop or call [`EngineHandle::refresh`].
pub fn spawn_engine(
    cfg: EngineConfig,
    service: Arc<dyn OrderService>,
    clock: Arc<dyn Clock>,
) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let (model_tx, model_rx) = watch::channel(ReadModel::empty());
    let notifier = NotificationDispatcher::new(cfg.history_cap);

    let engine = Engine {
        cfg,
        service,
        clock,
        notifier: notifier.clone(),
        model_tx,
        done_tx,
        cache: OrderCache::new(),
        pending: PendingMutations::new(),
        sequencer: PollSequencer::new(),
        confirmed: BTreeMap::new(),
        awaiting: BTreeMap::new(),
        slow: SlowOrderWatch::new(),
        connection: ConnectionState::Disconnected,
        seeded: false,
        last_poll: None,
        version: 0,
    };
    let task = tokio::spawn(engine.run(rx, done_rx));

    (
        EngineHandle {
            tx,
            model: model_rx,
            notifier,
        },
        task,
    )
}

struct Engine {
    cfg: EngineConfig,
    service: Arc<dyn OrderService>,
    clock: Arc<dyn Clock>,
    notifier: NotificationDispatcher,
    model_tx: watch::Sender<ReadModel>,
    done_tx: mpsc::UnboundedSender<Completion>,

    cache: OrderCache,
    pending: PendingMutations,
    sequencer: PollSequencer,
    /// Last server-confirmed version of each order with an accept in flight.
    confirmed: BTreeMap<String, Order>,
    /// Accepted by the service, waiting for a poll at or after the given seq.
    awaiting: BTreeMap<String, (MutationTicket, PollSeq)>,
    slow: SlowOrderWatch,
    connection: ConnectionState,
    seeded: bool,
    last_poll: Option<PollStatus>,
    version: u64,
}

impl Engine {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!(confirmation = ?self.cfg.confirmation, "order engine started");
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.on_command(cmd),
                },
                Some(done) = done_rx.recv() => self.on_completion(done),
            }
            self.publish();
        }
        info!("order engine stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Refresh(reason) => {
                self.start_poll(reason);
            }
            Command::Accept {
                order_id,
                staff,
                reply,
            } => self.on_accept(order_id, staff, reply),
            Command::Push { kind, data } => match decode_push(&kind, &data) {
                Ok(event) => self.apply(event, false),
                Err(e) => warn!(kind = %kind, error = %e, "dropping undecodable push payload"),
            },
            Command::Connection(state) => {
                if state == self.connection {
                    return;
                }
                let was = self.connection;
                self.connection = state;
                debug!(from = ?was, to = ?state, "push connection state");
                // Events may have been missed while disconnected.
                if state == ConnectionState::Connected && self.seeded {
                    self.start_poll(RefreshReason::Reconnected);
                }
            }
            Command::PushStalled => self.notifier.publish(Notification::new(
                NotificationKind::Alert,
                "Live updates stalled",
                "Lost connection to the order service; orders refresh on the poll interval only",
                None,
                self.clock.now(),
            )),
            Command::CheckSlow => self.check_slow(),
            Command::Shutdown => {}
        }
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Poll { seq, result } => self.on_poll_done(seq, result),
            Completion::Accept {
                order_id,
                ticket,
                result,
                reply,
            } => {
                let outcome = self.on_accept_done(&order_id, ticket, result);
                let _ = reply.send(outcome);
            }
        }
    }

    // -- merging -------------------------------------------------------------

    fn apply(&mut self, event: IngestEvent, seeding: bool) {
        let label = event.label();
        let out = merge(&self.cache, &self.pending, event);

        for id in &out.clear_pending {
            self.pending.end(id);
            self.awaiting.remove(id);
            self.confirmed.remove(id);
            debug!(order_id = %id, "pending mutation released by push");
        }
        if !out.changes.is_empty() {
            debug!(event = label, changes = out.changes.len(), "order cache updated");
        }

        let notes = notify::from_merge(
            &out.cache,
            &out.changes,
            &out.forwarded,
            seeding,
            self.clock.now(),
        );
        self.cache = out.cache;
        for n in notes {
            self.notifier.publish(n);
        }

        if out.needs_refresh {
            self.start_poll(RefreshReason::PushGap);
        }
    }

    fn publish(&mut self) {
        self.version += 1;
        self.model_tx.send_replace(ReadModel {
            orders: self.cache.to_vec(),
            pending: self.pending.ids().map(str::to_string).collect(),
            connection: self.connection,
            seeded: self.seeded,
            last_poll: self.last_poll.clone(),
            version: self.version,
        });
    }

    // -- polling -------------------------------------------------------------

    fn start_poll(&mut self, reason: RefreshReason) -> PollSeq {
        let seq = self.sequencer.issue();
        debug!(seq = seq.value(), reason = ?reason, "poll issued");
        let service = Arc::clone(&self.service);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = service.list_orders().await;
            let _ = done.send(Completion::Poll { seq, result });
        });
        seq
    }

    fn on_poll_done(&mut self, seq: PollSeq, result: Result<Vec<Order>, ServiceError>) {
        let freshness = self.sequencer.check(seq);
        if !freshness.is_latest() {
            debug!(seq = seq.value(), freshness = ?freshness, "discarding superseded poll response");
            return;
        }

        let now = self.clock.now();
        match result {
            Ok(orders) => {
                self.sequencer.accept(seq);

                let due: Vec<(String, MutationTicket)> = self
                    .awaiting
                    .iter()
                    .filter(|(_, (_, after))| seq >= *after)
                    .map(|(id, (ticket, _))| (id.clone(), *ticket))
                    .collect();
                for (id, ticket) in due {
                    debug!(order_id = %id, seq = seq.value(), "accept confirmed by poll");
                    self.release(&id, ticket);
                }

                let seeding = !self.seeded;
                let count = orders.len();
                self.apply(IngestEvent::PollSnapshot(orders), seeding);
                if seeding {
                    info!(orders = count, "order cache seeded");
                }
                self.seeded = true;
                self.last_poll = Some(PollStatus {
                    seq: seq.value(),
                    ok: true,
                    at: now,
                    error: None,
                });
            }
            Err(e) => {
                warn!(seq = seq.value(), kind = e.kind(), error = %e, "poll failed; keeping last known orders");
                self.last_poll = Some(PollStatus {
                    seq: seq.value(),
                    ok: false,
                    at: now,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    // -- accept --------------------------------------------------------------

    fn on_accept(
        &mut self,
        order_id: String,
        staff: StaffIdentity,
        reply: oneshot::Sender<Result<(), AcceptError>>,
    ) {
        let ticket = match self.begin_accept(&order_id) {
            Ok(t) => t,
            Err(e) => {
                debug!(order_id = %order_id, reason = e.kind(), "accept refused");
                let _ = reply.send(Err(e));
                return;
            }
        };

        info!(order_id = %order_id, ticket = ticket.value(), "accept issued");
        let service = Arc::clone(&self.service);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = service.accept_order(&order_id, &staff).await;
            let _ = done.send(Completion::Accept {
                order_id,
                ticket,
                result,
                reply,
            });
        });
    }

    fn begin_accept(&mut self, order_id: &str) -> Result<MutationTicket, AcceptError> {
        let current = self
            .cache
            .get(order_id)
            .cloned()
            .ok_or_else(|| AcceptError::UnknownOrder {
                order_id: order_id.to_string(),
            })?;
        if self.pending.is_pending(order_id) {
            return Err(AcceptError::Busy {
                order_id: order_id.to_string(),
            });
        }
        request_manual(current.status, OrderStatus::Received)?;

        let ticket = self.pending.begin(order_id).map_err(|b| AcceptError::Busy {
            order_id: b.order_id,
        })?;
        self.confirmed.insert(order_id.to_string(), current);
        self.apply(
            IngestEvent::Optimistic {
                order_id: order_id.to_string(),
                status: OrderStatus::Received,
            },
            false,
        );
        Ok(ticket)
    }

    fn on_accept_done(
        &mut self,
        order_id: &str,
        ticket: MutationTicket,
        result: Result<Order, ServiceError>,
    ) -> Result<(), AcceptError> {
        match result {
            Ok(_) => {
                info!(order_id = %order_id, "accept confirmed by service");
                match self.cfg.confirmation {
                    ConfirmationPolicy::OnResponse => self.release(order_id, ticket),
                    ConfirmationPolicy::AwaitConfirmation => {
                        if self.pending.ticket(order_id) == Some(ticket) {
                            let after = self.start_poll(RefreshReason::AfterAccept);
                            self.awaiting.insert(order_id.to_string(), (ticket, after));
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(order_id = %order_id, kind = e.kind(), error = %e, "accept failed; reverting");
                // A push may have released this ticket already; the entries
                // that remain then belong to a newer accept.
                if self.pending.end_ticket(order_id, ticket) {
                    self.awaiting.remove(order_id);
                    if let Some(prior) = self.confirmed.remove(order_id) {
                        self.apply(IngestEvent::Revert(prior), false);
                    }
                }
                self.start_poll(RefreshReason::AcceptFailed);

                let title = match e {
                    ServiceError::Conflict { .. } => "Order already changed",
                    _ => "Could not accept order",
                };
                self.notifier.publish(Notification::new(
                    NotificationKind::Error,
                    title,
                    e.to_string(),
                    Some(order_id.to_string()),
                    self.clock.now(),
                ));
                Err(AcceptError::Service(e))
            }
        }
    }

    /// End the mutation identified by `ticket`. Entries owned by a newer
    /// accept on the same order are left alone.
    fn release(&mut self, order_id: &str, ticket: MutationTicket) {
        if self.pending.end_ticket(order_id, ticket) {
            self.confirmed.remove(order_id);
        }
        if self.awaiting.get(order_id).map(|(t, _)| *t) == Some(ticket) {
            self.awaiting.remove(order_id);
        }
    }

    // -- slow orders ---------------------------------------------------------

    fn check_slow(&mut self) {
        let now = self.clock.now();
        let slow: Vec<(String, i64)> = self
            .slow
            .check(&self.cache, now, self.cfg.slow_threshold)
            .into_iter()
            .map(|o| (o.order_id.clone(), (now - o.created_at).num_minutes()))
            .collect();
        for (order_id, mins) in slow {
            info!(order_id = %order_id, waiting_mins = mins, "slow order");
            self.notifier.publish(Notification::new(
                NotificationKind::Alert,
                "Slow order",
                format!("Order {order_id} has been waiting {mins} minutes"),
                Some(order_id),
                now,
            ));
        }
    }
}
