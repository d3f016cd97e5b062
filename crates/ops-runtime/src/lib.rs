//! ops-runtime
//!
//! Runtime side of the operations console: the order-service client, the
//! single-writer order engine, its timer loops and the notification
//! dispatcher. Pure merge and workflow rules live in `ops-reconcile` and
//! `ops-workflow`; this crate owns the IO.

mod engine;
mod error;
mod notify;
mod poller;
mod service;
mod wiring;

pub use engine::{
    spawn_engine, ConfirmationPolicy, EngineConfig, EngineHandle, PollStatus, ReadModel,
    RefreshReason,
};
pub use error::{AcceptError, ServiceError};
pub use notify::{from_merge, Notification, NotificationDispatcher, NotificationKind};
pub use poller::{spawn_poll_loop, spawn_slow_order_loop};
pub use service::{HttpOrderService, OrderService, StaffIdentity};
pub use wiring::{attach_push, PushBridge};
