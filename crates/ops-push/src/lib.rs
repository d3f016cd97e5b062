//! ops-push
//!
//! Client for the order service's push channel.
//!
//! [`PushClient`] is an owned component: construct one per process with an
//! injected [`Transport`] and [`Clock`] and hand it to whoever needs to
//! register handlers. Production wiring uses [`WsTransport`] and
//! [`TokioClock`]; tests inject scripted fakes so reconnect timing is
//! deterministic.
//!
//! # Invariants
//!
//! - `connect` is idempotent while a session or reconnect cycle is alive.
//! - Reconnect delay is linear (`base_delay × attempt`) and bounded by
//!   `max_attempts` consecutive failures; exhaustion fires
//!   [`EventKind::MaxReconnectAttemptsReached`] exactly once per cycle.
//! - Malformed frames are counted and dropped; they never reach handlers.
//! - A panicking handler never prevents other handlers from running.

mod client;
mod clock;
mod frame;
mod registry;
mod transport;

pub use client::{push_url, ConnectionState, PushClient, PushConfig, PushStats, SendOutcome};
pub use clock::{Clock, TokioClock};
pub use frame::{parse_frame, subscribe_frame, EventKind, FrameError, PushEvent};
pub use registry::{Handler, HandlerId};
pub use transport::{Connection, Transport, TransportError, WsTransport};
