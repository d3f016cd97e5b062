//! ops-reconcile
//!
//! Order-cache reconciliation across three uncoordinated sources: periodic
//! full-state polls, push events, and optimistic local writes.
//!
//! Deterministic, pure logic. No IO. The caller (the engine actor) owns the
//! cache and the pending tracker and applies one [`IngestEvent`] at a time.

mod decode;
mod merge;
mod slow;
mod types;
mod watermark;

pub use decode::{decode_push, normalize_kind};
pub use merge::merge;
pub use slow::{slow_orders, SlowOrderWatch};
pub use types::*;
pub use watermark::{PollFreshness, PollSeq, PollSequencer};
