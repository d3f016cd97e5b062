//! ops-workflow
//!
//! The fulfilment state machine and the pending-mutation tracker.
//!
//! Only one edge of the pipeline (`PENDING → RECEIVED`, "accept") is ever
//! driven by staff from this console. Every other forward edge belongs to the
//! external kitchen/delivery orchestration and is only reflected here.
//!
//! Deterministic, pure logic. No IO.

pub mod pending;
pub mod state_machine;

pub use pending::{Busy, MutationTicket, PendingMutations};
pub use state_machine::{
    classify, next_stage, request_manual, TransitionError, TransitionKind, WorkflowRefusal,
};
