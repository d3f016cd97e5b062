//! Fulfilment workflow state machine.
//!
//! # State diagram
//!
//! ```text
//!   PENDING ──accept──► RECEIVED ──► COOKING ──► COOKED ──► PACKED ──► DELIVERING ──► COMPLETED
//!      │    (manual)        │           │           │          │            │         (term.)
//!      └────────────────────┴───────────┴───────────┴──────────┴────────────┴──► CANCELLED (term.)
//! ```
//!
//! # Invariants
//!
//! - **One manual edge.** [`request_manual`] succeeds only for
//!   `PENDING → RECEIVED`.
//! - **Automatic edges are reflected, never requested.** Forward edges past
//!   `RECEIVED` classify as [`TransitionKind::Automatic`]; a manual request
//!   for one is refused with a notice the UI can show.
//! - **Terminal states are sinks.** Nothing leaves `COMPLETED` or
//!   `CANCELLED`.

use ops_schemas::OrderStatus;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Who drives a given legal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Staff-initiated through this console (`PENDING → RECEIVED` only).
    Manual,
    /// Advanced by the external orchestration system.
    Automatic,
    /// Any non-terminal state → `CANCELLED`, decided outside this engine.
    Cancellation,
}

/// Returned when `from → to` is not an edge of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal workflow transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Classify a single-step transition.
///
/// Only adjacent pipeline steps are edges; a server-side jump over several
/// stages is reflected by the cache as-is but is not an edge here.
pub fn classify(from: OrderStatus, to: OrderStatus) -> Result<TransitionKind, TransitionError> {
    let illegal = || TransitionError { from, to };

    if from.is_terminal() {
        return Err(illegal());
    }
    if to == OrderStatus::Cancelled {
        return Ok(TransitionKind::Cancellation);
    }

    match (from.pipeline_index(), to.pipeline_index()) {
        (Some(a), Some(b)) if b == a + 1 => {
            if from == OrderStatus::Pending {
                Ok(TransitionKind::Manual)
            } else {
                Ok(TransitionKind::Automatic)
            }
        }
        _ => Err(illegal()),
    }
}

/// Next pipeline stage, if any.
pub fn next_stage(status: OrderStatus) -> Option<OrderStatus> {
    let i = status.pipeline_index()?;
    OrderStatus::PIPELINE.get(i + 1).copied()
}

// ---------------------------------------------------------------------------
// Manual requests
// ---------------------------------------------------------------------------

/// Why a staff-initiated transition was refused before reaching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowRefusal {
    /// The requested stage is advanced by the orchestration system. `notice`
    /// is a human-readable explanation for the UI.
    AutomaticStage {
        requested: OrderStatus,
        notice: String,
    },
    /// The order is already `COMPLETED` or `CANCELLED`.
    Terminal { current: OrderStatus },
    /// The order is not in `PENDING`, so it cannot be accepted.
    NotAcceptable { current: OrderStatus },
}

impl std::fmt::Display for WorkflowRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowRefusal::AutomaticStage { notice, .. } => f.write_str(notice),
            WorkflowRefusal::Terminal { current } => {
                write!(f, "order is {current} and can no longer change")
            }
            WorkflowRefusal::NotAcceptable { current } => {
                write!(f, "only PENDING orders can be accepted (order is {current})")
            }
        }
    }
}

impl std::error::Error for WorkflowRefusal {}

/// Check that staff may move an order from `current` to `requested`.
///
/// Returns `Ok(())` only for `PENDING → RECEIVED`.
pub fn request_manual(current: OrderStatus, requested: OrderStatus) -> Result<(), WorkflowRefusal> {
    if current.is_terminal() {
        return Err(WorkflowRefusal::Terminal { current });
    }
    if requested != OrderStatus::Received {
        return Err(WorkflowRefusal::AutomaticStage {
            requested,
            notice: format!(
                "{requested} is set automatically by the kitchen and delivery systems"
            ),
        });
    }
    if current != OrderStatus::Pending {
        return Err(WorkflowRefusal::NotAcceptable { current });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn accept_is_the_only_manual_edge() {
        assert_eq!(classify(Pending, Received), Ok(TransitionKind::Manual));
        for w in OrderStatus::PIPELINE.windows(2).skip(1) {
            assert_eq!(classify(w[0], w[1]), Ok(TransitionKind::Automatic));
        }
    }

    #[test]
    fn cancellation_from_any_non_terminal() {
        for s in OrderStatus::PIPELINE.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(classify(*s, Cancelled), Ok(TransitionKind::Cancellation));
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        assert!(classify(Completed, Cancelled).is_err());
        assert!(classify(Cancelled, Pending).is_err());
    }

    #[test]
    fn skips_and_backward_moves_are_illegal() {
        assert_eq!(
            classify(Pending, Cooking),
            Err(TransitionError { from: Pending, to: Cooking })
        );
        assert!(classify(Cooking, Received).is_err());
        assert!(classify(Cooking, Cooking).is_err());
    }

    #[test]
    fn manual_request_accepts_pending_only() {
        assert_eq!(request_manual(Pending, Received), Ok(()));
        assert_eq!(
            request_manual(Received, Received),
            Err(WorkflowRefusal::NotAcceptable { current: Received })
        );
    }

    #[test]
    fn manual_request_for_automatic_stage_carries_notice() {
        match request_manual(Received, Cooking) {
            Err(WorkflowRefusal::AutomaticStage { requested, notice }) => {
                assert_eq!(requested, Cooking);
                assert!(notice.contains("automatically"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn manual_request_on_terminal_is_refused() {
        assert_eq!(
            request_manual(Cancelled, Received),
            Err(WorkflowRefusal::Terminal { current: Cancelled })
        );
    }

    #[test]
    fn next_stage_walks_pipeline() {
        assert_eq!(next_stage(Pending), Some(Received));
        assert_eq!(next_stage(Delivering), Some(Completed));
        assert_eq!(next_stage(Completed), None);
        assert_eq!(next_stage(Cancelled), None);
    }
}
