//! Error taxonomy for order-service calls and staff actions.
//!
//! Every I/O failure is converted into a [`ServiceError`] at the boundary of
//! the component that issued the call. Nothing below the engine ever sees a
//! transport-specific error type.

use ops_workflow::WorkflowRefusal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Connect failure, timeout or 5xx. Recovered by the next (or a forced)
    /// poll; never fatal.
    TransientNetwork(String),
    /// The service refused the mutation because the order changed
    /// server-side first (HTTP 400/409 on a workflow action).
    Conflict { message: String },
    /// Any other 4xx (auth, not found). Not retried.
    Rejected { status: u16, message: String },
    /// Response body was not a usable envelope or order record.
    Decode(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::TransientNetwork(_) => "transient_network",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Rejected { .. } => "rejected",
            ServiceError::Decode(_) => "decode",
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::TransientNetwork(msg) => write!(f, "order service unreachable: {msg}"),
            ServiceError::Conflict { message } => write!(f, "order changed on the server: {message}"),
            ServiceError::Rejected { status, message } => {
                write!(f, "order service rejected the request ({status}): {message}")
            }
            ServiceError::Decode(msg) => write!(f, "unexpected order service response: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Why `accept` did not succeed.
///
/// `Busy`, `UnknownOrder` and `Workflow` are decided without a network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptError {
    Busy { order_id: String },
    UnknownOrder { order_id: String },
    Workflow(WorkflowRefusal),
    Service(ServiceError),
    EngineStopped,
}

impl AcceptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AcceptError::Busy { .. } => "busy",
            AcceptError::UnknownOrder { .. } => "unknown_order",
            AcceptError::Workflow(_) => "workflow",
            AcceptError::Service(e) => e.kind(),
            AcceptError::EngineStopped => "engine_stopped",
        }
    }
}

impl std::fmt::Display for AcceptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcceptError::Busy { order_id } => {
                write!(f, "order {order_id} already has an action in progress")
            }
            AcceptError::UnknownOrder { order_id } => write!(f, "order {order_id} is not known"),
            AcceptError::Workflow(r) => write!(f, "{r}"),
            AcceptError::Service(e) => write!(f, "{e}"),
            AcceptError::EngineStopped => write!(f, "order engine is not running"),
        }
    }
}

impl std::error::Error for AcceptError {}

impl From<ServiceError> for AcceptError {
    fn from(e: ServiceError) -> Self {
        AcceptError::Service(e)
    }
}

impl From<WorkflowRefusal> for AcceptError {
    fn from(r: WorkflowRefusal) -> Self {
        AcceptError::Workflow(r)
    }
}
