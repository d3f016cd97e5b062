//! ops-schemas
//!
//! Wire types shared by every crate in the workspace: the order record as the
//! order service publishes it, its status enum, the partial record carried by
//! push updates, and integer-cents money.
//!
//! Pure data. No IO.

pub mod money;
mod order;

pub use money::{amount_to_cents, cents_to_amount, MoneyError, CENTS_PER_UNIT};
pub use order::{parse_timestamp, LineItem, Order, OrderPatch, OrderStatus, SchemaError};
