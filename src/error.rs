//! Error taxonomy for the order-management core.
//!
//! Raw store/transport errors never cross the manager boundary: the REST
//! layer maps them to friendly messages first, and everything above it
//! speaks in terms of these kinds.

use thiserror::Error;

use crate::orders::OrderStatus;

/// All failure kinds the crate surfaces to its consumers.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The remote store is unreachable or unconfigured. Surfaced as a
    /// persistent connectivity state, not retried beyond the normal
    /// poll/reconnect cadence.
    #[error("order store unavailable: {0}")]
    StoreUnavailable(String),

    /// A requested status change does not move exactly one step forward
    /// in the pipeline. Rejected locally, never persisted.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order id is not in the local mirror. Rejected locally, never
    /// persisted.
    #[error("unknown order: {0}")]
    UnknownOrder(String),

    /// The remote write failed after a valid transition was applied
    /// optimistically. The local copy is left as-is; the next
    /// authoritative snapshot reconciles it.
    #[error("failed to persist order {order_id}: {message}")]
    PersistFailure {
        order_id: String,
        message: String,
    },

    /// A best-effort read (completed-orders refresh, snapshot decode)
    /// failed. Cached data is retained.
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    /// Boundary validation rejection (menu required fields, malformed
    /// order payloads).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist at the boundary.
    #[error("not found: {0}")]
    NotFound(String),
}
