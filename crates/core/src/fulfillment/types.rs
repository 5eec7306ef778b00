//! Types for the fulfillment orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocator::AllocationError;
use crate::order::OrderError;
use crate::stock::StockError;
use crate::workers::WorkerError;

/// No exact combination of free codes for the target.
pub const NO_MATCHING_CODES: &str = "no_matching_codes";
/// The registry has no active worker.
pub const NO_ACTIVE_WORKERS: &str = "no_active_workers";
/// Every worker locked out during the run.
pub const WORKER_POOL_EXHAUSTED: &str = "worker_pool_exhausted";
/// The code's reservation moved to another order during the driver call.
pub const RESERVATION_LOST: &str = "reservation_lost";
/// The process stopped while the order was claimed.
pub const INTERRUPTED: &str = "interrupted";

/// Errors that can occur during fulfillment.
///
/// Only the first two reach callers of `fulfill_order` before a run starts.
/// The storage variants are caught inside a run and written to the order as
/// an `Error` status.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Order is terminal or another run holds it.
    #[error("order {order_id} cannot be fulfilled: {status}")]
    NotClaimable { order_id: String, status: String },

    #[error("order store error: {0}")]
    Order(#[from] OrderError),

    #[error("stock ledger error: {0}")]
    Stock(#[from] StockError),

    #[error("allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("worker registry error: {0}")]
    Workers(#[from] WorkerError),

    /// The detached run panicked or was cancelled by the runtime.
    #[error("fulfillment run aborted: {0}")]
    Aborted(String),
}

/// Current status of the background loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentStatus {
    pub running: bool,
    /// Pending orders not yet claimed.
    pub pending_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FulfillmentError::NotClaimable {
            order_id: "o-1".to_string(),
            status: "completed".to_string(),
        };
        assert_eq!(err.to_string(), "order o-1 cannot be fulfilled: completed");

        let err: FulfillmentError = StockError::Database("disk full".to_string()).into();
        assert_eq!(err.to_string(), "stock ledger error: database error: disk full");
    }
}
