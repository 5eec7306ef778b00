//! Order storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{CreateOrderRequest, Order, OrderCompletion, OrderStatus};

/// Error type for order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order not found.
    #[error("order not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current status.
    #[error("cannot {operation} order {order_id}: current status is {current_status}")]
    InvalidState {
        order_id: String,
        current_status: String,
        operation: String,
    },

    /// Rejected input.
    #[error("invalid order: {0}")]
    Invalid(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Filter for querying orders.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub uid: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            uid: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for order storage backends.
pub trait OrderStore: Send + Sync {
    /// Create a new pending order.
    fn create(&self, request: CreateOrderRequest) -> Result<Order, OrderError>;

    /// Get an order by ID.
    fn get(&self, id: &str) -> Result<Option<Order>, OrderError>;

    /// List orders matching the filter, newest first.
    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError>;

    /// Count orders matching the filter.
    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError>;

    /// Pending, unclaimed orders created at or before `created_before`,
    /// oldest first.
    fn list_ready(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, OrderError>;

    /// Atomically mark a pending, unclaimed order as started.
    ///
    /// Fails with `InvalidState` when another run already claimed it or the
    /// order is terminal.
    fn claim(&self, id: &str) -> Result<Order, OrderError>;

    /// Write the terminal status and report. Terminal orders are immutable.
    fn complete(&self, id: &str, completion: OrderCompletion) -> Result<Order, OrderError>;

    /// Cancel a pending order that no run has claimed.
    fn cancel(&self, id: &str, reason: Option<String>) -> Result<Order, OrderError>;

    /// Move every claimed but unfinished order to `Error` with `reason`.
    ///
    /// Only safe at startup, before any run of this process has claimed an
    /// order. Returns the orders that were failed.
    fn fail_interrupted(&self, reason: &str) -> Result<Vec<Order>, OrderError>;
}
