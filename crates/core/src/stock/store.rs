//! Stock ledger trait and query types.

use thiserror::Error;

use super::{Code, CodeId, CodeState, FinalizeOutcome, Finalization, ImportResult, NewCode, StockSummary};

/// Errors returned by the stock ledger.
#[derive(Debug, Error)]
pub enum StockError {
    /// Code not found.
    #[error("code not found: {0}")]
    NotFound(CodeId),

    /// A conditional reservation lost a race: at least one code was no
    /// longer free. Nothing was reserved; retry against a fresh snapshot.
    #[error("ledger conflict: codes {code_ids:?} are no longer free")]
    Conflict { code_ids: Vec<CodeId> },

    /// The requested transition is not legal from the code's current state.
    #[error("cannot {operation} code {code_id}: current state is {current}")]
    InvalidState {
        code_id: CodeId,
        current: CodeState,
        operation: String,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Filter for snapshots of free codes.
#[derive(Debug, Clone, Default)]
pub struct FreeCodeFilter {
    /// Ignore codes with a face value above this.
    pub max_value: Option<u32>,
    /// Only codes of exactly this face value.
    pub value: Option<u32>,
    /// Maximum number of rows.
    pub limit: Option<i64>,
}

impl FreeCodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_value(mut self, max_value: u32) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for listing codes in any state.
#[derive(Debug, Clone)]
pub struct StockFilter {
    pub state: Option<CodeState>,
    pub value: Option<u32>,
    pub order_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for StockFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StockFilter {
    pub fn new() -> Self {
        Self {
            state: None,
            value: None,
            order_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: CodeState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
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

/// Durable record of codes and their lifecycle.
///
/// Every state change goes through this trait. Reservation methods are
/// atomic conditional updates: a code is moved out of `Free` only if it is
/// still `Free` at write time.
pub trait StockLedger: Send + Sync {
    /// Add codes to stock as `Free`. Code strings already present are skipped.
    fn import(&self, codes: &[NewCode]) -> Result<ImportResult, StockError>;

    /// Get a code by id.
    fn get(&self, id: CodeId) -> Result<Option<Code>, StockError>;

    /// List codes matching the filter, ordered by id.
    fn list(&self, filter: &StockFilter) -> Result<Vec<Code>, StockError>;

    /// Snapshot of free codes, largest value first (ties by ascending id).
    fn find_free(&self, filter: &FreeCodeFilter) -> Result<Vec<Code>, StockError>;

    /// Reserve all named codes for `order_id`, or none of them.
    ///
    /// Returns [`StockError::Conflict`] if any code is no longer free.
    fn reserve(&self, code_ids: &[CodeId], order_id: &str) -> Result<(), StockError>;

    /// Return reserved codes to `Free`. Returns how many were released.
    fn release(&self, code_ids: &[CodeId]) -> Result<usize, StockError>;

    /// Return every code still reserved for `order_id` to `Free`.
    fn release_order(&self, order_id: &str) -> Result<usize, StockError>;

    /// Return every reserved code in the ledger to `Free` (operator recovery).
    fn release_all_reserved(&self) -> Result<usize, StockError>;

    /// Move a code reserved for the finalization's order into a terminal state.
    ///
    /// Finalizing an already-terminal code of the same order is a no-op that
    /// reports the prior state via [`FinalizeOutcome::AlreadyFinal`]. A code
    /// held or finalized by another order yields [`StockError::Conflict`].
    fn finalize(&self, code_id: CodeId, finalization: Finalization)
        -> Result<FinalizeOutcome, StockError>;

    /// Atomically reserve one free code of exactly `value` for `order_id`.
    fn find_one_free_of_value(
        &self,
        value: u32,
        order_id: &str,
    ) -> Result<Option<Code>, StockError>;

    /// Counts by state and free counts by denomination.
    fn summary(&self) -> Result<StockSummary, StockError>;
}
