//! Basket allocation against the stock ledger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::search::find_exact_subset;
use crate::metrics;
use crate::stock::{Code, FreeCodeFilter, StockError, StockLedger};

/// Default number of snapshot/search/reserve rounds before giving up.
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 5;

/// Errors from the allocator.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Every attempt lost its reservation race to another order.
    #[error("allocation contended: gave up after {attempts} conflicting attempts")]
    Contended { attempts: u32 },

    #[error(transparent)]
    Stock(#[from] StockError),
}

/// Codes reserved together for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    pub order_id: String,
    /// Reserved codes, largest value first.
    pub codes: Vec<Code>,
}

impl Basket {
    /// Sum of face values. Equals the requested target.
    pub fn total(&self) -> u64 {
        self.codes.iter().map(|c| c.value as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Chooses and reserves exact-sum baskets of free codes.
pub struct CombinationAllocator {
    ledger: Arc<dyn StockLedger>,
    max_attempts: u32,
}

impl CombinationAllocator {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self {
            ledger,
            max_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    /// Set how many conflicting rounds are tolerated. Minimum 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Find and reserve codes whose values sum exactly to `target`.
    ///
    /// Returns `Ok(None)` when no exact combination exists in current free
    /// stock; nothing is reserved in that case. When a concurrent order
    /// takes one of the chosen codes first, the search is repeated against
    /// a fresh snapshot.
    pub fn allocate(&self, target: u64, order_id: &str) -> Result<Option<Basket>, AllocationError> {
        if target == 0 {
            metrics::ALLOCATION_ATTEMPTS
                .with_label_values(&["no_match"])
                .inc();
            return Ok(None);
        }

        let max_value = u32::try_from(target).unwrap_or(u32::MAX);

        for attempt in 1..=self.max_attempts {
            let snapshot = self
                .ledger
                .find_free(&FreeCodeFilter::new().with_max_value(max_value))?;
            let values: Vec<u32> = snapshot.iter().map(|c| c.value).collect();

            let Some(indices) = find_exact_subset(&values, target) else {
                debug!(
                    order_id = %order_id,
                    target = target,
                    free_candidates = snapshot.len(),
                    "No exact combination in free stock"
                );
                metrics::ALLOCATION_ATTEMPTS
                    .with_label_values(&["no_match"])
                    .inc();
                return Ok(None);
            };

            let codes: Vec<Code> = indices.into_iter().map(|i| snapshot[i].clone()).collect();
            let ids: Vec<_> = codes.iter().map(|c| c.id).collect();

            match self.ledger.reserve(&ids, order_id) {
                Ok(()) => {
                    metrics::ALLOCATION_ATTEMPTS
                        .with_label_values(&["reserved"])
                        .inc();
                    metrics::BASKET_SIZE
                        .with_label_values(&[])
                        .observe(codes.len() as f64);
                    info!(
                        order_id = %order_id,
                        target = target,
                        codes = codes.len(),
                        attempt = attempt,
                        "Reserved basket"
                    );
                    return Ok(Some(Basket {
                        order_id: order_id.to_string(),
                        codes,
                    }));
                }
                Err(StockError::Conflict { code_ids }) => {
                    metrics::ALLOCATION_ATTEMPTS
                        .with_label_values(&["conflict"])
                        .inc();
                    warn!(
                        order_id = %order_id,
                        attempt = attempt,
                        lost = ?code_ids,
                        "Basket reservation conflicted, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AllocationError::Contended {
            attempts: self.max_attempts,
        })
    }

    /// Reserve a single free code of exactly `value` to replace a dead one.
    pub fn replacement(&self, value: u32, order_id: &str) -> Result<Option<Code>, AllocationError> {
        let found = self.ledger.find_one_free_of_value(value, order_id)?;
        let label = if found.is_some() { "found" } else { "none" };
        metrics::REPLACEMENTS.with_label_values(&[label]).inc();
        Ok(found)
    }
}
