//! Testing utilities and mock implementations.
//!
//! The stores all have in-memory SQLite variants, so the only external
//! service that needs a mock is the activation driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use redeemer_core::testing::{fixtures, MockActivationDriver};
//!
//! let ledger = fixtures::seeded_ledger(&[120, 60, 60]);
//! let workers = fixtures::registry_with(&["alpha", "beta"]);
//! let driver = MockActivationDriver::new();
//! driver.lock_out_worker("alpha").await;
//! ```

mod mock_driver;

pub use mock_driver::{MockActivationDriver, RecordedActivation};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::order::CreateOrderRequest;
    use crate::stock::{NewCode, SqliteStockLedger, StockLedger};
    use crate::workers::{NewWorker, SqliteWorkerRegistry, WorkerRegistry};

    /// Deterministic code string for the `index`-th code of `value`.
    pub fn code_string(value: u32, index: usize) -> String {
        format!("GIFT-{:04}-{:06}", value, index)
    }

    /// One code per entry in `values`, numbered by position.
    pub fn code_batch(values: &[u32]) -> Vec<NewCode> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| NewCode {
                value,
                code: code_string(value, i),
            })
            .collect()
    }

    /// In-memory ledger stocked with `values` (ids follow slice order, from 1).
    pub fn seeded_ledger(values: &[u32]) -> Arc<SqliteStockLedger> {
        let ledger = SqliteStockLedger::in_memory().expect("in-memory ledger");
        ledger.import(&code_batch(values)).expect("seed import");
        Arc::new(ledger)
    }

    pub fn worker(identity: &str) -> NewWorker {
        NewWorker {
            identity: identity.to_string(),
            secret: format!("{}-secret", identity),
            active: true,
        }
    }

    /// In-memory registry with one active worker per identity, in order.
    pub fn registry_with(identities: &[&str]) -> Arc<SqliteWorkerRegistry> {
        let registry = SqliteWorkerRegistry::in_memory().expect("in-memory registry");
        for identity in identities {
            registry.add(worker(identity)).expect("add worker");
        }
        Arc::new(registry)
    }

    pub fn order_request(uid: &str, target_amount: u64) -> CreateOrderRequest {
        CreateOrderRequest {
            uid: uid.to_string(),
            target_amount,
        }
    }
}
