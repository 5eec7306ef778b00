//! Stock ledger: durable record of redemption codes and their lifecycle.

mod import;
mod sqlite_store;
mod store;
mod types;

pub use import::{parse_batch, parse_code_pairs, ImportParseError};
pub use sqlite_store::SqliteStockLedger;
pub use store::{FreeCodeFilter, StockError, StockFilter, StockLedger};
pub use types::{
    mask_code, Code, CodeId, CodeState, DenominationCount, FinalizeOutcome, Finalization,
    ImportResult, NewCode, StockSummary,
};
