//! Order records: target amount, activated amount, terminal status and report.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteOrderStore;
pub use store::{OrderError, OrderFilter, OrderStore};
pub use types::{
    CodeOutcome, CreateOrderRequest, Order, OrderCompletion, OrderStatus, OrderStatusView,
    ReportStatus,
};
