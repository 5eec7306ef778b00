//! Redemption worker identities: persistent registry and run-scoped pool.

mod pool;
mod registry;
mod types;

pub use pool::WorkerPool;
pub use registry::{SqliteWorkerRegistry, WorkerError, WorkerRegistry};
pub use types::{NewWorker, Worker, WorkerCredentials, WorkerId};
