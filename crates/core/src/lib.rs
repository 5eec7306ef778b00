pub mod allocator;
pub mod audit;
pub mod auth;
pub mod config;
pub mod driver;
pub mod fulfillment;
pub mod metrics;
pub mod order;
pub mod stock;
pub mod testing;
pub mod workers;

pub use allocator::{AllocationError, Basket, CombinationAllocator};
pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, DatabaseConfig, DriverConfig, SanitizedConfig, ServerConfig, CONFIG_ENV_VAR,
};
pub use driver::{
    classify, ActivationDriver, ActivationOutcome, DriverError, HttpActivationDriver, Verdict,
};
pub use fulfillment::{
    FulfillmentConfig, FulfillmentError, FulfillmentOrchestrator, FulfillmentStatus,
};
pub use order::{
    CodeOutcome, CreateOrderRequest, Order, OrderCompletion, OrderError, OrderFilter,
    OrderStatus, OrderStatusView, OrderStore, ReportStatus, SqliteOrderStore,
};
pub use stock::{
    Code, CodeId, CodeState, FreeCodeFilter, ImportResult, NewCode, SqliteStockLedger,
    StockError, StockFilter, StockLedger, StockSummary,
};
pub use workers::{
    NewWorker, SqliteWorkerRegistry, Worker, WorkerCredentials, WorkerError, WorkerId,
    WorkerPool, WorkerRegistry,
};
