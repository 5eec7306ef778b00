use std::sync::Arc;

use redeemer_core::{
    AuditHandle, AuditStore, Authenticator, Config, FulfillmentOrchestrator, OrderStore,
    SanitizedConfig, StockLedger, WorkerRegistry,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    ledger: Arc<dyn StockLedger>,
    order_store: Arc<dyn OrderStore>,
    worker_registry: Arc<dyn WorkerRegistry>,
    /// Present when an activation driver is configured.
    orchestrator: Option<Arc<FulfillmentOrchestrator>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        ledger: Arc<dyn StockLedger>,
        order_store: Arc<dyn OrderStore>,
        worker_registry: Arc<dyn WorkerRegistry>,
        orchestrator: Option<Arc<FulfillmentOrchestrator>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit,
            audit_store,
            ledger,
            order_store,
            worker_registry,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn ledger(&self) -> &dyn StockLedger {
        self.ledger.as_ref()
    }

    pub fn order_store(&self) -> &dyn OrderStore {
        self.order_store.as_ref()
    }

    pub fn worker_registry(&self) -> &dyn WorkerRegistry {
        self.worker_registry.as_ref()
    }

    pub fn orchestrator(&self) -> Option<&Arc<FulfillmentOrchestrator>> {
        self.orchestrator.as_ref()
    }
}
