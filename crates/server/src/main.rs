use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redeemer_core::{
    create_audit_system, create_authenticator, load_config, validate_config, ActivationDriver,
    AuditEvent, AuditStore, Authenticator, FulfillmentOrchestrator, HttpActivationDriver,
    OrderStatus, OrderStore, SqliteAuditStore, SqliteOrderStore, SqliteStockLedger,
    SqliteWorkerRegistry, StockLedger, WorkerRegistry, CONFIG_ENV_VAR,
};
use redeemer_core::fulfillment::INTERRUPTED;
use redeemer_server::api::create_router;
use redeemer_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    let db_path = &config.database.path;
    let audit_store: Arc<dyn AuditStore> =
        Arc::new(SqliteAuditStore::new(db_path).context("Failed to create audit store")?);
    let ledger: Arc<dyn StockLedger> =
        Arc::new(SqliteStockLedger::new(db_path).context("Failed to open stock ledger")?);
    let order_store: Arc<dyn OrderStore> =
        Arc::new(SqliteOrderStore::new(db_path).context("Failed to create order store")?);
    let worker_registry: Arc<dyn WorkerRegistry> = Arc::new(
        SqliteWorkerRegistry::new(db_path).context("Failed to create worker registry")?,
    );
    info!("Stores initialized");

    // Codes reserved by a run that died with the previous process
    match ledger.release_all_reserved() {
        Ok(0) => {}
        Ok(n) => warn!(released = n, "Released reservations left by previous run"),
        Err(e) => warn!("Failed to release stale reservations: {}", e),
    }

    // Orders claimed by that run will never be finished by it
    let interrupted = match order_store.fail_interrupted(INTERRUPTED) {
        Ok(orders) => orders,
        Err(e) => {
            warn!("Failed to close interrupted orders: {}", e);
            Vec::new()
        }
    };
    if !interrupted.is_empty() {
        warn!(count = interrupted.len(), "Marked orders interrupted by previous run as failed");
    }

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), config.database.audit_buffer);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    for order in &interrupted {
        audit_handle
            .emit(AuditEvent::OrderStatusChanged {
                order_id: order.id.clone(),
                from_status: OrderStatus::Pending.as_str().to_string(),
                to_status: order.status.as_str().to_string(),
                activated_amount: order.activated_amount,
                target_amount: order.target_amount,
                reason: order.error_reason.clone(),
            })
            .await;
    }

    let orchestrator = match &config.driver {
        Some(driver_config) => {
            info!("Using activation driver at {}", driver_config.url);
            let driver: Arc<dyn ActivationDriver> = Arc::new(
                HttpActivationDriver::new(driver_config.clone())
                    .context("Failed to create activation driver")?,
            );
            let orch = FulfillmentOrchestrator::new(
                config.fulfillment.clone(),
                Arc::clone(&ledger),
                Arc::clone(&order_store),
                Arc::clone(&worker_registry),
                driver,
                Some(audit_handle.clone()),
            );
            if config.fulfillment.enabled {
                orch.start();
                info!("Fulfillment loop started");
            } else {
                info!("Automatic fulfillment disabled; orders are fulfilled on demand");
            }
            Some(Arc::new(orch))
        }
        None => {
            info!("No activation driver configured; fulfillment unavailable");
            None
        }
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_handle.clone(),
        audit_store,
        ledger,
        order_store,
        worker_registry,
        orchestrator.clone(),
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(ref orch) = orchestrator {
        orch.stop();
        info!("Fulfillment loop stopped");
    }

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone.
    drop(orchestrator);
    drop(audit_handle);
    match writer_handle.await {
        Ok(written) => info!(written, "Audit writer stopped"),
        Err(e) => warn!("Audit writer task failed: {}", e),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
