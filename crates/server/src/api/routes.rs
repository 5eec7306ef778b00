use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, handlers, orders, stock, workers};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", get(orders::get_order_status))
        .route("/stock/summary", get(stock::stock_summary));

    let admin_routes = Router::new()
        // Orders
        .route("/orders/{id}/fulfill", post(orders::fulfill_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        // Stock
        .route("/stock", get(stock::list_stock))
        .route("/stock/import", post(stock::import_stock))
        .route("/stock/release-reserved", post(stock::release_reserved))
        // Workers
        .route("/workers", get(workers::list_workers).post(workers::add_worker))
        .route("/workers/{id}/active", post(workers::set_worker_active))
        // Audit
        .route("/audit", get(audit::query_audit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = public_routes.merge(admin_routes).with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
