//! Order API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use redeemer_core::{
    AuditEvent, CreateOrderRequest, FulfillmentError, Order, OrderError, OrderFilter,
    OrderStatus, OrderStatusView,
};

use super::middleware::AuthUser;
use super::{error_response, ApiResult, DEFAULT_LIMIT, MAX_LIMIT};
use crate::metrics::ORDERS_CREATED_TOTAL;
use crate::state::AppState;

/// Request body for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    /// Player receiving the currency
    pub uid: String,
    /// Amount to deliver; must be an exact sum of stocked codes
    pub target_amount: u64,
}

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub uid: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for cancelling an order
#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderBody {
    pub reason: Option<String>,
}

/// Response for listing orders
#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn order_error(e: OrderError) -> (StatusCode, Json<super::ErrorResponse>) {
    let status = match e {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidState { .. } => StatusCode::CONFLICT,
        OrderError::Invalid(_) => StatusCode::BAD_REQUEST,
        OrderError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

fn find_order(state: &AppState, id: &str) -> ApiResult<Order> {
    match state.order_store().get(id) {
        Ok(Some(order)) => Ok(order),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Order not found: {}", id),
        )),
        Err(e) => Err(order_error(e)),
    }
}

/// Create a pending order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateOrderBody>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state
        .order_store()
        .create(CreateOrderRequest {
            uid: body.uid,
            target_amount: body.target_amount,
        })
        .map_err(order_error)?;

    ORDERS_CREATED_TOTAL.inc();
    info!(order_id = %order.id, target = order.target_amount, "Order created");

    state.audit().try_emit(AuditEvent::OrderCreated {
        order_id: order.id.clone(),
        uid: order.uid.clone(),
        target_amount: order.target_amount,
        created_by: user_id,
    });

    Ok((StatusCode::CREATED, Json(order)))
}

/// List orders, newest first
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> ApiResult<Json<ListOrdersResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = OrderFilter::new();
    if let Some(ref status) = params.status {
        let status = OrderStatus::parse(status).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown order status: {}", status),
            )
        })?;
        filter = filter.with_status(status);
    }
    if let Some(ref uid) = params.uid {
        filter = filter.with_uid(uid);
    }

    let total = state.order_store().count(&filter).map_err(order_error)?;
    let orders = state
        .order_store()
        .list(&filter.with_limit(limit).with_offset(offset))
        .map_err(order_error)?;

    Ok(Json(ListOrdersResponse {
        orders,
        total,
        limit,
        offset,
    }))
}

/// Full order with its report
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    find_order(&state, &id).map(Json)
}

/// Status-only view for polling clients
pub async fn get_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderStatusView>> {
    find_order(&state, &id).map(|order| Json(order.status_view()))
}

/// Run fulfillment now and return the terminal order
pub async fn fulfill_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let Some(orchestrator) = state.orchestrator() else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "No activation driver configured",
        ));
    };

    match orchestrator.fulfill_order(&id).await {
        Ok(order) => Ok(Json(order)),
        Err(e @ FulfillmentError::OrderNotFound(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e @ FulfillmentError::NotClaimable { .. }) => {
            Err(error_response(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}

/// Cancel a pending order before any run claims it
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<CancelOrderBody>>,
) -> ApiResult<Json<Order>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let order = state
        .order_store()
        .cancel(&id, reason.clone())
        .map_err(order_error)?;

    info!(order_id = %order.id, cancelled_by = %user_id, "Order cancelled");
    state.audit().try_emit(AuditEvent::OrderCancelled {
        order_id: order.id.clone(),
        cancelled_by: user_id,
        reason,
    });

    Ok(Json(order))
}
