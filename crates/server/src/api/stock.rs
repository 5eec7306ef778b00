//! Stock ledger API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use redeemer_core::{
    stock::{parse_batch, parse_code_pairs},
    AuditEvent, Code, CodeId, CodeState, ImportResult, StockError, StockFilter, StockSummary,
};

use super::middleware::AuthUser;
use super::{error_response, ApiResult, ErrorResponse, DEFAULT_LIMIT, MAX_LIMIT};
use crate::state::AppState;

/// Query parameters for listing codes
#[derive(Debug, Deserialize)]
pub struct ListStockParams {
    pub state: Option<String>,
    pub value: Option<u32>,
    pub order_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A code as shown to operators; the redemption string is masked.
#[derive(Debug, Serialize)]
pub struct CodeView {
    pub id: CodeId,
    pub code: String,
    pub value: u32,
    pub state: CodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Code> for CodeView {
    fn from(code: Code) -> Self {
        Self {
            id: code.id,
            code: code.masked(),
            value: code.value,
            state: code.state,
            reserved_for: code.reserved_for,
            buyer_uid: code.buyer_uid,
            activated_at: code.activated_at,
            error_reason: code.error_reason,
            created_at: code.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListStockResponse {
    pub codes: Vec<CodeView>,
    pub limit: i64,
    pub offset: i64,
}

/// Import body: either mixed `value code` pairs in `text`, or one `value`
/// with a list of `codes`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImportBody {
    Batch { value: u32, codes: Vec<String> },
    Text { text: String },
}

/// Release body; without `order_id` every reserved code is released.
#[derive(Debug, Default, Deserialize)]
pub struct ReleaseBody {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: usize,
}

fn stock_error(e: StockError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::Conflict { .. } | StockError::InvalidState { .. } => StatusCode::CONFLICT,
        StockError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

/// List codes with optional filters
pub async fn list_stock(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListStockParams>,
) -> ApiResult<Json<ListStockResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = StockFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref s) = params.state {
        let code_state = CodeState::parse(s).ok_or_else(|| {
            error_response(StatusCode::BAD_REQUEST, format!("Unknown code state: {}", s))
        })?;
        filter = filter.with_state(code_state);
    }
    if let Some(value) = params.value {
        filter = filter.with_value(value);
    }
    if let Some(ref order_id) = params.order_id {
        filter = filter.with_order_id(order_id);
    }

    let codes = state.ledger().list(&filter).map_err(stock_error)?;

    Ok(Json(ListStockResponse {
        codes: codes.into_iter().map(CodeView::from).collect(),
        limit,
        offset,
    }))
}

/// Free counts per denomination and totals per state
pub async fn stock_summary(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<StockSummary>> {
    state.ledger().summary().map(Json).map_err(stock_error)
}

/// Add codes to stock; duplicates are skipped
pub async fn import_stock(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ImportBody>,
) -> ApiResult<Json<ImportResult>> {
    let parsed = match body {
        ImportBody::Batch { value, codes } => parse_batch(value, &codes.join(" ")),
        ImportBody::Text { text } => parse_code_pairs(&text),
    }
    .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let result = state.ledger().import(&parsed).map_err(stock_error)?;

    info!(
        inserted = result.inserted,
        skipped = result.skipped,
        imported_by = %user_id,
        "Codes imported"
    );
    state.audit().try_emit(AuditEvent::CodesImported {
        imported_by: user_id,
        inserted: result.inserted,
        skipped: result.skipped,
    });

    Ok(Json(result))
}

/// Return reserved codes to free stock (operator recovery)
pub async fn release_reserved(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<ReleaseBody>>,
) -> ApiResult<Json<ReleaseResponse>> {
    let order_id = body.and_then(|Json(b)| b.order_id);

    let released = match order_id {
        Some(ref id) => state.ledger().release_order(id),
        None => state.ledger().release_all_reserved(),
    }
    .map_err(stock_error)?;

    info!(released, order_id = ?order_id, released_by = %user_id, "Reservations released");
    state.audit().try_emit(AuditEvent::ReservationsReleased {
        order_id,
        count: released,
        released_by: Some(user_id),
    });

    Ok(Json(ReleaseResponse { released }))
}
