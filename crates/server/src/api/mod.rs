pub mod audit;
pub mod handlers;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod stock;
pub mod workers;

use axum::{http::StatusCode, Json};
use serde::Serialize;

pub use routes::create_router;

/// Default page size for list endpoints
pub const DEFAULT_LIMIT: i64 = 100;

/// Largest page size a caller may request
pub const MAX_LIMIT: i64 = 1000;

/// JSON error body shared by every handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

pub fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
