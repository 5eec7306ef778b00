//! Worker registry API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use redeemer_core::{AuditEvent, NewWorker, Worker, WorkerError, WorkerId};

use super::middleware::AuthUser;
use super::{error_response, ApiResult, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetActiveBody {
    pub active: bool,
}

fn worker_error(e: WorkerError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        WorkerError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkerError::Duplicate(_) => StatusCode::CONFLICT,
        WorkerError::Invalid(_) => StatusCode::BAD_REQUEST,
        WorkerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

/// All registered workers. Secrets are never serialized.
pub async fn list_workers(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Worker>>> {
    state
        .worker_registry()
        .list()
        .map(Json)
        .map_err(worker_error)
}

pub async fn add_worker(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NewWorker>,
) -> ApiResult<(StatusCode, Json<Worker>)> {
    let worker = state.worker_registry().add(body).map_err(worker_error)?;

    info!(worker_id = worker.id, identity = %worker.identity, "Worker added");
    state.audit().try_emit(AuditEvent::WorkerAdded {
        worker_id: worker.id,
        identity: worker.identity.clone(),
        added_by: user_id,
    });

    Ok((StatusCode::CREATED, Json(worker)))
}

/// Toggle whether a worker is loaded into future runs
pub async fn set_worker_active(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<WorkerId>,
    Json(body): Json<SetActiveBody>,
) -> ApiResult<Json<Worker>> {
    let worker = state
        .worker_registry()
        .set_active(id, body.active)
        .map_err(worker_error)?;

    info!(worker_id = worker.id, active = worker.active, "Worker active flag changed");
    state.audit().try_emit(AuditEvent::WorkerActiveChanged {
        worker_id: worker.id,
        active: worker.active,
        changed_by: user_id,
    });

    Ok(Json(worker))
}
