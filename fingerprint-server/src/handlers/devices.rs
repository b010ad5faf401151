//! Device record handlers

use axum::{extract::{Path, State}, Json};
use device_fingerprint_core::logic::store::FingerprintRecord;

use crate::models::DeleteResponse;
use crate::{AppError, AppResult, AppState};

/// Get stored record (per-feature hashes only)
pub async fn get(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<FingerprintRecord>> {
    let record = state
        .engine
        .device(&device_id)?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

    Ok(Json(record))
}

/// Privacy purge: hard delete, idempotent
pub async fn delete(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    let deleted = state.engine.purge(&device_id)?;

    Ok(Json(DeleteResponse { device_id, deleted }))
}
