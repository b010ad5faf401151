//! Linked id handlers

use axum::{extract::{Path, State}, Json};

use crate::models::UnlinkResponse;
use crate::{AppResult, AppState};

/// Remove a linked id from every device; devices themselves stay
pub async fn unlink(
    State(state): State<AppState>,
    Path(linked_id): Path<String>,
) -> AppResult<Json<UnlinkResponse>> {
    let devices_unlinked = state.engine.unlink(&linked_id)?;

    Ok(Json(UnlinkResponse {
        linked_id,
        devices_unlinked,
    }))
}
