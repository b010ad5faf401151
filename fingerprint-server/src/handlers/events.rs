//! Visitor event and velocity handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use device_fingerprint_core::logic::velocity::VelocityWindowSet;
use validator::Validate;

use crate::models::{EventAccepted, EventBody, VelocityQuery};
use crate::{AppResult, AppState};

/// Append a visitor event; malformed events are rejected with 400
pub async fn record(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> AppResult<(StatusCode, Json<EventAccepted>)> {
    body.validate()?;
    state.engine.record_event(body.into())?;

    Ok((StatusCode::ACCEPTED, Json(EventAccepted { accepted: true })))
}

/// Window aggregates for one visitor (empty, not 404, for unknown visitors)
pub async fn velocity(
    State(state): State<AppState>,
    Path(visitor_id): Path<String>,
    Query(query): Query<VelocityQuery>,
) -> AppResult<Json<VelocityWindowSet>> {
    let now = query.at.unwrap_or_else(Utc::now);
    Ok(Json(state.engine.query_velocity(&visitor_id, now)))
}
