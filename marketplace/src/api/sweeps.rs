//! Scheduled maintenance endpoints.
//!
//! - POST /api/internal/sweeps/auto-complete - Complete overdue pickups
//!
//! Called by an external scheduler holding the shared `CRON_SECRET`. The route
//! answers 404 while no secret is configured.

use crate::auth::BearerToken;
use crate::coordinator::SweepReport;
use crate::error::ApiError;
use crate::server::state::AppState;
use axum::{Json, extract::State, http::StatusCode};

/// Run the overdue-pickup sweep.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/internal/sweeps/auto-complete \
///   -H "Authorization: Bearer $CRON_SECRET"
/// ```
pub async fn auto_complete(
    State(state): State<AppState>,
    token: Result<BearerToken, ApiError>,
) -> Result<Json<SweepReport>, ApiError> {
    let Some(secret) = state.settings.cron_secret.as_deref() else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Sweep endpoint is disabled".to_string(),
            "NOT_FOUND".to_string(),
        ));
    };
    let BearerToken(token) = token?;
    if token != secret {
        return Err(ApiError::unauthorized("Invalid sweep token"));
    }

    let report = state.coordinator.auto_complete_overdue().await?;
    Ok(Json(report))
}
