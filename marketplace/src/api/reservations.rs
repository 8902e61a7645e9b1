//! Reservation API endpoints.
//!
//! - GET /api/reservations - The caller's reservations, newest first
//! - POST /api/reservations/:id/cancel - Cancel (buyer, owner only)
//! - POST /api/reservations/:id/complete - Confirm pickup (seller, owner only)
//! - GET /api/store/reservations?status= - The seller's incoming reservations

use crate::auth::CallerIdentity;
use crate::error::ApiError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surplus_core::types::{
    BuyerId, ListingId, Reservation, ReservationId, ReservationStatus, StoreId,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Reservation details response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReservationResponse {
    /// Reservation ID
    pub id: ReservationId,
    /// Reserved listing
    pub listing_id: ListingId,
    /// Store owning the listing
    pub store_id: StoreId,
    /// Buyer
    pub buyer_id: BuyerId,
    /// Committed units
    pub quantity: u32,
    /// Current status
    pub status: ReservationStatus,
    /// Pickup time chosen by the buyer
    pub preferred_pickup_time: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Completed timestamp (if applicable)
    pub completed_at: Option<DateTime<Utc>>,
    /// Canceled timestamp (if applicable)
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id,
            listing_id: reservation.listing_id,
            store_id: reservation.store_id,
            buyer_id: reservation.buyer_id,
            quantity: reservation.quantity,
            status: reservation.status,
            preferred_pickup_time: reservation.preferred_pickup_time,
            created_at: reservation.created_at,
            completed_at: reservation.completed_at,
            canceled_at: reservation.canceled_at,
        }
    }
}

/// Query parameters for the seller's reservation list.
#[derive(Debug, Deserialize)]
pub struct StoreReservationsQuery {
    /// `RESERVED`, `COMPLETED` or `CANCELED`
    pub status: Option<String>,
}

fn render(reservations: Vec<Reservation>) -> Json<Vec<ReservationResponse>> {
    Json(reservations.into_iter().map(ReservationResponse::from).collect())
}

// ============================================================================
// Handlers
// ============================================================================

/// List the caller's reservations.
pub async fn list_my_reservations(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let reservations = state.catalog.buyer_reservations(caller.user_id).await?;
    Ok(render(reservations))
}

/// Cancel one of the caller's reservations and release its units.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/reservations/<id>/cancel -H "x-user-id: <uuid>"
/// ```
pub async fn cancel_reservation(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.coordinator.cancel(&caller, reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// Confirm pickup of a reservation on the seller's listing.
pub async fn complete_reservation(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.coordinator.complete_pickup(&caller, reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// List reservations on the seller's listings.
pub async fn list_store_reservations(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Query(query): Query<StoreReservationsQuery>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let store_id = caller
        .store_id()
        .ok_or_else(|| ApiError::forbidden("Only sellers can list store reservations"))?;
    let status = query
        .status
        .as_deref()
        .map(ReservationStatus::parse)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let reservations = state.catalog.store_reservations(store_id, status).await?;
    Ok(render(reservations))
}
