//! Listing API endpoints.
//!
//! - POST /api/listings - Put a listing on sale (seller)
//! - GET /api/listings/:id - Listing detail with derived phase
//! - POST /api/listings/:id/reservations - Reserve units (buyer)
//! - POST /api/listings/:id/sell-direct - Record a walk-in sale (seller)
//! - POST /api/listings/:id/mark-sold - Close out a listing (seller)
//! - PUT /api/listings/:id/quantity - Restock (seller, increase only)
//! - PUT /api/listings/:id/pickup-deadline - Move the pickup deadline (seller)
//! - PATCH /api/listings/:id - Edit name, category, prices (seller)

use super::extract::{JsonBody, UnitCount};
use super::reservations::ReservationResponse;
use crate::auth::CallerIdentity;
use crate::coordinator::ReserveInput;
use crate::error::ApiError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surplus_core::types::{
    Listing, ListingEdit, ListingId, ListingPhase, ListingStatus, Money, NewListing, StoreId,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a listing.
#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    /// Display name
    pub name: String,
    /// Optional category
    pub category: Option<String>,
    /// Ready to eat without preparation
    #[serde(default)]
    pub is_instant: bool,
    /// Regular price in minor units
    pub original_price: u64,
    /// Discounted price in minor units
    pub discount_price: u64,
    /// Units on sale
    pub quantity: UnitCount,
    /// Pickup cutoff
    pub pickup_deadline: DateTime<Utc>,
}

impl TryFrom<CreateListingRequest> for NewListing {
    type Error = ApiError;

    fn try_from(request: CreateListingRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            quantity: request.quantity.get()?,
            name: request.name,
            category: request.category,
            is_instant: request.is_instant,
            original_price: Money::new(request.original_price),
            discount_price: Money::new(request.discount_price),
            pickup_deadline: request.pickup_deadline,
        })
    }
}

/// Request to edit a listing. Omitted fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct EditListingRequest {
    /// New display name
    pub name: Option<String>,
    /// New category
    pub category: Option<String>,
    /// New ready-to-eat flag
    pub is_instant: Option<bool>,
    /// New regular price in minor units
    pub original_price: Option<u64>,
    /// New discounted price in minor units
    pub discount_price: Option<u64>,
}

impl From<EditListingRequest> for ListingEdit {
    fn from(request: EditListingRequest) -> Self {
        Self {
            name: request.name,
            category: request.category,
            is_instant: request.is_instant,
            original_price: request.original_price.map(Money::new),
            discount_price: request.discount_price.map(Money::new),
        }
    }
}

/// Request to reserve units.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Units to reserve
    pub quantity: UnitCount,
    /// Pickup time within the listing's window
    #[serde(default)]
    pub preferred_pickup_time: Option<DateTime<Utc>>,
}

impl TryFrom<ReserveRequest> for ReserveInput {
    type Error = ApiError;

    fn try_from(request: ReserveRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            quantity: request.quantity.get()?,
            preferred_pickup_time: request.preferred_pickup_time,
        })
    }
}

/// Listing as seen by API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingResponse {
    /// Listing ID
    pub id: ListingId,
    /// Owning store
    pub store_id: StoreId,
    /// Display name
    pub name: String,
    /// Category
    pub category: Option<String>,
    /// Ready to eat
    pub is_instant: bool,
    /// Regular price
    pub original_price: Money,
    /// Discounted price
    pub discount_price: Money,
    /// Percentage off, rounded down
    pub discount_percent: u32,
    /// Units available for reservation
    pub quantity: u32,
    /// Stored status
    pub status: ListingStatus,
    /// Status derived from stock and deadline at response time
    pub phase: ListingPhase,
    /// Pickup cutoff
    pub pickup_deadline: DateTime<Utc>,
    /// Early access release
    pub early_access_from: Option<DateTime<Utc>>,
    /// General release
    pub visible_from: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl ListingResponse {
    /// Render `listing` as of `now`.
    #[must_use]
    pub fn from_listing(listing: Listing, now: DateTime<Utc>) -> Self {
        Self {
            id: listing.id,
            store_id: listing.store_id(),
            phase: listing.phase(now),
            discount_percent: listing.discount_price.discount_percent_from(listing.original_price),
            name: listing.name,
            category: listing.category,
            is_instant: listing.is_instant,
            original_price: listing.original_price,
            discount_price: listing.discount_price,
            quantity: listing.quantity,
            status: listing.status,
            pickup_deadline: listing.pickup_deadline,
            early_access_from: listing.early_access_from,
            visible_from: listing.visible_from,
            created_at: listing.created_at,
        }
    }
}

/// Listing detail response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingDetailResponse {
    /// The listing
    #[serde(flatten)]
    pub listing: ListingResponse,
    /// Units committed to open reservations
    pub reserved_quantity: u32,
    /// Still inside the early access window
    pub is_early_access: bool,
}

/// Request carrying a unit count.
#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    /// Units
    pub quantity: UnitCount,
}

/// Response after a walk-in sale.
#[derive(Debug, Serialize, Deserialize)]
pub struct SellDirectResponse {
    /// Listing ID
    pub listing_id: ListingId,
    /// Units left for reservation
    pub remaining_quantity: u32,
}

/// Request to move the pickup deadline.
#[derive(Debug, Deserialize)]
pub struct PickupDeadlineRequest {
    /// New cutoff
    pub pickup_deadline: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a listing for the calling seller's store.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/listings \
///   -H "x-user-id: <uuid>" -H "x-user-role: seller" -H "x-store-id: <uuid>" \
///   -H "Content-Type: application/json" \
///   -d '{"name":"Sourdough","original_price":6000,"discount_price":3000,
///        "quantity":3,"pickup_deadline":"2025-01-01T20:00:00Z"}'
/// ```
pub async fn create_listing(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingResponse>), ApiError> {
    let listing = state.coordinator.create_listing(&caller, request.try_into()?).await?;
    let now = state.coordinator.ledger().now();
    Ok((StatusCode::CREATED, Json(ListingResponse::from_listing(listing, now))))
}

/// Get one listing with its derived phase and committed units.
pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
) -> Result<Json<ListingDetailResponse>, ApiError> {
    let detail = state.catalog.listing_detail(listing_id).await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(ListingDetailResponse {
        listing: ListingResponse::from_listing(detail.listing, now),
        reserved_quantity: detail.reserved_quantity,
        is_early_access: detail.is_early_access,
    }))
}

/// Reserve units of a listing for the caller.
///
/// Responds 409 with `remaining` set when the stock cannot cover the request.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/listings/<id>/reservations \
///   -H "x-user-id: <uuid>" -H "Content-Type: application/json" \
///   -d '{"quantity":2,"preferred_pickup_time":"2025-01-01T18:00:00Z"}'
/// ```
pub async fn reserve(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    JsonBody(request): JsonBody<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let input = ReserveInput::try_from(request)?;
    let reservation = state.coordinator.reserve(&caller, listing_id, input).await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// Record units sold in person.
pub async fn sell_direct(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    JsonBody(request): JsonBody<QuantityRequest>,
) -> Result<Json<SellDirectResponse>, ApiError> {
    let remaining_quantity = state
        .coordinator
        .sell_direct(&caller, listing_id, request.quantity.get()?)
        .await?;
    Ok(Json(SellDirectResponse {
        listing_id,
        remaining_quantity,
    }))
}

/// Close out a listing.
pub async fn mark_sold(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
) -> Result<Json<ListingResponse>, ApiError> {
    let listing = state.coordinator.mark_sold(&caller, listing_id).await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(ListingResponse::from_listing(listing, now)))
}

/// Raise the available quantity.
pub async fn restock(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    JsonBody(request): JsonBody<QuantityRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    let listing = state
        .coordinator
        .restock(&caller, listing_id, request.quantity.get()?)
        .await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(ListingResponse::from_listing(listing, now)))
}

/// Move the pickup deadline.
///
/// Responds 422 when an open reservation's preferred pickup time falls after
/// the requested deadline.
pub async fn update_pickup_deadline(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    JsonBody(request): JsonBody<PickupDeadlineRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    let listing = state
        .coordinator
        .update_pickup_deadline(&caller, listing_id, request.pickup_deadline)
        .await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(ListingResponse::from_listing(listing, now)))
}

/// Edit a listing's name, category, ready-to-eat flag or prices.
///
/// Responds 422 `INVALID_PRICE` when the resulting discount is not below the
/// original price.
///
/// # Example
///
/// ```bash
/// curl -X PATCH http://localhost:8080/api/listings/<id> \
///   -H "x-user-id: <uuid>" -H "x-user-role: seller" -H "x-store-id: <uuid>" \
///   -H "Content-Type: application/json" -d '{"discount_price":2500}'
/// ```
pub async fn edit_listing(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    JsonBody(request): JsonBody<EditListingRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    let listing = state
        .coordinator
        .edit_listing(&caller, listing_id, request.into())
        .await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(ListingResponse::from_listing(listing, now)))
}
