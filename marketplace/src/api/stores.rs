//! Store page endpoints.
//!
//! - GET /api/stores/:id/listings - A store's open listings as the caller may see them
//! - GET /api/store/listings - Every listing of the seller's store, with reserved units

use super::feed::{FeedItemResponse, FeedResponse};
use super::listings::{ListingDetailResponse, ListingResponse};
use crate::auth::CallerIdentity;
use crate::error::ApiError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use surplus_core::types::StoreId;

/// A store's page for buyers: open listings past the caller's release gate, newest
/// first. Anonymous callers see what the lowest tier sees.
pub async fn get_store_listings(
    caller: Option<CallerIdentity>,
    State(state): State<AppState>,
    Path(store_id): Path<StoreId>,
) -> Result<Json<FeedResponse>, ApiError> {
    let buyer_id = caller.map(|CallerIdentity(caller)| caller.user_id);
    let items = state.catalog.store_feed(buyer_id, store_id).await?;
    let now = state.coordinator.ledger().now();
    let items: Vec<FeedItemResponse> = items
        .into_iter()
        .map(|item| FeedItemResponse::from_item(item, now))
        .collect();

    Ok(Json(FeedResponse {
        count: items.len(),
        items,
        generated_at: now,
    }))
}

/// The seller's own listings, including sold and expired ones.
pub async fn list_own_listings(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
) -> Result<Json<Vec<ListingDetailResponse>>, ApiError> {
    let store_id = caller
        .store_id()
        .ok_or_else(|| ApiError::forbidden("Only sellers can list their store's listings"))?;

    let listings = state.catalog.store_listings(store_id).await?;
    let now = state.coordinator.ledger().now();
    Ok(Json(
        listings
            .into_iter()
            .map(|detail| ListingDetailResponse {
                listing: ListingResponse::from_listing(detail.listing, now),
                reserved_quantity: detail.reserved_quantity,
                is_early_access: detail.is_early_access,
            })
            .collect(),
    ))
}
