//! Buyer feed endpoint.
//!
//! - GET /api/feed?lat=&lon=&radius_km=&is_instant=&max_price=&category=&limit=
//!
//! Anonymous callers get the general feed. Identified buyers get their tier's
//! early access, their saved location and their favorite stores first.

use super::listings::ListingResponse;
use crate::auth::CallerIdentity;
use crate::catalog::{FeedFilters, FeedItem};
use crate::error::ApiError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surplus_core::geo::GeoPoint;
use surplus_core::types::Money;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Feed query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    /// Latitude of the search origin; requires `lon`
    pub lat: Option<f64>,
    /// Longitude of the search origin; requires `lat`
    pub lon: Option<f64>,
    /// Search radius, clamped to the configured maximum
    pub radius_km: Option<f64>,
    /// Only ready-to-eat listings
    pub is_instant: Option<bool>,
    /// Upper bound on the discounted price
    pub max_price: Option<u64>,
    /// Exact category
    pub category: Option<String>,
    /// Maximum number of items
    pub limit: Option<usize>,
}

impl FeedQuery {
    fn into_filters(self) -> Result<FeedFilters, ApiError> {
        let near = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(ApiError::bad_request("lat/lon out of range"));
                }
                Some(GeoPoint::new(lat, lon))
            }
            (None, None) => None,
            _ => return Err(ApiError::bad_request("lat and lon must be given together")),
        };
        if self.radius_km.is_some_and(|radius| !radius.is_finite() || radius <= 0.0) {
            return Err(ApiError::bad_request("radius_km must be positive"));
        }
        Ok(FeedFilters {
            near,
            radius_km: self.radius_km,
            is_instant: self.is_instant,
            max_price: self.max_price.map(Money::new),
            category: self.category,
            limit: self.limit,
        })
    }
}

/// One feed entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedItemResponse {
    /// The listing
    #[serde(flatten)]
    pub listing: ListingResponse,
    /// Distance from the search origin, when one is known
    pub distance_km: Option<f64>,
    /// Shown only because of the buyer's tier
    pub is_early_access: bool,
    /// Sold by one of the buyer's favorite stores
    pub is_favorite: bool,
}

impl FeedItemResponse {
    /// Render `item` as of `now`.
    #[must_use]
    pub fn from_item(item: FeedItem, now: DateTime<Utc>) -> Self {
        Self {
            listing: ListingResponse::from_listing(item.listing, now),
            distance_km: item.distance_km,
            is_early_access: item.is_early_access,
            is_favorite: item.is_favorite,
        }
    }
}

/// Feed response.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    /// Items in display order
    pub items: Vec<FeedItemResponse>,
    /// Number of items
    pub count: usize,
    /// Evaluation time
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Compose the feed for the caller, if identified.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:8080/api/feed?lat=37.5665&lon=126.978&radius_km=2" -H "x-user-id: <uuid>"
/// ```
pub async fn get_feed(
    caller: Option<CallerIdentity>,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let filters = query.into_filters()?;
    let buyer_id = caller.map(|CallerIdentity(caller)| caller.user_id);

    let items = state.catalog.feed(buyer_id, filters).await?;
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
