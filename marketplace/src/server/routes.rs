//! Router configuration for the marketplace.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, metrics_handler, readiness_check};
use super::state::AppState;
use crate::api::{feed, listings, reservations, stores, sweeps};
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Configures:
/// - Health, readiness and Prometheus endpoints at the root
/// - Listing, reservation and feed endpoints under `/api`
/// - The scheduler's sweep endpoint under `/api/internal`
/// - Request tracing and `x-request-id` propagation
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Listings
        .route("/listings", post(listings::create_listing))
        .route(
            "/listings/:id",
            get(listings::get_listing).patch(listings::edit_listing),
        )
        .route("/listings/:id/reservations", post(listings::reserve))
        .route("/listings/:id/sell-direct", post(listings::sell_direct))
        .route("/listings/:id/mark-sold", post(listings::mark_sold))
        .route("/listings/:id/quantity", put(listings::restock))
        .route(
            "/listings/:id/pickup-deadline",
            put(listings::update_pickup_deadline),
        )
        // Buyer feed and store pages (read side)
        .route("/feed", get(feed::get_feed))
        .route("/stores/:id/listings", get(stores::get_store_listings))
        .route("/store/listings", get(stores::list_own_listings))
        // Reservations
        .route("/reservations", get(reservations::list_my_reservations))
        .route(
            "/reservations/:id/cancel",
            post(reservations::cancel_reservation),
        )
        .route(
            "/reservations/:id/complete",
            post(reservations::complete_reservation),
        )
        .route(
            "/store/reservations",
            get(reservations::list_store_reservations),
        )
        // Scheduler
        .route("/internal/sweeps/auto-complete", post(sweeps::auto_complete));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
