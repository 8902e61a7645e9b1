//! Application state for the marketplace HTTP server.

use crate::catalog::Catalog;
use crate::config::MarketplaceSettings;
use crate::coordinator::ReservationCoordinator;
use crate::inventory::InventoryLedger;
use crate::notify::Dispatcher;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use surplus_core::environment::{BuyerProfiles, Clock, FavoriteStores, NotificationSink};
use surplus_core::store::InventoryStore;

/// Everything the write and read paths need.
pub struct Collaborators {
    /// Listings and reservations
    pub store: Arc<dyn InventoryStore>,
    /// Buyer locations and tiers
    pub profiles: Arc<dyn BuyerProfiles>,
    /// Buyer favorite stores
    pub favorites: Arc<dyn FavoriteStores>,
    /// Push / email / audit sink, if any
    pub notifications: Option<Arc<dyn NotificationSink>>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Write path
    pub coordinator: ReservationCoordinator,
    /// Read path
    pub catalog: Catalog,
    /// Business rules
    pub settings: Arc<MarketplaceSettings>,
    /// Prometheus renderer behind `/metrics`
    pub metrics: Option<PrometheusHandle>,
    /// Pool pinged by `/ready`
    pub database: Option<PgPool>,
}

impl AppState {
    /// Wire the coordinator and the catalog over the same collaborators.
    #[must_use]
    pub fn new(collaborators: Collaborators, settings: MarketplaceSettings) -> Self {
        let settings = Arc::new(settings);
        let Collaborators {
            store,
            profiles,
            favorites,
            notifications,
            clock,
        } = collaborators;

        let dispatcher = notifications.map_or_else(Dispatcher::disabled, Dispatcher::new);
        let ledger = InventoryLedger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.max_reserve_quantity,
        );

        Self {
            coordinator: ReservationCoordinator::new(ledger, dispatcher, Arc::clone(&settings)),
            catalog: Catalog::new(store, profiles, favorites, clock, Arc::clone(&settings)),
            settings,
            metrics: None,
            database: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Ping `pool` on `/ready`.
    #[must_use]
    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.database = Some(pool);
        self
    }
}
