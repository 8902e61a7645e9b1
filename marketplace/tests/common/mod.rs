//! Shared wiring for the marketplace integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use surplus_core::geo::GeoPoint;
use surplus_core::store::InventoryStore;
use surplus_core::types::{Caller, StoreId, StoreRef, UserId};
use surplus_marketplace::server::{AppState, Collaborators};
use surplus_marketplace::{Catalog, MarketplaceSettings, ReservationCoordinator};
use surplus_testing::{
    FixedClock, InMemoryBuyerProfiles, InMemoryFavorites, InMemoryInventoryStore, RecordingNotifier,
    test_clock,
};

/// In-memory collaborators plus the state built over them.
pub struct Harness {
    pub store: InMemoryInventoryStore,
    pub clock: FixedClock,
    pub profiles: InMemoryBuyerProfiles,
    pub favorites: InMemoryFavorites,
    pub notifier: RecordingNotifier,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(MarketplaceSettings::default())
    }

    pub fn with_settings(settings: MarketplaceSettings) -> Self {
        surplus_testing::helpers::init_test_tracing();

        let store = InMemoryInventoryStore::new();
        let clock = test_clock();
        let profiles = InMemoryBuyerProfiles::new();
        let favorites = InMemoryFavorites::new();
        let notifier = RecordingNotifier::new();

        let state = AppState::new(
            Collaborators {
                store: Arc::new(store.clone()),
                profiles: Arc::new(profiles.clone()),
                favorites: Arc::new(favorites.clone()),
                notifications: Some(Arc::new(notifier.clone())),
                clock: Arc::new(clock.clone()),
            },
            settings,
        );

        Self {
            store,
            clock,
            profiles,
            favorites,
            notifier,
            state,
        }
    }

    pub fn coordinator(&self) -> &ReservationCoordinator {
        &self.state.coordinator
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    /// Register a store and return it with a seller acting for it.
    pub async fn open_store(&self, location: Option<GeoPoint>) -> (StoreRef, Caller) {
        let store_ref = StoreRef {
            id: StoreId::new(),
            location,
        };
        self.store.register_store(store_ref).await.unwrap();
        (store_ref, Caller::seller(UserId::new(), store_ref.id))
    }

    /// Wait until the notifier saw at least `count` events.
    pub async fn wait_for_events(&self, count: usize) -> Vec<&'static str> {
        for _ in 0..100 {
            let types = self.notifier.event_types();
            if types.len() >= count {
                return types;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.notifier.event_types()
    }
}

pub fn buyer() -> Caller {
    Caller::buyer(UserId::new())
}
