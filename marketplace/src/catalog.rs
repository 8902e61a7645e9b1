//! Buyer-facing read path.
//!
//! The feed is composed per request and has no side effects:
//!
//! 1. Ask the store for open listings matching the attribute filters.
//! 2. Keep those [`VisibilityPolicy`] lets this buyer see right now, computing each
//!    store distance exactly once.
//! 3. Sort by distance, or newest first when the buyer has no location.
//! 4. Stable-partition listings from favorited stores to the front.
//!
//! Profile and favorites lookups degrade: when either collaborator fails the feed
//! is served as for an anonymous buyer (no location, lowest tier, no favorites).

use crate::config::MarketplaceSettings;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use surplus_core::environment::{BuyerProfile, BuyerProfiles, Clock, FavoriteStores};
use surplus_core::error::{LedgerError, Missing};
use surplus_core::geo::GeoPoint;
use surplus_core::store::{InventoryStore, ListingQuery};
use surplus_core::types::{
    BuyerId, Listing, ListingId, ListingPhase, Money, Reservation, ReservationStatus, StoreId,
};
use surplus_core::visibility::Visibility;

/// Buyer-chosen feed narrowing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedFilters {
    /// Search from here instead of the profile location
    pub near: Option<GeoPoint>,
    /// Search radius; defaults to the configured radius, clamped to the maximum
    pub radius_km: Option<f64>,
    /// Only ready-to-eat (or only not ready-to-eat) listings
    pub is_instant: Option<bool>,
    /// Only listings with a discount price at most this
    pub max_price: Option<Money>,
    /// Only this category
    pub category: Option<String>,
    /// At most this many items
    pub limit: Option<usize>,
}

/// One visible listing in a buyer's feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// The listing
    pub listing: Listing,
    /// Distance to the store, when the buyer's location is known
    pub distance_km: Option<f64>,
    /// General buyers cannot see this listing yet
    pub is_early_access: bool,
    /// Sold by a store the buyer favorited
    pub is_favorite: bool,
}

/// A listing with its derived state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    /// The listing
    pub listing: Listing,
    /// Buyer-facing lifecycle label
    pub phase: ListingPhase,
    /// Units held by reservations awaiting pickup
    pub reserved_quantity: u32,
    /// Still inside the early-access window
    pub is_early_access: bool,
}

/// Read-only queries over listings and reservations.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn InventoryStore>,
    profiles: Arc<dyn BuyerProfiles>,
    favorites: Arc<dyn FavoriteStores>,
    clock: Arc<dyn Clock>,
    settings: Arc<MarketplaceSettings>,
}

impl Catalog {
    /// Create a catalog.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        profiles: Arc<dyn BuyerProfiles>,
        favorites: Arc<dyn FavoriteStores>,
        clock: Arc<dyn Clock>,
        settings: Arc<MarketplaceSettings>,
    ) -> Self {
        Self {
            store,
            profiles,
            favorites,
            clock,
            settings,
        }
    }

    /// The feed visible to `buyer_id` (anonymous when `None`) right now.
    ///
    /// # Errors
    ///
    /// `Store` when open listings cannot be read. Collaborator failures degrade
    /// instead of failing.
    #[tracing::instrument(skip(self))]
    pub async fn feed(
        &self,
        buyer_id: Option<BuyerId>,
        filters: FeedFilters,
    ) -> Result<Vec<FeedItem>, LedgerError> {
        metrics::record_feed_request();
        let now = self.clock.now();

        let (profile, favorites) = match buyer_id {
            Some(buyer_id) => {
                futures::join!(self.profile(buyer_id), self.favorite_stores(buyer_id))
            }
            None => (BuyerProfile::default(), HashSet::new()),
        };
        let location = filters.near.or(profile.location);
        let radius_km = self.settings.effective_radius(filters.radius_km);
        let policy = self.settings.visibility_policy();

        let query = ListingQuery {
            is_instant: filters.is_instant,
            max_price: filters.max_price,
            category: filters.category,
        };
        let candidates = self.store.open_listings(now, query).await?;
        let examined = candidates.len();

        let mut items: Vec<FeedItem> = candidates
            .into_iter()
            .filter_map(|listing| {
                match policy.check(&listing, location, radius_km, profile.tier, now) {
                    Visibility::Visible {
                        distance_km,
                        early_access,
                    } => Some(FeedItem {
                        is_favorite: favorites.contains(&listing.store_id()),
                        listing,
                        distance_km,
                        is_early_access: early_access,
                    }),
                    Visibility::Hidden(_) => None,
                }
            })
            .collect();

        if location.is_some() {
            items.sort_by(by_distance);
        } else {
            items.sort_by(newest_first);
        }
        // Stable: favorites move up, every other relative order is kept.
        items.sort_by_key(|item| !item.is_favorite);

        if let Some(limit) = filters.limit {
            items.truncate(limit);
        }

        tracing::debug!(
            examined,
            visible = items.len(),
            located = location.is_some(),
            radius_km,
            tier = profile.tier.level(),
            "Feed composed"
        );
        Ok(items)
    }

    /// A listing with its display phase and reserved quantity.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Store`.
    pub async fn listing_detail(
        &self,
        listing_id: ListingId,
    ) -> Result<ListingDetail, LedgerError> {
        let now = self.clock.now();
        let snapshot = self
            .store
            .load_snapshot(listing_id)
            .await?
            .ok_or(LedgerError::NotFound(Missing::Listing(listing_id)))?;
        Ok(ListingDetail {
            phase: snapshot.listing.phase(now),
            reserved_quantity: snapshot.reserved_quantity(),
            is_early_access: snapshot.listing.is_early_access(now),
            listing: snapshot.listing,
        })
    }

    /// Everything a store has listed, newest first, for the seller's dashboard.
    ///
    /// No visibility filtering: sold, sold-out and expired listings are included.
    ///
    /// # Errors
    ///
    /// `Store`.
    pub async fn store_listings(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<ListingDetail>, LedgerError> {
        let now = self.clock.now();
        let (listings, open) = futures::try_join!(
            self.store.listings_for_store(store_id),
            self.store
                .reservations_for_store(store_id, Some(ReservationStatus::Reserved)),
        )?;

        let mut reserved: HashMap<ListingId, u32> = HashMap::new();
        for reservation in open {
            *reserved.entry(reservation.listing_id).or_default() += reservation.quantity;
        }

        Ok(listings
            .into_iter()
            .map(|listing| ListingDetail {
                phase: listing.phase(now),
                reserved_quantity: reserved.get(&listing.id).copied().unwrap_or_default(),
                is_early_access: listing.is_early_access(now),
                listing,
            })
            .collect())
    }

    /// A store's page as `buyer_id` sees it: open listings past the buyer's release
    /// gate, newest first. Distance plays no part.
    ///
    /// # Errors
    ///
    /// `Store`. A failing profile lookup falls back to the lowest tier.
    #[tracing::instrument(skip(self))]
    pub async fn store_feed(
        &self,
        buyer_id: Option<BuyerId>,
        store_id: StoreId,
    ) -> Result<Vec<FeedItem>, LedgerError> {
        let now = self.clock.now();
        let (profile, favorites) = match buyer_id {
            Some(buyer_id) => {
                futures::join!(self.profile(buyer_id), self.favorite_stores(buyer_id))
            }
            None => (BuyerProfile::default(), HashSet::new()),
        };
        let policy = self.settings.visibility_policy();
        let is_favorite = favorites.contains(&store_id);

        let mut items: Vec<FeedItem> = self
            .store
            .listings_for_store(store_id)
            .await?
            .into_iter()
            .filter_map(|listing| {
                match policy.check(&listing, None, 0.0, profile.tier, now) {
                    Visibility::Visible { early_access, .. } => Some(FeedItem {
                        listing,
                        distance_km: None,
                        is_early_access: early_access,
                        is_favorite,
                    }),
                    Visibility::Hidden(_) => None,
                }
            })
            .collect();
        items.sort_by(newest_first);
        Ok(items)
    }

    /// A buyer's reservations, newest first.
    ///
    /// # Errors
    ///
    /// `Store`.
    pub async fn buyer_reservations(
        &self,
        buyer_id: BuyerId,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.store.reservations_for_buyer(buyer_id).await?)
    }

    /// A store's reservations, newest first, optionally narrowed to one status.
    ///
    /// # Errors
    ///
    /// `Store`.
    pub async fn store_reservations(
        &self,
        store_id: StoreId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.store.reservations_for_store(store_id, status).await?)
    }

    async fn profile(&self, buyer_id: BuyerId) -> BuyerProfile {
        match self.profiles.profile(buyer_id).await {
            Ok(profile) => profile.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(
                    %buyer_id,
                    error = %error,
                    "Buyer profile unavailable, using defaults"
                );
                BuyerProfile::default()
            }
        }
    }

    async fn favorite_stores(&self, buyer_id: BuyerId) -> HashSet<StoreId> {
        match self.favorites.favorite_stores(buyer_id).await {
            Ok(stores) => stores,
            Err(error) => {
                tracing::warn!(
                    %buyer_id,
                    error = %error,
                    "Favorite stores unavailable, skipping boost"
                );
                HashSet::new()
            }
        }
    }
}

fn by_distance(a: &FeedItem, b: &FeedItem) -> Ordering {
    let a_km = a.distance_km.unwrap_or(f64::INFINITY);
    let b_km = b.distance_km.unwrap_or(f64::INFINITY);
    a_km.total_cmp(&b_km).then_with(|| newest_first(a, b))
}

fn newest_first(a: &FeedItem, b: &FeedItem) -> Ordering {
    fn key(item: &FeedItem) -> (DateTime<Utc>, ListingId) {
        (item.listing.created_at, item.listing.id)
    }
    key(b).cmp(&key(a))
}
