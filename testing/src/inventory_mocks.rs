//! In-memory inventory testing utilities
//!
//! Provides fast, deterministic stand-ins for the backing store and the external
//! collaborators:
//! - [`InMemoryInventoryStore`]: `HashMap`-based listings and reservations with the
//!   same version compare-and-swap as the Postgres store
//! - [`InMemoryBuyerProfiles`] / [`InMemoryFavorites`]: seeded collaborator reads,
//!   optionally failing to exercise degradation
//! - [`RecordingNotifier`]: captures every delivered event

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Poisoned locks only happen after a test already panicked

use surplus_core::environment::{
    BuyerProfile, BuyerProfiles, CollaboratorError, CollaboratorFuture, FavoriteStores,
    NotificationSink,
};
use surplus_core::error::StoreError;
use surplus_core::ledger::{LedgerEvent, ListingSnapshot, Mutation, ReservationWrite};
use surplus_core::store::{InventoryStore, ListingQuery, StoreFuture};
use surplus_core::types::{
    BuyerId, Listing, ListingId, ListingStatus, Reservation, ReservationId, ReservationStatus,
    StoreId, StoreRef,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct Tables {
    stores: HashMap<StoreId, StoreRef>,
    listings: HashMap<ListingId, Listing>,
    reservations: HashMap<ReservationId, Reservation>,
}

/// In-memory inventory store for fast, deterministic testing.
///
/// Both tables sit behind one mutex, so a commit is atomic: the version check,
/// the listing write and the reservation write happen under a single lock.
///
/// # Example
///
/// ```
/// use surplus_testing::InMemoryInventoryStore;
/// use surplus_testing::fixtures::ListingBuilder;
/// use surplus_core::store::InventoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryInventoryStore::new();
/// let listing = ListingBuilder::new().quantity(5).build();
/// store.insert_listing(listing.clone()).await?;
///
/// let loaded = store.load_listing(listing.id).await?;
/// assert_eq!(loaded.map(|l| l.quantity), Some(5));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
    conflicts: Arc<AtomicUsize>,
    forced_conflicts: Arc<AtomicUsize>,
}

impl InMemoryInventoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits rejected for a stale version so far.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Reject the next `n` commits with a concurrency conflict, as if another
    /// writer had just won the race.
    pub fn fail_next_commits(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Current listing, bypassing the async interface.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.tables.lock().unwrap().listings.get(&id).cloned()
    }

    /// Every reservation against `listing_id`, bypassing the async interface.
    #[must_use]
    pub fn reservations_of(&self, listing_id: ListingId) -> Vec<Reservation> {
        self.tables
            .lock()
            .unwrap()
            .reservations
            .values()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect()
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply(&self, mutation: Mutation) -> Result<Listing, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let listing_id = mutation.listing.id;

        let Some(current) = tables.listings.get(&listing_id) else {
            return Err(StoreError::NotFound(format!("listing {listing_id}")));
        };
        if current.version != mutation.expected_version || self.take_forced_conflict() {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::ConcurrencyConflict {
                listing_id,
                expected: mutation.expected_version,
                actual: current.version,
            });
        }

        match mutation.reservation {
            Some(ReservationWrite::Insert(reservation)) => {
                tables.reservations.insert(reservation.id, reservation);
            }
            Some(ReservationWrite::Update {
                reservation,
                expected_status,
            }) => {
                let stored = tables
                    .reservations
                    .get(&reservation.id)
                    .map(|r| r.status);
                match stored {
                    Some(status) if status == expected_status => {
                        tables.reservations.insert(reservation.id, reservation);
                    }
                    Some(_) => {
                        return Err(StoreError::ConcurrencyConflict {
                            listing_id,
                            expected: mutation.expected_version,
                            actual: mutation.expected_version,
                        });
                    }
                    None => {
                        return Err(StoreError::NotFound(format!(
                            "reservation {}",
                            reservation.id
                        )));
                    }
                }
            }
            None => {}
        }

        tables.listings.insert(listing_id, mutation.listing.clone());
        Ok(mutation.listing)
    }
}

fn newest_first(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    reservations
}

impl InventoryStore for InMemoryInventoryStore {
    fn register_store(&self, store: StoreRef) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.lock().unwrap().stores.insert(store.id, store);
            Ok(())
        })
    }

    fn load_store(&self, id: StoreId) -> StoreFuture<'_, Option<StoreRef>> {
        Box::pin(async move { Ok(self.tables.lock().unwrap().stores.get(&id).copied()) })
    }

    // Stores are registered implicitly so fixtures can insert listings directly.
    fn insert_listing(&self, listing: Listing) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.lock().unwrap();
            tables.stores.entry(listing.store.id).or_insert(listing.store);
            tables.listings.insert(listing.id, listing);
            Ok(())
        })
    }

    fn load_listing(&self, id: ListingId) -> StoreFuture<'_, Option<Listing>> {
        Box::pin(async move { Ok(self.listing(id)) })
    }

    fn load_snapshot(&self, id: ListingId) -> StoreFuture<'_, Option<ListingSnapshot>> {
        Box::pin(async move {
            let tables = self.tables.lock().unwrap();
            let Some(listing) = tables.listings.get(&id).cloned() else {
                return Ok(None);
            };
            let open_reservations = tables
                .reservations
                .values()
                .filter(|r| r.listing_id == id && r.is_open())
                .cloned()
                .collect();
            Ok(Some(ListingSnapshot {
                listing,
                open_reservations,
            }))
        })
    }

    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { Ok(self.tables.lock().unwrap().reservations.get(&id).cloned()) })
    }

    fn commit(&self, mutation: Mutation) -> StoreFuture<'_, Listing> {
        Box::pin(async move {
            // Yield so concurrent tasks interleave between read and write.
            tokio::task::yield_now().await;
            self.apply(mutation)
        })
    }

    fn open_listings(
        &self,
        now: DateTime<Utc>,
        query: ListingQuery,
    ) -> StoreFuture<'_, Vec<Listing>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .listings
                .values()
                .filter(|l| {
                    l.status == ListingStatus::Available
                        && l.quantity > 0
                        && !l.is_expired(now)
                        && query.matches(l)
                })
                .cloned()
                .collect())
        })
    }

    fn listings_for_store(&self, store_id: StoreId) -> StoreFuture<'_, Vec<Listing>> {
        Box::pin(async move {
            let mut listings: Vec<Listing> = self
                .tables
                .lock()
                .unwrap()
                .listings
                .values()
                .filter(|l| l.store_id() == store_id)
                .cloned()
                .collect();
            listings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(listings)
        })
    }

    fn reservations_for_listing(&self, listing_id: ListingId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move { Ok(newest_first(self.reservations_of(listing_id))) })
    }

    fn reservations_for_buyer(&self, buyer_id: BuyerId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let matching = self
                .tables
                .lock()
                .unwrap()
                .reservations
                .values()
                .filter(|r| r.buyer_id == buyer_id)
                .cloned()
                .collect();
            Ok(newest_first(matching))
        })
    }

    fn reservations_for_store(
        &self,
        store_id: StoreId,
        status: Option<ReservationStatus>,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let matching = self
                .tables
                .lock()
                .unwrap()
                .reservations
                .values()
                .filter(|r| r.store_id == store_id && status.is_none_or(|s| r.status == s))
                .cloned()
                .collect();
            Ok(newest_first(matching))
        })
    }

    fn overdue_reservations(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let tables = self.tables.lock().unwrap();
            let mut overdue: Vec<Reservation> = tables
                .reservations
                .values()
                .filter(|r| {
                    r.is_open()
                        && tables
                            .listings
                            .get(&r.listing_id)
                            .is_some_and(|l| l.pickup_deadline < cutoff)
                })
                .cloned()
                .collect();
            overdue.sort_by_key(|r| r.created_at);
            Ok(overdue)
        })
    }
}

/// Seeded buyer profiles.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBuyerProfiles {
    profiles: Arc<RwLock<HashMap<BuyerId, BuyerProfile>>>,
    failing: bool,
}

impl InMemoryBuyerProfiles {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose every lookup fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Register or replace a profile
    pub fn insert(&self, buyer_id: BuyerId, profile: BuyerProfile) {
        self.profiles.write().unwrap().insert(buyer_id, profile);
    }
}

impl BuyerProfiles for InMemoryBuyerProfiles {
    fn profile(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, Option<BuyerProfile>> {
        Box::pin(async move {
            if self.failing {
                return Err(CollaboratorError::Unavailable(
                    "profile store offline".to_string(),
                ));
            }
            Ok(self.profiles.read().unwrap().get(&buyer_id).copied())
        })
    }
}

/// Seeded favorite stores.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFavorites {
    favorites: Arc<RwLock<HashMap<BuyerId, HashSet<StoreId>>>>,
    failing: bool,
}

impl InMemoryFavorites {
    /// Create an empty favorites store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A favorites store whose every lookup fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Mark `store_id` as a favorite of `buyer_id`
    pub fn add(&self, buyer_id: BuyerId, store_id: StoreId) {
        self.favorites
            .write()
            .unwrap()
            .entry(buyer_id)
            .or_default()
            .insert(store_id);
    }
}

impl FavoriteStores for InMemoryFavorites {
    fn favorite_stores(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, HashSet<StoreId>> {
        Box::pin(async move {
            if self.failing {
                return Err(CollaboratorError::Unavailable(
                    "favorites store offline".to_string(),
                ));
            }
            Ok(self
                .favorites
                .read()
                .unwrap()
                .get(&buyer_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

/// Notification sink that records what it receives.
///
/// When built with [`RecordingNotifier::failing`] it still records but reports
/// every delivery as failed.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    events: Arc<RwLock<Vec<LedgerEvent>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that fails every delivery
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Events received so far
    #[must_use]
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.read().unwrap().clone()
    }

    /// Event type names received so far
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .unwrap()
            .iter()
            .map(LedgerEvent::event_type)
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, event: LedgerEvent) -> CollaboratorFuture<'_, ()> {
        Box::pin(async move {
            self.events.write().unwrap().push(event);
            if self.failing {
                return Err(CollaboratorError::Unavailable("push gateway down".to_string()));
            }
            Ok(())
        })
    }
}
