//! Persistence abstraction for listings and reservations.
//!
//! A store does not decide anything. It loads [`ListingSnapshot`]s for the ledger
//! rules to decide on and applies the resulting [`Mutation`]s atomically:
//!
//! - the listing row is written only if it is still at `expected_version`
//! - the reservation row (if any) is written in the same unit of work
//! - either both writes land or neither does
//!
//! # Implementations
//!
//! - `PostgresInventoryStore` (in `surplus-postgres`): one transaction per mutation
//! - `InMemoryInventoryStore` (in `surplus-testing`): mutex-guarded maps with the
//!   same compare-and-swap semantics

use crate::error::StoreError;
use crate::ledger::{ListingSnapshot, Mutation};
use crate::types::{
    BuyerId, Listing, ListingId, Money, Reservation, ReservationId, ReservationStatus, StoreId,
    StoreRef,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`InventoryStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Attribute filters a store can push down when listing open listings.
///
/// Location and release-gate filtering happen later, per buyer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    /// Only ready-to-eat (or only not ready-to-eat) listings
    pub is_instant: Option<bool>,
    /// Only listings whose discount price is at most this
    pub max_price: Option<Money>,
    /// Only listings in this category
    pub category: Option<String>,
}

impl ListingQuery {
    /// Whether `listing` passes the attribute filters.
    #[must_use]
    pub fn matches(&self, listing: &Listing) -> bool {
        self.is_instant.is_none_or(|flag| listing.is_instant == flag)
            && self
                .max_price
                .is_none_or(|max| listing.discount_price <= max)
            && self
                .category
                .as_deref()
                .is_none_or(|category| listing.category.as_deref() == Some(category))
    }
}

/// Storage for listings and reservations with optimistic concurrency.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] instead of using `async fn` so the store can be
/// shared as `Arc<dyn InventoryStore>` across request handlers.
pub trait InventoryStore: Send + Sync {
    /// Register a store or update its location.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the upsert failed
    fn register_store(&self, store: StoreRef) -> StoreFuture<'_, ()>;

    /// Load a store by id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn load_store(&self, id: StoreId) -> StoreFuture<'_, Option<StoreRef>>;

    /// Persist a freshly created listing.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the owning store is not registered
    /// - `DatabaseError`: the insert failed
    fn insert_listing(&self, listing: Listing) -> StoreFuture<'_, ()>;

    /// Load a listing by id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: row could not be mapped
    fn load_listing(&self, id: ListingId) -> StoreFuture<'_, Option<Listing>>;

    /// Load a listing with its `RESERVED` reservations, read consistently.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: row could not be mapped
    fn load_snapshot(&self, id: ListingId) -> StoreFuture<'_, Option<ListingSnapshot>>;

    /// Load a reservation by id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: row could not be mapped
    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Apply a mutation atomically and return the committed listing.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the listing is no longer at `expected_version`, or the
    ///   reservation being updated left its expected status
    /// - `NotFound`: the listing disappeared
    /// - `DatabaseError`: the transaction failed; nothing was written
    fn commit(&self, mutation: Mutation) -> StoreFuture<'_, Listing>;

    /// Listings that are `AVAILABLE`, in stock, not past their deadline at `now`
    /// and match `query`. No particular order.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn open_listings(
        &self,
        now: DateTime<Utc>,
        query: ListingQuery,
    ) -> StoreFuture<'_, Vec<Listing>>;

    /// Every listing of a store, any status, newest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: row could not be mapped
    fn listings_for_store(&self, store_id: StoreId) -> StoreFuture<'_, Vec<Listing>>;

    /// Every reservation ever made against a listing, any status.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn reservations_for_listing(&self, listing_id: ListingId) -> StoreFuture<'_, Vec<Reservation>>;

    /// A buyer's reservations, newest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn reservations_for_buyer(&self, buyer_id: BuyerId) -> StoreFuture<'_, Vec<Reservation>>;

    /// A store's reservations, newest first, optionally narrowed to one status.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn reservations_for_store(
        &self,
        store_id: StoreId,
        status: Option<ReservationStatus>,
    ) -> StoreFuture<'_, Vec<Reservation>>;

    /// `RESERVED` reservations whose listing deadline is before `cutoff`.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn overdue_reservations(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>>;
}
