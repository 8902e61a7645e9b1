//! Inventory ledger service.
//!
//! Runs the pure rules from [`surplus_core::ledger`] against an
//! [`InventoryStore`]: read a snapshot, decide, commit with the version check.
//! When another writer commits in between, the operation is decided once more on a
//! fresh read. A second conflict is surfaced to the caller:
//!
//! - `reserve` and `sell_direct` report `InsufficientStock` with the remaining
//!   quantity read after the conflict
//! - every other operation reports `Conflict`
//!
//! No lock is held anywhere in this process; the store's compare-and-swap is the
//! only mutual exclusion.

use crate::metrics;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use surplus_core::environment::Clock;
use surplus_core::error::{ErrorKind, LedgerError, Missing, StoreError};
use surplus_core::ledger::{self, LedgerEvent, ListingSnapshot, Mutation, ReserveRequest};
use surplus_core::store::InventoryStore;
use surplus_core::types::{
    BuyerId, Listing, ListingEdit, ListingId, Reservation, ReservationId, StoreId,
};

/// Attempts per operation: the first try plus one retry on a fresh read.
pub const MAX_ATTEMPTS: u32 = 2;

/// Result of a committed ledger operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed {
    /// Listing as committed
    pub listing: Listing,
    /// Reservation row written alongside, if any
    pub reservation: Option<Reservation>,
    /// What happened, for notification sinks
    pub event: LedgerEvent,
}

/// What to report when both attempts lose the race.
#[derive(Clone, Copy, Debug)]
enum Exhausted {
    Conflict,
    InsufficientStock { requested: u32 },
}

/// Stock mutations with optimistic concurrency and a single retry.
///
/// Cheap to clone; all state lives in the store.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    max_reserve_quantity: u32,
}

impl InventoryLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        max_reserve_quantity: u32,
    ) -> Self {
        Self {
            store,
            clock,
            max_reserve_quantity,
        }
    }

    /// The backing store, for reads that need no retry.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Reserve `quantity` units of a listing for `buyer_id`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotReservable`, `Expired`, `InvalidQuantity`, `InsufficientStock`,
    /// `InvalidTimeWindow` or `Store`.
    #[tracing::instrument(skip(self), fields(reservation_id))]
    pub async fn reserve(
        &self,
        listing_id: ListingId,
        buyer_id: BuyerId,
        quantity: u32,
        preferred_pickup_time: Option<DateTime<Utc>>,
    ) -> Result<Committed, LedgerError> {
        // Fixed across the retry so a reservation id is never handed out twice.
        let reservation_id = ReservationId::new();
        tracing::Span::current().record("reservation_id", tracing::field::display(reservation_id));

        let request = ReserveRequest {
            buyer_id,
            quantity,
            preferred_pickup_time,
            max_quantity: self.max_reserve_quantity,
        };
        let this = self;
        let result = self
            .with_retry(
                "reserve",
                listing_id,
                Exhausted::InsufficientStock { requested: quantity },
                move |now| async move {
                    let snapshot = this.snapshot(listing_id).await?;
                    ledger::reserve(&snapshot, reservation_id, request, now)
                },
            )
            .await;

        metrics::record_reservation(match &result {
            Ok(_) => "reserved",
            Err(LedgerError::InsufficientStock { .. }) => "insufficient_stock",
            Err(LedgerError::Store(_)) => "failed",
            Err(_) => "rejected",
        });
        result
    }

    /// Cancel a buyer's reservation and return its units to stock.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `AlreadyFinal`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        buyer_id: BuyerId,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        let listing_id = self.listing_of(reservation_id).await?;
        self.with_retry("cancel", listing_id, Exhausted::Conflict, move |now| async move {
            let (snapshot, reservation) = this.reservation_snapshot(reservation_id).await?;
            ledger::cancel(&snapshot, &reservation, buyer_id, now)
        })
        .await
    }

    /// Confirm pickup. `store_id` is `None` when the overdue sweep completes it.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `AlreadyFinal`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        reservation_id: ReservationId,
        store_id: Option<StoreId>,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        let listing_id = self.listing_of(reservation_id).await?;
        let result = self
            .with_retry("complete", listing_id, Exhausted::Conflict, move |now| async move {
                let (snapshot, reservation) = this.reservation_snapshot(reservation_id).await?;
                ledger::complete(&snapshot, &reservation, store_id, now)
            })
            .await;
        if result.is_ok() {
            metrics::record_pickup_completed(store_id.is_none());
        }
        result
    }

    /// Record an in-person sale of `quantity` units.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `NotReservable`, `Expired`, `InvalidQuantity`,
    /// `InsufficientStock` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn sell_direct(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
        quantity: u32,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        let result = self
            .with_retry(
                "sell_direct",
                listing_id,
                Exhausted::InsufficientStock { requested: quantity },
                move |now| async move {
                    let snapshot = this.snapshot(listing_id).await?;
                    ledger::sell_direct(&snapshot, store_id, quantity, now)
                },
            )
            .await;
        if result.is_ok() {
            metrics::record_walk_in(quantity);
        }
        result
    }

    /// Close out a listing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `NotReservable`, `PendingPickup`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn mark_sold(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        self.with_retry("mark_sold", listing_id, Exhausted::Conflict, move |now| async move {
            let snapshot = this.snapshot(listing_id).await?;
            ledger::mark_sold(&snapshot, store_id, now)
        })
        .await
    }

    /// Raise the available quantity to `new_quantity`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `NotReservable`, `Expired`, `InvalidQuantity`,
    /// `Conflict` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
        new_quantity: u32,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        self.with_retry("restock", listing_id, Exhausted::Conflict, move |now| async move {
            let snapshot = this.snapshot(listing_id).await?;
            ledger::restock(&snapshot, store_id, new_quantity, now)
        })
        .await
    }

    /// Change the name, category, ready-to-eat flag or prices.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `NotReservable`, `Expired`, `InvalidPrice`, `Conflict`
    /// or `Store`.
    #[tracing::instrument(skip(self, edit))]
    pub async fn edit(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
        edit: ListingEdit,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        self.with_retry("edit", listing_id, Exhausted::Conflict, move |now| {
            let edit = edit.clone();
            async move {
                let snapshot = this.snapshot(listing_id).await?;
                ledger::edit_listing(&snapshot, store_id, edit, now)
            }
        })
        .await
    }

    /// Move the pickup deadline, keeping every reserved pickup time inside it.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `NotReservable`, `Expired`, `InvalidTimeWindow`,
    /// `Conflict` or `Store`.
    #[tracing::instrument(skip(self))]
    pub async fn move_deadline(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
        new_deadline: DateTime<Utc>,
    ) -> Result<Committed, LedgerError> {
        let this = self;
        self.with_retry("move_deadline", listing_id, Exhausted::Conflict, move |now| async move {
            let snapshot = this.snapshot(listing_id).await?;
            ledger::move_deadline(&snapshot, store_id, new_deadline, now)
        })
        .await
    }

    async fn snapshot(&self, listing_id: ListingId) -> Result<ListingSnapshot, LedgerError> {
        self.store
            .load_snapshot(listing_id)
            .await?
            .ok_or(LedgerError::NotFound(Missing::Listing(listing_id)))
    }

    async fn load_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        self.store
            .load_reservation(reservation_id)
            .await?
            .ok_or(LedgerError::NotFound(Missing::Reservation(reservation_id)))
    }

    async fn listing_of(&self, reservation_id: ReservationId) -> Result<ListingId, LedgerError> {
        Ok(self.load_reservation(reservation_id).await?.listing_id)
    }

    // The reservation is re-read on every attempt so a retry sees its latest status.
    async fn reservation_snapshot(
        &self,
        reservation_id: ReservationId,
    ) -> Result<(ListingSnapshot, Reservation), LedgerError> {
        let reservation = self.load_reservation(reservation_id).await?;
        let snapshot = self.snapshot(reservation.listing_id).await?;
        Ok((snapshot, reservation))
    }

    async fn with_retry<D, Fut>(
        &self,
        operation: &'static str,
        listing_id: ListingId,
        exhausted: Exhausted,
        mut decide: D,
    ) -> Result<Committed, LedgerError>
    where
        D: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<Mutation, LedgerError>>,
    {
        let started = Instant::now();
        let mut attempt = 1;

        let result = loop {
            let mutation = match decide(self.clock.now()).await {
                Ok(mutation) => mutation,
                Err(error) => break Err(error),
            };
            let event = mutation.event.clone();
            let reservation = mutation.reservation.as_ref().map(|w| w.reservation().clone());

            match self.store.commit(mutation).await {
                Ok(listing) => {
                    break Ok(Committed {
                        listing,
                        reservation,
                        event,
                    });
                }
                Err(StoreError::ConcurrencyConflict {
                    expected, actual, ..
                }) => {
                    metrics::record_conflict(operation);
                    tracing::info!(
                        %listing_id,
                        %expected,
                        %actual,
                        attempt,
                        operation,
                        "Listing changed concurrently"
                    );
                    if attempt >= MAX_ATTEMPTS {
                        break Err(self.exhausted(listing_id, exhausted).await);
                    }
                    attempt += 1;
                }
                Err(other) => break Err(other.into()),
            }
        };

        metrics::record_ledger_duration(operation, started.elapsed());
        log_outcome(operation, &result);
        result
    }

    async fn exhausted(&self, listing_id: ListingId, exhausted: Exhausted) -> LedgerError {
        match exhausted {
            Exhausted::Conflict => LedgerError::Conflict(listing_id),
            Exhausted::InsufficientStock { requested } => {
                match self.store.load_listing(listing_id).await {
                    Ok(Some(listing)) => LedgerError::InsufficientStock {
                        requested,
                        remaining: listing.quantity,
                    },
                    Ok(None) => LedgerError::NotFound(Missing::Listing(listing_id)),
                    Err(error) => error.into(),
                }
            }
        }
    }
}

fn log_outcome(operation: &'static str, result: &Result<Committed, LedgerError>) {
    match result {
        Ok(committed) => tracing::debug!(
            operation,
            event_type = committed.event.event_type(),
            remaining = committed.listing.quantity,
            "Ledger operation committed"
        ),
        Err(error) => match error.kind() {
            ErrorKind::Internal => {
                tracing::error!(operation, error = %error, "Ledger operation failed");
            }
            ErrorKind::Conflict => {
                tracing::info!(operation, error = %error, "Ledger operation gave up");
            }
            _ => tracing::debug!(operation, error = %error, "Ledger operation rejected"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use surplus_testing::fixtures::ListingBuilder;
    use surplus_testing::{InMemoryInventoryStore, test_clock};
    use surplus_core::types::{ReservationStatus, UserId};

    async fn ledger_with(quantity: u32) -> (InventoryLedger, InMemoryInventoryStore, Listing) {
        let store = InMemoryInventoryStore::new();
        let listing = ListingBuilder::new().quantity(quantity).build();
        store.insert_listing(listing.clone()).await.unwrap();
        let ledger = InventoryLedger::new(Arc::new(store.clone()), Arc::new(test_clock()), 99);
        (ledger, store, listing)
    }

    #[tokio::test]
    async fn test_reserve_commits_listing_and_reservation() {
        let (ledger, store, listing) = ledger_with(5).await;
        let buyer = UserId::new();

        let committed = ledger.reserve(listing.id, buyer, 3, None).await.unwrap();

        assert_eq!(committed.listing.quantity, 2);
        let reservation = committed.reservation.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Reserved);
        assert_eq!(reservation.buyer_id, buyer);
        assert_eq!(store.reservations_of(listing.id), vec![reservation]);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let (ledger, store, listing) = ledger_with(5).await;
        store.fail_next_commits(1);

        let committed = ledger.reserve(listing.id, UserId::new(), 1, None).await.unwrap();

        assert_eq!(committed.listing.quantity, 4);
        assert_eq!(store.conflict_count(), 1);
    }

    #[tokio::test]
    async fn test_second_conflict_reports_insufficient_stock() {
        let (ledger, store, listing) = ledger_with(5).await;
        store.fail_next_commits(2);

        let result = ledger.reserve(listing.id, UserId::new(), 2, None).await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientStock { requested: 2, remaining: 5 })
        ));
        assert_eq!(store.conflict_count(), 2);
        assert!(store.reservations_of(listing.id).is_empty());
    }

    #[tokio::test]
    async fn test_second_conflict_on_cancel_is_conflict() {
        let (ledger, store, listing) = ledger_with(5).await;
        let buyer = UserId::new();
        let reservation = ledger
            .reserve(listing.id, buyer, 1, None)
            .await
            .unwrap()
            .reservation
            .unwrap();
        store.fail_next_commits(2);

        let result = ledger.cancel(reservation.id, buyer).await;

        assert!(matches!(result, Err(LedgerError::Conflict(id)) if id == listing.id));
        assert_eq!(store.listing(listing.id).unwrap().quantity, 4);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (ledger, _store, _listing) = ledger_with(1).await;

        let reserve = ledger.reserve(ListingId::new(), UserId::new(), 1, None).await;
        assert!(matches!(reserve, Err(LedgerError::NotFound(Missing::Listing(_)))));

        let cancel = ledger.cancel(ReservationId::new(), UserId::new()).await;
        assert!(matches!(cancel, Err(LedgerError::NotFound(Missing::Reservation(_)))));
    }

    #[tokio::test]
    async fn test_over_limit_quantity_is_invalid() {
        let store = InMemoryInventoryStore::new();
        let listing = ListingBuilder::new().quantity(50).build();
        store.insert_listing(listing.clone()).await.unwrap();
        let ledger = InventoryLedger::new(Arc::new(store), Arc::new(test_clock()), 10);

        let result = ledger.reserve(listing.id, UserId::new(), 11, None).await;
        assert!(matches!(result, Err(LedgerError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_preferred_pickup_outside_window_is_rejected() {
        let (ledger, _store, listing) = ledger_with(5).await;
        let late = listing.pickup_deadline + Duration::minutes(1);

        let result = ledger.reserve(listing.id, UserId::new(), 1, Some(late)).await;
        assert!(matches!(result, Err(LedgerError::InvalidTimeWindow(_))));
    }
}
