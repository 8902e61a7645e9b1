//! Reservation coordinator.
//!
//! Entry point for every mutating marketplace operation. It resolves who is
//! acting from the [`Caller`], delegates the stock change to the
//! [`InventoryLedger`], and hands the committed event to the notification
//! [`Dispatcher`] once the commit returned.
//!
//! Ownership is never taken from the caller's word alone: the ledger rules compare
//! the caller's store with the listing's store and the caller's user id with the
//! reservation's buyer on every call.

use crate::config::MarketplaceSettings;
use crate::inventory::{Committed, InventoryLedger};
use crate::notify::Dispatcher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surplus_core::error::{LedgerError, Missing, StoreError};
use surplus_core::ledger;
use surplus_core::types::{
    Caller, Listing, ListingEdit, ListingId, NewListing, Reservation, ReservationId, StoreId,
};

/// Buyer input for a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInput {
    /// Units to reserve
    pub quantity: u32,
    /// Pickup time chosen by the buyer, between now and the pickup deadline
    #[serde(default)]
    pub preferred_pickup_time: Option<DateTime<Utc>>,
}

/// Outcome of one overdue-pickup sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue reservations found
    pub examined: usize,
    /// Reservations completed by this sweep
    pub completed: usize,
    /// Reservations finalized by someone else in the meantime
    pub skipped: usize,
    /// Reservations that could not be completed
    pub failed: usize,
}

/// Orchestrates reservations, walk-in sales and seller edits.
#[derive(Clone)]
pub struct ReservationCoordinator {
    ledger: InventoryLedger,
    dispatcher: Dispatcher,
    settings: Arc<MarketplaceSettings>,
}

fn seller_store(caller: &Caller) -> Result<StoreId, LedgerError> {
    caller.store_id().ok_or(LedgerError::NotOwner("store"))
}

fn committed_reservation(committed: &Committed) -> Result<Reservation, LedgerError> {
    committed.reservation.clone().ok_or_else(|| {
        LedgerError::Store(StoreError::NotFound(format!(
            "reservation row missing from {} commit",
            committed.event.event_type()
        )))
    })
}

impl ReservationCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        ledger: InventoryLedger,
        dispatcher: Dispatcher,
        settings: Arc<MarketplaceSettings>,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            settings,
        }
    }

    /// The ledger this coordinator writes through.
    #[must_use]
    pub const fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    fn publish(&self, committed: &Committed) {
        self.dispatcher.dispatch(committed.event.clone());
    }

    /// Put a new listing on sale for the caller's store.
    ///
    /// Early access starts now; general visibility after the configured window.
    ///
    /// # Errors
    ///
    /// `NotOwner` (caller is not a seller), `NotFound` (store unknown),
    /// `InvalidPrice`, `InvalidQuantity`, `InvalidTimeWindow` or `Store`.
    #[tracing::instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn create_listing(
        &self,
        caller: &Caller,
        input: NewListing,
    ) -> Result<Listing, LedgerError> {
        let store_id = seller_store(caller)?;
        let store = self
            .ledger
            .store()
            .load_store(store_id)
            .await?
            .ok_or(LedgerError::NotFound(Missing::Store(store_id)))?;

        let (listing, event) = ledger::create_listing(
            ListingId::new(),
            store,
            input,
            self.settings.early_access_window(),
            self.ledger.now(),
        )?;
        self.ledger.store().insert_listing(listing.clone()).await?;

        tracing::info!(
            listing_id = %listing.id,
            %store_id,
            quantity = listing.quantity,
            "Listing created"
        );
        self.dispatcher.dispatch(event);
        Ok(listing)
    }

    /// Reserve units on behalf of the calling buyer.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotReservable`, `Expired`, `InvalidQuantity`,
    /// `InsufficientStock`, `InvalidTimeWindow` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn reserve(
        &self,
        caller: &Caller,
        listing_id: ListingId,
        input: ReserveInput,
    ) -> Result<Reservation, LedgerError> {
        let committed = self
            .ledger
            .reserve(listing_id, caller.user_id, input.quantity, input.preferred_pickup_time)
            .await?;
        let reservation = committed_reservation(&committed)?;
        self.publish(&committed);
        Ok(reservation)
    }

    /// Cancel one of the calling buyer's reservations.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `AlreadyFinal`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn cancel(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        let committed = self.ledger.cancel(reservation_id, caller.user_id).await?;
        let reservation = committed_reservation(&committed)?;
        self.publish(&committed);
        Ok(reservation)
    }

    /// Seller confirms that the buyer picked up.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `AlreadyFinal`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn complete_pickup(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.complete(reservation_id, Some(store_id)).await?;
        let reservation = committed_reservation(&committed)?;
        self.publish(&committed);
        Ok(reservation)
    }

    /// Record an in-person sale and return the units left.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `NotReservable`, `Expired`, `InvalidQuantity`,
    /// `InsufficientStock` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn sell_direct(
        &self,
        caller: &Caller,
        listing_id: ListingId,
        quantity: u32,
    ) -> Result<u32, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.sell_direct(listing_id, store_id, quantity).await?;
        self.publish(&committed);
        Ok(committed.listing.quantity)
    }

    /// Close out a listing with no pickups pending.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `NotReservable`, `PendingPickup`, `Conflict` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn mark_sold(
        &self,
        caller: &Caller,
        listing_id: ListingId,
    ) -> Result<Listing, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.mark_sold(listing_id, store_id).await?;
        self.publish(&committed);
        Ok(committed.listing)
    }

    /// Raise the available quantity. Decreases must be recorded as walk-in sales.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `NotReservable`, `Expired`, `InvalidQuantity`,
    /// `Conflict` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn restock(
        &self,
        caller: &Caller,
        listing_id: ListingId,
        new_quantity: u32,
    ) -> Result<Listing, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.restock(listing_id, store_id, new_quantity).await?;
        self.publish(&committed);
        Ok(committed.listing)
    }

    /// Edit a listing's name, category, ready-to-eat flag or prices.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `NotReservable`, `Expired`, `InvalidPrice`,
    /// `Conflict` or `Store`.
    #[tracing::instrument(skip(self, edit), fields(user_id = %caller.user_id))]
    pub async fn edit_listing(
        &self,
        caller: &Caller,
        listing_id: ListingId,
        edit: ListingEdit,
    ) -> Result<Listing, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.edit(listing_id, store_id, edit).await?;
        self.publish(&committed);
        Ok(committed.listing)
    }

    /// Move a listing's pickup deadline.
    ///
    /// The new deadline may not fall before the preferred pickup time of any
    /// reservation still awaiting pickup.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `NotFound`, `NotReservable`, `Expired`, `InvalidTimeWindow`,
    /// `Conflict` or `Store`.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn update_pickup_deadline(
        &self,
        caller: &Caller,
        listing_id: ListingId,
        new_deadline: DateTime<Utc>,
    ) -> Result<Listing, LedgerError> {
        let store_id = seller_store(caller)?;
        let committed = self.ledger.move_deadline(listing_id, store_id, new_deadline).await?;
        self.publish(&committed);
        Ok(committed.listing)
    }

    /// Complete every reservation whose pickup deadline passed more than the grace
    /// period ago, one atomic mutation per reservation.
    ///
    /// # Errors
    ///
    /// `Store` when the overdue reservations cannot be listed. Failures on single
    /// reservations are counted in the report instead.
    #[tracing::instrument(skip(self))]
    pub async fn auto_complete_overdue(&self) -> Result<SweepReport, LedgerError> {
        let cutoff = self.ledger.now() - self.settings.auto_complete_grace();
        let overdue = self.ledger.store().overdue_reservations(cutoff).await?;

        let mut report = SweepReport {
            examined: overdue.len(),
            ..SweepReport::default()
        };
        for reservation in overdue {
            match self.ledger.complete(reservation.id, None).await {
                Ok(committed) => {
                    report.completed += 1;
                    self.publish(&committed);
                }
                Err(LedgerError::AlreadyFinal(_)) => report.skipped += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %error,
                        "Overdue pickup not completed"
                    );
                }
            }
        }

        tracing::info!(
            %cutoff,
            examined = report.examined,
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed,
            "Overdue pickup sweep finished"
        );
        Ok(report)
    }
}
