//! Stock-mutation rules for listings and reservations.
//!
//! Every operation here is a pure decision: it takes a [`ListingSnapshot`] read from
//! the store, validates the request against it and returns a [`Mutation`] describing
//! the complete set of writes. The store applies a mutation atomically and only if
//! the listing is still at [`Mutation::expected_version`]; if another writer got
//! there first the caller re-reads and decides again.
//!
//! Keeping decisions free of I/O means the same rules back the in-memory store used
//! in tests and the Postgres store used in production.
//!
//! # Conservation
//!
//! Units only move between buckets, they are never created or destroyed except by a
//! seller restock:
//!
//! ```text
//! quantity + Σ reserved + Σ completed + sold_direct == stocked_quantity
//! ```

use crate::error::LedgerError;
use crate::types::{
    BuyerId, Listing, ListingEdit, ListingId, ListingStatus, NewListing, Reservation,
    ReservationId, ReservationStatus, StoreId, StoreRef,
};
use crate::version::Version;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A listing together with its reservations still in `RESERVED`.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingSnapshot {
    /// Listing as last committed
    pub listing: Listing,
    /// Reservations in `RESERVED` status against the listing
    pub open_reservations: Vec<Reservation>,
}

impl ListingSnapshot {
    /// Units held by open reservations.
    #[must_use]
    pub fn reserved_quantity(&self) -> u32 {
        self.open_reservations.iter().map(|r| r.quantity).sum()
    }

    /// Latest preferred pickup time among open reservations.
    #[must_use]
    pub fn latest_preferred_pickup(&self) -> Option<DateTime<Utc>> {
        self.open_reservations
            .iter()
            .filter_map(|r| r.preferred_pickup_time)
            .max()
    }
}

/// Write to the reservation table that accompanies a listing update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReservationWrite {
    /// Insert a new reservation row.
    Insert(Reservation),
    /// Overwrite an existing row, only if it is still in `expected_status`.
    Update {
        /// New row contents
        reservation: Reservation,
        /// Status the row must still have
        expected_status: ReservationStatus,
    },
}

impl ReservationWrite {
    /// The reservation being written.
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Insert(reservation) | Self::Update { reservation, .. } => reservation,
        }
    }
}

/// Fact recorded by a committed mutation, forwarded to notification and audit sinks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A seller put a new listing on sale.
    ListingCreated {
        /// New listing
        listing_id: ListingId,
        /// Owning store
        store_id: StoreId,
        /// Units put on sale
        quantity: u32,
    },
    /// A buyer reserved units.
    Reserved {
        /// New reservation
        reservation_id: ReservationId,
        /// Reserved listing
        listing_id: ListingId,
        /// Store to notify
        store_id: StoreId,
        /// Reserving buyer
        buyer_id: BuyerId,
        /// Units reserved
        quantity: u32,
        /// Units left afterwards
        remaining: u32,
    },
    /// A buyer canceled a reservation and its units returned to stock.
    ReservationCanceled {
        /// Canceled reservation
        reservation_id: ReservationId,
        /// Listing the units returned to
        listing_id: ListingId,
        /// Store to notify
        store_id: StoreId,
        /// Canceling buyer
        buyer_id: BuyerId,
        /// Units returned
        quantity: u32,
        /// Units left afterwards
        remaining: u32,
    },
    /// Pickup was confirmed.
    PickupCompleted {
        /// Completed reservation
        reservation_id: ReservationId,
        /// Listing picked up from
        listing_id: ListingId,
        /// Buyer who picked up
        buyer_id: BuyerId,
        /// Completed by the overdue sweep rather than the seller
        automatic: bool,
    },
    /// A seller recorded an in-person sale.
    SoldDirect {
        /// Listing sold from
        listing_id: ListingId,
        /// Selling store
        store_id: StoreId,
        /// Units sold
        quantity: u32,
        /// Units left afterwards
        remaining: u32,
    },
    /// A seller closed out the listing.
    MarkedSold {
        /// Closed listing
        listing_id: ListingId,
        /// Owning store
        store_id: StoreId,
    },
    /// A seller added units.
    Restocked {
        /// Restocked listing
        listing_id: ListingId,
        /// Units added
        added: u32,
        /// Units available afterwards
        quantity: u32,
    },
    /// A seller changed the listing's description or prices.
    ListingEdited {
        /// Edited listing
        listing_id: ListingId,
        /// Owning store
        store_id: StoreId,
    },
    /// A seller moved the pickup deadline.
    DeadlineMoved {
        /// Edited listing
        listing_id: ListingId,
        /// Deadline before the edit
        previous: DateTime<Utc>,
        /// Deadline after the edit
        deadline: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Versioned event name, e.g. `ListingReserved.v1`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ListingCreated { .. } => "ListingCreated.v1",
            Self::Reserved { .. } => "ListingReserved.v1",
            Self::ReservationCanceled { .. } => "ReservationCanceled.v1",
            Self::PickupCompleted { .. } => "PickupCompleted.v1",
            Self::SoldDirect { .. } => "ListingSoldDirect.v1",
            Self::MarkedSold { .. } => "ListingMarkedSold.v1",
            Self::Restocked { .. } => "ListingRestocked.v1",
            Self::ListingEdited { .. } => "ListingEdited.v1",
            Self::DeadlineMoved { .. } => "PickupDeadlineMoved.v1",
        }
    }

    /// Listing the event concerns.
    #[must_use]
    pub const fn listing_id(&self) -> ListingId {
        match self {
            Self::ListingCreated { listing_id, .. }
            | Self::Reserved { listing_id, .. }
            | Self::ReservationCanceled { listing_id, .. }
            | Self::PickupCompleted { listing_id, .. }
            | Self::SoldDirect { listing_id, .. }
            | Self::MarkedSold { listing_id, .. }
            | Self::Restocked { listing_id, .. }
            | Self::ListingEdited { listing_id, .. }
            | Self::DeadlineMoved { listing_id, .. } => *listing_id,
        }
    }
}

/// Complete set of writes for one ledger operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    /// Listing after the operation, version already advanced
    pub listing: Listing,
    /// Version the stored listing must still have
    pub expected_version: Version,
    /// Reservation row written together with the listing
    pub reservation: Option<ReservationWrite>,
    /// What happened
    pub event: LedgerEvent,
}

/// Validated request to reserve units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReserveRequest {
    /// Reserving buyer
    pub buyer_id: BuyerId,
    /// Units to reserve
    pub quantity: u32,
    /// Pickup time chosen by the buyer
    pub preferred_pickup_time: Option<DateTime<Utc>>,
    /// Largest quantity accepted in a single reservation
    pub max_quantity: u32,
}

fn bump(listing: &Listing, now: DateTime<Utc>) -> (Listing, Version) {
    let expected = listing.version;
    let mut next = listing.clone();
    next.version = expected.next();
    next.updated_at = now;
    (next, expected)
}

fn validate_owner(listing: &Listing, store_id: StoreId) -> Result<(), LedgerError> {
    if listing.store_id() == store_id {
        Ok(())
    } else {
        Err(LedgerError::NotOwner("listing"))
    }
}

/// Checks a listing can still hand out units at `now`.
fn validate_open(listing: &Listing, now: DateTime<Utc>) -> Result<(), LedgerError> {
    if listing.status == ListingStatus::Sold {
        return Err(LedgerError::NotReservable);
    }
    if listing.is_expired(now) {
        return Err(LedgerError::Expired);
    }
    Ok(())
}

fn validate_take(listing: &Listing, requested: u32, max: u32) -> Result<(), LedgerError> {
    if requested == 0 {
        return Err(LedgerError::InvalidQuantity(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if requested > max {
        return Err(LedgerError::InvalidQuantity(format!(
            "cannot take more than {max} units at once (requested: {requested})"
        )));
    }
    if requested > listing.quantity {
        return Err(LedgerError::InsufficientStock {
            requested,
            remaining: listing.quantity,
        });
    }
    Ok(())
}

fn validate_pickup_time(
    preferred: Option<DateTime<Utc>>,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    match preferred {
        Some(at) if at < now || at > deadline => Err(LedgerError::InvalidTimeWindow(format!(
            "preferred pickup time {at} must fall between {now} and the pickup deadline {deadline}"
        ))),
        _ => Ok(()),
    }
}

/// Builds a new listing for `store`.
///
/// Elevated-tier buyers see it immediately; everyone else after `early_access_window`.
///
/// # Errors
///
/// - `InvalidPrice`: discount not strictly below the original price
/// - `InvalidQuantity`: zero units
/// - `InvalidTimeWindow`: deadline not in the future
pub fn create_listing(
    id: ListingId,
    store: StoreRef,
    input: NewListing,
    early_access_window: Duration,
    now: DateTime<Utc>,
) -> Result<(Listing, LedgerEvent), LedgerError> {
    if input.discount_price >= input.original_price {
        return Err(LedgerError::InvalidPrice {
            original: input.original_price.amount(),
            discount: input.discount_price.amount(),
        });
    }
    if input.quantity == 0 {
        return Err(LedgerError::InvalidQuantity(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if input.pickup_deadline <= now {
        return Err(LedgerError::InvalidTimeWindow(
            "pickup deadline must be in the future".to_string(),
        ));
    }

    let listing = Listing {
        id,
        store,
        name: input.name,
        category: input.category,
        is_instant: input.is_instant,
        original_price: input.original_price,
        discount_price: input.discount_price,
        quantity: input.quantity,
        stocked_quantity: input.quantity,
        sold_direct: 0,
        status: ListingStatus::Available,
        pickup_deadline: input.pickup_deadline,
        early_access_from: Some(now),
        visible_from: Some(now + early_access_window),
        created_at: now,
        updated_at: now,
        version: Version::INITIAL,
    };
    let event = LedgerEvent::ListingCreated {
        listing_id: id,
        store_id: store.id,
        quantity: input.quantity,
    };
    Ok((listing, event))
}

/// Reserve units for a buyer.
///
/// # Errors
///
/// `NotReservable`, `Expired`, `InvalidQuantity`, `InsufficientStock` or
/// `InvalidTimeWindow`, checked in that order.
pub fn reserve(
    snapshot: &ListingSnapshot,
    reservation_id: ReservationId,
    request: ReserveRequest,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_open(listing, now)?;
    validate_take(listing, request.quantity, request.max_quantity)?;
    validate_pickup_time(request.preferred_pickup_time, listing.pickup_deadline, now)?;

    let (mut next, expected_version) = bump(listing, now);
    next.quantity -= request.quantity;

    let reservation = Reservation {
        id: reservation_id,
        listing_id: listing.id,
        store_id: listing.store_id(),
        buyer_id: request.buyer_id,
        quantity: request.quantity,
        status: ReservationStatus::Reserved,
        preferred_pickup_time: request.preferred_pickup_time,
        created_at: now,
        completed_at: None,
        canceled_at: None,
    };
    let event = LedgerEvent::Reserved {
        reservation_id,
        listing_id: listing.id,
        store_id: listing.store_id(),
        buyer_id: request.buyer_id,
        quantity: request.quantity,
        remaining: next.quantity,
    };

    Ok(Mutation {
        listing: next,
        expected_version,
        reservation: Some(ReservationWrite::Insert(reservation)),
        event,
    })
}

/// Cancel a buyer's reservation and return its units to stock.
///
/// A listing that ran out of stock becomes reservable again.
///
/// # Errors
///
/// - `NotOwner`: the reservation belongs to another buyer
/// - `AlreadyFinal`: already completed or canceled
pub fn cancel(
    snapshot: &ListingSnapshot,
    reservation: &Reservation,
    buyer_id: BuyerId,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    if reservation.buyer_id != buyer_id {
        return Err(LedgerError::NotOwner("reservation"));
    }
    if reservation.status.is_final() {
        return Err(LedgerError::AlreadyFinal(reservation.status));
    }

    let (mut next, expected_version) = bump(&snapshot.listing, now);
    next.quantity = next.quantity.saturating_add(reservation.quantity);

    let mut canceled = reservation.clone();
    canceled.status = ReservationStatus::Canceled;
    canceled.canceled_at = Some(now);

    let event = LedgerEvent::ReservationCanceled {
        reservation_id: reservation.id,
        listing_id: next.id,
        store_id: next.store_id(),
        buyer_id,
        quantity: reservation.quantity,
        remaining: next.quantity,
    };

    Ok(Mutation {
        listing: next,
        expected_version,
        reservation: Some(ReservationWrite::Update {
            reservation: canceled,
            expected_status: ReservationStatus::Reserved,
        }),
        event,
    })
}

/// Confirm pickup. Stock is unchanged; the units left it on reserve.
///
/// `store_id` is `None` for the overdue sweep, which acts on behalf of the system.
///
/// # Errors
///
/// - `NotOwner`: the store does not own the reserved listing
/// - `AlreadyFinal`: already completed or canceled
pub fn complete(
    snapshot: &ListingSnapshot,
    reservation: &Reservation,
    store_id: Option<StoreId>,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    if let Some(store_id) = store_id {
        validate_owner(&snapshot.listing, store_id)?;
    }
    if reservation.status.is_final() {
        return Err(LedgerError::AlreadyFinal(reservation.status));
    }

    let (next, expected_version) = bump(&snapshot.listing, now);

    let mut completed = reservation.clone();
    completed.status = ReservationStatus::Completed;
    completed.completed_at = Some(now);

    let event = LedgerEvent::PickupCompleted {
        reservation_id: reservation.id,
        listing_id: next.id,
        buyer_id: reservation.buyer_id,
        automatic: store_id.is_none(),
    };

    Ok(Mutation {
        listing: next,
        expected_version,
        reservation: Some(ReservationWrite::Update {
            reservation: completed,
            expected_status: ReservationStatus::Reserved,
        }),
        event,
    })
}

/// Record an in-person sale. No reservation row is written.
///
/// # Errors
///
/// `NotOwner`, `NotReservable`, `Expired`, `InvalidQuantity` or `InsufficientStock`.
pub fn sell_direct(
    snapshot: &ListingSnapshot,
    store_id: StoreId,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_owner(listing, store_id)?;
    validate_open(listing, now)?;
    validate_take(listing, quantity, u32::MAX)?;

    let (mut next, expected_version) = bump(listing, now);
    next.quantity -= quantity;
    next.sold_direct += quantity;

    let event = LedgerEvent::SoldDirect {
        listing_id: next.id,
        store_id,
        quantity,
        remaining: next.quantity,
    };

    Ok(Mutation {
        listing: next,
        expected_version,
        reservation: None,
        event,
    })
}

/// Close out a listing. Terminal.
///
/// # Errors
///
/// - `NotOwner`: another store's listing
/// - `NotReservable`: already sold
/// - `PendingPickup`: reservations still await pickup
pub fn mark_sold(
    snapshot: &ListingSnapshot,
    store_id: StoreId,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_owner(listing, store_id)?;
    if listing.status == ListingStatus::Sold {
        return Err(LedgerError::NotReservable);
    }
    if !snapshot.open_reservations.is_empty() {
        return Err(LedgerError::PendingPickup {
            open_reservations: snapshot.open_reservations.len(),
        });
    }

    let (mut next, expected_version) = bump(listing, now);
    next.status = ListingStatus::Sold;

    Ok(Mutation {
        event: LedgerEvent::MarkedSold {
            listing_id: next.id,
            store_id,
        },
        listing: next,
        expected_version,
        reservation: None,
    })
}

/// Raise the available quantity to `new_quantity`.
///
/// Decreases are rejected; units leave stock only through reservations and
/// in-person sales.
///
/// # Errors
///
/// `NotOwner`, `NotReservable`, `Expired` or `InvalidQuantity`.
pub fn restock(
    snapshot: &ListingSnapshot,
    store_id: StoreId,
    new_quantity: u32,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_owner(listing, store_id)?;
    validate_open(listing, now)?;
    if new_quantity < listing.quantity {
        return Err(LedgerError::InvalidQuantity(format!(
            "quantity can only increase (current: {}, requested: {new_quantity}); \
             record in-store sales instead",
            listing.quantity
        )));
    }

    let added = new_quantity - listing.quantity;
    let (mut next, expected_version) = bump(listing, now);
    next.quantity = new_quantity;
    next.stocked_quantity = listing
        .stocked_quantity
        .checked_add(added)
        .ok_or_else(|| LedgerError::InvalidQuantity("stock total overflow".to_string()))?;

    Ok(Mutation {
        event: LedgerEvent::Restocked {
            listing_id: next.id,
            added,
            quantity: new_quantity,
        },
        listing: next,
        expected_version,
        reservation: None,
    })
}

/// Ensures a new deadline still honours every pending pickup commitment.
///
/// # Errors
///
/// `InvalidTimeWindow` when a `RESERVED` reservation prefers a later pickup time.
pub fn guard_deadline_edit(
    snapshot: &ListingSnapshot,
    new_deadline: DateTime<Utc>,
) -> Result<(), LedgerError> {
    match snapshot.latest_preferred_pickup() {
        Some(latest) if new_deadline < latest => Err(LedgerError::InvalidTimeWindow(format!(
            "pickup deadline {new_deadline} is earlier than a reserved pickup at {latest}"
        ))),
        _ => Ok(()),
    }
}

/// Move the pickup deadline.
///
/// A deadline that has already passed is final; the listing cannot be reopened.
///
/// # Errors
///
/// - `NotOwner`: another store's listing
/// - `NotReservable`: already sold
/// - `Expired`: the current deadline has passed
/// - `InvalidTimeWindow`: deadline not in the future, or earlier than a reserved pickup
pub fn move_deadline(
    snapshot: &ListingSnapshot,
    store_id: StoreId,
    new_deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_owner(listing, store_id)?;
    validate_open(listing, now)?;
    if new_deadline <= now {
        return Err(LedgerError::InvalidTimeWindow(
            "pickup deadline must be in the future".to_string(),
        ));
    }
    guard_deadline_edit(snapshot, new_deadline)?;

    let (mut next, expected_version) = bump(listing, now);
    next.pickup_deadline = new_deadline;

    Ok(Mutation {
        event: LedgerEvent::DeadlineMoved {
            listing_id: next.id,
            previous: listing.pickup_deadline,
            deadline: new_deadline,
        },
        listing: next,
        expected_version,
        reservation: None,
    })
}

/// Change a listing's name, category, ready-to-eat flag or prices.
///
/// Prices are validated after merging, so editing only one of them still has to
/// keep the discount strictly below the original.
///
/// # Errors
///
/// - `NotOwner`: another store's listing
/// - `NotReservable`: already sold
/// - `Expired`: past the pickup deadline
/// - `InvalidPrice`: merged discount not below the merged original price
pub fn edit_listing(
    snapshot: &ListingSnapshot,
    store_id: StoreId,
    edit: ListingEdit,
    now: DateTime<Utc>,
) -> Result<Mutation, LedgerError> {
    let listing = &snapshot.listing;
    validate_owner(listing, store_id)?;
    validate_open(listing, now)?;

    let original_price = edit.original_price.unwrap_or(listing.original_price);
    let discount_price = edit.discount_price.unwrap_or(listing.discount_price);
    if discount_price >= original_price {
        return Err(LedgerError::InvalidPrice {
            original: original_price.amount(),
            discount: discount_price.amount(),
        });
    }

    let (mut next, expected_version) = bump(listing, now);
    if let Some(name) = edit.name {
        next.name = name.trim().to_string();
    }
    if let Some(category) = edit.category {
        next.category = Some(category);
    }
    if let Some(is_instant) = edit.is_instant {
        next.is_instant = is_instant;
    }
    next.original_price = original_price;
    next.discount_price = discount_price;

    Ok(Mutation {
        event: LedgerEvent::ListingEdited {
            listing_id: next.id,
            store_id,
        },
        listing: next,
        expected_version,
        reservation: None,
    })
}

/// Bucket totals for one listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    /// Units ever put on sale
    pub stocked: u64,
    /// Units available
    pub available: u64,
    /// Units held by `RESERVED` reservations
    pub reserved: u64,
    /// Units picked up
    pub completed: u64,
    /// Units sold in person
    pub sold_direct: u64,
}

impl StockAudit {
    /// Tallies `reservations` (all statuses) against `listing`.
    #[must_use]
    pub fn of(listing: &Listing, reservations: &[Reservation]) -> Self {
        let mut reserved = 0_u64;
        let mut completed = 0_u64;
        for reservation in reservations.iter().filter(|r| r.listing_id == listing.id) {
            match reservation.status {
                ReservationStatus::Reserved => reserved += u64::from(reservation.quantity),
                ReservationStatus::Completed => completed += u64::from(reservation.quantity),
                ReservationStatus::Canceled => {}
            }
        }
        Self {
            stocked: u64::from(listing.stocked_quantity),
            available: u64::from(listing.quantity),
            reserved,
            completed,
            sold_direct: u64::from(listing.sold_direct),
        }
    }

    /// True when no unit was created or lost.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.available + self.reserved + self.completed + self.sold_direct == self.stocked
    }
}
