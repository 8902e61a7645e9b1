//! Error types for inventory operations.
//!
//! Two layers:
//!
//! - [`StoreError`]: what a backing store can report (version conflicts, I/O).
//! - [`LedgerError`]: the typed outcomes returned to callers of the ledger. Every
//!   validation and stock conflict is an expected variant; only [`LedgerError::Store`]
//!   represents an unexpected failure.

use crate::types::{ListingId, ReservationId, StoreId};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur in an [`InventoryStore`](crate::store::InventoryStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The listing moved past the version the mutation was decided against.
    ///
    /// Another writer committed between our read and our write. The caller should
    /// re-read and re-validate.
    #[error(
        "Concurrency conflict on listing {listing_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// Listing whose version moved.
        listing_id: ListingId,
        /// Version the mutation expected.
        expected: Version,
        /// Version actually stored.
        actual: Version,
    },

    /// A row the mutation depends on disappeared.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Row could not be mapped into a domain type.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Stable, serializable classification of a [`LedgerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Listing or reservation does not exist
    NotFound,
    /// Caller does not own the store or reservation
    NotOwner,
    /// Pickup deadline has passed
    Expired,
    /// Not enough units remain
    InsufficientStock,
    /// Listing is closed out
    NotReservable,
    /// Reservation is already completed or canceled
    AlreadyFinal,
    /// Quantity is zero, too large, or a decrease where only increases are allowed
    InvalidQuantity,
    /// A time falls outside its allowed window
    InvalidTimeWindow,
    /// Discount price not below the original price
    InvalidPrice,
    /// Close-out attempted while pickups are pending
    PendingPickup,
    /// Concurrent writers kept winning
    Conflict,
    /// Backing store failure
    Internal,
}

impl ErrorKind {
    /// Machine-readable code, e.g. `INSUFFICIENT_STOCK`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::NotOwner => "NOT_OWNER",
            Self::Expired => "EXPIRED",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::NotReservable => "NOT_RESERVABLE",
            Self::AlreadyFinal => "ALREADY_FINAL",
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidTimeWindow => "INVALID_TIME_WINDOW",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::PendingPickup => "PENDING_PICKUP",
            Self::Conflict => "CONFLICT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Entity a [`LedgerError::NotFound`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Missing {
    /// A listing id
    Listing(ListingId),
    /// A reservation id
    Reservation(ReservationId),
    /// A store id
    Store(StoreId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing(id) => write!(f, "listing {id}"),
            Self::Reservation(id) => write!(f, "reservation {id}"),
            Self::Store(id) => write!(f, "store {id}"),
        }
    }
}

/// Typed outcome of a failed ledger or coordinator operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Listing or reservation does not exist.
    #[error("Not found: {0}")]
    NotFound(Missing),

    /// The caller does not own the store or reservation involved.
    #[error("Caller does not own this {0}")]
    NotOwner(&'static str),

    /// The listing's pickup deadline has passed.
    #[error("Pickup deadline has passed")]
    Expired,

    /// Requested more units than remain.
    #[error("Insufficient stock: requested {requested}, remaining {remaining}")]
    InsufficientStock {
        /// Units the caller asked for
        requested: u32,
        /// Units actually remaining
        remaining: u32,
    },

    /// The listing was closed out by its seller.
    #[error("Listing is already sold")]
    NotReservable,

    /// The reservation is already completed or canceled.
    #[error("Reservation is already {0}")]
    AlreadyFinal(crate::types::ReservationStatus),

    /// Quantity rejected.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A time falls outside its window.
    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// Discount price not strictly below the original price.
    #[error("Discount price {discount} must be below original price {original}")]
    InvalidPrice {
        /// Requested original price
        original: u64,
        /// Requested discount price
        discount: u64,
    },

    /// Close-out attempted while reservations await pickup.
    #[error("Order pending pickup: {open_reservations} reservation(s) still reserved")]
    PendingPickup {
        /// Number of open reservations blocking the close-out
        open_reservations: usize,
    },

    /// Concurrent writers won both attempts.
    #[error("Listing {0} changed concurrently, please retry")]
    Conflict(ListingId),

    /// Unexpected backing-store failure.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl LedgerError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotOwner(_) => ErrorKind::NotOwner,
            Self::Expired => ErrorKind::Expired,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::NotReservable => ErrorKind::NotReservable,
            Self::AlreadyFinal(_) => ErrorKind::AlreadyFinal,
            Self::InvalidQuantity(_) => ErrorKind::InvalidQuantity,
            Self::InvalidTimeWindow(_) => ErrorKind::InvalidTimeWindow,
            Self::InvalidPrice { .. } => ErrorKind::InvalidPrice,
            Self::PendingPickup { .. } => ErrorKind::PendingPickup,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConcurrencyConflict { listing_id, .. } => Self::Conflict(listing_id),
            other => Self::Store(other),
        }
    }
}
