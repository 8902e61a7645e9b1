//! Domain types for the surplus-food marketplace.
//!
//! This module contains the identifiers, value objects and entities shared by the
//! ledger, the visibility rules and the stores: listings (a seller's batch of a
//! perishable item) and reservations (a buyer's pickup commitment against a listing).

use crate::geo::GeoPoint;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a listing
    ListingId
);
uuid_identifier!(
    /// Unique identifier for a store (the seller-side owner of listings)
    StoreId
);
uuid_identifier!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_identifier!(
    /// Stable identity of an authenticated user (buyer, seller or admin)
    UserId
);

/// Buyers are plain users; the alias documents intent in signatures.
pub type BuyerId = UserId;

// ============================================================================
// Value Objects
// ============================================================================

/// Price in the smallest currency unit (e.g. won), never fractional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Percentage saved relative to `original`, rounded down.
    ///
    /// Returns 0 when `original` is zero or not above `self`.
    #[must_use]
    pub const fn discount_percent_from(self, original: Self) -> u32 {
        if original.0 == 0 || self.0 >= original.0 {
            return 0;
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by 100
        {
            ((original.0 - self.0) * 100 / original.0) as u32
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Buyer grade used for early access. Higher is better; 0 is the lowest tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuyerTier(u8);

impl BuyerTier {
    /// Tier assumed when a buyer has no profile.
    pub const LOWEST: Self = Self(0);

    /// Creates a tier from its level.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// The numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }
}

/// Role of the caller as asserted by the upstream auth context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// Browses and reserves listings
    Buyer,
    /// Operates the given store
    Seller {
        /// Store operated by this seller
        store_id: StoreId,
    },
    /// Back-office operator
    Admin,
}

/// Identity of whoever is calling into the marketplace.
///
/// Trusted as given; ownership of listings and reservations is still re-checked
/// by every mutating operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Stable user identity
    pub user_id: UserId,
    /// Role claimed for this request
    #[serde(flatten)]
    pub role: Role,
}

impl Caller {
    /// A buyer caller.
    #[must_use]
    pub const fn buyer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Buyer,
        }
    }

    /// A seller caller operating `store_id`.
    #[must_use]
    pub const fn seller(user_id: UserId, store_id: StoreId) -> Self {
        Self {
            user_id,
            role: Role::Seller { store_id },
        }
    }

    /// Store operated by the caller, if the caller is a seller.
    #[must_use]
    pub const fn store_id(&self) -> Option<StoreId> {
        match self.role {
            Role::Seller { store_id } => Some(store_id),
            Role::Buyer | Role::Admin => None,
        }
    }
}

// ============================================================================
// Listing
// ============================================================================

/// Store reference carried by a listing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreRef {
    /// Owning store
    pub id: StoreId,
    /// Geocoded store location, absent until the store is geocoded
    pub location: Option<GeoPoint>,
}

/// Stored lifecycle status of a listing.
///
/// Only the seller's explicit close-out is stored. Running out of stock, pending
/// pickups and passing the deadline are derived from the quantities and the
/// clock, see [`ListingPhase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    /// Open for reservations and walk-in sales
    Available,
    /// Closed out by the seller; terminal
    Sold,
}

impl ListingStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Sold => "SOLD",
        }
    }

    /// Parse status from its database string.
    ///
    /// # Errors
    ///
    /// Returns the unrecognised input.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "SOLD" => Ok(Self::Sold),
            other => Err(format!("Invalid listing status: {other}")),
        }
    }
}

/// Buyer-facing lifecycle label, computed at read time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingPhase {
    /// Reservable right now
    Available,
    /// No units left; becomes available again if a reservation is canceled
    SoldOut,
    /// Pickup deadline passed
    Expired,
    /// Closed out by the seller
    Sold,
}

/// A seller's sellable batch of a perishable item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identity
    pub id: ListingId,
    /// Owning store and its location
    pub store: StoreRef,
    /// Display name
    pub name: String,
    /// Free-form category (bread, side dish, ...)
    pub category: Option<String>,
    /// Ready to eat without preparation
    pub is_instant: bool,
    /// Regular price
    pub original_price: Money,
    /// Discounted price; strictly below `original_price`
    pub discount_price: Money,
    /// Units still available for new reservations
    pub quantity: u32,
    /// Units ever put on sale: creation quantity plus restocks
    pub stocked_quantity: u32,
    /// Units sold in person through walk-in sales
    pub sold_direct: u32,
    /// Stored lifecycle status
    pub status: ListingStatus,
    /// Hard cutoff after which the listing can neither be reserved nor sold
    pub pickup_deadline: DateTime<Utc>,
    /// When elevated-tier buyers may start seeing the listing
    pub early_access_from: Option<DateTime<Utc>>,
    /// When every buyer may see the listing
    pub visible_from: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: Version,
}

impl Listing {
    /// Owning store id.
    #[must_use]
    pub const fn store_id(&self) -> StoreId {
        self.store.id
    }

    /// True once the pickup deadline is not in the future.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.pickup_deadline <= now
    }

    /// True while only early-access buyers can see the listing.
    #[must_use]
    pub fn is_early_access(&self, now: DateTime<Utc>) -> bool {
        self.visible_from.is_some_and(|visible_from| visible_from > now)
    }

    /// Buyer-facing phase at `now`.
    ///
    /// Seller close-out wins over everything, then the deadline, then stock.
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> ListingPhase {
        if self.status == ListingStatus::Sold {
            ListingPhase::Sold
        } else if self.is_expired(now) {
            ListingPhase::Expired
        } else if self.quantity == 0 {
            ListingPhase::SoldOut
        } else {
            ListingPhase::Available
        }
    }
}

/// Seller input for a new listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    /// Display name
    pub name: String,
    /// Free-form category
    pub category: Option<String>,
    /// Ready to eat without preparation
    pub is_instant: bool,
    /// Regular price
    pub original_price: Money,
    /// Discounted price
    pub discount_price: Money,
    /// Units put on sale
    pub quantity: u32,
    /// Pickup cutoff
    pub pickup_deadline: DateTime<Utc>,
}

/// Seller edit of a listing's descriptive fields. `None` keeps the current value.
///
/// Stock and the pickup deadline have their own operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEdit {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New category
    #[serde(default)]
    pub category: Option<String>,
    /// New ready-to-eat flag
    #[serde(default)]
    pub is_instant: Option<bool>,
    /// New regular price
    #[serde(default)]
    pub original_price: Option<Money>,
    /// New discounted price
    #[serde(default)]
    pub discount_price: Option<Money>,
}

impl ListingEdit {
    /// Whether the edit changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.is_instant.is_none()
            && self.original_price.is_none()
            && self.discount_price.is_none()
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Lifecycle of a reservation, independent from the listing status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Units are committed, pickup pending
    Reserved,
    /// Picked up; terminal
    Completed,
    /// Canceled by the buyer; terminal
    Canceled,
}

impl ReservationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse status from its database string.
    ///
    /// # Errors
    ///
    /// Returns the unrecognised input.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "RESERVED" => Ok(Self::Reserved),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(format!("Invalid reservation status: {other}")),
        }
    }

    /// Completed and canceled reservations never change again.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buyer's commitment to pick up some units of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identity
    pub id: ReservationId,
    /// Reserved listing
    pub listing_id: ListingId,
    /// Store owning the listing, denormalised for seller queries
    pub store_id: StoreId,
    /// Buyer who made the commitment
    pub buyer_id: BuyerId,
    /// Committed units
    pub quantity: u32,
    /// Current status
    pub status: ReservationStatus,
    /// Pickup time chosen by the buyer, within `[reserved_at, deadline]`
    pub preferred_pickup_time: Option<DateTime<Utc>>,
    /// When the reservation was made
    pub created_at: DateTime<Utc>,
    /// When pickup was confirmed
    pub completed_at: Option<DateTime<Utc>>,
    /// When the buyer canceled
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// True while units are still committed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ReservationStatus::Reserved
    }
}
