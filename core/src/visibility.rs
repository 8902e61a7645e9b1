//! Which listings a buyer may see right now.
//!
//! A listing is shown to a buyer when all of the following hold:
//!
//! 1. It is open: stored status `AVAILABLE`, units left, deadline in the future.
//! 2. It is released for the buyer's tier. Buyers at or above the early-access
//!    tier see it from `early_access_from`, everyone else from `visible_from`. A
//!    missing gate never blocks.
//! 3. When the buyer shared a location, the store lies within the search radius
//!    (inclusive). A store that was never geocoded cannot be placed in range.

use crate::geo::GeoPoint;
use crate::types::{BuyerTier, Listing, ListingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a listing is hidden from a buyer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenReason {
    /// Closed out by the seller
    Closed,
    /// No units left
    OutOfStock,
    /// Pickup deadline reached
    Expired,
    /// Release gate for the buyer's tier still in the future
    NotYetReleased,
    /// Store farther than the search radius
    OutOfRange,
    /// Buyer location known but the store has none
    StoreNotGeocoded,
}

/// Outcome of a visibility check.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Visibility {
    /// The buyer may see the listing.
    Visible {
        /// Distance to the store, when the buyer shared a location
        distance_km: Option<f64>,
        /// General buyers cannot see it yet
        early_access: bool,
    },
    /// The buyer may not see the listing.
    Hidden(HiddenReason),
}

impl Visibility {
    /// True for [`Visibility::Visible`].
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }
}

/// Tier threshold for the early-access window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    /// Lowest tier that gets early access
    pub early_access_tier: BuyerTier,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            early_access_tier: BuyerTier::new(2),
        }
    }
}

impl VisibilityPolicy {
    /// Creates a policy granting early access from `early_access_tier` upward.
    #[must_use]
    pub const fn new(early_access_tier: BuyerTier) -> Self {
        Self { early_access_tier }
    }

    /// Whether `tier` is entitled to early access.
    #[must_use]
    pub fn has_early_access(&self, tier: BuyerTier) -> bool {
        tier >= self.early_access_tier
    }

    /// Moment from which a buyer of `tier` may see `listing`, if gated at all.
    #[must_use]
    pub fn release_time(&self, listing: &Listing, tier: BuyerTier) -> Option<DateTime<Utc>> {
        if self.has_early_access(tier) {
            listing.early_access_from
        } else {
            listing.visible_from
        }
    }

    /// Full visibility check with the reason a listing is hidden.
    #[must_use]
    pub fn check(
        &self,
        listing: &Listing,
        buyer_location: Option<GeoPoint>,
        radius_km: f64,
        tier: BuyerTier,
        now: DateTime<Utc>,
    ) -> Visibility {
        if listing.status != ListingStatus::Available {
            return Visibility::Hidden(HiddenReason::Closed);
        }
        if listing.quantity == 0 {
            return Visibility::Hidden(HiddenReason::OutOfStock);
        }
        if listing.is_expired(now) {
            return Visibility::Hidden(HiddenReason::Expired);
        }
        if self
            .release_time(listing, tier)
            .is_some_and(|release| now < release)
        {
            return Visibility::Hidden(HiddenReason::NotYetReleased);
        }

        let distance_km = match buyer_location {
            None => None,
            Some(buyer) => {
                let Some(store) = listing.store.location else {
                    return Visibility::Hidden(HiddenReason::StoreNotGeocoded);
                };
                let distance = buyer.distance_km(&store);
                if distance > radius_km {
                    return Visibility::Hidden(HiddenReason::OutOfRange);
                }
                Some(distance)
            }
        };

        Visibility::Visible {
            distance_km,
            early_access: listing.is_early_access(now),
        }
    }

    /// Boolean form of [`check`](Self::check).
    #[must_use]
    pub fn is_visible(
        &self,
        listing: &Listing,
        buyer_location: Option<GeoPoint>,
        radius_km: f64,
        tier: BuyerTier,
        now: DateTime<Utc>,
    ) -> bool {
        self.check(listing, buyer_location, radius_km, tier, now)
            .is_visible()
    }
}
