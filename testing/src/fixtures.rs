//! Builders for listings used across the test suites.

use crate::mocks::test_clock;
use chrono::{DateTime, Duration, Utc};
use surplus_core::environment::Clock;
use surplus_core::geo::GeoPoint;
use surplus_core::types::{
    Listing, ListingId, ListingStatus, Money, NewListing, StoreId, StoreRef,
};
use surplus_core::version::Version;

/// Seoul City Hall, the default store location in fixtures.
pub const CITY_HALL: GeoPoint = GeoPoint::new(37.5665, 126.9780);

/// Fluent builder for a [`Listing`] already stored at version 0.
///
/// Defaults: five units at 10 000 / 6 000, deadline two hours after
/// [`test_clock`], store at [`CITY_HALL`], no release gates.
///
/// # Example
///
/// ```
/// use surplus_testing::fixtures::ListingBuilder;
///
/// let listing = ListingBuilder::new().quantity(1).instant(true).build();
/// assert_eq!(listing.quantity, 1);
/// assert_eq!(listing.stocked_quantity, 1);
/// ```
#[derive(Clone, Debug)]
pub struct ListingBuilder {
    listing: Listing,
}

impl Default for ListingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingBuilder {
    /// Start from the defaults.
    #[must_use]
    pub fn new() -> Self {
        let now = test_clock().now();
        Self {
            listing: Listing {
                id: ListingId::new(),
                store: StoreRef {
                    id: StoreId::new(),
                    location: Some(CITY_HALL),
                },
                name: "Day-old sourdough".to_string(),
                category: Some("bakery".to_string()),
                is_instant: false,
                original_price: Money::new(10_000),
                discount_price: Money::new(6_000),
                quantity: 5,
                stocked_quantity: 5,
                sold_direct: 0,
                status: ListingStatus::Available,
                pickup_deadline: now + Duration::hours(2),
                early_access_from: None,
                visible_from: None,
                created_at: now,
                updated_at: now,
                version: Version::INITIAL,
            },
        }
    }

    /// Owned by `store_id`.
    #[must_use]
    pub const fn store(mut self, store_id: StoreId) -> Self {
        self.listing.store.id = store_id;
        self
    }

    /// Store located at `location`, or not geocoded.
    #[must_use]
    pub const fn located(mut self, location: Option<GeoPoint>) -> Self {
        self.listing.store.location = location;
        self
    }

    /// Available (and initially stocked) units.
    #[must_use]
    pub const fn quantity(mut self, quantity: u32) -> Self {
        self.listing.quantity = quantity;
        self.listing.stocked_quantity = quantity;
        self
    }

    /// Original and discount price.
    #[must_use]
    pub const fn prices(mut self, original: u64, discount: u64) -> Self {
        self.listing.original_price = Money::new(original);
        self.listing.discount_price = Money::new(discount);
        self
    }

    /// Pickup deadline.
    #[must_use]
    pub const fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.listing.pickup_deadline = deadline;
        self
    }

    /// Release gates for elevated-tier and general buyers.
    #[must_use]
    pub const fn released(
        mut self,
        early_access_from: DateTime<Utc>,
        visible_from: DateTime<Utc>,
    ) -> Self {
        self.listing.early_access_from = Some(early_access_from);
        self.listing.visible_from = Some(visible_from);
        self
    }

    /// Ready-to-eat flag.
    #[must_use]
    pub const fn instant(mut self, is_instant: bool) -> Self {
        self.listing.is_instant = is_instant;
        self
    }

    /// Category label.
    #[must_use]
    pub fn category(mut self, category: &str) -> Self {
        self.listing.category = Some(category.to_string());
        self
    }

    /// Display name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.listing.name = name.to_string();
        self
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.listing.created_at = created_at;
        self.listing.updated_at = created_at;
        self
    }

    /// Stored status.
    #[must_use]
    pub const fn status(mut self, status: ListingStatus) -> Self {
        self.listing.status = status;
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Listing {
        self.listing
    }
}

/// Seller input matching the builder defaults.
#[must_use]
pub fn new_listing(quantity: u32) -> NewListing {
    NewListing {
        name: "Day-old sourdough".to_string(),
        category: Some("bakery".to_string()),
        is_instant: false,
        original_price: Money::new(10_000),
        discount_price: Money::new(6_000),
        quantity,
        pickup_deadline: test_clock().now() + Duration::hours(2),
    }
}

/// A point roughly `km` kilometers north of `origin`.
#[must_use]
pub fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
    let degrees = km / (surplus_core::geo::EARTH_RADIUS_KM * std::f64::consts::PI / 180.0);
    GeoPoint::new(origin.latitude + degrees, origin.longitude)
}
