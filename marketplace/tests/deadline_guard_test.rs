//! Pickup-deadline edits against pending reservations.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{Harness, buyer};
use surplus_core::environment::Clock;
use surplus_core::error::LedgerError;
use surplus_marketplace::ReserveInput;
use surplus_testing::fixtures::{CITY_HALL, new_listing};

#[tokio::test]
async fn test_deadline_cannot_move_before_reserved_pickup() {
    let h = Harness::new();
    let t = h.clock.now();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let mut input = new_listing(3);
    input.pickup_deadline = t + Duration::hours(5);
    let listing = h.coordinator().create_listing(&seller, input).await.unwrap();

    let at_three = ReserveInput {
        quantity: 1,
        preferred_pickup_time: Some(t + Duration::hours(3)),
    };
    h.coordinator().reserve(&buyer(), listing.id, at_three).await.unwrap();

    let early = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, t + Duration::hours(1))
        .await;
    assert!(matches!(early, Err(LedgerError::InvalidTimeWindow(_))));
    assert_eq!(
        h.store.listing(listing.id).unwrap().pickup_deadline,
        t + Duration::hours(5)
    );

    let moved = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, t + Duration::hours(4))
        .await
        .unwrap();
    assert_eq!(moved.pickup_deadline, t + Duration::hours(4));
}

#[tokio::test]
async fn test_deadline_may_equal_latest_pickup() {
    let h = Harness::new();
    let t = h.clock.now();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let mut input = new_listing(3);
    input.pickup_deadline = t + Duration::hours(5);
    let listing = h.coordinator().create_listing(&seller, input).await.unwrap();

    let pickup = t + Duration::hours(3);
    h.coordinator()
        .reserve(
            &buyer(),
            listing.id,
            ReserveInput {
                quantity: 1,
                preferred_pickup_time: Some(pickup),
            },
        )
        .await
        .unwrap();

    let moved = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, pickup)
        .await
        .unwrap();
    assert_eq!(moved.pickup_deadline, pickup);
}

#[tokio::test]
async fn test_canceled_reservations_do_not_hold_the_deadline() {
    let h = Harness::new();
    let t = h.clock.now();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let mut input = new_listing(3);
    input.pickup_deadline = t + Duration::hours(5);
    let listing = h.coordinator().create_listing(&seller, input).await.unwrap();

    let alice = buyer();
    let reservation = h
        .coordinator()
        .reserve(
            &alice,
            listing.id,
            ReserveInput {
                quantity: 1,
                preferred_pickup_time: Some(t + Duration::hours(4)),
            },
        )
        .await
        .unwrap();
    h.coordinator().cancel(&alice, reservation.id).await.unwrap();

    let moved = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, t + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(moved.pickup_deadline, t + Duration::hours(1));
}

#[tokio::test]
async fn test_deadline_must_stay_in_the_future() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();

    let past = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, h.clock.now())
        .await;
    assert!(matches!(past, Err(LedgerError::InvalidTimeWindow(_))));
}

#[tokio::test]
async fn test_only_the_owning_store_moves_the_deadline() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, rival) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();

    let result = h
        .coordinator()
        .update_pickup_deadline(&rival, listing.id, h.clock.now() + Duration::hours(3))
        .await;
    assert!(matches!(result, Err(LedgerError::NotOwner(_))));
}

#[tokio::test]
async fn test_expired_listing_stays_expired() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();
    let one = ReserveInput {
        quantity: 1,
        preferred_pickup_time: None,
    };

    // Deadline is +2h.
    h.clock.advance(Duration::hours(3));
    let late = h.coordinator().reserve(&buyer(), listing.id, one).await;
    assert!(matches!(late, Err(LedgerError::Expired)));

    let reopened = h
        .coordinator()
        .update_pickup_deadline(&seller, listing.id, h.clock.now() + Duration::hours(1))
        .await;
    assert!(matches!(reopened, Err(LedgerError::Expired)));
    assert_eq!(h.store.listing(listing.id).unwrap(), listing);

    let still_late = h.coordinator().reserve(&buyer(), listing.id, one).await;
    assert!(matches!(still_late, Err(LedgerError::Expired)));
}
