//! End-to-end flows through the reservation coordinator.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{Harness, buyer};
use surplus_core::environment::Clock;
use surplus_core::error::LedgerError;
use surplus_core::types::{ListingEdit, ListingPhase, ListingStatus, Money, ReservationStatus};
use surplus_marketplace::ReserveInput;
use surplus_testing::fixtures::{CITY_HALL, new_listing};
use surplus_testing::helpers::assert_conserved;

fn units(quantity: u32) -> ReserveInput {
    ReserveInput {
        quantity,
        preferred_pickup_time: None,
    }
}

/// Reserve, over-reserve, cancel, sell the rest at the counter.
#[tokio::test]
async fn test_reserve_cancel_sell_direct() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(5)).await.unwrap();
    assert_eq!(listing.original_price.amount(), 10_000);
    assert_eq!(listing.discount_price.amount(), 6_000);
    assert_eq!(listing.pickup_deadline, h.clock.now() + Duration::hours(2));

    let alice = buyer();
    let bob = buyer();

    let reservation = h.coordinator().reserve(&alice, listing.id, units(3)).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Reserved);
    assert_eq!(h.store.listing(listing.id).unwrap().quantity, 2);

    let refused = h.coordinator().reserve(&bob, listing.id, units(3)).await;
    assert!(matches!(
        refused,
        Err(LedgerError::InsufficientStock {
            requested: 3,
            remaining: 2
        })
    ));

    let canceled = h.coordinator().cancel(&alice, reservation.id).await.unwrap();
    assert_eq!(canceled.status, ReservationStatus::Canceled);
    assert_eq!(h.store.listing(listing.id).unwrap().quantity, 5);

    let remaining = h.coordinator().sell_direct(&seller, listing.id, 5).await.unwrap();
    assert_eq!(remaining, 0);

    let late = h.coordinator().reserve(&bob, listing.id, units(1)).await;
    assert!(matches!(
        late,
        Err(LedgerError::InsufficientStock {
            requested: 1,
            remaining: 0
        })
    ));

    let stored = h.store.listing(listing.id).unwrap();
    assert_conserved(&stored, &h.store.reservations_of(listing.id));
}

#[tokio::test]
async fn test_second_cancel_is_already_final() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();
    let alice = buyer();

    let reservation = h.coordinator().reserve(&alice, listing.id, units(1)).await.unwrap();
    h.coordinator().cancel(&alice, reservation.id).await.unwrap();
    let before = h.store.listing(listing.id).unwrap();

    let again = h.coordinator().cancel(&alice, reservation.id).await;
    assert!(matches!(again, Err(LedgerError::AlreadyFinal(ReservationStatus::Canceled))));
    assert_eq!(h.store.listing(listing.id).unwrap(), before);
}

#[tokio::test]
async fn test_cancel_after_completion_is_already_final() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();
    let alice = buyer();

    let reservation = h.coordinator().reserve(&alice, listing.id, units(2)).await.unwrap();
    let completed = h.coordinator().complete_pickup(&seller, reservation.id).await.unwrap();
    assert_eq!(completed.status, ReservationStatus::Completed);
    assert!(completed.completed_at.is_some());

    let result = h.coordinator().cancel(&alice, reservation.id).await;
    assert!(matches!(result, Err(LedgerError::AlreadyFinal(ReservationStatus::Completed))));
    // Completion leaves the stock where reserve put it.
    assert_eq!(h.store.listing(listing.id).unwrap().quantity, 0);
}

#[tokio::test]
async fn test_other_buyer_cannot_cancel() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();

    let reservation = h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();
    let result = h.coordinator().cancel(&buyer(), reservation.id).await;
    assert!(matches!(result, Err(LedgerError::NotOwner("reservation"))));
}

#[tokio::test]
async fn test_other_store_cannot_sell_or_complete() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, rival) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();
    let reservation = h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();

    let sale = h.coordinator().sell_direct(&rival, listing.id, 1).await;
    assert!(matches!(sale, Err(LedgerError::NotOwner("listing"))));
    let pickup = h.coordinator().complete_pickup(&rival, reservation.id).await;
    assert!(matches!(pickup, Err(LedgerError::NotOwner("listing"))));
}

#[tokio::test]
async fn test_mark_sold_waits_for_pickups() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();
    let reservation = h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();

    let pending = h.coordinator().mark_sold(&seller, listing.id).await;
    assert!(matches!(
        pending,
        Err(LedgerError::PendingPickup { open_reservations: 1 })
    ));

    h.coordinator().complete_pickup(&seller, reservation.id).await.unwrap();
    let sold = h.coordinator().mark_sold(&seller, listing.id).await.unwrap();
    assert_eq!(sold.status, ListingStatus::Sold);
    assert_eq!(sold.phase(h.clock.now()), ListingPhase::Sold);

    let twice = h.coordinator().mark_sold(&seller, listing.id).await;
    assert!(matches!(twice, Err(LedgerError::NotReservable)));
    let reserve = h.coordinator().reserve(&buyer(), listing.id, units(1)).await;
    assert!(matches!(reserve, Err(LedgerError::NotReservable)));
}

#[tokio::test]
async fn test_restock_only_increases() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();
    h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();

    let lower = h.coordinator().restock(&seller, listing.id, 1).await;
    assert!(matches!(lower, Err(LedgerError::InvalidQuantity(_))));

    let restocked = h.coordinator().restock(&seller, listing.id, 6).await.unwrap();
    assert_eq!(restocked.quantity, 6);
    assert_eq!(restocked.stocked_quantity, 7);
    assert_conserved(&restocked, &h.store.reservations_of(listing.id));
}

#[tokio::test]
async fn test_edit_listing_keeps_stock_and_checks_prices() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, rival) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();
    h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();

    let edit = ListingEdit {
        name: Some("Sourdough halves".to_string()),
        is_instant: Some(true),
        discount_price: Some(Money::new(5_000)),
        ..ListingEdit::default()
    };
    let edited = h.coordinator().edit_listing(&seller, listing.id, edit).await.unwrap();
    assert_eq!(edited.name, "Sourdough halves");
    assert!(edited.is_instant);
    assert_eq!(edited.discount_price, Money::new(5_000));
    assert_eq!(edited.original_price, listing.original_price);
    assert_eq!(edited.quantity, 2);
    assert_conserved(&edited, &h.store.reservations_of(listing.id));

    let markup = ListingEdit {
        original_price: Some(Money::new(4_000)),
        ..ListingEdit::default()
    };
    let rejected = h.coordinator().edit_listing(&seller, listing.id, markup).await;
    assert!(matches!(
        rejected,
        Err(LedgerError::InvalidPrice {
            original: 4_000,
            discount: 5_000
        })
    ));
    assert_eq!(h.store.listing(listing.id).unwrap(), edited);

    let foreign = h
        .coordinator()
        .edit_listing(&rival, listing.id, ListingEdit::default())
        .await;
    assert!(matches!(foreign, Err(LedgerError::NotOwner(_))));
}

#[tokio::test]
async fn test_reserve_after_deadline_is_expired() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();

    h.clock.advance(Duration::hours(2));
    let result = h.coordinator().reserve(&buyer(), listing.id, units(1)).await;
    assert!(matches!(result, Err(LedgerError::Expired)));
}

#[tokio::test]
async fn test_preferred_pickup_must_fall_before_deadline() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();

    let too_late = ReserveInput {
        quantity: 1,
        preferred_pickup_time: Some(listing.pickup_deadline + Duration::minutes(1)),
    };
    let result = h.coordinator().reserve(&buyer(), listing.id, too_late).await;
    assert!(matches!(result, Err(LedgerError::InvalidTimeWindow(_))));

    let at_deadline = ReserveInput {
        quantity: 1,
        preferred_pickup_time: Some(listing.pickup_deadline),
    };
    assert!(h.coordinator().reserve(&buyer(), listing.id, at_deadline).await.is_ok());
}

#[tokio::test]
async fn test_committed_events_reach_the_notifier() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(3)).await.unwrap();
    h.coordinator().reserve(&buyer(), listing.id, units(1)).await.unwrap();
    h.coordinator().sell_direct(&seller, listing.id, 1).await.unwrap();

    let mut types = h.wait_for_events(3).await;
    types.sort_unstable();
    assert_eq!(
        types,
        vec!["ListingCreated.v1", "ListingReserved.v1", "ListingSoldDirect.v1"]
    );
}

#[tokio::test]
async fn test_rejected_operations_notify_nobody() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(1)).await.unwrap();
    h.wait_for_events(1).await;

    assert!(h.coordinator().reserve(&buyer(), listing.id, units(2)).await.is_err());
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.notifier.event_types(), vec!["ListingCreated.v1"]);
}
