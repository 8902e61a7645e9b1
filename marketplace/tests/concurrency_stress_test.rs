//! Concurrency stress tests for last-unit scenarios.
//!
//! Many buyers race for the same stock through the optimistic-concurrency
//! commit path. No interleaving may oversell.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, buyer};
use futures::future::join_all;
use surplus_core::error::LedgerError;
use surplus_marketplace::ReserveInput;
use surplus_testing::fixtures::{CITY_HALL, new_listing};
use surplus_testing::helpers::assert_conserved;

const ONE: ReserveInput = ReserveInput {
    quantity: 1,
    preferred_pickup_time: None,
};

/// 100 concurrent reservations for 1 unit: exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_100_requests() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(1)).await.unwrap();

    let attempts = (0..100).map(|_| {
        let coordinator = h.coordinator().clone();
        let listing_id = listing.id;
        tokio::spawn(async move { coordinator.reserve(&buyer(), listing_id, ONE).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(Result::unwrap).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { remaining: 0, .. })))
        .count();
    println!(
        "successes={successes} sold_out={sold_out} conflicts={}",
        h.store.conflict_count()
    );

    assert_eq!(successes, 1, "exactly one buyer gets the last unit");
    assert_eq!(sold_out, 99, "every other buyer sees it sold out");

    let stored = h.store.listing(listing.id).unwrap();
    assert_eq!(stored.quantity, 0);
    assert_eq!(h.store.reservations_of(listing.id).len(), 1);
    assert_conserved(&stored, &h.store.reservations_of(listing.id));
}

/// Two buyers, one unit: the classic pair.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_buyers_one_unit() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(1)).await.unwrap();

    let (buyer_a, buyer_b) = (buyer(), buyer());
    let (first, second) = tokio::join!(
        h.coordinator().reserve(&buyer_a, listing.id, ONE),
        h.coordinator().reserve(&buyer_b, listing.id, ONE),
    );

    assert!(first.is_ok() != second.is_ok(), "exactly one reservation succeeds");
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(LedgerError::InsufficientStock { .. })));
}

/// Reservations and walk-in sales share one counter.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_reserve_and_walk_in_never_oversell() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(10)).await.unwrap();

    let reservations = (0..20).map(|_| {
        let coordinator = h.coordinator().clone();
        let listing_id = listing.id;
        tokio::spawn(async move { coordinator.reserve(&buyer(), listing_id, ONE).await.is_ok() })
    });
    let walk_ins = (0..20).map(|_| {
        let coordinator = h.coordinator().clone();
        let listing_id = listing.id;
        let seller = seller;
        tokio::spawn(async move { coordinator.sell_direct(&seller, listing_id, 1).await.is_ok() })
    });

    let reserved = join_all(reservations)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    let sold = join_all(walk_ins).await.into_iter().filter(|r| *r.as_ref().unwrap()).count();

    let stored = h.store.listing(listing.id).unwrap();
    assert!(reserved + sold <= 10);
    assert_eq!(stored.quantity as usize, 10 - reserved - sold);
    assert_eq!(stored.sold_direct as usize, sold);
    assert_conserved(&stored, &h.store.reservations_of(listing.id));
}

/// A single forced conflict is absorbed by the retry.
#[tokio::test]
async fn test_one_conflict_is_retried() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();

    h.store.fail_next_commits(1);
    let reservation = h.coordinator().reserve(&buyer(), listing.id, ONE).await.unwrap();

    assert_eq!(h.store.conflict_count(), 1);
    assert_eq!(h.store.reservations_of(listing.id), vec![reservation]);
}

/// Two forced conflicts exhaust the retry; nothing is written.
#[tokio::test]
async fn test_second_conflict_surfaces_remaining_stock() {
    let h = Harness::new();
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let listing = h.coordinator().create_listing(&seller, new_listing(2)).await.unwrap();

    h.store.fail_next_commits(2);
    let result = h.coordinator().reserve(&buyer(), listing.id, ONE).await;

    assert!(matches!(
        result,
        Err(LedgerError::InsufficientStock {
            requested: 1,
            remaining: 2
        })
    ));
    assert!(h.store.reservations_of(listing.id).is_empty());
}
