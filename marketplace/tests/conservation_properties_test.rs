//! Random operation sequences never create or lose units.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use std::sync::Arc;
use surplus_core::error::LedgerError;
use surplus_core::ledger::StockAudit;
use surplus_core::store::InventoryStore;
use surplus_core::types::{Reservation, UserId};
use surplus_marketplace::InventoryLedger;
use surplus_testing::fixtures::ListingBuilder;
use surplus_testing::properties::{LedgerOp, ledger_ops};
use surplus_testing::{InMemoryInventoryStore, test_clock};

fn sorted(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by_key(|r| r.id);
    reservations
}

async fn run(ops: Vec<LedgerOp>) -> Result<(), TestCaseError> {
    let store = InMemoryInventoryStore::new();
    let ledger = InventoryLedger::new(Arc::new(store.clone()), Arc::new(test_clock()), 99);
    let listing = ListingBuilder::new().quantity(5).build();
    let store_id = listing.store_id();
    store.insert_listing(listing.clone()).await.unwrap();
    let buyers: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();

    for op in ops {
        let reservations = sorted(store.reservations_of(listing.id));
        let open: Vec<&Reservation> = reservations.iter().filter(|r| r.is_open()).collect();

        match op {
            LedgerOp::Reserve { buyer, quantity } => {
                let _ = ledger.reserve(listing.id, buyers[buyer], quantity, None).await;
            }
            LedgerOp::Cancel { nth } => {
                if !open.is_empty() {
                    let target = open[nth % open.len()];
                    prop_assert!(ledger.cancel(target.id, target.buyer_id).await.is_ok());
                }
            }
            LedgerOp::Complete { nth } => {
                if !reservations.is_empty() {
                    let target = &reservations[nth % reservations.len()];
                    let before = store.listing(listing.id).unwrap();
                    let result = ledger.complete(target.id, Some(store_id)).await;
                    if target.is_open() {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(LedgerError::AlreadyFinal(_))));
                        prop_assert_eq!(store.listing(listing.id).unwrap(), before);
                    }
                }
            }
            LedgerOp::SellDirect { quantity } => {
                let _ = ledger.sell_direct(listing.id, store_id, quantity).await;
            }
            LedgerOp::Restock { added } => {
                let current = store.listing(listing.id).unwrap().quantity;
                prop_assert!(ledger.restock(listing.id, store_id, current + added).await.is_ok());
            }
        }

        let current = store.listing(listing.id).unwrap();
        let audit = StockAudit::of(&current, &store.reservations_of(listing.id));
        prop_assert!(audit.is_balanced(), "unbalanced: {:?}", audit);
        prop_assert!(current.quantity <= current.stocked_quantity);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stock_is_conserved(ops in ledger_ops(3, 40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops))?;
    }
}
