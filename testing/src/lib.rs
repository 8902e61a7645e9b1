//! # Surplus Testing
//!
//! Testing utilities for the surplus marketplace.
//!
//! This crate provides:
//! - Mock implementations of the environment traits (clock, collaborators)
//! - An in-memory [`InventoryStore`](surplus_core::store::InventoryStore) with the
//!   same optimistic-concurrency semantics as the Postgres store
//! - Listing fixtures and builders
//! - Property-based testing strategies for ledger operation sequences
//!
//! ## Example
//!
//! ```
//! use surplus_testing::{test_clock, InMemoryInventoryStore};
//! use surplus_testing::fixtures::ListingBuilder;
//! use surplus_core::environment::Clock;
//!
//! let clock = test_clock();
//! let listing = ListingBuilder::new().deadline(clock.now()).build();
//! assert!(listing.is_expired(clock.now()));
//! let _store = InMemoryInventoryStore::new();
//! ```

use chrono::{DateTime, Utc};
use surplus_core::environment::Clock;

pub mod fixtures;
pub mod inventory_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until a test moves it explicitly. Clones share the
    /// same instant, so a clock handed to a service can be advanced from the test.
    ///
    /// # Example
    ///
    /// ```
    /// use surplus_testing::mocks::FixedClock;
    /// use surplus_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - time1, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut guard) = self.time.write() {
                *guard = time;
            }
        }

        /// Move forward by `by`
        pub fn advance(&self, by: Duration) {
            if let Ok(mut guard) = self.time.write() {
                *guard += by;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use surplus_core::ledger::StockAudit;
    use surplus_core::types::Listing;

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Safe to call from every test; only the first call installs anything.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    /// Assert no unit was created or lost on `listing`.
    ///
    /// # Panics
    ///
    /// Panics with the bucket totals when the audit does not balance.
    #[allow(clippy::panic)]
    pub fn assert_conserved(listing: &Listing, reservations: &[surplus_core::types::Reservation]) {
        let audit = StockAudit::of(listing, reservations);
        if !audit.is_balanced() {
            panic!("stock not conserved for listing {}: {audit:?}", listing.id);
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step of a random ledger workload.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum LedgerOp {
        /// Buyer `buyer` reserves `quantity` units
        Reserve {
            /// Index into a fixed pool of buyers
            buyer: usize,
            /// Requested units
            quantity: u32,
        },
        /// Cancel the `nth` reservation made so far (modulo count)
        Cancel {
            /// Index into reservations made so far
            nth: usize,
        },
        /// Seller confirms pickup of the `nth` reservation (modulo count)
        Complete {
            /// Index into reservations made so far
            nth: usize,
        },
        /// Seller records an in-person sale
        SellDirect {
            /// Units sold
            quantity: u32,
        },
        /// Seller raises the quantity by `added`
        Restock {
            /// Units added
            added: u32,
        },
    }

    /// Strategy for a single [`LedgerOp`] over `buyers` buyers.
    pub fn ledger_op(buyers: usize) -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            4 => (0..buyers, 0_u32..5)
                .prop_map(|(buyer, quantity)| LedgerOp::Reserve { buyer, quantity }),
            2 => any::<usize>().prop_map(|nth| LedgerOp::Cancel { nth }),
            1 => any::<usize>().prop_map(|nth| LedgerOp::Complete { nth }),
            1 => (0_u32..4).prop_map(|quantity| LedgerOp::SellDirect { quantity }),
            1 => (0_u32..3).prop_map(|added| LedgerOp::Restock { added }),
        ]
    }

    /// Strategy for sequences of up to `max_len` operations.
    pub fn ledger_ops(buyers: usize, max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
        prop::collection::vec(ledger_op(buyers), 0..max_len)
    }
}

// Re-export commonly used items
pub use inventory_mocks::{
    InMemoryBuyerProfiles, InMemoryFavorites, InMemoryInventoryStore, RecordingNotifier,
};
pub use mocks::{FixedClock, test_clock};
