//! # Surplus Core
//!
//! Domain core of the surplus-food marketplace: sellers list perishable stock with a
//! discount price and a pickup deadline, buyers reserve units and pick them up.
//!
//! This crate contains no I/O. It provides:
//!
//! - **Geo**: Haversine distance between a buyer and a store
//! - **Visibility**: radius and early-access release rules for the buyer feed
//! - **Ledger**: pure stock-mutation rules producing atomic [`ledger::Mutation`]s
//! - **Store**: the [`store::InventoryStore`] trait that applies mutations with
//!   optimistic concurrency
//! - **Environment**: clock and collaborator traits (profiles, favorites, notifications)
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: rules decide, stores and services execute
//! - Concurrency through versioned compare-and-swap, never in-process locks
//! - Dependencies injected through traits
//!
//! ## Example
//!
//! ```
//! use surplus_core::geo::GeoPoint;
//! use surplus_core::types::BuyerTier;
//! use surplus_core::visibility::VisibilityPolicy;
//!
//! let policy = VisibilityPolicy::new(BuyerTier::new(2));
//! assert!(policy.has_early_access(BuyerTier::new(3)));
//!
//! let city_hall = GeoPoint::new(37.5665, 126.9780);
//! assert!(city_hall.distance_km(&city_hall) < 1e-9);
//! ```

pub mod error;
pub mod geo;
pub mod ledger;
pub mod store;
pub mod types;
pub mod version;
pub mod visibility;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{ErrorKind, LedgerError, StoreError};
pub use ledger::{ListingSnapshot, Mutation};
pub use store::InventoryStore;
pub use version::Version;

/// Environment module - clock and collaborator traits
///
/// Everything outside the inventory core is reached through these traits and
/// injected at construction time. Collaborators are consulted either before or
/// strictly after a stock mutation, never in the middle of one.
pub mod environment {
    use crate::geo::GeoPoint;
    use crate::ledger::LedgerEvent;
    use crate::types::{BuyerId, BuyerTier, StoreId};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::HashSet;
    use std::future::Future;
    use std::pin::Pin;
    use thiserror::Error;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use surplus_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Failure of an external collaborator.
    ///
    /// Never fatal for the core: reads degrade, notifications are dropped.
    #[derive(Error, Debug)]
    pub enum CollaboratorError {
        /// The collaborator could not be reached or answered with an error.
        #[error("Collaborator unavailable: {0}")]
        Unavailable(String),
    }

    /// Boxed future returned by collaborator traits.
    pub type CollaboratorFuture<'a, T> =
        Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send + 'a>>;

    /// What the buyer profile store knows about a buyer.
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct BuyerProfile {
        /// Last shared location
        pub location: Option<GeoPoint>,
        /// Membership grade
        pub tier: BuyerTier,
    }

    /// Read access to buyer profiles.
    pub trait BuyerProfiles: Send + Sync {
        /// Profile of `buyer_id`, `None` if the buyer has none.
        fn profile(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, Option<BuyerProfile>>;
    }

    /// Read access to the stores a buyer favorited.
    pub trait FavoriteStores: Send + Sync {
        /// Favorited store ids of `buyer_id`.
        fn favorite_stores(&self, buyer_id: BuyerId) -> CollaboratorFuture<'_, HashSet<StoreId>>;
    }

    /// Fire-and-forget sink for committed ledger events (push, email, audit log).
    pub trait NotificationSink: Send + Sync {
        /// Deliver one event.
        fn notify(&self, event: LedgerEvent) -> CollaboratorFuture<'_, ()>;
    }
}
