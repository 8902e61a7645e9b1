//! # Surplus Marketplace
//!
//! Reservation core of a surplus-food marketplace: stores list discounted
//! leftovers with a pickup deadline, buyers nearby reserve units and pick them
//! up, and sellers record walk-in sales against the same stock.
//!
//! ## Architecture
//!
//! - **Write side**: [`ReservationCoordinator`] resolves the caller, then the
//!   [`InventoryLedger`] applies the pure rules from `surplus_core::ledger` and
//!   commits them atomically with one retry on a version conflict.
//! - **Read side**: [`Catalog`] composes the buyer feed from open listings,
//!   visibility rules, buyer profiles and favorite stores.
//! - **HTTP**: Axum handlers in [`api`], wired by [`server::build_router`].
//!
//! Notifications leave through a fire-and-forget [`notify::Dispatcher`] after
//! a commit; they never take part in one.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod notify;
pub mod server;

pub use catalog::{Catalog, FeedFilters, FeedItem, ListingDetail};
pub use config::{Config, MarketplaceSettings};
pub use coordinator::{ReservationCoordinator, ReserveInput, SweepReport};
pub use error::{ApiError, AppError};
pub use inventory::InventoryLedger;
