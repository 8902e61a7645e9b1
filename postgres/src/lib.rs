//! `PostgreSQL` storage for the surplus marketplace.
//!
//! This crate provides the production implementations of the persistence traits
//! from `surplus-core`, using sqlx with runtime-checked queries:
//!
//! - [`PostgresInventoryStore`]: listings and reservations, one transaction per
//!   ledger mutation with optimistic version checks
//! - [`PostgresBuyerDirectory`]: buyer profile and favorite-store reads
//! - Bundled migrations (`migrations/`), applied with
//!   [`PostgresInventoryStore::migrate`]
//!
//! # Example
//!
//! ```no_run
//! use surplus_postgres::{PostgresBuyerDirectory, PostgresInventoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresInventoryStore::new("postgres://localhost/surplus").await?;
//! store.migrate().await?;
//! let directory = PostgresBuyerDirectory::new(store.pool().clone());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod inventory;

pub use directory::PostgresBuyerDirectory;
pub use inventory::PostgresInventoryStore;
