//! HTTP API handlers, organized by resource:
//! - Listings: seller lifecycle and buyer reservations on a listing
//! - Reservations: buyer and seller views, cancel and pickup
//! - Feed: the buyer-facing listing feed
//! - Stores: a store's page for buyers and the seller's own listing overview
//! - Sweeps: scheduler-triggered maintenance

pub mod extract;
pub mod feed;
pub mod listings;
pub mod reservations;
pub mod stores;
pub mod sweeps;

pub use feed::get_feed;
pub use listings::{
    create_listing, edit_listing, get_listing, mark_sold, reserve, restock, sell_direct,
    update_pickup_deadline,
};
pub use reservations::{
    cancel_reservation, complete_reservation, list_my_reservations, list_store_reservations,
};
pub use stores::{get_store_listings, list_own_listings};
pub use sweeps::auto_complete;
