//! Database module: connection setup and per-entity SQL repositories.
//!
//! Each submodule holds the SQL for one table family and maps rows into the
//! domain types from `crate::model`. Business rules that need more than one
//! statement (checkout, status changes) run inside a single transaction here.

pub mod analytics;
pub mod books;
pub mod bookstores;
pub mod carts;
pub mod orders;
pub mod outbox;
pub mod pool;
pub mod reviews;
pub mod users;
pub mod wishlist;

pub use pool::{init_pool, run_migrations, Pool};
