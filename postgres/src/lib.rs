//! `PostgreSQL` group store for Gatepass.
//!
//! Implements [`GroupStore`](gatepass_core::GroupStore) over sqlx with:
//!
//! - one transaction per admission commit, with a row lock and version check
//! - all-or-nothing group registration
//! - embedded schema migrations (`migrations/`)
//!
//! # Example
//!
//! ```ignore
//! use gatepass_postgres::PostgresGroupStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresGroupStore::connect(&database_url, 10, timeout).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod group_store;

pub use group_store::PostgresGroupStore;
