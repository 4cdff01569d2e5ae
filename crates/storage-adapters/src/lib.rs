//! # storage-adapters
//!
//! `BoardStore` implementations. The in-memory store is always compiled and
//! backs tests and single-process deployments; Postgres sits behind the
//! `db-postgres` feature.

pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::InMemoryBoardStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgBoardStore;
