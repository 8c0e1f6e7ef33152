//! # AdRelay Store
//!
//! SQLite implementation of [`adrelay_core::traits::Store`].
//! One connection behind a mutex, WAL journal, idempotent migrations.

mod analytics;
pub mod sqlite;

pub use sqlite::SqliteStore;
