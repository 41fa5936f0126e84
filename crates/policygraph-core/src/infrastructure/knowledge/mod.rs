//! Graph store implementations
//!
//! This module contains the SQLite implementation of the
//! [`GraphStore`](crate::domain::knowledge::GraphStore) trait.

mod repository;

pub use repository::SqliteGraphStore;
