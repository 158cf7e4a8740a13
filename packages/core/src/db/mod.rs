//! Database Layer
//!
//! This module holds the storage port of the nested-set engine and its
//! adapters:
//!
//! - `TreeReader` / `TreeTransaction` / `TreeStore` traits (the port)
//! - `InMemoryTreeStore`, a map-backed adapter with snapshot rollback
//! - `LibsqlTreeStore`, an embedded SQLite adapter (feature `libsql`, on by default)
//! - Domain events broadcast after committed mutations
//!
//! # Architecture
//!
//! The engine only ever writes through a `TreeTransaction`, so every boundary
//! shift of a move is applied atomically. Adapters decide how they isolate
//! transactions; both provided adapters serialize them behind one async mutex.

mod error;
pub mod events;
#[cfg(feature = "libsql")]
mod libsql_store;
mod memory_store;
mod tree_store;

pub use error::DatabaseError;
pub use events::TreeEvent;
#[cfg(feature = "libsql")]
pub use libsql_store::{LibsqlTransaction, LibsqlTreeStore};
pub use memory_store::{InMemoryTransaction, InMemoryTreeStore};
pub use tree_store::{TreeReader, TreeStore, TreeTransaction};
