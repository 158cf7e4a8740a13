//! Nestable Core
//!
//! This crate maintains trees stored as nested sets in a flat table and moves
//! nodes (with their subtrees) between positions with a single logical
//! operation.
//!
//! # Architecture
//!
//! - **Nested sets**: every node stores a `[lft, rgt]` preorder interval and its depth
//! - **Forests**: several independent trees share one table, told apart by `tree_id`
//! - **Transactional moves**: all boundary shifts of a move commit or roll back together
//! - **libsql**: embedded SQLite-compatible adapter with configurable column names
//!
//! # Modules
//!
//! - [`models`] - Nested-set rows and pure interval arithmetic
//! - [`config`] - Engine and column configuration
//! - [`db`] - Storage port, in-memory and libsql adapters, domain events
//! - [`services`] - Move engine, tree serializer and the tree service facade

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{NestedSetColumns, TreeConfig};
pub use models::*;
pub use services::*;
