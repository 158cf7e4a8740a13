//! Business Services
//!
//! This module contains the tree services:
//!
//! - `MoveEngine` - Resolves and applies subtree moves and leaf inserts
//! - `TreeSerializer` - Renders node collections as nested presentation records
//! - `TreeService` - Facade combining both over one store
//! - `TreeLockRegistry` - Per-tree locks serializing moves on the same tree
//!
//! Services coordinate between the storage port and callers, keeping every
//! multi-row update inside one transaction.

pub mod error;
pub mod move_engine;
pub mod tree_locks;
pub mod tree_serializer;
pub mod tree_service;

pub use error::TreeError;
pub use move_engine::{
    Destination, MoveEngine, MoveEngineBuilder, MovePositioning, MoveReferences, MoveTarget,
    ShiftStep,
};
pub use tree_locks::{TreeLockGuard, TreeLockRegistry};
pub use tree_serializer::{AttributeLabel, LabelExtractor, RootFilter, TreeSerializer};
pub use tree_service::TreeService;
