//! Service Layer Error Types
//!
//! This module defines the errors returned by the move engine, the tree
//! serializer facade and the tree service.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Tree operation errors
///
/// A move that resolves to the node's current position is not an error; the
/// engine returns the unchanged state instead.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The node being moved (or read) does not exist
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// The engine was built without a store or with an invalid config
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The storage port failed; the transaction was rolled back
    #[error("Storage operation failed: {0}")]
    StorageFailure(#[from] DatabaseError),

    /// The destination lies inside the subtree being moved
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },

    /// The operation is deliberately not provided
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Stored rows violate a nested-set invariant
    #[error("Tree validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

impl TreeError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a circular reference error
    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Storage failure raised by the engine itself (e.g. lock attempts exhausted)
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::StorageFailure(DatabaseError::transaction_failed(context))
    }
}
