//! Error Module - Managed Heap Error Types
//!
//! # Error Categories
//!
//! ## Object Errors
//! - `DeadObject` - Id refers to a slot that was swept or recycled
//! - `TypeMismatch` - Typed access with the wrong `T`
//!
//! ## Collector Errors
//! - `CollectorRunning` / `CollectorStopped` - Lifecycle misuse
//! - `Configuration` - Invalid collector configuration

use crate::ptr::ObjectId;
use thiserror::Error;

/// Main error type for managed heap operations
#[derive(Debug, Error)]
pub enum HeapError {
    /// The object was swept, or its slot now belongs to a newer object
    ///
    /// **When returned:** `get`/`root`/`set_finalizer` on a stale id
    ///
    /// **Recovery strategy:** Treat the object as gone; allocate a new one
    #[error("Object {id} is no longer live")]
    DeadObject { id: ObjectId },

    /// The object exists but holds a value of another type
    #[error("Object {id} is not a {expected}")]
    TypeMismatch { id: ObjectId, expected: &'static str },

    /// `start` called on a collector that already has a worker thread
    #[error("Collector is already running")]
    CollectorRunning,

    /// Operation requires a running collector
    #[error("Collector is not running")]
    CollectorStopped,

    /// Worker thread could not be spawned
    #[error("Failed to spawn collector thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HeapError {
    /// Check if the error only means "this object is gone"
    pub fn is_dead_object(&self) -> bool {
        matches!(self, HeapError::DeadObject { .. })
    }
}

/// Result type alias for heap operations
pub type Result<T> = std::result::Result<T, HeapError>;
