//! Error Module - Bridge Error Types
//!
//! Most unusual conditions on the bridge are control states, not errors:
//! unknown callback tokens, removals for already released handles, repeated
//! finalizer calls and resurrections are logged as
//! [`crate::logging::BridgeEvent`]s and never propagated. What remains here
//! are failures a caller can act on.

use crate::config::ConfigError;
use crate::handle::{CallbackToken, ForeignHandle};
use thiserror::Error;
use xref_heap::HeapError;

/// Rejection reported by the foreign collaborator when binding a callback
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BindError(pub String);

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Managed heap refused an operation
    ///
    /// **When returned:** rooting or reading a proxy that was already swept
    #[error("Managed heap error: {0}")]
    Heap(#[from] HeapError),

    /// Invalid bridge configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The foreign side refused to bind a callback to an event
    ///
    /// **Recovery strategy:** The token was removed from the registry again;
    /// nothing else to undo.
    #[error("Failed to connect {token} to '{event}' on {handle}: {source}")]
    Connect {
        handle: ForeignHandle,
        event: String,
        token: CallbackToken,
        #[source]
        source: BindError,
    },

    /// A free-function entry point was used before `install_global`
    #[error("No global bridge installed")]
    NoGlobalBridge,
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
