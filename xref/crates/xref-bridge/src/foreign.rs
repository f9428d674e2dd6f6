//! Foreign collaborator interface
//!
//! The reference-counted object system on the other side of the bridge.
//! Implementations must tolerate calls from any thread and must not call
//! back into the bridge synchronously from these methods while holding
//! their own locks.

use crate::error::BindError;
use crate::handle::{CallbackToken, ForeignHandle};

/// Operations the bridge needs from the foreign object system
pub trait ForeignObjects: Send + Sync {
    /// Take one strong reference
    fn ref_object(&self, handle: ForeignHandle);

    /// Drop one strong reference. May destroy the object.
    fn unref_object(&self, handle: ForeignHandle);

    /// Install the bridge's toggle reference
    ///
    /// Counts as a strong reference. From now on the collaborator reports
    /// every 1↔2 crossing of the object's count to `Bridge::on_toggle`.
    fn add_toggle_ref(&self, handle: ForeignHandle);

    /// Remove the toggle reference installed by [`add_toggle_ref`](Self::add_toggle_ref)
    fn remove_toggle_ref(&self, handle: ForeignHandle);

    /// Create a native closure for `handle` and return its token
    ///
    /// When the native closure is torn down, the collaborator reports it to
    /// `Bridge::remove_callback`.
    fn new_closure(&self, handle: ForeignHandle) -> CallbackToken;

    /// Bind a closure token to a named native event
    fn connect_closure(
        &self,
        handle: ForeignHandle,
        event: &str,
        token: CallbackToken,
    ) -> Result<(), BindError>;
}
