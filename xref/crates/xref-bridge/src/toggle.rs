//! Toggle Tracker - which foreign objects are held beyond the bridge.
//!
//! The foreign collaborator reports every crossing of the 1↔2 reference
//! count boundary on an object carrying the bridge's toggle reference.
//! A handle in the set means something other than the bridge holds it
//! ("not last"); absence means the bridge's reference is the only one.

use crate::handle::ForeignHandle;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

/// Process-wide "not last" set
#[derive(Debug, Default)]
pub struct ToggleTracker {
    not_last: RwLock<FxHashSet<ForeignHandle>>,
}

impl ToggleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a toggle notification
    ///
    /// Returns `true` when this was a transition to "bridge holds the last
    /// reference", which is the caller's cue to request a collection.
    pub fn on_toggle(&self, handle: ForeignHandle, additional_reference: bool) -> bool {
        let mut not_last = self.not_last.write();
        if additional_reference {
            not_last.insert(handle);
            false
        } else {
            not_last.remove(&handle);
            true
        }
    }

    /// Does the foreign side currently hold an additional reference?
    pub fn query(&self, handle: ForeignHandle) -> bool {
        self.not_last.read().contains(&handle)
    }

    /// Handles currently held beyond the bridge
    pub fn len(&self) -> usize {
        self.not_last.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.not_last.read().is_empty()
    }
}
