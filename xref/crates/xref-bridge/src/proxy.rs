//! Proxy - the managed-heap side of a wrapped foreign object.

use crate::closures::RegistryId;
use crate::coordinator::{FinalizeState, Lifecycle};
use crate::handle::ForeignHandle;
use xref_heap::{Trace, Tracer};

/// Managed object standing for one foreign handle
///
/// Holds no traced edges: its registry is reached by arena id only.
#[derive(Debug)]
pub struct Proxy {
    handle: ForeignHandle,
    registry: RegistryId,
    lifecycle: Lifecycle,
}

impl Proxy {
    pub(crate) fn new(handle: ForeignHandle, registry: RegistryId) -> Self {
        Self {
            handle,
            registry,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn handle(&self) -> ForeignHandle {
        self.handle
    }

    pub fn registry(&self) -> RegistryId {
        self.registry
    }

    pub fn state(&self) -> FinalizeState {
        self.lifecycle.state()
    }

    pub fn deferrals(&self) -> u32 {
        self.lifecycle.deferrals()
    }

    /// Whether this proxy gave up the bridge's foreign reference
    pub fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl Trace for Proxy {
    fn trace(&self, _tracer: &mut Tracer) {}
}
