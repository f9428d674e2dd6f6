//! Object - user-facing rooted handle to a wrapped foreign object.

use crate::bridge::Bridge;
use crate::closures::RegistryId;
use crate::coordinator::FinalizeState;
use crate::error::Result;
use crate::handle::{CallbackToken, ForeignHandle, Value};
use crate::proxy::Proxy;
use std::fmt;
use std::sync::Arc;
use xref_heap::{Gc, Root};

/// A foreign object as seen from managed code
///
/// Keeps its proxy rooted. Once every `Object` (and every managed path to
/// the proxy) is gone, the proxy's finalizer decides whether the foreign
/// object can be released.
#[derive(Clone)]
pub struct Object {
    bridge: Arc<Bridge>,
    proxy: Root<Proxy>,
}

impl Object {
    pub(crate) fn new(bridge: Arc<Bridge>, proxy: Root<Proxy>) -> Self {
        Self { bridge, proxy }
    }

    pub fn handle(&self) -> Result<ForeignHandle> {
        Ok(self.proxy.get()?.handle())
    }

    /// Unrooted proxy pointer, safe to capture in callbacks
    pub fn gc(&self) -> Gc<Proxy> {
        self.proxy.gc()
    }

    pub fn root(&self) -> &Root<Proxy> {
        &self.proxy
    }

    pub fn registry(&self) -> Result<RegistryId> {
        Ok(self.proxy.get()?.registry())
    }

    pub fn state(&self) -> Result<FinalizeState> {
        Ok(self.proxy.get()?.state())
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Bind `callback` to a named native event
    ///
    /// The callback lives in the handle's registry until the foreign object
    /// is released, so it must not capture an `Object` or a [`Root`]: that
    /// roots the proxy from inside its own registry and the object is never
    /// collected. Capture [`Object::gc`] instead, which does not keep the
    /// proxy alive.
    ///
    /// ```rust,ignore
    /// let button = bridge.adopt(handle)?;
    /// let proxy = button.gc();
    /// button.connect("clicked", move |_args| {
    ///     let _ = proxy;
    /// })?;
    /// ```
    ///
    /// On rejection by the foreign side the registration is rolled back and
    /// [`crate::BridgeError::Connect`] is returned.
    pub fn connect<F>(&self, event: &str, callback: F) -> Result<CallbackToken>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let handle = self.handle()?;
        self.bridge.connect(handle, event, Arc::new(callback))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("proxy", &self.proxy.gc())
            .field("handle", &self.handle().ok())
            .finish()
    }
}
