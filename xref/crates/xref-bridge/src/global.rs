//! Global Bridge - entry points for foreign trampolines without a context.
//!
//! Native callbacks registered with the foreign library usually carry only
//! the object and closure pointers. These functions route them to the bridge
//! installed with [`install_global`].

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{CallbackToken, ForeignHandle, Value};
use parking_lot::RwLock;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref GLOBAL_BRIDGE: RwLock<Option<Arc<Bridge>>> = RwLock::new(None);
}

/// Install the process-wide bridge. Returns the one it replaced.
pub fn install_global(bridge: Arc<Bridge>) -> Option<Arc<Bridge>> {
    GLOBAL_BRIDGE.write().replace(bridge)
}

pub fn uninstall_global() -> Option<Arc<Bridge>> {
    GLOBAL_BRIDGE.write().take()
}

pub fn global() -> Result<Arc<Bridge>> {
    GLOBAL_BRIDGE
        .read()
        .as_ref()
        .cloned()
        .ok_or(BridgeError::NoGlobalBridge)
}

/// Toggle notification trampoline
pub fn toggle_notify(handle: ForeignHandle, is_last: bool) -> Result<()> {
    global()?.on_toggle(handle, is_last);
    Ok(())
}

/// Closure invocation trampoline. Returns whether a callback ran.
pub fn marshal(handle: ForeignHandle, token: CallbackToken, args: &[Value]) -> Result<bool> {
    Ok(global()?.dispatch(handle, token, args))
}

/// Closure teardown trampoline
pub fn closure_finalized(handle: ForeignHandle, token: CallbackToken) -> Result<()> {
    global()?.remove_callback(handle, token);
    Ok(())
}
