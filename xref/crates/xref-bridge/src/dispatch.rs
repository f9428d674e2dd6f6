//! Callback Dispatcher
//!
//! Routes native invocations to managed callbacks. The callback is cloned
//! out of the registry under the table lock and called after the lock is
//! gone, so a callback may freely connect, remove or wrap objects.

use crate::closures::{ClosureTable, Miss};
use crate::handle::{CallbackToken, ForeignHandle, Value};

/// Dispatch result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Called,
    /// Token or whole registry gone; the invocation was dropped
    Dropped(Miss),
}

impl Dispatched {
    pub fn was_called(self) -> bool {
        matches!(self, Dispatched::Called)
    }
}

/// Invoke the callback bound to `token` on `handle`
///
/// Never marks the registry resurrected.
pub fn dispatch(
    closures: &ClosureTable,
    handle: ForeignHandle,
    token: CallbackToken,
    args: &[Value],
) -> Dispatched {
    match closures.lookup(handle, token) {
        Ok(callback) => {
            callback(args);
            Dispatched::Called
        },
        Err(miss) => Dispatched::Dropped(miss),
    }
}
