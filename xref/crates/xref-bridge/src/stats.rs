//! Stats Module - Bridge Activity Counters
//!
//! Lock-free counters bumped on every bridge transition. A steadily growing
//! `deferrals` count next to a flat `released` count is the usual sign of a
//! proxy that will never converge.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// BridgeStats - live counters
#[derive(Debug, Default)]
pub struct BridgeStats {
    wrapped: AtomicU64,
    rewrapped: AtomicU64,
    toggles: AtomicU64,
    callbacks_connected: AtomicU64,
    callbacks_removed: AtomicU64,
    dispatched: AtomicU64,
    dropped_dispatches: AtomicU64,
    deferrals: AtomicU64,
    resurrections: AtomicU64,
    finalized: AtomicU64,
    released: AtomicU64,
    double_finalizes: AtomicU64,
    abandoned: AtomicU64,
    revived: AtomicU64,
    collection_requests: AtomicU64,
}

macro_rules! counters {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl BridgeStats {
            $(
                #[inline]
                pub(crate) fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counters!(
    record_wrap => wrapped,
    record_rewrap => rewrapped,
    record_toggle => toggles,
    record_connect => callbacks_connected,
    record_remove => callbacks_removed,
    record_dispatch => dispatched,
    record_dropped_dispatch => dropped_dispatches,
    record_deferral => deferrals,
    record_resurrection => resurrections,
    record_finalize => finalized,
    record_release => released,
    record_double_finalize => double_finalizes,
    record_abandon => abandoned,
    record_revive => revived,
    record_collection_request => collection_requests,
);

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            wrapped: load(&self.wrapped),
            rewrapped: load(&self.rewrapped),
            toggles: load(&self.toggles),
            callbacks_connected: load(&self.callbacks_connected),
            callbacks_removed: load(&self.callbacks_removed),
            dispatched: load(&self.dispatched),
            dropped_dispatches: load(&self.dropped_dispatches),
            deferrals: load(&self.deferrals),
            resurrections: load(&self.resurrections),
            finalized: load(&self.finalized),
            released: load(&self.released),
            double_finalizes: load(&self.double_finalizes),
            abandoned: load(&self.abandoned),
            revived: load(&self.revived),
            collection_requests: load(&self.collection_requests),
        }
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// New registries (fresh toggle references)
    pub wrapped: u64,
    /// Wraps that found an existing registry
    pub rewrapped: u64,
    pub toggles: u64,
    pub callbacks_connected: u64,
    pub callbacks_removed: u64,
    pub dispatched: u64,
    pub dropped_dispatches: u64,
    pub deferrals: u64,
    pub resurrections: u64,
    pub finalized: u64,
    /// Toggle references removed
    pub released: u64,
    pub double_finalizes: u64,
    pub abandoned: u64,
    pub revived: u64,
    pub collection_requests: u64,
}

impl StatsSnapshot {
    /// Registries created but neither released nor abandoned yet
    pub fn outstanding(&self) -> u64 {
        self.wrapped.saturating_sub(self.released + self.abandoned)
    }

    /// Export to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
