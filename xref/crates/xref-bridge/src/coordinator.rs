//! Finalization Coordinator - deciding when a foreign object may be released.
//!
//! A proxy's managed finalizer is the only place the bridge's foreign
//! reference is ever given up. When the finalizer fires, the coordinator
//! looks at the handle's registry and the toggle state and either releases,
//! or defers until a later collection pass.
//!
//! ```text
//!   Live ──collector──▶ Checking ──┬──▶ Finalized
//!     ▲  ▲                 ▲       │
//!     │  │ re-wrap         └───────┼──── Deferred (finalizer re-armed)
//!     │  └─────────────────────────┼────────┘
//!     │ re-wrap                    │
//!     └──────── Abandoned ◀────────┘   (deferral limit exceeded)
//! ```
//!
//! A resurrection verdict also puts the proxy straight back to `Live`: the
//! native side re-entered the registry, so the deferral count starts over.
//!
//! The check itself ([`Coordinator::check`]) holds the registry table lock
//! for its whole duration, which is what makes "nothing re-entered the
//! registry and nothing outside holds the object" an atomic observation.

use crate::closures::ClosureTable;
use crate::config::BridgeConfig;
use crate::handle::ForeignHandle;
use crate::toggle::ToggleTracker;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use xref_heap::{CollectionScheduler, ObjectId};

/// Why a finalizer was not allowed to release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// The registry was re-entered since the collector last looked
    Resurrected,
    /// The foreign side still holds a reference beyond the bridge's own
    AdditionalReference,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::Resurrected => write!(f, "resurrected"),
            DeferReason::AdditionalReference => write!(f, "additional reference"),
        }
    }
}

/// Lifecycle state of one proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FinalizeState {
    Live,
    Checking,
    Deferred(DeferReason),
    /// Terminal
    Finalized,
    /// Gave up after too many deferrals; foreign reference leaked
    Abandoned,
}

/// Result of a single registry check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Registry cleared and removed; the toggle reference must go now
    Release,
    /// Nothing registered for this proxy; nothing to release
    Settled,
    Deferred(DeferReason),
}

/// What the finalizer has to do after a coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Remove the toggle reference. Handed out at most once per proxy.
    Release,
    /// Finalized without anything left to release
    Settled,
    /// Re-arm the finalizer
    Rearm { reason: DeferReason, deferrals: u32 },
    /// Do not re-arm; leak the foreign reference
    Abandon { reason: DeferReason, deferrals: u32 },
    /// The proxy was not in a checkable state (carried here)
    Skipped(FinalizeState),
}

/// Per-proxy state cell
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<FinalizeState>,
    /// Consecutive deferrals since the proxy was last live
    deferrals: AtomicU32,
    /// Release latch
    released: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(FinalizeState::Live),
            deferrals: AtomicU32::new(0),
            released: AtomicBool::new(false),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FinalizeState {
        *self.state.lock()
    }

    pub fn deferrals(&self) -> u32 {
        self.deferrals.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Enter `Checking` from `Live` or `Deferred`
    ///
    /// Any other state is handed back unchanged.
    pub fn begin_check(&self) -> Result<(), FinalizeState> {
        let mut state = self.state.lock();
        match *state {
            FinalizeState::Live | FinalizeState::Deferred(_) => {
                *state = FinalizeState::Checking;
                Ok(())
            },
            other => Err(other),
        }
    }

    /// Apply a verdict to a proxy in `Checking`
    pub fn settle(&self, verdict: Verdict, max_deferrals: Option<u32>) -> Outcome {
        let mut state = self.state.lock();
        match verdict {
            Verdict::Release => {
                *state = FinalizeState::Finalized;
                if self.latch_release() {
                    Outcome::Release
                } else {
                    Outcome::Settled
                }
            },
            Verdict::Settled => {
                *state = FinalizeState::Finalized;
                Outcome::Settled
            },
            Verdict::Deferred(DeferReason::Resurrected) => {
                *state = FinalizeState::Live;
                self.deferrals.store(0, Ordering::Release);
                Outcome::Rearm {
                    reason: DeferReason::Resurrected,
                    deferrals: 0,
                }
            },
            Verdict::Deferred(reason) => {
                let deferrals = self.deferrals.fetch_add(1, Ordering::AcqRel) + 1;
                if max_deferrals.map_or(false, |max| deferrals > max) {
                    *state = FinalizeState::Abandoned;
                    Outcome::Abandon { reason, deferrals }
                } else {
                    *state = FinalizeState::Deferred(reason);
                    Outcome::Rearm { reason, deferrals }
                }
            },
        }
    }

    /// Mark the proxy live again after a re-wrap found it.
    ///
    /// `Deferred` and `Abandoned` go back to `Live` with the deferral count
    /// reset. Returns `true` only for `Abandoned`, whose finalizer is no
    /// longer armed. A proxy in `Checking` is left to the running finalizer,
    /// which sees the resurrection on this pass or the next.
    pub fn reenter(&self) -> bool {
        let mut state = self.state.lock();
        let abandoned = match *state {
            FinalizeState::Abandoned => true,
            FinalizeState::Deferred(_) => false,
            _ => return false,
        };
        *state = FinalizeState::Live;
        self.deferrals.store(0, Ordering::Release);
        abandoned
    }

    /// `true` for exactly one caller
    fn latch_release(&self) -> bool {
        self.released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Finalization decision logic over the shared tables
pub struct Coordinator<'a> {
    closures: &'a ClosureTable,
    toggles: &'a ToggleTracker,
    scheduler: &'a dyn CollectionScheduler,
    config: &'a BridgeConfig,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        closures: &'a ClosureTable,
        toggles: &'a ToggleTracker,
        scheduler: &'a dyn CollectionScheduler,
        config: &'a BridgeConfig,
    ) -> Self {
        Self {
            closures,
            toggles,
            scheduler,
            config,
        }
    }

    /// Decide whether `handle` may be released on behalf of `proxy`
    ///
    /// A registry bound to a different proxy is treated as absent: only the
    /// proxy that currently owns a registry can tear it down.
    pub fn check(&self, handle: ForeignHandle, proxy: ObjectId) -> Verdict {
        let (verdict, cleared) = {
            let mut table = self.closures.lock();
            let Some(registry) = table.get_mut(handle) else {
                return Verdict::Settled;
            };
            if registry.proxy() != Some(proxy) {
                return Verdict::Settled;
            }

            if registry.take_resurrected() {
                (Verdict::Deferred(DeferReason::Resurrected), None)
            } else if self.toggles.query(handle) {
                (Verdict::Deferred(DeferReason::AdditionalReference), None)
            } else {
                let callbacks = registry.clear();
                let evicted = table.evict(handle);
                (Verdict::Release, Some((callbacks, evicted)))
            }
        };
        drop(cleared);

        if verdict == Verdict::Deferred(DeferReason::Resurrected) && self.config.collect_on_resurrection
        {
            self.scheduler.request_collection();
        }
        verdict
    }

    /// Run one finalizer invocation through the state machine
    pub fn finalize(&self, lifecycle: &Lifecycle, handle: ForeignHandle, proxy: ObjectId) -> Outcome {
        if let Err(state) = lifecycle.begin_check() {
            return Outcome::Skipped(state);
        }
        let verdict = self.check(handle, proxy);
        lifecycle.settle(verdict, self.config.max_deferrals)
    }

}
