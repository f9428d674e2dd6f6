//! Bridge Logging
//!
//! Every notable transition on the bridge is a [`BridgeEvent`]. Events go to
//! the `log` facade at a per-event level and, when enabled, into an
//! in-memory [`EventLog`] so a host can watch for proxies that never
//! converge.
//!
//! Log Levels:
//! - WARN: Abandoned proxies (deliberate leaks)
//! - DEBUG: Wrapping, deferral, finalization, benign anomalies
//! - TRACE: Toggle notifications and per-callback bookkeeping

use crate::coordinator::DeferReason;
use crate::handle::{CallbackToken, ForeignHandle};
use log::Level;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// Bridge event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A proxy was handed out for a foreign object
    Wrapped {
        handle: ForeignHandle,
        /// The handle already had a registry (re-wrap)
        existing: bool,
    },

    /// Toggle notification from the foreign side
    Toggled {
        handle: ForeignHandle,
        additional_reference: bool,
    },

    ClosureConnected {
        handle: ForeignHandle,
        token: CallbackToken,
        event: String,
    },

    ClosureRemoved {
        handle: ForeignHandle,
        token: CallbackToken,
    },

    /// Dispatch or removal for a token the registry does not know
    UnknownClosure {
        handle: ForeignHandle,
        token: CallbackToken,
    },

    /// Removal for a handle with no registry (already released)
    UnknownHandle {
        handle: ForeignHandle,
        token: CallbackToken,
    },

    /// A finalizer found its registry re-entered after the collector gave up on it
    ResurrectionDetected { handle: ForeignHandle },

    Deferred {
        handle: ForeignHandle,
        reason: DeferReason,
        deferrals: u32,
    },

    Finalized { handle: ForeignHandle },

    /// Toggle reference removed; the bridge no longer owns the object
    Released { handle: ForeignHandle },

    /// Finalizer logic ran again for an already finalized proxy
    DoubleFinalize { handle: ForeignHandle },

    /// Deferral limit exceeded; foreign reference leaked on purpose
    Abandoned {
        handle: ForeignHandle,
        deferrals: u32,
    },

    /// A previously abandoned proxy was wrapped again
    Revived { handle: ForeignHandle },
}

impl BridgeEvent {
    pub fn level(&self) -> Level {
        match self {
            BridgeEvent::Abandoned { .. } => Level::Warn,
            BridgeEvent::Toggled { .. }
            | BridgeEvent::ClosureConnected { .. }
            | BridgeEvent::ClosureRemoved { .. } => Level::Trace,
            _ => Level::Debug,
        }
    }

    pub fn handle(&self) -> ForeignHandle {
        match self {
            BridgeEvent::Wrapped { handle, .. }
            | BridgeEvent::Toggled { handle, .. }
            | BridgeEvent::ClosureConnected { handle, .. }
            | BridgeEvent::ClosureRemoved { handle, .. }
            | BridgeEvent::UnknownClosure { handle, .. }
            | BridgeEvent::UnknownHandle { handle, .. }
            | BridgeEvent::ResurrectionDetected { handle }
            | BridgeEvent::Deferred { handle, .. }
            | BridgeEvent::Finalized { handle }
            | BridgeEvent::Released { handle }
            | BridgeEvent::DoubleFinalize { handle }
            | BridgeEvent::Abandoned { handle, .. }
            | BridgeEvent::Revived { handle } => *handle,
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::Wrapped { handle, existing } => {
                if *existing {
                    write!(f, "re-wrapped object {}", handle)
                } else {
                    write!(f, "new object {}", handle)
                }
            },
            BridgeEvent::Toggled {
                handle,
                additional_reference,
            } => write!(
                f,
                "toggled object {}, is_last = {}",
                handle, !additional_reference
            ),
            BridgeEvent::ClosureConnected {
                handle,
                token,
                event,
            } => write!(f, "connected closure {} to '{}' on {}", token, event, handle),
            BridgeEvent::ClosureRemoved { handle, token } => {
                write!(f, "removed closure {} from {}", token, handle)
            },
            BridgeEvent::UnknownClosure { handle, token } => {
                write!(f, "unknown closure {} on {}", token, handle)
            },
            BridgeEvent::UnknownHandle { handle, token } => write!(
                f,
                "object {} has unknown closures (removing {})",
                handle, token
            ),
            BridgeEvent::ResurrectionDetected { handle } => write!(
                f,
                "object {} has closures resurrected, unresurrecting",
                handle
            ),
            BridgeEvent::Deferred {
                handle,
                reason,
                deferrals,
            } => write!(
                f,
                "not finalizing object {} ({}, deferral #{})",
                handle, reason, deferrals
            ),
            BridgeEvent::Finalized { handle } => write!(f, "finalizing object {}", handle),
            BridgeEvent::Released { handle } => write!(f, "unref object {}", handle),
            BridgeEvent::DoubleFinalize { handle } => {
                write!(f, "object {} already finalized", handle)
            },
            BridgeEvent::Abandoned { handle, deferrals } => write!(
                f,
                "abandoning object {} after {} deferrals, leaking its foreign reference",
                handle, deferrals
            ),
            BridgeEvent::Revived { handle } => write!(f, "revived abandoned object {}", handle),
        }
    }
}

/// In-memory event recorder
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<BridgeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: BridgeEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().clone()
    }

    /// Events concerning one handle, in emission order
    pub fn for_handle(&self, handle: ForeignHandle) -> Vec<BridgeEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.handle() == handle)
            .cloned()
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BridgeEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Recorded events as a JSON array
    pub fn to_json(&self) -> String {
        serde_json::to_string(&*self.events.lock()).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Event sink owned by a bridge
#[derive(Debug)]
pub(crate) struct EventSink {
    json: bool,
    recorder: Option<EventLog>,
}

impl EventSink {
    pub(crate) fn new(json: bool, record: bool) -> Self {
        Self {
            json,
            recorder: record.then(EventLog::new),
        }
    }

    pub(crate) fn emit(&self, event: BridgeEvent) {
        let level = event.level();
        if log::log_enabled!(target: "xref_bridge", level) {
            if self.json {
                match serde_json::to_string(&event) {
                    Ok(json) => log::log!(target: "xref_bridge", level, "{}", json),
                    Err(_) => log::log!(target: "xref_bridge", level, "{}", event),
                }
            } else {
                log::log!(target: "xref_bridge", level, "{}", event);
            }
        }

        if let Some(recorder) = &self.recorder {
            recorder.record(event);
        }
    }

    pub(crate) fn recorder(&self) -> Option<&EventLog> {
        self.recorder.as_ref()
    }
}
