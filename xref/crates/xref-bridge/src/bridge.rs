//! Bridge - ties the managed heap, the foreign collaborator and the shared
//! tables together.
//!
//! # Lock Discipline
//!
//! Two bridge locks exist: the registry table and the toggle set. The table
//! may be held while taking the toggle set or the heap lock, never the other
//! way round. No collaborator method and no user callback is ever called
//! with either bridge lock held.

use crate::closures::{Callback, ClosureTable, Miss};
use crate::config::BridgeConfig;
use crate::coordinator::{Coordinator, DeferReason, FinalizeState, Outcome};
use crate::dispatch::{self, Dispatched};
use crate::error::{BridgeError, Result};
use crate::foreign::ForeignObjects;
use crate::handle::{CallbackToken, ForeignHandle, Value};
use crate::logging::{BridgeEvent, EventLog, EventSink};
use crate::object::Object;
use crate::proxy::Proxy;
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::toggle::ToggleTracker;
use std::fmt;
use std::sync::{Arc, Weak};
use xref_heap::{CollectionScheduler, Gc, Heap};

lazy_static::lazy_static! {
    static ref GLOBAL_TABLES: Arc<SharedTables> = Arc::new(SharedTables::default());
}

/// Toggle set and registry table
///
/// Process-wide in production ([`SharedTables::global`]); tests give each
/// bridge its own.
#[derive(Debug, Default)]
pub struct SharedTables {
    toggles: ToggleTracker,
    closures: ClosureTable,
}

impl SharedTables {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide tables
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_TABLES)
    }

    pub fn toggles(&self) -> &ToggleTracker {
        &self.toggles
    }

    pub fn closures(&self) -> &ClosureTable {
        &self.closures
    }
}

/// How the caller's foreign reference is handed over on wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    /// Caller keeps its reference
    Borrowed,
    /// Caller's reference now belongs to the bridge
    Owned,
}

/// The cross-heap reference bridge
pub struct Bridge {
    tables: Arc<SharedTables>,
    foreign: Arc<dyn ForeignObjects>,
    heap: Arc<Heap>,
    config: BridgeConfig,
    stats: BridgeStats,
    events: EventSink,
}

impl Bridge {
    /// Create a bridge with private tables
    pub fn new(
        foreign: Arc<dyn ForeignObjects>,
        heap: Arc<Heap>,
        config: BridgeConfig,
    ) -> Result<Arc<Self>> {
        Self::with_tables(SharedTables::new(), foreign, heap, config)
    }

    /// Create a bridge over existing tables (e.g. [`SharedTables::global`])
    pub fn with_tables(
        tables: Arc<SharedTables>,
        foreign: Arc<dyn ForeignObjects>,
        heap: Arc<Heap>,
        config: BridgeConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let events = EventSink::new(config.json_events, config.record_events);
        Ok(Arc::new(Self {
            tables,
            foreign,
            heap,
            config,
            stats: BridgeStats::new(),
            events,
        }))
    }

    /// Wrap a foreign object the caller already holds a reference to
    ///
    /// The caller keeps its own reference.
    pub fn acquire(self: &Arc<Self>, handle: ForeignHandle) -> Result<Object> {
        self.wrap(handle, Transfer::Borrowed)
    }

    /// Wrap a freshly produced foreign object, taking over its reference
    pub fn adopt(self: &Arc<Self>, handle: ForeignHandle) -> Result<Object> {
        self.wrap(handle, Transfer::Owned)
    }

    fn wrap(self: &Arc<Self>, handle: ForeignHandle, transfer: Transfer) -> Result<Object> {
        let heap = &self.heap;
        let attached = self.tables.closures.attach(handle, |registry, previous| {
            if let Some(root) = previous.and_then(|id| heap.root(Gc::<Proxy>::from_id(id)).ok()) {
                let id = root.gc().id();
                return Ok::<_, BridgeError>(((root, false), id));
            }
            let root = heap.alloc(Proxy::new(handle, registry));
            let id = root.gc().id();
            Ok(((root, true), id))
        })?;
        let (root, fresh) = attached.value;

        if attached.existing {
            // Toggle reference already installed by whoever created the registry
            if transfer == Transfer::Owned {
                self.foreign.unref_object(handle);
            }
            self.stats.record_rewrap();
        } else {
            if transfer == Transfer::Borrowed {
                self.foreign.ref_object(handle);
            }
            self.foreign.add_toggle_ref(handle);
            self.foreign.unref_object(handle);
            self.stats.record_wrap();
        }
        self.events.emit(BridgeEvent::Wrapped {
            handle,
            existing: attached.existing,
        });

        if fresh {
            self.arm(heap, root.gc())?;
        } else if root.get()?.lifecycle().reenter() {
            self.arm(heap, root.gc())?;
            self.stats.record_revive();
            self.events.emit(BridgeEvent::Revived { handle });
        }

        Ok(Object::new(Arc::clone(self), root))
    }

    fn arm(self: &Arc<Self>, heap: &Heap, gc: Gc<Proxy>) -> Result<()> {
        let bridge: Weak<Bridge> = Arc::downgrade(self);
        heap.set_finalizer(gc, move |heap, gc| {
            // A dropped bridge leaks whatever it still owned
            if let Some(bridge) = bridge.upgrade() {
                bridge.finalize_proxy(heap, gc);
            }
        })?;
        Ok(())
    }

    /// Finalizer body for one proxy
    fn finalize_proxy(self: &Arc<Self>, heap: &Heap, gc: Gc<Proxy>) {
        let proxy = match heap.get(gc) {
            Ok(proxy) => proxy,
            Err(err) => {
                log::debug!("finalizer for vanished proxy {}: {}", gc.id(), err);
                return;
            },
        };
        let handle = proxy.handle();

        let outcome = Coordinator::new(
            &self.tables.closures,
            &self.tables.toggles,
            &**self,
            &self.config,
        )
        .finalize(proxy.lifecycle(), handle, gc.id());

        match outcome {
            Outcome::Release => {
                self.stats.record_finalize();
                self.events.emit(BridgeEvent::Finalized { handle });
                self.foreign.remove_toggle_ref(handle);
                self.stats.record_release();
                self.events.emit(BridgeEvent::Released { handle });
            },
            Outcome::Settled => {
                self.stats.record_finalize();
                self.events.emit(BridgeEvent::Finalized { handle });
            },
            Outcome::Rearm { reason, deferrals } => {
                self.record_deferral(handle, reason, deferrals);
                if let Err(err) = self.arm(heap, gc) {
                    log::warn!("could not re-arm finalizer for {}: {}", handle, err);
                }
            },
            Outcome::Abandon { reason, deferrals } => {
                self.record_deferral(handle, reason, deferrals);
                self.stats.record_abandon();
                self.events.emit(BridgeEvent::Abandoned { handle, deferrals });
            },
            Outcome::Skipped(FinalizeState::Finalized) => {
                self.stats.record_double_finalize();
                self.events.emit(BridgeEvent::DoubleFinalize { handle });
            },
            Outcome::Skipped(state) => {
                log::debug!("finalizer for {} skipped in state {:?}", handle, state);
            },
        }
    }

    fn record_deferral(&self, handle: ForeignHandle, reason: DeferReason, deferrals: u32) {
        if reason == DeferReason::Resurrected {
            self.stats.record_resurrection();
            self.events.emit(BridgeEvent::ResurrectionDetected { handle });
        }
        self.stats.record_deferral();
        self.events.emit(BridgeEvent::Deferred {
            handle,
            reason,
            deferrals,
        });
    }

    /// Toggle notification from the foreign side
    pub fn on_toggle(&self, handle: ForeignHandle, is_last: bool) {
        self.stats.record_toggle();
        self.events.emit(BridgeEvent::Toggled {
            handle,
            additional_reference: !is_last,
        });

        let became_last = self.tables.toggles.on_toggle(handle, !is_last);
        if became_last && self.config.collect_on_last_reference {
            self.request_collection();
        }
    }

    /// Native invocation of a connected closure
    ///
    /// Returns whether a callback ran. Unknown tokens are dropped.
    pub fn dispatch(&self, handle: ForeignHandle, token: CallbackToken, args: &[Value]) -> bool {
        match dispatch::dispatch(&self.tables.closures, handle, token, args) {
            Dispatched::Called => {
                self.stats.record_dispatch();
                true
            },
            Dispatched::Dropped(_) => {
                self.stats.record_dropped_dispatch();
                self.events.emit(BridgeEvent::UnknownClosure { handle, token });
                false
            },
        }
    }

    /// The foreign side tore a closure down
    pub fn remove_callback(&self, handle: ForeignHandle, token: CallbackToken) {
        match self.tables.closures.remove(handle, token) {
            Ok(()) => {
                self.stats.record_remove();
                self.events.emit(BridgeEvent::ClosureRemoved { handle, token });
            },
            Err(Miss::Handle) => self.events.emit(BridgeEvent::UnknownHandle { handle, token }),
            Err(Miss::Token) => self.events.emit(BridgeEvent::UnknownClosure { handle, token }),
        }
    }

    /// Register a callback and bind it to a native event
    pub(crate) fn connect(
        &self,
        handle: ForeignHandle,
        event: &str,
        callback: Callback,
    ) -> Result<CallbackToken> {
        let token = self.foreign.new_closure(handle);
        self.tables.closures.register(handle, token, callback);

        if let Err(source) = self.foreign.connect_closure(handle, event, token) {
            // The token never reached the native side; drop it here
            let _ = self.tables.closures.remove(handle, token);
            return Err(BridgeError::Connect {
                handle,
                event: event.to_string(),
                token,
                source,
            });
        }

        self.stats.record_connect();
        self.events.emit(BridgeEvent::ClosureConnected {
            handle,
            token,
            event: event.to_string(),
        });
        Ok(token)
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    pub fn tables(&self) -> &Arc<SharedTables> {
        &self.tables
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Recorded events, if `record_events` is on
    pub fn events(&self) -> Option<&EventLog> {
        self.events.recorder()
    }
}

impl CollectionScheduler for Bridge {
    fn request_collection(&self) {
        self.stats.record_collection_request();
        self.heap.request_collection();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("registries", &self.tables.closures.len())
            .field("not_last", &self.tables.toggles.len())
            .field("config", &self.config)
            .finish()
    }
}
