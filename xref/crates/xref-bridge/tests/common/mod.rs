//! Test Utilities for the bridge test suite
//!
//! [`SimObjects`] is an in-memory reference-counted object system with
//! toggle references. It behaves like the foreign libraries the bridge is
//! written for: counts include the toggle reference, toggle notifications
//! fire on the 1↔2 crossing while exactly one toggle reference is
//! installed, and an object reaching zero tears down its closures.
//!
//! The simulator never holds its own lock while calling into the bridge.

#![allow(dead_code)]

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use xref_bridge::{
    BindError, Bridge, BridgeConfig, CallbackToken, ForeignHandle, ForeignObjects, SharedTables,
    Value,
};
use xref_heap::{CollectionReport, Heap};

/// Handles are unique across the whole test binary
static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0x1000);

fn next_handle() -> ForeignHandle {
    let raw = NEXT_HANDLE.fetch_add(0x10, Ordering::Relaxed);
    ForeignHandle::from_raw(raw).expect("handle counter starts above zero")
}

#[derive(Debug, Default)]
struct SimObject {
    refs: u32,
    toggle_refs: u32,
    closures: Vec<(CallbackToken, String)>,
    destroyed: bool,
}

#[derive(Debug, Default)]
struct SimState {
    objects: FxHashMap<ForeignHandle, SimObject>,
    rejected_events: Vec<String>,
    toggle_adds: u32,
    toggle_removes: u32,
    /// Protocol violations seen by the simulator
    violations: Vec<String>,
}

/// Foreign object system simulator
#[derive(Debug, Default)]
pub struct SimObjects {
    state: Mutex<SimState>,
    bridge: RwLock<Weak<Bridge>>,
    next_token: AtomicUsize,
}

enum Notify {
    None,
    Toggle(bool),
    Destroy(Vec<CallbackToken>),
}

impl SimObjects {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_token: AtomicUsize::new(1),
            ..Default::default()
        })
    }

    pub fn connect_bridge(&self, bridge: &Arc<Bridge>) {
        *self.bridge.write() = Arc::downgrade(bridge);
    }

    fn bridge(&self) -> Option<Arc<Bridge>> {
        self.bridge.read().upgrade()
    }

    /// New object with one reference, owned by the caller
    pub fn create(&self) -> ForeignHandle {
        let handle = next_handle();
        self.state.lock().objects.insert(
            handle,
            SimObject {
                refs: 1,
                ..Default::default()
            },
        );
        handle
    }

    /// A native holder takes a reference
    pub fn native_ref(&self, handle: ForeignHandle) {
        self.increment(handle);
    }

    /// A native holder drops its reference
    pub fn native_unref(&self, handle: ForeignHandle) {
        self.decrement(handle);
    }

    /// Fire a native event; returns how many callbacks ran
    pub fn emit(&self, handle: ForeignHandle, event: &str, args: &[Value]) -> usize {
        let tokens: Vec<CallbackToken> = {
            let state = self.state.lock();
            match state.objects.get(&handle) {
                Some(object) if !object.destroyed => object
                    .closures
                    .iter()
                    .filter(|(_, name)| name == event)
                    .map(|(token, _)| *token)
                    .collect(),
                _ => Vec::new(),
            }
        };

        let Some(bridge) = self.bridge() else {
            return 0;
        };
        tokens
            .into_iter()
            .filter(|token| bridge.dispatch(handle, *token, args))
            .count()
    }

    /// Native side drops a connected closure
    pub fn disconnect(&self, handle: ForeignHandle, token: CallbackToken) {
        let found = {
            let mut state = self.state.lock();
            match state.objects.get_mut(&handle) {
                Some(object) => {
                    let before = object.closures.len();
                    object.closures.retain(|(t, _)| *t != token);
                    object.closures.len() != before
                },
                None => false,
            }
        };
        if found {
            if let Some(bridge) = self.bridge() {
                bridge.remove_callback(handle, token);
            }
        }
    }

    /// Make `connect_closure` fail for an event name
    pub fn reject_event(&self, event: &str) {
        self.state.lock().rejected_events.push(event.to_string());
    }

    pub fn refcount(&self, handle: ForeignHandle) -> u32 {
        self.state
            .lock()
            .objects
            .get(&handle)
            .map_or(0, |object| object.refs)
    }

    pub fn toggle_refs(&self, handle: ForeignHandle) -> u32 {
        self.state
            .lock()
            .objects
            .get(&handle)
            .map_or(0, |object| object.toggle_refs)
    }

    pub fn is_destroyed(&self, handle: ForeignHandle) -> bool {
        self.state
            .lock()
            .objects
            .get(&handle)
            .map_or(false, |object| object.destroyed)
    }

    pub fn closures(&self, handle: ForeignHandle) -> Vec<CallbackToken> {
        self.state
            .lock()
            .objects
            .get(&handle)
            .map(|object| object.closures.iter().map(|(token, _)| *token).collect())
            .unwrap_or_default()
    }

    pub fn toggle_adds(&self) -> u32 {
        self.state.lock().toggle_adds
    }

    pub fn toggle_removes(&self) -> u32 {
        self.state.lock().toggle_removes
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    fn increment(&self, handle: ForeignHandle) {
        let notify = {
            let mut state = self.state.lock();
            let state = &mut *state;
            match state.objects.get_mut(&handle) {
                Some(object) if !object.destroyed => {
                    object.refs += 1;
                    if object.toggle_refs == 1 && object.refs == 2 {
                        Notify::Toggle(false)
                    } else {
                        Notify::None
                    }
                },
                _ => {
                    state.violations.push(format!("ref on dead object {}", handle));
                    Notify::None
                },
            }
        };
        self.deliver(handle, notify);
    }

    fn decrement(&self, handle: ForeignHandle) {
        let notify = {
            let mut state = self.state.lock();
            let state = &mut *state;
            match state.objects.get_mut(&handle) {
                Some(object) if !object.destroyed && object.refs > 0 => {
                    object.refs -= 1;
                    if object.refs == 0 {
                        object.destroyed = true;
                        let tokens = object.closures.drain(..).map(|(token, _)| token).collect();
                        Notify::Destroy(tokens)
                    } else if object.toggle_refs == 1 && object.refs == 1 {
                        Notify::Toggle(true)
                    } else {
                        Notify::None
                    }
                },
                _ => {
                    state.violations.push(format!("unref on dead object {}", handle));
                    Notify::None
                },
            }
        };
        self.deliver(handle, notify);
    }

    fn deliver(&self, handle: ForeignHandle, notify: Notify) {
        let Some(bridge) = self.bridge() else {
            return;
        };
        match notify {
            Notify::None => {},
            Notify::Toggle(is_last) => bridge.on_toggle(handle, is_last),
            Notify::Destroy(tokens) => {
                for token in tokens {
                    bridge.remove_callback(handle, token);
                }
            },
        }
    }
}

impl ForeignObjects for SimObjects {
    fn ref_object(&self, handle: ForeignHandle) {
        self.increment(handle);
    }

    fn unref_object(&self, handle: ForeignHandle) {
        self.decrement(handle);
    }

    fn add_toggle_ref(&self, handle: ForeignHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.toggle_adds += 1;
        match state.objects.get_mut(&handle) {
            Some(object) if !object.destroyed => {
                object.refs += 1;
                object.toggle_refs += 1;
            },
            _ => state
                .violations
                .push(format!("toggle ref added to dead object {}", handle)),
        }
    }

    fn remove_toggle_ref(&self, handle: ForeignHandle) {
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            state.toggle_removes += 1;
            match state.objects.get_mut(&handle) {
                Some(object) if object.toggle_refs > 0 => object.toggle_refs -= 1,
                _ => {
                    state
                        .violations
                        .push(format!("toggle ref removed twice from {}", handle));
                    return;
                },
            }
        }

        if let Some(bridge) = self.bridge() {
            if bridge.tables().toggles().query(handle) {
                self.state
                    .lock()
                    .violations
                    .push(format!("released {} while held natively", handle));
            }
        }
        self.decrement(handle);
    }

    fn new_closure(&self, _handle: ForeignHandle) -> CallbackToken {
        let raw = self.next_token.fetch_add(1, Ordering::Relaxed);
        CallbackToken::from_raw(raw).expect("token counter starts at one")
    }

    fn connect_closure(
        &self,
        handle: ForeignHandle,
        event: &str,
        token: CallbackToken,
    ) -> Result<(), BindError> {
        let mut state = self.state.lock();
        if state.rejected_events.iter().any(|name| name == event) {
            return Err(BindError(format!("no event named '{}'", event)));
        }
        match state.objects.get_mut(&handle) {
            Some(object) if !object.destroyed => {
                object.closures.push((token, event.to_string()));
                Ok(())
            },
            _ => Err(BindError(format!("object {} is gone", handle))),
        }
    }
}

/// Bridge over a fresh heap and simulator
pub struct BridgeFixture {
    pub heap: Arc<Heap>,
    pub sim: Arc<SimObjects>,
    pub bridge: Arc<Bridge>,
}

impl BridgeFixture {
    /// Default configuration with event recording on
    pub fn new() -> Self {
        Self::with_config(BridgeConfig {
            record_events: true,
            ..Default::default()
        })
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let heap = Heap::new();
        let sim = SimObjects::new();
        let bridge = Bridge::new(sim.clone(), heap.clone(), config)
            .expect("bridge initialization should succeed with valid config");
        sim.connect_bridge(&bridge);
        Self { heap, sim, bridge }
    }

    /// Bridge over existing tables, e.g. [`SharedTables::global`]
    pub fn with_tables(tables: Arc<SharedTables>, config: BridgeConfig) -> Self {
        let heap = Heap::new();
        let sim = SimObjects::new();
        let bridge = Bridge::with_tables(tables, sim.clone(), heap.clone(), config)
            .expect("bridge initialization should succeed with valid config");
        sim.connect_bridge(&bridge);
        Self { heap, sim, bridge }
    }

    pub fn collect(&self) -> CollectionReport {
        self.heap.collect()
    }

    /// Collect until a pass runs no finalizer, up to `max` passes
    pub fn collect_until_quiet(&self, max: usize) -> usize {
        for pass in 1..=max {
            if self.heap.collect().finalizers_run == 0 {
                return pass;
            }
        }
        max
    }

    pub fn events(&self) -> &xref_bridge::EventLog {
        self.bridge
            .events()
            .expect("fixture bridges record events")
    }
}
