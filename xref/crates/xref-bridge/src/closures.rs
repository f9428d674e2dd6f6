//! Closure Registry - per-object callback tables.
//!
//! Every wrapped foreign object has one [`ClosureRegistry`] mapping callback
//! tokens to managed callbacks. Registries live in an arena owned by the
//! process-wide [`ClosureTable`] and are reached by handle (from the foreign
//! side) or by [`RegistryId`] (from the proxy). Neither path is a traced
//! edge, so a callback that captures its own proxy does not keep that proxy
//! reachable.
//!
//! # Concurrency
//!
//! One lock guards the whole table: registry creation, resurrection marking,
//! registration, lookup and removal are totally ordered. Callbacks are cloned
//! out before being called and dropped only after the lock is released, so
//! user code never runs under it.

use crate::handle::{CallbackToken, ForeignHandle, Value};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use xref_heap::ObjectId;

/// Managed callback bound to a native event
pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Arena index of a registry. Stale ids never match a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId {
    index: u32,
    generation: u32,
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}v{}", self.index, self.generation)
    }
}

/// Why a lookup found nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    /// No registry for the handle: already released
    Handle,
    /// Registry exists but the token was removed
    Token,
}

/// Callbacks of one foreign object
pub struct ClosureRegistry {
    callbacks: FxHashMap<CallbackToken, Callback>,
    owner: ForeignHandle,
    resurrected: bool,
    proxy: Option<ObjectId>,
}

impl ClosureRegistry {
    fn new(owner: ForeignHandle) -> Self {
        Self {
            callbacks: FxHashMap::default(),
            owner,
            resurrected: false,
            proxy: None,
        }
    }

    pub fn owner(&self) -> ForeignHandle {
        self.owner
    }

    pub fn is_resurrected(&self) -> bool {
        self.resurrected
    }

    /// Managed proxy currently bound to this registry
    pub fn proxy(&self) -> Option<ObjectId> {
        self.proxy
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn tokens(&self) -> Vec<CallbackToken> {
        let mut tokens: Vec<_> = self.callbacks.keys().copied().collect();
        tokens.sort();
        tokens
    }

    pub(crate) fn set_proxy(&mut self, proxy: ObjectId) {
        self.proxy = Some(proxy);
    }

    /// Read and reset the resurrected flag
    pub(crate) fn take_resurrected(&mut self) -> bool {
        std::mem::replace(&mut self.resurrected, false)
    }

    /// Drop every binding. Returned so the caller can drop them unlocked.
    pub(crate) fn clear(&mut self) -> FxHashMap<CallbackToken, Callback> {
        std::mem::take(&mut self.callbacks)
    }
}

impl fmt::Debug for ClosureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureRegistry")
            .field("owner", &self.owner)
            .field("tokens", &self.tokens())
            .field("resurrected", &self.resurrected)
            .field("proxy", &self.proxy)
            .finish()
    }
}

struct ArenaSlot {
    generation: u32,
    registry: Option<ClosureRegistry>,
}

/// Table contents, reachable only through [`ClosureTable::lock`]
#[derive(Default)]
pub(crate) struct TableInner {
    by_handle: FxHashMap<ForeignHandle, RegistryId>,
    arena: Vec<ArenaSlot>,
    free: Vec<u32>,
}

impl TableInner {
    pub(crate) fn id_of(&self, handle: ForeignHandle) -> Option<RegistryId> {
        self.by_handle.get(&handle).copied()
    }

    fn slot(&self, id: RegistryId) -> Option<&ClosureRegistry> {
        self.arena
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.registry.as_ref())
    }

    fn slot_mut(&mut self, id: RegistryId) -> Option<&mut ClosureRegistry> {
        self.arena
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.registry.as_mut())
    }

    pub(crate) fn get(&self, handle: ForeignHandle) -> Option<&ClosureRegistry> {
        let id = self.id_of(handle)?;
        self.slot(id)
    }

    pub(crate) fn get_mut(&mut self, handle: ForeignHandle) -> Option<&mut ClosureRegistry> {
        let id = self.id_of(handle)?;
        self.slot_mut(id)
    }

    /// Existing registry for `handle`, or a fresh one. `bool` is "created".
    pub(crate) fn get_or_create(&mut self, handle: ForeignHandle) -> (RegistryId, bool) {
        if let Some(id) = self.id_of(handle) {
            return (id, false);
        }

        let registry = ClosureRegistry::new(handle);
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.arena[index as usize];
                slot.registry = Some(registry);
                RegistryId {
                    index,
                    generation: slot.generation,
                }
            },
            None => {
                let index = self.arena.len() as u32;
                self.arena.push(ArenaSlot {
                    generation: 0,
                    registry: Some(registry),
                });
                RegistryId {
                    index,
                    generation: 0,
                }
            },
        };
        self.by_handle.insert(handle, id);
        (id, true)
    }

    pub(crate) fn registry_mut(&mut self, id: RegistryId) -> Option<&mut ClosureRegistry> {
        self.slot_mut(id)
    }

    /// Remove the handle's table entry and free its arena slot
    pub(crate) fn evict(&mut self, handle: ForeignHandle) -> Option<ClosureRegistry> {
        let id = self.by_handle.remove(&handle)?;
        let slot = self.arena.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let registry = slot.registry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        registry
    }

    pub(crate) fn len(&self) -> usize {
        self.by_handle.len()
    }
}

/// Result of [`ClosureTable::attach`]
#[derive(Debug)]
pub struct Attached<R> {
    pub value: R,
    pub registry: RegistryId,
    /// The registry was already there (re-wrap); it is now marked resurrected
    pub existing: bool,
}

/// Process-wide handle → registry table
#[derive(Default)]
pub struct ClosureTable {
    inner: Mutex<TableInner>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock()
    }

    /// Re-wrapping lookup: find or create the registry and bind a proxy to it
    ///
    /// An existing registry is marked resurrected. `bind` receives the
    /// registry id and the proxy currently bound to it (if any) and returns
    /// the proxy to bind from now on; it runs under the table lock and must
    /// not call back into the table. If `bind` fails on a fresh registry,
    /// the registry is removed again.
    pub fn attach<R, E>(
        &self,
        handle: ForeignHandle,
        bind: impl FnOnce(RegistryId, Option<ObjectId>) -> Result<(R, ObjectId), E>,
    ) -> Result<Attached<R>, E> {
        let mut inner = self.inner.lock();
        let (id, created) = inner.get_or_create(handle);

        let previous = match inner.registry_mut(id) {
            Some(registry) => {
                if !created {
                    registry.resurrected = true;
                }
                registry.proxy
            },
            None => None,
        };

        match bind(id, previous) {
            Ok((value, proxy)) => {
                if let Some(registry) = inner.registry_mut(id) {
                    registry.set_proxy(proxy);
                }
                Ok(Attached {
                    value,
                    registry: id,
                    existing: !created,
                })
            },
            Err(err) => {
                let evicted = if created { inner.evict(handle) } else { None };
                drop(inner);
                drop(evicted);
                Err(err)
            },
        }
    }

    /// Bind a callback, creating the registry on first use
    ///
    /// Does not mark an existing registry resurrected.
    pub fn register(
        &self,
        handle: ForeignHandle,
        token: CallbackToken,
        callback: Callback,
    ) -> RegistryId {
        let (id, replaced) = {
            let mut inner = self.inner.lock();
            let (id, _) = inner.get_or_create(handle);
            let replaced = inner
                .registry_mut(id)
                .and_then(|registry| registry.callbacks.insert(token, callback));
            (id, replaced)
        };
        drop(replaced);
        id
    }

    /// Clone out the callback for a token
    pub fn lookup(&self, handle: ForeignHandle, token: CallbackToken) -> Result<Callback, Miss> {
        let inner = self.inner.lock();
        let registry = inner.get(handle).ok_or(Miss::Handle)?;
        registry.callbacks.get(&token).cloned().ok_or(Miss::Token)
    }

    /// Delete one binding after the foreign side tore it down
    pub fn remove(&self, handle: ForeignHandle, token: CallbackToken) -> Result<(), Miss> {
        let removed = {
            let mut inner = self.inner.lock();
            let registry = inner.get_mut(handle).ok_or(Miss::Handle)?;
            registry.callbacks.remove(&token).ok_or(Miss::Token)?
        };
        drop(removed);
        Ok(())
    }

    pub fn contains(&self, handle: ForeignHandle) -> bool {
        self.inner.lock().id_of(handle).is_some()
    }

    pub fn registry_of(&self, handle: ForeignHandle) -> Option<RegistryId> {
        self.inner.lock().id_of(handle)
    }

    /// Tokens currently bound on a handle, sorted
    pub fn tokens(&self, handle: ForeignHandle) -> Vec<CallbackToken> {
        self.inner
            .lock()
            .get(handle)
            .map(ClosureRegistry::tokens)
            .unwrap_or_default()
    }

    pub fn is_resurrected(&self, handle: ForeignHandle) -> bool {
        self.inner
            .lock()
            .get(handle)
            .map_or(false, ClosureRegistry::is_resurrected)
    }

    /// Number of handles with a registry
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ClosureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureTable")
            .field("registries", &self.len())
            .finish()
    }
}
