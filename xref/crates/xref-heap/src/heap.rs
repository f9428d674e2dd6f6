//! Heap - slot arena with mark-sweep collection and re-armable finalizers.
//!
//! Objects are type-erased values stored in generational slots. A collection
//! pass marks everything reachable from rooted objects, then gives every
//! unreachable object that still has a finalizer one more cycle: the
//! finalizer is taken (it runs at most once per arming), the object and
//! everything it reaches are kept, and the finalizer runs after the heap lock
//! is released. A finalizer that wants another look calls
//! [`Heap::set_finalizer`] again; otherwise the object is swept by the next
//! pass that finds it unreachable.
//!
//! # Lock Discipline
//!
//! The heap lock is never held while user code runs: finalizers and the
//! destructors of swept values both run after it is released, so either may
//! freely drop roots or touch the heap again. Whole passes, finalizers
//! included, are serialized; a finalizer must not call [`Heap::collect`].

use crate::error::{HeapError, Result};
use crate::ptr::{Gc, ObjectId};
use crate::trace::{Trace, Tracer};
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;
type TraceFn = fn(&(dyn Any + Send + Sync), &mut Tracer);
type FinalizerFn = Box<dyn FnOnce(&Heap, ObjectId) + Send>;

fn trace_erased<T: Trace + 'static>(value: &(dyn Any + Send + Sync), tracer: &mut Tracer) {
    if let Some(value) = value.downcast_ref::<T>() {
        value.trace(tracer);
    }
}

/// Managed-side half of the collection contract
///
/// `request_collection` is best effort: it asks for another pass soon and
/// never blocks waiting for one.
pub trait CollectionScheduler: Send + Sync {
    fn request_collection(&self);
}

struct Object {
    value: Value,
    trace: TraceFn,
    roots: usize,
    marked: bool,
    finalizer: Option<FinalizerFn>,
}

struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Default)]
struct HeapInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    cycle: u64,
}

impl HeapInner {
    fn object(&self, id: ObjectId) -> Result<&Object> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_ref())
            .ok_or(HeapError::DeadObject { id })
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_mut())
            .ok_or(HeapError::DeadObject { id })
    }

    fn insert(&mut self, object: Object) -> ObjectId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectId::new(index, 0)
    }

    /// Drain the work list, marking and tracing. Returns newly marked count.
    fn mark(&mut self, tracer: &mut Tracer) -> usize {
        let mut count = 0;
        while let Some(id) = tracer.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            let Some(object) = slot.object.as_mut() else {
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            count += 1;
            (object.trace)(&*object.value, tracer);
        }
        count
    }
}

/// Outcome of one collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub cycle: u64,
    /// Objects reachable from roots
    pub reachable: usize,
    /// Unreachable objects kept alive for their finalizers (and what they reach)
    pub resurrected: usize,
    pub freed: usize,
    pub finalizers_run: usize,
    /// Objects left after sweeping
    pub live: usize,
}

/// Cumulative heap counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    pub allocated: u64,
    pub freed: u64,
    pub collections: u64,
    pub finalizers_run: u64,
    pub collection_requests: u64,
}

#[derive(Default)]
struct HeapCounters {
    allocated: AtomicU64,
    freed: AtomicU64,
    collections: AtomicU64,
    finalizers_run: AtomicU64,
    collection_requests: AtomicU64,
}

/// The managed heap
pub struct Heap {
    inner: Mutex<HeapInner>,
    /// Held for a whole pass
    pass: Mutex<()>,
    /// Requests since the last pass started
    pending: AtomicU64,
    waker: Mutex<Option<Sender<()>>>,
    counters: HeapCounters,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HeapInner::default()),
            pass: Mutex::new(()),
            pending: AtomicU64::new(0),
            waker: Mutex::new(None),
            counters: HeapCounters::default(),
        })
    }

    /// Allocate a value and return it rooted
    pub fn alloc<T>(self: &Arc<Self>, value: T) -> Root<T>
    where
        T: Trace + Send + Sync + 'static,
    {
        let object = Object {
            value: Arc::new(value),
            trace: trace_erased::<T>,
            roots: 1,
            marked: false,
            finalizer: None,
        };
        let id = self.inner.lock().insert(object);
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        log::trace!("allocated {} as {}", std::any::type_name::<T>(), id);

        Root {
            heap: Arc::clone(self),
            gc: Gc::from_id(id),
        }
    }

    /// Borrow a live object's value
    pub fn get<T>(&self, gc: Gc<T>) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = Arc::clone(&self.inner.lock().object(gc.id())?.value);
        value.downcast::<T>().map_err(|_| HeapError::TypeMismatch {
            id: gc.id(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Add a root to a live object
    ///
    /// Rooting an object whose finalizer is pending or running is allowed;
    /// that is how a finalizable object gets resurrected.
    pub fn root<T: 'static>(self: &Arc<Self>, gc: Gc<T>) -> Result<Root<T>> {
        {
            let mut inner = self.inner.lock();
            let object = inner.object_mut(gc.id())?;
            if !object.value.is::<T>() {
                return Err(HeapError::TypeMismatch {
                    id: gc.id(),
                    expected: std::any::type_name::<T>(),
                });
            }
            object.roots += 1;
        }

        Ok(Root {
            heap: Arc::clone(self),
            gc,
        })
    }

    fn retain_root(&self, id: ObjectId) {
        if let Ok(object) = self.inner.lock().object_mut(id) {
            object.roots += 1;
        }
    }

    fn release_root(&self, id: ObjectId) {
        if let Ok(object) = self.inner.lock().object_mut(id) {
            object.roots = object.roots.saturating_sub(1);
        }
    }

    /// Arm (or replace) the finalizer of an object
    ///
    /// The finalizer runs once, on the first pass that finds the object
    /// unreachable. Call again from inside the finalizer to re-arm it.
    pub fn set_finalizer<T, F>(&self, gc: Gc<T>, finalizer: F) -> Result<()>
    where
        T: 'static,
        F: FnOnce(&Heap, Gc<T>) + Send + 'static,
    {
        let boxed: FinalizerFn = Box::new(move |heap, id| finalizer(heap, Gc::from_id(id)));
        let previous = {
            let mut inner = self.inner.lock();
            inner.object_mut(gc.id())?.finalizer.replace(boxed)
        };
        drop(previous);
        Ok(())
    }

    pub fn has_finalizer<T>(&self, gc: Gc<T>) -> bool {
        self.inner
            .lock()
            .object(gc.id())
            .map(|object| object.finalizer.is_some())
            .unwrap_or(false)
    }

    /// Whether `id` still names a live object
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.inner.lock().object(id).is_ok()
    }

    /// Number of live objects
    pub fn live_objects(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.object.is_some())
            .count()
    }

    /// Collection requests received since the last pass started
    pub fn pending_requests(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Run a full mark-sweep pass
    pub fn collect(&self) -> CollectionReport {
        let _pass = self.pass.lock();
        self.pending.store(0, Ordering::Release);

        let (garbage, ready, mut report) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.cycle += 1;

            let mut tracer = Tracer::new();
            for (index, slot) in inner.slots.iter_mut().enumerate() {
                if let Some(object) = slot.object.as_mut() {
                    object.marked = false;
                    if object.roots > 0 {
                        tracer.push(ObjectId::new(index as u32, slot.generation));
                    }
                }
            }
            let reachable = inner.mark(&mut tracer);

            let mut ready = Vec::new();
            for (index, slot) in inner.slots.iter_mut().enumerate() {
                let generation = slot.generation;
                let Some(object) = slot.object.as_mut() else {
                    continue;
                };
                if object.marked {
                    continue;
                }
                if let Some(finalizer) = object.finalizer.take() {
                    let id = ObjectId::new(index as u32, generation);
                    tracer.push(id);
                    ready.push((id, finalizer));
                }
            }
            let resurrected = inner.mark(&mut tracer);

            let mut garbage = Vec::new();
            for (index, slot) in inner.slots.iter_mut().enumerate() {
                let dead = matches!(&slot.object, Some(object) if !object.marked);
                if dead {
                    if let Some(object) = slot.object.take() {
                        garbage.push(object.value);
                    }
                    slot.generation = slot.generation.wrapping_add(1);
                    inner.free.push(index as u32);
                }
            }

            let live = inner
                .slots
                .iter()
                .filter(|slot| slot.object.is_some())
                .count();

            let report = CollectionReport {
                cycle: inner.cycle,
                reachable,
                resurrected,
                freed: garbage.len(),
                finalizers_run: 0,
                live,
            };
            (garbage, ready, report)
        };

        drop(garbage);

        report.finalizers_run = ready.len();
        for (id, finalizer) in ready {
            log::trace!("running finalizer for {}", id);
            finalizer(self, id);
        }

        self.counters.collections.fetch_add(1, Ordering::Relaxed);
        self.counters
            .freed
            .fetch_add(report.freed as u64, Ordering::Relaxed);
        self.counters
            .finalizers_run
            .fetch_add(report.finalizers_run as u64, Ordering::Relaxed);

        log::debug!(
            "collection {}: {} reachable, {} resurrected, {} freed, {} finalizers",
            report.cycle,
            report.reachable,
            report.resurrected,
            report.freed,
            report.finalizers_run
        );

        report
    }

    /// Run a pass only if someone asked for one
    pub fn collect_if_requested(&self) -> Option<CollectionReport> {
        if self.pending_requests() > 0 {
            Some(self.collect())
        } else {
            None
        }
    }

    pub(crate) fn set_waker(&self, waker: Option<Sender<()>>) {
        *self.waker.lock() = waker;
    }

    /// Snapshot of cumulative counters
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            freed: self.counters.freed.load(Ordering::Relaxed),
            collections: self.counters.collections.load(Ordering::Relaxed),
            finalizers_run: self.counters.finalizers_run.load(Ordering::Relaxed),
            collection_requests: self.counters.collection_requests.load(Ordering::Relaxed),
        }
    }
}

impl CollectionScheduler for Heap {
    fn request_collection(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.counters
            .collection_requests
            .fetch_add(1, Ordering::Relaxed);
        if let Some(waker) = self.waker.lock().as_ref() {
            let _ = waker.try_send(());
        }
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live_objects", &self.live_objects())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

/// RAII root: the object stays alive while any `Root` to it exists
pub struct Root<T> {
    heap: Arc<Heap>,
    gc: Gc<T>,
}

impl<T> Root<T> {
    /// Unrooted pointer to the same object
    pub fn gc(&self) -> Gc<T> {
        self.gc
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }
}

impl<T: Send + Sync + 'static> Root<T> {
    pub fn get(&self) -> Result<Arc<T>> {
        self.heap.get(self.gc)
    }
}

impl<T> Clone for Root<T> {
    fn clone(&self) -> Self {
        self.heap.retain_root(self.gc.id());
        Self {
            heap: Arc::clone(&self.heap),
            gc: self.gc,
        }
    }
}

impl<T> Drop for Root<T> {
    fn drop(&mut self) {
        self.heap.release_root(self.gc.id());
    }
}

impl<T> fmt::Debug for Root<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.gc).finish()
    }
}
