//! Tracing - reachability edges between managed values.
//!
//! Marking starts from rooted objects and follows every [`Gc`] a value
//! reports through [`Trace::trace`]. Anything a value does not report is
//! invisible to the collector, which is how side tables keyed by raw ids
//! avoid keeping their targets alive.

use crate::ptr::{Gc, ObjectId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize};

/// Work list filled while tracing a value
#[derive(Debug, Default)]
pub struct Tracer {
    pending: Vec<ObjectId>,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Report an edge to a managed object
    pub fn edge<T>(&mut self, gc: Gc<T>) {
        self.pending.push(gc.id());
    }

    pub(crate) fn push(&mut self, id: ObjectId) {
        self.pending.push(id);
    }

    pub(crate) fn pop(&mut self) -> Option<ObjectId> {
        self.pending.pop()
    }
}

/// Values that can live in the managed heap
pub trait Trace {
    /// Report every managed edge held by this value
    fn trace(&self, tracer: &mut Tracer);
}

impl<T> Trace for Gc<T> {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.edge(*self);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(value) = self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut Tracer) {
        for value in self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for VecDeque<T> {
    fn trace(&self, tracer: &mut Tracer) {
        for value in self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Box<T> {
    fn trace(&self, tracer: &mut Tracer) {
        (**self).trace(tracer);
    }
}

impl<K, V: Trace, S> Trace for HashMap<K, V, S> {
    fn trace(&self, tracer: &mut Tracer) {
        for value in self.values() {
            value.trace(tracer);
        }
    }
}

impl<K, V: Trace> Trace for BTreeMap<K, V> {
    fn trace(&self, tracer: &mut Tracer) {
        for value in self.values() {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for parking_lot::Mutex<T> {
    fn trace(&self, tracer: &mut Tracer) {
        self.lock().trace(tracer);
    }
}

impl<T: Trace> Trace for parking_lot::RwLock<T> {
    fn trace(&self, tracer: &mut Tracer) {
        self.read().trace(tracer);
    }
}

macro_rules! impl_leaf_trace {
    ($($t:ty),* $(,)?) => {
        $(
            impl Trace for $t {
                #[inline]
                fn trace(&self, _tracer: &mut Tracer) {}
            }
        )*
    };
}

// Leaves carry no managed edges
impl_leaf_trace!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    f32,
    f64,
    String,
    &'static str,
    AtomicBool,
    AtomicU32,
    AtomicU64,
    AtomicUsize,
    AtomicI64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containers_report_every_edge() {
        let a: Gc<u32> = Gc::from_id(ObjectId::new(1, 0));
        let b: Gc<u32> = Gc::from_id(ObjectId::new(2, 0));
        let value = vec![Some(a), None, Some(b)];

        let mut tracer = Tracer::new();
        value.trace(&mut tracer);

        let mut seen = Vec::new();
        while let Some(id) = tracer.pop() {
            seen.push(id);
        }
        seen.sort();
        assert_eq!(seen, vec![a.id(), b.id()]);
    }

    #[test]
    fn test_leaves_report_nothing() {
        let mut tracer = Tracer::new();
        42u64.trace(&mut tracer);
        String::from("leaf").trace(&mut tracer);
        assert!(tracer.pop().is_none());
    }
}
