//! Managed object identities.
//!
//! An [`ObjectId`] names a heap slot plus the generation of the object that
//! lives in it, so an id outliving its object never aliases a newer one.
//! [`Gc<T>`] is the typed, `Copy` form used inside managed values; it is a
//! traced edge when reached from a managed value and an invisible one when
//! captured anywhere else (closures, side tables).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Untyped identity of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjectId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the heap arena
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this object was allocated
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Typed managed pointer
///
/// Holding a `Gc<T>` does not keep the object alive by itself; it only
/// counts when the collector reaches it through [`crate::Trace`] from a root.
pub struct Gc<T> {
    id: ObjectId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Gc<T> {
    /// Reinterpret an untyped id. Access still checks the stored type.
    pub fn from_id(id: ObjectId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Gc<T> {}

impl<T> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gc<{}>({})", std::any::type_name::<T>(), self.id)
    }
}
