//! Opaque identities crossing the bridge, and marshalled callback arguments.

use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// Identity of an object living in the foreign heap
///
/// Usually the object's address. The bridge never dereferences it; it is a
/// map key and the argument passed back to the foreign collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForeignHandle(NonZeroUsize);

impl ForeignHandle {
    /// Returns `None` for a null address
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::from_raw(ptr as usize)
    }

    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Identity of one callback binding, allocated by the foreign collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallbackToken(NonZeroUsize);

impl CallbackToken {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::from_raw(ptr as usize)
    }

    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Argument value marshalled by the foreign side for a callback invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ForeignHandle),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ForeignHandle> {
        match self {
            Value::Object(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ForeignHandle> for Value {
    fn from(h: ForeignHandle) -> Self {
        Value::Object(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_not_a_handle() {
        assert!(ForeignHandle::from_raw(0).is_none());
        assert!(ForeignHandle::from_ptr(std::ptr::null::<u8>()).is_none());
        assert!(CallbackToken::from_raw(0).is_none());
    }

    #[test]
    fn test_handle_round_trips_raw_address() {
        let h = ForeignHandle::from_raw(0x1000).unwrap();
        assert_eq!(h.as_raw(), 0x1000);
        assert_eq!(h.to_string(), "0x1000");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
        assert_eq!(Value::None.as_bool(), None);
    }
}
