use std::fmt;

use parking_lot::RwLock;
use slotmap::{Key, KeyData, SlotMap};

slotmap::new_key_type! {
    struct SlotKey;
}

/// Opaque identifier of a live bridge object.
///
/// Encodes the slot index in the low 32 bits and the slot version in the high
/// 32 bits. Live versions are always odd, so `0` is never a valid handle and can
/// be used as the "no handle" value on the C side.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Never refers to a live object.
    pub const NULL: Handle = Handle(0);

    /// Reconstructs a handle received from a foreign caller.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value handed to foreign callers.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    fn from_key(key: SlotKey) -> Self {
        Self(key.data().as_ffi())
    }

    /// `KeyData::from_ffi` forces the version odd, which would let a forged
    /// even-versioned value alias a live slot. Reject those up front.
    fn key(self) -> Option<SlotKey> {
        let version = (self.0 >> 32) as u32;
        if version & 1 == 0 {
            return None;
        }
        Some(SlotKey::from(KeyData::from_ffi(self.0)))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Thread-safe registry mapping handles to live objects.
///
/// `T` is normally a cheap clone (an `Arc`): `get` hands out a clone taken under
/// the read lock, `remove` takes the entry out under the write lock. A `get` that
/// loses the race against a concurrent `remove` therefore observes `None`, while
/// a `get` that won keeps the object alive through its clone until it is done.
pub struct HandleTable<T> {
    slots: RwLock<SlotMap<SlotKey, T>>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(SlotMap::with_key()),
        }
    }

    /// Stores `value` and returns its new handle.
    pub fn insert(&self, value: T) -> Handle {
        Handle::from_key(self.slots.write().insert(value))
    }

    /// Stores the value built by `f`, which receives the handle it will live under.
    pub fn insert_with(&self, f: impl FnOnce(Handle) -> T) -> Handle {
        let key = self
            .slots
            .write()
            .insert_with_key(|key| f(Handle::from_key(key)));
        Handle::from_key(key)
    }

    /// Removes and returns the object behind `handle`.
    ///
    /// The single authorized release path. A second call with the same handle
    /// returns `None`.
    pub fn remove(&self, handle: Handle) -> Option<T> {
        let key = handle.key()?;
        self.slots.write().remove(key)
    }

    /// Removes the object only if `pred` accepts it, atomically with the check.
    pub fn remove_if(&self, handle: Handle, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let key = handle.key()?;
        let mut slots = self.slots.write();
        if !pred(slots.get(key)?) {
            return None;
        }
        slots.remove(key)
    }

    /// Takes every live object out of the table.
    pub fn drain(&self) -> Vec<(Handle, T)> {
        self.slots
            .write()
            .drain()
            .map(|(key, value)| (Handle::from_key(key), value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl<T: Clone> HandleTable<T> {
    /// Returns a clone of the object behind `handle`, if it is still live.
    pub fn get(&self, handle: Handle) -> Option<T> {
        let key = handle.key()?;
        self.slots.read().get(key).cloned()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
