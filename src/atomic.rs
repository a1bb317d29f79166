use parking_lot::RwLock;
use std::fmt::Debug;

/// A value protected by a reader-writer lock, where every access is a
/// single short borrow.
///
/// This is the value half of a [Store](crate::Store)'s state: the
/// ordering of whole transitions is provided by an
/// [RwQueue](crate::RwQueue), while [Atomic] only guarantees that a
/// reader never observes a partially written value.
///
/// The closures passed to [Atomic::modify()] and [Atomic::with()]
/// must not access the same [Atomic] again.
pub struct Atomic<T> {
    value: RwLock<T>,
}

impl<T> Atomic<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
    }

    /// Replace the value, returning the previous one.
    pub fn swap(&self, value: T) -> T {
        std::mem::replace(&mut *self.value.write(), value)
    }

    /// Mutate the value in place under the write lock.
    pub fn modify<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        f(&mut *self.value.write())
    }

    /// Inspect the value under the read lock.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
        f(&*self.value.read())
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> Atomic<T> {
    /// Get a snapshot of the value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: Default> Default for Atomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug> Debug for Atomic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with(|value| f.debug_tuple("Atomic").field(value).finish())
    }
}
