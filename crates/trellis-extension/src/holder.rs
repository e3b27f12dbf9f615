//! One-slot lazily-populated cell with publish-once semantics.

use parking_lot::RwLock;

/// A cell backing double-checked instance creation.
///
/// Readers take the shared lock; the first writer initializes the slot while
/// holding the exclusive lock, so concurrent initializers of the same holder
/// serialize and observe a single published value.
pub struct Holder<V> {
    slot: RwLock<Option<V>>,
}

impl<V: Clone> Holder<V> {
    /// Creates an empty holder.
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Returns the published value, if any.
    pub fn get(&self) -> Option<V> {
        self.slot.read().clone()
    }

    /// Publishes a value, replacing any previous one.
    pub fn set(&self, value: V) {
        *self.slot.write() = Some(value);
    }

    /// Empties the holder.
    pub(crate) fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Returns the published value, initializing it with `init` when empty.
    ///
    /// `init` runs at most once per published value, under the holder's
    /// exclusive lock.
    pub fn get_or_init(&self, init: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get() {
            return v;
        }
        let mut slot = self.slot.write();
        if let Some(v) = slot.as_ref() {
            return v.clone();
        }
        let value = init();
        *slot = Some(value.clone());
        value
    }

    /// Fallible [`get_or_init`](Self::get_or_init): a failed `init` leaves
    /// the holder empty so a later call may retry.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(v) = self.get() {
            return Ok(v);
        }
        let mut slot = self.slot.write();
        if let Some(v) = slot.as_ref() {
            return Ok(v.clone());
        }
        let value = init()?;
        *slot = Some(value.clone());
        Ok(value)
    }
}

impl<V: Clone> Default for Holder<V> {
    fn default() -> Self {
        Self::new()
    }
}
