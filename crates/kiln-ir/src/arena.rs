//! Slot-based storage with typed handles.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed handle into an [`Arena`].
///
/// Handles are lightweight identifiers (u32 index) that stay stable for the
/// lifetime of the arena. Removing a value never renumbers the others.
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    /// Creates a new handle from a zero-based index.
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An arena of removable slots with typed [`Handle`]-based access.
///
/// Indexing a removed slot panics: a handle that outlives its value is an
/// IR contract violation, not a recoverable condition.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Returns the number of live elements in the arena.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the arena contains no live elements.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the number of slots ever allocated, live or removed.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            panic!("arena overflow: {} items exceeds u32::MAX", self.slots.len())
        });
        self.slots.push(Some(value));
        self.live += 1;
        Handle::new(index)
    }

    /// Removes a value, returning it.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already removed or never allocated.
    pub fn remove(&mut self, handle: Handle<T>) -> T {
        let value = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("removal of dead arena slot {handle:?}"));
        self.live -= 1;
        value
    }

    /// Returns `true` if the handle refers to a live value.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        matches!(self.slots.get(handle.index()), Some(Some(_)))
    }

    /// Returns a reference to the value if the handle is live.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    /// Iterates over `(handle, &value)` pairs of live values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        // Safety: arena size bounded by u32::MAX (enforced in append)
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (Handle::new(i as u32), v)))
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        self.try_get(handle)
            .unwrap_or_else(|| panic!("use of removed arena slot {handle:?}"))
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("use of removed arena slot {handle:?}"))
    }
}
