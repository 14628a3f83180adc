//! Scoped deduplication table.
//!
//! A stack of hash tables, one per open block scope. Lookups walk from the
//! innermost scope outward, so nested blocks see the canonical entries of
//! every enclosing block; insertions always land in the innermost scope and
//! disappear with it.

use std::collections::HashMap;

/// Stack of fingerprint → candidate tables.
///
/// Buckets hold every candidate that shares a fingerprint; the caller's
/// equality check picks the match, so hash collisions never merge anything.
#[derive(Debug)]
pub struct ScopedTable<V> {
    scopes: Vec<HashMap<u64, Vec<V>>>,
}

impl<V: Copy> Default for ScopedTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Copy> ScopedTable<V> {
    /// Creates a table with no open scope.
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Opens a new innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Discards the innermost scope and everything inserted into it.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn pop_scope(&mut self) {
        self.scopes
            .pop()
            .unwrap_or_else(|| panic!("pop_scope: no open scope"));
    }

    /// Finds the first candidate under `key` accepted by `matches`,
    /// searching the innermost scope first.
    pub fn lookup(&self, key: u64, mut matches: impl FnMut(V) -> bool) -> Option<V> {
        self.scopes
            .iter()
            .rev()
            .filter_map(|scope| scope.get(&key))
            .flat_map(|bucket| bucket.iter().copied())
            .find(|&candidate| matches(candidate))
    }

    /// Records `value` under `key` in the innermost scope.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn insert(&mut self, key: u64, value: V) {
        self.scopes
            .last_mut()
            .unwrap_or_else(|| panic!("insert: no open scope"))
            .entry(key)
            .or_default()
            .push(value);
    }
}
