//! Ripple Value Store
//!
//! The set of broadcast values a node has accepted. Membership is the only
//! fact retained: no counts, no timestamps, no origin.
//!
//! The store is the fan-out guard for the whole mesh. [`ValueStore::add_if_new`]
//! reports `true` to exactly one caller per value, so a value that arrives
//! from several neighbors at once is relayed by this node only once.

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::RwLock;

/// A broadcast value as carried on the wire.
pub type BroadcastValue = i64;

/// Thread-safe set of previously seen values.
///
/// Grows monotonically; nothing is ever removed.
#[derive(Debug)]
pub struct ValueStore<V = BroadcastValue> {
    values: RwLock<HashSet<V>>,
}

impl<V> Default for ValueStore<V> {
    fn default() -> Self {
        Self {
            values: RwLock::new(HashSet::new()),
        }
    }
}

impl<V> ValueStore<V>
where
    V: Eq + Hash + Clone,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value.
    ///
    /// Returns true iff the value was not already present. The check and the
    /// insert happen under one write lock, so concurrent callers racing on
    /// the same value see exactly one `true`.
    pub fn add_if_new(&self, value: V) -> bool {
        self.values.write().insert(value)
    }

    /// Whether the value has been seen.
    pub fn contains(&self, value: &V) -> bool {
        self.values.read().contains(value)
    }

    /// All values seen so far, in no particular order.
    pub fn snapshot(&self) -> Vec<V> {
        self.values.read().iter().cloned().collect()
    }

    /// Number of distinct values seen.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
