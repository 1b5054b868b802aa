//! Result store abstraction.

use std::collections::HashMap;

use crate::core::CacheError;
use crate::util::serde::{CacheKey, ExecutionRef};

/// Abstraction for result cache backends.
///
/// Implementations are internally synchronized: every method takes `&self`
/// and may be called concurrently from completion callbacks.
pub trait ResultStore<V>: Send + Sync {
    /// Insert or replace the value stored under `(source, reference)`.
    fn put(&self, source: &str, reference: ExecutionRef, value: V) -> Result<(), CacheError>;
    /// Point lookup. No side effects.
    fn get(&self, source: &str, reference: ExecutionRef) -> Option<V>;
    /// Remove one entry. Returns whether it existed.
    fn remove(&self, source: &str, reference: ExecutionRef) -> bool;
    /// Remove every entry.
    fn clear(&self);
    /// Owned copy of all entries, detached from the store.
    fn snapshot(&self) -> HashMap<CacheKey, V>;
    /// Live entry count.
    fn len(&self) -> usize;
    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
