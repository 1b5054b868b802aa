//! In-memory result cache with batch eviction by issue time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::config::CacheConfig;
use crate::core::{CacheError, ResultStore};
use crate::util::serde::{CacheKey, ExecutionRef};

struct CacheEntry<V> {
    value: V,
    /// Insertion order, used to break ties between equal issue times.
    sequence: u64,
}

/// Capacity-bounded in-memory cache keyed by `(source, reference)`.
///
/// Whenever an insert pushes the entry count above `capacity`, the oldest
/// entries by issue time are removed until `low_water_mark` remain. The
/// insert and its eviction run under one write guard, so concurrent writers
/// never observe or produce a partially evicted map.
pub struct InMemoryResultCache<V> {
    capacity: usize,
    low_water_mark: usize,
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    sequence: AtomicU64,
    evicted: AtomicU64,
}

impl<V> InMemoryResultCache<V> {
    /// Create a cache from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if `capacity` is zero or
    /// `low_water_mark` exceeds it.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate().map_err(CacheError::InvalidConfig)?;
        Ok(Self {
            capacity: config.capacity,
            low_water_mark: config.low_water_mark,
            entries: RwLock::new(HashMap::with_capacity(config.capacity + 1)),
            sequence: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    /// Maximum live entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries left after a batch eviction.
    #[must_use]
    pub const fn low_water_mark(&self) -> usize {
        self.low_water_mark
    }

    /// Total entries removed by eviction since creation.
    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Insert under an explicit key.
    ///
    /// If an entry with the same `(source, reference)` exists its value is
    /// replaced and the stored key, including its issue time, is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptySource`] if the key has a blank source name.
    pub fn insert(&self, key: CacheKey, value: V) -> Result<(), CacheError> {
        if key.source.trim().is_empty() {
            return Err(CacheError::EmptySource);
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&key) {
            entry.value = value;
            return Ok(());
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, CacheEntry { value, sequence });
        self.evict_locked(&mut entries);
        Ok(())
    }

    /// Trim to the low-water mark if the capacity is exceeded.
    fn evict_locked(&self, entries: &mut HashMap<CacheKey, CacheEntry<V>>) -> usize {
        if entries.len() <= self.capacity {
            return 0;
        }

        let excess = entries.len() - self.low_water_mark;
        let mut order: Vec<(u128, u64, CacheKey)> = entries
            .iter()
            .map(|(key, entry)| (key.issued_at_ms, entry.sequence, key.clone()))
            .collect();
        order.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for (_, _, key) in order.into_iter().take(excess) {
            entries.remove(&key);
        }

        self.evicted.fetch_add(excess as u64, Ordering::Relaxed);
        tracing::debug!(
            evicted = excess,
            remaining = entries.len(),
            capacity = self.capacity,
            "evicted oldest cache entries"
        );
        excess
    }
}

impl<V: Clone> InMemoryResultCache<V> {
    /// Entries for one source, newest first.
    #[must_use]
    pub fn entries_for(&self, source: &str) -> Vec<(CacheKey, V)> {
        let entries = self.entries.read();
        let mut found: Vec<(u128, u64, CacheKey, V)> = entries
            .iter()
            .filter(|(key, _)| key.source == source)
            .map(|(key, entry)| {
                (
                    key.issued_at_ms,
                    entry.sequence,
                    key.clone(),
                    entry.value.clone(),
                )
            })
            .collect();
        drop(entries);
        found.sort_unstable_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        found.into_iter().map(|(_, _, key, value)| (key, value)).collect()
    }

    /// Most recent entry for one source.
    #[must_use]
    pub fn latest(&self, source: &str) -> Option<(CacheKey, V)> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|(key, _)| key.source == source)
            .max_by_key(|(key, entry)| (key.issued_at_ms, entry.sequence))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
    }
}

impl<V> ResultStore<V> for InMemoryResultCache<V>
where
    V: Clone + Send + Sync,
{
    fn put(&self, source: &str, reference: ExecutionRef, value: V) -> Result<(), CacheError> {
        self.insert(CacheKey::new(source, reference), value)
    }

    fn get(&self, source: &str, reference: ExecutionRef) -> Option<V> {
        let lookup = CacheKey::with_issued_at(source, reference, 0);
        self.entries.read().get(&lookup).map(|e| e.value.clone())
    }

    fn remove(&self, source: &str, reference: ExecutionRef) -> bool {
        let lookup = CacheKey::with_issued_at(source, reference, 0);
        self.entries.write().remove(&lookup).is_some()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn snapshot(&self) -> HashMap<CacheKey, V> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
