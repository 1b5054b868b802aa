//! Serializable identifiers and record types shared across the crate.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clock::now_ms;

/// Task identifier assigned by the scheduler at submission time.
pub type TaskId = u64;

/// Unique identifier of one refresh attempt for a source.
pub type ExecutionRef = Uuid;

/// One item fetched from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Item title.
    pub title: String,
    /// Author name, if the source exposes one.
    pub author: Option<String>,
    /// Upvote count.
    pub upvotes: i64,
}

impl Record {
    /// Create a record.
    pub fn new(title: impl Into<String>, author: Option<String>, upvotes: i64) -> Self {
        Self {
            title: title.into(),
            author,
            upvotes,
        }
    }
}

/// Composite cache key.
///
/// Identity is `(source, reference)`. `issued_at_ms` is metadata recorded when
/// the key is created and drives eviction order; it takes no part in equality
/// or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheKey {
    /// Source name.
    pub source: String,
    /// Execution reference of the refresh attempt.
    pub reference: ExecutionRef,
    /// Creation time of the key in milliseconds since epoch.
    pub issued_at_ms: u128,
}

impl CacheKey {
    /// Create a key issued now.
    pub fn new(source: impl Into<String>, reference: ExecutionRef) -> Self {
        Self::with_issued_at(source, reference, now_ms())
    }

    /// Create a key with an explicit issue time.
    pub fn with_issued_at(
        source: impl Into<String>,
        reference: ExecutionRef,
        issued_at_ms: u128,
    ) -> Self {
        Self {
            source: source.into(),
            reference,
            issued_at_ms,
        }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.reference == other.reference
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.reference.hash(state);
    }
}
