//! Read-side API models over the result cache.
//!
//! These are the payloads a stats endpoint serves: a listing of every cached
//! run and a detail view for one `(source, reference)` pair. Transport and
//! HTML rendering are left to the hosting layer.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::ResultStore;
use crate::util::report::{count_by_author, top_by_upvotes, AuthorCount};
use crate::util::serde::Record;

/// One row of the cache listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySummary {
    /// Source name.
    pub source: String,
    /// Execution reference, upper-case hyphenated.
    pub reference: String,
    /// Issue time in milliseconds since epoch.
    pub issued_at_ms: u128,
    /// Records stored for this run.
    pub record_count: usize,
    /// Relative link to the detail view.
    pub link: String,
}

/// Every cached run, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheListing {
    /// Listing rows.
    pub entries: Vec<CacheEntrySummary>,
}

/// Detail view for one cached run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryView {
    /// Source name.
    pub source: String,
    /// Execution reference.
    pub reference: Uuid,
    /// Highest-voted records, at most `top_n`.
    pub top_posts: Vec<Record>,
    /// Most prolific authors, at most `top_n`.
    pub authors: Vec<AuthorCount>,
}

/// Result of a detail lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryLookup {
    /// Entry exists.
    Found(CacheEntryView),
    /// Reference unknown or malformed.
    NotFound {
        /// Requested source.
        source: String,
        /// Requested reference as given.
        reference: String,
    },
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Live cache entries.
    pub cached_entries: usize,
}

/// Relative path of the detail view for a cached run.
#[must_use]
pub fn entry_path(source: &str, reference: &Uuid) -> String {
    format!("/stats/{source}/{reference}")
}

/// List every cached run, newest first.
pub fn list_entries<C>(cache: &C) -> CacheListing
where
    C: ResultStore<Vec<Record>> + ?Sized,
{
    let mut rows: Vec<_> = cache.snapshot().into_iter().collect();
    rows.sort_by(|(a, _), (b, _)| b.issued_at_ms.cmp(&a.issued_at_ms));
    CacheListing {
        entries: rows
            .into_iter()
            .map(|(key, records)| CacheEntrySummary {
                link: entry_path(&key.source, &key.reference),
                reference: key.reference.hyphenated().to_string().to_uppercase(),
                source: key.source,
                issued_at_ms: key.issued_at_ms,
                record_count: records.len(),
            })
            .collect(),
    }
}

/// Look up one cached run. A reference that does not parse as a UUID is
/// reported as not found.
pub fn get_entry<C>(cache: &C, source: &str, reference: &str, top_n: usize) -> EntryLookup
where
    C: ResultStore<Vec<Record>> + ?Sized,
{
    let not_found = || EntryLookup::NotFound {
        source: source.to_string(),
        reference: reference.to_string(),
    };
    let Ok(parsed) = Uuid::parse_str(reference.trim()) else {
        return not_found();
    };
    let Some(records) = cache.get(source, parsed) else {
        return not_found();
    };

    let mut authors = count_by_author(&records);
    authors.truncate(top_n);
    EntryLookup::Found(CacheEntryView {
        source: source.to_string(),
        reference: parsed,
        top_posts: top_by_upvotes(&records, top_n),
        authors,
    })
}

/// Return a health payload.
pub fn health<C>(cache: &C) -> Health
where
    C: ResultStore<Vec<Record>> + ?Sized,
{
    Health {
        ok: true,
        cached_entries: cache.len(),
    }
}

/// Startup banner listing the read endpoints under `base_url`.
#[must_use]
pub fn endpoint_banner(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let width = 100;
    let mut out = String::new();
    let _ = writeln!(out, "┌{}┐", "─".repeat(width - 2));
    let _ = writeln!(out, "│ {:<w$}│", "Cache Items End Points:", w = width - 3);
    let _ = writeln!(
        out,
        "│ {:<w$}│",
        format!("    {base}/stats   to see the cache content"),
        w = width - 3
    );
    let _ = writeln!(
        out,
        "│ {:<w$}│",
        format!("    {base}/stats/{{source}}/{{reference}}   to see one cached run"),
        w = width - 3
    );
    let _ = writeln!(out, "└{}┘", "─".repeat(width - 2));
    out
}
