//! Runtime adapters and the read API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    endpoint_banner, entry_path, get_entry, health, list_entries, CacheEntrySummary,
    CacheEntryView, CacheListing, EntryLookup, Health,
};
pub use tokio_spawner::TokioSpawner;
