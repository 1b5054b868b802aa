//! Infrastructure adapters for result storage backends.

pub mod cache;

pub use cache::InMemoryResultCache;
