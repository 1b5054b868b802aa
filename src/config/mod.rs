//! Configuration models for the scheduler, cache and polling monitor.

pub mod monitor;

pub use monitor::{CacheConfig, FetchLimits, MonitorConfig, SchedulerConfig};
