//! Core scheduling, caching and polling abstractions.

pub mod cache;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod scheduler;

pub use cache::ResultStore;
pub use error::{AppResult, CacheError, ConfigError, FetchError, SchedulerError, TaskError};
pub use executor::SourceFetcher;
pub use monitor::{CycleReport, CycleState, MonitorExit, MonitorSettings, SourceMonitor};
pub use scheduler::{
    Callback, QueueDepth, SchedulerStats, Spawn, TaskHandle, TaskOutcome, TaskScheduler,
    TaskStatus,
};
