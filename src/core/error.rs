//! Error types for scheduler, fetch and cache operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue is full for the scheduler.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Scheduler configuration cannot produce a usable scheduler.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Scheduler has been closed and accepts no more work.
    #[error("scheduler closed")]
    Closed,
    /// Unit was dropped from the queue before it started.
    #[error("task {0} abandoned before it started")]
    Abandoned(u64),
}

/// Terminal failure of a unit of work, delivered to callbacks and handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The unit returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The unit observed cancellation and unwound.
    #[error("task cancelled")]
    Cancelled,
    /// The unit panicked while running.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Whether this failure came from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised by a source fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Fetch observed the cancellation signal.
    #[error("fetch cancelled")]
    Cancelled,
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Credentials were rejected.
    #[error("authorization failed: {0}")]
    Unauthorized(String),
    /// The source does not exist or cannot be read.
    #[error("source `{0}` unavailable")]
    SourceUnavailable(String),
    /// Any other failure with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<FetchError> for TaskError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Errors produced by result cache writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Source name was empty.
    #[error("source name must not be empty")]
    EmptySource,
    /// Cache configuration is unusable.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
