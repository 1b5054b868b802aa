//! Builders to construct a source monitor from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::MonitorConfig;
use crate::core::{AppResult, MonitorSettings, SourceFetcher, SourceMonitor, Spawn, TaskScheduler};
use crate::infra::InMemoryResultCache;
use crate::util::serde::Record;

/// Monitor wired to the in-memory cache.
pub type InMemoryMonitor<F, S> = SourceMonitor<F, InMemoryResultCache<Vec<Record>>, S>;

/// Builder holding a validated monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorBuilder {
    config: MonitorConfig,
    parallelism: Option<usize>,
}

impl MonitorBuilder {
    /// Start from a configuration. Validation happens in [`Self::build`].
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            parallelism: None,
        }
    }

    /// Override the detected hardware parallelism.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Configuration this builder will use.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Validate the configuration and assemble scheduler, cache and monitor.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or a component rejects it.
    pub fn build<F, S>(self, fetcher: Arc<F>, spawner: S) -> AppResult<InMemoryMonitor<F, S>>
    where
        F: SourceFetcher,
        S: Spawn + Clone + Send + Sync + 'static,
    {
        let cfg = &self.config;
        cfg.validate().context("monitor configuration invalid")?;

        let parallelism = self.parallelism.unwrap_or_else(num_cpus::get);
        let scheduler = TaskScheduler::with_parallelism(&cfg.scheduler, parallelism, spawner)
            .context("failed to build task scheduler")?;
        let cache =
            InMemoryResultCache::new(&cfg.cache).context("failed to build result cache")?;

        tracing::info!(
            sources = cfg.distinct_sources().len(),
            concurrency = scheduler.concurrency_limit(),
            cache_capacity = cache.capacity(),
            "source monitor built"
        );

        Ok(SourceMonitor::new(
            MonitorSettings::from_config(cfg),
            fetcher,
            Arc::new(cache),
            scheduler,
        ))
    }
}

/// Build a monitor from configuration using detected hardware parallelism.
///
/// # Errors
///
/// Fails if the configuration is invalid or a component rejects it.
pub fn build_monitor<F, S>(
    cfg: &MonitorConfig,
    fetcher: Arc<F>,
    spawner: S,
) -> AppResult<InMemoryMonitor<F, S>>
where
    F: SourceFetcher,
    S: Spawn + Clone + Send + Sync + 'static,
{
    MonitorBuilder::new(cfg.clone()).build(fetcher, spawner)
}
