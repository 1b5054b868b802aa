//! Polling monitor: drives refresh cycles over the scheduler and result cache.
//!
//! Each cycle submits one fetch per distinct source, waits for all of them,
//! then sleeps for the refresh interval. Successful fetches are stored under a
//! fresh execution reference, so the cache keeps a short history of runs per
//! source. A failing source is logged and skipped for that cycle only.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::monitor::distinct_sources;
use crate::config::{FetchLimits, MonitorConfig};
use crate::core::{ResultStore, SourceFetcher, Spawn, TaskError, TaskOutcome, TaskScheduler};
use crate::util::report::render_source_report;
use crate::util::serde::Record;

/// Phase of the monitor's cycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CycleState {
    /// Between cycles or not yet started.
    Idle,
    /// Submitting one fetch per source.
    Dispatching,
    /// Waiting for the cycle's fetches to finish.
    Draining,
    /// Waiting for the refresh interval.
    Sleeping,
    /// Loop has exited.
    Terminated,
}

/// Why [`SourceMonitor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The source list was empty; the shutdown token was cancelled.
    NoSources,
    /// The shutdown token fired.
    Cancelled,
}

/// Summary of one dispatch and drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    /// Fetches submitted to the scheduler.
    pub submitted: usize,
    /// Fetches whose records were stored.
    pub stored: usize,
    /// Fetches that failed or could not be stored.
    pub failed: usize,
    /// Fetches the scheduler refused.
    pub rejected: usize,
}

/// Runtime settings for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Sources to poll.
    pub sources: Vec<String>,
    /// Sleep between cycles.
    pub refresh_interval: Duration,
    /// Bounds handed to the fetcher.
    pub limits: FetchLimits,
    /// When set, print a report with this many rows after each stored fetch.
    pub console_top_n: Option<usize>,
}

impl MonitorSettings {
    /// Derive settings from a validated configuration.
    #[must_use]
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            sources: cfg.distinct_sources(),
            refresh_interval: cfg.refresh_interval(),
            limits: cfg.fetch_limits(),
            console_top_n: cfg.show_in_console.then_some(cfg.show_top_posts),
        }
    }
}

/// Periodic poller over a set of named sources.
pub struct SourceMonitor<F, C, S> {
    fetcher: Arc<F>,
    cache: Arc<C>,
    scheduler: TaskScheduler<S>,
    sources: RwLock<Vec<String>>,
    refresh_interval: Duration,
    limits: FetchLimits,
    console_top_n: Option<usize>,
    state: Mutex<CycleState>,
    cycles: AtomicU64,
}

impl<F, C, S> SourceMonitor<F, C, S>
where
    F: SourceFetcher,
    C: ResultStore<Vec<Record>> + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a monitor from its collaborators.
    pub fn new(
        settings: MonitorSettings,
        fetcher: Arc<F>,
        cache: Arc<C>,
        scheduler: TaskScheduler<S>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            scheduler,
            sources: RwLock::new(distinct_sources(&settings.sources)),
            refresh_interval: settings.refresh_interval,
            limits: settings.limits,
            console_top_n: settings.console_top_n,
            state: Mutex::new(CycleState::Idle),
            cycles: AtomicU64::new(0),
        }
    }

    /// Shared result cache.
    #[must_use]
    pub fn cache(&self) -> Arc<C> {
        Arc::clone(&self.cache)
    }

    /// Underlying scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &TaskScheduler<S> {
        &self.scheduler
    }

    /// Current cycle phase.
    #[must_use]
    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    /// Cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Current distinct source list.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.sources.read().clone()
    }

    /// Replace the source list. Takes effect from the next cycle; an empty
    /// list stops the loop before its next dispatch.
    pub fn update_sources(&self, sources: &[String]) {
        let sources = distinct_sources(sources);
        info!(count = sources.len(), "source list updated");
        *self.sources.write() = sources;
    }

    fn set_state(&self, next: CycleState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "cycle state change");
            *state = next;
        }
    }

    /// Run cycles until `shutdown` fires or the source list is empty.
    ///
    /// An empty source list cancels `shutdown`, which stops the host that
    /// owns the token.
    pub async fn run(&self, shutdown: CancellationToken) -> MonitorExit {
        info!(
            sources = self.sources.read().len(),
            interval_secs = self.refresh_interval.as_secs(),
            "source monitor started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.sources.read().is_empty() {
                info!("no sources to watch, stopping host");
                self.set_state(CycleState::Terminated);
                shutdown.cancel();
                return MonitorExit::NoSources;
            }

            let report = self.run_cycle(&shutdown).await;
            info!(
                cycle = report.cycle,
                submitted = report.submitted,
                stored = report.stored,
                failed = report.failed,
                rejected = report.rejected,
                "cycle complete"
            );

            self.set_state(CycleState::Sleeping);
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.refresh_interval) => {}
            }
            self.set_state(CycleState::Idle);
        }

        let dropped = self.scheduler.clear_queued();
        self.set_state(CycleState::Terminated);
        info!(dropped = dropped, "source monitor cancelled");
        MonitorExit::Cancelled
    }

    /// Dispatch one fetch per source and wait for all of them.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        let sources = self.sources();
        self.set_state(CycleState::Dispatching);

        let stored = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut submitted = 0;
        let mut rejected = 0;

        for source in sources {
            let work = {
                let fetcher = Arc::clone(&self.fetcher);
                let token = cancel.clone();
                let limits = self.limits;
                let source = source.clone();
                move || async move {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => Err(TaskError::Cancelled),
                        result = fetcher.fetch(&source, limits, token.clone()) => {
                            result.map_err(TaskError::from)
                        }
                    }
                }
            };

            let on_complete = {
                let cache = Arc::clone(&self.cache);
                let stored = Arc::clone(&stored);
                let failed = Arc::clone(&failed);
                let console_top_n = self.console_top_n;
                let source = source.clone();
                move |outcome: TaskOutcome<Vec<Record>>| {
                    store_outcome(&source, outcome, cache.as_ref(), console_top_n, &stored, &failed);
                }
            };

            match self.scheduler.submit_with(work, on_complete) {
                Ok(handle) => {
                    submitted += 1;
                    debug!(cycle = cycle, source = %source, task_id = handle.id(), "fetch submitted");
                }
                Err(e) => {
                    rejected += 1;
                    error!(cycle = cycle, source = %source, error = %e, "fetch rejected by scheduler");
                }
            }
        }

        self.set_state(CycleState::Draining);
        self.scheduler.wait_all().await;
        self.set_state(CycleState::Idle);

        CycleReport {
            cycle,
            submitted,
            stored: stored.load(Ordering::Acquire),
            failed: failed.load(Ordering::Acquire),
            rejected,
        }
    }
}

/// Completion handler for one source fetch.
fn store_outcome<C>(
    source: &str,
    outcome: TaskOutcome<Vec<Record>>,
    cache: &C,
    console_top_n: Option<usize>,
    stored: &AtomicUsize,
    failed: &AtomicUsize,
) where
    C: ResultStore<Vec<Record>> + ?Sized,
{
    match outcome {
        Ok(records) => {
            let reference = Uuid::new_v4();
            let count = records.len();
            if let Some(top_n) = console_top_n {
                println!("{}", render_source_report(source, &records, top_n));
            }
            match cache.put(source, reference, records) {
                Ok(()) => {
                    stored.fetch_add(1, Ordering::AcqRel);
                    info!(source = %source, reference = %reference, records = count, "stored fetched records");
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::AcqRel);
                    error!(source = %source, error = %e, "failed to store records");
                }
            }
        }
        Err(e) if e.is_cancelled() => {
            failed.fetch_add(1, Ordering::AcqRel);
            warn!(source = %source, "fetch cancelled");
        }
        Err(e) => {
            failed.fetch_add(1, Ordering::AcqRel);
            error!(source = %source, error = %e, "fetch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, SchedulerConfig};
    use crate::core::FetchError;
    use crate::infra::InMemoryResultCache;
    use crate::runtime::TokioSpawner;
    use async_trait::async_trait;

    struct EchoFetcher;

    #[async_trait]
    impl SourceFetcher for EchoFetcher {
        async fn fetch(
            &self,
            source: &str,
            limits: FetchLimits,
            _cancel: CancellationToken,
        ) -> Result<Vec<Record>, FetchError> {
            if source == "broken" {
                return Err(FetchError::SourceUnavailable(source.to_string()));
            }
            Ok((0..limits.max_items)
                .map(|i| Record::new(format!("{source}-{i}"), None, i as i64))
                .collect())
        }
    }

    fn monitor(
        sources: &[&str],
    ) -> SourceMonitor<EchoFetcher, InMemoryResultCache<Vec<Record>>, TokioSpawner> {
        let scheduler = TaskScheduler::with_parallelism(
            &SchedulerConfig {
                cpu_percentage: 100,
                ..SchedulerConfig::default()
            },
            2,
            TokioSpawner::current(),
        )
        .unwrap();
        let cache = InMemoryResultCache::new(&CacheConfig::default()).unwrap();
        SourceMonitor::new(
            MonitorSettings {
                sources: sources.iter().map(|s| (*s).to_string()).collect(),
                refresh_interval: Duration::from_millis(10),
                limits: FetchLimits {
                    max_items: 3,
                    items_per_request: 3,
                },
                console_top_n: None,
            },
            Arc::new(EchoFetcher),
            Arc::new(cache),
            scheduler,
        )
    }

    #[tokio::test]
    async fn test_cycle_stores_each_distinct_source() {
        let monitor = monitor(&["rust", "golang", "rust"]);
        let report = monitor.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.cycle, 1);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.stored, 2);
        assert_eq!(monitor.cache().len(), 2);
        assert_eq!(monitor.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_failed_source_is_isolated() {
        let monitor = monitor(&["rust", "broken", "golang"]);
        let report = monitor.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.stored, 2);
        assert_eq!(report.failed, 1);
        let snapshot = monitor.cache().snapshot();
        assert!(snapshot.keys().all(|k| k.source != "broken"));
    }

    #[tokio::test]
    async fn test_empty_sources_stop_host() {
        let monitor = monitor(&[]);
        let shutdown = CancellationToken::new();
        let exit = monitor.run(shutdown.clone()).await;

        assert_eq!(exit, MonitorExit::NoSources);
        assert!(shutdown.is_cancelled());
        assert_eq!(monitor.state(), CycleState::Terminated);
        assert_eq!(monitor.cycles(), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let cfg = MonitorConfig::from_json_str(
            r#"{
                "client_id": "id",
                "client_secret": "secret",
                "user_name": "user",
                "user_password": "pw",
                "sources": ["a", "b", "a"],
                "refresh_interval_secs": 5,
                "post_count": 25,
                "show_top_posts": 7,
                "show_in_console": true
            }"#,
        )
        .unwrap();
        let settings = MonitorSettings::from_config(&cfg);
        assert_eq!(settings.sources, vec!["a", "b"]);
        assert_eq!(settings.refresh_interval, Duration::from_secs(5));
        assert_eq!(settings.limits.max_items, 25);
        assert_eq!(settings.console_top_n, Some(7));
    }
}
