//! # Prometheus Source Poller
//!
//! A bounded-concurrency polling engine that periodically fetches records from
//! a set of named sources and keeps recent runs in a capacity-limited cache.
//!
//! The crate is built from three cooperating parts:
//!
//! - **Task scheduler**: runs asynchronous units of work with at most
//!   `floor(parallelism * cpu_percentage / 100)` in flight, queues the rest
//!   FIFO and wakes the next unit as soon as one finishes.
//! - **Result cache**: stores one value per `(source, reference)` pair and,
//!   once its capacity is exceeded, evicts the oldest entries by issue time
//!   down to a low-water mark.
//! - **Source monitor**: each cycle submits one fetch per distinct source,
//!   waits for all of them, stores successful results under a fresh
//!   execution reference, then sleeps for the refresh interval.
//!
//! ## Key Features
//!
//! - **Failure isolation**: a failing or panicking fetch is logged and skipped
//!   for that cycle only
//! - **Cooperative cancellation**: a shared `CancellationToken` reaches every
//!   in-flight fetch and the inter-cycle sleep
//! - **Queue-depth notifications**: observers subscribe to a watch channel
//! - **Read API**: listing and detail payloads for a stats endpoint
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_source_poller::builders::build_monitor;
//! use prometheus_source_poller::config::MonitorConfig;
//! use prometheus_source_poller::runtime::TokioSpawner;
//! use tokio_util::sync::CancellationToken;
//!
//! let cfg = MonitorConfig::from_env()?;
//! let monitor = build_monitor(&cfg, Arc::new(my_fetcher), TokioSpawner::current())?;
//! let shutdown = CancellationToken::new();
//! monitor.run(shutdown.clone()).await;
//! ```
//!
//! For complete examples, see `tests/monitor_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling, caching and polling abstractions.
pub mod core;
/// Configuration models for the scheduler, cache and monitor.
pub mod config;
/// Builders to construct monitors from configuration.
pub mod builders;
/// Infrastructure adapters for result storage backends.
pub mod infra;
/// Runtime adapters and the read API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
