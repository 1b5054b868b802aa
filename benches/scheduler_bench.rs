//! Benchmarks for the task scheduler and result cache.
//!
//! Benchmarks cover:
//! - Submit/drain throughput at different concurrency limits
//! - Cache inserts with batch eviction
//! - Snapshot cost for the read API

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_source_poller::config::{CacheConfig, SchedulerConfig};
use prometheus_source_poller::core::{ResultStore, Spawn, TaskError, TaskScheduler};
use prometheus_source_poller::infra::InMemoryResultCache;
use prometheus_source_poller::util::serde::Record;

use tokio::runtime::Runtime;
use uuid::Uuid;

#[derive(Clone)]
struct BenchSpawner;

impl Spawn for BenchSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(fut);
    }
}

fn records(n: i64) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(format!("post {i}"), Some(format!("user{}", i % 7)), i))
        .collect()
}

// ============================================================================
// Scheduler
// ============================================================================

fn bench_scheduler_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_submit_drain");
    let units = 200_u64;
    group.throughput(Throughput::Elements(units));

    for limit in [1_usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, &limit| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let config = SchedulerConfig {
                    cpu_percentage: 100,
                    ..SchedulerConfig::default()
                };
                let scheduler =
                    TaskScheduler::with_parallelism(&config, limit, BenchSpawner).unwrap();
                for i in 0..units {
                    let handle = scheduler
                        .submit_with(
                            move || async move { Ok::<_, TaskError>(i * 2) },
                            |outcome| {
                                black_box(outcome);
                            },
                        )
                        .unwrap();
                    black_box(handle.id());
                }
                black_box(scheduler.wait_all().await);
            });
        });
    }
    group.finish();
}

// ============================================================================
// Cache
// ============================================================================

fn bench_cache_put_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_put_with_eviction");

    for capacity in [80_usize, 800] {
        let inserts = (capacity * 3) as u64;
        group.throughput(Throughput::Elements(inserts));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let payload = records(25);
                b.iter(|| {
                    let cache = InMemoryResultCache::new(&CacheConfig {
                        capacity,
                        low_water_mark: capacity / 4,
                    })
                    .unwrap();
                    for _ in 0..inserts {
                        cache.put("rust", Uuid::new_v4(), payload.clone()).unwrap();
                    }
                    black_box(cache.evicted_total());
                });
            },
        );
    }
    group.finish();
}

fn bench_cache_snapshot(c: &mut Criterion) {
    let cache = Arc::new(InMemoryResultCache::new(&CacheConfig::default()).unwrap());
    for i in 0..80 {
        cache
            .put(&format!("source-{}", i % 8), Uuid::new_v4(), records(25))
            .unwrap();
    }

    c.bench_function("cache_snapshot_80", |b| {
        b.iter(|| black_box(cache.snapshot().len()));
    });
}

criterion_group!(scheduler_benches, bench_scheduler_drain);

criterion_group!(
    cache_benches,
    bench_cache_put_with_eviction,
    bench_cache_snapshot
);

criterion_main!(scheduler_benches, cache_benches);
