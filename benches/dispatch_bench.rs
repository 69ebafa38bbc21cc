//! Benchmarks for the dispatch engine.
//!
//! Benchmarks cover:
//! - Raw queue submit/next throughput
//! - End-to-end runs across worker counts
//! - Runs under tight backpressure (tiny queue and sink)
//! - Pipeline stage hand-off

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use prometheus_dispatch::config::DispatchConfig;
use prometheus_dispatch::core::{Dispatcher, Pipeline, Task, TaskQueue};

// ============================================================================
// Helper Functions
// ============================================================================

fn busy_work(x: u64) -> u64 {
    (0..64).fold(x, |acc, i| acc.wrapping_mul(31).wrapping_add(i))
}

fn build_tasks(count: u64) -> Vec<Task<u64, u64>> {
    (0..count).map(|id| Task::from_fn(id, id, busy_work)).collect()
}

fn dispatcher(workers: usize, capacity: usize) -> Dispatcher {
    Dispatcher::new(
        DispatchConfig::new()
            .with_worker_count(workers)
            .with_queue_capacity(capacity)
            .with_sink_capacity(capacity),
    )
    .expect("valid bench config")
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_submit_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_submit_next");
    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = TaskQueue::bounded(usize::try_from(size).unwrap_or(usize::MAX));
                for i in 0..size {
                    queue.try_submit(black_box(i)).ok();
                }
                queue.close();
                while let Some(item) = queue.next() {
                    black_box(item);
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_run_worker_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_worker_counts");
    group.throughput(Throughput::Elements(1_000));
    for workers in [1_usize, 2, 4, 8] {
        let dispatcher = dispatcher(workers, 256);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let results = dispatcher
                    .run(build_tasks(1_000), workers, None)
                    .expect("run completes");
                black_box(results.len());
            });
        });
    }
    group.finish();
}

fn bench_run_backpressure(c: &mut Criterion) {
    let dispatcher = dispatcher(4, 1);
    c.bench_function("run_backpressure_capacity_1", |b| {
        b.iter(|| {
            let results = dispatcher
                .run(build_tasks(500), 4, None)
                .expect("run completes");
            black_box(results.len());
        });
    });
}

// ============================================================================
// Pipeline Benchmarks
// ============================================================================

fn bench_pipeline_stages(c: &mut Criterion) {
    c.bench_function("pipeline_three_stages_1000", |b| {
        b.iter(|| {
            let out = Pipeline::source(0..1_000_u64, 64)
                .and_then(|p| p.stage(|n| n + 1))
                .and_then(|p| p.stage(busy_work))
                .and_then(|p| p.stage(|n| n % 7))
                .and_then(Pipeline::finish)
                .expect("pipeline completes");
            black_box(out.len());
        });
    });
}

criterion_group!(queue_benches, bench_queue_submit_next);

criterion_group!(run_benches, bench_run_worker_counts, bench_run_backpressure);

criterion_group!(pipeline_benches, bench_pipeline_stages);

criterion_main!(queue_benches, run_benches, pipeline_benches);
