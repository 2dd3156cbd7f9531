//! Benchmarks for the queued locks.
//!
//! # Benchmark Categories
//!
//! 1. **Uncontended**: acquire/release round trips with no waiters
//! 2. **Contended**: N fibers each running a batch of `with_lock` sections
//! 3. **Interrupted Waiters**: queue-and-interrupt cycles, exercising the
//!    cleanup path
//! 4. **Comparison**: the same contended workload on `tokio::sync::Mutex`
//!
//! All groups use `to_async(&runtime)` on a multi-thread runtime.

#![cfg(feature = "sync")]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fibrous::effect::AsyncIO;
use fibrous::fiber::{Fiber, Interrupted};
use fibrous::sync::{Mutex, Semaphore};
use std::hint::black_box;
use std::sync::Arc;

const SECTIONS_PER_FIBER: usize = 20;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime")
}

// =============================================================================
// Uncontended Benchmarks
// =============================================================================

fn benchmark_uncontended(criterion: &mut Criterion) {
    let runtime = runtime();
    let mut group = criterion.benchmark_group("queued_lock_uncontended");

    let mutex = Mutex::new();
    group.bench_function("mutex_acquire_release", |bencher| {
        bencher.to_async(&runtime).iter(|| async {
            mutex.acquire().await.unwrap();
            mutex.release().await;
        });
    });

    group.bench_function("mutex_try_acquire", |bencher| {
        bencher.to_async(&runtime).iter(|| async {
            let acquired = mutex.try_acquire().await;
            mutex.release().await;
            black_box(acquired)
        });
    });

    group.bench_function("mutex_with_lock", |bencher| {
        bencher.to_async(&runtime).iter(|| async {
            black_box(mutex.with_lock(AsyncIO::pure(Ok(black_box(1)))).await)
        });
    });

    let semaphore = Semaphore::new(4);
    group.bench_function("semaphore_acquire_release", |bencher| {
        bencher.to_async(&runtime).iter(|| async {
            semaphore.acquire().await.unwrap();
            semaphore.release().await;
        });
    });

    group.finish();
}

// =============================================================================
// Contended Benchmarks
// =============================================================================

async fn contended_sections(mutex: Mutex, fibers: usize) {
    let mut handles = Vec::with_capacity(fibers);
    for _ in 0..fibers {
        let mutex = mutex.clone();
        let worker = AsyncIO::new(move || async move {
            for section in 0..SECTIONS_PER_FIBER {
                mutex.with_lock(AsyncIO::pure(Ok(section))).await?;
            }
            Ok::<_, Interrupted>(())
        });
        handles.push(Fiber::fork(worker).await);
    }
    for handle in handles {
        handle.join().await.unwrap();
    }
}

fn benchmark_contended(criterion: &mut Criterion) {
    let runtime = runtime();
    let mut group = criterion.benchmark_group("queued_lock_contended");

    for fibers in [2, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("mutex_with_lock", fibers),
            &fibers,
            |bencher, &fibers| {
                bencher
                    .to_async(&runtime)
                    .iter(|| contended_sections(Mutex::new(), fibers));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Interrupted Waiter Benchmarks
// =============================================================================

fn benchmark_interrupted_waiters(criterion: &mut Criterion) {
    let runtime = runtime();
    let mut group = criterion.benchmark_group("queued_lock_interrupted_waiters");

    for waiters in [1, 8] {
        group.bench_with_input(
            BenchmarkId::new("queue_then_interrupt", waiters),
            &waiters,
            |bencher, &waiters| {
                bencher.to_async(&runtime).iter(|| async move {
                    let mutex = Mutex::new();
                    mutex.acquire().await.unwrap();
                    let mut fibers = Vec::with_capacity(waiters);
                    for _ in 0..waiters {
                        fibers.push(Fiber::fork(mutex.acquire()).await);
                    }
                    for fiber in fibers {
                        black_box(fiber.interrupt().await.ok());
                    }
                    mutex.release().await;
                    black_box(mutex.snapshot().await)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Comparison Benchmarks
// =============================================================================

async fn tokio_contended_sections(mutex: Arc<tokio::sync::Mutex<usize>>, tasks: usize) {
    let mut handles = Vec::with_capacity(tasks);
    for _ in 0..tasks {
        let mutex = Arc::clone(&mutex);
        handles.push(tokio::spawn(async move {
            for section in 0..SECTIONS_PER_FIBER {
                *mutex.lock().await = section;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

fn benchmark_comparison(criterion: &mut Criterion) {
    let runtime = runtime();
    let mut group = criterion.benchmark_group("queued_lock_comparison");

    for tasks in [2, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("tokio_mutex", tasks),
            &tasks,
            |bencher, &tasks| {
                bencher.to_async(&runtime).iter(|| {
                    tokio_contended_sections(Arc::new(tokio::sync::Mutex::new(0)), tasks)
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("fibrous_mutex", tasks),
            &tasks,
            |bencher, &tasks| {
                bencher
                    .to_async(&runtime)
                    .iter(|| contended_sections(Mutex::new(), tasks));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Criterion Group and Main
// =============================================================================

criterion_group!(
    benches,
    benchmark_uncontended,
    benchmark_contended,
    benchmark_interrupted_waiters,
    benchmark_comparison
);

criterion_main!(benches);
