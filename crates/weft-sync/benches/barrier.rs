//! Dispatch-cycle benchmarks for the triggered barrier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_sync::TriggeredBarrier;

struct Pool {
    barrier: Arc<TriggeredBarrier>,
    running: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

fn start_pool(workers: usize) -> Pool {
    let barrier: Arc<TriggeredBarrier> =
        Arc::new(TriggeredBarrier::new().expect("barrier construction"));
    let running = Arc::new(AtomicBool::new(true));

    barrier.set_expected(workers);
    let handles = (0..workers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let running = Arc::clone(&running);
            thread::spawn(move || loop {
                barrier.wait();
                if !running.load(Ordering::Acquire) {
                    break;
                }
                std::hint::black_box(());
            })
        })
        .collect();
    barrier.wait_for_all();

    Pool {
        barrier,
        running,
        handles,
    }
}

fn stop_pool(pool: Pool) {
    pool.barrier.wait_for_all();
    pool.running.store(false, Ordering::Release);
    pool.barrier.release_all();
    for handle in pool.handles {
        handle.join().expect("worker panicked");
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for workers in [1usize, 2, 4] {
        group.bench_function(BenchmarkId::new("release_and_wait", workers), |b| {
            let pool = start_pool(workers);
            b.iter(|| pool.barrier.release_and_wait());
            stop_pool(pool);
        });

        group.bench_function(BenchmarkId::new("release_then_wait", workers), |b| {
            let pool = start_pool(workers);
            b.iter(|| {
                pool.barrier.release_all();
                pool.barrier.wait_for_all();
            });
            stop_pool(pool);
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
