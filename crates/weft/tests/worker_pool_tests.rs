//! Integration tests for the worker pool.
//!
//! Workers run under `SCHED_FIFO`, which unprivileged processes are usually
//! not allowed to request. Tests that spawn real workers detect the
//! `PermissionDenied` status and skip with a notice, so the suite passes in
//! unprivileged containers and still exercises the full path where it can.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use weft::{PoolConfig, WorkerOptions, WorkerPool, WorkerPoolStatus};

/// Add a worker, or skip the current test when realtime scheduling is not
/// permitted in this environment.
macro_rules! add_worker_or_skip {
    ($pool:expr, $cb:expr) => {
        add_worker_or_skip!($pool, $cb, WorkerOptions::default())
    };
    ($pool:expr, $cb:expr, $options:expr) => {
        match $pool.add_worker_with($cb, $options) {
            Ok(()) => {}
            Err(err) if err.status() == WorkerPoolStatus::PermissionDenied => {
                eprintln!("skipping: realtime scheduling not permitted in this environment");
                return;
            }
            Err(err) => panic!("add_worker failed: {err}"),
        }
    };
}

/// Skip the current test on machines with fewer cores than the pool wants;
/// pinning a worker to a core the machine does not have cannot succeed.
macro_rules! require_cores {
    ($cores:expr) => {
        let available = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        if available < $cores {
            eprintln!("skipping: {} cores requested, {available} available", $cores);
            return;
        }
    };
}

fn new_pool(cores: usize) -> WorkerPool {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    WorkerPool::new(PoolConfig::new(cores)).expect("pool construction")
}

#[test]
fn test_two_workers_run_once_per_wakeup() {
    require_cores!(2);
    let mut pool = new_pool(2);
    let a = Arc::new(AtomicBool::new(false));
    let b = Arc::new(AtomicBool::new(false));

    {
        let a = Arc::clone(&a);
        add_worker_or_skip!(pool, move || a.store(true, Ordering::Release));
    }
    {
        let b = Arc::clone(&b);
        add_worker_or_skip!(pool, move || b.store(true, Ordering::Release));
    }

    // Both workers are already parked; this returns without blocking.
    pool.wait_for_workers_idle();
    assert!(!a.load(Ordering::Acquire));
    assert!(!b.load(Ordering::Acquire));

    pool.wake_and_wait();

    assert!(a.load(Ordering::Acquire));
    assert!(b.load(Ordering::Acquire));
}

#[test]
fn test_split_wakeup_matches_fused() {
    require_cores!(2);
    let mut pool = new_pool(2);
    let count = Arc::new(AtomicUsize::new(0));

    {
        let count = Arc::clone(&count);
        add_worker_or_skip!(pool, move || {
            count.fetch_add(1, Ordering::Relaxed);
        });
    }

    pool.wake_workers();
    pool.wait_for_workers_idle();
    assert_eq!(count.load(Ordering::Relaxed), 1);

    pool.wake_and_wait();
    assert_eq!(count.load(Ordering::Relaxed), 2);
}

#[test]
fn test_callbacks_run_once_per_generation() {
    require_cores!(2);
    const GENERATIONS: usize = 48;

    let mut pool = new_pool(2);
    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = Arc::clone(&count);
        add_worker_or_skip!(pool, move || {
            count.fetch_add(1, Ordering::Relaxed);
        });
    }

    for _ in 0..GENERATIONS {
        pool.wake_and_wait();
    }
    assert_eq!(count.load(Ordering::Relaxed), GENERATIONS);
}

#[test]
fn test_invalid_priority_is_rejected() {
    let mut pool = new_pool(2);

    for priority in [-17, 102] {
        let err = pool
            .add_worker_with(|| {}, WorkerOptions::default().with_priority(priority))
            .expect_err("out-of-range priority must be rejected");
        assert_eq!(err.status(), WorkerPoolStatus::InvalidArguments);
    }
    assert_eq!(pool.worker_count(), 0);
}

#[test]
fn test_out_of_range_core_is_rejected() {
    let mut pool = new_pool(4);

    let err = pool
        .add_worker_with(|| {}, WorkerOptions::default().with_core(5))
        .expect_err("core outside the pool must be rejected");
    assert_eq!(err.status(), WorkerPoolStatus::InvalidArguments);
    assert_eq!(pool.worker_count(), 0);
    assert_eq!(pool.core_loads(), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
}

#[test]
fn test_failed_add_leaves_no_trace() {
    require_cores!(2);
    let mut pool = new_pool(2);

    assert!(pool.add_worker_with(|| {}, WorkerOptions::default().with_core(9)).is_err());

    // The pool behaves as if the failed call never happened.
    pool.wait_for_workers_idle();
    let ran = Arc::new(AtomicBool::new(false));
    {
        let ran = Arc::clone(&ran);
        add_worker_or_skip!(pool, move || ran.store(true, Ordering::Release));
    }
    pool.wake_and_wait();
    assert!(ran.load(Ordering::Acquire));
    assert_eq!(pool.worker_count(), 1);
}

#[test]
fn test_auto_placement_spreads_over_all_cores() {
    require_cores!(4);
    const CORES: usize = 4;
    let mut pool = new_pool(CORES);

    for _ in 0..CORES {
        add_worker_or_skip!(pool, || {});
    }

    let loads = pool.core_loads();
    assert_eq!(loads.len(), CORES);
    for (_, workers) in loads {
        assert_eq!(workers, 1);
    }
}

#[test]
fn test_explicit_placement_is_respected() {
    require_cores!(4);
    let mut pool = new_pool(4);

    for core in [3, 2, 1, 1] {
        add_worker_or_skip!(pool, || {}, WorkerOptions::default().with_core(core));
    }

    assert_eq!(pool.core_loads(), vec![(0, 0), (1, 2), (2, 1), (3, 1)]);
}

#[cfg(target_os = "linux")]
#[test]
fn test_worker_priorities_are_applied() {
    use std::sync::atomic::AtomicI32;

    require_cores!(2);

    let mut pool = new_pool(2);
    let first = Arc::new(AtomicI32::new(-1));
    let second = Arc::new(AtomicI32::new(-1));

    fn my_fifo_priority() -> i32 {
        let mut policy = 0;
        let mut param = libc::sched_param { sched_priority: -1 };
        // SAFETY: out-parameters for the calling thread's own schedule.
        let res =
            unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
        assert_eq!(res, 0);
        assert_eq!(policy, libc::SCHED_FIFO);
        param.sched_priority
    }

    {
        let first = Arc::clone(&first);
        add_worker_or_skip!(
            pool,
            move || first.store(my_fifo_priority(), Ordering::Release),
            WorkerOptions::default().with_priority(66)
        );
    }
    {
        let second = Arc::clone(&second);
        add_worker_or_skip!(
            pool,
            move || second.store(my_fifo_priority(), Ordering::Release),
            WorkerOptions::default().with_priority(77)
        );
    }

    pool.wake_and_wait();
    assert_eq!(first.load(Ordering::Acquire), 66);
    assert_eq!(second.load(Ordering::Acquire), 77);
}

#[test]
fn test_callback_runs_in_the_realtime_domain() {
    require_cores!(2);
    let mut pool = new_pool(2);
    let in_rt = Arc::new(AtomicBool::new(false));

    {
        let in_rt = Arc::clone(&in_rt);
        add_worker_or_skip!(pool, move || {
            in_rt.store(weft::is_current_thread_realtime(), Ordering::Release);
        });
    }

    pool.wake_and_wait();
    assert!(in_rt.load(Ordering::Acquire));
    // The driver thread itself is not marked.
    assert!(!weft::is_current_thread_realtime());
}

#[test]
fn test_drop_shuts_down_parked_workers() {
    require_cores!(2);
    let mut pool = new_pool(2);
    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = Arc::clone(&count);
        add_worker_or_skip!(pool, move || {
            count.fetch_add(1, Ordering::Relaxed);
        });
    }
    pool.wake_and_wait();
    drop(pool);
    // The shutdown wakeup must not run another generation.
    assert_eq!(count.load(Ordering::Relaxed), 1);
}

#[test]
fn test_empty_pool_dispatch_is_a_no_op() {
    let pool = new_pool(2);
    pool.wait_for_workers_idle();
    pool.wake_and_wait();
    pool.wake_workers();
    pool.wait_for_workers_idle();
}
