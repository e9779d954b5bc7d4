//! The worker pool.
//!
//! A [`WorkerPool`] owns a fixed set of realtime worker threads and the
//! barrier they rendezvous on. Once per audio period the driver thread calls
//! [`wake_and_wait`](WorkerPool::wake_and_wait) (or the split
//! [`wake_workers`](WorkerPool::wake_workers) /
//! [`wait_for_workers_idle`](WorkerPool::wait_for_workers_idle) pair); every
//! worker runs its callback exactly once, in no particular order, and parks
//! again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use weft_sync::services::{Posix, ThreadServices};
use weft_sync::TriggeredBarrier;

#[cfg(feature = "xenomai")]
use weft_sync::services::Cobalt;

use crate::apple::ApplePoolData;
use crate::config::PoolConfig;
use crate::cores::CoreTable;
use crate::error::{AddWorkerError, PoolError, WorkerPoolStatus};
use crate::worker::{WorkerCallback, WorkerThread};

/// Default scheduling priority for new workers, below the window where the
/// audio driver itself runs.
pub const DEFAULT_WORKER_PRIORITY: i32 = 75;

/// Placement and scheduling options for a new worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// `SCHED_FIFO` priority in [0, 100]; higher is more urgent.
    pub priority: i32,
    /// Explicit core id, which must be one of the pool's cores. `None`
    /// places the worker on the least-loaded core.
    pub core: Option<usize>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_WORKER_PRIORITY,
            core: None,
        }
    }
}

impl WorkerOptions {
    /// Set the scheduling priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Pin the worker to an explicit core.
    #[must_use]
    pub fn with_core(mut self, core: usize) -> Self {
        self.core = Some(core);
        self
    }
}

/// A pool of pre-spawned realtime worker threads driven by one audio thread.
///
/// The pool selects its threading domain at construction: the generic POSIX
/// domain, or the realtime-kernel domain when
/// [`init_realtime_kernel_mode`](weft_sync::init_realtime_kernel_mode) was
/// called first.
///
/// Dropping the pool shuts it down: the driver waits for the workers to go
/// idle, clears the running flag, releases the barrier once, and joins every
/// worker in registration order.
pub struct WorkerPool {
    inner: PoolInner,
}

enum PoolInner {
    Posix(PoolImpl<Posix>),
    #[cfg(feature = "xenomai")]
    Cobalt(PoolImpl<Cobalt>),
}

impl WorkerPool {
    /// Create a pool for the process's current threading mode.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, when the barrier cannot be
    /// constructed, or when realtime-kernel mode was initialized in a build
    /// without realtime-kernel support.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        if weft_sync::realtime_kernel_mode() {
            #[cfg(feature = "xenomai")]
            {
                return Ok(Self {
                    inner: PoolInner::Cobalt(PoolImpl::new(config)?),
                });
            }
            #[cfg(not(feature = "xenomai"))]
            {
                return Err(PoolError::NoImplementation);
            }
        }
        Ok(Self {
            inner: PoolInner::Posix(PoolImpl::new(config)?),
        })
    }

    /// Add a worker with the default priority on an automatically chosen
    /// core. See [`add_worker_with`](Self::add_worker_with).
    ///
    /// # Errors
    ///
    /// See [`add_worker_with`](Self::add_worker_with).
    pub fn add_worker(
        &mut self,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<(), AddWorkerError> {
        self.add_worker_with(callback, WorkerOptions::default())
    }

    /// Add a worker running `callback` once per generation.
    ///
    /// When this returns `Ok` the worker has been spawned, configured and is
    /// parked on the barrier, ready for the next wakeup.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArguments` for an out-of-range priority or a core
    /// outside the pool's core list, with `PermissionDenied` /
    /// `LimitExceeded` / `Error` when the OS refuses the thread, or with
    /// `Error` plus a platform status when the worker's platform init fails
    /// after spawn. On any failure the pool is exactly as it was before the
    /// call.
    pub fn add_worker_with(
        &mut self,
        callback: impl FnMut() + Send + 'static,
        options: WorkerOptions,
    ) -> Result<(), AddWorkerError> {
        let callback: WorkerCallback = Box::new(callback);
        match &mut self.inner {
            PoolInner::Posix(pool) => pool.add_worker(callback, options),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.add_worker(callback, options),
        }
    }

    /// Release all workers for one generation and return immediately.
    ///
    /// Every worker must be parked; pair each wakeup with a
    /// [`wait_for_workers_idle`](Self::wait_for_workers_idle) before the
    /// next one.
    pub fn wake_workers(&self) {
        match &self.inner {
            PoolInner::Posix(pool) => pool.barrier.release_all(),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.barrier.release_all(),
        }
    }

    /// Block until every worker is parked on the barrier again.
    pub fn wait_for_workers_idle(&self) {
        match &self.inner {
            PoolInner::Posix(pool) => pool.barrier.wait_for_all(),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.barrier.wait_for_all(),
        }
    }

    /// Run one generation: release all workers and block until they have all
    /// returned to the barrier.
    ///
    /// The preferred per-period dispatch; unlike the split pair, no outside
    /// observer can see the pool half-reassembled between release and wait.
    pub fn wake_and_wait(&self) {
        match &self.inner {
            PoolInner::Posix(pool) => pool.barrier.release_and_wait(),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.barrier.release_and_wait(),
        }
    }

    /// Number of workers currently in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        match &self.inner {
            PoolInner::Posix(pool) => pool.workers.len(),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.workers.len(),
        }
    }

    /// Snapshot of `(core_id, worker_count)` per configured core.
    #[must_use]
    pub fn core_loads(&self) -> Vec<(usize, usize)> {
        match &self.inner {
            PoolInner::Posix(pool) => pool.cores.loads(),
            #[cfg(feature = "xenomai")]
            PoolInner::Cobalt(pool) => pool.cores.loads(),
        }
    }
}

struct PoolImpl<S: ThreadServices> {
    running: Arc<AtomicBool>,
    barrier: Arc<TriggeredBarrier<S>>,
    workers: Vec<WorkerThread<S>>,
    cores: CoreTable,
    disable_denormals: bool,
    break_on_mode_switch: bool,
    apple: Option<ApplePoolData>,
}

impl<S: ThreadServices> PoolImpl<S> {
    fn new(config: PoolConfig) -> Result<Self, PoolError> {
        tracing::debug!(
            domain = S::DOMAIN,
            cores = config.cores,
            "creating worker pool"
        );
        Ok(Self {
            running: Arc::new(AtomicBool::new(true)),
            barrier: Arc::new(TriggeredBarrier::new()?),
            workers: Vec::new(),
            cores: CoreTable::for_pool(config.cores),
            disable_denormals: config.disable_denormals,
            break_on_mode_switch: config.break_on_mode_switch,
            apple: config.apple,
        })
    }

    fn add_worker(
        &mut self,
        callback: WorkerCallback,
        options: WorkerOptions,
    ) -> Result<(), AddWorkerError> {
        let core_index = match options.core {
            Some(id) => self
                .cores
                .index_of(id)
                .ok_or_else(|| AddWorkerError::new(WorkerPoolStatus::InvalidArguments))?,
            None => self.cores.pick_auto(),
        };
        let core_id = self.cores.id_at(core_index);

        let mut worker = WorkerThread::new(
            Arc::clone(&self.barrier),
            callback,
            Arc::clone(&self.running),
            self.disable_denormals,
            self.break_on_mode_switch,
            self.apple.clone(),
        );

        // Everything below is transactional: each mutation is reverted on
        // the failure paths so a failed call leaves no trace.
        self.barrier.set_expected(self.workers.len() + 1);
        self.cores.add_worker_at(core_index);

        if let Err(errno) = worker.run(options.priority, core_id) {
            self.barrier.set_expected(self.workers.len());
            self.cores.remove_worker_at(core_index);
            let status = WorkerPoolStatus::from_errno(errno);
            tracing::warn!(errno, %status, "worker spawn failed");
            return Err(AddWorkerError::new(status));
        }

        self.workers.push(worker);
        // The caller is guaranteed a parked worker once we return.
        self.barrier.wait_for_all();

        let platform_status = self
            .workers
            .last()
            .map(WorkerThread::init_status)
            .unwrap_or_default();
        if platform_status != crate::apple::ThreadingStatus::Ok {
            self.retire_last_worker(core_index);
            tracing::warn!(%platform_status, "worker platform init failed");
            return Err(AddWorkerError::with_platform(
                WorkerPoolStatus::Error,
                platform_status,
            ));
        }

        tracing::debug!(
            core = core_id,
            priority = options.priority,
            workers = self.workers.len(),
            "worker added"
        );
        Ok(())
    }

    /// Back out the worker that was just added and parked: stop it, release
    /// the (fully parked) barrier once so it can exit, shrink the expected
    /// count, join it, and wait for the surviving workers to park again.
    fn retire_last_worker(&mut self, core_index: usize) {
        let Some(worker) = self.workers.pop() else {
            return;
        };
        worker.request_stop();
        self.barrier.release_all();
        self.barrier.set_expected(self.workers.len());
        // Joins the stopping thread.
        drop(worker);
        self.cores.remove_worker_at(core_index);
        self.barrier.wait_for_all();
    }
}

impl<S: ThreadServices> Drop for PoolImpl<S> {
    fn drop(&mut self) {
        self.barrier.wait_for_all();
        self.running.store(false, Ordering::Release);
        self.barrier.release_all();
        tracing::debug!(workers = self.workers.len(), "worker pool shutting down");
        // The workers vector drops next, joining each thread in
        // registration order.
    }
}
