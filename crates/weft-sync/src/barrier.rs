//! Triggered rendezvous barrier.
//!
//! A [`TriggeredBarrier`] is an N-way gate that the driver thread, not a
//! participating worker, decides when to open. Workers park on the barrier
//! between audio periods; once per period the driver releases all of them at
//! once, lets them run, and waits until every one of them has returned to the
//! barrier before assembling the period's output.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SyncResult;
use crate::services::{
    MutexGuard, Posix, ServiceCondVar, ServiceSemaphore, ThreadServices,
};

/// A reusable N-way gate opened by an external driver thread.
///
/// Workers call [`wait`](Self::wait); the driver calls
/// [`wait_for_all`](Self::wait_for_all), [`release_all`](Self::release_all)
/// or the fused [`release_and_wait`](Self::release_and_wait).
///
/// Internally the barrier keeps two semaphores and flips between them on
/// every release. With a single semaphore a fast worker could run its
/// callback, re-enter `wait` and steal a post intended for a slower sibling
/// of the same generation; the flip makes every post unambiguously belong to
/// the current generation. The inactive semaphore always has a count of zero:
/// each released worker consumed exactly one post, and new posts only land on
/// the other one.
///
/// # RT-Safety
///
/// All operations are allocation-free. The only blocking points are the
/// semaphore wait (workers, after the internal mutex is released) and the
/// condition-variable wait (driver). Underlying primitive failures are
/// programming errors and assert; the hot path has no error channel.
pub struct TriggeredBarrier<S: ThreadServices = Posix> {
    mutex: S::Mutex,
    all_present: S::CondVar,
    semaphores: [S::Semaphore; 2],
    active_idx: AtomicUsize,
    /// Workers currently parked, counting those between the increment and
    /// their semaphore wait. Mutated only with `mutex` held.
    present: AtomicUsize,
    /// Expected worker count. Mutated only with `mutex` held.
    expected: AtomicUsize,
}

impl<S: ThreadServices> TriggeredBarrier<S> {
    /// Create a barrier expecting zero workers.
    ///
    /// # Errors
    ///
    /// Fails if the underlying semaphores cannot be allocated.
    pub fn new() -> SyncResult<Self> {
        Ok(Self {
            mutex: S::mutex()?,
            all_present: S::cond_var()?,
            semaphores: [S::semaphore()?, S::semaphore()?],
            active_idx: AtomicUsize::new(0),
            present: AtomicUsize::new(0),
            expected: AtomicUsize::new(0),
        })
    }

    /// Park the calling worker until the driver opens the gate.
    ///
    /// Registers the caller as present (waking the driver if it completes the
    /// set) and blocks on the current generation's semaphore. Returns when
    /// the driver subsequently releases the barrier.
    pub fn wait(&self) {
        let active = {
            let guard = MutexGuard::lock(&self.mutex);
            let active = self.active_idx.load(Ordering::Relaxed);
            let present = self.present.load(Ordering::Relaxed) + 1;
            self.present.store(present, Ordering::Relaxed);
            if present >= self.expected.load(Ordering::Relaxed) {
                self.all_present.signal();
            }
            drop(guard);
            active
        };
        // The semaphore index was captured under the lock: a release that
        // happens between the unlock and this wait has already posted for us
        // on that same semaphore.
        self.semaphores[active].wait();
    }

    /// Block the driver until every expected worker is parked.
    ///
    /// Returns immediately if all workers are already present.
    pub fn wait_for_all(&self) {
        let guard = MutexGuard::lock(&self.mutex);
        self.wait_for_all_locked(&guard);
    }

    /// Update the expected worker count.
    ///
    /// Driver-side only; called while no release is in flight (the pool calls
    /// it from `add_worker` and its cleanup paths).
    pub fn set_expected(&self, workers: usize) {
        let _guard = MutexGuard::lock(&self.mutex);
        self.expected.store(workers, Ordering::Relaxed);
    }

    /// Release every parked worker, starting the next generation.
    ///
    /// # Panics
    ///
    /// Panics if not all expected workers are parked; releasing a partially
    /// assembled set is a driver-side programming error.
    pub fn release_all(&self) {
        let guard = MutexGuard::lock(&self.mutex);
        self.release_locked(&guard);
    }

    /// Release every parked worker and wait for all of them to come back.
    ///
    /// Equivalent to [`release_all`](Self::release_all) followed by
    /// [`wait_for_all`](Self::wait_for_all), except that the internal mutex
    /// is held across both halves: no outside observer can catch the barrier
    /// in a "released but not yet reassembled" state between them. This is
    /// the preferred form for synchronous per-period dispatch.
    pub fn release_and_wait(&self) {
        let guard = MutexGuard::lock(&self.mutex);
        self.release_locked(&guard);
        self.wait_for_all_locked(&guard);
    }

    fn wait_for_all_locked(&self, guard: &MutexGuard<'_, S::Mutex>) {
        while self.present.load(Ordering::Relaxed) < self.expected.load(Ordering::Relaxed) {
            self.all_present.wait(guard);
        }
    }

    fn release_locked(&self, _guard: &MutexGuard<'_, S::Mutex>) {
        let expected = self.expected.load(Ordering::Relaxed);
        assert_eq!(
            self.present.load(Ordering::Relaxed),
            expected,
            "barrier released with workers still running"
        );
        self.present.store(0, Ordering::Relaxed);
        let previous = self.active_idx.fetch_xor(1, Ordering::Relaxed);
        for _ in 0..expected {
            self.semaphores[previous].post();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_barrier_expects_no_workers() {
        let barrier: TriggeredBarrier = TriggeredBarrier::new().expect("barrier construction");
        // With nothing expected both driver calls are immediate no-ops.
        barrier.wait_for_all();
        barrier.release_all();
        barrier.release_and_wait();
    }

    #[test]
    fn test_release_flips_the_active_semaphore() {
        let barrier: TriggeredBarrier = TriggeredBarrier::new().expect("barrier construction");
        assert_eq!(barrier.active_idx.load(Ordering::Relaxed), 0);
        barrier.release_all();
        assert_eq!(barrier.active_idx.load(Ordering::Relaxed), 1);
        barrier.release_all();
        assert_eq!(barrier.active_idx.load(Ordering::Relaxed), 0);
    }

    #[test]
    #[should_panic(expected = "workers still running")]
    fn test_release_with_missing_workers_panics() {
        let barrier: TriggeredBarrier = TriggeredBarrier::new().expect("barrier construction");
        barrier.set_expected(2);
        barrier.release_all();
    }
}
