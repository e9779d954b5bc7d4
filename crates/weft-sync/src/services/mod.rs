//! Thread services: the OS capability set the synchronization layer builds on.
//!
//! A [`ThreadServices`] binding supplies mutexes, condition variables,
//! counting semaphores and attribute-driven thread spawning for one threading
//! domain. [`Posix`] is the generic binding used on desktop Linux and macOS;
//! the `xenomai` feature adds `Cobalt` for dual-kernel realtime systems.
//! The binding is a compile-time parameter of the barrier and the worker
//! pool, so each domain is monomorphized with zero dispatch cost.

mod posix;

#[cfg(feature = "xenomai")]
mod cobalt;

pub use posix::{NamedSemaphore, Posix, PosixCondVar, PosixJoinHandle, PosixMutex};

#[cfg(feature = "xenomai")]
pub use cobalt::{Cobalt, CobaltCondVar, CobaltJoinHandle, CobaltMutex, CobaltSemaphore};

use std::mem::MaybeUninit;

use crate::error::SyncResult;

/// Scheduling attributes for a realtime worker thread.
///
/// Workers always run under a fixed-priority preemptive policy (`SCHED_FIFO`)
/// with explicit scheduling inheritance.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAttributes {
    /// `SCHED_FIFO` priority. The caller validates the range before spawning.
    pub priority: i32,
    /// Core to pin the thread to. Ignored on platforms without settable
    /// affinity (macOS manages placement through workgroups).
    pub affinity: Option<usize>,
}

/// Raw mutex bound to one threading domain.
///
/// Lock and unlock failures are programming errors and assert; the barrier's
/// hot path has no recoverable error channel.
pub trait ServiceMutex: Send + Sync + 'static {
    /// Acquire the mutex, blocking as needed.
    fn lock(&self);
    /// Release the mutex. Caller must hold it.
    fn unlock(&self);
}

/// Condition variable usable with the matching [`ServiceMutex`].
pub trait ServiceCondVar<M: ServiceMutex>: Send + Sync + 'static {
    /// Atomically release the guarded mutex and block until signaled. The
    /// mutex is reacquired before this returns. Spurious wakeups are
    /// possible; callers loop on their predicate.
    fn wait(&self, guard: &MutexGuard<'_, M>);
    /// Wake one waiter.
    fn signal(&self);
}

/// Counting semaphore.
pub trait ServiceSemaphore: Send + Sync + 'static {
    /// Block until the count is positive, then decrement it.
    fn wait(&self);
    /// Increment the count, waking one waiter if any.
    fn post(&self);
}

/// Handle to a spawned worker thread.
pub trait ServiceJoinHandle: Send + 'static {
    /// Block until the thread returns.
    fn join(self);
}

/// One threading domain's bindings.
pub trait ThreadServices: Send + Sync + 'static {
    /// Mutex type for this domain.
    type Mutex: ServiceMutex;
    /// Condition-variable type for this domain.
    type CondVar: ServiceCondVar<Self::Mutex>;
    /// Semaphore type for this domain.
    type Semaphore: ServiceSemaphore;
    /// Thread handle type for this domain.
    type JoinHandle: ServiceJoinHandle;

    /// Domain name used in diagnostics.
    const DOMAIN: &'static str;

    /// Create a mutex.
    fn mutex() -> SyncResult<Self::Mutex>;
    /// Create a condition variable.
    fn cond_var() -> SyncResult<Self::CondVar>;
    /// Create a semaphore with an initial count of zero.
    fn semaphore() -> SyncResult<Self::Semaphore>;

    /// Spawn a joinable thread with an explicit fixed-priority attribute set.
    ///
    /// # Errors
    ///
    /// Returns the raw OS error number from thread creation so the caller
    /// can classify it (`EAGAIN`, `EPERM`, `EINVAL`, ...).
    fn spawn(
        attributes: &ThreadAttributes,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<Self::JoinHandle, i32>;
}

/// RAII lock over a [`ServiceMutex`].
pub struct MutexGuard<'a, M: ServiceMutex> {
    mutex: &'a M,
}

impl<'a, M: ServiceMutex> MutexGuard<'a, M> {
    /// Acquire `mutex` and return a guard that releases it on drop.
    pub fn lock(mutex: &'a M) -> Self {
        mutex.lock();
        Self { mutex }
    }

    /// The mutex this guard holds. For condition-variable implementations,
    /// which need the underlying primitive while the lock is held.
    pub fn mutex(&self) -> &M {
        self.mutex
    }
}

impl<M: ServiceMutex> Drop for MutexGuard<'_, M> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

pub(crate) type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Entry point handed to `pthread_create`. `argument` is a leaked
/// `Box<ThreadEntry>` whose ownership transfers to the new thread.
pub(crate) extern "C" fn thread_trampoline(argument: *mut libc::c_void) -> *mut libc::c_void {
    // SAFETY: the spawner leaked exactly one Box<ThreadEntry> into `argument`
    // and never touches it again.
    let entry = unsafe { Box::from_raw(argument.cast::<ThreadEntry>()) };
    entry();
    std::ptr::null_mut()
}

/// A fully populated `pthread_attr_t`, destroyed on drop.
pub(crate) struct PreparedAttributes {
    attr: libc::pthread_attr_t,
}

impl PreparedAttributes {
    /// Build the attribute set for a realtime worker: joinable, explicit
    /// scheduling, `SCHED_FIFO` at the requested priority, and affinity to a
    /// single core where the platform supports it.
    pub(crate) fn new(attributes: &ThreadAttributes) -> Result<Self, i32> {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        // SAFETY: attr is a valid uninitialized pthread_attr_t slot; every
        // setter below operates on it only after pthread_attr_init succeeds.
        unsafe {
            let res = libc::pthread_attr_init(attr.as_mut_ptr());
            if res != 0 {
                return Err(res);
            }
            let mut attr = attr.assume_init();

            libc::pthread_attr_setdetachstate(&mut attr, libc::PTHREAD_CREATE_JOINABLE);
            libc::pthread_attr_setinheritsched(&mut attr, libc::PTHREAD_EXPLICIT_SCHED);
            libc::pthread_attr_setschedpolicy(&mut attr, libc::SCHED_FIFO);
            let param = libc::sched_param {
                sched_priority: attributes.priority,
            };
            libc::pthread_attr_setschedparam(&mut attr, &param);

            #[cfg(target_os = "linux")]
            if let Some(core) = attributes.affinity {
                let mut cpus: libc::cpu_set_t = std::mem::zeroed();
                libc::CPU_SET(core, &mut cpus);
                let res = libc::pthread_attr_setaffinity_np(
                    &mut attr,
                    std::mem::size_of::<libc::cpu_set_t>(),
                    &cpus,
                );
                if res != 0 {
                    libc::pthread_attr_destroy(&mut attr);
                    return Err(res);
                }
            }
            #[cfg(not(target_os = "linux"))]
            let _ = attributes.affinity;

            Ok(Self { attr })
        }
    }

    pub(crate) fn as_ptr(&self) -> *const libc::pthread_attr_t {
        &self.attr
    }
}

impl Drop for PreparedAttributes {
    fn drop(&mut self) {
        // SAFETY: attr was initialized by pthread_attr_init in new().
        unsafe {
            libc::pthread_attr_destroy(&mut self.attr);
        }
    }
}

pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
