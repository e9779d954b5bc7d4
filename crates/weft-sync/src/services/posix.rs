//! Generic POSIX binding of the thread services.
//!
//! Mutexes and condition variables wrap the pthread primitives directly so
//! that priority inheritance can be enabled where the platform offers it.
//! Semaphores are named POSIX semaphores: macOS has no working unnamed
//! semaphores, and a single implementation keeps both desktop platforms on
//! the same code path.

use std::cell::UnsafeCell;
use std::ffi::CString;
use std::mem::MaybeUninit;

use rand::Rng;

use super::{
    last_errno, thread_trampoline, MutexGuard, PreparedAttributes, ServiceCondVar,
    ServiceJoinHandle, ServiceMutex, ServiceSemaphore, ThreadAttributes, ThreadEntry,
    ThreadServices,
};
use crate::error::{SyncError, SyncResult};

/// The generic POSIX threading domain.
pub enum Posix {}

impl ThreadServices for Posix {
    type Mutex = PosixMutex;
    type CondVar = PosixCondVar;
    type Semaphore = NamedSemaphore;
    type JoinHandle = PosixJoinHandle;

    const DOMAIN: &'static str = "posix";

    fn mutex() -> SyncResult<PosixMutex> {
        Ok(PosixMutex::new())
    }

    fn cond_var() -> SyncResult<PosixCondVar> {
        Ok(PosixCondVar::new())
    }

    fn semaphore() -> SyncResult<NamedSemaphore> {
        NamedSemaphore::create(SEMAPHORE_PREFIX)
    }

    fn spawn(
        attributes: &ThreadAttributes,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<PosixJoinHandle, i32> {
        let prepared = PreparedAttributes::new(attributes)?;
        let payload: *mut ThreadEntry = Box::into_raw(Box::new(entry));
        let mut handle: libc::pthread_t = unsafe { std::mem::zeroed() };
        // SAFETY: prepared outlives the call; payload is a leaked
        // Box<ThreadEntry> the trampoline reclaims exactly once.
        let res = unsafe {
            libc::pthread_create(
                &mut handle,
                prepared.as_ptr(),
                thread_trampoline,
                payload.cast(),
            )
        };
        if res != 0 {
            // pthread_create did not take ownership of the payload.
            drop(unsafe { Box::from_raw(payload) });
            return Err(res);
        }
        Ok(PosixJoinHandle {
            handle,
            joined: false,
        })
    }
}

/// pthread mutex with priority inheritance enabled on Linux.
///
/// Heap-pinned: pthread primitives must not move once initialized.
pub struct PosixMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: the pthread mutex serializes all access to itself.
unsafe impl Send for PosixMutex {}
unsafe impl Sync for PosixMutex {}

impl PosixMutex {
    fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(unsafe {
            MaybeUninit::<libc::pthread_mutex_t>::zeroed().assume_init()
        }));
        // SAFETY: inner points to writable storage that never moves again.
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            let res = libc::pthread_mutexattr_init(attr.as_mut_ptr());
            assert_eq!(res, 0, "pthread_mutexattr_init failed: {res}");
            let mut attr = attr.assume_init();
            #[cfg(target_os = "linux")]
            libc::pthread_mutexattr_setprotocol(&mut attr, libc::PTHREAD_PRIO_INHERIT);
            let res = libc::pthread_mutex_init(inner.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            assert_eq!(res, 0, "pthread_mutex_init failed: {res}");
        }
        Self { inner }
    }

    pub(crate) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl ServiceMutex for PosixMutex {
    fn lock(&self) {
        // SAFETY: raw() points to a live, initialized mutex.
        let res = unsafe { libc::pthread_mutex_lock(self.raw()) };
        debug_assert_eq!(res, 0, "pthread_mutex_lock failed: {res}");
    }

    fn unlock(&self) {
        // SAFETY: raw() points to a live, initialized mutex held by us.
        let res = unsafe { libc::pthread_mutex_unlock(self.raw()) };
        debug_assert_eq!(res, 0, "pthread_mutex_unlock failed: {res}");
    }
}

impl Drop for PosixMutex {
    fn drop(&mut self) {
        // SAFETY: initialized in new(), not held at drop time.
        unsafe {
            libc::pthread_mutex_destroy(self.raw());
        }
    }
}

/// pthread condition variable paired with [`PosixMutex`].
pub struct PosixCondVar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: pthread condition variables are thread-safe by contract.
unsafe impl Send for PosixCondVar {}
unsafe impl Sync for PosixCondVar {}

impl PosixCondVar {
    fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(unsafe {
            MaybeUninit::<libc::pthread_cond_t>::zeroed().assume_init()
        }));
        // SAFETY: inner points to writable storage that never moves again.
        let res = unsafe { libc::pthread_cond_init(inner.get(), std::ptr::null()) };
        assert_eq!(res, 0, "pthread_cond_init failed: {res}");
        Self { inner }
    }
}

impl ServiceCondVar<PosixMutex> for PosixCondVar {
    fn wait(&self, guard: &MutexGuard<'_, PosixMutex>) {
        // SAFETY: the guard proves the mutex is held by this thread.
        let res = unsafe { libc::pthread_cond_wait(self.inner.get(), guard.mutex().raw()) };
        debug_assert_eq!(res, 0, "pthread_cond_wait failed: {res}");
    }

    fn signal(&self) {
        // SAFETY: inner points to a live, initialized condition variable.
        let res = unsafe { libc::pthread_cond_signal(self.inner.get()) };
        debug_assert_eq!(res, 0, "pthread_cond_signal failed: {res}");
    }
}

impl Drop for PosixCondVar {
    fn drop(&mut self) {
        // SAFETY: initialized in new(), no waiters remain at drop time.
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}

const SEMAPHORE_PREFIX: &str = "weft-sem";
const CREATE_ATTEMPTS: u32 = 100;

/// Named POSIX semaphore with an initial count of zero.
///
/// Names are a fixed prefix plus a random suffix; creation retries on
/// collision. [`NamedSemaphore::create`] unlinks the name immediately after
/// opening so the semaphore behaves like an anonymous one and cannot leak a
/// name; [`NamedSemaphore::create_named`] keeps the name registered until the
/// semaphore is dropped.
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: Option<CString>,
}

// SAFETY: sem_wait/sem_post are thread-safe on a shared sem_t handle.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create a semaphore whose name is unlinked right away.
    pub(crate) fn create(prefix: &str) -> SyncResult<Self> {
        Self::create_inner(prefix, true)
    }

    /// Create a semaphore that stays registered under its name until drop.
    pub(crate) fn create_named(prefix: &str) -> SyncResult<Self> {
        Self::create_inner(prefix, false)
    }

    fn create_inner(prefix: &str, unlink_now: bool) -> SyncResult<Self> {
        let mut last = 0;
        for attempt in 1..=CREATE_ATTEMPTS {
            let suffix: u32 = rand::thread_rng().gen();
            let name = CString::new(format!("/{prefix}-{suffix:08x}"))
                .expect("semaphore name contains no interior NUL");
            // SAFETY: name is a valid NUL-terminated string; O_EXCL makes the
            // create-or-retry loop race-free.
            let sem = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    0o600 as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            if sem == libc::SEM_FAILED {
                last = last_errno();
                if last == libc::EEXIST {
                    continue;
                }
                return Err(SyncError::SemaphoreAllocation {
                    attempts: attempt,
                    last_errno: last,
                });
            }
            if unlink_now {
                // SAFETY: we own the name we just created.
                unsafe {
                    libc::sem_unlink(name.as_ptr());
                }
                return Ok(Self { sem, name: None });
            }
            return Ok(Self {
                sem,
                name: Some(name),
            });
        }
        Err(SyncError::SemaphoreAllocation {
            attempts: CREATE_ATTEMPTS,
            last_errno: last,
        })
    }
}

impl ServiceSemaphore for NamedSemaphore {
    fn wait(&self) {
        loop {
            // SAFETY: sem is a live handle from sem_open.
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return;
            }
            let errno = last_errno();
            assert_eq!(errno, libc::EINTR, "sem_wait failed: {errno}");
        }
    }

    fn post(&self) {
        // SAFETY: sem is a live handle from sem_open.
        let res = unsafe { libc::sem_post(self.sem) };
        debug_assert_eq!(res, 0, "sem_post failed");
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: sem is a live handle; the name, if still registered, is ours.
        unsafe {
            if let Some(name) = &self.name {
                libc::sem_unlink(name.as_ptr());
            }
            libc::sem_close(self.sem);
        }
    }
}

/// Handle to a thread spawned by [`Posix::spawn`]. Joins on drop if not
/// joined explicitly.
pub struct PosixJoinHandle {
    handle: libc::pthread_t,
    joined: bool,
}

// SAFETY: pthread_join may be called from any thread.
unsafe impl Send for PosixJoinHandle {}

impl ServiceJoinHandle for PosixJoinHandle {
    fn join(mut self) {
        self.join_inner();
    }
}

impl PosixJoinHandle {
    fn join_inner(&mut self) {
        if self.joined {
            return;
        }
        self.joined = true;
        // SAFETY: handle refers to a joinable thread not yet joined.
        let res = unsafe { libc::pthread_join(self.handle, std::ptr::null_mut()) };
        debug_assert_eq!(res, 0, "pthread_join failed: {res}");
    }
}

impl Drop for PosixJoinHandle {
    fn drop(&mut self) {
        self.join_inner();
    }
}
