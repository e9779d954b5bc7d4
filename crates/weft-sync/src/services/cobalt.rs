//! Cobalt (Xenomai dual-kernel) binding of the thread services.
//!
//! Cobalt re-implements the pthread surface behind `__cobalt_`-prefixed
//! symbols so that waits and wakes stay inside the realtime kernel instead of
//! bouncing through Linux. The primitive memory layouts are the plain
//! pthread/semaphore types; only the entry points differ. Threads created
//! here are scheduled by the Cobalt core from birth.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use super::{
    thread_trampoline, MutexGuard, PreparedAttributes, ServiceCondVar, ServiceJoinHandle,
    ServiceMutex, ServiceSemaphore, ThreadAttributes, ThreadEntry, ThreadServices,
};
use crate::error::SyncResult;

#[link(name = "cobalt")]
extern "C" {
    fn __cobalt_pthread_mutex_init(
        mutex: *mut libc::pthread_mutex_t,
        attr: *const libc::pthread_mutexattr_t,
    ) -> libc::c_int;
    fn __cobalt_pthread_mutex_destroy(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
    fn __cobalt_pthread_mutex_lock(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
    fn __cobalt_pthread_mutex_unlock(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;

    fn __cobalt_pthread_cond_init(
        cond: *mut libc::pthread_cond_t,
        attr: *const libc::pthread_condattr_t,
    ) -> libc::c_int;
    fn __cobalt_pthread_cond_destroy(cond: *mut libc::pthread_cond_t) -> libc::c_int;
    fn __cobalt_pthread_cond_wait(
        cond: *mut libc::pthread_cond_t,
        mutex: *mut libc::pthread_mutex_t,
    ) -> libc::c_int;
    fn __cobalt_pthread_cond_signal(cond: *mut libc::pthread_cond_t) -> libc::c_int;

    fn __cobalt_sem_init(
        sem: *mut libc::sem_t,
        pshared: libc::c_int,
        value: libc::c_uint,
    ) -> libc::c_int;
    fn __cobalt_sem_destroy(sem: *mut libc::sem_t) -> libc::c_int;
    fn __cobalt_sem_wait(sem: *mut libc::sem_t) -> libc::c_int;
    fn __cobalt_sem_post(sem: *mut libc::sem_t) -> libc::c_int;

    fn __cobalt_pthread_create(
        thread: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        entry: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
        argument: *mut libc::c_void,
    ) -> libc::c_int;
    fn __cobalt_pthread_join(
        thread: libc::pthread_t,
        retval: *mut *mut libc::c_void,
    ) -> libc::c_int;
}

/// The Cobalt realtime threading domain.
pub enum Cobalt {}

impl ThreadServices for Cobalt {
    type Mutex = CobaltMutex;
    type CondVar = CobaltCondVar;
    type Semaphore = CobaltSemaphore;
    type JoinHandle = CobaltJoinHandle;

    const DOMAIN: &'static str = "cobalt";

    fn mutex() -> SyncResult<CobaltMutex> {
        Ok(CobaltMutex::new())
    }

    fn cond_var() -> SyncResult<CobaltCondVar> {
        Ok(CobaltCondVar::new())
    }

    fn semaphore() -> SyncResult<CobaltSemaphore> {
        Ok(CobaltSemaphore::new())
    }

    fn spawn(
        attributes: &ThreadAttributes,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<CobaltJoinHandle, i32> {
        let prepared = PreparedAttributes::new(attributes)?;
        let payload: *mut ThreadEntry = Box::into_raw(Box::new(entry));
        let mut handle: libc::pthread_t = unsafe { std::mem::zeroed() };
        // SAFETY: prepared outlives the call; payload is a leaked
        // Box<ThreadEntry> the trampoline reclaims exactly once.
        let res = unsafe {
            __cobalt_pthread_create(
                &mut handle,
                prepared.as_ptr(),
                thread_trampoline,
                payload.cast(),
            )
        };
        if res != 0 {
            drop(unsafe { Box::from_raw(payload) });
            return Err(res);
        }
        Ok(CobaltJoinHandle {
            handle,
            joined: false,
        })
    }
}

/// Cobalt kernel mutex.
pub struct CobaltMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: the Cobalt mutex serializes all access to itself.
unsafe impl Send for CobaltMutex {}
unsafe impl Sync for CobaltMutex {}

impl CobaltMutex {
    fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(unsafe {
            MaybeUninit::<libc::pthread_mutex_t>::zeroed().assume_init()
        }));
        // SAFETY: inner points to writable storage that never moves again.
        let res = unsafe { __cobalt_pthread_mutex_init(inner.get(), std::ptr::null()) };
        assert_eq!(res, 0, "cobalt mutex init failed: {res}");
        Self { inner }
    }

    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl ServiceMutex for CobaltMutex {
    fn lock(&self) {
        // SAFETY: raw() points to a live, initialized mutex.
        let res = unsafe { __cobalt_pthread_mutex_lock(self.raw()) };
        debug_assert_eq!(res, 0, "cobalt mutex lock failed: {res}");
    }

    fn unlock(&self) {
        // SAFETY: raw() points to a live, initialized mutex held by us.
        let res = unsafe { __cobalt_pthread_mutex_unlock(self.raw()) };
        debug_assert_eq!(res, 0, "cobalt mutex unlock failed: {res}");
    }
}

impl Drop for CobaltMutex {
    fn drop(&mut self) {
        // SAFETY: initialized in new(), not held at drop time.
        unsafe {
            __cobalt_pthread_mutex_destroy(self.raw());
        }
    }
}

/// Cobalt kernel condition variable paired with [`CobaltMutex`].
pub struct CobaltCondVar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: Cobalt condition variables are thread-safe by contract.
unsafe impl Send for CobaltCondVar {}
unsafe impl Sync for CobaltCondVar {}

impl CobaltCondVar {
    fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(unsafe {
            MaybeUninit::<libc::pthread_cond_t>::zeroed().assume_init()
        }));
        // SAFETY: inner points to writable storage that never moves again.
        let res = unsafe { __cobalt_pthread_cond_init(inner.get(), std::ptr::null()) };
        assert_eq!(res, 0, "cobalt cond init failed: {res}");
        Self { inner }
    }
}

impl ServiceCondVar<CobaltMutex> for CobaltCondVar {
    fn wait(&self, guard: &MutexGuard<'_, CobaltMutex>) {
        // SAFETY: the guard proves the mutex is held by this thread.
        let res = unsafe { __cobalt_pthread_cond_wait(self.inner.get(), guard.mutex().raw()) };
        debug_assert_eq!(res, 0, "cobalt cond wait failed: {res}");
    }

    fn signal(&self) {
        // SAFETY: inner points to a live, initialized condition variable.
        let res = unsafe { __cobalt_pthread_cond_signal(self.inner.get()) };
        debug_assert_eq!(res, 0, "cobalt cond signal failed: {res}");
    }
}

impl Drop for CobaltCondVar {
    fn drop(&mut self) {
        // SAFETY: initialized in new(), no waiters remain at drop time.
        unsafe {
            __cobalt_pthread_cond_destroy(self.inner.get());
        }
    }
}

/// Unnamed Cobalt semaphore with an initial count of zero.
pub struct CobaltSemaphore {
    inner: Box<UnsafeCell<libc::sem_t>>,
}

// SAFETY: sem_wait/sem_post are thread-safe on a shared semaphore.
unsafe impl Send for CobaltSemaphore {}
unsafe impl Sync for CobaltSemaphore {}

impl CobaltSemaphore {
    fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(unsafe {
            MaybeUninit::<libc::sem_t>::zeroed().assume_init()
        }));
        // SAFETY: inner points to writable storage that never moves again.
        let res = unsafe { __cobalt_sem_init(inner.get(), 0, 0) };
        assert_eq!(res, 0, "cobalt sem init failed");
        Self { inner }
    }
}

impl ServiceSemaphore for CobaltSemaphore {
    fn wait(&self) {
        loop {
            // SAFETY: inner points to a live, initialized semaphore.
            if unsafe { __cobalt_sem_wait(self.inner.get()) } == 0 {
                return;
            }
            let errno = super::last_errno();
            assert_eq!(errno, libc::EINTR, "cobalt sem wait failed: {errno}");
        }
    }

    fn post(&self) {
        // SAFETY: inner points to a live, initialized semaphore.
        let res = unsafe { __cobalt_sem_post(self.inner.get()) };
        debug_assert_eq!(res, 0, "cobalt sem post failed");
    }
}

impl Drop for CobaltSemaphore {
    fn drop(&mut self) {
        // SAFETY: initialized in new(), no waiters remain at drop time.
        unsafe {
            __cobalt_sem_destroy(self.inner.get());
        }
    }
}

/// Handle to a thread spawned by [`Cobalt::spawn`]. Joins on drop if not
/// joined explicitly.
pub struct CobaltJoinHandle {
    handle: libc::pthread_t,
    joined: bool,
}

// SAFETY: pthread_join may be called from any thread.
unsafe impl Send for CobaltJoinHandle {}

impl ServiceJoinHandle for CobaltJoinHandle {
    fn join(mut self) {
        self.join_inner();
    }
}

impl CobaltJoinHandle {
    fn join_inner(&mut self) {
        if self.joined {
            return;
        }
        self.joined = true;
        // SAFETY: handle refers to a joinable thread not yet joined.
        let res = unsafe { __cobalt_pthread_join(self.handle, std::ptr::null_mut()) };
        debug_assert_eq!(res, 0, "cobalt pthread join failed: {res}");
    }
}

impl Drop for CobaltJoinHandle {
    fn drop(&mut self) {
        self.join_inner();
    }
}
