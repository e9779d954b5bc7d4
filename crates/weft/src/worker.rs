//! Worker thread lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use weft_sync::services::{ServiceJoinHandle, ThreadAttributes, ThreadServices};
use weft_sync::{RtScope, TriggeredBarrier};

use crate::apple::{ApplePoolData, ThreadingStatus};
use crate::denormals::set_flush_denormals_to_zero;

/// The per-generation work a worker runs.
pub(crate) type WorkerCallback = Box<dyn FnMut() + Send + 'static>;

/// Everything a worker needs to start, bundled at construction and moved
/// into the spawned thread by [`WorkerThread::run`].
struct WorkerSetup<S: ThreadServices> {
    barrier: Arc<TriggeredBarrier<S>>,
    callback: WorkerCallback,
    pool_running: Arc<AtomicBool>,
    thread_running: Arc<AtomicBool>,
    init_status: Arc<OnceLock<ThreadingStatus>>,
    disable_denormals: bool,
    break_on_mode_switch: bool,
    apple: Option<ApplePoolData>,
}

/// One realtime worker: an OS thread parked on the pool's barrier between
/// generations.
pub(crate) struct WorkerThread<S: ThreadServices> {
    handle: Option<S::JoinHandle>,
    thread_running: Arc<AtomicBool>,
    init_status: Arc<OnceLock<ThreadingStatus>>,
    setup: Option<WorkerSetup<S>>,
}

impl<S: ThreadServices> WorkerThread<S> {
    pub(crate) fn new(
        barrier: Arc<TriggeredBarrier<S>>,
        callback: WorkerCallback,
        pool_running: Arc<AtomicBool>,
        disable_denormals: bool,
        break_on_mode_switch: bool,
        apple: Option<ApplePoolData>,
    ) -> Self {
        let thread_running = Arc::new(AtomicBool::new(true));
        let init_status = Arc::new(OnceLock::new());
        Self {
            handle: None,
            thread_running: Arc::clone(&thread_running),
            init_status: Arc::clone(&init_status),
            setup: Some(WorkerSetup {
                barrier,
                callback,
                pool_running,
                thread_running,
                init_status,
                disable_denormals,
                break_on_mode_switch,
                apple,
            }),
        }
    }

    /// Spawn the worker under `SCHED_FIFO` at `priority`, pinned to `core`
    /// where the platform supports affinity.
    ///
    /// # Errors
    ///
    /// Returns the raw OS error number: `EINVAL` for a priority outside
    /// [0, 100], otherwise whatever thread creation reported.
    pub(crate) fn run(&mut self, priority: i32, core: usize) -> Result<(), i32> {
        if !(0..=100).contains(&priority) {
            return Err(libc::EINVAL);
        }
        let setup = self.setup.take().ok_or(libc::EINVAL)?;
        let attributes = ThreadAttributes {
            priority,
            affinity: Some(core),
        };
        match S::spawn(&attributes, Box::new(move || worker_body(setup))) {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(errno) => Err(errno),
        }
    }

    /// Platform init outcome recorded by the thread before its first park.
    pub(crate) fn init_status(&self) -> ThreadingStatus {
        self.init_status.get().copied().unwrap_or_default()
    }

    /// Ask the thread to exit on its next wakeup. The pool pairs this with a
    /// barrier release and a join.
    pub(crate) fn request_stop(&self) {
        self.thread_running.store(false, Ordering::Release);
    }
}

impl<S: ThreadServices> Drop for WorkerThread<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join();
        }
    }
}

fn worker_body<S: ThreadServices>(setup: WorkerSetup<S>) {
    let WorkerSetup {
        barrier,
        mut callback,
        pool_running,
        thread_running,
        init_status,
        disable_denormals,
        break_on_mode_switch,
        apple,
    } = setup;

    let _rt = RtScope::enter();

    if disable_denormals {
        set_flush_denormals_to_zero();
    }

    #[cfg(feature = "xenomai")]
    if break_on_mode_switch {
        enable_break_on_mode_switch();
    }
    #[cfg(not(feature = "xenomai"))]
    let _ = break_on_mode_switch;

    let platform = platform_init(apple.as_ref());
    let _ = init_status.set(platform.status);

    loop {
        barrier.wait();
        // Checked on the way out of the park so a stopping pool can release
        // workers without running another generation.
        if !pool_running.load(Ordering::Acquire) || !thread_running.load(Ordering::Acquire) {
            break;
        }
        callback();
    }

    #[cfg(target_os = "macos")]
    if let Some(token) = platform.workgroup_token {
        crate::apple::leave_workgroup(token);
    }
}

struct PlatformInit {
    status: ThreadingStatus,
    #[cfg(target_os = "macos")]
    workgroup_token: Option<crate::apple::WorkgroupJoinToken>,
}

/// Apple realtime setup for this thread: time-constraint policy first, then
/// workgroup membership. Records the first failure.
#[cfg(target_os = "macos")]
fn platform_init(apple: Option<&ApplePoolData>) -> PlatformInit {
    let Some(data) = apple else {
        return PlatformInit {
            status: ThreadingStatus::Ok,
            workgroup_token: None,
        };
    };

    if !crate::apple::set_current_thread_to_realtime(data.period_ms()) {
        return PlatformInit {
            status: ThreadingStatus::RealtimeFailed,
            workgroup_token: None,
        };
    }

    let (status, workgroup_token) = crate::apple::join_workgroup(data.workgroup.as_ref());
    PlatformInit {
        status,
        workgroup_token,
    }
}

#[cfg(not(target_os = "macos"))]
fn platform_init(apple: Option<&ApplePoolData>) -> PlatformInit {
    let _ = apple;
    PlatformInit {
        status: ThreadingStatus::Ok,
    }
}

#[cfg(feature = "xenomai")]
fn enable_break_on_mode_switch() {
    // PTHREAD_WARNSW from cobalt/pthread.h: SIGDEBUG on every switch out of
    // the realtime domain.
    const PTHREAD_WARNSW: libc::c_int = 0x2;

    #[link(name = "cobalt")]
    extern "C" {
        fn pthread_setmode_np(
            clear_mask: libc::c_int,
            set_mask: libc::c_int,
            mode: *mut libc::c_int,
        ) -> libc::c_int;
    }

    // SAFETY: plain mode-flag syscall on the calling thread.
    unsafe {
        pthread_setmode_np(0, PTHREAD_WARNSW, std::ptr::null_mut());
    }
}
