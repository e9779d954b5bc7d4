//! Per-thread realtime marker.
//!
//! Worker threads enter an [`RtScope`] for the duration of their body so that
//! code running inside a worker callback can detect its scheduling domain.
//! The counter is thread-local: marking one thread says nothing about any
//! other thread.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static RT_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as executing in the realtime domain for the
/// lifetime of the guard.
///
/// Scopes nest: the thread reads as realtime until the outermost guard is
/// dropped. The guard is neither `Send` nor `Sync`; it must be dropped on the
/// thread that created it.
pub struct RtScope {
    _not_send: PhantomData<*const ()>,
}

impl RtScope {
    /// Enter a realtime scope on the calling thread.
    #[must_use = "the thread is only marked realtime while the guard is alive"]
    pub fn enter() -> Self {
        RT_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for RtScope {
    fn drop(&mut self) {
        RT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Returns true if the calling thread is currently executing as a realtime
/// worker.
#[must_use]
pub fn is_current_thread_realtime() -> bool {
    RT_DEPTH.with(|depth| depth.get() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_thread_is_not_realtime() {
        assert!(!is_current_thread_realtime());
    }

    #[test]
    fn test_scope_marks_only_its_thread() {
        let _scope = RtScope::enter();
        assert!(is_current_thread_realtime());

        let handle = std::thread::spawn(is_current_thread_realtime);
        assert!(!handle.join().expect("thread panicked"));
    }

    #[test]
    fn test_scopes_nest() {
        let outer = RtScope::enter();
        {
            let inner = RtScope::enter();
            assert!(is_current_thread_realtime());
            drop(inner);
        }
        assert!(is_current_thread_realtime());
        drop(outer);
        assert!(!is_current_thread_realtime());
    }
}
