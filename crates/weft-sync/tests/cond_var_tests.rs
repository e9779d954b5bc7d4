//! Integration tests for the realtime condition variable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use weft_sync::RtConditionVariable;

/// Poll `predicate` until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    predicate()
}

#[test]
fn test_notify_wakes_a_blocked_waiter() {
    let cv = Arc::new(RtConditionVariable::create().expect("condvar construction"));
    let woke = Arc::new(AtomicBool::new(false));

    let waiter = {
        let cv = Arc::clone(&cv);
        let woke = Arc::clone(&woke);
        thread::spawn(move || {
            let notified = cv.wait();
            woke.store(notified, Ordering::Release);
        })
    };

    // The waiter must still be blocked after a grace period.
    thread::sleep(Duration::from_millis(1));
    assert!(!woke.load(Ordering::Acquire));

    cv.notify();
    assert!(
        wait_until(Duration::from_secs(1), || woke.load(Ordering::Acquire)),
        "waiter did not observe the notify"
    );
    waiter.join().expect("waiter panicked");
}

#[test]
fn test_notifies_without_a_waiter_are_not_lost() {
    let cv = RtConditionVariable::create().expect("condvar construction");

    for _ in 0..3 {
        cv.notify();
    }
    // At least one subsequent wait must complete without a further notify;
    // coalescing of the three is permitted.
    assert!(cv.wait());
}

#[test]
fn test_round_trips_repeat() {
    let cv = Arc::new(RtConditionVariable::create().expect("condvar construction"));
    let observed = Arc::new(AtomicBool::new(false));

    for _ in 0..16 {
        observed.store(false, Ordering::Release);
        let waiter = {
            let cv = Arc::clone(&cv);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                while !cv.wait() {}
                observed.store(true, Ordering::Release);
            })
        };
        cv.notify();
        assert!(
            wait_until(Duration::from_secs(1), || observed.load(Ordering::Acquire)),
            "round trip stalled"
        );
        waiter.join().expect("waiter panicked");
    }
}

#[test]
fn test_instances_are_independent() {
    // Each instance binds its own kernel object; notifies must not cross.
    let first = RtConditionVariable::create().expect("condvar construction");
    let second = Arc::new(RtConditionVariable::create().expect("condvar construction"));

    first.notify();

    let second_woke = Arc::new(AtomicBool::new(false));
    let waiter = {
        let second = Arc::clone(&second);
        let second_woke = Arc::clone(&second_woke);
        thread::spawn(move || {
            second.wait();
            second_woke.store(true, Ordering::Release);
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(
        !second_woke.load(Ordering::Acquire),
        "notify leaked across instances"
    );

    second.notify();
    assert!(wait_until(Duration::from_secs(1), || {
        second_woke.load(Ordering::Acquire)
    }));
    waiter.join().expect("waiter panicked");
}

#[test]
fn test_many_instances_coexist() {
    // Name collisions during creation must be resolved internally.
    let variables: Vec<_> = (0..32)
        .map(|_| RtConditionVariable::create().expect("condvar construction"))
        .collect();
    for cv in &variables {
        cv.notify();
        assert!(cv.wait());
    }
}
