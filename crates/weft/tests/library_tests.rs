//! Tests for the ambient library surface: realtime markers, the realtime
//! clock, version information and realtime-safe printing.

use std::time::Duration;

#[test]
fn test_fresh_threads_are_not_realtime() {
    assert!(!weft::is_current_thread_realtime());

    let handle = std::thread::spawn(weft::is_current_thread_realtime);
    assert!(!handle.join().expect("thread panicked"));
}

#[test]
fn test_rt_time_advances() {
    let first = weft::current_rt_time();
    std::thread::sleep(Duration::from_micros(100));
    let second = weft::current_rt_time();
    assert!(second > first);
}

#[test]
fn test_rt_time_is_monotonic_within_a_thread() {
    let mut previous = weft::current_rt_time();
    for _ in 0..1000 {
        let now = weft::current_rt_time();
        assert!(now >= previous);
        previous = now;
    }
}

#[test]
fn test_version_is_consistent() {
    let version = weft::version();
    assert_eq!(version, weft::version());
    assert!(weft::build_info().contains(&format!(
        "{}.{}.{}",
        version.major, version.minor, version.revision
    )));
}

#[test]
fn test_denormal_flag_is_callable_anywhere() {
    // Per-thread and idempotent.
    weft::set_flush_denormals_to_zero();
    weft::set_flush_denormals_to_zero();
}

#[test]
fn test_rt_println_formats() {
    weft::rt_println!("pool of {} workers ready", 4);
}
