//! Time-constraint scheduling and workgroup membership, macOS only.

use super::{AudioWorkgroup, ThreadingStatus};

const THREAD_TIME_CONSTRAINT_POLICY: u32 = 2;
const THREAD_TIME_CONSTRAINT_POLICY_COUNT: u32 = 4;
const KERN_SUCCESS: libc::c_int = 0;

#[repr(C)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

#[repr(C)]
struct ThreadTimeConstraintPolicy {
    period: u32,
    computation: u32,
    constraint: u32,
    preemptible: u32,
}

/// `os_workgroup_join_token_s` from `os/workgroup_object.h`.
#[repr(C)]
struct RawJoinToken {
    sig: u32,
    opaque: [u8; 36],
}

extern "C" {
    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> libc::c_int;
    fn thread_policy_set(
        thread: libc::mach_port_t,
        flavor: u32,
        policy_info: *mut u32,
        count: u32,
    ) -> libc::c_int;
    fn pthread_mach_thread_np(thread: libc::pthread_t) -> libc::mach_port_t;

    fn os_workgroup_join(
        workgroup: *mut std::ffi::c_void,
        token: *mut RawJoinToken,
    ) -> libc::c_int;
    fn os_workgroup_leave(workgroup: *mut std::ffi::c_void, token: *mut RawJoinToken);
    fn os_workgroup_testcancel(workgroup: *mut std::ffi::c_void) -> bool;
}

/// Move the calling thread onto the time-constraint scheduling class with
/// the given period. This is a prerequisite for joining an audio workgroup.
///
/// Returns false when the kernel rejects the policy.
#[must_use]
pub fn set_current_thread_to_realtime(period_ms: f64) -> bool {
    let mut timebase = MachTimebaseInfo { numer: 0, denom: 0 };
    // SAFETY: timebase is a valid out-parameter; the policy struct is
    // exactly THREAD_TIME_CONSTRAINT_POLICY_COUNT words.
    unsafe {
        mach_timebase_info(&mut timebase);
        let ticks_per_ms =
            (f64::from(timebase.denom) * 1_000_000.0) / f64::from(timebase.numer);
        let period_ticks = (period_ms * ticks_per_ms).min(f64::from(u32::MAX)) as u32;

        // The computation budget spans the whole period: workers own their
        // core for the duration of a generation.
        let mut policy = ThreadTimeConstraintPolicy {
            period: period_ticks,
            computation: period_ticks,
            constraint: period_ticks,
            preemptible: 1,
        };

        let status = thread_policy_set(
            pthread_mach_thread_np(libc::pthread_self()),
            THREAD_TIME_CONSTRAINT_POLICY,
            std::ptr::addr_of_mut!(policy).cast(),
            THREAD_TIME_CONSTRAINT_POLICY_COUNT,
        );
        status == KERN_SUCCESS
    }
}

/// Token held while a thread is a workgroup member.
///
/// Threads must leave workgroups in the reverse order they joined them, and
/// must leave before exiting.
pub struct WorkgroupJoinToken {
    workgroup: *mut std::ffi::c_void,
    token: RawJoinToken,
}

/// Join `workgroup` from the calling (already realtime) thread.
///
/// Returns the status and, on an actual join, the token needed to leave.
pub fn join_workgroup(
    workgroup: Option<&AudioWorkgroup>,
) -> (ThreadingStatus, Option<WorkgroupJoinToken>) {
    let Some(workgroup) = workgroup else {
        return (ThreadingStatus::NoWorkgroupPassed, None);
    };
    let raw = workgroup.raw();

    // SAFETY: raw is a valid os_workgroup_t per AudioWorkgroup::from_raw.
    unsafe {
        if os_workgroup_testcancel(raw) {
            return (ThreadingStatus::WorkgroupAlreadyCancelled, None);
        }

        let mut token = RawJoinToken {
            sig: 0,
            opaque: [0; 36],
        };
        match os_workgroup_join(raw, &mut token) {
            0 => (
                ThreadingStatus::Ok,
                Some(WorkgroupJoinToken {
                    workgroup: raw,
                    token,
                }),
            ),
            libc::EINVAL => (ThreadingStatus::WorkgroupAlreadyCancelled, None),
            // Already a member; nothing to join and nothing to leave later.
            libc::EALREADY => (ThreadingStatus::Ok, None),
            _ => (ThreadingStatus::WorkgroupJoiningUnknownFailure, None),
        }
    }
}

/// Leave a previously joined workgroup. Consumes the token.
pub fn leave_workgroup(mut token: WorkgroupJoinToken) {
    // SAFETY: the token came from a successful os_workgroup_join on this
    // workgroup and has not been used to leave yet.
    unsafe {
        os_workgroup_leave(token.workgroup, &mut token.token);
    }
}
