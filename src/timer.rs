//! Preemption timer and critical-section glue.
//!
//! The quantum clock is the process virtual timer: `setitimer(ITIMER_VIRTUAL)`
//! delivers `SIGVTALRM` after the running thread has consumed its quantum of
//! CPU time, and the handler drives the same dispatch path as a voluntary
//! yield. The timer is re-armed with a full quantum on every dispatch, so a
//! newly running thread is never charged for its predecessor's partial slice.
//!
//! Critical sections are signal masking, nothing more: every operation that
//! touches scheduler state first suspends `SIGVTALRM` delivery and resumes it
//! once the mutation and any resulting context switch have completed. The
//! masking calls are absolute rather than save/restore, because a thread
//! suspended mid-switch may be resumed from a code path whose mask differs
//! from the one at suspension; whichever frame continues after a switch
//! re-enables delivery exactly once.
//!
//! The handler itself runs with `SIGVTALRM` already blocked by the kernel,
//! and never while a critical section is open, so it may walk the scheduler
//! structures directly. It must not log or allocate.

use core::mem;
use core::ptr;

use portable_atomic::{AtomicU64, Ordering};

use crate::errors::{ThreadError, ThreadResult};

static PREEMPTIONS: AtomicU64 = AtomicU64::new(0);

/// Number of timer-driven preemptions since `init`.
pub fn preemption_count() -> u64 {
    PREEMPTIONS.load(Ordering::Relaxed)
}

/// Signal handler for the quantum timer.
///
/// Runs on the interrupted thread's stack and suspends it in place; the
/// frame returns (and re-enters the kernel's signal epilogue) only when the
/// thread is dispatched again.
extern "C" fn alarm_handler(_sig: libc::c_int) {
    PREEMPTIONS.fetch_add(1, Ordering::Relaxed);
    crate::scheduler::preempt_from_timer();
}

fn vtalrm_set() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        set
    }
}

/// Suspend delivery of quantum expiry notifications.
pub(crate) fn suspend_delivery() {
    let set = vtalrm_set();
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut());
    }
}

/// Resume delivery; a quantum that expired while suspended is delivered
/// immediately.
pub(crate) fn resume_delivery() {
    let set = vtalrm_set();
    unsafe {
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, ptr::null_mut());
    }
}

/// Critical-section token: delivery is suspended while one is live.
///
/// Operations never nest these; the single open section per thread is
/// closed by whichever frame continues after the dispatcher's switch.
pub(crate) struct PreemptionGuard {
    _not_send: core::marker::PhantomData<*const ()>,
}

impl PreemptionGuard {
    pub(crate) fn enter() -> PreemptionGuard {
        suspend_delivery();
        PreemptionGuard {
            _not_send: core::marker::PhantomData,
        }
    }
}

impl Drop for PreemptionGuard {
    fn drop(&mut self) {
        resume_delivery();
    }
}

/// Install the `SIGVTALRM` handler. Called once from `init`.
pub(crate) fn install() -> ThreadResult<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = alarm_handler as extern "C" fn(libc::c_int) as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        if libc::sigaction(libc::SIGVTALRM, &action, ptr::null_mut()) != 0 {
            return Err(ThreadError::InvalidOperation(
                "failed to install the preemption signal handler",
            ));
        }
    }
    Ok(())
}

/// Arm the virtual timer for one full quantum, replacing whatever remained
/// of the previous one.
pub(crate) fn arm(quantum_usecs: u64) {
    let interval = libc::timeval {
        tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
        tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    let rc = unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) };
    if rc != 0 {
        log::warn!("failed to arm the preemption timer");
    }
}

/// Stop the virtual timer. Only the process-exit path needs this.
pub(crate) fn disarm() {
    let zero = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    let timer = libc::itimerval {
        it_interval: zero,
        it_value: zero,
    };
    unsafe {
        libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut());
    }
}
