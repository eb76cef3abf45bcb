//! The dispatcher: thread-state machine and scheduler-global state.
//!
//! All scheduler-owned mutable state lives in one [`Scheduler`] value inside
//! a process-wide cell. The struct methods are pure bookkeeping over the
//! registry, the ready queue and the sleep set; the free functions wrap them
//! in the critical-section discipline, arm the quantum timer and perform the
//! context switch. That split keeps every state transition testable without
//! touching signals or stacks.
//!
//! A dispatch is the only point where one logical thread's code yields to
//! another: tick the sleep set, wake the expired non-blocked sleepers to the
//! ready tail, pop the head, account one quantum globally and one for the
//! chosen thread, re-arm the timer and switch. An empty ready queue at
//! dispatch is an invariant violation, not a reachable state, because the
//! main thread can neither block nor sleep.

use core::cell::UnsafeCell;

use crate::arch::{self, Context};
use crate::errors::{ThreadError, ThreadResult};
use crate::mem::StackPool;
use crate::sched::{ReadyQueue, SleepSet};
use crate::thread::{Registry, Tcb, ThreadEntry, ThreadId, ThreadState};
use crate::timer::{self, PreemptionGuard};

struct SchedulerCell {
    cell: UnsafeCell<Option<Scheduler>>,
}

// Accessed only with quantum-expiry delivery suspended, from the single OS
// thread that hosts every logical thread.
unsafe impl Sync for SchedulerCell {}

static SCHEDULER: SchedulerCell = SchedulerCell {
    cell: UnsafeCell::new(None),
};

/// Exclusive view of the scheduler state.
///
/// The caller must have delivery suspended and must drop the borrow before
/// any context switch; switch operands travel as raw pointers instead.
fn scheduler_mut() -> ThreadResult<&'static mut Scheduler> {
    let slot = unsafe { &mut *SCHEDULER.cell.get() };
    slot.as_mut().ok_or(ThreadError::InvalidOperation(
        "thread library not initialized",
    ))
}

/// Operands of a context switch, computed under the scheduler borrow and
/// consumed after it ends.
struct SwitchPlan {
    /// Where to spill the suspended thread's state; `None` abandons the
    /// calling context, as when it has just been terminated.
    save: Option<*mut Context>,
    resume: *const Context,
    quantum_usecs: u64,
}

/// Arm a fresh quantum and transfer the physical executor.
///
/// Returns when the suspended thread is dispatched again. A plan without a
/// save slot spills into a discarded local and never actually returns, since
/// nothing holds a pointer to that local.
fn perform_switch(plan: SwitchPlan) {
    timer::arm(plan.quantum_usecs);
    match plan.save {
        Some(save) => unsafe { arch::switch(save, plan.resume) },
        None => {
            let mut discard = Context::default();
            unsafe { arch::switch(&mut discard, plan.resume) }
        }
    }
}

/// First frame of every spawned thread.
///
/// Control arrives here from the dispatch that first switches the thread in,
/// with delivery still suspended by whichever operation triggered it; the
/// entry point is fetched under that protection, then delivery is re-enabled
/// and user code runs. An entry that returns terminates its own thread.
extern "C" fn thread_start() -> ! {
    let entry = {
        let sched = scheduler_mut().expect("a thread was dispatched without a scheduler");
        sched
            .registry
            .get(sched.current)
            .expect("dispatched thread has a live TCB")
            .entry()
            .expect("spawned thread has an entry point")
    };
    timer::resume_delivery();
    entry();
    let _ = terminate(current_thread_id());
    unreachable!("terminated thread was dispatched again")
}

/// Initialize the thread library.
///
/// Establishes the calling thread as thread 0, running in its first quantum,
/// and starts the preemption timer. Must be called once, before any other
/// operation; the quantum length in microseconds is fixed for the lifetime
/// of the process.
pub fn init(quantum_usecs: u64) -> ThreadResult<()> {
    if quantum_usecs == 0 {
        return Err(ThreadError::InvalidArgument(
            "quantum length must be positive",
        ));
    }
    let _guard = PreemptionGuard::enter();
    let slot = unsafe { &mut *SCHEDULER.cell.get() };
    if slot.is_some() {
        return Err(ThreadError::InvalidOperation(
            "thread library already initialized",
        ));
    }
    timer::install()?;
    *slot = Some(Scheduler::bootstrap(quantum_usecs));
    timer::arm(quantum_usecs);
    log::debug!("thread library initialized, quantum {quantum_usecs} us");
    Ok(())
}

/// Whether [`init`] has completed.
pub fn is_initialized() -> bool {
    let _guard = PreemptionGuard::enter();
    unsafe { &*SCHEDULER.cell.get() }.is_some()
}

/// Create a new thread running `entry` and append it to the ready-queue
/// tail.
///
/// The new thread gets the lowest free id and a private fixed-size stack.
/// Fails with `CapacityExceeded` once `MAX_THREADS` threads are live.
pub fn spawn(entry: ThreadEntry) -> ThreadResult<ThreadId> {
    let _guard = PreemptionGuard::enter();
    let sched = scheduler_mut()?;
    let id = sched.spawn(entry)?;
    log::trace!("spawned thread {id}");
    Ok(id)
}

/// Terminate the thread `id` and release its resources.
///
/// Terminating thread 0 releases every control block and stack buffer and
/// ends the process; that path never returns, regardless of the caller.
/// A thread terminating itself never returns either; the executor moves to
/// the ready-queue head.
pub fn terminate(id: ThreadId) -> ThreadResult<()> {
    let _guard = PreemptionGuard::enter();
    let plan = {
        let sched = scheduler_mut()?;
        if id.is_main() {
            sched.release_all();
            timer::disarm();
            log::debug!("main thread terminated, exiting");
            std::process::exit(0);
        }
        match sched.terminate(id)? {
            Some(plan) => plan,
            None => {
                log::trace!("terminated thread {id}");
                return Ok(());
            }
        }
    };
    perform_switch(plan);
    unreachable!("terminated thread was dispatched again")
}

/// Block the thread `id` until a later [`resume`].
///
/// Blocking thread 0 is refused. Blocking an already blocked thread is a
/// successful no-op. A thread blocking itself triggers a dispatch and this
/// call returns only once the thread is resumed and dispatched again.
pub fn block(id: ThreadId) -> ThreadResult<()> {
    let _guard = PreemptionGuard::enter();
    let plan = {
        let sched = scheduler_mut()?;
        match sched.block(id)? {
            Some(plan) => plan,
            None => return Ok(()),
        }
    };
    perform_switch(plan);
    Ok(())
}

/// Clear the blocked condition of thread `id`.
///
/// Resuming a running or ready thread is a successful no-op. A resumed
/// thread still inside a sleep countdown stays out of the ready queue until
/// the countdown expires.
pub fn resume(id: ThreadId) -> ThreadResult<()> {
    let _guard = PreemptionGuard::enter();
    scheduler_mut()?.resume(id)
}

/// Put the calling thread to sleep for `num_quantums` dispatches.
///
/// The thread leaves the executor immediately and rejoins the ready-queue
/// tail once `num_quantums` further dispatches have occurred, later if it
/// is also blocked. Thread 0 cannot sleep. The call returns when the
/// thread is dispatched again.
pub fn sleep(num_quantums: u64) -> ThreadResult<()> {
    let _guard = PreemptionGuard::enter();
    let plan = scheduler_mut()?.sleep_current(num_quantums)?;
    perform_switch(plan);
    Ok(())
}

/// Voluntarily surrender the rest of the current quantum.
///
/// The calling thread moves to the ready-queue tail and the head is
/// dispatched, exactly as if the quantum timer had expired. A no-op before
/// [`init`].
pub fn yield_now() {
    let _guard = PreemptionGuard::enter();
    let plan = {
        let slot = unsafe { &mut *SCHEDULER.cell.get() };
        match slot.as_mut() {
            Some(sched) => sched.preempt_current(),
            None => return,
        }
    };
    perform_switch(plan);
}

/// Timer-driven preemption, entered from the signal handler.
///
/// The kernel blocks further quantum notifications for the duration of the
/// handler, so no guard is taken here; delivery is re-enabled explicitly
/// once this thread runs again, before the handler frame unwinds back into
/// user code.
pub(crate) fn preempt_from_timer() {
    let plan = {
        let slot = unsafe { &mut *SCHEDULER.cell.get() };
        match slot.as_mut() {
            Some(sched) => sched.preempt_current(),
            None => return,
        }
    };
    perform_switch(plan);
    timer::resume_delivery();
}

/// Id of the calling thread. Before [`init`] the caller is, by definition,
/// the would-be main thread.
pub fn current_thread_id() -> ThreadId {
    let _guard = PreemptionGuard::enter();
    unsafe { &*SCHEDULER.cell.get() }
        .as_ref()
        .map(|sched| sched.current)
        .unwrap_or(ThreadId::MAIN)
}

/// Total quantums started since [`init`], the initial main-thread quantum
/// included. Monotonically non-decreasing; 0 before `init`.
pub fn total_quantums() -> u64 {
    let _guard = PreemptionGuard::enter();
    unsafe { &*SCHEDULER.cell.get() }
        .as_ref()
        .map(|sched| sched.total_quantums)
        .unwrap_or(0)
}

/// Number of quantums thread `id` has been dispatched into, 0 for a thread
/// that has never run.
pub fn quantums_of(id: ThreadId) -> ThreadResult<u64> {
    let _guard = PreemptionGuard::enter();
    let sched = scheduler_mut()?;
    sched
        .registry
        .get(id)
        .map(Tcb::run_quantums)
        .ok_or(ThreadError::UnknownThread(id))
}

/// Scheduling state of thread `id`.
pub fn state_of(id: ThreadId) -> ThreadResult<ThreadState> {
    let _guard = PreemptionGuard::enter();
    let sched = scheduler_mut()?;
    sched
        .registry
        .get(id)
        .map(Tcb::state)
        .ok_or(ThreadError::UnknownThread(id))
}

/// Snapshot of thread counts: (live, ready, blocked, sleeping).
///
/// A thread that is both blocked and sleeping counts toward both of the
/// last two. All zeros before [`init`].
pub fn thread_stats() -> (usize, usize, usize, usize) {
    let _guard = PreemptionGuard::enter();
    match unsafe { &*SCHEDULER.cell.get() }.as_ref() {
        Some(sched) => {
            let live = sched.registry.live_count();
            let mut ready = 0;
            let mut blocked = 0;
            let mut sleeping = 0;
            for tcb in sched.registry.iter() {
                let state = tcb.state();
                if state == ThreadState::Ready {
                    ready += 1;
                }
                if state.is_blocked() {
                    blocked += 1;
                }
                if state.is_sleeping() {
                    sleeping += 1;
                }
            }
            (live, ready, blocked, sleeping)
        }
        None => (0, 0, 0, 0),
    }
}

/// Stack-buffer counters: (allocated, released, in use). All zeros before
/// [`init`].
pub fn stack_stats() -> (usize, usize, usize) {
    let _guard = PreemptionGuard::enter();
    unsafe { &*SCHEDULER.cell.get() }
        .as_ref()
        .map(|sched| sched.stacks.stats())
        .unwrap_or((0, 0, 0))
}

/// Scheduler-global state: the registry, both wait structures, the stack
/// pool and the quantum accounting.
struct Scheduler {
    registry: Registry,
    ready: ReadyQueue,
    sleeping: SleepSet,
    stacks: StackPool,
    current: ThreadId,
    total_quantums: u64,
    quantum_usecs: u64,
}

impl Scheduler {
    /// State immediately after `init`: thread 0 alone, running in its first
    /// quantum.
    fn bootstrap(quantum_usecs: u64) -> Scheduler {
        let mut registry = Registry::new();
        let main = registry
            .allocate(Tcb::main_thread)
            .expect("an empty registry has a free slot");
        debug_assert!(main.is_main());
        Scheduler {
            registry,
            ready: ReadyQueue::new(),
            sleeping: SleepSet::new(),
            stacks: StackPool::new(),
            current: main,
            total_quantums: 1,
            quantum_usecs,
        }
    }

    fn spawn(&mut self, entry: ThreadEntry) -> ThreadResult<ThreadId> {
        if self.registry.is_full() {
            return Err(ThreadError::CapacityExceeded);
        }
        let stack = self
            .stacks
            .allocate()
            .ok_or(ThreadError::CapacityExceeded)?;
        let id = self
            .registry
            .allocate(|id| Tcb::spawned(id, stack, entry, thread_start))
            .expect("a free slot was just checked");
        self.ready.enqueue(id);
        Ok(id)
    }

    fn block(&mut self, id: ThreadId) -> ThreadResult<Option<SwitchPlan>> {
        if id.is_main() {
            return Err(ThreadError::InvalidArgument(
                "the main thread cannot be blocked",
            ));
        }
        let tcb = self
            .registry
            .get_mut(id)
            .ok_or(ThreadError::UnknownThread(id))?;
        if tcb.state().is_blocked() {
            return Ok(None);
        }
        let was_running = tcb.state() == ThreadState::Running;
        tcb.block();
        self.ready.remove(id);
        if was_running {
            Ok(Some(self.prepare_dispatch(Some(id))))
        } else {
            Ok(None)
        }
    }

    fn resume(&mut self, id: ThreadId) -> ThreadResult<()> {
        let tcb = self
            .registry
            .get_mut(id)
            .ok_or(ThreadError::UnknownThread(id))?;
        if tcb.clear_blocked() {
            self.ready.enqueue(id);
        }
        Ok(())
    }

    fn sleep_current(&mut self, quantums: u64) -> ThreadResult<SwitchPlan> {
        if self.current.is_main() {
            return Err(ThreadError::InvalidOperation(
                "the main thread cannot sleep",
            ));
        }
        if quantums == 0 {
            return Err(ThreadError::InvalidArgument(
                "sleep length must be positive",
            ));
        }
        let id = self.current;
        let tcb = self
            .registry
            .get_mut(id)
            .expect("the running thread has a live TCB");
        tcb.sleep();
        self.sleeping.insert(id, quantums);
        Ok(self.prepare_dispatch(Some(id)))
    }

    fn terminate(&mut self, id: ThreadId) -> ThreadResult<Option<SwitchPlan>> {
        if !self.registry.contains(id) {
            return Err(ThreadError::UnknownThread(id));
        }
        self.ready.remove(id);
        self.sleeping.remove(id);
        let mut tcb = self.registry.free(id).expect("a live TCB was just checked");
        if let Some(stack) = tcb.take_stack() {
            // A thread terminating itself keeps executing on this buffer
            // until the switch; the pool holds the memory alive.
            self.stacks.release(stack);
        }
        if id == self.current {
            Ok(Some(self.prepare_dispatch(None)))
        } else {
            Ok(None)
        }
    }

    /// Move the running thread to the ready tail and dispatch the head.
    /// Shared by the timer handler and the voluntary yield.
    fn preempt_current(&mut self) -> SwitchPlan {
        let id = self.current;
        let tcb = self
            .registry
            .get_mut(id)
            .expect("the running thread has a live TCB");
        tcb.set_ready();
        self.ready.enqueue(id);
        self.prepare_dispatch(Some(id))
    }

    /// One dispatch: tick the sleep set, wake expired non-blocked sleepers
    /// to the tail, pop the head, account the quantum, hand back the switch
    /// operands.
    fn prepare_dispatch(&mut self, save_for: Option<ThreadId>) -> SwitchPlan {
        for id in self.sleeping.tick() {
            let tcb = self
                .registry
                .get_mut(id)
                .expect("a sleeping thread has a live TCB");
            if tcb.clear_sleeping() {
                self.ready.enqueue(id);
            }
        }
        let next = self
            .ready
            .dequeue_next()
            .expect("ready queue empty at dispatch; scheduler invariant violated");
        self.current = next;
        self.total_quantums += 1;
        let resume: *const Context = {
            let tcb = self
                .registry
                .get_mut(next)
                .expect("the dispatched thread has a live TCB");
            tcb.dispatch();
            tcb.context_ptr()
        };
        let save = save_for.map(|id| {
            self.registry
                .get_mut(id)
                .expect("the suspended thread has a live TCB")
                .context_ptr()
        });
        SwitchPlan {
            save,
            resume,
            quantum_usecs: self.quantum_usecs,
        }
    }

    /// Free every live control block and stack buffer. Only the
    /// process-exit path calls this.
    fn release_all(&mut self) {
        for id in self.registry.live_ids() {
            let mut tcb = self.registry.free(id).expect("live id from the registry");
            if let Some(stack) = tcb.take_stack() {
                self.stacks.release(stack);
            }
        }
        self.ready.clear();
        self.sleeping.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_entry() {}

    /// Run one preemption-shaped dispatch, discarding the switch operands;
    /// tests exercise the bookkeeping only.
    fn dispatch(sched: &mut Scheduler) {
        let _ = sched.preempt_current();
    }

    #[test]
    fn bootstrap_establishes_the_first_quantum() {
        let sched = Scheduler::bootstrap(1000);
        assert_eq!(sched.current, ThreadId::MAIN);
        assert_eq!(sched.total_quantums, 1);
        assert_eq!(sched.registry.get(ThreadId::MAIN).unwrap().run_quantums(), 1);
        assert_eq!(
            sched.registry.get(ThreadId::MAIN).unwrap().state(),
            ThreadState::Running
        );
        assert!(sched.ready.is_empty());
    }

    #[test]
    fn spawned_threads_get_ascending_ids_and_fifo_positions() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let b = sched.spawn(noop_entry).unwrap();
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);
        assert_eq!(sched.ready.dequeue_next(), Some(a));
        assert_eq!(sched.ready.dequeue_next(), Some(b));
        assert_eq!(sched.registry.get(a).unwrap().run_quantums(), 0);
    }

    #[test]
    fn spawn_reuses_the_lowest_freed_id() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let b = sched.spawn(noop_entry).unwrap();
        sched.terminate(a).unwrap();
        let c = sched.spawn(noop_entry).unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn spawn_fails_once_capacity_is_reached() {
        let mut sched = Scheduler::bootstrap(1000);
        for _ in 0..crate::MAX_THREADS - 1 {
            sched.spawn(noop_entry).unwrap();
        }
        assert_eq!(sched.spawn(noop_entry), Err(ThreadError::CapacityExceeded));
        // Freeing one slot makes spawn succeed again with that id.
        sched.terminate(ThreadId::new(42)).unwrap();
        assert_eq!(sched.spawn(noop_entry).unwrap(), ThreadId::new(42));
    }

    #[test]
    fn every_dispatch_bumps_both_counters() {
        let mut sched = Scheduler::bootstrap(1000);
        sched.spawn(noop_entry).unwrap();
        let before = sched.total_quantums;
        dispatch(&mut sched);
        dispatch(&mut sched);
        dispatch(&mut sched);
        assert_eq!(sched.total_quantums, before + 3);
        // Main and the spawned thread alternate; dispatch counts split.
        let main_runs = sched.registry.get(ThreadId::MAIN).unwrap().run_quantums();
        let other_runs = sched.registry.get(ThreadId::new(1)).unwrap().run_quantums();
        assert_eq!(main_runs + other_runs, 1 + 3);
    }

    #[test]
    fn blocking_the_main_thread_is_refused() {
        let mut sched = Scheduler::bootstrap(1000);
        assert!(matches!(
            sched.block(ThreadId::MAIN),
            Err(ThreadError::InvalidArgument(_))
        ));
        assert_eq!(sched.registry.get(ThreadId::MAIN).unwrap().state(), ThreadState::Running);
    }

    #[test]
    fn blocking_a_ready_thread_removes_it_from_the_queue() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let b = sched.spawn(noop_entry).unwrap();
        assert!(sched.block(a).unwrap().is_none());
        assert!(!sched.ready.contains(a));
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Blocked);
        // The other thread keeps its position.
        assert_eq!(sched.ready.dequeue_next(), Some(b));
    }

    #[test]
    fn blocking_twice_is_a_quiet_success() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        sched.block(a).unwrap();
        assert!(sched.block(a).unwrap().is_none());
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Blocked);
    }

    #[test]
    fn unknown_ids_are_rejected_everywhere() {
        let mut sched = Scheduler::bootstrap(1000);
        let ghost = ThreadId::new(7);
        assert_eq!(sched.block(ghost).err(), Some(ThreadError::UnknownThread(ghost)));
        assert_eq!(sched.resume(ghost).err(), Some(ThreadError::UnknownThread(ghost)));
        assert_eq!(
            sched.terminate(ghost).err(),
            Some(ThreadError::UnknownThread(ghost))
        );
    }

    #[test]
    fn resume_is_a_no_op_on_ready_threads() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        sched.resume(a).unwrap();
        assert_eq!(sched.ready.len(), 1);
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Ready);
        // And on the running thread.
        sched.resume(ThreadId::MAIN).unwrap();
        assert!(!sched.ready.contains(ThreadId::MAIN));
    }

    #[test]
    fn resumed_blocked_thread_joins_the_tail() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let b = sched.spawn(noop_entry).unwrap();
        sched.block(a).unwrap();
        sched.resume(a).unwrap();
        assert_eq!(sched.ready.dequeue_next(), Some(b));
        assert_eq!(sched.ready.dequeue_next(), Some(a));
    }

    #[test]
    fn sleeping_is_refused_for_main_and_for_zero_lengths() {
        let mut sched = Scheduler::bootstrap(1000);
        assert!(matches!(
            sched.sleep_current(3),
            Err(ThreadError::InvalidOperation(_))
        ));

        // Make a spawned thread current, then a zero-length sleep is an
        // argument error.
        sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        assert_eq!(sched.current.index(), 1);
        assert!(matches!(
            sched.sleep_current(0),
            Err(ThreadError::InvalidArgument(_))
        ));
        assert_eq!(
            sched.registry.get(sched.current).unwrap().state(),
            ThreadState::Running
        );
    }

    #[test]
    fn sleep_rejoins_the_tail_after_exactly_n_dispatches() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        assert_eq!(sched.current, a);

        // Sleep for 3 quantums; the triggered dispatch is the first tick.
        let _ = sched.sleep_current(3).unwrap();
        assert_eq!(sched.current, ThreadId::MAIN);
        assert!(!sched.ready.contains(a));
        assert_eq!(sched.sleeping.remaining(a), Some(2));

        dispatch(&mut sched);
        assert!(!sched.ready.contains(a));
        dispatch(&mut sched);
        assert!(sched.ready.contains(a));
        assert!(sched.sleeping.is_empty());
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Ready);
    }

    #[test]
    fn blocked_sleeper_stays_out_of_the_queue_until_both_clear() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        let _ = sched.sleep_current(2).unwrap();

        sched.block(a).unwrap();
        assert_eq!(
            sched.registry.get(a).unwrap().state(),
            ThreadState::BlockedSleeping
        );

        // Countdown expires while blocked: no enqueue.
        dispatch(&mut sched);
        assert!(sched.sleeping.is_empty());
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Blocked);
        assert!(!sched.ready.contains(a));

        sched.resume(a).unwrap();
        assert!(sched.ready.contains(a));
    }

    #[test]
    fn resuming_a_sleeper_does_not_shorten_the_countdown() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        let _ = sched.sleep_current(2).unwrap();

        sched.resume(a).unwrap();
        assert_eq!(sched.registry.get(a).unwrap().state(), ThreadState::Sleeping);
        assert!(!sched.ready.contains(a));
        assert_eq!(sched.sleeping.remaining(a), Some(1));
    }

    #[test]
    fn terminating_a_sleeper_clears_every_structure() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        let _ = sched.sleep_current(5).unwrap();

        assert!(sched.terminate(a).unwrap().is_none());
        assert!(!sched.registry.contains(a));
        assert!(sched.sleeping.is_empty());
        assert!(!sched.ready.contains(a));
        let (_, _, in_use) = sched.stacks.stats();
        assert_eq!(in_use, 0);
    }

    #[test]
    fn self_termination_dispatches_without_a_save_slot() {
        let mut sched = Scheduler::bootstrap(1000);
        let a = sched.spawn(noop_entry).unwrap();
        let _ = sched.preempt_current();
        assert_eq!(sched.current, a);

        let plan = sched.terminate(a).unwrap().expect("a running thread switches away");
        assert!(plan.save.is_none());
        assert_eq!(sched.current, ThreadId::MAIN);
        assert!(!sched.registry.contains(a));
    }

    #[test]
    fn release_all_balances_the_stack_counters() {
        let mut sched = Scheduler::bootstrap(1000);
        for _ in 0..5 {
            sched.spawn(noop_entry).unwrap();
        }
        let (allocated, _, in_use) = sched.stacks.stats();
        assert_eq!((allocated, in_use), (5, 5));

        sched.release_all();
        assert_eq!(sched.registry.live_count(), 0);
        let (allocated, released, in_use) = sched.stacks.stats();
        assert_eq!(allocated, 5);
        assert_eq!(released, 5);
        assert_eq!(in_use, 0);
    }

    #[test]
    #[should_panic(expected = "ready queue empty at dispatch")]
    fn dispatch_from_an_empty_queue_is_fatal() {
        let mut sched = Scheduler::bootstrap(1000);
        let _ = sched.prepare_dispatch(None);
    }
}
