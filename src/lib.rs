#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! User-level green threads on a single OS thread.
//!
//! This library multiplexes many logical threads of control onto one
//! physical execution context inside one process, with no kernel threads
//! involved. Scheduling is strict FIFO round-robin: a running thread keeps
//! the executor until its quantum expires, it yields, sleeps, blocks or
//! terminates, and then the longest-waiting ready thread takes over.
//! Preemption is driven by the process virtual timer, so quantums measure
//! consumed CPU time.
//!
//! # Quick Start
//!
//! ```no_run
//! use quantum_threads as threads;
//!
//! fn worker() {
//!     for _ in 0..3 {
//!         threads::yield_now();
//!     }
//!     let me = threads::current_thread_id();
//!     let _ = threads::terminate(me);
//! }
//!
//! fn main() {
//!     threads::init(10_000).expect("initialize the thread library");
//!     threads::spawn(worker).expect("spawn a worker");
//!     while threads::thread_stats().0 > 1 {
//!         threads::yield_now();
//!     }
//!     let _ = threads::terminate(threads::ThreadId::MAIN);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`arch`]: the execution-context switch engine, the one unsafe,
//!   platform-dependent primitive.
//! - [`thread`]: control blocks and the fixed-capacity id registry.
//! - [`sched`]: the FIFO ready queue and the quantum-countdown sleep set.
//! - [`scheduler`]: the dispatcher state machine and the public operations.
//! - [`timer`]: the virtual-timer quantum clock and the signal-masking
//!   critical sections.
//!
//! # Caveats
//!
//! All threads share one OS thread; the process must drive the library from
//! that thread alone. Entry functions either terminate their own thread or
//! return, which terminates it for them.

pub mod arch;
pub mod errors;
pub mod mem;
pub mod sched;
pub mod scheduler;
pub mod thread;
pub mod timer;

#[cfg(not(unix))]
compile_error!("quantum-threads requires a Unix host for its timer and signal plumbing");

/// Maximum number of concurrent threads, the main thread included.
pub const MAX_THREADS: usize = 100;

/// Stack size in bytes for each spawned thread.
///
/// Large enough for ordinary Rust frames plus the signal frame a preemption
/// can push onto the running thread's stack.
pub const STACK_SIZE: usize = 64 * 1024;

// ============================================================================
// Public API
// ============================================================================

// Errors
pub use errors::{ThreadError, ThreadResult};

// Thread identity and state
pub use thread::{ThreadEntry, ThreadId, ThreadState};

// Operations
pub use scheduler::{
    block, current_thread_id, init, is_initialized, quantums_of, resume, sleep, spawn,
    stack_stats, state_of, terminate, thread_stats, total_quantums, yield_now,
};

// Observability
pub use timer::preemption_count;
