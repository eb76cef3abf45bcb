//! Execution-context switching, the single platform-dependent primitive.
//!
//! A [`Context`] is an explicit value holding the callee-saved machine state
//! of a suspended logical thread, laid out per the platform ABI. Two
//! operations are exposed:
//!
//! - [`switch`] spills the caller's state into one context and resumes
//!   another. The call returns only when a later switch restores the saved
//!   context; returning from `switch` therefore *is* the "just resumed"
//!   signal, while the saving side never observes the call completing
//!   because control has already left it.
//! - [`Context::prepare`] builds a context whose first switch-in begins a
//!   given entry function at the top of a fresh stack.
//!
//! All inline assembly and raw-pointer manipulation in the crate is confined
//! to this module; everything else treats these two operations as a black
//! box.
//!
//! Delivery of the preemption signal is suspended around every call to
//! [`switch`], so a freshly prepared context starts with no notification
//! pending. The entry trampoline is responsible for re-enabling delivery
//! before user code runs.

/// Entry function for a freshly prepared context.
///
/// The function must never return; a suspended caller no longer exists to
/// return into.
pub type RawEntry = extern "C" fn() -> !;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::{switch, Context};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::{switch, Context};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("quantum-threads supports x86_64 and aarch64 only");
