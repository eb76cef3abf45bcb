//! x86_64 (System V ABI) context switching.

use core::arch::naked_asm;

use super::RawEntry;

/// Callee-saved machine state of a suspended thread.
///
/// Only the registers the System V ABI requires a callee to preserve are
/// stored; everything else is dead across the `switch` call boundary by
/// definition. The program counter lives on the saved stack as the return
/// address `switch` will pop.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

impl Context {
    /// Build a context whose first switch-in enters `entry` on the given
    /// stack.
    ///
    /// `stack_top` is the highest address of the stack region and must be
    /// 16-byte aligned. The entry address is planted where `switch`'s final
    /// `ret` will pop it, with a null word above it as the frame anchor of a
    /// function that never returns.
    ///
    /// # Safety
    ///
    /// `stack_top` must point one past the end of a writable region of at
    /// least 16 bytes that stays exclusively owned by the new thread.
    pub unsafe fn prepare(stack_top: *mut u8, entry: RawEntry) -> Context {
        debug_assert_eq!(stack_top as usize % 16, 0);
        let slot = unsafe {
            let slot = stack_top.sub(16).cast::<u64>();
            slot.write(entry as usize as u64);
            slot.add(1).write(0);
            slot
        };
        Context {
            rsp: slot as u64,
            ..Context::default()
        }
    }
}

/// Save the caller's state into `save`, then resume `resume`.
///
/// Returns only when a later switch restores `save`. With `save == resume`
/// the call degenerates to a no-op round trip, which is how a thread is
/// re-dispatched into itself.
///
/// # Safety
///
/// Both pointers must reference valid, exclusively accessible [`Context`]
/// values, and `resume` must hold state produced by a previous `switch` or
/// by [`Context::prepare`]. Delivery of the preemption signal must be
/// suspended for the duration of the call.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_save: *mut Context, _resume: *const Context) {
    naked_asm!(
        // Spill callee-saved state into *save (rdi).
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Restore from *resume (rsi).
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // Pops the resumed thread's saved return address: either the
        // instruction after its own `switch` call, or the entry planted by
        // `prepare`.
        "ret",
    );
}
