//! # Context Switch
//!
//! Low-level assembly routines for switching between user-level threads.
//!
//! The context switch saves the current thread's callee-saved registers and
//! restores the next thread's, effectively switching execution. The resume
//! address is never stored in [`CpuContext`]: it is the return address the
//! `call` into [`context_switch`] left on the suspended thread's stack.

use core::arch::naked_asm;
use core::fmt;
use core::mem::offset_of;

use static_assertions::{assert_eq_size, const_assert_eq};

use crate::{StartFn, STACK_ALIGN};

/// Default MXCSR: all exceptions masked, round to nearest
const MXCSR_DEFAULT: u32 = 0x1F80;

/// Default x87 control word: all exceptions masked, 64-bit precision
const FPU_CW_DEFAULT: u16 = 0x037F;

/// CPU register context saved during context switch
///
/// Do not reorder these fields: the offsets are compiled into
/// [`context_switch`] as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CpuContext {
    /// Stack pointer, pointing at the resume address
    pub rsp: u64,
    // Callee-saved registers (must be preserved across function calls)
    /// rbx
    pub rbx: u64,
    /// Frame pointer
    pub rbp: u64,
    /// r12
    pub r12: u64,
    /// r13
    pub r13: u64,
    /// r14
    pub r14: u64,
    /// r15
    pub r15: u64,
    /// SSE control/status register (control bits are callee-saved)
    pub mxcsr: u32,
    /// x87 control word (callee-saved)
    pub fpu_cw: u16,
    _reserved: u16,
}

assert_eq_size!(CpuContext, [u64; 8]);
const_assert_eq!(offset_of!(CpuContext, rsp), 0x00);
const_assert_eq!(offset_of!(CpuContext, rbx), 0x08);
const_assert_eq!(offset_of!(CpuContext, rbp), 0x10);
const_assert_eq!(offset_of!(CpuContext, r12), 0x18);
const_assert_eq!(offset_of!(CpuContext, r13), 0x20);
const_assert_eq!(offset_of!(CpuContext, r14), 0x28);
const_assert_eq!(offset_of!(CpuContext, r15), 0x30);
const_assert_eq!(offset_of!(CpuContext, mxcsr), 0x38);
const_assert_eq!(offset_of!(CpuContext, fpu_cw), 0x3C);

impl CpuContext {
    /// Context of a thread that has never been saved
    pub const fn empty() -> Self {
        Self {
            rsp: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            mxcsr: MXCSR_DEFAULT,
            fpu_cw: FPU_CW_DEFAULT,
            _reserved: 0,
        }
    }

    /// Saved stack pointer
    pub fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for CpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rsp: {:#018x}", self.rsp)?;
        writeln!(f, "rbx: {:#018x}  rbp: {:#018x}", self.rbx, self.rbp)?;
        writeln!(f, "r12: {:#018x}  r13: {:#018x}", self.r12, self.r13)?;
        writeln!(f, "r14: {:#018x}  r15: {:#018x}", self.r14, self.r15)?;
        write!(f, "mxcsr: {:#06x}  fcw: {:#06x}", self.mxcsr, self.fpu_cw)
    }
}

/// Perform a context switch from one thread to another
///
/// Saves the callee-saved registers and stack pointer into `old`, loads those
/// recorded in `new` and returns into the restored thread. The call returns
/// when some thread later switches back to `old`. `old` and `new` may alias,
/// in which case the call returns immediately.
///
/// # Safety
///
/// - `old` must point to valid memory for saving the current context
/// - `new` must hold a context saved by this function or built by
///   [`prepare_stack`], whose stack is still alive
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut CpuContext, _new: *const CpuContext) {
    naked_asm!(
        // Save callee-saved registers to old context (rdi)
        "mov [rdi + {rsp}], rsp",
        "mov [rdi + {rbx}], rbx",
        "mov [rdi + {rbp}], rbp",
        "mov [rdi + {r12}], r12",
        "mov [rdi + {r13}], r13",
        "mov [rdi + {r14}], r14",
        "mov [rdi + {r15}], r15",
        "stmxcsr dword ptr [rdi + {mxcsr}]",
        "fnstcw word ptr [rdi + {fcw}]",
        // Load callee-saved registers from new context (rsi)
        "mov rsp, [rsi + {rsp}]",
        "mov rbx, [rsi + {rbx}]",
        "mov rbp, [rsi + {rbp}]",
        "mov r12, [rsi + {r12}]",
        "mov r13, [rsi + {r13}]",
        "mov r14, [rsi + {r14}]",
        "mov r15, [rsi + {r15}]",
        "ldmxcsr dword ptr [rsi + {mxcsr}]",
        "fldcw word ptr [rsi + {fcw}]",
        // Resumed thread: back to its caller of context_switch
        // Fresh thread: into thread_bootstrap
        "ret",
        rsp = const offset_of!(CpuContext, rsp),
        rbx = const offset_of!(CpuContext, rbx),
        rbp = const offset_of!(CpuContext, rbp),
        r12 = const offset_of!(CpuContext, r12),
        r13 = const offset_of!(CpuContext, r13),
        r14 = const offset_of!(CpuContext, r14),
        r15 = const offset_of!(CpuContext, r15),
        mxcsr = const offset_of!(CpuContext, mxcsr),
        fcw = const offset_of!(CpuContext, fpu_cw),
    );
}

/// First code a fresh thread executes
///
/// Entered by the `ret` of [`context_switch`] with the staged words on top of
/// the stack: `[rsp]` arg0, `[rsp + 8]` arg1, `[rsp + 16]` start routine.
#[unsafe(naked)]
unsafe extern "C" fn thread_bootstrap() -> ! {
    naked_asm!(
        "mov rdi, [rsp]",
        "mov rsi, [rsp + 8]",
        "mov rax, [rsp + 16]",
        // A call needs rsp 16-byte aligned
        "and rsp, -16",
        "call rax",
        "ud2",
    );
}

/// Lay out a fresh stack and build the context that starts it
///
/// Stack layout below `top`:
///
/// ```text
/// top - 8   start routine
/// top - 16  arg1
/// top - 24  arg0
/// top - 32  thread_bootstrap    <- rsp
/// ```
///
/// # Safety
///
/// `top` must be aligned to [`STACK_ALIGN`] and the
/// [`BOOTSTRAP_FRAME_SIZE`](crate::BOOTSTRAP_FRAME_SIZE) bytes below it must be
/// writable memory owned by the new thread.
pub unsafe fn prepare_stack(top: *mut u8, start: StartFn, arg0: usize, arg1: usize) -> CpuContext {
    debug_assert_eq!(top as usize % STACK_ALIGN, 0, "misaligned stack top");

    let words = top.cast::<usize>();
    // SAFETY: the caller guarantees four writable, aligned words below `top`
    let rsp = unsafe {
        words.sub(1).write(start as usize);
        words.sub(2).write(arg1);
        words.sub(3).write(arg0);
        words.sub(4).write(thread_bootstrap as *const () as usize);
        words.sub(4)
    };

    CpuContext {
        rsp: rsp as u64,
        ..CpuContext::empty()
    }
}
