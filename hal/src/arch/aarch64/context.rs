//! # Context Switch
//!
//! Low-level assembly routines for switching between user-level threads.
//!
//! The resume address is the saved link register: [`context_switch`] returns
//! through `x30`, so a suspended thread resumes after its own call into the
//! switch and a fresh thread starts in `thread_bootstrap`.

use core::arch::naked_asm;
use core::fmt;
use core::mem::offset_of;

use static_assertions::{assert_eq_size, const_assert_eq};

use crate::{StartFn, BOOTSTRAP_FRAME_SIZE, STACK_ALIGN};

/// CPU register context saved during context switch
///
/// Do not reorder these fields: the offsets are compiled into
/// [`context_switch`] as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CpuContext {
    /// Callee-saved general purpose registers x19..x28
    pub x: [u64; 10],
    /// Frame pointer (x29)
    pub fp: u64,
    /// Link register (x30), the resume address
    pub lr: u64,
    /// Stack pointer
    pub sp: u64,
    /// Low halves of the callee-saved SIMD registers d8..d15
    pub d: [u64; 8],
}

assert_eq_size!(CpuContext, [u64; 21]);
const_assert_eq!(offset_of!(CpuContext, x), 0x00);
const_assert_eq!(offset_of!(CpuContext, fp), 0x50);
const_assert_eq!(offset_of!(CpuContext, lr), 0x58);
const_assert_eq!(offset_of!(CpuContext, sp), 0x60);
const_assert_eq!(offset_of!(CpuContext, d), 0x68);
// fp/lr are moved as one stp/ldp pair
const_assert_eq!(offset_of!(CpuContext, lr), offset_of!(CpuContext, fp) + 8);

impl CpuContext {
    /// Context of a thread that has never been saved
    pub const fn empty() -> Self {
        Self {
            x: [0; 10],
            fp: 0,
            lr: 0,
            sp: 0,
            d: [0; 8],
        }
    }

    /// Saved stack pointer
    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for CpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sp: {:#018x}  fp: {:#018x}  lr: {:#018x}", self.sp, self.fp, self.lr)?;
        for (i, pair) in self.x.chunks(2).enumerate() {
            writeln!(
                f,
                "x{}: {:#018x}  x{}: {:#018x}",
                19 + 2 * i,
                pair[0],
                20 + 2 * i,
                pair[1]
            )?;
        }
        write!(f, "d8..d15: {:x?}", self.d)
    }
}

/// Perform a context switch from one thread to another
///
/// Saves the callee-saved registers and stack pointer into `old`, loads those
/// recorded in `new` and returns into the restored thread. `old` and `new`
/// may alias, in which case the call returns immediately.
///
/// # Safety
///
/// - `old` must point to valid memory for saving the current context
/// - `new` must hold a context saved by this function or built by
///   [`prepare_stack`], whose stack is still alive
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut CpuContext, _new: *const CpuContext) {
    naked_asm!(
        // Save callee-saved registers to old context (x0)
        "stp x19, x20, [x0, #{x19}]",
        "stp x21, x22, [x0, #{x21}]",
        "stp x23, x24, [x0, #{x23}]",
        "stp x25, x26, [x0, #{x25}]",
        "stp x27, x28, [x0, #{x27}]",
        "stp x29, x30, [x0, #{frame}]",
        "mov x9, sp",
        "str x9, [x0, #{stack}]",
        "stp d8, d9, [x0, #{d8}]",
        "stp d10, d11, [x0, #{d10}]",
        "stp d12, d13, [x0, #{d12}]",
        "stp d14, d15, [x0, #{d14}]",
        // Load callee-saved registers from new context (x1)
        "ldp x19, x20, [x1, #{x19}]",
        "ldp x21, x22, [x1, #{x21}]",
        "ldp x23, x24, [x1, #{x23}]",
        "ldp x25, x26, [x1, #{x25}]",
        "ldp x27, x28, [x1, #{x27}]",
        "ldp x29, x30, [x1, #{frame}]",
        "ldr x9, [x1, #{stack}]",
        "mov sp, x9",
        "ldp d8, d9, [x1, #{d8}]",
        "ldp d10, d11, [x1, #{d10}]",
        "ldp d12, d13, [x1, #{d12}]",
        "ldp d14, d15, [x1, #{d14}]",
        "ret",
        x19 = const offset_of!(CpuContext, x),
        x21 = const offset_of!(CpuContext, x) + 2 * 8,
        x23 = const offset_of!(CpuContext, x) + 4 * 8,
        x25 = const offset_of!(CpuContext, x) + 6 * 8,
        x27 = const offset_of!(CpuContext, x) + 8 * 8,
        frame = const offset_of!(CpuContext, fp),
        stack = const offset_of!(CpuContext, sp),
        d8 = const offset_of!(CpuContext, d),
        d10 = const offset_of!(CpuContext, d) + 2 * 8,
        d12 = const offset_of!(CpuContext, d) + 4 * 8,
        d14 = const offset_of!(CpuContext, d) + 6 * 8,
    );
}

/// First code a fresh thread executes
///
/// Entered by the `ret` of [`context_switch`] with `sp` pointing at the staged
/// words: `[sp]` arg0, `[sp, #8]` arg1, `[sp, #16]` start routine.
#[unsafe(naked)]
unsafe extern "C" fn thread_bootstrap() -> ! {
    naked_asm!(
        "ldp x0, x1, [sp]",
        "ldr x9, [sp, #16]",
        "blr x9",
        "brk #0x1",
    );
}

/// Lay out a fresh stack and build the context that starts it
///
/// Stack layout below `top`:
///
/// ```text
/// top - 8   (zero)
/// top - 16  start routine
/// top - 24  arg1
/// top - 32  arg0                <- sp
/// ```
///
/// The synthetic return address lives in the saved link register.
///
/// # Safety
///
/// `top` must be aligned to [`STACK_ALIGN`] and the [`BOOTSTRAP_FRAME_SIZE`]
/// bytes below it must be writable memory owned by the new thread.
pub unsafe fn prepare_stack(top: *mut u8, start: StartFn, arg0: usize, arg1: usize) -> CpuContext {
    debug_assert_eq!(top as usize % STACK_ALIGN, 0, "misaligned stack top");

    // SAFETY: the caller guarantees BOOTSTRAP_FRAME_SIZE writable bytes below `top`
    let sp = unsafe {
        let base = top.sub(BOOTSTRAP_FRAME_SIZE).cast::<usize>();
        base.write(arg0);
        base.add(1).write(arg1);
        base.add(2).write(start as usize);
        base.add(3).write(0);
        base
    };

    CpuContext {
        lr: thread_bootstrap as *const () as usize as u64,
        sp: sp as u64,
        ..CpuContext::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    #[repr(C, align(16))]
    struct TestStack([u8; 16 * 1024]);

    impl TestStack {
        fn boxed() -> Box<Self> {
            Box::new(Self([0; 16 * 1024]))
        }

        fn top(&mut self) -> *mut u8 {
            // SAFETY: one past the end of the array
            unsafe { self.0.as_mut_ptr().add(self.0.len()) }
        }
    }

    unsafe extern "C" fn never_started(_arg0: usize, _arg1: usize) -> ! {
        unreachable!()
    }

    #[test]
    fn test_prepare_stack_layout() {
        let mut stack = TestStack::boxed();
        let top = stack.top();
        let ctx = unsafe { prepare_stack(top, never_started, 0xAAAA, 0xBBBB) };

        assert_eq!(ctx.stack_pointer(), top as usize - BOOTSTRAP_FRAME_SIZE);
        assert_eq!(ctx.stack_pointer() % STACK_ALIGN, 0);
        assert_eq!(ctx.lr, thread_bootstrap as *const () as usize as u64);
        assert_eq!(ctx.fp, 0);

        let words = ctx.stack_pointer() as *const usize;
        unsafe {
            assert_eq!(*words, 0xAAAA);
            assert_eq!(*words.add(1), 0xBBBB);
            assert_eq!(*words.add(2), never_started as *const () as usize);
        }
    }

    struct PingPong {
        main: CpuContext,
        thread: CpuContext,
        counter: u64,
    }

    unsafe extern "C" fn ping(state: usize, step: usize) -> ! {
        let state = state as *mut PingPong;
        loop {
            unsafe {
                (*state).counter += step as u64;
                context_switch(&mut (*state).thread, &(*state).main);
            }
        }
    }

    #[test]
    fn test_switch_round_trip() {
        let mut stack = TestStack::boxed();
        let mut state = Box::new(PingPong {
            main: CpuContext::empty(),
            thread: CpuContext::empty(),
            counter: 0,
        });
        let state_ptr: *mut PingPong = &mut *state;

        unsafe {
            (*state_ptr).thread = prepare_stack(stack.top(), ping, state_ptr as usize, 5);

            context_switch(&mut (*state_ptr).main, &(*state_ptr).thread);
            assert_eq!((*state_ptr).counter, 5);

            context_switch(&mut (*state_ptr).main, &(*state_ptr).thread);
            assert_eq!((*state_ptr).counter, 10);
        }
    }
}
