//! # Feather HAL - Hardware Abstraction Layer
//!
//! This crate owns every instruction that touches the physical register set
//! and the physical stack pointer. Everything above it sees three items:
//!
//! - [`CpuContext`]: the saved callee-preserved register set of one thread
//! - [`context_switch`]: save the running context, restore another one
//! - [`prepare_stack`]: lay out a fresh stack so that the first switch into it
//!   behaves like a call into a start routine with two arguments
//!
//! ## Design Philosophy
//!
//! The only state guaranteed to survive a switch is the callee-preserved
//! register set, the stack pointer and memory. The switch is reached through an
//! ordinary function call, so the compiler already treats every other register
//! as clobbered at that point.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

#[cfg(test)]
extern crate std;

pub mod arch;

pub use arch::current::{context_switch, prepare_stack, CpuContext};

/// Required alignment of a stack top, in bytes.
pub const STACK_ALIGN: usize = 16;

/// Bytes [`prepare_stack`] stages below the stack top.
pub const BOOTSTRAP_FRAME_SIZE: usize = 4 * core::mem::size_of::<usize>();

/// Routine a fresh thread starts in.
///
/// It receives the two staged arguments in the platform's first two argument
/// registers and must never return: there is no caller frame to return to.
pub type StartFn = unsafe extern "C" fn(arg0: usize, arg1: usize) -> !;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_frame_fits_alignment() {
        assert_eq!(BOOTSTRAP_FRAME_SIZE % STACK_ALIGN, 0);
    }
}
