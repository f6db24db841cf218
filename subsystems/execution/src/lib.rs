//! # Feather Execution Subsystem
//!
//! Cooperative user-level threads on a single physical execution stream.
//!
//! The execution subsystem manages:
//! - The thread table (one slot for the initiating context, one per worker)
//! - Per-thread stacks and their initial layout
//! - Round-robin scheduling through explicit [`ThreadGroup::yield_now`] calls
//! - Group lifecycle: init, run to completion, exit-code collection, teardown
//!
//! ## Example
//!
//! ```no_run
//! use feather_execution::{Feather, ThreadGroup};
//!
//! fn worker(group: &ThreadGroup, own_id: usize) -> i16 {
//!     group.yield_now();
//!     own_id as i16
//! }
//!
//! let feather = Feather::init([worker, worker])?;
//! let mut codes = [0; 2];
//! feather.run(Some(&mut codes));
//! assert_eq!(codes, [1, 2]);
//! # Ok::<(), feather_execution::AllocationError>(())
//! ```
//!
//! ## Key Principle
//!
//! Nothing here preempts. A thread keeps the processor until it yields,
//! exits or returns from its entry function.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod context;
pub mod debug;
pub mod group;
pub mod scheduler;
pub mod stack;
pub mod thread;

#[cfg(test)]
mod testing;

pub use config::GroupConfig;
pub use group::{entry, BoxedEntry, EntryFn, Feather, ThreadGroup};
pub use scheduler::GroupStats;
pub use stack::{GlobalStackAllocator, StackAllocator};
pub use thread::{ThreadSlot, ThreadState};

use alloc::collections::TryReserveError;
use core::alloc::{Layout, LayoutError};
use core::fmt;

/// Execution result type
pub type ExecResult<T> = Result<T, AllocationError>;

/// Group construction errors
///
/// Returned only by the `init` family. When one is returned, every resource
/// the attempt had acquired has already been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The group header could not be allocated
    Group {
        /// Layout that was requested
        layout: Layout,
    },
    /// The slot table could not be reserved
    SlotTable(TryReserveError),
    /// A worker stack could not be allocated
    Stack {
        /// Slot the stack was meant for
        slot: usize,
        /// Layout that was requested
        layout: Layout,
        /// Diagnostic from the stack allocator
        reason: &'static str,
    },
    /// The configured stack size is below the supported minimum
    StackTooSmall {
        /// Configured size in bytes
        requested: usize,
        /// Smallest accepted size in bytes
        minimum: usize,
    },
    /// The configured stack size does not form a valid layout
    InvalidLayout(LayoutError),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { layout } => {
                write!(f, "cannot allocate thread group ({} bytes)", layout.size())
            }
            Self::SlotTable(err) => write!(f, "cannot allocate slot table: {}", err),
            Self::Stack {
                slot,
                layout,
                reason,
            } => write!(
                f,
                "cannot allocate {}-byte stack for slot {}: {}",
                layout.size(),
                slot,
                reason
            ),
            Self::StackTooSmall { requested, minimum } => write!(
                f,
                "stack size {} is below the minimum of {} bytes",
                requested, minimum
            ),
            Self::InvalidLayout(err) => write!(f, "invalid stack layout: {}", err),
        }
    }
}

impl core::error::Error for AllocationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display_keeps_reason() {
        let err = AllocationError::Stack {
            slot: 2,
            layout: Layout::from_size_align(4096, 16).unwrap(),
            reason: "injected failure",
        };
        assert_eq!(
            err.to_string(),
            "cannot allocate 4096-byte stack for slot 2: injected failure"
        );
    }

    #[test]
    fn test_error_display_stack_too_small() {
        let err = AllocationError::StackTooSmall {
            requested: 64,
            minimum: 1024,
        };
        assert_eq!(
            err.to_string(),
            "stack size 64 is below the minimum of 1024 bytes"
        );
    }
}
