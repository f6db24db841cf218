//! # Thread Slot
//!
//! One entry of the thread table.

use core::cell::Cell;
use core::fmt;

use feather_hal::CpuContext;

use super::{ExitWord, ThreadState};
use crate::context::SavedContext;
use crate::group::BoxedEntry;
use crate::stack::Stack;

/// Thread control slot
///
/// Slot 0 of every group stands for the initiating context: it has no entry
/// and no stack of its own. Every other slot is a worker.
pub struct ThreadSlot {
    /// Saved registers, valid while the thread is not running
    context: SavedContext,
    /// Packed exit state
    state: Cell<ExitWord>,
    /// Entry function, taken on the first switch into the slot
    entry: Cell<Option<BoxedEntry>>,
    /// Owned stack (workers only)
    stack: Option<Stack>,
}

impl ThreadSlot {
    /// Slot for the initiating context
    pub(crate) fn initiator() -> Self {
        Self {
            context: SavedContext::new(CpuContext::empty()),
            state: Cell::new(ExitWord::NOT_STARTED.started()),
            entry: Cell::new(None),
            stack: None,
        }
    }

    /// Slot for a worker whose stack was prepared by the stack builder
    pub(crate) fn worker(stack: Stack, context: CpuContext, entry: BoxedEntry) -> Self {
        Self {
            context: SavedContext::new(context),
            state: Cell::new(ExitWord::NOT_STARTED),
            entry: Cell::new(Some(entry)),
            stack: Some(stack),
        }
    }

    /// Get current state
    pub fn state(&self) -> ThreadState {
        self.state.get().state()
    }

    /// Check if the thread has exited
    pub fn is_exited(&self) -> bool {
        self.state.get().is_exited()
    }

    /// Check if a worker started and has not exited yet
    ///
    /// Such a worker has live frames on its own stack. Always false for slot 0,
    /// whose frames live on the caller's native stack.
    pub fn has_live_frames(&self) -> bool {
        self.stack.is_some() && self.state() == ThreadState::Running
    }

    /// Exit code, once exited
    pub fn exit_code(&self) -> Option<i16> {
        match self.state() {
            ThreadState::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Packed state word
    pub fn exit_word(&self) -> ExitWord {
        self.state.get()
    }

    /// Owned stack, if this is a worker slot
    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// Saved register snapshot
    ///
    /// Stale for the slot that is currently running.
    pub fn registers(&self) -> CpuContext {
        self.context.snapshot()
    }

    pub(crate) fn context(&self) -> &SavedContext {
        &self.context
    }

    /// Take the entry function and mark the slot started
    pub(crate) fn start(&self) -> Option<BoxedEntry> {
        self.state.set(self.state.get().started());
        self.entry.take()
    }

    /// Record the exit code
    ///
    /// Panics if the slot had already exited: exit states are monotone.
    pub(crate) fn mark_exited(&self, code: i16) {
        let word = self.state.get();
        assert!(!word.is_exited(), "thread exited twice");
        self.state.set(word.exited(code));
    }
}

impl fmt::Debug for ThreadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSlot")
            .field("state", &self.state())
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}
