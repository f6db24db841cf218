//! # Context Switching
//!
//! Safe wrapper around the HAL switch primitive.

use core::cell::UnsafeCell;
use core::fmt;

use feather_hal::CpuContext;

/// Context switch reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// Voluntary yield
    Yield,
    /// Thread exited
    Exit,
}

/// Register snapshot owned by one slot
///
/// Written only by [`switch`] while the owning thread suspends, read only
/// while it is suspended.
#[repr(transparent)]
pub struct SavedContext(UnsafeCell<CpuContext>);

impl SavedContext {
    /// Wrap an initial context
    pub const fn new(context: CpuContext) -> Self {
        Self(UnsafeCell::new(context))
    }

    /// Copy of the saved registers
    pub fn snapshot(&self) -> CpuContext {
        // SAFETY: only one thread of the group runs, and it is not inside a
        // switch while it reads
        unsafe { *self.0.get() }
    }
}

impl fmt::Debug for SavedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SavedContext").field(&self.snapshot()).finish()
    }
}

/// Switch from the running thread to another one
///
/// Returns when some thread switches back to `from`.
///
/// # Safety
///
/// `from` must belong to the running thread, and `to` must hold a context
/// saved by an earlier switch or prepared by the stack builder, whose stack is
/// still allocated.
pub unsafe fn switch(from: &SavedContext, to: &SavedContext) {
    // SAFETY: forwarded from the caller
    unsafe { feather_hal::context_switch(from.0.get(), to.0.get()) }
}
