//! Test support: a stack allocator that counts and can fail on demand.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::stack::{GlobalStackAllocator, StackAllocator};

/// Counts stack allocations and optionally fails the n-th one
pub struct CountingAllocator {
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    fail_at: Option<usize>,
}

impl CountingAllocator {
    /// Reason reported for an injected failure
    pub const INJECTED: &'static str = "injected allocation failure";

    pub fn new() -> Self {
        Self {
            allocations: Cell::new(0),
            deallocations: Cell::new(0),
            fail_at: None,
        }
    }

    /// Fail the `n`-th allocation (1-based)
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::new()
        }
    }

    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Stacks allocated and not yet released
    pub fn live(&self) -> usize {
        self.allocations.get() - self.deallocations.get()
    }
}

impl StackAllocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, &'static str> {
        let attempt = self.allocations.get() + 1;
        if self.fail_at == Some(attempt) {
            return Err(Self::INJECTED);
        }
        let ptr = GlobalStackAllocator.allocate(layout)?;
        self.allocations.set(attempt);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.set(self.deallocations.get() + 1);
        // SAFETY: forwarded from the caller
        unsafe { GlobalStackAllocator.deallocate(ptr, layout) }
    }
}
