//! # Thread Stacks
//!
//! Stack allocation and the initial stack layout of a worker.
//!
//! A worker stack is a plain heap region. [`StackBuilder`] allocates it and
//! stages the worker's start arguments at its high end, so that the first
//! switch into the worker looks like a call into the group's start routine.

use alloc::alloc::{alloc_zeroed, dealloc};
use alloc::rc::Rc;
use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use feather_hal::{CpuContext, StartFn};

use crate::{AllocationError, ExecResult, GroupConfig};

/// Source of stack memory
///
/// The group calls [`allocate`](Self::allocate) once per worker at
/// construction and [`deallocate`](Self::deallocate) once per stack at
/// teardown or when construction fails part-way.
pub trait StackAllocator {
    /// Allocate a region for `layout`
    ///
    /// On failure, returns a short diagnostic that is carried in
    /// [`AllocationError::Stack`].
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, &'static str>;

    /// Release a region
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](Self::allocate) on this allocator with
    /// the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Stack allocator backed by the global allocator
///
/// Stacks are zero-filled.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalStackAllocator;

impl StackAllocator for GlobalStackAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, &'static str> {
        // SAFETY: group configs never produce zero-sized stack layouts
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or("global allocator returned null")
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }
}

/// An owned worker stack
///
/// Released through its allocator on drop.
pub struct Stack {
    /// Lowest address of the region
    base: NonNull<u8>,
    /// Layout the region was allocated with
    layout: Layout,
    /// Allocator to return the region to
    allocator: Rc<dyn StackAllocator>,
}

impl Stack {
    /// Allocate a stack
    pub fn allocate(
        layout: Layout,
        allocator: Rc<dyn StackAllocator>,
    ) -> Result<Self, &'static str> {
        let base = allocator.allocate(layout)?;
        Ok(Self {
            base,
            layout,
            allocator,
        })
    }

    /// Get stack top (one past the highest address)
    pub fn top(&self) -> *mut u8 {
        // SAFETY: one past the end of the allocation
        unsafe { self.base.as_ptr().add(self.layout.size()) }
    }

    /// Get stack base (lowest address)
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Get stack size
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Check whether `addr` lies inside the stack
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base.as_ptr() as usize;
        (base..base + self.layout.size()).contains(&addr)
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("base", &self.base)
            .field("size", &self.layout.size())
            .finish()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: allocated by this allocator with this layout in `allocate`
        unsafe { self.allocator.deallocate(self.base, self.layout) }
    }
}

/// Builds worker stacks for one group
pub struct StackBuilder {
    layout: Layout,
    allocator: Rc<dyn StackAllocator>,
}

impl StackBuilder {
    /// Create a builder for the stacks described by `config`
    pub fn new(config: &GroupConfig, allocator: Rc<dyn StackAllocator>) -> ExecResult<Self> {
        Ok(Self {
            layout: config.stack_layout()?,
            allocator,
        })
    }

    /// Layout of every stack this builder produces
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Allocate the stack for `slot` and stage its first call
    ///
    /// The returned context resumes into `start(group_addr, slot)` on the new
    /// stack.
    pub fn build(
        &self,
        slot: usize,
        start: StartFn,
        group_addr: usize,
    ) -> ExecResult<(Stack, CpuContext)> {
        let stack = Stack::allocate(self.layout, Rc::clone(&self.allocator)).map_err(|reason| {
            AllocationError::Stack {
                slot,
                layout: self.layout,
                reason,
            }
        })?;

        // SAFETY: the top is 16-byte aligned (layout alignment and size are
        // multiples of 16) and the stack is at least MIN_STACK_SIZE bytes
        let context = unsafe { feather_hal::prepare_stack(stack.top(), start, group_addr, slot) };

        log::trace!(
            "stack for slot {} at {:p}..{:p}",
            slot,
            stack.base(),
            stack.top()
        );
        Ok((stack, context))
    }
}

impl fmt::Debug for StackBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackBuilder")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
