//! # Thread Group Lifecycle
//!
//! Construction, run-to-completion, exit reporting and teardown of a group.
//!
//! A group is built on the heap at a fixed address: every worker stack is
//! staged with that address, so the group must never move. [`Feather`] is the
//! owning handle the initiating context holds; workers only ever see a
//! `&ThreadGroup`.

use alloc::alloc::{alloc, dealloc};
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};

use crate::context::SwitchReason;
use crate::scheduler::{GroupStats, SchedulerMetrics};
use crate::stack::{GlobalStackAllocator, StackAllocator, StackBuilder};
use crate::thread::ThreadSlot;
use crate::{AllocationError, ExecResult, GroupConfig};

/// Plain entry function: receives the group and its own slot index
pub type EntryFn = fn(&ThreadGroup, usize) -> i16;

/// Boxed entry closure, for mixing different closures in one group
pub type BoxedEntry = Box<dyn FnOnce(&ThreadGroup, usize) -> i16>;

/// Box an entry closure
pub fn entry<F>(f: F) -> BoxedEntry
where
    F: FnOnce(&ThreadGroup, usize) -> i16 + 'static,
{
    Box::new(f)
}

/// A group of cooperative threads sharing one physical execution stream
///
/// Slot 0 is the initiating context; slots `1..=worker_count()` are workers.
pub struct ThreadGroup {
    /// Thread table
    pub(crate) slots: Vec<ThreadSlot>,
    /// Slot presently executing
    pub(crate) current: Cell<usize>,
    /// Workers that have not exited
    pub(crate) live: Cell<usize>,
    /// Scheduler counters
    pub(crate) metrics: SchedulerMetrics,
    /// Construction parameters
    pub(crate) config: GroupConfig,
    _single_stream: PhantomData<*mut ()>,
}

/// Start routine of every worker
///
/// Reached through the bootstrap frame on the first switch into a slot. Both
/// a natural return and an explicit `exit` end in [`ThreadGroup::exit`].
unsafe extern "C" fn thread_start(group: usize, own_id: usize) -> ! {
    // SAFETY: staged by `Feather::init_in` with the group's fixed address; the
    // group outlives every worker stack
    let group = unsafe { &*(group as *const ThreadGroup) };
    log::trace!("[{}] slot {} started", group.config.name, own_id);

    let code = group.slots[own_id]
        .start()
        .map_or(0, |entry| entry(group, own_id));
    group.exit(own_id, code)
}

impl ThreadGroup {
    /// Terminate the calling worker with `code`
    ///
    /// Never returns. The worker's frames are abandoned without running
    /// destructors. Panics unless `own_id` is the running worker.
    pub fn exit(&self, own_id: usize, code: i16) -> ! {
        self.check_exit_id(own_id);
        self.slots[own_id].mark_exited(code);
        self.live.set(self.live.get() - 1);
        self.metrics.record_exit();
        log::debug!(
            "[{}] slot {} exited with {} ({} live)",
            self.config.name,
            own_id,
            code,
            self.live.get()
        );

        self.reschedule(SwitchReason::Exit);
        unreachable!("exited slot {} was resumed", own_id)
    }

    /// Panic unless `own_id` names the running worker
    pub(crate) fn check_exit_id(&self, own_id: usize) {
        assert!(own_id != 0, "the initiating context cannot exit");
        assert!(
            own_id < self.slots.len(),
            "slot {} out of range for {} slots",
            own_id,
            self.slots.len()
        );
        assert_eq!(
            own_id,
            self.current.get(),
            "exit called with the id of a thread that is not running"
        );
    }

    /// Slot presently executing
    pub fn current(&self) -> usize {
        self.current.get()
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of slots, including slot 0
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Workers that have not exited
    pub fn live_workers(&self) -> usize {
        self.live.get()
    }

    /// Get a slot
    pub fn slot(&self, index: usize) -> Option<&ThreadSlot> {
        self.slots.get(index)
    }

    /// All slots in index order
    pub fn slots(&self) -> impl Iterator<Item = &ThreadSlot> {
        self.slots.iter()
    }

    /// Exit code of `slot`, once it has exited
    pub fn exit_code(&self, slot: usize) -> Option<i16> {
        self.slots.get(slot).and_then(ThreadSlot::exit_code)
    }

    /// Check if `slot` has exited
    pub fn is_exited(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(ThreadSlot::is_exited)
    }

    /// Scheduler counters
    pub fn stats(&self) -> GroupStats {
        self.metrics.snapshot()
    }

    /// Construction parameters
    pub fn config(&self) -> &GroupConfig {
        &self.config
    }
}

impl fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("name", &self.config.name)
            .field("current", &self.current.get())
            .field("live", &self.live.get())
            .field("slots", &self.slots)
            .finish()
    }
}

/// Heap block a group is built in
///
/// Allocated before the stacks so that its address can be staged on them.
/// Released on drop unless [`write`](Self::write) hands it to a [`Feather`].
struct GroupMemory {
    ptr: NonNull<ThreadGroup>,
}

impl GroupMemory {
    const LAYOUT: Layout = Layout::new::<ThreadGroup>();

    fn allocate() -> ExecResult<Self> {
        // SAFETY: ThreadGroup is not zero-sized
        let ptr = unsafe { alloc(Self::LAYOUT) };
        NonNull::new(ptr.cast::<ThreadGroup>())
            .map(|ptr| Self { ptr })
            .ok_or(AllocationError::Group {
                layout: Self::LAYOUT,
            })
    }

    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    fn write(self, group: ThreadGroup) -> Feather {
        let ptr = self.ptr;
        mem::forget(self);
        // SAFETY: freshly allocated for this layout and not yet initialized
        unsafe { ptr.as_ptr().write(group) };
        Feather { group: ptr }
    }
}

impl Drop for GroupMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with this layout, never initialized
        unsafe { dealloc(self.ptr.as_ptr().cast(), Self::LAYOUT) }
    }
}

/// Owning handle to a thread group
///
/// Held by the initiating context. Dereferences to [`ThreadGroup`]; consumed
/// by [`run`](Self::run) or [`destroy`](Self::destroy), and releases the group
/// on drop otherwise.
pub struct Feather {
    group: NonNull<ThreadGroup>,
}

impl Feather {
    /// Build a group with the default configuration
    ///
    /// One worker per entry, in order: the first entry runs in slot 1.
    pub fn init<I, F>(entries: I) -> ExecResult<Self>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: ExactSizeIterator,
        F: FnOnce(&ThreadGroup, usize) -> i16 + 'static,
    {
        Self::init_with(GroupConfig::new(), entries)
    }

    /// Build a group with `config`
    pub fn init_with<I, F>(config: GroupConfig, entries: I) -> ExecResult<Self>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: ExactSizeIterator,
        F: FnOnce(&ThreadGroup, usize) -> i16 + 'static,
    {
        Self::init_in(config, Rc::new(GlobalStackAllocator), entries)
    }

    /// Build a group with `config`, taking stacks from `allocator`
    ///
    /// On error nothing stays allocated: stacks built so far, the slot table
    /// and the group block are all released before returning.
    pub fn init_in<I, F>(
        config: GroupConfig,
        allocator: Rc<dyn StackAllocator>,
        entries: I,
    ) -> ExecResult<Self>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: ExactSizeIterator,
        F: FnOnce(&ThreadGroup, usize) -> i16 + 'static,
    {
        let entries = entries.into_iter();
        let builder = StackBuilder::new(&config, allocator)?;
        let memory = GroupMemory::allocate()?;

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(entries.len().saturating_add(1))
            .map_err(AllocationError::SlotTable)?;
        slots.push(ThreadSlot::initiator());

        for (index, f) in entries.enumerate() {
            let slot = index + 1;
            let (stack, context) = builder.build(slot, thread_start, memory.addr())?;
            log::debug!("[{}] slot {} ready: {:?}", config.name, slot, stack);
            slots.push(ThreadSlot::worker(stack, context, Box::new(f)));
        }

        let workers = slots.len() - 1;
        log::info!(
            "[{}] thread group initialized: {} workers, {}-byte stacks",
            config.name,
            workers,
            builder.layout().size()
        );

        Ok(memory.write(ThreadGroup {
            slots,
            current: Cell::new(0),
            live: Cell::new(workers),
            metrics: SchedulerMetrics::new(),
            config,
            _single_stream: PhantomData,
        }))
    }

    /// Run every worker to completion, then destroy the group
    ///
    /// If `exit_codes` is given it receives the code of worker `i + 1` at
    /// index `i`; it must hold exactly [`worker_count`](ThreadGroup::worker_count)
    /// entries.
    pub fn run(self, exit_codes: Option<&mut [i16]>) {
        if let Some(codes) = exit_codes.as_deref() {
            assert_eq!(
                codes.len(),
                self.worker_count(),
                "exit-code buffer must hold one entry per worker"
            );
        }
        debug_assert_eq!(self.current(), 0);

        log::info!(
            "[{}] running {} workers",
            self.config.name,
            self.worker_count()
        );
        self.yield_now();

        if let Some(codes) = exit_codes {
            for (code, slot) in codes.iter_mut().zip(&self.slots[1..]) {
                *code = slot.exit_code().unwrap_or(0);
            }
        }

        let stats = self.stats();
        log::debug!(
            "[{}] run finished: {} yields, {} switches, {} exits",
            self.config.name,
            stats.yields,
            stats.switches,
            stats.exits
        );
        self.destroy();
    }

    /// [`run`](Self::run) and return the exit codes in slot order
    pub fn run_collect(self) -> Vec<i16> {
        let mut codes = vec![0; self.worker_count()];
        self.run(Some(&mut codes));
        codes
    }

    /// Release every stack and the group itself
    ///
    /// Panics if a worker is suspended mid-execution.
    pub fn destroy(self) {
        drop(self)
    }
}

impl Deref for Feather {
    type Target = ThreadGroup;

    fn deref(&self) -> &ThreadGroup {
        // SAFETY: initialized in `GroupMemory::write`, released only on drop
        unsafe { self.group.as_ref() }
    }
}

impl fmt::Debug for Feather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl Drop for Feather {
    fn drop(&mut self) {
        if let Some(id) = self.slots.iter().position(ThreadSlot::has_live_frames) {
            log::error!(
                "[{}] destroying group with slot {} suspended",
                self.config.name,
                id
            );
            panic!("cannot destroy a thread group while slot {} is suspended", id);
        }

        let name = self.config.name;
        let slots = self.slots.len();

        // SAFETY: the handle owns the group; no worker has live frames, so
        // nothing refers to the group or its stacks any more
        unsafe {
            ptr::drop_in_place(self.group.as_ptr());
            dealloc(self.group.as_ptr().cast(), GroupMemory::LAYOUT);
        }
        log::debug!("[{}] thread group destroyed ({} slots released)", name, slots);
    }
}
