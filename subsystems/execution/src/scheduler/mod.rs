//! # Round-Robin Scheduler
//!
//! Strict first-come-first-served round robin over the thread table.
//!
//! On every yield the scheduler walks the slots after the running one in
//! index order, wrapping around, and dispatches the first eligible slot. The
//! walk ends at the running slot itself, so a thread that is the only eligible
//! one keeps running. Every eligible thread is therefore revisited within one
//! cycle of `slots.len()` steps.
//!
//! A worker is eligible until it exits. Slot 0, the initiating context, is
//! parked while any worker is live: control only comes back to it once the
//! last worker has exited.

pub mod metrics;

pub use metrics::{GroupStats, SchedulerMetrics};

use crate::context::{self, SwitchReason};
use crate::ThreadGroup;

/// Next eligible slot after `from` in cyclic order
///
/// Visits `from + 1, from + 2, ...` modulo `len` and ends with `from` itself.
/// Returns `None` when no slot is eligible.
pub fn next_slot(len: usize, from: usize, eligible: impl Fn(usize) -> bool) -> Option<usize> {
    (1..=len)
        .map(|step| (from + step) % len)
        .find(|&slot| eligible(slot))
}

impl ThreadGroup {
    /// Give up the processor and dispatch the next thread
    ///
    /// Callable by the running thread only, which every holder of a
    /// `&ThreadGroup` is. Returns when the scheduler comes back around to the
    /// caller; returns immediately if the caller is the only eligible thread.
    pub fn yield_now(&self) {
        self.metrics.record_yield();
        self.reschedule(SwitchReason::Yield);
    }

    /// Check if the scheduler may select `slot`
    pub(crate) fn is_eligible(&self, slot: usize) -> bool {
        if slot == 0 {
            self.live.get() == 0
        } else {
            self.slots[slot].state().is_runnable()
        }
    }

    /// Select the next slot and transfer control to it
    pub(crate) fn reschedule(&self, reason: SwitchReason) {
        let from = self.current.get();
        let Some(to) = next_slot(self.slots.len(), from, |slot| self.is_eligible(slot)) else {
            panic!(
                "[{}] slot {} gave up the processor but no thread is runnable",
                self.config.name, from
            );
        };

        if to == from {
            return;
        }

        self.current.set(to);
        self.metrics.record_switch();
        log::trace!("[{}] switch {} -> {} ({:?})", self.config.name, from, to, reason);

        // SAFETY: `from` is the running slot, so its context is ours to
        // overwrite. `to` is eligible, hence either never started (prepared by
        // the stack builder) or suspended in a switch, and the group keeps its
        // stack allocated until teardown.
        unsafe { context::switch(self.slots[from].context(), self.slots[to].context()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_slot_advances_cyclically() {
        assert_eq!(next_slot(4, 0, |_| true), Some(1));
        assert_eq!(next_slot(4, 2, |_| true), Some(3));
        assert_eq!(next_slot(4, 3, |_| true), Some(0));
    }

    #[test]
    fn test_next_slot_skips_ineligible() {
        // Slots 2 and 3 exited
        assert_eq!(next_slot(4, 1, |slot| slot != 2 && slot != 3), Some(0));
        assert_eq!(next_slot(5, 4, |slot| slot == 3), Some(3));
    }

    #[test]
    fn test_next_slot_reselects_caller_last() {
        assert_eq!(next_slot(3, 1, |slot| slot == 1), Some(1));
        assert_eq!(next_slot(1, 0, |_| true), Some(0));
    }

    #[test]
    fn test_next_slot_none_eligible() {
        assert_eq!(next_slot(3, 0, |_| false), None);
    }
}
