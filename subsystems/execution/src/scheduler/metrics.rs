//! # Scheduler Metrics
//!
//! Counters kept by every thread group.

use core::cell::Cell;

/// Snapshot of a group's scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Calls to `yield_now`
    pub yields: u64,
    /// Transfers of control to a different slot
    pub switches: u64,
    /// Workers that exited
    pub exits: u64,
}

/// Scheduler metrics
///
/// Plain cells: a group is only ever touched by its own execution stream.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    yields: Cell<u64>,
    switches: Cell<u64>,
    exits: Cell<u64>,
}

impl SchedulerMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            yields: Cell::new(0),
            switches: Cell::new(0),
            exits: Cell::new(0),
        }
    }

    /// Record a voluntary yield
    pub fn record_yield(&self) {
        self.yields.set(self.yields.get() + 1);
    }

    /// Record a context switch
    pub fn record_switch(&self) {
        self.switches.set(self.switches.get() + 1);
    }

    /// Record a thread exit
    pub fn record_exit(&self) {
        self.exits.set(self.exits.get() + 1);
    }

    /// Get a snapshot
    pub fn snapshot(&self) -> GroupStats {
        GroupStats {
            yields: self.yields.get(),
            switches: self.switches.get(),
            exits: self.exits.get(),
        }
    }
}
