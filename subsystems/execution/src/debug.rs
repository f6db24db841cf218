//! # Group Inspection
//!
//! Human-readable report of a group's thread table. Reading it has no effect
//! on scheduling.

use core::fmt;

use crate::ThreadGroup;

/// Report of a group's slots, see [`ThreadGroup::dump`]
#[derive(Debug)]
pub struct GroupDump<'a> {
    group: &'a ThreadGroup,
}

impl ThreadGroup {
    /// Report of slot count, current slot and every slot's saved registers
    pub fn dump(&self) -> GroupDump<'_> {
        GroupDump { group: self }
    }

    /// Log [`dump`](Self::dump) at debug level
    pub fn debug_dump(&self) {
        log::debug!("{}", self.dump());
    }
}

impl fmt::Display for GroupDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = self.group;
        writeln!(
            f,
            "group {:?}: {} slots, current {}",
            group.config.name,
            group.slot_count(),
            group.current()
        )?;

        for (index, slot) in group.slots().enumerate() {
            write!(f, "slot {}: {:?}", index, slot.state())?;
            match slot.stack() {
                Some(stack) => writeln!(
                    f,
                    ", stack {:p}..{:p} ({} bytes)",
                    stack.base(),
                    stack.top(),
                    stack.size()
                )?,
                None => writeln!(f, ", native stack")?,
            }

            if index == group.current() {
                writeln!(f, "  (running, registers not saved)")?;
            } else if slot.is_exited() {
                writeln!(f, "  (exited, registers discarded)")?;
            } else {
                for line in alloc::format!("{}", slot.registers()).lines() {
                    writeln!(f, "  {}", line)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{EntryFn, Feather, GroupConfig, ThreadGroup};
    use alloc::string::ToString;

    fn noop(_group: &ThreadGroup, _own_id: usize) -> i16 {
        0
    }

    #[test]
    fn test_dump_lists_every_slot() {
        let feather = Feather::init([noop as EntryFn; 2]).unwrap();
        let report = feather.dump().to_string();

        assert!(report.starts_with("group \"feather\": 3 slots, current 0\n"));
        assert!(report.contains("slot 0: Running, native stack\n  (running, registers not saved)"));
        assert!(report.contains("slot 1: NotStarted, stack"));
        assert!(report.contains("slot 2: NotStarted, stack"));
        assert!(report.contains("(4096 bytes)"));
        feather.destroy();
    }

    #[test]
    fn test_dump_marks_exited_slots() {
        let feather = Feather::init_with(GroupConfig::roomy(), [noop as EntryFn]).unwrap();
        feather.yield_now();

        let report = feather.dump().to_string();
        assert!(report.contains("slot 1: Exited(0)"));
        assert!(report.contains("(exited, registers discarded)"));
        feather.debug_dump();
        feather.destroy();
    }
}
