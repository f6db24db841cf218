//! # Thread States
//!
//! Thread state machine definition.
//!
//! ```text
//! NotStarted --first switch--> Running --exit / return--> Exited(code)
//! ```
//!
//! The state of a slot is stored as one packed word: state flags in the low
//! half, the exit code in the high half. A single load therefore answers both
//! "has it exited?" and "with which code?".

use bitflags::bitflags;

bitflags! {
    /// Slot state flags (low half of [`ExitWord`])
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u16 {
        /// Thread has exited; the high half holds its code
        const EXITED = 1 << 0;
        /// Thread has been switched into at least once
        const STARTED = 1 << 1;
    }
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Thread has never run
    NotStarted,
    /// Thread has run and may be suspended in a yield
    Running,
    /// Thread has exited with a code
    Exited(i16),
}

impl ThreadState {
    /// Check if the scheduler may select the thread
    pub fn is_runnable(&self) -> bool {
        !self.is_terminated()
    }

    /// Check if thread is terminated
    pub fn is_terminated(&self) -> bool {
        matches!(self, ThreadState::Exited(_))
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        ThreadState::NotStarted
    }
}

/// Packed slot state: `code << 16 | flags`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct ExitWord(u32);

impl ExitWord {
    /// State of a thread that has never run
    pub const NOT_STARTED: Self = Self(0);

    /// Get the flags
    pub fn flags(self) -> SlotFlags {
        SlotFlags::from_bits_truncate(self.0 as u16)
    }

    /// Get the exit code (meaningful once exited)
    pub fn code(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    /// Check if the thread has exited
    pub fn is_exited(self) -> bool {
        self.flags().contains(SlotFlags::EXITED)
    }

    /// Same word with the started flag set
    pub fn started(self) -> Self {
        Self(self.0 | SlotFlags::STARTED.bits() as u32)
    }

    /// Word of a thread that exited with `code`
    pub fn exited(self, code: i16) -> Self {
        let flags = self.flags() | SlotFlags::EXITED;
        Self(((code as u16 as u32) << 16) | flags.bits() as u32)
    }

    /// Raw packed value
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Decode into a [`ThreadState`]
    pub fn state(self) -> ThreadState {
        let flags = self.flags();
        if flags.contains(SlotFlags::EXITED) {
            ThreadState::Exited(self.code())
        } else if flags.contains(SlotFlags::STARTED) {
            ThreadState::Running
        } else {
            ThreadState::NotStarted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_word_lifecycle() {
        let word = ExitWord::NOT_STARTED;
        assert_eq!(word.state(), ThreadState::NotStarted);

        let word = word.started();
        assert_eq!(word.state(), ThreadState::Running);
        assert!(!word.is_exited());

        let word = word.exited(7);
        assert_eq!(word.state(), ThreadState::Exited(7));
        assert_eq!(word.raw(), (7 << 16) | 0b11);
    }

    #[test]
    fn test_negative_code_packs_into_high_half() {
        let word = ExitWord::NOT_STARTED.started().exited(-1);
        assert_eq!(word.raw(), 0xFFFF_0003);
        assert_eq!(word.code(), -1);

        let word = ExitWord::NOT_STARTED.started().exited(i16::MIN);
        assert_eq!(word.state(), ThreadState::Exited(i16::MIN));
    }

    #[test]
    fn test_exited_keeps_started_flag() {
        let word = ExitWord::NOT_STARTED.started().exited(3);
        assert!(word.flags().contains(SlotFlags::STARTED | SlotFlags::EXITED));
    }

    #[test]
    fn test_transitions() {
        assert!(ThreadState::NotStarted.is_runnable());
        assert!(ThreadState::Running.is_runnable());
        assert!(ThreadState::Exited(0).is_terminated());
        assert!(!ThreadState::Exited(-5).is_runnable());
    }
}
