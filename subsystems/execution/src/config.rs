//! # Thread Group Configuration

use core::alloc::Layout;

use feather_hal::{BOOTSTRAP_FRAME_SIZE, STACK_ALIGN};

use crate::{AllocationError, ExecResult};

/// Configuration for a thread group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// Size of every worker stack, in bytes
    pub stack_size: usize,
    /// Name used to tag log records
    pub name: &'static str,
}

impl GroupConfig {
    /// Default stack size: 4 KiB
    pub const DEFAULT_STACK_SIZE: usize = 4096;
    /// Minimum stack size: 1 KiB
    pub const MIN_STACK_SIZE: usize = 1024;
    /// Stack size of the roomy preset: 64 KiB
    pub const ROOMY_STACK_SIZE: usize = 64 * 1024;

    /// Create default configuration
    pub fn new() -> Self {
        Self {
            stack_size: Self::DEFAULT_STACK_SIZE,
            name: "feather",
        }
    }

    /// Configuration for workers that format, log or recurse
    ///
    /// 4 KiB is tight for unoptimized Rust frames, and there is no guard page
    /// below a worker stack.
    pub fn roomy() -> Self {
        Self {
            stack_size: Self::ROOMY_STACK_SIZE,
            ..Self::new()
        }
    }

    /// Set the worker stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Set the log tag
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Layout of one worker stack
    ///
    /// The size is rounded up to the stack alignment.
    pub fn stack_layout(&self) -> ExecResult<Layout> {
        if self.stack_size < Self::MIN_STACK_SIZE {
            return Err(AllocationError::StackTooSmall {
                requested: self.stack_size,
                minimum: Self::MIN_STACK_SIZE,
            });
        }

        // An overflowing size is passed through so Layout reports it
        let size = self
            .stack_size
            .checked_next_multiple_of(STACK_ALIGN)
            .unwrap_or(self.stack_size);
        Layout::from_size_align(size, STACK_ALIGN).map_err(AllocationError::InvalidLayout)
    }

    /// Bytes of each stack available to the worker's own frames
    pub fn usable_stack_size(&self) -> usize {
        self.stack_size
            .checked_next_multiple_of(STACK_ALIGN)
            .unwrap_or(self.stack_size)
            .saturating_sub(BOOTSTRAP_FRAME_SIZE)
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stack_size() {
        let config = GroupConfig::default();
        assert_eq!(config.stack_size, 4096);
        assert_eq!(config.stack_layout().unwrap().size(), 4096);
        assert_eq!(config.stack_layout().unwrap().align(), 16);
    }

    #[test]
    fn test_stack_size_rounded_up() {
        let config = GroupConfig::new().with_stack_size(5000);
        assert_eq!(config.stack_layout().unwrap().size(), 5008);
    }

    #[test]
    fn test_stack_too_small() {
        let config = GroupConfig::new().with_stack_size(512);
        assert_eq!(
            config.stack_layout(),
            Err(AllocationError::StackTooSmall {
                requested: 512,
                minimum: 1024,
            })
        );
    }

    #[test]
    fn test_oversized_stack_rejected() {
        let config = GroupConfig::new().with_stack_size(usize::MAX);
        assert!(matches!(
            config.stack_layout(),
            Err(AllocationError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_roomy_preset() {
        let config = GroupConfig::roomy().with_name("roomy");
        assert_eq!(config.stack_size, 64 * 1024);
        assert_eq!(config.name, "roomy");
        assert_eq!(config.usable_stack_size(), 64 * 1024 - BOOTSTRAP_FRAME_SIZE);
    }
}
