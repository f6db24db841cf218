//! # Thread Table
//!
//! Per-thread control slots and their state machine.

pub mod slot;
pub mod states;

pub use slot::*;
pub use states::*;
