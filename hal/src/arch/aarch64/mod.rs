//! # AArch64 Architecture HAL Implementation
//!
//! Context switching for the AAPCS64 procedure call standard.

pub mod context;

pub use context::{context_switch, prepare_stack, CpuContext};
