//! Stack virtual machine library.
//!
//! Provides the assembler, the execution engine and its step observers.

pub mod utils;
pub mod virtual_machine;
