//! Minimal sequential stack virtual machine.
//!
//! Programs are written in a line-oriented assembly language, assembled into
//! an immutable [`program::Program`] and executed by [`vm::VM`] one
//! instruction at a time until the machine halts or faults.
//!
//! # Architecture
//!
//! - **Stack**: five signed 64-bit slots addressed by `sp` (next free slot)
//! - **Registers**: `ip` (0-based), `acc`, `cmp` and a halt flag
//! - **Instruction set**: eight fixed instructions; `JMP` targets are 1-based
//! - **Execution model**: strictly sequential, one instruction per step, every
//!   fault aborts the run
//! - **Observation**: an optional [`trace::Tracer`] sees the state after each step
//!
//! # Modules
//!
//! - [`assembler`]: Source parsing, labels and diagnostics
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and mnemonic mappings
//! - [`program`]: Immutable instruction sequence
//! - [`state`]: Register file and bounded stack
//! - [`trace`]: Step observers (dump, paced, closures)
//! - [`vm`]: Execution engine, step budget and profiling

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod state;
pub mod trace;
pub mod vm;
