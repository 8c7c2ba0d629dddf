//! An interpreter for Intcode, the integer-encoded instruction set
//!
//! A machine is a growable block of `i64` memory, an instruction pointer and
//! a relative base, fed from an input queue and writing to an output stream.
//! Drivers either run a machine to completion or step it one output at a
//! time, which is what the amplifier pipelines in [`pipeline`] are built on.

pub mod config;
pub mod memory;
pub mod opcode;
pub mod pipeline;
pub mod program;
pub mod vm;

pub use config::{Config, InputPolicy};
pub use program::Program;
pub use vm::{Exit, State, Step, Vm, Word};
