//! Instruction-level interpreter for the Z80 processor family.
//!
//! The [`Processor`](processor/struct.Processor.html) executes machine code
//! from a flat 64 KiB [`Core`](memory/struct.Core.html), modelling registers,
//! flags (including the undocumented bits 5 and 3), cycle counting and a
//! rudimentary interrupt window. IO is delegated to two function-valued
//! hooks so callers can script port behaviour per test.
//!
//! Execution runs until a cycle budget is exhausted, a breakpoint is hit, or
//! an undefined opcode is fetched; see
//! [`StopReason`](processor/enum.StopReason.html).

pub mod constants;
pub mod memory;
pub mod processor;
pub mod registers;

pub use crate::memory::Core;
pub use crate::processor::{InputHandler, OutputHandler, Processor, StopReason};
pub use crate::registers::{Cond, Reg16, Reg8, RegName, RegisterFile};

use util::EnumFromStr;
use util_derive::EnumFromStr;

pub type Byte = u8;
pub type Word = u16;
pub type Address = u16;

/// CPU clock cycle count. Signed so cycle deltas are representable.
pub type CpuCycle = i32;

/// Processor family selector shared by the assembler and the interpreter.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumFromStr)]
pub enum CpuKind {
    Z80,
    Z180,
    I8080,
}

impl Default for CpuKind {
    fn default() -> CpuKind {
        CpuKind::Z80
    }
}

#[cfg(test)]
mod test;
