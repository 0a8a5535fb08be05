//! MIPS32 backend.
//!
//! Supplies everything target-specific: the register file, the lowering
//! and peephole rule tables, the terminator rule table, instruction
//! records with their binary encodings, and the emitter.

#![no_std]

extern crate alloc;

mod emit;
mod encode;
mod inst;
pub mod regs;
mod rules;
mod target;

pub use inst::Inst;
pub use rules::{MipsBlockRules, MipsLowerRules};
pub use target::MipsTarget;
