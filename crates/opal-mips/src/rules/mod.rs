//! MIPS32 rewrite rule tables.
//!
//! `lower` holds the value rules: instruction selection from generic ops
//! and the machine-level peepholes (immediate folding, displacement
//! merging, conditional-move simplification). `block` holds the
//! terminator rules that fold comparison shapes into branch kinds.

mod block;
mod lower;

pub use block::MipsBlockRules;
pub use lower::MipsLowerRules;
