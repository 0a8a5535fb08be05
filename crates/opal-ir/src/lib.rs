//! SSA intermediate representation for the opal compiler backend.
//!
//! This crate defines the per-function SSA graph every backend pass operates
//! on:
//! - Values (dense-id SSA nodes, rewritten in place)
//! - Blocks (basic blocks with terminator kinds and control values)
//! - Functions (the arena that owns both)
//! - The type lattice (size, alignment, signedness, kind bits)
//! - CFG utilities (postorder, dominators) and the invariant checker

#![no_std]

extern crate alloc;

mod block;
mod check;
mod dom;
mod entity_map;
mod func;
mod ids;
mod op;
mod parser;
mod postorder;
mod print;
mod sparse_set;
mod sym;
mod types;
mod value;

#[macro_use]
mod debug;

pub use block::{BlockData, BlockKind, Edge};
pub use check::check_func;
pub use dom::Dominators;
pub use entity_map::PrimaryMap;
pub use func::{Func, Location};
pub use ids::{BlockId, EntityRef, ValueId};
pub use op::{Op, OpInfo};
pub use parser::{parse_func, ParseError};
pub use postorder::postorder;
pub use sparse_set::SparseSet;
pub use sym::{LocalSlot, SourcePos, Symbol};
pub use types::{Type, TypeClass};
pub use value::{Aux, ValueData};
