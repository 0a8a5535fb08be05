//! ISA-agnostic backend passes.
//!
//! Everything from liveness to emission that does not depend on a concrete
//! instruction set lives here; a [`Target`] implementation supplies the
//! register file, the lowering and terminator rule tables, and the
//! per-instruction emission routines.

#![no_std]

extern crate alloc;

mod blockrewrite;
mod frame;
mod layout;
mod liveness;
mod obj;
mod pipeline;
mod regalloc;
mod stackalloc;
mod target;

pub use blockrewrite::rewrite_blocks;
pub use frame::FrameLayout;
pub use layout::layout_order;
pub use liveness::{compute_liveness, live_spill_edges, Liveness};
pub use obj::{CodeBuffer, LineEntry, ObjectSink, Reloc, SafePoint, VecSink};
pub use pipeline::compile_func;
pub use regalloc::regalloc;
pub use stackalloc::stackalloc;
pub use target::{RegClass, Target};
