//! Term-rewriting and dataflow passes.
//!
//! The rewrite engine applies local pattern-replacement rules to fixpoint
//! over a function; the same driver runs the generic canonicalization rules
//! here and the target's lowering rules. Dead code, copy elimination, and
//! common-subexpression elimination share the engine's id-indexed plumbing.

#![no_std]

extern crate alloc;

mod copyelim;
mod cse;
mod deadcode;
mod rewrite;
mod rules_generic;
mod schedule;

pub use copyelim::copyelim;
pub use cse::cse;
pub use deadcode::deadcode;
pub use rewrite::{apply_rules, Rules};
pub use rules_generic::GenericRules;
pub use schedule::schedule;
