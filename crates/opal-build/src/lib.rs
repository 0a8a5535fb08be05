//! SSA construction.
//!
//! Turns the frontend's tree IR for one function into the SSA graph the
//! optimizer operates on. Forward references left at control-flow joins are
//! resolved into phis (or copies, when every predecessor agrees) once the
//! whole function has been walked.

#![no_std]

extern crate alloc;

mod builder;
mod frontend;
mod tree;

pub use builder::{build_func, BuildError};
pub use frontend::Frontend;
pub use tree::{BinOp, CmpOp, Expr, FuncDecl, Param, Stmt, UnOp, VarDecl, VarId};
