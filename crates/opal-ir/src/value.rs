//! SSA value nodes.

use alloc::vec::Vec;
use core::fmt;

use crate::{
    ids::{BlockId, ValueId},
    op::Op,
    sym::{SourcePos, Symbol},
    types::Type,
};

/// Typed auxiliary operand of a value, distinct from `aux_int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aux {
    None,
    /// A frontend symbol: local slot, function, runtime helper.
    Sym(Symbol),
    /// A type operand (e.g. the element type of a store).
    Ty(Type),
}

impl Aux {
    pub fn sym(self) -> Option<Symbol> {
        match self {
            Aux::Sym(s) => Some(s),
            _ => None,
        }
    }
}

/// One SSA value.
///
/// Values live in a function-owned arena and are referenced by id. Rewrite
/// rules mutate a value in place; storage is never freed before the function
/// is dropped.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub op: Op,
    pub ty: Type,
    pub aux: Aux,
    pub aux_int: i64,
    pub args: Vec<ValueId>,
    /// The block that textually contains this value.
    pub block: BlockId,
    pub pos: SourcePos,
}

impl ValueData {
    pub fn new(op: Op, ty: Type, block: BlockId) -> Self {
        Self {
            op,
            ty,
            aux: Aux::None,
            aux_int: 0,
            args: Vec::new(),
            block,
            pos: SourcePos::NONE,
        }
    }

    /// Repoint this value at a different op, clearing its operands.
    pub fn reset(&mut self, op: Op) {
        self.op = op;
        self.aux = Aux::None;
        self.aux_int = 0;
        self.args.clear();
    }

    pub fn is_const(&self) -> bool {
        self.op.is_const()
    }

    /// The constant as a 32-bit signed integer.
    ///
    /// Only meaningful for integer-constant ops; `aux_int` is stored
    /// sign-extended to 64 bits.
    pub fn const_i32(&self) -> i32 {
        self.aux_int as i32
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.op, self.ty)?;
        if self.aux_int != 0 || self.is_const() {
            write!(f, " [{}]", self.aux_int)?;
        }
        if let Aux::Sym(s) = self.aux {
            write!(f, " {{{}}}", s)?;
        }
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
