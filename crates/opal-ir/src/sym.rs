//! Frontend-facing names: symbols, local slots, source positions.

use core::fmt;

use crate::types::Type;

/// An interned reference to a frontend object: a local variable, a function,
/// or a runtime helper. The frontend owns the actual name table; the backend
/// only compares and forwards these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// A stack location: a frontend symbol plus a typed offset into it.
///
/// Sub-word fields of an aggregate share the symbol and differ in offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalSlot {
    pub sym: Symbol,
    pub ty: Type,
    pub off: i64,
}

impl fmt::Display for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.off != 0 {
            write!(f, "{}+{}", self.sym, self.off)
        } else {
            write!(f, "{}", self.sym)
        }
    }
}

/// A source position, carried through for line tables and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourcePos(pub u32);

impl SourcePos {
    pub const NONE: SourcePos = SourcePos(0);
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.0)
    }
}
