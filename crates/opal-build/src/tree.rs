//! The frontend tree IR, as delivered to the backend.
//!
//! This is the transient input shape only: one declaration per function,
//! with statements and expressions already type-checked and name-resolved.
//! The concrete front end living behind it is not part of this crate.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use opal_ir::{SourcePos, Symbol, Type};

/// Index of a local variable (parameters included) within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    /// Slot symbol assigned by the front end.
    pub sym: Symbol,
    /// Address-taken variables never live in SSA values; every access goes
    /// through explicit loads and stores of their slot.
    pub addr_taken: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub var: VarId,
    /// Byte offset of the incoming argument in the caller's frame.
    pub abi_offset: i64,
}

/// One function's tree IR.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub vars: Vec<VarDecl>,
    pub params: Vec<Param>,
    /// Result slot, when the function returns a value.
    pub result: Option<(Symbol, Type)>,
    pub body: Vec<Stmt>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    /// Bitwise complement.
    Com,
    /// Boolean negation.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// Integer (or pointer/bool) constant; value in `i64`, type explicit.
    ConstI(Type, i64),
    /// 32-bit float constant, carried as raw bits.
    ConstF(u32),
    Nil,
    Var(VarId),
    Unary(UnOp, Box<Expr>),
    /// Operand type selects signed/unsigned/float variants.
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// Load through a pointer.
    Deref(Box<Expr>, Type),
    /// Address of a local.
    AddrOf(VarId),
    /// Field selection through a pointer: `*(p + off)`.
    Field(Box<Expr>, i64, Type),
    /// Array indexing through a pointer: `*(p + i*size)`.
    Index(Box<Expr>, Box<Expr>, Type),
    /// Call of a statically known function. Arguments are passed on the
    /// stack; the result, if any, comes back there too.
    Call(Symbol, Vec<Expr>, Option<Type>),
    /// Numeric conversion.
    Conv(Box<Expr>, Type),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign(SourcePos, VarId, Expr),
    /// Store through a pointer: `*dst = src`.
    StoreInd(SourcePos, Expr, Expr, Type),
    If(SourcePos, Expr, Vec<Stmt>, Vec<Stmt>),
    While(SourcePos, Expr, Vec<Stmt>),
    Return(SourcePos, Option<Expr>),
    /// Expression evaluated for effect (calls).
    Discard(SourcePos, Expr),
    Block(Vec<Stmt>),
    Label(SourcePos, u32),
    Goto(SourcePos, u32),
}
