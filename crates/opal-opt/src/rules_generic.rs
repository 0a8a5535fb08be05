//! Generic rewrite rules: constant folding and canonicalization.
//!
//! One function per op, each a sequence of rules tried in order; the first
//! match wins. Every rule is written in match/cond/result form so the table
//! stays mechanically checkable against its declarative statement.
//!
//! Canonical forms established here: constant operands sit in the right
//! argument of commutative ops, and subtraction by a constant becomes
//! addition of its negation. Floating-point rules fold constants bit-exactly
//! and never reassociate.

use opal_ir::{BlockId, BlockKind, Func, Op, ValueId};

use crate::rewrite::Rules;

/// The generic rule table.
pub struct GenericRules;

impl Rules for GenericRules {
    fn rewrite_value(&self, f: &mut Func, v: ValueId) -> bool {
        match f.value(v).op {
            Op::Add8 => rewrite_add8(f, v),
            Op::Add16 => rewrite_add16(f, v),
            Op::Add32 => rewrite_add32(f, v),
            Op::AddPtr => rewrite_addptr(f, v),
            Op::Sub8 => rewrite_sub8(f, v),
            Op::Sub16 => rewrite_sub16(f, v),
            Op::Sub32 => rewrite_sub32(f, v),
            Op::Mul32 => rewrite_mul32(f, v),
            Op::Div32 => rewrite_div32(f, v),
            Op::Div32u => rewrite_div32u(f, v),
            Op::Mod32 => rewrite_mod32(f, v),
            Op::Mod32u => rewrite_mod32u(f, v),
            Op::And8 | Op::And16 | Op::And32 => rewrite_and(f, v),
            Op::Or8 | Op::Or16 | Op::Or32 => rewrite_or(f, v),
            Op::Xor8 | Op::Xor16 | Op::Xor32 => rewrite_xor(f, v),
            Op::Com32 => rewrite_com32(f, v),
            Op::Neg32 => rewrite_neg32(f, v),
            Op::Not => rewrite_not(f, v),
            Op::Lsh32x32 => rewrite_lsh32(f, v),
            Op::Rsh32x32 => rewrite_rsh32(f, v),
            Op::Rsh32Ux32 => rewrite_rsh32u(f, v),
            Op::Eq32 => rewrite_eq32(f, v),
            Op::Neq32 => rewrite_neq32(f, v),
            Op::Less32 => rewrite_less32(f, v),
            Op::Less32U => rewrite_less32u(f, v),
            Op::Leq32 => rewrite_leq32(f, v),
            Op::Leq32U => rewrite_leq32u(f, v),
            Op::Greater32 => rewrite_greater32(f, v),
            Op::Greater32U => rewrite_greater32u(f, v),
            Op::Geq32 => rewrite_geq32(f, v),
            Op::Geq32U => rewrite_geq32u(f, v),
            Op::SignExt8to32 => rewrite_signext8(f, v),
            Op::SignExt16to32 => rewrite_signext16(f, v),
            Op::ZeroExt8to32 => rewrite_zeroext8(f, v),
            Op::ZeroExt16to32 => rewrite_zeroext16(f, v),
            Op::Trunc32to8 => rewrite_trunc8(f, v),
            Op::Trunc32to16 => rewrite_trunc16(f, v),
            Op::Add32F => rewrite_add32f(f, v),
            Op::Sub32F => rewrite_sub32f(f, v),
            Op::Mul32F => rewrite_mul32f(f, v),
            Op::Neg32F => rewrite_neg32f(f, v),
            Op::IsNonNil => rewrite_isnonnil(f, v),
            Op::Phi => rewrite_phi(f, v),
            _ => false,
        }
    }

    fn rewrite_block(&self, f: &mut Func, b: BlockId) -> bool {
        rewrite_block_generic(f, b)
    }
}

// ---- Shared helpers, shaped like the generated table's prologue ----

fn op_of(f: &Func, v: ValueId) -> Op {
    f.value(v).op
}

fn auxint(f: &Func, v: ValueId) -> i64 {
    f.value(v).aux_int
}

fn reset_const(f: &mut Func, v: ValueId, op: Op, c: i64) -> bool {
    f.reset_value(v, op);
    f.value_mut(v).aux_int = c;
    true
}

fn reset_copy(f: &mut Func, v: ValueId, x: ValueId) -> bool {
    f.reset_value(v, Op::Copy);
    f.value_mut(v).args.push(x);
    true
}

fn args2(f: &Func, v: ValueId) -> (ValueId, ValueId) {
    let a = &f.value(v).args;
    (a[0], a[1])
}

/// Shared canonicalization for a commutative op: move a constant left
/// argument to the right.
fn swap_const_left(f: &mut Func, v: ValueId) -> bool {
    // match: (op (const [c]) x)
    // cond: x is not a constant
    // result: (op x (const [c]))
    let (v_0, v_1) = args2(f, v);
    if f.value(v_0).is_const() && !f.value(v_1).is_const() {
        f.value_mut(v).args.swap(0, 1);
        return true;
    }
    false
}

// ---- Integer addition ----

fn rewrite_add32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Add32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c+d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as i32;
        return reset_const(f, v, Op::Const32, c.wrapping_add(d) as i64);
    }
    // match: (Add32 x (Const32 [0]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    swap_const_left(f, v)
}

fn rewrite_add8(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Add8 (Const8 [c]) (Const8 [d]))
    // result: (Const8 [c+d])
    loop {
        if op_of(f, v_0) != Op::Const8 || op_of(f, v_1) != Op::Const8 {
            break;
        }
        let c = auxint(f, v_0) as i8;
        let d = auxint(f, v_1) as i8;
        return reset_const(f, v, Op::Const8, c.wrapping_add(d) as i64);
    }
    swap_const_left(f, v)
}

fn rewrite_add16(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Add16 (Const16 [c]) (Const16 [d]))
    // result: (Const16 [c+d])
    loop {
        if op_of(f, v_0) != Op::Const16 || op_of(f, v_1) != Op::Const16 {
            break;
        }
        let c = auxint(f, v_0) as i16;
        let d = auxint(f, v_1) as i16;
        return reset_const(f, v, Op::Const16, c.wrapping_add(d) as i64);
    }
    swap_const_left(f, v)
}

fn rewrite_addptr(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (AddPtr x (Const32 [0]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    false
}

// ---- Integer subtraction ----

fn rewrite_sub32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Sub32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c-d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as i32;
        return reset_const(f, v, Op::Const32, c.wrapping_sub(d) as i64);
    }
    // match: (Sub32 x x)
    // result: (Const32 [0])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, Op::Const32, 0);
    }
    // match: (Sub32 x (Const32 [c]))
    // result: (Add32 x (Const32 [-c]))
    loop {
        if op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_1) as i32;
        let ty = f.value(v).ty;
        let cty = f.value(v_1).ty;
        let block = f.value(v).block;
        let neg = f.new_value_i(block, Op::Const32, cty, c.wrapping_neg() as i64, &[]);
        f.reset_value(v, Op::Add32);
        f.value_mut(v).ty = ty;
        f.value_mut(v).args.push(v_0);
        f.value_mut(v).args.push(neg);
        return true;
    }
    false
}

fn rewrite_sub8(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Sub8 (Const8 [c]) (Const8 [d]))
    // result: (Const8 [c-d])
    loop {
        if op_of(f, v_0) != Op::Const8 || op_of(f, v_1) != Op::Const8 {
            break;
        }
        let c = auxint(f, v_0) as i8;
        let d = auxint(f, v_1) as i8;
        return reset_const(f, v, Op::Const8, c.wrapping_sub(d) as i64);
    }
    // match: (Sub8 x x)
    // result: (Const8 [0])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, Op::Const8, 0);
    }
    false
}

fn rewrite_sub16(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Sub16 (Const16 [c]) (Const16 [d]))
    // result: (Const16 [c-d])
    loop {
        if op_of(f, v_0) != Op::Const16 || op_of(f, v_1) != Op::Const16 {
            break;
        }
        let c = auxint(f, v_0) as i16;
        let d = auxint(f, v_1) as i16;
        return reset_const(f, v, Op::Const16, c.wrapping_sub(d) as i64);
    }
    // match: (Sub16 x x)
    // result: (Const16 [0])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, Op::Const16, 0);
    }
    false
}

// ---- Multiplication and division ----

fn rewrite_mul32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Mul32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c*d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as i32;
        return reset_const(f, v, Op::Const32, c.wrapping_mul(d) as i64);
    }
    // match: (Mul32 x (Const32 [1]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 1 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    // match: (Mul32 _ (Const32 [0]))
    // result: (Const32 [0])
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, 0);
    }
    swap_const_left(f, v)
}

fn rewrite_div32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Div32 (Const32 [c]) (Const32 [d]))
    // cond: d != 0
    // result: (Const32 [c/d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as i32;
        if d == 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, c.wrapping_div(d) as i64);
    }
    // match: (Div32 (Const32 [0]) _)
    // result: (Const32 [0])
    loop {
        if op_of(f, v_0) != Op::Const32 || auxint(f, v_0) != 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, 0);
    }
    false
}

fn rewrite_div32u(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Div32u (Const32 [c]) (Const32 [d]))
    // cond: d != 0
    // result: (Const32 [c/d]) (unsigned)
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as u32;
        let d = auxint(f, v_1) as u32;
        if d == 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, (c / d) as i32 as i64);
    }
    // match: (Div32u (Const32 [0]) _)
    // result: (Const32 [0])
    loop {
        if op_of(f, v_0) != Op::Const32 || auxint(f, v_0) != 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, 0);
    }
    false
}

fn rewrite_mod32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Mod32 (Const32 [c]) (Const32 [d]))
    // cond: d != 0
    // result: (Const32 [c%d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as i32;
        if d == 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, c.wrapping_rem(d) as i64);
    }
    false
}

fn rewrite_mod32u(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Mod32u (Const32 [c]) (Const32 [d]))
    // cond: d != 0
    // result: (Const32 [c%d]) (unsigned)
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as u32;
        let d = auxint(f, v_1) as u32;
        if d == 0 {
            break;
        }
        return reset_const(f, v, Op::Const32, (c % d) as i32 as i64);
    }
    false
}

// ---- Bitwise ops (all widths share the rules) ----

fn const_op_for(op: Op) -> Op {
    match op {
        Op::And8 | Op::Or8 | Op::Xor8 => Op::Const8,
        Op::And16 | Op::Or16 | Op::Xor16 => Op::Const16,
        _ => Op::Const32,
    }
}

fn rewrite_and(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    let const_op = const_op_for(op_of(f, v));
    // match: (And (const [c]) (const [d]))
    // result: (const [c&d])
    loop {
        if op_of(f, v_0) != const_op || op_of(f, v_1) != const_op {
            break;
        }
        let c = auxint(f, v_0);
        let d = auxint(f, v_1);
        return reset_const(f, v, const_op, c & d);
    }
    // match: (And x x)
    // result: x
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    // match: (And _ (const [0]))
    // result: (const [0])
    loop {
        if op_of(f, v_1) != const_op || auxint(f, v_1) != 0 {
            break;
        }
        return reset_const(f, v, const_op, 0);
    }
    swap_const_left(f, v)
}

fn rewrite_or(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    let const_op = const_op_for(op_of(f, v));
    // match: (Or (const [c]) (const [d]))
    // result: (const [c|d])
    loop {
        if op_of(f, v_0) != const_op || op_of(f, v_1) != const_op {
            break;
        }
        let c = auxint(f, v_0);
        let d = auxint(f, v_1);
        return reset_const(f, v, const_op, c | d);
    }
    // match: (Or x x)
    // result: x
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    // match: (Or x (const [0]))
    // result: x
    loop {
        if op_of(f, v_1) != const_op || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    swap_const_left(f, v)
}

fn rewrite_xor(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    let const_op = const_op_for(op_of(f, v));
    // match: (Xor (const [c]) (const [d]))
    // result: (const [c^d])
    loop {
        if op_of(f, v_0) != const_op || op_of(f, v_1) != const_op {
            break;
        }
        let c = auxint(f, v_0);
        let d = auxint(f, v_1);
        return reset_const(f, v, const_op, c ^ d);
    }
    // match: (Xor x x)
    // result: (const [0])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, const_op, 0);
    }
    // match: (Xor x (const [0]))
    // result: x
    loop {
        if op_of(f, v_1) != const_op || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    swap_const_left(f, v)
}

// ---- Unary integer ops ----

fn rewrite_com32(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Com32 (Const32 [c]))
    // result: (Const32 [^c])
    loop {
        if op_of(f, v_0) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        return reset_const(f, v, Op::Const32, !c as i64);
    }
    // match: (Com32 (Com32 x))
    // result: x
    loop {
        if op_of(f, v_0) != Op::Com32 {
            break;
        }
        let x = f.value(v_0).args[0];
        return reset_copy(f, v, x);
    }
    false
}

fn rewrite_neg32(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Neg32 (Const32 [c]))
    // result: (Const32 [-c])
    loop {
        if op_of(f, v_0) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        return reset_const(f, v, Op::Const32, c.wrapping_neg() as i64);
    }
    // match: (Neg32 (Neg32 x))
    // result: x
    loop {
        if op_of(f, v_0) != Op::Neg32 {
            break;
        }
        let x = f.value(v_0).args[0];
        return reset_copy(f, v, x);
    }
    false
}

fn rewrite_not(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Not (ConstBool [c]))
    // result: (ConstBool [1-c])
    loop {
        if op_of(f, v_0) != Op::ConstBool {
            break;
        }
        let c = auxint(f, v_0);
        return reset_const(f, v, Op::ConstBool, 1 - c);
    }
    // match: (Not (Not x))
    // result: x
    loop {
        if op_of(f, v_0) != Op::Not {
            break;
        }
        let x = f.value(v_0).args[0];
        return reset_copy(f, v, x);
    }
    false
}

// ---- Shifts ----

fn rewrite_lsh32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Lsh32x32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c<<d]), zero once d >= 32
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as u32;
        let r = if d >= 32 { 0 } else { c.wrapping_shl(d) };
        return reset_const(f, v, Op::Const32, r as i64);
    }
    // match: (Lsh32x32 x (Const32 [0]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    false
}

fn rewrite_rsh32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Rsh32x32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c>>d]), sign fill once d >= 32
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as i32;
        let d = auxint(f, v_1) as u32;
        let r = if d >= 32 { c >> 31 } else { c >> d };
        return reset_const(f, v, Op::Const32, r as i64);
    }
    // match: (Rsh32x32 x (Const32 [0]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    false
}

fn rewrite_rsh32u(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Rsh32Ux32 (Const32 [c]) (Const32 [d]))
    // result: (Const32 [c>>>d]), zero once d >= 32
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let c = auxint(f, v_0) as u32;
        let d = auxint(f, v_1) as u32;
        let r = if d >= 32 { 0 } else { c >> d };
        return reset_const(f, v, Op::Const32, r as i32 as i64);
    }
    // match: (Rsh32Ux32 x (Const32 [0]))
    // result: x
    loop {
        if op_of(f, v_1) != Op::Const32 || auxint(f, v_1) != 0 {
            break;
        }
        return reset_copy(f, v, v_0);
    }
    false
}

// ---- Comparisons ----

fn rewrite_eq32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Eq32 (Const32 [c]) (Const32 [d]))
    // result: (ConstBool [c == d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let r = (auxint(f, v_0) as i32) == (auxint(f, v_1) as i32);
        return reset_const(f, v, Op::ConstBool, r as i64);
    }
    // match: (Eq32 x x)
    // result: (ConstBool [1])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, Op::ConstBool, 1);
    }
    swap_const_left(f, v)
}

fn rewrite_neq32(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Neq32 (Const32 [c]) (Const32 [d]))
    // result: (ConstBool [c != d])
    loop {
        if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
            break;
        }
        let r = (auxint(f, v_0) as i32) != (auxint(f, v_1) as i32);
        return reset_const(f, v, Op::ConstBool, r as i64);
    }
    // match: (Neq32 x x)
    // result: (ConstBool [0])
    loop {
        if v_0 != v_1 {
            break;
        }
        return reset_const(f, v, Op::ConstBool, 0);
    }
    swap_const_left(f, v)
}

fn fold_cmp32(
    f: &mut Func,
    v: ValueId,
    signed: impl Fn(i32, i32) -> bool,
) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (cmp (Const32 [c]) (Const32 [d]))
    // result: (ConstBool [cmp(c, d)])
    if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
        return false;
    }
    let c = auxint(f, v_0) as i32;
    let d = auxint(f, v_1) as i32;
    reset_const(f, v, Op::ConstBool, signed(c, d) as i64)
}

fn fold_cmp32u(
    f: &mut Func,
    v: ValueId,
    unsigned: impl Fn(u32, u32) -> bool,
) -> bool {
    let (v_0, v_1) = args2(f, v);
    if op_of(f, v_0) != Op::Const32 || op_of(f, v_1) != Op::Const32 {
        return false;
    }
    let c = auxint(f, v_0) as u32;
    let d = auxint(f, v_1) as u32;
    reset_const(f, v, Op::ConstBool, unsigned(c, d) as i64)
}

fn rewrite_less32(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32(f, v, |c, d| c < d)
}

fn rewrite_less32u(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32u(f, v, |c, d| c < d)
}

fn rewrite_leq32(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32(f, v, |c, d| c <= d)
}

fn rewrite_leq32u(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32u(f, v, |c, d| c <= d)
}

fn rewrite_greater32(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32(f, v, |c, d| c > d)
}

fn rewrite_greater32u(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32u(f, v, |c, d| c > d)
}

fn rewrite_geq32(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32(f, v, |c, d| c >= d)
}

fn rewrite_geq32u(f: &mut Func, v: ValueId) -> bool {
    fold_cmp32u(f, v, |c, d| c >= d)
}

// ---- Conversions ----

fn rewrite_signext8(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (SignExt8to32 (Const8 [c]))
    // result: (Const32 [int32(int8(c))])
    if op_of(f, v_0) != Op::Const8 {
        return false;
    }
    let c = auxint(f, v_0) as i8;
    reset_const(f, v, Op::Const32, c as i32 as i64)
}

fn rewrite_signext16(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (SignExt16to32 (Const16 [c]))
    // result: (Const32 [int32(int16(c))])
    if op_of(f, v_0) != Op::Const16 {
        return false;
    }
    let c = auxint(f, v_0) as i16;
    reset_const(f, v, Op::Const32, c as i32 as i64)
}

fn rewrite_zeroext8(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (ZeroExt8to32 (Const8 [c]))
    // result: (Const32 [int32(uint8(c))])
    if op_of(f, v_0) != Op::Const8 {
        return false;
    }
    let c = auxint(f, v_0) as u8;
    reset_const(f, v, Op::Const32, c as i64)
}

fn rewrite_zeroext16(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (ZeroExt16to32 (Const16 [c]))
    // result: (Const32 [int32(uint16(c))])
    if op_of(f, v_0) != Op::Const16 {
        return false;
    }
    let c = auxint(f, v_0) as u16;
    reset_const(f, v, Op::Const32, c as i64)
}

fn rewrite_trunc8(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Trunc32to8 (Const32 [c]))
    // result: (Const8 [int8(c)])
    if op_of(f, v_0) != Op::Const32 {
        return false;
    }
    let c = auxint(f, v_0) as i8;
    reset_const(f, v, Op::Const8, c as i64)
}

fn rewrite_trunc16(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Trunc32to16 (Const32 [c]))
    // result: (Const16 [int16(c)])
    if op_of(f, v_0) != Op::Const32 {
        return false;
    }
    let c = auxint(f, v_0) as i16;
    reset_const(f, v, Op::Const16, c as i64)
}

// ---- Floats ----
//
// Folding computes the bit-exact f32 result. No identity or reassociation
// rules: x + 0.0 is not x when x is -0.0.

fn f32_of(f: &Func, v: ValueId) -> f32 {
    f32::from_bits(auxint(f, v) as u32)
}

fn reset_f32(f: &mut Func, v: ValueId, x: f32) -> bool {
    reset_const(f, v, Op::Const32F, x.to_bits() as i64)
}

fn rewrite_add32f(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Add32F (Const32F [c]) (Const32F [d]))
    // result: (Const32F [c+d])
    if op_of(f, v_0) != Op::Const32F || op_of(f, v_1) != Op::Const32F {
        return false;
    }
    let r = f32_of(f, v_0) + f32_of(f, v_1);
    reset_f32(f, v, r)
}

fn rewrite_sub32f(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Sub32F (Const32F [c]) (Const32F [d]))
    // result: (Const32F [c-d])
    if op_of(f, v_0) != Op::Const32F || op_of(f, v_1) != Op::Const32F {
        return false;
    }
    let r = f32_of(f, v_0) - f32_of(f, v_1);
    reset_f32(f, v, r)
}

fn rewrite_mul32f(f: &mut Func, v: ValueId) -> bool {
    let (v_0, v_1) = args2(f, v);
    // match: (Mul32F (Const32F [c]) (Const32F [d]))
    // result: (Const32F [c*d])
    if op_of(f, v_0) != Op::Const32F || op_of(f, v_1) != Op::Const32F {
        return false;
    }
    let r = f32_of(f, v_0) * f32_of(f, v_1);
    reset_f32(f, v, r)
}

fn rewrite_neg32f(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (Neg32F (Const32F [c]))
    // result: (Const32F [-c])
    if op_of(f, v_0) != Op::Const32F {
        return false;
    }
    let r = -f32_of(f, v_0);
    reset_f32(f, v, r)
}

// ---- Pointers and phis ----

fn rewrite_isnonnil(f: &mut Func, v: ValueId) -> bool {
    let v_0 = f.value(v).args[0];
    // match: (IsNonNil (ConstNil))
    // result: (ConstBool [0])
    loop {
        if op_of(f, v_0) != Op::ConstNil {
            break;
        }
        return reset_const(f, v, Op::ConstBool, 0);
    }
    // match: (IsNonNil (Addr _))
    // result: (ConstBool [1])
    loop {
        if op_of(f, v_0) != Op::Addr {
            break;
        }
        return reset_const(f, v, Op::ConstBool, 1);
    }
    false
}

fn rewrite_phi(f: &mut Func, v: ValueId) -> bool {
    // match: (Phi x x .. x) (self-references allowed)
    // result: x
    let mut unique: Option<ValueId> = None;
    for &a in &f.value(v).args {
        if a == v {
            continue;
        }
        match unique {
            None => unique = Some(a),
            Some(u) if u == a => {}
            Some(_) => return false,
        }
    }
    match unique {
        Some(u) => reset_copy(f, v, u),
        None => false,
    }
}

// ---- Block rules ----

fn rewrite_block_generic(f: &mut Func, b: BlockId) -> bool {
    // match: (If (ConstBool [1]) yes no)
    // result: (First yes no)
    // match: (If (ConstBool [0]) yes no)
    // result: (First no yes)
    if f.block(b).kind == BlockKind::If {
        let ctrl = f.block(b).controls[0];
        if f.value(ctrl).op == Op::ConstBool {
            let c = f.value(ctrl).aux_int;
            f.reset_block(b, BlockKind::First);
            if c == 0 {
                f.swap_successors(b);
            }
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, Op, ValueId};

    use super::*;
    use crate::rewrite::apply_rules;

    fn run(src: &str) -> opal_ir::Func {
        let mut f = parse_func(src).expect("fixture should parse");
        apply_rules(&mut f, &GenericRules);
        f
    }

    #[test]
    fn test_add32_const_fold() {
        let f = run(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [14]\n  v2 = const32.i32 [26]\n  v3 = add32.i32 v1, v2\nb1: exit (v0)\n}",
        );
        let v3 = f.value(ValueId::new(3));
        assert_eq!(v3.op, Op::Const32);
        assert_eq!(v3.aux_int, 40);
    }

    #[test]
    fn test_sub_const_becomes_add_neg() {
        let f = run(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = arg.i32\n  v2 = const32.i32 [5]\n  v3 = sub32.i32 v1, v2\nb1: exit (v0)\n}",
        );
        let v3 = f.value(ValueId::new(3));
        assert_eq!(v3.op, Op::Add32);
        let rhs = f.value(v3.args[1]);
        assert_eq!(rhs.op, Op::Const32);
        assert_eq!(rhs.aux_int, -5);
    }

    #[test]
    fn test_commutative_const_moves_right() {
        let f = run(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [3]\n  v2 = arg.i32\n  v3 = mul32.i32 v1, v2\nb1: exit (v0)\n}",
        );
        let v3 = f.value(ValueId::new(3));
        assert_eq!(v3.op, Op::Mul32);
        assert_eq!(v3.args[0], ValueId::new(2));
        assert_eq!(v3.args[1], ValueId::new(1));
    }

    #[test]
    fn test_div_zero_dividend_folds() {
        let f = run(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [0]\n  v2 = arg.i32\n  v3 = div32.i32 v1, v2\nb1: exit (v0)\n}",
        );
        assert_eq!(f.value(ValueId::new(3)).op, Op::Const32);
        assert_eq!(f.value(ValueId::new(3)).aux_int, 0);
    }

    #[test]
    fn test_div_by_zero_divisor_not_folded() {
        let f = run(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = arg.i32\n  v2 = const32.i32 [0]\n  v3 = div32.i32 v1, v2\nb1: exit (v0)\n}",
        );
        // Left for the runtime to fault on.
        assert_eq!(f.value(ValueId::new(3)).op, Op::Div32);
    }

    #[test]
    fn test_if_constbool_collapses_to_first() {
        let mut f = parse_func(
            "function %t {\nb0: if (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = constbool.bool [1]\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        apply_rules(&mut f, &GenericRules);
        let entry = f.entry;
        assert_eq!(f.block(entry).kind, opal_ir::BlockKind::First);
        assert_eq!(f.block(entry).succs[0].block, opal_ir::BlockId::new(1));
    }

    #[test]
    fn test_if_constbool_false_swaps() {
        let mut f = parse_func(
            "function %t {\nb0: if (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = constbool.bool [0]\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        apply_rules(&mut f, &GenericRules);
        let entry = f.entry;
        assert_eq!(f.block(entry).kind, opal_ir::BlockKind::First);
        assert_eq!(f.block(entry).succs[0].block, opal_ir::BlockId::new(2));
    }

    #[test]
    fn test_rewrite_idempotent() {
        let src = "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [14]\n  v2 = const32.i32 [26]\n  v3 = add32.i32 v1, v2\n  v4 = arg.i32\n  v5 = sub32.i32 v4, v3\nb1: exit (v0)\n}";
        let mut f = parse_func(src).unwrap();
        apply_rules(&mut f, &GenericRules);
        let after_one = alloc::string::ToString::to_string(&f);
        apply_rules(&mut f, &GenericRules);
        let after_two = alloc::string::ToString::to_string(&f);
        assert_eq!(after_one, after_two);
    }

    #[test]
    fn test_float_fold_is_bit_exact() {
        let a = 1.5f32.to_bits() as i64;
        let b = 0.25f32.to_bits() as i64;
        let src = alloc::format!(
            "function %t {{\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32f.f32 [{}]\n  v2 = const32f.f32 [{}]\n  v3 = add32f.f32 v1, v2\nb1: exit (v0)\n}}",
            a,
            b
        );
        let f = run(&src);
        let v3 = f.value(ValueId::new(3));
        assert_eq!(v3.op, Op::Const32F);
        assert_eq!(v3.aux_int as u32, 1.75f32.to_bits());
    }

    #[test]
    fn test_trivial_phi_becomes_copy() {
        let f = run(
            "function %t {\nb0: if (v2) -> b1 b2\n  v0 = initmem.mem\n  v1 = const32.i32 [9]\n  v2 = arg.bool\nb1: plain -> b3\nb2: plain -> b3\nb3: exit (v0)\n  v3 = phi.i32 v1, v1\n}",
        );
        assert_eq!(f.value(ValueId::new(3)).op, Op::Copy);
    }
}
