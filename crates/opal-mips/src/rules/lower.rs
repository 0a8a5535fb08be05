//! MIPS32 value rules: instruction selection and peepholes.
//!
//! One function per op in match/cond/result form; the first matching rule
//! wins, and commutative matches try both argument orders before giving
//! up. Immediate-form rules fire only when the constant fits the machine's
//! 16-bit field (signed for add/slt, unsigned for the logicals).

use opal_ir::{Func, Op, Type, ValueId};
use opal_opt::Rules;

/// The MIPS32 value rule table.
pub struct MipsLowerRules;

impl Rules for MipsLowerRules {
    fn rewrite_value(&self, f: &mut Func, v: ValueId) -> bool {
        match f.value(v).op {
            // Selection: generic to machine.
            Op::Add8 | Op::Add16 | Op::Add32 | Op::AddPtr => lower_binop(f, v, Op::MipsAdd),
            Op::Sub8 | Op::Sub16 | Op::Sub32 => lower_binop(f, v, Op::MipsSub),
            Op::Mul32 => lower_binop(f, v, Op::MipsMul),
            Op::And8 | Op::And16 | Op::And32 => lower_binop(f, v, Op::MipsAnd),
            Op::Or8 | Op::Or16 | Op::Or32 => lower_binop(f, v, Op::MipsOr),
            Op::Xor8 | Op::Xor16 | Op::Xor32 => lower_binop(f, v, Op::MipsXor),
            Op::Add32F => lower_binop(f, v, Op::MipsAddF),
            Op::Sub32F => lower_binop(f, v, Op::MipsSubF),
            Op::Mul32F => lower_binop(f, v, Op::MipsMulF),
            Op::Div32F => lower_binop(f, v, Op::MipsDivF),
            Op::Neg32 => lower_unop(f, v, Op::MipsNeg),
            Op::Neg32F => lower_unop(f, v, Op::MipsNegF),
            Op::Div32 => lower_div(f, v, Op::MipsDiv, Op::Select1),
            Op::Div32u => lower_div(f, v, Op::MipsDivu, Op::Select1),
            Op::Mod32 => lower_div(f, v, Op::MipsDiv, Op::Select0),
            Op::Mod32u => lower_div(f, v, Op::MipsDivu, Op::Select0),
            Op::Com32 => lower_com32(f, v),
            Op::Not => lower_not(f, v),
            Op::Lsh32x32 => lower_lsh32(f, v),
            Op::Rsh32x32 => lower_rsh32(f, v),
            Op::Rsh32Ux32 => lower_rsh32u(f, v),
            Op::Eq32 | Op::EqPtr => lower_eq32(f, v),
            Op::Neq32 => lower_neq32(f, v),
            Op::Less32 => lower_cmp_swap(f, v, Op::MipsSgt),
            Op::Less32U => lower_cmp_swap(f, v, Op::MipsSgtu),
            Op::Greater32 => lower_binop(f, v, Op::MipsSgt),
            Op::Greater32U => lower_binop(f, v, Op::MipsSgtu),
            Op::Leq32 => lower_cmp_not(f, v, Op::MipsSgt, false),
            Op::Leq32U => lower_cmp_not(f, v, Op::MipsSgtu, false),
            Op::Geq32 => lower_cmp_not(f, v, Op::MipsSgt, true),
            Op::Geq32U => lower_cmp_not(f, v, Op::MipsSgtu, true),
            Op::Eq32F => lower_fcmp(f, v, Op::MipsCmpEqF, Op::MipsFpFlagTrue, false),
            Op::Neq32F => lower_fcmp(f, v, Op::MipsCmpEqF, Op::MipsFpFlagFalse, false),
            Op::Less32F => lower_fcmp(f, v, Op::MipsCmpGtF, Op::MipsFpFlagTrue, true),
            Op::Leq32F => lower_fcmp(f, v, Op::MipsCmpGeF, Op::MipsFpFlagTrue, true),
            Op::Greater32F => lower_fcmp(f, v, Op::MipsCmpGtF, Op::MipsFpFlagTrue, false),
            Op::Geq32F => lower_fcmp(f, v, Op::MipsCmpGeF, Op::MipsFpFlagTrue, false),
            Op::Const8 | Op::Const16 | Op::Const32 | Op::ConstBool | Op::ConstNil => {
                lower_const(f, v)
            }
            Op::Const32F => lower_const_f(f, v),
            Op::SignExt8to32 => lower_signext(f, v, 24),
            Op::SignExt16to32 => lower_signext(f, v, 16),
            Op::ZeroExt8to32 => lower_zeroext(f, v, 0xff),
            Op::ZeroExt16to32 => lower_zeroext(f, v, 0xffff),
            Op::Trunc32to8 | Op::Trunc32to16 => lower_trunc(f, v),
            Op::Cvt32to32F => lower_unop(f, v, Op::MipsMovwF),
            Op::Cvt32Fto32 => lower_unop(f, v, Op::MipsTruncFW),
            Op::Load => lower_load(f, v),
            Op::Store => lower_store(f, v),
            Op::Addr => lower_addr(f, v),
            Op::OffPtr => lower_offptr(f, v),
            Op::IsNonNil => lower_unop(f, v, Op::MipsSgtuZero),
            Op::NilCheck => lower_op_keep_args(f, v, Op::MipsLoweredNilCheck),
            Op::StaticCall => lower_op_keep_args(f, v, Op::MipsCallStatic),
            Op::Zero => lower_zero(f, v),
            Op::Move => lower_move(f, v),

            // Peepholes on machine ops.
            Op::MipsAdd => rewrite_mips_add(f, v),
            Op::MipsSub => rewrite_mips_sub(f, v),
            Op::MipsAddConst => rewrite_mips_addconst(f, v),
            Op::MipsAnd => rewrite_mips_logical(f, v, Op::MipsAndConst),
            Op::MipsOr => rewrite_mips_logical(f, v, Op::MipsOrConst),
            Op::MipsXor => rewrite_mips_logical(f, v, Op::MipsXorConst),
            Op::MipsXorConst => rewrite_mips_xorconst(f, v),
            Op::MipsSgt => rewrite_mips_sgt(f, v),
            Op::MipsSgtu => rewrite_mips_sgtu(f, v),
            Op::MipsSllConst => rewrite_mips_shiftconst(f, v, |c, d| {
                ((c as u32) << (d as u32 & 31)) as i32
            }),
            Op::MipsSrlConst => rewrite_mips_shiftconst(f, v, |c, d| {
                ((c as u32) >> (d as u32 & 31)) as i32
            }),
            Op::MipsSraConst => rewrite_mips_shiftconst(f, v, |c, d| c >> (d as u32 & 31)),
            Op::MipsCmovz => rewrite_mips_cmovz(f, v),
            Op::MipsMovbLoad
            | Op::MipsMovbuLoad
            | Op::MipsMovhLoad
            | Op::MipsMovhuLoad
            | Op::MipsMovwLoad
            | Op::MipsMovfLoad => rewrite_mips_load(f, v),
            Op::MipsMovbStore | Op::MipsMovhStore | Op::MipsMovwStore | Op::MipsMovfStore => {
                rewrite_mips_store(f, v)
            }
            _ => false,
        }
    }
}

fn fits16(c: i64) -> bool {
    (-0x8000..=0x7fff).contains(&c)
}

fn fits16u(c: i64) -> bool {
    (0..=0xffff).contains(&c)
}

fn op_of(f: &Func, v: ValueId) -> Op {
    f.value(v).op
}

fn auxint(f: &Func, v: ValueId) -> i64 {
    f.value(v).aux_int
}

fn args2(f: &Func, v: ValueId) -> (ValueId, ValueId) {
    let a = &f.value(v).args;
    (a[0], a[1])
}

fn reset_with_args(f: &mut Func, v: ValueId, op: Op, args: &[ValueId]) -> bool {
    let ty = f.value(v).ty;
    f.reset_value(v, op);
    f.value_mut(v).ty = ty;
    f.value_mut(v).args.extend_from_slice(args);
    true
}

fn reset_copy(f: &mut Func, v: ValueId, x: ValueId) -> bool {
    f.reset_value(v, Op::Copy);
    f.value_mut(v).args.push(x);
    true
}

// ---- Selection ----

fn lower_binop(f: &mut Func, v: ValueId, op: Op) -> bool {
    // match: (GenericOp x y)
    // result: (MachineOp x y)
    let (x, y) = args2(f, v);
    reset_with_args(f, v, op, &[x, y])
}

fn lower_unop(f: &mut Func, v: ValueId, op: Op) -> bool {
    let x = f.value(v).args[0];
    reset_with_args(f, v, op, &[x])
}

fn lower_op_keep_args(f: &mut Func, v: ValueId, op: Op) -> bool {
    let data = f.value(v);
    let (args, aux, aux_int) = (data.args.clone(), data.aux, data.aux_int);
    reset_with_args(f, v, op, &args);
    f.value_mut(v).aux = aux;
    f.value_mut(v).aux_int = aux_int;
    true
}

fn lower_div(f: &mut Func, v: ValueId, div_op: Op, select: Op) -> bool {
    // match: (Div32 x y)
    // result: (Select1 (DIV x y))   -- DIV leaves (rem, quot) in (hi, lo)
    let (x, y) = args2(f, v);
    let block = f.value(v).block;
    let div = f.new_value(block, div_op, Type::TUPLE, &[x, y]);
    reset_with_args(f, v, select, &[div])
}

fn lower_com32(f: &mut Func, v: ValueId) -> bool {
    // match: (Com32 x)
    // result: (NOR x (MOVWconst [0]))
    let x = f.value(v).args[0];
    let block = f.value(v).block;
    let zero = f.new_value_i(block, Op::MipsMovwConst, Type::I32, 0, &[]);
    reset_with_args(f, v, Op::MipsNor, &[x, zero])
}

fn lower_not(f: &mut Func, v: ValueId) -> bool {
    // match: (Not x)
    // result: (XORconst [1] x)
    let x = f.value(v).args[0];
    reset_with_args(f, v, Op::MipsXorConst, &[x]);
    f.value_mut(v).aux_int = 1;
    true
}

fn lower_lsh32(f: &mut Func, v: ValueId) -> bool {
    let (x, y) = args2(f, v);
    // match: (Lsh32x32 x (MOVWconst-like [c]))
    // result: c < 32: (SLLconst [c] x); else (MOVWconst [0])
    loop {
        if !f.value(y).is_const() {
            break;
        }
        let c = auxint(f, y) as u32;
        if c < 32 {
            reset_with_args(f, v, Op::MipsSllConst, &[x]);
            f.value_mut(v).aux_int = c as i64;
        } else {
            f.reset_value(v, Op::MipsMovwConst);
        }
        return true;
    }
    // match: (Lsh32x32 x y)
    // result: (CMOVZ (SLL x y) (MOVWconst [0]) (SGTUconst [32] y))
    let block = f.value(v).block;
    let ty = f.value(v).ty;
    let sll = f.new_value(block, Op::MipsSll, ty, &[x, y]);
    let zero = f.new_value_i(block, Op::MipsMovwConst, ty, 0, &[]);
    let guard = f.new_value_i(block, Op::MipsSgtuConst, Type::BOOL, 32, &[y]);
    reset_with_args(f, v, Op::MipsCmovz, &[sll, zero, guard])
}

fn lower_rsh32u(f: &mut Func, v: ValueId) -> bool {
    let (x, y) = args2(f, v);
    // match: (Rsh32Ux32 x (const [c]))
    // result: c < 32: (SRLconst [c] x); else (MOVWconst [0])
    loop {
        if !f.value(y).is_const() {
            break;
        }
        let c = auxint(f, y) as u32;
        if c < 32 {
            reset_with_args(f, v, Op::MipsSrlConst, &[x]);
            f.value_mut(v).aux_int = c as i64;
        } else {
            f.reset_value(v, Op::MipsMovwConst);
        }
        return true;
    }
    // match: (Rsh32Ux32 x y)
    // result: (CMOVZ (SRL x y) (MOVWconst [0]) (SGTUconst [32] y))
    let block = f.value(v).block;
    let ty = f.value(v).ty;
    let srl = f.new_value(block, Op::MipsSrl, ty, &[x, y]);
    let zero = f.new_value_i(block, Op::MipsMovwConst, ty, 0, &[]);
    let guard = f.new_value_i(block, Op::MipsSgtuConst, Type::BOOL, 32, &[y]);
    reset_with_args(f, v, Op::MipsCmovz, &[srl, zero, guard])
}

fn lower_rsh32(f: &mut Func, v: ValueId) -> bool {
    let (x, y) = args2(f, v);
    // match: (Rsh32x32 x (const [c]))
    // result: (SRAconst [min(c, 31)] x)
    loop {
        if !f.value(y).is_const() {
            break;
        }
        let c = (auxint(f, y) as u32).min(31);
        reset_with_args(f, v, Op::MipsSraConst, &[x]);
        f.value_mut(v).aux_int = c as i64;
        return true;
    }
    // match: (Rsh32x32 x y)
    // result: (SRA x (CMOVZ y (MOVWconst [31]) (SGTUconst [32] y)))
    let block = f.value(v).block;
    let ty = f.value(v).ty;
    let thirtyone = f.new_value_i(block, Op::MipsMovwConst, Type::I32, 31, &[]);
    let guard = f.new_value_i(block, Op::MipsSgtuConst, Type::BOOL, 32, &[y]);
    let clamp = f.new_value(block, Op::MipsCmovz, Type::I32, &[y, thirtyone, guard]);
    reset_with_args(f, v, Op::MipsSra, &[x, clamp])
}

fn lower_eq32(f: &mut Func, v: ValueId) -> bool {
    // match: (Eq32 x y)
    // result: (SGTUconst [1] (XOR x y))
    let (x, y) = args2(f, v);
    let block = f.value(v).block;
    let xor = f.new_value(block, Op::MipsXor, Type::U32, &[x, y]);
    reset_with_args(f, v, Op::MipsSgtuConst, &[xor]);
    f.value_mut(v).aux_int = 1;
    true
}

fn lower_neq32(f: &mut Func, v: ValueId) -> bool {
    // match: (Neq32 x y)
    // result: (SGTUzero (XOR x y))
    let (x, y) = args2(f, v);
    let block = f.value(v).block;
    let xor = f.new_value(block, Op::MipsXor, Type::U32, &[x, y]);
    reset_with_args(f, v, Op::MipsSgtuZero, &[xor])
}

fn lower_cmp_swap(f: &mut Func, v: ValueId, op: Op) -> bool {
    // match: (Less32 x y)
    // result: (SGT y x)
    let (x, y) = args2(f, v);
    reset_with_args(f, v, op, &[y, x])
}

fn lower_cmp_not(f: &mut Func, v: ValueId, op: Op, swap: bool) -> bool {
    // match: (Leq32 x y)
    // result: (XORconst [1] (SGT x y))
    // match: (Geq32 x y)
    // result: (XORconst [1] (SGT y x))
    let (x, y) = args2(f, v);
    let block = f.value(v).block;
    let ty = f.value(v).ty;
    let sgt = if swap {
        f.new_value(block, op, ty, &[y, x])
    } else {
        f.new_value(block, op, ty, &[x, y])
    };
    reset_with_args(f, v, Op::MipsXorConst, &[sgt]);
    f.value_mut(v).aux_int = 1;
    true
}

fn lower_fcmp(f: &mut Func, v: ValueId, cmp_op: Op, flag_op: Op, swap: bool) -> bool {
    // match: (Less32F x y)
    // result: (FPFlagTrue (CMPGTF y x))
    let (x, y) = args2(f, v);
    let block = f.value(v).block;
    let cmp = if swap {
        f.new_value(block, cmp_op, Type::FLAGS, &[y, x])
    } else {
        f.new_value(block, cmp_op, Type::FLAGS, &[x, y])
    };
    reset_with_args(f, v, flag_op, &[cmp])
}

fn lower_const(f: &mut Func, v: ValueId) -> bool {
    // match: (Const32 [c])
    // result: (MOVWconst [c])
    let c = f.value(v).aux_int;
    f.reset_value(v, Op::MipsMovwConst);
    f.value_mut(v).aux_int = c as i32 as i64;
    true
}

fn lower_const_f(f: &mut Func, v: ValueId) -> bool {
    // match: (Const32F [bits])
    // result: (MOVFconst [bits])
    let c = f.value(v).aux_int;
    f.reset_value(v, Op::MipsMovfConst);
    f.value_mut(v).aux_int = c;
    true
}

fn lower_signext(f: &mut Func, v: ValueId, shift: i64) -> bool {
    // match: (SignExt8to32 x)
    // result: (SRAconst [24] (SLLconst [24] x))
    let x = f.value(v).args[0];
    let block = f.value(v).block;
    let ty = f.value(v).ty;
    let sll = f.new_value_i(block, Op::MipsSllConst, ty, shift, &[x]);
    reset_with_args(f, v, Op::MipsSraConst, &[sll]);
    f.value_mut(v).aux_int = shift;
    true
}

fn lower_zeroext(f: &mut Func, v: ValueId, mask: i64) -> bool {
    // match: (ZeroExt8to32 x)
    // result: (ANDconst [0xff] x)
    let x = f.value(v).args[0];
    reset_with_args(f, v, Op::MipsAndConst, &[x]);
    f.value_mut(v).aux_int = mask;
    true
}

fn lower_trunc(f: &mut Func, v: ValueId) -> bool {
    // match: (Trunc32to8 x)
    // result: x
    let x = f.value(v).args[0];
    reset_copy(f, v, x)
}

fn lower_load(f: &mut Func, v: ValueId) -> bool {
    // match: (Load <t> ptr mem)
    // result: sized machine load picked by t
    let (ptr, mem) = args2(f, v);
    let ty = f.value(v).ty;
    let op = if ty.is_float() {
        Op::MipsMovfLoad
    } else {
        match (ty.size, ty.signed) {
            (1, true) => Op::MipsMovbLoad,
            (1, false) => Op::MipsMovbuLoad,
            (2, true) => Op::MipsMovhLoad,
            (2, false) => Op::MipsMovhuLoad,
            _ => Op::MipsMovwLoad,
        }
    };
    reset_with_args(f, v, op, &[ptr, mem])
}

fn lower_store(f: &mut Func, v: ValueId) -> bool {
    // match: (Store {t} ptr val mem)
    // result: sized machine store picked by t
    let data = f.value(v);
    let (ptr, val, mem) = (data.args[0], data.args[1], data.args[2]);
    let ty = match data.aux {
        opal_ir::Aux::Ty(ty) => ty,
        _ => f.value(val).ty,
    };
    let op = if ty.is_float() {
        Op::MipsMovfStore
    } else {
        match ty.size {
            1 => Op::MipsMovbStore,
            2 => Op::MipsMovhStore,
            _ => Op::MipsMovwStore,
        }
    };
    reset_with_args(f, v, op, &[ptr, val, mem])
}

fn lower_addr(f: &mut Func, v: ValueId) -> bool {
    // match: (Addr {sym} base)
    // result: (MOVWaddr {sym} base)
    let data = f.value(v);
    let (aux, aux_int, base) = (data.aux, data.aux_int, data.args[0]);
    reset_with_args(f, v, Op::MipsMovwAddr, &[base]);
    f.value_mut(v).aux = aux;
    // aux_int carries the addressed object's size for frame layout.
    f.value_mut(v).aux_int = aux_int;
    true
}

fn lower_offptr(f: &mut Func, v: ValueId) -> bool {
    // match: (OffPtr [off] ptr)
    // result: (ADDconst [off] ptr)
    let data = f.value(v);
    let (off, ptr) = (data.aux_int, data.args[0]);
    reset_with_args(f, v, Op::MipsAddConst, &[ptr]);
    f.value_mut(v).aux_int = off;
    true
}

fn lower_zero(f: &mut Func, v: ValueId) -> bool {
    // match: (Zero [s] ptr mem), small s
    // result: a short run of typed zero stores
    // match: (Zero [s] ptr mem)
    // result: (LoweredZero [s] ptr mem)
    let data = f.value(v);
    let (size, ptr, mem) = (data.aux_int, data.args[0], data.args[1]);
    let block = data.block;
    match size {
        0 => {
            return reset_copy(f, v, mem);
        }
        1 | 2 | 4 => {
            let op = match size {
                1 => Op::MipsMovbStore,
                2 => Op::MipsMovhStore,
                _ => Op::MipsMovwStore,
            };
            let zero = f.new_value_i(block, Op::MipsMovwConst, Type::I32, 0, &[]);
            return reset_with_args(f, v, op, &[ptr, zero, mem]);
        }
        8 => {
            let zero = f.new_value_i(block, Op::MipsMovwConst, Type::I32, 0, &[]);
            let first = f.new_value(block, Op::MipsMovwStore, Type::MEM, &[ptr, zero, mem]);
            let high = f.new_value_i(block, Op::MipsAddConst, Type::PTR, 4, &[ptr]);
            reset_with_args(f, v, Op::MipsMovwStore, &[high, zero, first]);
            return true;
        }
        _ => {
            let aux_int = size;
            reset_with_args(f, v, Op::MipsLoweredZero, &[ptr, mem]);
            f.value_mut(v).aux_int = aux_int;
            true
        }
    }
}

fn lower_move(f: &mut Func, v: ValueId) -> bool {
    // match: (Move [s] dst src mem), small s
    // result: load/store pairs
    // match: (Move [s] dst src mem)
    // result: (LoweredMove [s] dst src mem)
    let data = f.value(v);
    let (size, dst, src, mem) = (data.aux_int, data.args[0], data.args[1], data.args[2]);
    let block = data.block;
    match size {
        0 => {
            return reset_copy(f, v, mem);
        }
        1 | 2 | 4 => {
            let (load_op, store_op) = match size {
                1 => (Op::MipsMovbLoad, Op::MipsMovbStore),
                2 => (Op::MipsMovhLoad, Op::MipsMovhStore),
                _ => (Op::MipsMovwLoad, Op::MipsMovwStore),
            };
            let ty = match size {
                1 => Type::I8,
                2 => Type::I16,
                _ => Type::I32,
            };
            let val = f.new_value(block, load_op, ty, &[src, mem]);
            return reset_with_args(f, v, store_op, &[dst, val, mem]);
        }
        8 => {
            let lo = f.new_value(block, Op::MipsMovwLoad, Type::I32, &[src, mem]);
            let st0 = f.new_value(block, Op::MipsMovwStore, Type::MEM, &[dst, lo, mem]);
            let src_hi = f.new_value_i(block, Op::MipsAddConst, Type::PTR, 4, &[src]);
            let dst_hi = f.new_value_i(block, Op::MipsAddConst, Type::PTR, 4, &[dst]);
            let hi = f.new_value(block, Op::MipsMovwLoad, Type::I32, &[src_hi, st0]);
            return reset_with_args(f, v, Op::MipsMovwStore, &[dst_hi, hi, st0]);
        }
        _ => {
            let aux_int = size;
            reset_with_args(f, v, Op::MipsLoweredMove, &[dst, src, mem]);
            f.value_mut(v).aux_int = aux_int;
            true
        }
    }
}

// ---- Peepholes ----

fn rewrite_mips_add(f: &mut Func, v: ValueId) -> bool {
    // match: (ADD x (MOVWconst [c]))
    // cond: fits16(c)
    // result: (ADDconst [c] x)
    // (commutative: both orders)
    for i in 0..2 {
        let (v_0, v_1) = args2(f, v);
        let (x, c_val) = if i == 0 { (v_0, v_1) } else { (v_1, v_0) };
        if op_of(f, c_val) != Op::MipsMovwConst {
            continue;
        }
        let c = auxint(f, c_val);
        if !fits16(c) {
            continue;
        }
        reset_with_args(f, v, Op::MipsAddConst, &[x]);
        f.value_mut(v).aux_int = c;
        return true;
    }
    false
}

fn rewrite_mips_sub(f: &mut Func, v: ValueId) -> bool {
    // match: (SUB x (MOVWconst [c]))
    // cond: fits16(-c)
    // result: (ADDconst [-c] x)
    loop {
        let (x, y) = args2(f, v);
        if op_of(f, y) != Op::MipsMovwConst {
            break;
        }
        let c = auxint(f, y) as i32;
        let neg = c.wrapping_neg() as i64;
        if !fits16(neg) {
            break;
        }
        reset_with_args(f, v, Op::MipsAddConst, &[x]);
        f.value_mut(v).aux_int = neg;
        return true;
    }
    // match: (SUB x x)
    // result: (MOVWconst [0])
    loop {
        let (x, y) = args2(f, v);
        if x != y {
            break;
        }
        f.reset_value(v, Op::MipsMovwConst);
        return true;
    }
    false
}

fn rewrite_mips_addconst(f: &mut Func, v: ValueId) -> bool {
    // match: (ADDconst [c] x)
    // cond: !fits16(c)
    // result: (ADD x (MOVWconst [c]))   -- too wide for addiu
    loop {
        let c = auxint(f, v);
        if fits16(c) {
            break;
        }
        let x = f.value(v).args[0];
        let block = f.value(v).block;
        let wide = f.new_value_i(block, Op::MipsMovwConst, Type::I32, c, &[]);
        reset_with_args(f, v, Op::MipsAdd, &[x, wide]);
        return true;
    }
    // match: (ADDconst [0] x)
    // result: x
    loop {
        if auxint(f, v) != 0 {
            break;
        }
        let x = f.value(v).args[0];
        return reset_copy(f, v, x);
    }
    // match: (ADDconst [c] (MOVWconst [d]))
    // result: (MOVWconst [c+d])
    loop {
        let x = f.value(v).args[0];
        if op_of(f, x) != Op::MipsMovwConst {
            break;
        }
        let c = auxint(f, v) as i32;
        let d = auxint(f, x) as i32;
        f.reset_value(v, Op::MipsMovwConst);
        f.value_mut(v).aux_int = c.wrapping_add(d) as i64;
        return true;
    }
    // match: (ADDconst [c] (ADDconst [d] x))
    // cond: fits16(c+d)
    // result: (ADDconst [c+d] x)
    loop {
        let inner = f.value(v).args[0];
        if op_of(f, inner) != Op::MipsAddConst {
            break;
        }
        let c = auxint(f, v);
        let d = auxint(f, inner);
        if !fits16(c + d) {
            break;
        }
        let x = f.value(inner).args[0];
        f.value_mut(v).args[0] = x;
        f.value_mut(v).aux_int = c + d;
        return true;
    }
    false
}

fn rewrite_mips_logical(f: &mut Func, v: ValueId, const_op: Op) -> bool {
    // match: (AND x (MOVWconst [c]))
    // cond: fits16u(c)
    // result: (ANDconst [c] x)
    // (commutative: both orders; same shape for OR and XOR)
    for i in 0..2 {
        let (v_0, v_1) = args2(f, v);
        let (x, c_val) = if i == 0 { (v_0, v_1) } else { (v_1, v_0) };
        if op_of(f, c_val) != Op::MipsMovwConst {
            continue;
        }
        let c = auxint(f, c_val);
        if !fits16u(c) {
            continue;
        }
        reset_with_args(f, v, const_op, &[x]);
        f.value_mut(v).aux_int = c;
        return true;
    }
    // match: (AND x x) / (OR x x)
    // result: x
    let (v_0, v_1) = args2(f, v);
    if v_0 == v_1 && matches!(const_op, Op::MipsAndConst | Op::MipsOrConst) {
        return reset_copy(f, v, v_0);
    }
    false
}

fn rewrite_mips_xorconst(f: &mut Func, v: ValueId) -> bool {
    // match: (XORconst [0] x)
    // result: x
    loop {
        if auxint(f, v) != 0 {
            break;
        }
        let x = f.value(v).args[0];
        return reset_copy(f, v, x);
    }
    // match: (XORconst [1] (XORconst [1] x))
    // result: x
    loop {
        if auxint(f, v) != 1 {
            break;
        }
        let inner = f.value(v).args[0];
        if op_of(f, inner) != Op::MipsXorConst || auxint(f, inner) != 1 {
            break;
        }
        let x = f.value(inner).args[0];
        return reset_copy(f, v, x);
    }
    // match: (XORconst [c] (MOVWconst [d]))
    // result: (MOVWconst [c^d])
    loop {
        let inner = f.value(v).args[0];
        if op_of(f, inner) != Op::MipsMovwConst {
            break;
        }
        let c = auxint(f, v);
        let d = auxint(f, inner);
        f.reset_value(v, Op::MipsMovwConst);
        f.value_mut(v).aux_int = (c ^ d) as i32 as i64;
        return true;
    }
    false
}

fn rewrite_mips_sgt(f: &mut Func, v: ValueId) -> bool {
    // match: (SGT (MOVWconst [c]) x)
    // cond: fits16(c)
    // result: (SGTconst [c] x)
    loop {
        let (x, y) = args2(f, v);
        if op_of(f, x) != Op::MipsMovwConst {
            break;
        }
        let c = auxint(f, x);
        if !fits16(c) {
            break;
        }
        reset_with_args(f, v, Op::MipsSgtConst, &[y]);
        f.value_mut(v).aux_int = c;
        return true;
    }
    // match: (SGT x (MOVWconst [0]))
    // result: (SGTzero x)
    loop {
        let (x, y) = args2(f, v);
        if op_of(f, y) != Op::MipsMovwConst || auxint(f, y) != 0 {
            break;
        }
        return reset_with_args(f, v, Op::MipsSgtZero, &[x]);
    }
    false
}

fn rewrite_mips_sgtu(f: &mut Func, v: ValueId) -> bool {
    // match: (SGTU (MOVWconst [c]) x)
    // cond: fits16(c)
    // result: (SGTUconst [c] x)
    loop {
        let (x, y) = args2(f, v);
        if op_of(f, x) != Op::MipsMovwConst {
            break;
        }
        let c = auxint(f, x);
        if !fits16(c) {
            break;
        }
        reset_with_args(f, v, Op::MipsSgtuConst, &[y]);
        f.value_mut(v).aux_int = c;
        return true;
    }
    // match: (SGTU x (MOVWconst [0]))
    // result: (SGTUzero x)
    loop {
        let (x, y) = args2(f, v);
        if op_of(f, y) != Op::MipsMovwConst || auxint(f, y) != 0 {
            break;
        }
        return reset_with_args(f, v, Op::MipsSgtuZero, &[x]);
    }
    false
}

fn rewrite_mips_shiftconst(f: &mut Func, v: ValueId, eval: impl Fn(i32, i64) -> i32) -> bool {
    // match: (SLLconst [d] (MOVWconst [c]))
    // result: (MOVWconst [c<<d])   (and likewise for SRL/SRA)
    let x = f.value(v).args[0];
    if op_of(f, x) != Op::MipsMovwConst {
        return false;
    }
    let c = auxint(f, x) as i32;
    let d = auxint(f, v);
    let r = eval(c, d);
    f.reset_value(v, Op::MipsMovwConst);
    f.value_mut(v).aux_int = r as i64;
    true
}

fn rewrite_mips_cmovz(f: &mut Func, v: ValueId) -> bool {
    // match: (CMOVZ a _ (MOVWconst [c]))
    // cond: c != 0
    // result: a
    // match: (CMOVZ _ b (MOVWconst [0]))
    // result: b
    let c_val = f.value(v).args[2];
    if op_of(f, c_val) != Op::MipsMovwConst {
        return false;
    }
    let (a, b) = (f.value(v).args[0], f.value(v).args[1]);
    if auxint(f, c_val) != 0 {
        reset_copy(f, v, a)
    } else {
        reset_copy(f, v, b)
    }
}

fn rewrite_mips_load(f: &mut Func, v: ValueId) -> bool {
    // match: (MOVWload [off] (ADDconst [c] ptr) mem)
    // cond: fits16(off+c)
    // result: (MOVWload [off+c] ptr mem)
    let addr = f.value(v).args[0];
    if op_of(f, addr) != Op::MipsAddConst {
        return false;
    }
    let off = auxint(f, v);
    let c = auxint(f, addr);
    if !fits16(off + c) {
        return false;
    }
    let ptr = f.value(addr).args[0];
    f.value_mut(v).args[0] = ptr;
    f.value_mut(v).aux_int = off + c;
    true
}

fn rewrite_mips_store(f: &mut Func, v: ValueId) -> bool {
    // match: (MOVWstore [off] (ADDconst [c] ptr) val mem)
    // cond: fits16(off+c)
    // result: (MOVWstore [off+c] ptr val mem)
    let addr = f.value(v).args[0];
    if op_of(f, addr) != Op::MipsAddConst {
        return false;
    }
    let off = auxint(f, v);
    let c = auxint(f, addr);
    if !fits16(off + c) {
        return false;
    }
    let ptr = f.value(addr).args[0];
    f.value_mut(v).args[0] = ptr;
    f.value_mut(v).aux_int = off + c;
    true
}
