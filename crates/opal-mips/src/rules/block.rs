//! MIPS32 terminator rules.
//!
//! After selection, every two-way branch condition folds into the block's
//! kind: generic `if` becomes `ne`, a NOT (`XORconst [1]`) of a comparison
//! inverts the kind, comparisons against zero pick the dedicated
//! compare-with-zero kinds, the FP flag readers fuse into `fpt`/`fpf`,
//! and constant controls collapse to `first` (swapping successors when
//! the second edge is the taken one).

use opal_ir::{BlockId, BlockKind, Func, Op, ValueId};
use opal_opt::Rules;

/// The MIPS32 block rule table.
pub struct MipsBlockRules;

impl Rules for MipsBlockRules {
    fn rewrite_value(&self, _f: &mut Func, _v: ValueId) -> bool {
        false
    }

    fn rewrite_block(&self, f: &mut Func, b: BlockId) -> bool {
        match f.block(b).kind {
            BlockKind::If => rewrite_if(f, b),
            BlockKind::Eq => rewrite_eq(f, b),
            BlockKind::Ne => rewrite_ne(f, b),
            BlockKind::Ltz => rewrite_zero_cmp(f, b, |c| c < 0),
            BlockKind::Lez => rewrite_zero_cmp(f, b, |c| c <= 0),
            BlockKind::Gtz => rewrite_zero_cmp(f, b, |c| c > 0),
            BlockKind::Gez => rewrite_zero_cmp(f, b, |c| c >= 0),
            _ => false,
        }
    }
}

fn control(f: &Func, b: BlockId) -> ValueId {
    f.block(b).controls[0]
}

fn is_sgt_family(op: Op) -> bool {
    matches!(
        op,
        Op::MipsSgt
            | Op::MipsSgtu
            | Op::MipsSgtConst
            | Op::MipsSgtuConst
            | Op::MipsSgtZero
            | Op::MipsSgtuZero
    )
}

fn reset_kind(f: &mut Func, b: BlockId, kind: BlockKind, ctrl: ValueId) -> bool {
    f.reset_block(b, kind);
    f.set_control(b, ctrl);
    true
}

fn rewrite_if(f: &mut Func, b: BlockId) -> bool {
    // match: (If cond yes no)
    // result: (NE cond yes no)
    let cond = control(f, b);
    reset_kind(f, b, BlockKind::Ne, cond)
}

fn rewrite_eq(f: &mut Func, b: BlockId) -> bool {
    let v_0 = control(f, b);
    // match: (EQ (FPFlagTrue cmp) yes no)
    // result: (FPF cmp yes no)
    if f.value(v_0).op == Op::MipsFpFlagTrue {
        let cmp = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Fpf, cmp);
    }
    // match: (EQ (FPFlagFalse cmp) yes no)
    // result: (FPT cmp yes no)
    if f.value(v_0).op == Op::MipsFpFlagFalse {
        let cmp = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Fpt, cmp);
    }
    // match: (EQ (XORconst [1] cmp:(SGT-family)) yes no)
    // result: (NE cmp yes no)
    if f.value(v_0).op == Op::MipsXorConst && f.value(v_0).aux_int == 1 {
        let cmp = f.value(v_0).args[0];
        if is_sgt_family(f.value(cmp).op) {
            return reset_kind(f, b, BlockKind::Ne, cmp);
        }
    }
    // match: (EQ (SGTUconst [1] x) yes no)
    // result: (NE x yes no)
    if f.value(v_0).op == Op::MipsSgtuConst && f.value(v_0).aux_int == 1 {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Ne, x);
    }
    // match: (EQ (SGTUzero x) yes no)
    // result: (EQ x yes no)
    if f.value(v_0).op == Op::MipsSgtuZero {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Eq, x);
    }
    // match: (EQ (SGTconst [0] x) yes no)
    // result: (GEZ x yes no)
    if f.value(v_0).op == Op::MipsSgtConst && f.value(v_0).aux_int == 0 {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Gez, x);
    }
    // match: (EQ (SGTzero x) yes no)
    // result: (LEZ x yes no)
    if f.value(v_0).op == Op::MipsSgtZero {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Lez, x);
    }
    // match: (EQ (MOVWconst [0]) yes no)
    // result: (First yes no)
    // match: (EQ (MOVWconst [c]) yes no)
    // cond: c != 0
    // result: (First no yes)
    if f.value(v_0).op == Op::MipsMovwConst {
        let c = f.value(v_0).aux_int;
        f.reset_block(b, BlockKind::First);
        if c != 0 {
            f.swap_successors(b);
        }
        return true;
    }
    false
}

fn rewrite_ne(f: &mut Func, b: BlockId) -> bool {
    let v_0 = control(f, b);
    // match: (NE (FPFlagTrue cmp) yes no)
    // result: (FPT cmp yes no)
    if f.value(v_0).op == Op::MipsFpFlagTrue {
        let cmp = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Fpt, cmp);
    }
    // match: (NE (FPFlagFalse cmp) yes no)
    // result: (FPF cmp yes no)
    if f.value(v_0).op == Op::MipsFpFlagFalse {
        let cmp = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Fpf, cmp);
    }
    // match: (NE (XORconst [1] cmp:(SGT-family)) yes no)
    // result: (EQ cmp yes no)
    if f.value(v_0).op == Op::MipsXorConst && f.value(v_0).aux_int == 1 {
        let cmp = f.value(v_0).args[0];
        if is_sgt_family(f.value(cmp).op) {
            return reset_kind(f, b, BlockKind::Eq, cmp);
        }
    }
    // match: (NE (SGTUconst [1] x) yes no)
    // result: (EQ x yes no)
    if f.value(v_0).op == Op::MipsSgtuConst && f.value(v_0).aux_int == 1 {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Eq, x);
    }
    // match: (NE (SGTUzero x) yes no)
    // result: (NE x yes no)
    if f.value(v_0).op == Op::MipsSgtuZero {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Ne, x);
    }
    // match: (NE (SGTconst [0] x) yes no)
    // result: (LTZ x yes no)
    if f.value(v_0).op == Op::MipsSgtConst && f.value(v_0).aux_int == 0 {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Ltz, x);
    }
    // match: (NE (SGTzero x) yes no)
    // result: (GTZ x yes no)
    if f.value(v_0).op == Op::MipsSgtZero {
        let x = f.value(v_0).args[0];
        return reset_kind(f, b, BlockKind::Gtz, x);
    }
    // match: (NE (MOVWconst [0]) yes no)
    // result: (First no yes)
    // match: (NE (MOVWconst [c]) yes no)
    // cond: c != 0
    // result: (First yes no)
    if f.value(v_0).op == Op::MipsMovwConst {
        let c = f.value(v_0).aux_int;
        f.reset_block(b, BlockKind::First);
        if c == 0 {
            f.swap_successors(b);
        }
        return true;
    }
    false
}

fn rewrite_zero_cmp(f: &mut Func, b: BlockId, taken: impl Fn(i32) -> bool) -> bool {
    // match: (GEZ (MOVWconst [c]) yes no)
    // result: (First yes no) when the comparison holds, (First no yes)
    // otherwise; likewise for GTZ/LEZ/LTZ.
    let v_0 = control(f, b);
    if f.value(v_0).op != Op::MipsMovwConst {
        return false;
    }
    let c = f.value(v_0).aux_int as i32;
    let take_first = taken(c);
    f.reset_block(b, BlockKind::First);
    if !take_first {
        f.swap_successors(b);
    }
    true
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, BlockId, BlockKind, Op, ValueId};
    use opal_opt::deadcode;

    use super::*;
    use opal_codegen::rewrite_blocks;

    #[test]
    fn test_if_becomes_ne() {
        let mut f = parse_func(
            "function %t {\nb0: if (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = arg.bool\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        assert_eq!(f.block(BlockId::new(0)).kind, BlockKind::Ne);
    }

    #[test]
    fn test_not_of_sgt_inverts_branch() {
        // Scenario: branch on (XORconst [1] (SGT x y)) loses the XOR and
        // inverts the kind; DCE then removes the dead XOR.
        let mut f = parse_func(
            "function %t {\nb0: if (v3) -> b1 b2\n  v0 = initmem.mem\n  v1 = arg.i32\n  v2 = arg.i32 [4]\n  v4 = mips_sgt.bool v1, v2\n  v3 = mips_xorconst.bool [1] v4\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        let before = f.num_values();
        rewrite_blocks(&mut f, &MipsBlockRules);
        assert_eq!(f.block(BlockId::new(0)).kind, BlockKind::Eq);
        assert_eq!(f.block(BlockId::new(0)).controls[0], ValueId::new(4));

        deadcode(&mut f);
        let live_after = f
            .blocks
            .values()
            .map(|b| b.values.len())
            .sum::<usize>();
        // The xorconst died: one fewer live value than before.
        assert_eq!(live_after, before - 1);
    }

    #[test]
    fn test_eq_of_sgtconst_zero_becomes_gez() {
        let mut f = parse_func(
            "function %t {\nb0: eq (v2) -> b1 b2\n  v0 = initmem.mem\n  v1 = arg.i32\n  v2 = mips_sgtconst.bool [0] v1\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        assert_eq!(f.block(BlockId::new(0)).kind, BlockKind::Gez);
        assert_eq!(f.block(BlockId::new(0)).controls[0], ValueId::new(1));
    }

    #[test]
    fn test_eq_const_zero_takes_first() {
        let mut f = parse_func(
            "function %t {\nb0: eq (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [0]\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        let entry = BlockId::new(0);
        assert_eq!(f.block(entry).kind, BlockKind::First);
        assert_eq!(f.block(entry).succs[0].block, BlockId::new(1));
    }

    #[test]
    fn test_ne_const_zero_swaps() {
        let mut f = parse_func(
            "function %t {\nb0: ne (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [0]\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        let entry = BlockId::new(0);
        assert_eq!(f.block(entry).kind, BlockKind::First);
        assert_eq!(f.block(entry).succs[0].block, BlockId::new(2));
    }

    #[test]
    fn test_fp_flag_fuses() {
        let mut f = parse_func(
            "function %t {\nb0: ne (v3) -> b1 b2\n  v0 = initmem.mem\n  v1 = arg.f32\n  v2 = mips_cmpeqf.flags v1, v1\n  v3 = mips_fpflagtrue.bool v2\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        assert_eq!(f.block(BlockId::new(0)).kind, BlockKind::Fpt);
        assert_eq!(f.block(BlockId::new(0)).controls[0], ValueId::new(2));
    }

    #[test]
    fn test_no_conditional_on_constant_remains() {
        // Law: after the block rewriter, no two-way branch has a constant
        // control.
        let mut f = parse_func(
            "function %t {\nb0: if (v1) -> b1 b2\n  v0 = initmem.mem\n  v1 = mips_movwconst.bool [1]\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        rewrite_blocks(&mut f, &MipsBlockRules);
        for b in f.blocks.keys() {
            if f.block(b).kind.is_conditional() {
                assert!(!f.value(f.block(b).controls[0]).is_const());
            }
        }
    }
}
