//! The rewrite engine driver.

use opal_ir::{BlockId, Func, Op, ValueId};

/// A table of local rewrite rules.
///
/// `rewrite_value` may mutate the matched value in place (and create new
/// values in the same block); it must not delete values — it shrinks uses
/// and leaves collection to dead-code elimination. `rewrite_block` folds a
/// block's control value into its kind.
pub trait Rules {
    fn rewrite_value(&self, f: &mut Func, v: ValueId) -> bool;

    fn rewrite_block(&self, _f: &mut Func, _b: BlockId) -> bool {
        false
    }
}

/// Upper bound on whole-function passes. A table that keeps reporting
/// change past this bound is cycling, which is a compiler bug.
const MAX_PASSES: usize = 1000;

/// Apply `rules` to fixpoint over the whole function. Returns whether any
/// rule fired at all, so a driver can alternate rewriting with the
/// dataflow passes until the combination stabilizes.
///
/// Blocks are visited in reverse postorder, values in schedule order.
/// Values appended by a firing rule are picked up in the same pass.
pub fn apply_rules(f: &mut Func, rules: &dyn Rules) -> bool {
    let mut fired = false;
    let mut passes = 0;
    loop {
        let mut changed = false;
        let rpo = f.reverse_postorder();
        for &b in &rpo {
            if rules.rewrite_block(f, b) {
                changed = true;
            }
            let mut i = 0;
            while i < f.block(b).values.len() {
                let v = f.block(b).values[i];
                if f.value(v).op != Op::Invalid && rules.rewrite_value(f, v) {
                    changed = true;
                }
                i += 1;
            }
        }
        if !changed {
            return fired;
        }
        fired = true;
        passes += 1;
        if passes > MAX_PASSES {
            let entry = f.entry;
            f.fatal(
                entry,
                format_args!("rewrite did not reach a fixed point after {} passes", passes),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, Type};

    use super::*;

    /// Rules that never fire.
    struct NoRules;

    impl Rules for NoRules {
        fn rewrite_value(&self, _f: &mut Func, _v: ValueId) -> bool {
            false
        }
    }

    /// Rules that rewrite any const32 except 7 into const32 7, one step
    /// at a time, to exercise the fixpoint loop.
    struct StepRules;

    impl Rules for StepRules {
        fn rewrite_value(&self, f: &mut Func, v: ValueId) -> bool {
            let data = f.value(v);
            if data.op == Op::Const32 && data.ty == Type::I32 && data.aux_int < 7 {
                f.value_mut(v).aux_int += 1;
                return true;
            }
            false
        }
    }

    #[test]
    fn test_no_rules_terminates() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\nb1: exit (v0)\n}",
        )
        .unwrap();
        apply_rules(&mut f, &NoRules);
        assert_eq!(f.value(opal_ir::ValueId::new(1)).aux_int, 1);
    }

    #[test]
    fn test_fixpoint_iterates() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\nb1: exit (v0)\n}",
        )
        .unwrap();
        apply_rules(&mut f, &StepRules);
        assert_eq!(f.value(opal_ir::ValueId::new(1)).aux_int, 7);
    }
}
