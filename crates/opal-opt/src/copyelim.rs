//! Copy elimination.
//!
//! Rewrite rules and the SSA builder leave `copy` values behind; this pass
//! repoints every use (arguments and block controls) at the ultimate
//! source, chasing whole chains in one step. The copies themselves become
//! dead and fall to the next dead-code round.

use opal_ir::{Func, Op, ValueId};

/// Follow a copy chain to its source.
///
/// A cycle of copies cannot appear in reachable code; hitting one means the
/// graph is corrupt.
fn copy_source(f: &Func, v: ValueId) -> ValueId {
    let mut cur = v;
    let mut steps = 0;
    while f.value(cur).op == Op::Copy {
        cur = f.value(cur).args[0];
        steps += 1;
        if steps > f.num_values() {
            let b = f.value(v).block;
            f.fatal(b, format_args!("copy cycle through {}", v));
        }
    }
    cur
}

/// Rewrite all uses of copies to their sources.
pub fn copyelim(f: &mut Func) {
    for v in f.values.keys().collect::<alloc::vec::Vec<_>>() {
        if f.value(v).op == Op::Invalid {
            continue;
        }
        for i in 0..f.value(v).args.len() {
            let a = f.value(v).args[i];
            if f.value(a).op == Op::Copy {
                let src = copy_source(f, a);
                f.value_mut(v).args[i] = src;
            }
        }
    }
    for b in f.blocks.keys().collect::<alloc::vec::Vec<_>>() {
        for i in 0..f.block(b).controls.len() {
            let c = f.block(b).controls[i];
            if f.value(c).op == Op::Copy {
                let src = copy_source(f, c);
                f.block_mut(b).controls[i] = src;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, Op, ValueId};

    use super::*;

    #[test]
    fn test_chain_collapses() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [4]\n  v2 = copy.i32 v1\n  v3 = copy.i32 v2\n  v4 = add32.i32 v3, v3\nb1: exit (v0)\n}",
        )
        .unwrap();
        copyelim(&mut f);
        let add = f.value(ValueId::new(4));
        assert_eq!(add.args[0], ValueId::new(1));
        assert_eq!(add.args[1], ValueId::new(1));
    }

    #[test]
    fn test_control_rewritten() {
        let mut f = parse_func(
            "function %t {\nb0: if (v2) -> b1 b2\n  v0 = initmem.mem\n  v1 = constbool.bool [1]\n  v2 = copy.bool v1\nb1: exit (v0)\nb2: exit (v0)\n}",
        )
        .unwrap();
        copyelim(&mut f);
        assert_eq!(f.block(f.entry).controls[0], ValueId::new(1));
    }

    #[test]
    fn test_runs_to_convergence() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [4]\n  v2 = copy.i32 v1\n  v3 = copy.i32 v2\n  v4 = copy.i32 v3\n  v5 = add32.i32 v4, v4\nb1: exit (v0)\n}",
        )
        .unwrap();
        copyelim(&mut f);
        assert_eq!(f.value(ValueId::new(5)).args[0], ValueId::new(1));
        // The copies are now dead but still typed copies; only their uses
        // are gone.
        assert_eq!(f.value(ValueId::new(2)).op, Op::Copy);
    }
}
