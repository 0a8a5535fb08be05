//! Dead-code elimination.
//!
//! Liveness seeds are the control values of reachable blocks and every
//! value whose op has an observable effect; everything reachable from a
//! seed through argument edges stays. Dead values are reset to `invalid`
//! and dropped from their block's value list; their storage stays in the
//! arena. Blocks are never deleted: an unreachable block just loses its
//! values and its outgoing edges.

use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{BlockKind, EntityRef, Func, Op, ValueId};

/// Run one round of dead-code elimination.
pub fn deadcode(f: &mut Func) {
    // A First block statically takes its first successor; cut the other
    // edge so reachability sees the truth.
    for b in f.blocks.keys().collect::<Vec<_>>() {
        if f.block(b).kind == BlockKind::First {
            f.remove_succ(b, 1);
            f.block_mut(b).kind = BlockKind::Plain;
        }
    }

    // Reachability from the entry.
    let mut reachable = vec![false; f.num_blocks()];
    for b in f.postorder() {
        reachable[b.index()] = true;
    }

    // Cut every edge leaving an unreachable block, so phis in live blocks
    // stop naming dead predecessors.
    for b in f.blocks.keys().collect::<Vec<_>>() {
        if reachable[b.index()] {
            continue;
        }
        while !f.block(b).succs.is_empty() {
            let last = f.block(b).succs.len() - 1;
            f.remove_succ(b, last);
        }
    }

    // Mark live values.
    let mut live = vec![false; f.num_values()];
    let mut work: Vec<ValueId> = Vec::new();
    for b in f.blocks.keys() {
        if !reachable[b.index()] {
            continue;
        }
        for &c in &f.block(b).controls {
            if !live[c.index()] {
                live[c.index()] = true;
                work.push(c);
            }
        }
        for &v in &f.block(b).values {
            if f.value(v).op.has_effect() && !live[v.index()] {
                live[v.index()] = true;
                work.push(v);
            }
        }
    }
    while let Some(v) = work.pop() {
        for &a in &f.values[v].args {
            if !live[a.index()] {
                live[a.index()] = true;
                work.push(a);
            }
        }
    }

    // Sweep.
    for b in f.blocks.keys().collect::<Vec<_>>() {
        let keep: Vec<ValueId> = f
            .block(b)
            .values
            .iter()
            .copied()
            .filter(|&v| reachable[b.index()] && live[v.index()])
            .collect();
        let dead: Vec<ValueId> = f
            .block(b)
            .values
            .iter()
            .copied()
            .filter(|&v| !(reachable[b.index()] && live[v.index()]))
            .collect();
        for v in dead {
            f.reset_value(v, Op::Invalid);
        }
        f.block_mut(b).values = keep;
    }
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, BlockId, Op, ValueId};

    use super::*;

    #[test]
    fn test_unused_value_removed() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = const32.i32 [2]\n  v3 = add32.i32 v1, v2\nb1: exit (v0)\n}",
        )
        .unwrap();
        deadcode(&mut f);
        assert_eq!(f.value(ValueId::new(3)).op, Op::Invalid);
        assert_eq!(f.value(ValueId::new(0)).op, Op::InitMem);
        assert_eq!(f.block(BlockId::new(0)).values.len(), 1);
    }

    #[test]
    fn test_store_chain_kept() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = sp.ptr\n  v2 = addr.ptr {5} v1\n  v3 = const32.i32 [9]\n  v4 = store.mem v2, v3, v0\nb1: exit (v4)\n}",
        )
        .unwrap();
        deadcode(&mut f);
        // The store has an effect; everything it needs survives.
        for i in 0..5 {
            assert_ne!(f.value(ValueId::new(i)).op, Op::Invalid, "v{} died", i);
        }
    }

    #[test]
    fn test_first_block_prunes_dead_arm() {
        // b0 always takes b1; b2 becomes unreachable and its values die.
        let mut f = parse_func(
            "function %t {\nb0: first -> b1 b2\n  v0 = initmem.mem\nb1: exit (v0)\nb2: plain -> b1\n  v1 = const32.i32 [3]\n}",
        )
        .unwrap();
        deadcode(&mut f);
        assert_eq!(f.block(BlockId::new(0)).kind, opal_ir::BlockKind::Plain);
        assert_eq!(f.block(BlockId::new(0)).succs.len(), 1);
        assert_eq!(f.value(ValueId::new(1)).op, Op::Invalid);
        assert!(f.block(BlockId::new(2)).values.is_empty());
        assert!(f.block(BlockId::new(2)).succs.is_empty());
    }

    #[test]
    fn test_phi_pruned_when_pred_dies() {
        // b2 is unreachable; the phi in b3 loses its arg from b2. The phi
        // feeds a store so it stays live itself.
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v5 = sp.ptr\n  v6 = addr.ptr {9} v5\nb1: plain -> b3\nb2: plain -> b3\n  v2 = const32.i32 [2]\nb3: exit (v4)\n  v3 = phi.i32 v1, v2\n  v4 = store.mem v6, v3, v0\n}",
        )
        .unwrap();
        deadcode(&mut f);
        let phi = f.value(ValueId::new(3));
        assert_eq!(phi.op, Op::Phi);
        assert_eq!(phi.args.len(), 1);
        assert_eq!(phi.args[0], ValueId::new(1));
    }

    #[test]
    fn test_deadcode_idempotent() {
        let src = "function %t {\nb0: first -> b1 b2\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\nb1: exit (v0)\nb2: plain -> b1\n  v2 = const32.i32 [2]\n}";
        let mut f = parse_func(src).unwrap();
        deadcode(&mut f);
        let once = alloc::string::ToString::to_string(&f);
        deadcode(&mut f);
        let twice = alloc::string::ToString::to_string(&f);
        assert_eq!(once, twice);
    }
}
