//! Value scheduling.
//!
//! Rewrite rules append helper values to the end of their block, which can
//! leave a value after its consumer in the block's list. This pass
//! restores a topological order per block: every non-phi value comes after
//! its same-block arguments. The sort is stable with respect to the
//! incoming order, so already-scheduled code is untouched and the result
//! is deterministic.

use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{EntityRef, Func, Op, ValueId};

pub fn schedule(f: &mut Func) {
    for b in f.blocks.keys().collect::<Vec<_>>() {
        let values: Vec<ValueId> = f.block(b).values.clone();
        if values.len() < 2 {
            continue;
        }

        // In-block position, or none for values living elsewhere.
        let mut local = vec![false; f.num_values()];
        for &v in &values {
            local[v.index()] = true;
        }

        let mut placed = vec![false; f.num_values()];
        let mut out: Vec<ValueId> = Vec::with_capacity(values.len());

        // Phis conceptually execute on entry; they go first, in order.
        for &v in &values {
            if f.value(v).op == Op::Phi {
                out.push(v);
                placed[v.index()] = true;
            }
        }

        let mut remaining: Vec<ValueId> = values
            .iter()
            .copied()
            .filter(|&v| f.value(v).op != Op::Phi)
            .collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut next_round: Vec<ValueId> = Vec::new();
            for &v in &remaining {
                let ready = f.value(v).args.iter().all(|&a| {
                    !local[a.index()] || placed[a.index()] || a == v
                });
                if ready {
                    out.push(v);
                    placed[v.index()] = true;
                    progressed = true;
                } else {
                    next_round.push(v);
                }
            }
            if !progressed {
                f.fatal(b, format_args!("dependency cycle among block values"));
            }
            remaining = next_round;
        }

        f.block_mut(b).values = out;
    }
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, ValueId};

    use super::*;

    #[test]
    fn test_out_of_order_arg_moves_up() {
        // v3 uses v2, but v2 is listed after it.
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = arg.i32\n  v3 = add32.i32 v1, v2\n  v2 = const32.i32 [5]\nb1: exit (v0)\n}",
        )
        .unwrap();
        schedule(&mut f);
        let order = &f.block(opal_ir::BlockId::new(0)).values;
        let pos = |v: u32| order.iter().position(|&x| x == ValueId::new(v)).unwrap();
        assert!(pos(2) < pos(3));
        opal_ir::check_func(&f);
    }

    #[test]
    fn test_stable_when_already_ordered() {
        let src = "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = const32.i32 [2]\n  v3 = add32.i32 v1, v2\nb1: exit (v0)\n}";
        let mut f = parse_func(src).unwrap();
        let before = f.block(opal_ir::BlockId::new(0)).values.clone();
        schedule(&mut f);
        assert_eq!(before, f.block(opal_ir::BlockId::new(0)).values);
    }

    #[test]
    fn test_phis_stay_first() {
        let mut f = parse_func(
            "function %t {\nb0: first -> b1 b2\n  v0 = initmem.mem\nb1: plain -> b3\n  v1 = const32.i32 [1]\nb2: plain -> b3\n  v2 = const32.i32 [2]\nb3: exit (v0)\n  v4 = add32.i32 v3, v3\n  v3 = phi.i32 v1, v2\n}",
        )
        .unwrap();
        schedule(&mut f);
        let order = &f.block(opal_ir::BlockId::new(3)).values;
        assert_eq!(order[0], ValueId::new(3));
        assert_eq!(order[1], ValueId::new(4));
    }
}
