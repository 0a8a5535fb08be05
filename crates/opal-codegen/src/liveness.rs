//! Backward liveness over register-class values, and the spill-edge
//! variant the stack allocator consumes.
//!
//! Phi inputs are attributed to the edge they flow in on: a phi's i-th
//! argument is live at the end of the i-th predecessor, never inside the
//! phi's own block.

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{EntityRef, Func, Op, SparseSet, Type, ValueId};

use crate::target::RegClass;

/// Per-block live sets.
#[derive(Debug)]
pub struct Liveness {
    pub live_in: Vec<BTreeSet<ValueId>>,
    pub live_out: Vec<BTreeSet<ValueId>>,
}

fn tracked(f: &Func, v: ValueId) -> bool {
    RegClass::of(f.value(v).ty) != RegClass::None
}

/// Compute live-in/live-out of every block for values that occupy
/// registers. Iterates in postorder until no set grows.
pub fn compute_liveness(f: &Func) -> Liveness {
    let n = f.num_blocks();
    let mut live_in: Vec<BTreeSet<ValueId>> = vec![BTreeSet::new(); n];
    let mut live_out: Vec<BTreeSet<ValueId>> = vec![BTreeSet::new(); n];
    let po = f.postorder();

    loop {
        let mut changed = false;
        for &b in &po {
            // live-out from successors' live-in, minus their phi defs,
            // plus our phi inputs on each edge.
            let mut out: BTreeSet<ValueId> = BTreeSet::new();
            for e in &f.block(b).succs {
                let s = e.block;
                for &v in &live_in[s.index()] {
                    out.insert(v);
                }
                for &sv in &f.block(s).values {
                    let data = f.value(sv);
                    if data.op != Op::Phi {
                        continue;
                    }
                    out.remove(&sv);
                    let a = data.args[e.index];
                    if tracked(f, a) {
                        out.insert(a);
                    }
                }
            }

            // Backward within the block.
            let mut s = out.clone();
            for &v in f.block(b).values.iter().rev() {
                let data = f.value(v);
                s.remove(&v);
                if data.op == Op::Phi {
                    continue;
                }
                for &a in &data.args {
                    if tracked(f, a) {
                        s.insert(a);
                    }
                }
            }
            for &c in &f.block(b).controls {
                if tracked(f, c) {
                    s.insert(c);
                }
            }

            if out != live_out[b.index()] {
                live_out[b.index()] = out;
                changed = true;
            }
            if s != live_in[b.index()] {
                live_in[b.index()] = s;
                changed = true;
            }
        }
        if !changed {
            return Liveness { live_in, live_out };
        }
    }
}

fn is_spill(f: &Func, v: ValueId) -> bool {
    match f.value(v).op {
        Op::StoreReg | Op::Arg => true,
        Op::Phi => f.value(v).ty != Type::MEM && f.home(v).is_none(),
        _ => false,
    }
}

/// Spill liveness per (block, successor index): the set of stack-resident
/// values (`storereg`, stack phis, `arg`s) live on each outgoing edge.
///
/// `loadreg` reads its spill argument; `storereg` and stack phis kill
/// theirs; phi inputs land on the source edge.
pub fn live_spill_edges(f: &Func) -> Vec<Vec<Vec<ValueId>>> {
    let mut live: Vec<Vec<Vec<ValueId>>> = f
        .blocks
        .values()
        .map(|b| vec![Vec::new(); b.succs.len()])
        .collect();

    let mut s = SparseSet::new(f.num_values());
    let mut t = SparseSet::new(f.num_values());
    let po = f.postorder();

    loop {
        let mut changed = false;
        for &b in &po {
            // Known live at the end of the block.
            s.clear();
            for edge_live in &live[b.index()] {
                s.add_all(edge_live);
            }

            // Propagate backwards; collect stack phis on the way.
            let mut phis: Vec<ValueId> = Vec::new();
            for &v in f.block(b).values.iter().rev() {
                match f.value(v).op {
                    Op::StoreReg => s.remove(v),
                    Op::LoadReg => s.add(f.value(v).args[0]),
                    Op::Phi if is_spill(f, v) => {
                        s.remove(v);
                        phis.push(v);
                    }
                    _ => {}
                }
            }

            // Expand each predecessor's live-on-edge set.
            for (i, e) in f.block(b).preds.iter().enumerate() {
                let p = e.block;
                let j = e.index;
                t.clear();
                t.add_all(&live[p.index()][j]);
                t.add_all(s.contents());
                for &phi in &phis {
                    let a = f.value(phi).args[i];
                    if is_spill(f, a) {
                        t.add(a);
                    }
                }
                if t.len() != live[p.index()][j].len() {
                    live[p.index()][j].clear();
                    live[p.index()][j].extend_from_slice(t.contents());
                    live[p.index()][j].sort();
                    changed = true;
                }
            }
        }
        if !changed {
            return live;
        }
    }
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, ValueId};

    use super::*;

    #[test]
    fn test_straightline_liveness() {
        let f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\nb1: exit (v0)\n  v2 = add32.i32 v1, v1\n}",
        )
        .unwrap();
        // v2 is dead but v1 is used in b1, so v1 is live across the edge.
        let live = compute_liveness(&f);
        assert!(live.live_out[0].contains(&ValueId::new(1)));
        assert!(live.live_in[1].contains(&ValueId::new(1)));
        assert!(!live.live_in[0].contains(&ValueId::new(1)));
    }

    #[test]
    fn test_phi_input_on_source_edge() {
        let f = parse_func(
            "function %t {\nb0: if (v3) -> b1 b2\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = const32.i32 [2]\n  v3 = arg.bool\nb1: plain -> b3\nb2: plain -> b3\nb3: exit (v0)\n  v4 = phi.i32 v1, v2\n  v5 = add32.i32 v4, v4\n}",
        )
        .unwrap();
        let live = compute_liveness(&f);
        // v1 flows in on the b1 edge only; v2 on the b2 edge only.
        assert!(live.live_out[1].contains(&ValueId::new(1)));
        assert!(!live.live_out[1].contains(&ValueId::new(2)));
        assert!(live.live_out[2].contains(&ValueId::new(2)));
        assert!(!live.live_out[2].contains(&ValueId::new(1)));
        // The phi itself is not live into b3's predecessors.
        assert!(!live.live_out[0].contains(&ValueId::new(4)));
    }

    #[test]
    fn test_spill_edges_attribute_phi_inputs() {
        // Stack phi inputs are live on their own edge only.
        let f = parse_func(
            "function %t {\nb0: first -> b1 b2\n  v0 = initmem.mem\nb1: plain -> b3\n  v1 = mips_movwconst.i32 [1]\n  v2 = storereg.i32 v1\nb2: plain -> b3\n  v3 = mips_movwconst.i32 [2]\n  v4 = storereg.i32 v3\nb3: exit (v0)\n  v5 = phi.i32 v2, v4\n  v6 = loadreg.i32 v5\n}",
        )
        .unwrap();
        let live = live_spill_edges(&f);
        // Edge b1 -> b3 carries v2; edge b2 -> b3 carries v4; neither
        // carries the other's store.
        assert!(live[1][0].contains(&ValueId::new(2)));
        assert!(!live[1][0].contains(&ValueId::new(4)));
        assert!(live[2][0].contains(&ValueId::new(4)));
        assert!(!live[2][0].contains(&ValueId::new(2)));
    }

    #[test]
    fn test_loop_carried_value_live_around() {
        let f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [0]\n  v6 = const32.i32 [10]\nb1: if (v3) -> b2 b3\n  v2 = phi.i32 v1, v4\n  v3 = less32.bool v2, v6\nb2: plain -> b1\n  v5 = const32.i32 [1]\n  v4 = add32.i32 v2, v5\nb3: exit (v0)\n}",
        )
        .unwrap();
        let live = compute_liveness(&f);
        // v6 is used in the loop header every iteration.
        assert!(live.live_in[1].contains(&ValueId::new(6)));
        assert!(live.live_out[2].contains(&ValueId::new(6)));
        // v2 is live into the body.
        assert!(live.live_in[2].contains(&ValueId::new(2)));
    }
}
