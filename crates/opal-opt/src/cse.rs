//! Common-subexpression elimination.
//!
//! Values are partitioned by (op, type, aux, aux_int, argument classes)
//! and the partition refined to a fixed point; each class then elects the
//! representative that dominates its other members, and every use is
//! rewritten to it. Ops with side effects, calls, phis, and anything
//! touching memory are ineligible.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use opal_ir::{Aux, Dominators, EntityRef, Func, Op, Type, ValueId};

fn eligible(f: &Func, v: ValueId) -> bool {
    let data = f.value(v);
    let info = data.op.info();
    if info.effect || info.call || info.arg_len < 0 {
        return false;
    }
    if matches!(
        data.op,
        Op::Invalid | Op::Copy | Op::FwdRef | Op::Phi | Op::StoreReg | Op::LoadReg
    ) {
        return false;
    }
    if data.ty == Type::MEM {
        return false;
    }
    // A memory argument pins the value to its place in the chain.
    if data.args.iter().any(|&a| f.value(a).ty == Type::MEM) {
        return false;
    }
    true
}

/// Partition key. Argument entries are the current class representatives,
/// sorted for commutative ops so both orders land together.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    op: Op,
    ty: Type,
    aux: Aux,
    aux_int: i64,
    args: Vec<ValueId>,
}

fn key_of(f: &Func, rep: &[ValueId], v: ValueId) -> Key {
    let data = f.value(v);
    let mut args: Vec<ValueId> = data.args.iter().map(|&a| rep[a.index()]).collect();
    if data.op.is_commutative() {
        args.sort();
    }
    Key {
        op: data.op,
        ty: data.ty,
        aux: data.aux,
        aux_int: data.aux_int,
        args,
    }
}

/// Run CSE over the whole function.
pub fn cse(f: &mut Func) {
    let dom = Dominators::compute(f);

    // Schedule position per value, for same-block representative election.
    let mut pos: Vec<usize> = alloc::vec![0; f.num_values()];
    for b in f.blocks.keys() {
        for (i, &v) in f.block(b).values.iter().enumerate() {
            pos[v.index()] = i;
        }
    }

    // rep[v] is the elected representative of v's current class.
    let mut rep: Vec<ValueId> = f.values.keys().collect();

    let candidates: Vec<ValueId> = f
        .values
        .keys()
        .filter(|&v| eligible(f, v) && dom.is_reachable(f.value(v).block))
        .collect();

    // Refine until no class changes. Each round regroups candidates by key
    // computed over the previous round's representatives.
    loop {
        let mut changed = false;
        let mut groups: BTreeMap<Key, Vec<ValueId>> = BTreeMap::new();
        for &v in &candidates {
            groups.entry(key_of(f, &rep, v)).or_default().push(v);
        }
        for members in groups.values() {
            for &v in members {
                // The representative is the dominating member; within one
                // block, the one scheduled earliest.
                let mut best = v;
                for &u in members {
                    if u == v {
                        continue;
                    }
                    let ub = f.value(u).block;
                    let vb = f.value(v).block;
                    let earlier_here = ub == vb && pos[u.index()] < pos[v.index()];
                    let strictly_above = ub != vb && dom.dominates(ub, vb);
                    if (earlier_here || strictly_above) && u < best {
                        best = u;
                    }
                }
                if rep[v.index()] != best {
                    rep[v.index()] = best;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // Rewrite uses to representatives.
    for v in f.values.keys().collect::<Vec<_>>() {
        if f.value(v).op == Op::Invalid {
            continue;
        }
        for i in 0..f.value(v).args.len() {
            let a = f.value(v).args[i];
            let r = rep[a.index()];
            if r != a {
                f.value_mut(v).args[i] = r;
            }
        }
    }
    for b in f.blocks.keys().collect::<Vec<_>>() {
        for i in 0..f.block(b).controls.len() {
            let c = f.block(b).controls[i];
            let r = rep[c.index()];
            if r != c {
                f.block_mut(b).controls[i] = r;
            }
        }
    }
}
