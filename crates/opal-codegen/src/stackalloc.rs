//! Stack-slot allocation for values that did not get a register.
//!
//! Spilled values (`storereg`), stack phis, and pre-spilled incoming
//! arguments are colored over an interference graph restricted to
//! same-type values. A value carrying a source-variable name prefers that
//! variable's slot, so debug info and GC maps can name it; otherwise a
//! pool of previously allocated slots per type is scanned before a new
//! auto slot is requested from the front end.
//!
//! A stack phi and its arguments coalesce into one slot: each predecessor
//! stored into it, so they are one node as far as coloring goes. Phi
//! arguments are constructed fresh by the register allocator and never own
//! a slot beforehand.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{
    debug, Aux, EntityRef, Func, LocalSlot, Location, Op, SparseSet, Symbol, Type, TypeClass,
    ValueId,
};

use crate::liveness::live_spill_edges;

fn is_stack_phi(f: &Func, v: ValueId) -> bool {
    f.value(v).op == Op::Phi && f.value(v).ty != Type::MEM && f.home(v).is_none()
}

/// Pool key: slot-compatible types share a pool.
type TypeKey = (TypeClass, u8, u8);

fn type_key(ty: Type) -> TypeKey {
    (ty.class, ty.size, ty.align)
}

/// Allocate a stack slot for every spill-class value. `auto` hands out
/// fresh local slots (the frontend's `Auto`).
pub fn stackalloc(f: &mut Func, auto: &mut dyn FnMut(Type) -> Symbol) {
    let n = f.num_values();

    // Value types by id, for same-type interference filtering.
    let mut types: Vec<Type> = vec![Type::VOID; n];
    for b in f.blocks.keys() {
        for &v in &f.block(b).values {
            types[v.index()] = f.value(v).ty;
        }
    }

    // Interference among storeregs, stack phis, and args.
    let live = live_spill_edges(f);
    let mut interfere: Vec<Vec<ValueId>> = vec![Vec::new(); n];
    let mut s = SparseSet::new(n);
    for b in f.blocks.keys() {
        s.clear();
        for edge_live in &live[b.index()] {
            s.add_all(edge_live);
        }
        for &v in f.block(b).values.clone().iter().rev() {
            match f.value(v).op {
                Op::StoreReg => {
                    s.remove(v);
                    for &id in s.contents() {
                        if types[v.index()].equal_for_slot(types[id.index()]) {
                            interfere[v.index()].push(id);
                            interfere[id.index()].push(v);
                        }
                    }
                }
                Op::Phi if is_stack_phi(f, v) => {
                    s.remove(v);
                    for &id in s.contents() {
                        if types[v.index()].equal_for_slot(types[id.index()]) {
                            interfere[v.index()].push(id);
                            interfere[id.index()].push(v);
                        }
                    }
                }
                Op::LoadReg => {
                    s.add(f.value(v).args[0]);
                }
                Op::Arg => {
                    // Pre-spilled input: live from function entry, so it is
                    // never removed here. Leaving it in keeps anything else
                    // from reusing its slot before the first load.
                }
                _ => {}
            }
        }
    }

    // One name per value; later bindings win, matching the source-order
    // name list.
    let mut names: Vec<Option<LocalSlot>> = vec![None; n];
    for (slot, vals) in &f.names {
        for &v in vals {
            names[v.index()] = Some(*slot);
        }
    }

    // Phi arguments share their phi's slot; they are not colored alone.
    let mut phi_arg = vec![false; n];
    for b in f.blocks.keys() {
        for &v in &f.block(b).values {
            if !is_stack_phi(f, v) {
                continue;
            }
            for &a in &f.value(v).args {
                phi_arg[a.index()] = true;
            }
        }
    }

    // Incoming arguments go to the locations the calling convention
    // already fixed.
    for &v in f.block(f.entry).values.clone().iter() {
        if f.value(v).op != Op::Arg {
            continue;
        }
        let sym = match f.value(v).aux {
            Aux::Sym(sym) => sym,
            _ => f.fatal(f.entry, format_args!("arg {} without a symbol", v)),
        };
        let slot = LocalSlot {
            sym,
            ty: f.value(v).ty,
            off: f.value(v).aux_int,
        };
        f.set_home(v, Location::Slot(slot));
    }

    // Per-type pool of slots already allocated, and per-value index of the
    // pool slot used.
    let mut locations: BTreeMap<TypeKey, Vec<LocalSlot>> = BTreeMap::new();
    let mut slots: Vec<isize> = vec![-1; n];

    for b in f.blocks.keys().collect::<Vec<_>>() {
        for v in f.block(b).values.clone() {
            let stack_phi = is_stack_phi(f, v);
            if f.value(v).op != Op::StoreReg && !stack_phi {
                continue;
            }
            if phi_arg[v.index()] {
                continue;
            }
            let ty = types[v.index()];

            // Named value: prefer the variable's own slot.
            let name = if f.value(v).op == Op::StoreReg {
                names[f.value(v).args[0].index()]
            } else {
                names[v.index()]
            };
            if let Some(name) = name {
                if ty.equal_for_slot(name.ty) && !name_interferes(f, &interfere, v, stack_phi, name)
                {
                    f.set_home(v, Location::Slot(name));
                    if stack_phi {
                        for a in f.value(v).args.clone() {
                            f.set_home(a, Location::Slot(name));
                        }
                    }
                    continue;
                }
            }

            // Scan the pool for a slot none of our interferers uses.
            let locs = locations.entry(type_key(ty)).or_default();
            let mut used = vec![false; locs.len()];
            for &x in &interfere[v.index()] {
                let slot = slots[x.index()];
                if slot >= 0 {
                    used[slot as usize] = true;
                }
            }
            if stack_phi {
                // Anything an argument interferes with, the phi
                // effectively interferes with.
                for &a in &f.value(v).args {
                    for &x in &interfere[a.index()] {
                        let slot = slots[x.index()];
                        if slot >= 0 {
                            used[slot as usize] = true;
                        }
                    }
                }
            }
            let mut i = 0;
            while i < locs.len() {
                if !used[i] {
                    break;
                }
                i += 1;
            }
            if i == locs.len() {
                locs.push(LocalSlot {
                    sym: auto(ty),
                    ty,
                    off: 0,
                });
                debug!("stackalloc: new {} slot for {}", ty, v);
            }
            let loc = locs[i];

            f.set_home(v, Location::Slot(loc));
            slots[v.index()] = i as isize;
            if stack_phi {
                for a in f.value(v).args.clone() {
                    f.set_home(a, Location::Slot(loc));
                    slots[a.index()] = i as isize;
                }
            }
        }
    }
}

/// Whether giving `v` (and, for a stack phi, its args) the named slot
/// would clash with an interfering value already homed there. A variable
/// can interfere with itself; rare, but it happens.
fn name_interferes(
    f: &Func,
    interfere: &[Vec<ValueId>],
    v: ValueId,
    stack_phi: bool,
    name: LocalSlot,
) -> bool {
    for &x in &interfere[v.index()] {
        if f.home(x) == Some(Location::Slot(name)) {
            return true;
        }
    }
    if stack_phi {
        for &a in &f.value(v).args {
            for &x in &interfere[a.index()] {
                if f.home(x) == Some(Location::Slot(name)) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, BlockKind, Func, Op, Symbol, Type, ValueId};

    use super::*;

    fn auto_counter() -> impl FnMut(Type) -> Symbol {
        let mut next = 100u32;
        move |_ty: Type| {
            next += 1;
            Symbol(next)
        }
    }

    #[test]
    fn test_interfering_spills_get_distinct_slots() {
        // Two storeregs live at the same time must not share.
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\n  v3 = const32.i32 [2]\n  v4 = storereg.i32 v3\nb1: exit (v0)\n  v5 = loadreg.i32 v2\n  v6 = loadreg.i32 v4\n  v7 = add32.i32 v5, v6\n}",
        )
        .unwrap();
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        let h2 = f.home(ValueId::new(2)).expect("spill homed");
        let h4 = f.home(ValueId::new(4)).expect("spill homed");
        assert_ne!(h2, h4);
    }

    #[test]
    fn test_non_interfering_spills_share_slot() {
        // v2 dies before v4 is stored; the pool reuses the slot.
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\n  v3 = loadreg.i32 v2\n  v8 = add32.i32 v3, v3\n  v9 = storereg.i32 v8\nb1: exit (v0)\n  v5 = loadreg.i32 v9\n}",
        )
        .unwrap();
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        let h2 = f.home(ValueId::new(2)).expect("spill homed");
        let h9 = f.home(ValueId::new(9)).expect("spill homed");
        assert_eq!(h2, h9);
    }

    #[test]
    fn test_stack_phi_coalesces_with_args() {
        // A three-way stack phi: the phi and all three argument stores
        // share one slot.
        let mut f = parse_func(
            "function %t {\nb0: first -> b1 b2\n  v0 = initmem.mem\n  v10 = arg.bool {1}\nb1: plain -> b4\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\nb2: first -> b3 b4\n  v3 = const32.i32 [2]\n  v4 = storereg.i32 v3\nb3: plain -> b4\n  v5 = const32.i32 [3]\n  v6 = storereg.i32 v5\nb4: exit (v0)\n  v7 = phi.i32 v2, v4, v6\n  v8 = loadreg.i32 v7\n}",
        )
        .unwrap();
        // b4's preds must be b1, b2, b3 in that order; adjust: b2 is a
        // first block falling through to b3 and b4.
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        let hp = f.home(ValueId::new(7)).expect("phi homed");
        assert_eq!(f.home(ValueId::new(2)), Some(hp));
        assert_eq!(f.home(ValueId::new(4)), Some(hp));
        assert_eq!(f.home(ValueId::new(6)), Some(hp));
    }

    #[test]
    fn test_named_value_prefers_its_slot() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\nb1: exit (v0)\n  v3 = loadreg.i32 v2\n}",
        )
        .unwrap();
        let named = opal_ir::LocalSlot {
            sym: Symbol(77),
            ty: Type::I32,
            off: 0,
        };
        f.add_named_value(named, ValueId::new(1));
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        assert_eq!(
            f.home(ValueId::new(2)),
            Some(opal_ir::Location::Slot(named))
        );
    }

    #[test]
    fn test_different_types_never_share() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\n  v3 = loadreg.i32 v2\n  v8 = add32.i32 v3, v3\n  v4 = constbool.bool [1]\n  v5 = storereg.bool v4\nb1: exit (v0)\n  v6 = loadreg.bool v5\n}",
        )
        .unwrap();
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        let h2 = f.home(ValueId::new(2)).expect("spill homed");
        let h5 = f.home(ValueId::new(5)).expect("spill homed");
        assert_ne!(h2, h5);
    }

    #[test]
    fn test_arg_pinned_to_abi_slot() {
        let mut f = Func::new("t");
        let exit = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, exit);
        let mem = f.new_value(f.entry, Op::InitMem, Type::MEM, &[]);
        let arg = f.new_value_a(
            f.entry,
            Op::Arg,
            Type::I32,
            opal_ir::Aux::Sym(Symbol(5)),
            &[],
        );
        f.value_mut(arg).aux_int = 8;
        f.set_control(exit, mem);
        let mut auto = auto_counter();
        stackalloc(&mut f, &mut auto);

        match f.home(arg) {
            Some(opal_ir::Location::Slot(slot)) => {
                assert_eq!(slot.sym, Symbol(5));
                assert_eq!(slot.off, 8);
            }
            other => panic!("arg homed at {:?}", other),
        }
    }
}
