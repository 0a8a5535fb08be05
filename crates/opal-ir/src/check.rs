//! The IR invariant checker.
//!
//! A violation here is a compiler bug, never a property of the input
//! program, so every failure aborts with a diagnostic naming the function,
//! block, and value plus a dump of the offending block.

use alloc::vec;

use crate::{
    dom::Dominators,
    func::Func,
    ids::{BlockId, EntityRef, ValueId},
    op::Op,
    types::Type,
};

/// Check every structural invariant of `f`. Panics on the first violation.
pub fn check_func(f: &Func) {
    let dom = Dominators::compute(f);

    // Value membership: each value's block really lists it, once.
    let mut seen = vec![false; f.num_values()];
    for b in f.blocks.keys() {
        for &v in &f.block(b).values {
            if f.value(v).block != b {
                fatal_value(f, b, v, "value listed in a block it does not name");
            }
            if seen[v.index()] {
                fatal_value(f, b, v, "value appears in two block lists");
            }
            seen[v.index()] = true;
        }
    }

    for b in f.blocks.keys() {
        // Unreachable blocks have been stripped of edges and values by
        // dead-code elimination; only their edge bookkeeping must stay
        // consistent.
        if dom.is_reachable(b) {
            check_block_shape(f, b);
        }
        check_edges(f, b);
    }

    // Schedule position per value, for same-block dominance checks.
    let mut pos = vec![0usize; f.num_values()];
    for b in f.blocks.keys() {
        for (i, &v) in f.block(b).values.iter().enumerate() {
            pos[v.index()] = i;
        }
    }

    for b in f.blocks.keys() {
        if !dom.is_reachable(b) {
            continue;
        }
        for &v in &f.block(b).values {
            check_value(f, &dom, &pos, b, v);
        }
    }

    check_mem_chain(f, &dom);
}

fn check_block_shape(f: &Func, b: BlockId) {
    let block = f.block(b);
    if block.controls.len() != block.kind.num_controls() {
        f.fatal(
            b,
            format_args!(
                "block kind {} wants {} controls, has {}",
                block.kind,
                block.kind.num_controls(),
                block.controls.len()
            ),
        );
    }
    if let Some(want) = block.kind.num_succs() {
        if block.succs.len() != want {
            f.fatal(
                b,
                format_args!(
                    "block kind {} wants {} successors, has {}",
                    block.kind,
                    want,
                    block.succs.len()
                ),
            );
        }
    }
    for &c in &block.controls {
        if f.value(c).op == Op::Invalid {
            f.fatal(b, format_args!("control {} is a dead value", c));
        }
    }
}

fn check_edges(f: &Func, b: BlockId) {
    let block = f.block(b);
    for (j, e) in block.succs.iter().enumerate() {
        let back = f.block(e.block).preds.get(e.index).copied();
        match back {
            Some(back) if back.block == b && back.index == j => {}
            _ => f.fatal(
                b,
                format_args!("successor edge {} -> {} lost its reciprocal", b, e.block),
            ),
        }
    }
    for (i, e) in block.preds.iter().enumerate() {
        let back = f.block(e.block).succs.get(e.index).copied();
        match back {
            Some(back) if back.block == b && back.index == i => {}
            _ => f.fatal(
                b,
                format_args!("predecessor edge {} <- {} lost its reciprocal", b, e.block),
            ),
        }
    }
}

fn check_value(f: &Func, dom: &Dominators, pos: &[usize], b: BlockId, v: ValueId) {
    let data = f.value(v);
    let info = data.op.info();
    if info.arg_len >= 0 && data.args.len() != info.arg_len as usize {
        fatal_value(f, b, v, "wrong number of arguments for op");
    }

    if data.op == Op::Phi {
        if data.args.len() != f.block(b).preds.len() {
            fatal_value(f, b, v, "phi arity does not match predecessor count");
        }
        // Each phi argument must be available at the end of its edge's
        // predecessor.
        for (i, &a) in data.args.iter().enumerate() {
            let p = f.block(b).preds[i].block;
            let ab = f.value(a).block;
            if f.value(a).op != Op::Invalid && !dom.dominates(ab, p) {
                fatal_value(f, b, v, "phi argument not available on its edge");
            }
        }
        return;
    }

    for &a in &data.args {
        let arg = f.value(a);
        if arg.op == Op::Invalid {
            fatal_value(f, b, v, "argument is a dead value");
        }
        let ab = arg.block;
        let ok = if ab == b {
            pos[a.index()] < pos[v.index()]
        } else {
            dom.dominates(ab, b)
        };
        if !ok {
            fatal_value(f, b, v, "argument does not dominate use");
        }
    }
}

/// Every reachable memory value must chain back to the entry's InitMem, and
/// no block may merge two distinct memories except through a phi.
fn check_mem_chain(f: &Func, dom: &Dominators) {
    for b in f.blocks.keys() {
        if !dom.is_reachable(b) {
            continue;
        }
        let mut mem_phis = 0;
        for &v in &f.block(b).values {
            let data = f.value(v);
            if data.ty != Type::MEM {
                continue;
            }
            match data.op {
                Op::InitMem => {
                    if b != f.entry {
                        fatal_value(f, b, v, "initmem outside the entry block");
                    }
                }
                Op::Phi => {
                    mem_phis += 1;
                    if mem_phis > 1 {
                        fatal_value(f, b, v, "two memory phis in one block");
                    }
                }
                _ => {
                    // A memory-producing op must consume exactly one memory.
                    let mems = data
                        .args
                        .iter()
                        .filter(|&&a| f.value(a).ty == Type::MEM)
                        .count();
                    if mems != 1 {
                        fatal_value(f, b, v, "memory op does not consume exactly one memory");
                    }
                }
            }
        }
    }
}

fn fatal_value(f: &Func, b: BlockId, v: ValueId, msg: &str) -> ! {
    f.fatal(b, format_args!("{}: {} = {}", msg, v, f.value(v)))
}

#[cfg(test)]
mod tests {
    use crate::{BlockKind, Func, Op, Type};

    fn exit_func() -> (Func, crate::BlockId) {
        let mut f = Func::new("t");
        let exit = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, exit);
        let mem = f.new_value(f.entry, Op::InitMem, Type::MEM, &[]);
        f.set_control(exit, mem);
        (f, exit)
    }

    #[test]
    fn test_valid_func_passes() {
        let (mut f, _) = exit_func();
        let a = f.new_value_i(f.entry, Op::Const32, Type::I32, 1, &[]);
        let b = f.new_value_i(f.entry, Op::Const32, Type::I32, 2, &[]);
        let _ = f.new_value(f.entry, Op::Add32, Type::I32, &[a, b]);
        crate::check_func(&f);
    }

    #[test]
    #[should_panic(expected = "wrong number of arguments")]
    fn test_bad_arity_panics() {
        let (mut f, _) = exit_func();
        let a = f.new_value_i(f.entry, Op::Const32, Type::I32, 1, &[]);
        let _ = f.new_value(f.entry, Op::Add32, Type::I32, &[a]);
        crate::check_func(&f);
    }

    #[test]
    #[should_panic(expected = "phi arity")]
    fn test_bad_phi_panics() {
        let mut f = Func::new("t");
        let l = f.add_block(BlockKind::Plain);
        let r = f.add_block(BlockKind::Plain);
        let join = f.add_block(BlockKind::Exit);
        f.block_mut(f.entry).kind = BlockKind::If;
        let mem = f.new_value(f.entry, Op::InitMem, Type::MEM, &[]);
        let c = f.new_value_i(f.entry, Op::ConstBool, Type::BOOL, 1, &[]);
        f.set_control(f.entry, c);
        f.add_edge(f.entry, l);
        f.add_edge(f.entry, r);
        f.add_edge(l, join);
        f.add_edge(r, join);
        let x = f.new_value_i(l, Op::Const32, Type::I32, 1, &[]);
        // One arg for a two-pred join.
        let _phi = f.new_value(join, Op::Phi, Type::I32, &[x]);
        f.set_control(join, mem);
        crate::check_func(&f);
    }

    #[test]
    #[should_panic(expected = "argument does not dominate")]
    fn test_use_before_def_panics() {
        let (mut f, _) = exit_func();
        // Build add first, then its operand, leaving the operand after the
        // use in schedule order.
        let a = f.new_value_i(f.entry, Op::Const32, Type::I32, 1, &[]);
        let add = f.new_value(f.entry, Op::Add32, Type::I32, &[a, a]);
        let late = f.new_value_i(f.entry, Op::Const32, Type::I32, 2, &[]);
        f.value_mut(add).args[1] = late;
        crate::check_func(&f);
    }
}
