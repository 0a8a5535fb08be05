//! Register allocation.
//!
//! A scan allocator with explicit spills. Values that live past their
//! defining block are stored to the stack right after definition
//! (`storereg`) and reloaded in front of every remote use (`loadreg`), so
//! each block starts from an empty register file and allocation is local.
//! Under in-block pressure the victim is the active value whose next use
//! is furthest away. Data phis become stack phis: every predecessor edge
//! stores into one coalesced slot (the stack allocator's job), and the
//! phi's own uses reload from it.
//!
//! Output: `home[v]` is a register for every register-resident value;
//! `storereg`s, stack phis, and `arg`s are left homeless for the stack
//! allocator.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{debug, BlockId, EntityRef, Func, Location, Op, Type, ValueId};

use crate::{
    liveness::compute_liveness,
    target::{RegClass, Target},
};

/// Run register allocation over `f` for `target`.
pub fn regalloc(f: &mut Func, target: &dyn Target) {
    let live = compute_liveness(f);

    // Values whose live range leaves their defining block.
    let mut cross_block = vec![false; f.num_values()];
    for set in live.live_in.iter().chain(live.live_out.iter()) {
        for &v in set {
            cross_block[v.index()] = true;
        }
    }

    // Values actually consumed outside their defining block by something
    // other than a phi. A value that only feeds a phi is stored once, on
    // the edge, into the phi's own slot; giving it a second spill of its
    // own would double the edge stores.
    let mut remote_use = vec![false; f.num_values()];
    for b in f.blocks.keys() {
        for &v in &f.block(b).values {
            if f.value(v).op == Op::Phi {
                continue;
            }
            for &a in &f.value(v).args {
                if f.value(a).block != b {
                    remote_use[a.index()] = true;
                }
            }
        }
        for &c in &f.block(b).controls {
            if f.value(c).block != b {
                remote_use[c.index()] = true;
            }
        }
    }

    let mut alloc = Allocator {
        target,
        spill_of: vec![None; f.num_values()],
        cross_block,
        remote_use,
    };

    alloc.place_sp(f);
    alloc.spill_cross_block_defs(f);
    alloc.lower_phis(f);

    let rpo = f.reverse_postorder();
    for b in rpo {
        alloc.scan_block(f, b);
    }
}

fn needs_register(f: &Func, v: ValueId) -> bool {
    if RegClass::of(f.value(v).ty) == RegClass::None {
        return false;
    }
    !matches!(
        f.value(v).op,
        Op::Phi | Op::Arg | Op::StoreReg | Op::Invalid | Op::Sp
    )
}

/// Whether a value's result lives on the stack rather than in a register.
fn stack_resident(f: &Func, v: ValueId) -> bool {
    match f.value(v).op {
        Op::StoreReg | Op::Arg => true,
        Op::Phi => f.value(v).ty != Type::MEM,
        _ => false,
    }
}

struct Allocator<'a> {
    target: &'a dyn Target,
    /// The storereg holding each spilled value, if one exists.
    spill_of: Vec<Option<ValueId>>,
    cross_block: Vec<bool>,
    remote_use: Vec<bool>,
}

impl<'a> Allocator<'a> {
    /// The stack pointer is not allocated; it lives in its reserved
    /// register for the whole function.
    fn place_sp(&mut self, f: &mut Func) {
        for v in f.values.keys().collect::<Vec<_>>() {
            if f.value(v).op == Op::Sp {
                f.set_home(v, Location::Reg(crate::frame::SP_REG));
            }
        }
    }

    /// Store every cross-block value with a remote consumer to the stack
    /// right after its definition. Phis and args are already
    /// stack-resident.
    fn spill_cross_block_defs(&mut self, f: &mut Func) {
        for b in f.blocks.keys().collect::<Vec<_>>() {
            let vals: Vec<ValueId> = f.block(b).values.clone();
            for v in vals {
                if !self.cross_block[v.index()]
                    || !self.remote_use[v.index()]
                    || !needs_register(f, v)
                {
                    continue;
                }
                if self.spill_of[v.index()].is_some() {
                    continue;
                }
                let ty = f.value(v).ty;
                let s = f.new_value(b, Op::StoreReg, ty, &[v]);
                move_before_index(f, b, s, index_of(f, b, v) + 1);
                self.spill_of[v.index()] = Some(s);
                debug!("regalloc: spill {} after def ({})", v, s);
            }
        }
    }

    /// Turn every data phi into a stack phi: each predecessor stores the
    /// incoming value into the (future) shared slot. Arguments become
    /// fresh `storereg`s used by nothing else, so slot coalescing never
    /// meets a spill that already has a slot of its own.
    fn lower_phis(&mut self, f: &mut Func) {
        for b in f.blocks.keys().collect::<Vec<_>>() {
            let phis: Vec<ValueId> = f
                .block(b)
                .values
                .iter()
                .copied()
                .filter(|&v| f.value(v).op == Op::Phi && f.value(v).ty != Type::MEM)
                .collect();
            for phi in phis {
                let nargs = f.value(phi).args.len();
                for i in 0..nargs {
                    let a = f.value(phi).args[i];
                    if a == phi {
                        // The slot already holds the value around the loop.
                        continue;
                    }
                    let p = f.block(b).preds[i].block;
                    let ty = f.value(a).ty;
                    let src = if !stack_resident(f, a) && f.value(a).block == p {
                        // Still in its register at the end of the edge's
                        // block: store it straight into the shared slot.
                        a
                    } else if stack_resident(f, a) {
                        let spill = self.spill_repr(f, a);
                        f.new_value(p, Op::LoadReg, ty, &[spill])
                    } else {
                        // Defined in a dominating block; reload from its
                        // spill (creating one if this phi is its only
                        // remote consumer).
                        let spill = self.ensure_spill_after_def(f, a);
                        f.new_value(p, Op::LoadReg, ty, &[spill])
                    };
                    let s = f.new_value(p, Op::StoreReg, ty, &[src]);
                    f.value_mut(phi).args[i] = s;
                }
            }
        }
    }

    fn spill_repr(&self, f: &Func, v: ValueId) -> ValueId {
        match f.value(v).op {
            Op::Arg | Op::Phi | Op::StoreReg => v,
            // An evicted reload rereads the slot it came from.
            Op::LoadReg => f.value(v).args[0],
            _ => match self.spill_of[v.index()] {
                Some(s) => s,
                None => {
                    let b = f.value(v).block;
                    f.fatal(b, format_args!("no spill for stack access of {}", v))
                }
            },
        }
    }

    fn ensure_spill_after_def(&mut self, f: &mut Func, v: ValueId) -> ValueId {
        if let Some(s) = self.spill_of[v.index()] {
            return s;
        }
        let b = f.value(v).block;
        let ty = f.value(v).ty;
        let s = f.new_value(b, Op::StoreReg, ty, &[v]);
        move_before_index(f, b, s, index_of(f, b, v) + 1);
        self.spill_of[v.index()] = Some(s);
        s
    }

    /// Allocate registers within one block.
    fn scan_block(&mut self, f: &mut Func, b: BlockId) {
        let original: Vec<ValueId> = f.block(b).values.clone();

        // Use positions per value, over original indices; the controls
        // count as a use at the very end.
        let mut uses: BTreeMap<ValueId, Vec<usize>> = BTreeMap::new();
        for (i, &v) in original.iter().enumerate() {
            if f.value(v).op == Op::Phi {
                continue;
            }
            for &a in &f.value(v).args {
                uses.entry(a).or_default().push(i);
            }
        }
        for &c in &f.block(b).controls {
            uses.entry(c).or_default().push(usize::MAX);
        }

        let mut file = RegFile::new(self.target);
        let mut out: Vec<ValueId> = Vec::with_capacity(original.len());

        for (i, &v) in original.iter().enumerate() {
            match f.value(v).op {
                Op::Phi | Op::Arg | Op::Invalid | Op::Sp => {
                    out.push(v);
                    continue;
                }
                Op::StoreReg => {
                    // Source must be register-resident here; it was
                    // defined immediately before this store.
                    let a = f.value(v).args[0];
                    if file.reg_of(a).is_none() {
                        self.reload_arg(f, b, v, 0, &mut file, &mut out, &uses, i);
                    }
                    out.push(v);
                    self.expire(&mut file, &uses, i);
                    continue;
                }
                _ => {}
            }

            // Bring stack-resident or evicted arguments back into
            // registers. A loadreg's argument is the slot itself; the
            // stack pointer lives in its reserved register.
            if f.value(v).op != Op::LoadReg {
                let nargs = f.value(v).args.len();
                for ai in 0..nargs {
                    let a = f.value(v).args[ai];
                    if RegClass::of(f.value(a).ty) == RegClass::None {
                        continue;
                    }
                    if f.value(a).op == Op::Sp {
                        continue;
                    }
                    if file.reg_of(a).is_none() {
                        self.reload_arg(f, b, v, ai, &mut file, &mut out, &uses, i);
                    }
                }
            }

            // Calls clobber every caller-saved register. Anything still
            // needed afterwards goes to its slot now.
            if f.value(v).op.is_call() {
                self.clobber_caller_saved(f, b, &mut file, &mut out, &uses, i);
            }

            if needs_register(f, v) {
                let class = RegClass::of(f.value(v).ty);
                let info = f.value(v).op.info();
                let reg = if info.result_in_arg0 {
                    self.alloc_two_address(f, b, v, class, &mut file, &mut out, &uses, i)
                } else {
                    let protect: Vec<ValueId> = f.value(v).args.clone();
                    self.alloc_reg(f, b, class, &protect, &mut file, &mut out, &uses, i)
                };
                file.set(class, reg, v);
                f.set_home(v, Location::Reg(reg));
            }

            out.push(v);
            self.expire(&mut file, &uses, i);
        }

        // Controls read at the terminator.
        let controls: Vec<ValueId> = f.block(b).controls.clone();
        for (ci, c) in controls.into_iter().enumerate() {
            if RegClass::of(f.value(c).ty) == RegClass::None {
                continue;
            }
            if file.reg_of(c).is_none() {
                let ty = f.value(c).ty;
                let spill = self.spill_repr(f, c);
                let l = f.new_value(b, Op::LoadReg, ty, &[spill]);
                let class = RegClass::of(ty);
                let reg = self.alloc_reg(
                    f,
                    b,
                    class,
                    &[],
                    &mut file,
                    &mut out,
                    &uses,
                    usize::MAX - 1,
                );
                file.set(class, reg, l);
                f.set_home(l, Location::Reg(reg));
                out.push(l);
                f.block_mut(b).controls[ci] = l;
            }
        }

        f.block_mut(b).values = out;
    }

    /// Load `v.args[ai]` from its slot into a fresh register, rewriting
    /// the argument.
    #[allow(clippy::too_many_arguments)]
    fn reload_arg(
        &mut self,
        f: &mut Func,
        b: BlockId,
        v: ValueId,
        ai: usize,
        file: &mut RegFile,
        out: &mut Vec<ValueId>,
        uses: &BTreeMap<ValueId, Vec<usize>>,
        i: usize,
    ) {
        let a = f.value(v).args[ai];
        let ty = f.value(a).ty;
        let spill = self.spill_repr(f, a);
        let l = f.new_value(b, Op::LoadReg, ty, &[spill]);
        let protect: Vec<ValueId> = f.value(v).args.clone();
        let class = RegClass::of(ty);
        let reg = self.alloc_reg(f, b, class, &protect, file, out, uses, i);
        file.set(class, reg, l);
        f.set_home(l, Location::Reg(reg));
        out.push(l);
        f.value_mut(v).args[ai] = l;
    }

    /// Pick a free register of `class`, evicting the active value with the
    /// furthest next use when the file is full.
    #[allow(clippy::too_many_arguments)]
    fn alloc_reg(
        &mut self,
        f: &mut Func,
        b: BlockId,
        class: RegClass,
        protect: &[ValueId],
        file: &mut RegFile,
        out: &mut Vec<ValueId>,
        uses: &BTreeMap<ValueId, Vec<usize>>,
        i: usize,
    ) -> u8 {
        if let Some(reg) = file.free_reg(class) {
            return reg;
        }

        // Furthest next use among unprotected occupants.
        let mut victim: Option<(usize, u8, ValueId)> = None;
        for (reg, occupant) in file.occupants(class) {
            if protect.contains(&occupant) {
                continue;
            }
            let next = next_use(uses, occupant, i);
            match victim {
                Some((best, _, _)) if next <= best => {}
                _ => victim = Some((next, reg, occupant)),
            }
        }
        let (_, reg, occupant) = match victim {
            Some(v) => v,
            None => f.fatal(b, format_args!("register file exhausted by one instruction")),
        };

        // Make the victim reloadable before giving its register away.
        if next_use(uses, occupant, i) != usize::MAX - 1
            && !stack_resident(f, occupant)
            && self.spill_of[occupant.index()].is_none()
            && f.value(occupant).op != Op::LoadReg
        {
            let ty = f.value(occupant).ty;
            let s = f.new_value(b, Op::StoreReg, ty, &[occupant]);
            out.push(s);
            self.spill_of[occupant.index()] = Some(s);
            debug!("regalloc: evict {} from r{}", occupant, reg);
        }
        file.clear(class, reg);
        reg
    }

    /// Two-address constraint: reuse arg0's register when arg0 dies here,
    /// otherwise copy arg0 first so the destination can clobber it.
    #[allow(clippy::too_many_arguments)]
    fn alloc_two_address(
        &mut self,
        f: &mut Func,
        b: BlockId,
        v: ValueId,
        class: RegClass,
        file: &mut RegFile,
        out: &mut Vec<ValueId>,
        uses: &BTreeMap<ValueId, Vec<usize>>,
        i: usize,
    ) -> u8 {
        let a0 = f.value(v).args[0];
        let a0_reg = match file.reg_of(a0) {
            Some(r) => r,
            None => {
                let protect: Vec<ValueId> = f.value(v).args.clone();
                return self.alloc_reg(f, b, class, &protect, file, out, uses, i);
            }
        };
        if next_use(uses, a0, i) == usize::MAX - 1 {
            // arg0 dies at this instruction; its register is the result.
            file.clear(class, a0_reg);
            return a0_reg;
        }
        let ty = f.value(a0).ty;
        let copy = f.new_value(b, Op::Copy, ty, &[a0]);
        let protect: Vec<ValueId> = f.value(v).args.clone();
        let reg = self.alloc_reg(f, b, class, &protect, file, out, uses, i);
        file.set(class, reg, copy);
        f.set_home(copy, Location::Reg(reg));
        out.push(copy);
        f.value_mut(v).args[0] = copy;
        file.clear(class, reg);
        reg
    }

    fn clobber_caller_saved(
        &mut self,
        f: &mut Func,
        b: BlockId,
        file: &mut RegFile,
        out: &mut Vec<ValueId>,
        uses: &BTreeMap<ValueId, Vec<usize>>,
        i: usize,
    ) {
        for (class, reg, occupant) in file.all_occupants() {
            if !self.target.is_caller_saved(reg) {
                continue;
            }
            if next_use(uses, occupant, i) != usize::MAX - 1 {
                if !stack_resident(f, occupant)
                    && self.spill_of[occupant.index()].is_none()
                    && f.value(occupant).op != Op::LoadReg
                {
                    let ty = f.value(occupant).ty;
                    let s = f.new_value(b, Op::StoreReg, ty, &[occupant]);
                    out.push(s);
                    self.spill_of[occupant.index()] = Some(s);
                }
            }
            file.clear(class, reg);
        }
    }

    /// Free registers whose occupants have no further use in this block.
    fn expire(&mut self, file: &mut RegFile, uses: &BTreeMap<ValueId, Vec<usize>>, i: usize) {
        let dead: Vec<(RegClass, u8)> = file
            .all_occupants()
            .into_iter()
            .filter(|&(_, _, occ)| next_use(uses, occ, i) == usize::MAX - 1)
            .map(|(class, reg, _)| (class, reg))
            .collect();
        for (class, reg) in dead {
            file.clear(class, reg);
        }
    }
}

/// Next original-index use of `v` strictly after `i`; `usize::MAX` is the
/// terminator, `usize::MAX - 1` means no further use.
fn next_use(uses: &BTreeMap<ValueId, Vec<usize>>, v: ValueId, i: usize) -> usize {
    match uses.get(&v) {
        Some(list) => {
            for &u in list {
                if u > i {
                    return if u == usize::MAX { usize::MAX } else { u };
                }
            }
            usize::MAX - 1
        }
        None => usize::MAX - 1,
    }
}

fn index_of(f: &Func, b: BlockId, v: ValueId) -> usize {
    match f.block(b).values.iter().position(|&x| x == v) {
        Some(i) => i,
        None => f.fatal(b, format_args!("{} not scheduled in its block", v)),
    }
}

/// Detach the last value of `b`'s list (just created) and reinsert it at
/// `index`.
fn move_before_index(f: &mut Func, b: BlockId, v: ValueId, index: usize) {
    let list = &mut f.block_mut(b).values;
    let popped = list.pop();
    debug_assert_eq!(popped, Some(v));
    list.insert(index, v);
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, BlockId, Func, Location, Op, ValueId};
    use opal_opt::Rules;

    use super::*;
    use crate::obj::CodeBuffer;
    use crate::target::Target;

    /// A target with a four-register integer file, so eviction is easy to
    /// provoke.
    struct TinyTarget;

    struct NoRules;

    impl Rules for NoRules {
        fn rewrite_value(&self, _f: &mut Func, _v: ValueId) -> bool {
            false
        }
    }

    static NO_RULES: NoRules = NoRules;

    impl Target for TinyTarget {
        fn name(&self) -> &'static str {
            "tiny"
        }

        fn ptr_size(&self) -> u32 {
            4
        }

        fn int_regs(&self) -> &'static [u8] {
            &[8, 9, 10, 11]
        }

        fn float_regs(&self) -> &'static [u8] {
            &[0, 2]
        }

        fn is_caller_saved(&self, _reg: u8) -> bool {
            true
        }

        fn lower_rules(&self) -> &dyn Rules {
            &NO_RULES
        }

        fn block_rules(&self) -> &dyn Rules {
            &NO_RULES
        }

        fn emit(
            &self,
            _f: &Func,
            _frame: &crate::frame::FrameLayout,
            _order: &[BlockId],
        ) -> CodeBuffer {
            CodeBuffer::new()
        }
    }

    fn count_op(f: &Func, op: Op) -> usize {
        f.blocks
            .values()
            .flat_map(|b| b.values.iter())
            .filter(|&&v| f.value(v).op == op)
            .count()
    }

    #[test]
    fn test_local_values_get_distinct_registers() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\n  v2 = mips_movwconst.i32 [2]\n  v3 = mips_add.i32 v1, v2\nb1: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        let r1 = f.home(ValueId::new(1));
        let r2 = f.home(ValueId::new(2));
        assert!(matches!(r1, Some(Location::Reg(_))));
        assert!(matches!(r2, Some(Location::Reg(_))));
        assert_ne!(r1, r2, "both operands live at the add");
        assert_eq!(count_op(&f, Op::StoreReg), 0, "no pressure, no spills");
    }

    #[test]
    fn test_cross_block_value_spills_and_reloads() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\nb1: plain -> b2\n  v2 = mips_add.i32 v1, v1\n  v3 = mips_sub.i32 v2, v1\nb2: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        // v1 crosses into b1: one spill after its def, reloads before use.
        assert_eq!(count_op(&f, Op::StoreReg), 1);
        assert!(count_op(&f, Op::LoadReg) >= 1);
        // Every loadreg names v1's spill.
        let spill = f
            .blocks
            .values()
            .flat_map(|b| b.values.iter())
            .copied()
            .find(|&v| f.value(v).op == Op::StoreReg)
            .unwrap();
        for b in f.blocks.keys() {
            for &v in &f.block(b).values {
                if f.value(v).op == Op::LoadReg {
                    assert_eq!(f.value(v).args[0], spill);
                }
            }
        }
    }

    #[test]
    fn test_pressure_forces_eviction() {
        // Nine simultaneously live values against a four-register file.
        let src = "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\n  v2 = mips_movwconst.i32 [2]\n  v3 = mips_movwconst.i32 [3]\n  v4 = mips_movwconst.i32 [4]\n  v5 = mips_movwconst.i32 [5]\n  v6 = mips_add.i32 v1, v2\n  v7 = mips_add.i32 v3, v4\n  v8 = mips_add.i32 v5, v6\n  v9 = mips_add.i32 v7, v8\n  v10 = mips_add.i32 v9, v1\nb1: exit (v0)\n}";
        let mut f = parse_func(src).unwrap();
        regalloc(&mut f, &TinyTarget);
        assert!(count_op(&f, Op::StoreReg) >= 1, "eviction must spill");
        // Everything that needs a register has one.
        for b in f.blocks.keys() {
            for &v in &f.block(b).values {
                if needs_register(&f, v) {
                    assert!(
                        matches!(f.home(v), Some(Location::Reg(_))),
                        "{} missing a register",
                        v
                    );
                }
            }
        }
    }

    #[test]
    fn test_data_phi_becomes_stack_phi() {
        let mut f = parse_func(
            "function %t {\nb0: ne (v6) -> b1 b2\n  v0 = initmem.mem\n  v6 = mips_movwconst.i32 [1]\nb1: plain -> b3\n  v1 = mips_movwconst.i32 [1]\nb2: plain -> b3\n  v2 = mips_movwconst.i32 [2]\nb3: exit (v0)\n  v3 = phi.i32 v1, v2\n  v4 = mips_add.i32 v3, v3\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        let phi = ValueId::new(3);
        assert!(f.home(phi).is_none(), "stack phi is homed by stackalloc");
        for &a in &f.value(phi).args {
            assert_eq!(f.value(a).op, Op::StoreReg, "one store per edge");
        }
        // The phi's own use reloads from the slot.
        let add = ValueId::new(4);
        for &a in &f.value(add).args {
            assert_eq!(f.value(a).op, Op::LoadReg);
        }
    }

    #[test]
    fn test_two_address_copy_when_arg_lives_on() {
        // cmovz needs dest = arg0; v1 is used again afterwards, so a copy
        // must protect it.
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\n  v2 = mips_movwconst.i32 [2]\n  v3 = mips_movwconst.i32 [3]\n  v4 = mips_cmovz.i32 v1, v2, v3\n  v5 = mips_add.i32 v4, v1\nb1: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        let cmovz = ValueId::new(4);
        let arg0 = f.value(cmovz).args[0];
        assert_eq!(f.value(arg0).op, Op::Copy, "arg0 copied before clobber");
        // Destination register equals the copy's register.
        assert_eq!(f.home(cmovz), f.home(arg0));
        // And the original v1 keeps its own register for the later use.
        assert_ne!(f.home(ValueId::new(1)), f.home(cmovz));
    }

    #[test]
    fn test_two_address_reuses_dying_arg() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\n  v2 = mips_movwconst.i32 [2]\n  v3 = mips_movwconst.i32 [3]\n  v4 = mips_cmovz.i32 v1, v2, v3\nb1: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        let cmovz = ValueId::new(4);
        assert_eq!(f.value(cmovz).args[0], ValueId::new(1), "no copy needed");
        assert_eq!(f.home(cmovz), f.home(ValueId::new(1)));
    }

    #[test]
    fn test_call_spills_live_caller_saved() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [7]\n  v2 = mips_callstatic.mem [0] {9} v0\n  v3 = mips_add.i32 v1, v1\nb1: exit (v2)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        // v1 lives across the call: stored before it, reloaded after.
        assert_eq!(count_op(&f, Op::StoreReg), 1);
        assert!(count_op(&f, Op::LoadReg) >= 1);
        let b0 = BlockId::new(0);
        let values = &f.block(b0).values;
        let pos = |op: Op| values.iter().position(|&v| f.value(v).op == op).unwrap();
        assert!(pos(Op::StoreReg) < pos(Op::MipsCallStatic));
        assert!(pos(Op::LoadReg) > pos(Op::MipsCallStatic));
    }

    #[test]
    fn test_sp_is_pinned() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = sp.ptr\n  v2 = mips_movwaddr.ptr {5} v1\nb1: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        assert_eq!(
            f.home(ValueId::new(1)),
            Some(Location::Reg(crate::frame::SP_REG))
        );
    }

    #[test]
    fn test_float_and_int_registers_do_not_collide() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_movwconst.i32 [1]\n  v2 = mips_movfconst.f32 [1065353216]\n  v3 = mips_add.i32 v1, v1\n  v4 = mips_addf.f32 v2, v2\nb1: exit (v0)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        // Both constants hold registers at once, in different classes.
        assert!(matches!(f.home(ValueId::new(1)), Some(Location::Reg(_))));
        assert!(matches!(f.home(ValueId::new(2)), Some(Location::Reg(_))));
    }

    #[test]
    fn test_type_is_mem_never_registered() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_callstatic.mem [0] {9} v0\nb1: exit (v1)\n}",
        )
        .unwrap();
        regalloc(&mut f, &TinyTarget);
        assert!(f.home(ValueId::new(0)).is_none());
        assert!(f.home(ValueId::new(1)).is_none());
    }
}

/// The per-block register file. Integer and float registers are separate
/// namespaces whose hardware numbers overlap, so occupancy is keyed by
/// (class, number).
struct RegFile {
    int_regs: &'static [u8],
    float_regs: &'static [u8],
    held: BTreeMap<(u8, u8), ValueId>,
}

fn class_index(class: RegClass) -> u8 {
    match class {
        RegClass::Int => 0,
        RegClass::Float => 1,
        RegClass::None => 2,
    }
}

impl RegFile {
    fn new(target: &dyn Target) -> Self {
        Self {
            int_regs: target.int_regs(),
            float_regs: target.float_regs(),
            held: BTreeMap::new(),
        }
    }

    fn pool(&self, class: RegClass) -> &'static [u8] {
        match class {
            RegClass::Int => self.int_regs,
            RegClass::Float => self.float_regs,
            RegClass::None => &[],
        }
    }

    fn free_reg(&self, class: RegClass) -> Option<u8> {
        let ci = class_index(class);
        self.pool(class)
            .iter()
            .copied()
            .find(|&r| !self.held.contains_key(&(ci, r)))
    }

    fn reg_of(&self, v: ValueId) -> Option<u8> {
        self.held
            .iter()
            .find(|(_, &occ)| occ == v)
            .map(|(&(_, r), _)| r)
    }

    fn occupants(&self, class: RegClass) -> Vec<(u8, ValueId)> {
        let ci = class_index(class);
        self.pool(class)
            .iter()
            .filter_map(|&r| self.held.get(&(ci, r)).map(|&v| (r, v)))
            .collect()
    }

    /// Every occupant as (class, reg, value).
    fn all_occupants(&self) -> Vec<(RegClass, u8, ValueId)> {
        self.held
            .iter()
            .map(|(&(ci, r), &v)| {
                let class = if ci == 0 { RegClass::Int } else { RegClass::Float };
                (class, r, v)
            })
            .collect()
    }

    fn set(&mut self, class: RegClass, reg: u8, v: ValueId) {
        self.held.insert((class_index(class), reg), v);
    }

    fn clear(&mut self, class: RegClass, reg: u8) {
        self.held.remove(&(class_index(class), reg));
    }
}
