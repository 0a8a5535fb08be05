//! Frame layout: final byte offsets for every stack slot.
//!
//! The frame, from the stack pointer up:
//!
//! ```text
//! sp+frame_size  ┬ incoming arguments (caller's frame)
//!                │ saved return address (if the function calls)
//!                │ local slots (spills, addressed locals)
//! sp+0           ┴ outgoing call arguments
//! ```

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use opal_ir::{Func, Location, Op, Symbol};

/// MIPS32 $sp.
pub const SP_REG: u8 = 29;
/// MIPS32 $ra.
pub const RA_REG: u8 = 31;

/// Finalized frame offsets.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    pub frame_size: u32,
    pub has_calls: bool,
    /// Offset of each local symbol from sp.
    locals: BTreeMap<Symbol, u32>,
    /// Symbols of incoming arguments; their slot offset is relative to the
    /// caller's outgoing area, i.e. `sp + frame_size + off`.
    incoming: BTreeSet<Symbol>,
}

impl FrameLayout {
    /// Compute the layout after stack allocation has homed every slot.
    pub fn compute(f: &Func) -> FrameLayout {
        let mut has_calls = false;
        let mut outgoing_max: u32 = 0;
        let mut incoming = BTreeSet::new();

        for b in f.blocks.keys() {
            for &v in &f.block(b).values {
                let data = f.value(v);
                if data.op.is_call() {
                    has_calls = true;
                    // aux_int is the byte size of the outgoing argument
                    // area this call uses, plus one word for a result.
                    let used = data.aux_int as u32 + 4;
                    if used > outgoing_max {
                        outgoing_max = used;
                    }
                }
                if data.op == Op::Arg {
                    if let opal_ir::Aux::Sym(sym) = data.aux {
                        incoming.insert(sym);
                    }
                }
            }
        }

        // Collect every local symbol homed on the stack, with the widest
        // type seen for it. Deterministic: keyed map, id-order scan.
        let mut sizes: BTreeMap<Symbol, (u32, u32)> = BTreeMap::new();
        for v in f.values.keys() {
            if let Some(Location::Slot(slot)) = f.home(v) {
                if incoming.contains(&slot.sym) {
                    continue;
                }
                let entry = sizes.entry(slot.sym).or_insert((0, 1));
                let size = slot.ty.size as u32 + slot.off as u32;
                let align = slot.ty.align as u32;
                if size > entry.0 {
                    entry.0 = size;
                }
                if align > entry.1 {
                    entry.1 = align;
                }
            }
        }

        // Addressed locals reach the frame through movwaddr, not through a
        // homed value; the op carries the object size in aux_int.
        for b in f.blocks.keys() {
            for &v in &f.block(b).values {
                let data = f.value(v);
                if data.op != Op::MipsMovwAddr {
                    continue;
                }
                if let opal_ir::Aux::Sym(sym) = data.aux {
                    let entry = sizes.entry(sym).or_insert((0, 1));
                    let size = (data.aux_int as u32).max(4);
                    if size > entry.0 {
                        entry.0 = size;
                    }
                    if entry.1 < 4 {
                        entry.1 = 4;
                    }
                }
            }
        }

        let mut offset = align_to(outgoing_max, 4);
        let mut locals = BTreeMap::new();
        for (&sym, &(size, align)) in &sizes {
            offset = align_to(offset, align);
            locals.insert(sym, offset);
            offset += size;
        }

        if has_calls {
            offset = align_to(offset, 4) + 4;
        }
        let frame_size = align_to(offset, 8);

        FrameLayout {
            frame_size,
            has_calls,
            locals,
            incoming,
        }
    }

    /// Byte offset of a slot from sp.
    pub fn slot_offset(&self, f: &Func, slot: opal_ir::LocalSlot) -> i64 {
        if self.incoming.contains(&slot.sym) {
            return self.frame_size as i64 + slot.off;
        }
        match self.locals.get(&slot.sym) {
            Some(&base) => base as i64 + slot.off,
            None => {
                let entry = f.entry;
                f.fatal(entry, format_args!("slot {} has no frame offset", slot))
            }
        }
    }

    /// Byte offset of an addressed local's storage from sp.
    pub fn sym_offset(&self, f: &Func, sym: Symbol) -> i64 {
        match self.locals.get(&sym) {
            Some(&base) => base as i64,
            None => {
                let entry = f.entry;
                f.fatal(entry, format_args!("symbol {} has no frame offset", sym))
            }
        }
    }

    /// Offset of the saved return address, when the function calls.
    pub fn ra_offset(&self) -> i64 {
        debug_assert!(self.has_calls);
        self.frame_size as i64 - 4
    }

    /// Frame offsets of pointer-typed slots, for GC safepoint maps.
    pub fn pointer_slots(&self, f: &Func) -> Vec<i64> {
        let mut offs = BTreeSet::new();
        for v in f.values.keys() {
            if let Some(Location::Slot(slot)) = f.home(v) {
                if slot.ty.is_ptr() && !self.incoming.contains(&slot.sym) {
                    offs.insert(self.slot_offset(f, slot));
                }
            }
        }
        offs.into_iter().collect()
    }
}

fn align_to(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use opal_ir::{parse_func, Location, Symbol, Type, ValueId};

    use super::*;

    #[test]
    fn test_two_slots_two_offsets() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = const32.i32 [1]\n  v2 = storereg.i32 v1\n  v3 = const32.i32 [2]\n  v4 = storereg.i32 v3\nb1: exit (v0)\n  v5 = loadreg.i32 v2\n  v6 = loadreg.i32 v4\n  v7 = add32.i32 v5, v6\n}",
        )
        .unwrap();
        let slot_a = opal_ir::LocalSlot {
            sym: Symbol(1),
            ty: Type::I32,
            off: 0,
        };
        let slot_b = opal_ir::LocalSlot {
            sym: Symbol(2),
            ty: Type::I32,
            off: 0,
        };
        f.set_home(ValueId::new(2), Location::Slot(slot_a));
        f.set_home(ValueId::new(4), Location::Slot(slot_b));

        let frame = FrameLayout::compute(&f);
        // Two distinct i32 slots: 8 bytes of locals, 8-byte aligned frame.
        assert_eq!(frame.frame_size, 8);
        assert_ne!(
            frame.slot_offset(&f, slot_a),
            frame.slot_offset(&f, slot_b)
        );
    }

    #[test]
    fn test_call_reserves_ra_and_outgoing() {
        let f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = mips_callstatic.mem [8] {3} v0\nb1: exit (v1)\n}",
        )
        .unwrap();
        let frame = FrameLayout::compute(&f);
        assert!(frame.has_calls);
        // 8 bytes of args + 4 result + ra word, rounded to 8.
        assert!(frame.frame_size >= 16);
        assert_eq!(frame.ra_offset(), frame.frame_size as i64 - 4);
    }

    #[test]
    fn test_incoming_arg_above_frame() {
        let mut f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\n  v1 = arg.i32 {9}\nb1: exit (v0)\n  v2 = loadreg.i32 v1\n}",
        )
        .unwrap();
        let slot = opal_ir::LocalSlot {
            sym: Symbol(9),
            ty: Type::I32,
            off: 4,
        };
        f.set_home(ValueId::new(1), Location::Slot(slot));
        let frame = FrameLayout::compute(&f);
        assert_eq!(
            frame.slot_offset(&f, slot),
            frame.frame_size as i64 + 4
        );
    }
}
