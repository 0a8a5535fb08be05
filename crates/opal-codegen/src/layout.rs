//! Block layout order for emission.
//!
//! Reverse postorder with a fallthrough preference: after a block, its
//! not-taken successor is placed next when still unplaced, so the branch
//! to it disappears. Unreachable blocks are not in the order at all.

use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{BlockId, EntityRef, Func};

pub fn layout_order(f: &Func) -> Vec<BlockId> {
    let rpo = f.reverse_postorder();
    let mut placed = vec![false; f.num_blocks()];
    let mut order = Vec::with_capacity(rpo.len());

    let mut cur = Some(f.entry);
    while let Some(b) = cur {
        order.push(b);
        placed[b.index()] = true;

        // The fallthrough edge is the last successor (conditional kinds
        // branch to the first). Prefer it; otherwise take any unplaced
        // successor; otherwise the first unplaced block in RPO.
        cur = f
            .block(b)
            .succs
            .iter()
            .rev()
            .map(|e| e.block)
            .find(|&s| !placed[s.index()])
            .or_else(|| rpo.iter().copied().find(|&s| !placed[s.index()]));
    }
    order
}

#[cfg(test)]
mod tests {
    use opal_ir::parse_func;

    use super::*;

    #[test]
    fn test_fallthrough_preferred() {
        let f = parse_func(
            "function %t {\nb0: ne (v1) -> b2 b1\n  v0 = initmem.mem\n  v1 = arg.i32\nb1: plain -> b3\nb2: plain -> b3\nb3: exit (v0)\n}",
        )
        .unwrap();
        let order = layout_order(&f);
        // b1 is the fallthrough of b0 and comes right after it.
        assert_eq!(order[0], opal_ir::BlockId::new(0));
        assert_eq!(order[1], opal_ir::BlockId::new(1));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_unreachable_skipped() {
        let f = parse_func(
            "function %t {\nb0: plain -> b1\n  v0 = initmem.mem\nb1: exit (v0)\nb2: plain -> b1\n  v1 = const32.i32 [1]\n}",
        )
        .unwrap();
        let order = layout_order(&f);
        assert_eq!(order.len(), 2);
        assert!(!order.contains(&opal_ir::BlockId::new(2)));
    }
}
