//! Postorder traversal of the CFG.

use alloc::vec::Vec;

use crate::{
    func::Func,
    ids::{BlockId, EntityRef},
};

/// Compute a postorder over the blocks reachable from the entry.
///
/// Iterative DFS so deep CFGs do not overflow the stack. Successors are
/// visited in edge order, which makes the result deterministic.
pub fn postorder(f: &Func) -> Vec<BlockId> {
    #[derive(Clone, Copy)]
    struct Frame {
        block: BlockId,
        next_succ: usize,
    }

    let mut order = Vec::with_capacity(f.num_blocks());
    let mut visited = alloc::vec![false; f.num_blocks()];
    let mut stack = alloc::vec![Frame {
        block: f.entry,
        next_succ: 0,
    }];
    visited[f.entry.index()] = true;

    while let Some(frame) = stack.last_mut() {
        let b = frame.block;
        let succs = &f.block(b).succs;
        if frame.next_succ < succs.len() {
            let s = succs[frame.next_succ].block;
            frame.next_succ += 1;
            if !visited[s.index()] {
                visited[s.index()] = true;
                stack.push(Frame {
                    block: s,
                    next_succ: 0,
                });
            }
        } else {
            order.push(b);
            stack.pop();
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;

    #[test]
    fn test_postorder_diamond() {
        let mut f = Func::new("f");
        let t = f.add_block(BlockKind::Plain);
        let e = f.add_block(BlockKind::Plain);
        let join = f.add_block(BlockKind::Exit);
        f.block_mut(f.entry).kind = BlockKind::If;
        f.add_edge(f.entry, t);
        f.add_edge(f.entry, e);
        f.add_edge(t, join);
        f.add_edge(e, join);

        let po = postorder(&f);
        assert_eq!(po.len(), 4);
        // Entry is last in postorder; the join precedes both branches.
        assert_eq!(*po.last().unwrap(), f.entry);
        assert_eq!(po[0], join);
    }

    #[test]
    fn test_postorder_skips_unreachable() {
        let mut f = Func::new("f");
        let reachable = f.add_block(BlockKind::Exit);
        let _orphan = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, reachable);

        let po = postorder(&f);
        assert_eq!(po.len(), 2);
    }

    #[test]
    fn test_postorder_loop_terminates() {
        let mut f = Func::new("f");
        let head = f.add_block(BlockKind::If);
        let body = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, head);
        f.add_edge(head, body);
        f.add_edge(head, exit);
        f.add_edge(body, head);

        let po = postorder(&f);
        assert_eq!(po.len(), 4);
        assert_eq!(*po.last().unwrap(), f.entry);
    }
}
