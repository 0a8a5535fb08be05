//! Dominator computation using the simple iterative RPO algorithm.

use alloc::vec;
use alloc::vec::Vec;

use crate::{
    func::Func,
    ids::{BlockId, EntityRef},
};

/// Dominator tree for a function.
#[derive(Debug, Clone)]
pub struct Dominators {
    /// Immediate dominator per block. `None` for the entry and for
    /// unreachable blocks.
    idom: Vec<Option<BlockId>>,
    /// 1-based reverse-postorder number per block; 0 marks unreachable.
    rpo_num: Vec<u32>,
    entry: BlockId,
}

impl Dominators {
    pub fn compute(f: &Func) -> Self {
        let n = f.num_blocks();
        let rpo = f.reverse_postorder();

        let mut rpo_num = vec![0u32; n];
        for (i, &b) in rpo.iter().enumerate() {
            rpo_num[b.index()] = (i + 1) as u32;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        let mut changed = true;
        while changed {
            changed = false;
            for &b in &rpo {
                if b == f.entry {
                    continue;
                }
                let mut new_idom: Option<BlockId> = None;
                for e in &f.block(b).preds {
                    let p = e.block;
                    if rpo_num[p.index()] == 0 {
                        continue;
                    }
                    // Only predecessors with a computed idom (or the entry)
                    // participate in the intersection.
                    if p != f.entry && idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(cur, p, &idom, &rpo_num, f.entry),
                    });
                }
                if new_idom != idom[b.index()] {
                    idom[b.index()] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            idom,
            rpo_num,
            entry: f.entry,
        }
    }

    pub fn immediate_dominator(&self, b: BlockId) -> Option<BlockId> {
        self.idom[b.index()]
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_num[b.index()] != 0
    }

    /// Whether `a` dominates `b`. A block dominates itself; unreachable
    /// blocks dominate nothing but themselves.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        if self.rpo_num[a.index()] == 0 || self.rpo_num[b.index()] == 0 {
            return false;
        }
        if a == self.entry {
            return true;
        }
        // Walk b up the tree while its RPO number is below a's.
        let target = self.rpo_num[a.index()];
        let mut cur = b;
        while self.rpo_num[cur.index()] > target {
            match self.idom[cur.index()] {
                Some(next) => cur = next,
                None => return false,
            }
        }
        cur == a
    }
}

fn intersect(
    a: BlockId,
    b: BlockId,
    idom: &[Option<BlockId>],
    rpo_num: &[u32],
    entry: BlockId,
) -> BlockId {
    let mut f1 = a;
    let mut f2 = b;
    while f1 != f2 {
        if rpo_num[f1.index()] > rpo_num[f2.index()] {
            f1 = match idom[f1.index()] {
                Some(d) => d,
                None => return if f1 == entry { f1 } else { f2 },
            };
        } else {
            f2 = match idom[f2.index()] {
                Some(d) => d,
                None => return if f2 == entry { f2 } else { f1 },
            };
        }
    }
    f1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;

    #[test]
    fn test_diamond() {
        let mut f = Func::new("f");
        let t = f.add_block(BlockKind::Plain);
        let e = f.add_block(BlockKind::Plain);
        let join = f.add_block(BlockKind::Exit);
        f.block_mut(f.entry).kind = BlockKind::If;
        f.add_edge(f.entry, t);
        f.add_edge(f.entry, e);
        f.add_edge(t, join);
        f.add_edge(e, join);

        let dom = Dominators::compute(&f);
        assert!(dom.dominates(f.entry, join));
        assert!(!dom.dominates(t, join));
        assert!(!dom.dominates(e, join));
        assert_eq!(dom.immediate_dominator(join), Some(f.entry));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        let mut f = Func::new("f");
        let head = f.add_block(BlockKind::If);
        let body = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, head);
        f.add_edge(head, body);
        f.add_edge(head, exit);
        f.add_edge(body, head);

        let dom = Dominators::compute(&f);
        assert!(dom.dominates(head, body));
        assert!(dom.dominates(head, exit));
        assert!(!dom.dominates(body, exit));
    }

    #[test]
    fn test_unreachable_block() {
        let mut f = Func::new("f");
        let live = f.add_block(BlockKind::Exit);
        let dead = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, live);

        let dom = Dominators::compute(&f);
        assert!(!dom.is_reachable(dead));
        assert!(!dom.dominates(f.entry, dead));
        assert!(dom.dominates(dead, dead));
    }
}
