//! A Dominator Tree represented as mappings of Blocks to their immediate
//! dominator.
//!
//! Immediate dominators are computed with the Semi-NCA algorithm: a DFS
//! numbering pass, a semidominator computation using path-compressed
//! ancestor evaluation, and a final nearest-common-ancestor pass. Compared
//! to a simple iterative data-flow formulation, Semi-NCA is near-linear
//! even on pathological CFGs.

use crate::entity::packed_option::PackedOption;
use crate::entity::SecondaryMap;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, Inst, Layout};
use core::cmp::Ordering;

/// RPO numbers are not first assigned in a contiguous way but as multiples
/// of STRIDE, to leave room for modifications of the dominator tree.
const STRIDE: u32 = 4;

/// Special RPO numbers used during `compute_postorder`.
const SEEN: u32 = 1;

/// Dominator tree node. We keep one of these per block.
#[derive(Clone, Default)]
struct DomNode {
    /// Number of this node in a reverse post-order traversal of the CFG,
    /// starting from 2. Unreachable nodes get number 0, the `SEEN` marker
    /// is used transiently during traversal.
    rpo_number: u32,

    /// The immediate dominator of this block.
    ///
    /// This is `None` for unreachable blocks and the entry block, which
    /// doesn't have an immediate dominator.
    idom: PackedOption<Block>,
}

/// The dominator tree for a single function.
pub struct DominatorTree {
    nodes: SecondaryMap<Block, DomNode>,

    /// CFG post-order of all reachable blocks.
    postorder: Vec<Block>,

    /// Scratch memory used by `compute_postorder()`.
    stack: Vec<(bool, Block)>,

    valid: bool,
}

/// Methods for querying the dominator tree.
impl DominatorTree {
    /// Is `block` reachable from the entry block?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.nodes[block].rpo_number != 0
    }

    /// Get the CFG post-order of blocks that was used to compute the
    /// dominator tree.
    ///
    /// Note that this post-order is not updated automatically when the CFG
    /// is modified. It is computed from scratch and cached by `compute()`.
    pub fn cfg_postorder(&self) -> &[Block] {
        debug_assert!(self.is_valid());
        &self.postorder
    }

    /// Returns the immediate dominator of `block`.
    ///
    /// This returns `None` if `block` is not reachable from the entry
    /// block, or if it is the entry block.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.expand()
    }

    /// Compare two blocks relative to the reverse post-order.
    pub fn rpo_cmp_block(&self, a: Block, b: Block) -> Ordering {
        self.nodes[a].rpo_number.cmp(&self.nodes[b].rpo_number)
    }

    /// Returns `true` if `a` dominates `b`, in the block sense.
    ///
    /// This means that every control-flow path from the function entry to
    /// `b` must go through `a`. Dominance is ill defined for unreachable
    /// blocks; this function can always be asked about them but returns
    /// `false`.
    pub fn block_dominates(&self, a: Block, mut b: Block) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let rpo_a = self.nodes[a].rpo_number;
        // Run a linear search up the dominator tree from `b` until
        // reaching a node at or above `a`'s level.
        while rpo_a < self.nodes[b].rpo_number {
            b = match self.idom(b) {
                Some(idom) => idom,
                None => return false,
            };
        }
        a == b
    }

    /// Returns `true` if the definition point dominates the use.
    ///
    /// `def` is the instruction defining a value (or `None` for a
    /// block-parameter definition at the start of `def_block`), and `inst`
    /// is the using instruction.
    pub fn def_dominates_use(
        &self,
        def: Option<Inst>,
        def_block: Block,
        inst: Inst,
        layout: &Layout,
    ) -> bool {
        let use_block = match layout.inst_block(inst) {
            Some(block) => block,
            None => return false,
        };
        if def_block != use_block {
            return self.block_dominates(def_block, use_block);
        }
        match def {
            // Block parameters dominate every instruction in the block.
            None => true,
            // Same block: compare layout sequence numbers. A definition
            // does not dominate its own instruction's uses.
            Some(def_inst) => layout.inst_cmp(def_inst, inst) == Ordering::Less,
        }
    }

    /// Check if the dominator tree is in a valid state.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl DominatorTree {
    /// Allocate a new blank dominator tree. Use `compute` to compute the
    /// dominator tree for a function.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            postorder: Vec::new(),
            stack: Vec::new(),
            valid: false,
        }
    }

    /// Allocate and compute a dominator tree.
    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domtree = Self::new();
        domtree.compute(func, cfg);
        domtree
    }

    /// Reset and compute a CFG post-order and dominator tree.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        debug_assert!(cfg.is_valid());
        self.clear();
        self.compute_postorder(func, cfg);
        self.compute_domtree(func, cfg);
        self.valid = true;
    }

    /// Clear the data structures used to represent the dominator tree.
    /// This will leave the tree in a state where `is_valid()` returns
    /// false.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.postorder.clear();
        debug_assert!(self.stack.is_empty());
        self.valid = false;
    }

    /// Reset all internal data structures and compute a post-order of the
    /// control flow graph.
    ///
    /// This leaves `rpo_number == SEEN` for reachable blocks.
    fn compute_postorder(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        self.nodes.resize(func.dfg.num_blocks());

        let entry = match func.layout.entry_block() {
            Some(block) => block,
            None => return,
        };

        self.stack.push((false, entry));
        self.nodes[entry].rpo_number = SEEN;

        while let Some((done, block)) = self.stack.pop() {
            if done {
                self.postorder.push(block);
            } else {
                self.stack.push((true, block));
                // Push successors that have not yet been seen. They are
                // visited in reverse order so the first successor is
                // popped first, matching layout-friendly numbering.
                for succ in cfg.succ_iter(block) {
                    if self.nodes[succ].rpo_number == 0 {
                        self.nodes[succ].rpo_number = SEEN;
                        self.stack.push((false, succ));
                    }
                }
            }
        }
    }

    /// Build the dominator tree from the post-order using Semi-NCA.
    fn compute_domtree(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        let entry = match func.layout.entry_block() {
            Some(block) => block,
            None => return,
        };

        // Assign final RPO numbers, leaving stride-sized gaps.
        for (i, &block) in self.postorder.iter().rev().enumerate() {
            self.nodes[block].rpo_number = (i as u32 + 1) * STRIDE;
        }

        // DFS preorder over the CFG, recording the spanning-tree parent of
        // each node. Preorder index 0 is the entry.
        let num = self.postorder.len();
        let mut pre_block: Vec<Block> = Vec::with_capacity(num);
        let mut pre_num: SecondaryMap<Block, u32> = SecondaryMap::with_default(u32::MAX);
        let mut parent: Vec<u32> = Vec::with_capacity(num);

        debug_assert!(self.stack.is_empty());
        let mut dfs: Vec<(u32, Block)> = vec![(u32::MAX, entry)];
        while let Some((par, block)) = dfs.pop() {
            if pre_num[block] != u32::MAX {
                continue;
            }
            let idx = pre_block.len() as u32;
            pre_num[block] = idx;
            pre_block.push(block);
            parent.push(if par == u32::MAX { 0 } else { par });
            for succ in cfg.succ_iter(block) {
                if pre_num[succ] == u32::MAX {
                    dfs.push((idx, succ));
                }
            }
        }
        debug_assert_eq!(pre_block.len(), num);

        // Semidominator pass, in reverse preorder. `label[v]` tracks the
        // node with minimal `semi` on the compressed ancestor path.
        let mut semi: Vec<u32> = (0..num as u32).collect();
        let mut label: Vec<u32> = (0..num as u32).collect();

        for w in (1..num as u32).rev() {
            let mut best = semi[w as usize];
            for pred in cfg.pred_iter(pre_block[w as usize]) {
                let v = pre_num[pred.block];
                if v == u32::MAX {
                    // Unreachable predecessor.
                    continue;
                }
                let cand = if v < w {
                    // Not yet linked: its own preorder number is the
                    // candidate semidominator.
                    v
                } else {
                    let u = Self::eval(v, w + 1, &mut parent, &semi, &mut label);
                    semi[u as usize]
                };
                if cand < best {
                    best = cand;
                }
            }
            semi[w as usize] = best;
        }

        // NCA pass: idom(w) = NCA(parent(w), sdom(w)), computed in
        // preorder so ancestors' idoms are already final.
        let mut idom: Vec<u32> = vec![0; num];
        for w in 1..num as u32 {
            let mut cand = parent[w as usize];
            while cand > semi[w as usize] {
                cand = idom[cand as usize];
            }
            idom[w as usize] = cand;
        }

        for w in 1..num {
            self.nodes[pre_block[w]].idom = pre_block[idom[w] as usize].into();
        }
        self.nodes[entry].idom = None.into();

        // The entry block cannot have a dominator in a well-formed
        // function; flag violations early in debug builds.
        debug_assert!(func.layout.entry_block() == Some(entry));
    }

    /// Path-compressed ancestor evaluation for the semidominator pass.
    ///
    /// Returns the node with minimal `semi` among the DFS-tree ancestors
    /// of `v` (inclusive) that are already linked, i.e. have preorder
    /// number `>= last_linked`.
    fn eval(
        v: u32,
        last_linked: u32,
        parent: &mut Vec<u32>,
        semi: &[u32],
        label: &mut Vec<u32>,
    ) -> u32 {
        if v < last_linked {
            return v;
        }
        // Collect the linked portion of the ancestor path.
        let mut path = Vec::new();
        let mut top = v;
        while parent[top as usize] >= last_linked {
            path.push(top);
            top = parent[top as usize];
        }
        // Propagate the best label downward and compress parents.
        for &n in path.iter().rev() {
            let p = parent[n as usize];
            if semi[label[p as usize] as usize] < semi[label[n as usize] as usize] {
                label[n as usize] = label[p as usize];
            }
            parent[n as usize] = parent[top as usize];
        }
        label[v as usize]
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::types::I32;
    use crate::ir::InstBuilder;

    #[test]
    fn empty() {
        let func = Function::new();
        let cfg = ControlFlowGraph::with_function(&func);
        debug_assert!(cfg.is_valid());
        let dtree = DominatorTree::with_function(&func, &cfg);
        assert_eq!(0, dtree.nodes.keys().count());
        assert_eq!(dtree.cfg_postorder(), &[]);
    }

    #[test]
    fn unreachable_node() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let v0 = func.dfg.append_block_param(block0, I32);
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        let trap_block = func.dfg.make_block();
        for b in [block0, block1, block2, trap_block] {
            func.layout.append_block(b);
        }

        let mut cur = FuncCursor::new(&mut func);

        cur.goto_bottom(block0);
        cur.ins().brif(v0, block2, &[], trap_block, &[]);

        cur.goto_bottom(trap_block);
        cur.ins().trap(crate::ir::TrapCode::UnreachableCodeReached);

        cur.goto_bottom(block1);
        let v1 = cur.ins().iconst(I32, 1);
        let v2 = cur.ins().iadd(v0, v1);
        cur.ins().jump(block0, &[v2]);

        cur.goto_bottom(block2);
        cur.ins().return_(&[v0]);

        let cfg = ControlFlowGraph::with_function(&func);
        let dt = DominatorTree::with_function(&func, &cfg);

        // Fall-through-first, prune-at-source DFT:
        //
        // block0 {
        //   brif block2 {
        //     trap
        //     block2 {
        //       return
        //     } block2
        // } block0
        assert_eq!(func.layout.entry_block(), Some(block0));
        assert_eq!(dt.idom(block0), None);
        assert_eq!(dt.idom(block2), Some(block0));
        assert_eq!(dt.idom(trap_block), Some(block0));
        assert!(!dt.is_reachable(block1));

        assert!(dt.block_dominates(block0, block0));
        assert!(dt.block_dominates(block0, block2));
        assert!(!dt.block_dominates(block2, block0));
        assert!(!dt.block_dominates(block1, block0));
        assert!(!dt.block_dominates(block0, block1));
    }

    #[test]
    fn non_zero_entry_block() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        let block3 = func.dfg.make_block();
        let cond = func.dfg.append_block_param(block3, I32);

        // Layout: 3, 1, 2, 0. Entry is block3.
        func.layout.append_block(block3);
        func.layout.append_block(block1);
        func.layout.append_block(block2);
        func.layout.append_block(block0);

        let mut cur = FuncCursor::new(&mut func);

        cur.goto_bottom(block3);
        cur.ins().jump(block1, &[]);

        cur.goto_bottom(block1);
        cur.ins().brif(cond, block0, &[], block2, &[]);

        cur.goto_bottom(block2);
        cur.ins().jump(block0, &[]);

        cur.goto_bottom(block0);
        cur.ins().return_(&[]);

        let cfg = ControlFlowGraph::with_function(&func);
        let dt = DominatorTree::with_function(&func, &cfg);

        assert_eq!(func.layout.entry_block().unwrap(), block3);
        assert_eq!(dt.idom(block3), None);
        assert_eq!(dt.idom(block1), Some(block3));
        assert_eq!(dt.idom(block2), Some(block1));
        // block0 is reached both from block1 and block2: idom is block1.
        assert_eq!(dt.idom(block0), Some(block1));

        assert!(dt.block_dominates(block3, block0));
        assert!(dt.block_dominates(block1, block0));
        assert!(!dt.block_dominates(block2, block0));
    }

    #[test]
    fn loop_back_edge() {
        // entry -> header -> body -> header (back edge), header -> exit.
        let mut func = Function::new();
        let entry = func.dfg.make_block();
        let header = func.dfg.make_block();
        let body = func.dfg.make_block();
        let exit = func.dfg.make_block();
        let cond = func.dfg.append_block_param(entry, I32);
        for b in [entry, header, body, exit] {
            func.layout.append_block(b);
        }

        let mut cur = FuncCursor::new(&mut func);
        cur.goto_bottom(entry);
        cur.ins().jump(header, &[]);
        cur.goto_bottom(header);
        cur.ins().brif(cond, body, &[], exit, &[]);
        cur.goto_bottom(body);
        cur.ins().jump(header, &[]);
        cur.goto_bottom(exit);
        cur.ins().return_(&[]);

        let cfg = ControlFlowGraph::with_function(&func);
        let dt = DominatorTree::with_function(&func, &cfg);

        assert_eq!(dt.idom(header), Some(entry));
        assert_eq!(dt.idom(body), Some(header));
        assert_eq!(dt.idom(exit), Some(header));
        assert!(dt.block_dominates(header, body));
        assert!(!dt.block_dominates(body, exit));
    }
}
