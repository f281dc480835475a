//! A control flow graph represented as mappings of basic blocks to their
//! predecessors and successors.
//!
//! Successors are represented as basic blocks while predecessors are
//! represented by basic blocks paired with the branch instruction at their
//! end. Each predecessor pair corresponds to one incoming control-flow
//! edge.

use crate::entity::SecondaryMap;
use crate::ir::{Block, Function, Inst};
use smallvec::SmallVec;

/// A basic block denoted by its enclosing Block and last instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    /// Enclosing Block key.
    pub block: Block,
    /// Last instruction in the basic block.
    pub inst: Inst,
}

impl BlockPredecessor {
    /// Convenient method to construct new BlockPredecessor.
    pub fn new(block: Block, inst: Inst) -> Self {
        Self { block, inst }
    }
}

/// A container for the successors and predecessors of some Block.
#[derive(Clone, Default)]
struct CFGNode {
    /// Instructions that can branch or jump to this block.
    pub predecessors: SmallVec<[BlockPredecessor; 4]>,

    /// Set of blocks that are the targets of branches and jumps in this
    /// block, ordered by block number and deduplicated.
    pub successors: SmallVec<[Block; 4]>,
}

/// The Control Flow Graph maintains a mapping of blocks to their
/// predecessors and successors.
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CFGNode>,
    valid: bool,
}

impl ControlFlowGraph {
    /// Allocate a new blank control flow graph.
    pub fn new() -> Self {
        Self {
            data: SecondaryMap::new(),
            valid: false,
        }
    }

    /// Clear all data structures in this control flow graph.
    pub fn clear(&mut self) {
        self.data.clear();
        self.valid = false;
    }

    /// Allocate and compute the control flow graph for `func`.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Compute the control flow graph of `func`.
    ///
    /// This will clear and overwrite any information already stored in
    /// this data structure.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        self.data.resize(func.dfg.num_blocks());

        for block in &func.layout {
            self.compute_block(func, block);
        }

        self.valid = true;
    }

    fn compute_block(&mut self, func: &Function, block: Block) {
        if let Some(inst) = func.layout.last_inst(block) {
            for call in func.dfg.branch_destinations(inst) {
                let dest = call.block(&func.dfg.value_lists);
                self.add_edge(block, inst, dest);
            }
        }
    }

    fn invalidate_block_successors(&mut self, block: Block) {
        // Temporarily take ownership because we need mutable access to
        // self.data inside the loop.
        let successors = core::mem::take(&mut self.data[block].successors);
        for succ in successors {
            self.data[succ].predecessors.retain(|p| p.block != block);
        }
    }

    /// Recompute the control flow graph of `block`.
    ///
    /// This is for use after modifying instructions within a specific
    /// block. It recomputes all edges from `block` while leaving edges to
    /// `block` intact.
    pub fn recompute_block(&mut self, func: &Function, block: Block) {
        debug_assert!(self.is_valid());
        self.invalidate_block_successors(block);
        self.compute_block(func, block);
    }

    fn add_edge(&mut self, from: Block, from_inst: Inst, to: Block) {
        // Keep the successor list sorted and free of duplicates so that
        // iteration order is deterministic.
        let succs = &mut self.data[from].successors;
        if let Err(i) = succs.binary_search(&to) {
            succs.insert(i, to);
        }
        let preds = &mut self.data[to].predecessors;
        let pred = BlockPredecessor::new(from, from_inst);
        if !preds.contains(&pred) {
            preds.push(pred);
        }
    }

    /// Get an iterator over the CFG predecessors to `block`.
    pub fn pred_iter(&self, block: Block) -> impl Iterator<Item = BlockPredecessor> + '_ {
        self.data[block].predecessors.iter().copied()
    }

    /// Get an iterator over the CFG successors to `block`.
    pub fn succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.data[block].successors.iter().copied()
    }

    /// Get the number of predecessors of `block`.
    pub fn num_predecessors(&self, block: Block) -> usize {
        self.data[block].predecessors.len()
    }

    /// Check if the CFG is in a valid state.
    ///
    /// Note that this doesn't perform any kind of validity checks. It
    /// simply checks if the `compute()` method has been called since the
    /// last `clear()`.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::I32;
    use crate::cursor::FuncCursor;
    use crate::ir::InstBuilder;

    #[test]
    fn empty() {
        let func = Function::new();
        ControlFlowGraph::with_function(&func);
    }

    #[test]
    fn no_predecessors() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        func.layout.append_block(block0);
        func.layout.append_block(block1);
        func.layout.append_block(block2);

        let cfg = ControlFlowGraph::with_function(&func);

        for block in &[block0, block1, block2] {
            assert_eq!(cfg.num_predecessors(*block), 0);
            assert_eq!(cfg.succ_iter(*block).count(), 0);
        }
    }

    #[test]
    fn branches_and_jumps() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let cond = func.dfg.append_block_param(block0, I32);
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        func.layout.append_block(block0);
        func.layout.append_block(block1);
        func.layout.append_block(block2);

        let br_block0_block2_block1;
        let jmp_block1_block2;

        {
            let mut cur = FuncCursor::new(&mut func);

            cur.goto_bottom(block0);
            br_block0_block2_block1 = cur.ins().brif(cond, block2, &[], block1, &[]);

            cur.goto_bottom(block1);
            jmp_block1_block2 = cur.ins().jump(block2, &[]);
        }

        let mut cfg = ControlFlowGraph::with_function(&func);

        {
            let block0_predecessors: Vec<_> = cfg.pred_iter(block0).collect();
            let block1_predecessors: Vec<_> = cfg.pred_iter(block1).collect();
            let block2_predecessors: Vec<_> = cfg.pred_iter(block2).collect();

            let block0_successors: Vec<_> = cfg.succ_iter(block0).collect();
            let block1_successors: Vec<_> = cfg.succ_iter(block1).collect();
            let block2_successors: Vec<_> = cfg.succ_iter(block2).collect();

            assert_eq!(block0_predecessors.len(), 0);
            assert_eq!(block1_predecessors.len(), 1);
            assert_eq!(block2_predecessors.len(), 2);

            assert_eq!(
                block1_predecessors
                    .contains(&BlockPredecessor::new(block0, br_block0_block2_block1)),
                true
            );
            assert_eq!(
                block2_predecessors
                    .contains(&BlockPredecessor::new(block0, br_block0_block2_block1)),
                true
            );
            assert_eq!(
                block2_predecessors.contains(&BlockPredecessor::new(block1, jmp_block1_block2)),
                true
            );

            assert_eq!(block0_successors, [block1, block2]);
            assert_eq!(block1_successors, [block2]);
            assert_eq!(block2_successors, []);
        }

        // Add a new block to hold a return instruction.
        let ret_block = func.dfg.make_block();
        func.layout.append_block(ret_block);

        {
            let mut cur = FuncCursor::new(&mut func).at_bottom(ret_block);
            cur.ins().return_(&[]);
        }

        // Change some instructions and recompute block0's successors.
        func.dfg.insts[br_block0_block2_block1]
            .branch_destination_mut()[0]
            .set_block(block1, &mut func.dfg.value_lists);

        cfg.recompute_block(&func, block0);
        let block0_successors: Vec<_> = cfg.succ_iter(block0).collect();
        assert_eq!(block0_successors, [block1]);
        assert_eq!(cfg.pred_iter(block2).count(), 1);
    }
}
