//! A loop analysis represented as mappings of loops to their header Block
//! and parent in the loop tree.
//!
//! Natural loops are found from back edges: a CFG edge whose destination
//! dominates its source. The destination is the loop header; the loop body
//! is everything that can reach the back edge's source without passing
//! through the header.

use crate::dominator_tree::DominatorTree;
use crate::entity::packed_option::PackedOption;
use crate::entity::{entity_impl, PrimaryMap, SecondaryMap};
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};

/// A opaque reference to a code loop.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loop(u32);
entity_impl!(Loop, "loop");

/// Loop tree information for a single function.
///
/// Loops are referenced by the `Loop` object. The loop tree is represented
/// by a mapping of loops to their parent loop in the nesting tree.
pub struct LoopAnalysis {
    loops: PrimaryMap<Loop, LoopData>,
    block_loop_map: SecondaryMap<Block, PackedOption<Loop>>,
    valid: bool,
}

struct LoopData {
    header: Block,
    parent: PackedOption<Loop>,
}

impl LoopData {
    /// Creates a `LoopData` object with the loop header and its eventual
    /// parent in the loop tree.
    pub fn new(header: Block, parent: Option<Loop>) -> Self {
        Self {
            header,
            parent: parent.into(),
        }
    }
}

/// Methods for querying the loop analysis.
impl LoopAnalysis {
    /// Allocate a new blank loop analysis struct. Use `compute` to compute
    /// the loop analysis for a function.
    pub fn new() -> Self {
        Self {
            valid: false,
            loops: PrimaryMap::new(),
            block_loop_map: SecondaryMap::new(),
        }
    }

    /// Returns all the loops contained in a function.
    pub fn loops(&self) -> impl Iterator<Item = Loop> {
        self.loops.keys()
    }

    /// Returns the header block of a particular loop.
    ///
    /// The characteristic property of a loop header block is that it
    /// dominates some of its predecessors.
    pub fn loop_header(&self, lp: Loop) -> Block {
        self.loops[lp].header
    }

    /// Return the eventual parent of a loop in the loop tree.
    pub fn loop_parent(&self, lp: Loop) -> Option<Loop> {
        self.loops[lp].parent.expand()
    }

    /// Return the innermost loop for a given block.
    pub fn innermost_loop(&self, block: Block) -> Option<Loop> {
        self.block_loop_map[block].expand()
    }

    /// Determine if a Block belongs to a loop by running a finger along
    /// the loop tree.
    ///
    /// Returns `true` if `block` is in loop `lp`.
    pub fn is_in_loop(&self, block: Block, lp: Loop) -> bool {
        let block_loop = self.block_loop_map[block];
        match block_loop.expand() {
            None => false,
            Some(block_loop) => self.is_child_loop(block_loop, lp),
        }
    }

    /// Determines if a loop is contained in another loop.
    ///
    /// `is_child_loop(child,parent)` returns `true` if and only if `child`
    /// is a child loop of `parent` (or `child == parent`).
    pub fn is_child_loop(&self, child: Loop, parent: Loop) -> bool {
        let mut finger = Some(child);
        while let Some(lp) = finger {
            if lp == parent {
                return true;
            }
            finger = self.loops[lp].parent.expand();
        }
        false
    }

    /// Returns the loop-nest depth of a given block: 0 for blocks outside
    /// any loop, 1 inside a top-level loop, and so on.
    pub fn loop_level(&self, block: Block) -> usize {
        let mut level = 0;
        let mut finger = self.block_loop_map[block].expand();
        while let Some(lp) = finger {
            level += 1;
            finger = self.loops[lp].parent.expand();
        }
        level
    }

    /// Check if the loop analysis is in a valid state.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl LoopAnalysis {
    /// Detects the loops in a function. Needs the control flow graph and
    /// the dominator tree.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph, domtree: &DominatorTree) {
        self.loops.clear();
        self.block_loop_map.clear();
        self.block_loop_map.resize(func.dfg.num_blocks());
        self.find_loop_headers(cfg, domtree, &func.layout);
        self.discover_loop_blocks(cfg, domtree, &func.layout);
        self.valid = true;
    }

    /// Clear all the data structures contained in the loop analysis. This
    /// will leave the analysis in a similar state to a context returned by
    /// `new()`.
    pub fn clear(&mut self) {
        self.loops.clear();
        self.block_loop_map.clear();
        self.valid = false;
    }

    // Traverses the CFG in reverse postorder and create a loop object for
    // every block having a back edge.
    fn find_loop_headers(
        &mut self,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        _layout: &crate::ir::Layout,
    ) {
        // We traverse the CFG in reverse postorder.
        for &block in domtree.cfg_postorder().iter().rev() {
            for pred in cfg.pred_iter(block) {
                // If the block dominates one of its predecessors it is a
                // back edge.
                if domtree.block_dominates(block, pred.block) {
                    // This block is a loop header, so we create its loop.
                    let lp = self.loops.push(LoopData::new(block, None));
                    self.block_loop_map[block] = lp.into();
                    break;
                    // We break because we only need one back edge to
                    // identify a loop header.
                }
            }
        }
    }

    // Intended to be called after `find_loop_headers`. For each detected
    // loop header, discovers all the block belonging to the loop and the
    // inner loops. Also connects the loop tree.
    fn discover_loop_blocks(
        &mut self,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        _layout: &crate::ir::Layout,
    ) {
        let mut stack: Vec<Block> = Vec::new();
        // We handle each loop header in reverse order, corresponding to a
        // pseudo postorder traversal of the graph.
        for lp in self.loops().collect::<Vec<Loop>>().into_iter().rev() {
            let header = self.loops[lp].header;
            for pred in cfg.pred_iter(header) {
                // We follow the back edges.
                if domtree.block_dominates(header, pred.block) {
                    stack.push(pred.block);
                }
            }
            while let Some(node) = stack.pop() {
                let continue_dfs: Option<Block>;
                match self.block_loop_map[node].expand() {
                    None => {
                        // The node hasn't been visited yet, we tag it as
                        // part of the loop.
                        self.block_loop_map[node] = PackedOption::from(lp);
                        continue_dfs = Some(node);
                    }
                    Some(node_loop) => {
                        // We copy the node_loop into a mutable reference
                        // passed along the loop tree.
                        let mut node_loop = node_loop;
                        // Because because we are iterating in reverse
                        // postorder, innermost loops are discovered first,
                        // and we stop at the first already-discovered
                        // enclosing loop.
                        let mut node_loop_parent_option = self.loops[node_loop].parent;
                        while let Some(node_loop_parent) = node_loop_parent_option.expand() {
                            if node_loop_parent == lp {
                                break;
                            } else {
                                node_loop = node_loop_parent;
                                node_loop_parent_option = self.loops[node_loop].parent;
                            }
                        }
                        // We have the outermost loop that doesn't have a
                        // parent yet.
                        if node_loop == lp {
                            continue_dfs = None;
                        } else {
                            if node_loop_parent_option.is_none() {
                                self.loops[node_loop].parent = lp.into();
                                continue_dfs = Some(self.loops[node_loop].header)
                            } else {
                                // The loop is already a child of this one.
                                continue_dfs = None;
                            }
                        }
                    }
                }
                if let Some(continue_dfs) = continue_dfs {
                    for pred in cfg.pred_iter(continue_dfs) {
                        stack.push(pred.block);
                    }
                }
            }
        }
    }
}

impl Default for LoopAnalysis {
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
    fn nested_loops_detection() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        let block3 = func.dfg.make_block();
        let cond = func.dfg.append_block_param(block0, I32);
        for b in [block0, block1, block2, block3] {
            func.layout.append_block(b);
        }

        {
            let mut cur = FuncCursor::new(&mut func);

            cur.goto_bottom(block0);
            cur.ins().jump(block1, &[]);

            cur.goto_bottom(block1);
            cur.ins().jump(block2, &[]);

            cur.goto_bottom(block2);
            cur.ins().brif(cond, block1, &[], block3, &[]);

            cur.goto_bottom(block3);
            cur.ins().brif(cond, block0, &[], block3, &[]);
        }

        let cfg = ControlFlowGraph::with_function(&func);
        let domtree = DominatorTree::with_function(&func, &cfg);
        let mut loop_analysis = LoopAnalysis::new();
        loop_analysis.compute(&func, &cfg, &domtree);

        let loops = loop_analysis.loops().collect::<Vec<Loop>>();
        assert_eq!(loops.len(), 3);
        assert_eq!(loop_analysis.loop_header(loops[0]), block0);
        assert_eq!(loop_analysis.loop_header(loops[1]), block1);
        assert_eq!(loop_analysis.loop_header(loops[2]), block3);
        assert_eq!(loop_analysis.loop_parent(loops[1]), Some(loops[0]));
        assert_eq!(loop_analysis.loop_parent(loops[2]), Some(loops[0]));
        assert_eq!(loop_analysis.loop_parent(loops[0]), None);
        assert_eq!(loop_analysis.is_in_loop(block0, loops[0]), true);
        assert_eq!(loop_analysis.is_in_loop(block1, loops[1]), true);
        assert_eq!(loop_analysis.is_in_loop(block2, loops[1]), true);
        assert_eq!(loop_analysis.is_in_loop(block3, loops[2]), true);
        assert_eq!(loop_analysis.loop_level(block0), 1);
        assert_eq!(loop_analysis.loop_level(block1), 2);
        assert_eq!(loop_analysis.loop_level(block2), 2);
        assert_eq!(loop_analysis.loop_level(block3), 2);
    }
}
