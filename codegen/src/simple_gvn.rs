//! A simple GVN pass.
//!
//! Redundant pure instructions are detected by hashing (opcode, type,
//! arguments); when an equivalent instruction whose definition dominates
//! the current one has already been seen, the current instruction is
//! removed and its results aliased to the previous ones.

use crate::cursor::FuncCursor;
use crate::dominator_tree::DominatorTree;
use crate::fx::FxHashMap;
use crate::ir::{Function, Inst, InstructionData, Type};

/// Test whether the given opcode is unsafe to even consider for GVN.
fn trivially_unsafe_for_gvn(func: &Function, inst: Inst) -> bool {
    !func.dfg.insts[inst].opcode().is_pure() || !func.dfg.has_results(inst)
}

/// Perform simple GVN on `func`.
pub fn do_simple_gvn(func: &mut Function, domtree: &DominatorTree) {
    debug_assert!(domtree.is_valid());

    // Pure instructions never carry out-of-line value lists, so the
    // `InstructionData` payload itself (with aliases resolved) is a usable
    // hash key together with the controlling type.
    let mut visible: FxHashMap<(InstructionData, Type), Inst> = FxHashMap::default();

    // Visit blocks in reverse post-order, so dominating definitions are
    // seen before their potential duplicates.
    for &block in domtree.cfg_postorder().iter().rev() {
        let mut pos = FuncCursor::new(func).at_first_insertion_point(block);
        while let Some(inst) = pos.current_inst() {
            if trivially_unsafe_for_gvn(pos.func, inst) {
                pos.next_inst();
                continue;
            }

            pos.func.dfg.resolve_aliases_in_arguments(inst);
            let key = (
                pos.func.dfg.insts[inst].clone(),
                pos.func.dfg.ctrl_typevar(inst),
            );

            match visible.get(&key) {
                Some(&prev_inst)
                    if dominates_inst(domtree, pos.func, prev_inst, inst) =>
                {
                    trace!(
                        "GVN: replacing {} with {}",
                        pos.func.dfg.display_inst(inst),
                        prev_inst
                    );
                    pos.func.dfg.replace_with_aliases(inst, prev_inst);
                    pos.remove_inst();
                }
                _ => {
                    // Either unseen, or the previous definition does not
                    // dominate this point (a sibling branch). Keep the
                    // newer definition in the table; determinism is
                    // preserved because the iteration order is fixed.
                    visible.insert(key, inst);
                    pos.next_inst();
                }
            }
        }
    }
}

fn dominates_inst(domtree: &DominatorTree, func: &Function, def: Inst, use_: Inst) -> bool {
    let def_block = match func.layout.inst_block(def) {
        Some(b) => b,
        None => return false,
    };
    domtree.def_dominates_use(Some(def), def_block, use_, &func.layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::flowgraph::ControlFlowGraph;
    use crate::ir::types::I32;
    use crate::ir::InstBuilder;

    fn analyze(func: &Function) -> DominatorTree {
        let cfg = ControlFlowGraph::with_function(func);
        DominatorTree::with_function(func, &cfg)
    }

    #[test]
    fn removes_duplicate_adds() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let v0 = func.dfg.append_block_param(block0, I32);
        let v1 = func.dfg.append_block_param(block0, I32);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iadd(v0, v1);
            let b = pos.ins().iadd(v0, v1);
            let c = pos.ins().iadd(a, b);
            pos.ins().return_(&[c]);
        }
        let domtree = analyze(&func);
        do_simple_gvn(&mut func, &domtree);

        // The second add is gone and the third sees the same value twice.
        assert_eq!(func.layout.block_insts(block0).count(), 3);
    }

    #[test]
    fn does_not_merge_across_siblings() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        func.layout.append_block(block0);
        func.layout.append_block(block1);
        func.layout.append_block(block2);
        let c = func.dfg.append_block_param(block0, I32);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            pos.ins().brif(c, block1, &[], block2, &[]);
            pos.goto_bottom(block1);
            let x = pos.ins().iadd(c, c);
            pos.ins().return_(&[x]);
            pos.goto_bottom(block2);
            let y = pos.ins().iadd(c, c);
            pos.ins().return_(&[y]);
        }
        let domtree = analyze(&func);
        do_simple_gvn(&mut func, &domtree);

        // Neither block dominates the other, so both adds survive.
        assert_eq!(func.layout.block_insts(block1).count(), 2);
        assert_eq!(func.layout.block_insts(block2).count(), 2);
    }

    #[test]
    fn idempotent() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let v0 = func.dfg.append_block_param(block0, I32);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iadd(v0, v0);
            let b = pos.ins().iadd(v0, v0);
            let c = pos.ins().iadd(a, b);
            pos.ins().return_(&[c]);
        }
        let domtree = analyze(&func);
        do_simple_gvn(&mut func, &domtree);
        let first: Vec<_> = func.layout.block_insts(block0).collect();
        do_simple_gvn(&mut func, &domtree);
        let second: Vec<_> = func.layout.block_insts(block0).collect();
        assert_eq!(first, second);
    }
}
