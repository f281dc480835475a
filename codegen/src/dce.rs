//! A Dead-Code Elimination (DCE) pass.
//!
//! Dead code here means instructions that have no side effects and have no
//! result values that are used.

use crate::cursor::FuncCursor;
use crate::dominator_tree::DominatorTree;
use crate::entity::EntityRef;
use crate::ir::{Function, Inst};

/// Does the given instruction have any side-effect that would preclude it
/// from being removed when its value is unused?
fn has_side_effect(func: &Function, inst: Inst) -> bool {
    !func.dfg.insts[inst].opcode().is_pure()
}

/// Perform DCE on `func`.
pub fn do_dce(func: &mut Function, domtree: &DominatorTree) {
    debug_assert!(domtree.is_valid());

    let mut live = vec![false; func.dfg.num_values()];

    // Branch arguments are uses that sit on CFG edges; mark them up front
    // so a value only used across a back edge is not mistaken for dead.
    for block in func.layout.blocks() {
        if let Some(inst) = func.layout.last_inst(block) {
            for call in func.dfg.branch_destinations(inst) {
                for &arg in call.args_slice(&func.dfg.value_lists) {
                    let v = func.dfg.resolve_aliases(arg);
                    live[v.index()] = true;
                }
            }
        }
    }

    // Process blocks in post-order: within the dominance relation, uses
    // are seen before the defining instruction.
    for &block in domtree.cfg_postorder() {
        let mut pos = FuncCursor::new(func).at_bottom(block);
        while let Some(inst) = pos.prev_inst() {
            if has_side_effect(pos.func, inst)
                || pos
                    .func
                    .dfg
                    .inst_results(inst)
                    .iter()
                    .any(|v| live[v.index()])
            {
                for arg in pos.func.dfg.inst_args(inst) {
                    let v = pos.func.dfg.resolve_aliases(*arg);
                    live[v.index()] = true;
                }
                continue;
            }
            trace!("DCE: removing dead {}", pos.func.dfg.display_inst(inst));
            // `remove_inst` advances to the following position, so the
            // next `prev_inst` visits this instruction's predecessor.
            pos.remove_inst();
        }
    }
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
    fn removes_unused_pure_inst() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 1);
            let b = pos.ins().iconst(I32, 2);
            let _dead = pos.ins().iadd(a, b);
            pos.ins().return_(&[]);
        }
        let domtree = analyze(&func);
        do_dce(&mut func, &domtree);

        // Everything should be gone: the add is dead, then both constants.
        let remaining: Vec<_> = func.layout.block_insts(block0).collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            func.dfg.insts[remaining[0]].opcode(),
            crate::ir::Opcode::Return
        );
    }

    #[test]
    fn keeps_used_and_side_effecting() {
        let mut func = Function::new();
        func.signature.returns.push(crate::ir::AbiParam::new(I32));
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 1);
            let b = pos.ins().iconst(I32, 2);
            let c = pos.ins().iadd(a, b);
            pos.ins().return_(&[c]);
        }
        let domtree = analyze(&func);
        do_dce(&mut func, &domtree);
        assert_eq!(func.layout.block_insts(block0).count(), 4);
    }

    #[test]
    fn keeps_branch_arg_only_values() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        func.layout.append_block(block0);
        func.layout.append_block(block1);
        func.dfg.append_block_param(block1, I32);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 5);
            pos.ins().jump(block1, &[a]);
            pos.goto_bottom(block1);
            pos.ins().return_(&[]);
        }
        let domtree = analyze(&func);
        do_dce(&mut func, &domtree);
        assert_eq!(func.layout.block_insts(block0).count(), 2);
    }

    #[test]
    fn idempotent() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 1);
            let _ = pos.ins().iadd(a, a);
            pos.ins().return_(&[]);
        }
        let domtree = analyze(&func);
        do_dce(&mut func, &domtree);
        let after_first: Vec<_> = func.layout.block_insts(block0).collect();
        do_dce(&mut func, &domtree);
        let after_second: Vec<_> = func.layout.block_insts(block0).collect();
        assert_eq!(after_first, after_second);
    }
}
