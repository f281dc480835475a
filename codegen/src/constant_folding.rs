//! Folds operations on constants at compile time.
//!
//! This pass walks the function in reverse post-order, replacing pure
//! instructions whose operands are all constants with the computed
//! constant, and rewriting `brif` on a known condition into a plain
//! `jump`. A second application yields no further change.

use crate::cursor::FuncCursor;
use crate::dominator_tree::DominatorTree;
use crate::ir::condcodes::IntCC;
use crate::ir::immediates::Imm64;
use crate::ir::{Function, Inst, InstBuilder, InstructionData, Opcode, ReplaceBuilder, Type, Value};

/// Perform constant folding on `func`.
pub fn do_const_fold(func: &mut Function, domtree: &DominatorTree) {
    debug_assert!(domtree.is_valid());

    for &block in domtree.cfg_postorder().iter().rev() {
        let mut pos = FuncCursor::new(func).at_first_insertion_point(block);
        while let Some(inst) = pos.current_inst() {
            fold_inst(&mut pos, inst);
            pos.next_inst();
        }
    }
}

/// The constant value of an integer-typed SSA value, if known.
fn const_of(func: &Function, value: Value) -> Option<(Imm64, Type)> {
    let value = func.dfg.resolve_aliases(value);
    let inst = func.dfg.value_def(value).inst()?;
    match func.dfg.insts[inst] {
        InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm,
        } => Some((imm, func.dfg.value_type(value))),
        _ => None,
    }
}

fn fold_inst(pos: &mut FuncCursor, inst: Inst) {
    let opcode = pos.func.dfg.insts[inst].opcode();

    match opcode {
        Opcode::Iadd
        | Opcode::Isub
        | Opcode::Imul
        | Opcode::Band
        | Opcode::Bor
        | Opcode::Bxor
        | Opcode::Ishl
        | Opcode::Ushr
        | Opcode::Sshr => {
            let args = match pos.func.dfg.insts[inst] {
                InstructionData::Binary { args, .. } => args,
                _ => return,
            };
            let (x, ty) = match const_of(pos.func, args[0]) {
                Some(c) => c,
                None => return,
            };
            let (y, _) = match const_of(pos.func, args[1]) {
                Some(c) => c,
                None => return,
            };
            if ty.is_vector() {
                return;
            }
            let bits = ty.bits();
            let shift_mask = u64::from(bits - 1);
            let x_bits = x.bits();
            let y_bits = y.bits();
            let folded = match opcode {
                Opcode::Iadd => x_bits.wrapping_add(y_bits),
                Opcode::Isub => x_bits.wrapping_sub(y_bits),
                Opcode::Imul => x_bits.wrapping_mul(y_bits),
                Opcode::Band => x_bits & y_bits,
                Opcode::Bor => x_bits | y_bits,
                Opcode::Bxor => x_bits ^ y_bits,
                Opcode::Ishl => x_bits.wrapping_shl((y_bits as u64 & shift_mask) as u32),
                Opcode::Ushr => {
                    let ux = (x.zero_extend_from_width(bits).bits()) as u64;
                    (ux >> (y_bits as u64 & shift_mask)) as i64
                }
                Opcode::Sshr => {
                    x.sign_extend_from_width(bits).bits() >> (y_bits as u64 & shift_mask)
                }
                _ => unreachable!(),
            };
            let folded = Imm64::new(folded).sign_extend_from_width(bits);
            trace!(
                "Fold: {} -> iconst {}",
                pos.func.dfg.display_inst(inst),
                folded
            );
            ReplaceBuilder::new(&mut pos.func.dfg, inst).iconst(ty, folded);
        }

        Opcode::Icmp => {
            let (args, cond) = match pos.func.dfg.insts[inst] {
                InstructionData::IntCompare { args, cond, .. } => (args, cond),
                _ => return,
            };
            let (x, ty) = match const_of(pos.func, args[0]) {
                Some(c) => c,
                None => return,
            };
            let (y, _) = match const_of(pos.func, args[1]) {
                Some(c) => c,
                None => return,
            };
            if ty.is_vector() {
                return;
            }
            let bits = ty.bits();
            let xs = x.sign_extend_from_width(bits).bits();
            let ys = y.sign_extend_from_width(bits).bits();
            let xu = x.zero_extend_from_width(bits).bits() as u64;
            let yu = y.zero_extend_from_width(bits).bits() as u64;
            let result = match cond {
                IntCC::Equal => xs == ys,
                IntCC::NotEqual => xs != ys,
                IntCC::SignedLessThan => xs < ys,
                IntCC::SignedGreaterThanOrEqual => xs >= ys,
                IntCC::SignedGreaterThan => xs > ys,
                IntCC::SignedLessThanOrEqual => xs <= ys,
                IntCC::UnsignedLessThan => xu < yu,
                IntCC::UnsignedGreaterThanOrEqual => xu >= yu,
                IntCC::UnsignedGreaterThan => xu > yu,
                IntCC::UnsignedLessThanOrEqual => xu <= yu,
            };
            ReplaceBuilder::new(&mut pos.func.dfg, inst)
                .iconst(crate::ir::types::I8, result as i64);
        }

        Opcode::Brif => {
            let (arg, blocks) = match pos.func.dfg.insts[inst] {
                InstructionData::Brif { arg, blocks, .. } => (arg, blocks),
                _ => return,
            };
            let (c, _) = match const_of(pos.func, arg) {
                Some(c) => c,
                None => return,
            };
            let destination = if c.bits() != 0 { blocks[0] } else { blocks[1] };
            trace!("Fold: resolving {} statically", pos.func.dfg.display_inst(inst));
            pos.func.dfg.insts[inst] = InstructionData::Jump {
                opcode: Opcode::Jump,
                destination,
            };
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgraph::ControlFlowGraph;
    use crate::ir::types::I32;

    fn analyze(func: &Function) -> DominatorTree {
        let cfg = ControlFlowGraph::with_function(func);
        DominatorTree::with_function(func, &cfg)
    }

    #[test]
    fn folds_arithmetic() {
        let mut func = Function::new();
        func.signature.returns.push(crate::ir::AbiParam::new(I32));
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let result;
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 6);
            let b = pos.ins().iconst(I32, 7);
            result = pos.ins().imul(a, b);
            pos.ins().return_(&[result]);
        }
        let domtree = analyze(&func);
        do_const_fold(&mut func, &domtree);

        let def = func.dfg.value_def(func.dfg.resolve_aliases(result)).unwrap_inst();
        match func.dfg.insts[def] {
            InstructionData::UnaryImm { imm, .. } => assert_eq!(imm.bits(), 42),
            ref other => panic!("expected folded constant, got {:?}", other),
        }
    }

    #[test]
    fn folds_branch() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        for b in [block0, block1, block2] {
            func.layout.append_block(b);
        }
        let br;
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let c = pos.ins().iconst(I32, 1);
            br = pos.ins().brif(c, block1, &[], block2, &[]);
            pos.goto_bottom(block1);
            pos.ins().return_(&[]);
            pos.goto_bottom(block2);
            pos.ins().return_(&[]);
        }
        let domtree = analyze(&func);
        do_const_fold(&mut func, &domtree);

        assert_eq!(func.dfg.insts[br].opcode(), Opcode::Jump);
        let dest = func.dfg.insts[br].branch_destination()[0];
        assert_eq!(dest.block(&func.dfg.value_lists), block1);
    }

    #[test]
    fn idempotent() {
        let mut func = Function::new();
        func.signature.returns.push(crate::ir::AbiParam::new(I32));
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 40);
            let b = pos.ins().iconst(I32, 2);
            let c = pos.ins().iadd(a, b);
            pos.ins().return_(&[c]);
        }
        let domtree = analyze(&func);
        do_const_fold(&mut func, &domtree);
        let first = func.to_string();
        do_const_fold(&mut func, &domtree);
        let second = func.to_string();
        assert_eq!(first, second);
    }
}
