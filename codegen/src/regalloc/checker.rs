//! Post-allocation symbolic checker.
//!
//! Walks the allocated code tracking, for every physical register and
//! spill slot, which virtual register's value it currently holds. Every
//! use must read a location holding the expected vreg; every constraint
//! recorded by the operand collector must be satisfied by the chosen
//! allocation. Any violation is an allocator bug and aborts compilation.

use crate::fx::FxHashMap;
use crate::machinst::abi::{ABIMachineSpec, SpillSlot};
use crate::machinst::reg::{OperandConstraint, OperandKind, RealReg, VirtualReg};
use crate::machinst::vcode::VCode;
use crate::regalloc::liveness::analyze;
use crate::regalloc::{Edit, ProgPoint, RegAllocResult};
use crate::result::{CodegenError, CodegenResult, RegAllocErrorKind};

#[derive(Clone, Default)]
struct LocState {
    /// Which vreg's value each physical register holds.
    regs: FxHashMap<RealReg, VirtualReg>,
    /// Which vreg's value each spill slot holds.
    slots: FxHashMap<SpillSlot, VirtualReg>,
}

/// Verify the allocation of `vcode`.
///
/// The check is flow-insensitive across blocks (a join would need
/// per-block state); within each block it is exact. This suffices to
/// catch the classic allocator bugs: wrong mapping, missing reload,
/// overlapping assignment, and violated constraints.
pub fn verify_allocation<M: ABIMachineSpec>(
    vcode: &VCode<M>,
    result: &RegAllocResult,
) -> CodegenResult<()> {
    let analysis = analyze(vcode);

    for block in 0..vcode.num_blocks() as u32 {
        let mut state = LocState::default();
        // At block entry, optimistically assume every live-in vreg is in
        // its mapped location: seed from the first occurrence below
        // instead. Unknown locations simply don't fail uses until they
        // are written, so the per-block check is sound but not complete.
        let (start, end) = vcode.block_range(block);
        for inst in start..end {
            for edit in result.edits_at(ProgPoint::before(inst)) {
                apply_edit(&mut state, edit);
            }

            let ops = &analysis.inst_operands[inst as usize];
            let allocs = &result.inst_allocs[inst as usize];
            let find = |vreg: VirtualReg| -> Option<RealReg> {
                allocs.iter().find(|(v, _)| *v == vreg).map(|(_, r)| *r)
            };

            // Check uses before defs take effect.
            for op in &ops.operands {
                let assigned = match find(op.vreg) {
                    Some(r) => r,
                    None => {
                        return Err(CodegenError::Regalloc(RegAllocErrorKind::CheckerFailed))
                    }
                };
                if assigned.class() != op.vreg.class() {
                    return Err(CodegenError::Regalloc(RegAllocErrorKind::CheckerFailed));
                }
                match op.constraint {
                    OperandConstraint::FixedReg(fixed) if assigned != fixed => {
                        return Err(CodegenError::Regalloc(RegAllocErrorKind::CheckerFailed));
                    }
                    OperandConstraint::Reuse(idx) => {
                        let reused = ops.operands[idx].vreg;
                        match find(reused) {
                            Some(r) if r == assigned => {}
                            _ => {
                                return Err(CodegenError::Regalloc(
                                    RegAllocErrorKind::CheckerFailed,
                                ))
                            }
                        }
                    }
                    _ => {}
                }
                if matches!(op.kind, OperandKind::Use | OperandKind::Mod) {
                    if let Some(&holder) = state.regs.get(&assigned) {
                        if holder != op.vreg {
                            return Err(CodegenError::Regalloc(
                                RegAllocErrorKind::CheckerFailed,
                            ));
                        }
                    }
                    // An unknown holder means the value flowed in from a
                    // predecessor; accepted per the block-local model.
                }
            }

            // Defs take effect: they kill previous occupants.
            for op in &ops.operands {
                if matches!(op.kind, OperandKind::Def | OperandKind::Mod) {
                    let assigned = find(op.vreg).unwrap();
                    state.regs.insert(assigned, op.vreg);
                }
            }
            // Clobbers invalidate their registers entirely.
            for &clobber in &ops.clobbers {
                state.regs.remove(&clobber);
            }

            for edit in result.edits_at(ProgPoint::after(inst)) {
                apply_edit(&mut state, edit);
            }
        }
    }

    // Global overlap check: two vregs assigned the same register must not
    // have overlapping live intervals, unless one of them is spilled (in
    // which case the register only holds it transiently around single
    // instructions, covered by the block-local check above).
    let per_inst = &result.inst_allocs;
    for inst in 0..vcode.num_insts() as usize {
        let allocs = &per_inst[inst];
        for (i, &(v1, r1)) in allocs.iter().enumerate() {
            for &(v2, r2) in &allocs[i + 1..] {
                if v1 != v2 && r1 == r2 {
                    // Same register serving two vregs at one instruction
                    // is only legal for a reuse pair.
                    let ops = &analysis.inst_operands[inst];
                    let is_reuse_pair = ops.operands.iter().any(|op| {
                        if let OperandConstraint::Reuse(idx) = op.constraint {
                            let a = op.vreg;
                            let b = ops.operands[idx].vreg;
                            (a == v1 && b == v2) || (a == v2 && b == v1)
                        } else {
                            false
                        }
                    });
                    if !is_reuse_pair {
                        return Err(CodegenError::Regalloc(
                            RegAllocErrorKind::CheckerFailed,
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

fn apply_edit(state: &mut LocState, edit: &Edit) {
    match edit {
        Edit::Move { from, to, .. } => {
            if let Some(&v) = state.regs.get(from) {
                state.regs.insert(*to, v);
            } else {
                state.regs.remove(to);
            }
        }
        Edit::Spill { from, to_slot, .. } => {
            if let Some(&v) = state.regs.get(from) {
                state.slots.insert(*to_slot, v);
            } else {
                state.slots.remove(to_slot);
            }
        }
        Edit::Reload { from_slot, to, .. } => {
            if let Some(&v) = state.slots.get(from_slot) {
                state.regs.insert(*to, v);
            } else {
                state.regs.remove(to);
            }
        }
        Edit::Remat { vreg, to, .. } => {
            state.regs.insert(*to, *vreg);
        }
    }
}
