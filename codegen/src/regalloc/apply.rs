//! Turn a per-vreg assignment into the final `RegAllocResult`.
//!
//! Both allocators decide, for every virtual register, a single home
//! location: a physical register or a spill slot. This module walks the
//! instructions once more and materializes that decision:
//!
//! - operands whose home is a register map directly;
//! - spilled operands get reload/spill edits through per-class reserved
//!   spill temporaries (or a rematerializing replay of their defining
//!   instruction when that is cheaper);
//! - fixed-register constraints are satisfied with shuttle moves in and
//!   out of the constrained register;
//! - reuse constraints route the instruction through the def's home.

use crate::machinst::abi::{ABIMachineSpec, SpillSlot};
use crate::machinst::reg::{OperandConstraint, OperandKind, RealReg, VirtualReg};
use crate::machinst::vcode::VCode;
use crate::regalloc::liveness::Analysis;
use crate::regalloc::{Edit, MachineEnv, ProgPoint, RegAllocResult};
use crate::result::{CodegenError, CodegenResult, RegAllocErrorKind};
use smallvec::SmallVec;

/// The home location of a virtual register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loc {
    /// A physical register for the whole live interval.
    Reg(RealReg),
    /// A spill slot; uses and defs go through spill temporaries.
    Slot(SpillSlot),
}

/// Apply `assignment` to the code, producing the allocation maps and edit
/// list.
pub fn apply_assignment<M: ABIMachineSpec>(
    vcode: &VCode<M>,
    analysis: &Analysis,
    assignment: &[Option<Loc>],
    env: &MachineEnv,
    num_spillslots: usize,
) -> CodegenResult<RegAllocResult> {
    let num_insts = vcode.num_insts() as u32;
    let mut inst_allocs: Vec<SmallVec<[(VirtualReg, RealReg); 4]>> =
        vec![SmallVec::new(); num_insts as usize];
    let mut edits: Vec<(ProgPoint, Edit)> = vec![];
    let mut clobbered: Vec<RealReg> = vec![];

    let note_clobber = |clobbered: &mut Vec<RealReg>, reg: RealReg| {
        if !clobbered.contains(&reg) {
            clobbered.push(reg);
        }
    };

    for inst in 0..num_insts {
        let ops = &analysis.inst_operands[inst as usize];
        // Spill-temp usage per class for this instruction.
        let mut tmps_used = [0usize; 2];
        let mut allocs: SmallVec<[(VirtualReg, RealReg); 4]> = SmallVec::new();

        let set_alloc = |allocs: &mut SmallVec<[(VirtualReg, RealReg); 4]>,
                             vreg: VirtualReg,
                             reg: RealReg|
         -> CodegenResult<()> {
            if let Some(&(_, existing)) = allocs.iter().find(|(v, _)| *v == vreg) {
                if existing != reg {
                    // One vreg demanded in two different registers at the
                    // same instruction: unsatisfiable as collected.
                    return Err(CodegenError::Regalloc(
                        RegAllocErrorKind::ConflictingFixedConstraints,
                    ));
                }
                return Ok(());
            }
            allocs.push((vreg, reg));
            Ok(())
        };

        for (op_idx, op) in ops.operands.iter().enumerate() {
            let vreg = op.vreg;
            let home = assignment[vreg.index()]
                .expect("operand vreg must have an assignment");
            let ty = analysis.types[vreg.index()];

            match op.constraint {
                OperandConstraint::FixedReg(fixed) => {
                    match op.kind {
                        OperandKind::Use => {
                            // Bring the value into the fixed register.
                            match home {
                                Loc::Reg(home_reg) if home_reg == fixed => {}
                                Loc::Reg(home_reg) => {
                                    edits.push((
                                        ProgPoint::before(inst),
                                        Edit::Move {
                                            from: home_reg,
                                            to: fixed,
                                            ty,
                                        },
                                    ));
                                }
                                Loc::Slot(slot) => {
                                    edits.push((
                                        ProgPoint::before(inst),
                                        Edit::Reload {
                                            from_slot: slot,
                                            to: fixed,
                                            ty,
                                        },
                                    ));
                                }
                            }
                            note_clobber(&mut clobbered, fixed);
                            set_alloc(&mut allocs, vreg, fixed)?;
                        }
                        OperandKind::Def | OperandKind::Mod => {
                            // The instruction writes the fixed register;
                            // shuttle the result to the home afterwards.
                            if op.kind == OperandKind::Mod {
                                match home {
                                    Loc::Reg(home_reg) if home_reg == fixed => {}
                                    Loc::Reg(home_reg) => edits.push((
                                        ProgPoint::before(inst),
                                        Edit::Move {
                                            from: home_reg,
                                            to: fixed,
                                            ty,
                                        },
                                    )),
                                    Loc::Slot(slot) => edits.push((
                                        ProgPoint::before(inst),
                                        Edit::Reload {
                                            from_slot: slot,
                                            to: fixed,
                                            ty,
                                        },
                                    )),
                                }
                            }
                            match home {
                                Loc::Reg(home_reg) if home_reg == fixed => {}
                                Loc::Reg(home_reg) => {
                                    edits.push((
                                        ProgPoint::after(inst),
                                        Edit::Move {
                                            from: fixed,
                                            to: home_reg,
                                            ty,
                                        },
                                    ));
                                    note_clobber(&mut clobbered, home_reg);
                                }
                                Loc::Slot(slot) => {
                                    edits.push((
                                        ProgPoint::after(inst),
                                        Edit::Spill {
                                            from: fixed,
                                            to_slot: slot,
                                            ty,
                                        },
                                    ));
                                }
                            }
                            note_clobber(&mut clobbered, fixed);
                            set_alloc(&mut allocs, vreg, fixed)?;
                        }
                    }
                }

                OperandConstraint::Reuse(use_idx) => {
                    debug_assert_eq!(op.kind, OperandKind::Def);
                    // Route the instruction through the def's own home:
                    // move the reused input there first.
                    let use_op = &ops.operands[use_idx];
                    let use_home = assignment[use_op.vreg.index()]
                        .expect("reused vreg must have an assignment");
                    let (def_reg, spill_after) = reg_for(
                        home,
                        vreg,
                        env,
                        analysis,
                        &mut tmps_used,
                    );
                    match use_home {
                        Loc::Reg(r) if r == def_reg => {}
                        Loc::Reg(r) => edits.push((
                            ProgPoint::before(inst),
                            Edit::Move {
                                from: r,
                                to: def_reg,
                                ty,
                            },
                        )),
                        Loc::Slot(slot) => edits.push((
                            ProgPoint::before(inst),
                            Edit::Reload {
                                from_slot: slot,
                                to: def_reg,
                                ty,
                            },
                        )),
                    }
                    if let Some(slot) = spill_after {
                        edits.push((
                            ProgPoint::after(inst),
                            Edit::Spill {
                                from: def_reg,
                                to_slot: slot,
                                ty,
                            },
                        ));
                    }
                    note_clobber(&mut clobbered, def_reg);
                    set_alloc(&mut allocs, vreg, def_reg)?;
                    set_alloc(&mut allocs, use_op.vreg, def_reg)?;
                }

                OperandConstraint::Any => match home {
                    Loc::Reg(home_reg) => {
                        if matches!(op.kind, OperandKind::Def | OperandKind::Mod) {
                            note_clobber(&mut clobbered, home_reg);
                        }
                        set_alloc(&mut allocs, vreg, home_reg)?;
                    }
                    Loc::Slot(slot) => {
                        // Reload into a spill temp (or rematerialize), and
                        // spill back after if written.
                        let class = analysis.classes[vreg.index()];
                        let tmp = env.spilltmps[class.index()][tmps_used[class.index()] % 2];
                        tmps_used[class.index()] += 1;
                        if matches!(op.kind, OperandKind::Use | OperandKind::Mod) {
                            if let Some(def_inst) = analysis.remat_def[vreg.index()] {
                                edits.push((
                                    ProgPoint::before(inst),
                                    Edit::Remat {
                                        def_inst,
                                        vreg,
                                        to: tmp,
                                    },
                                ));
                            } else {
                                edits.push((
                                    ProgPoint::before(inst),
                                    Edit::Reload {
                                        from_slot: slot,
                                        to: tmp,
                                        ty,
                                    },
                                ));
                            }
                        }
                        if matches!(op.kind, OperandKind::Def | OperandKind::Mod) {
                            edits.push((
                                ProgPoint::after(inst),
                                Edit::Spill {
                                    from: tmp,
                                    to_slot: slot,
                                    ty,
                                },
                            ));
                        }
                        note_clobber(&mut clobbered, tmp);
                        set_alloc(&mut allocs, vreg, tmp)?;
                    }
                },
            }
            let _ = op_idx;
        }

        inst_allocs[inst as usize] = allocs;
    }

    // Keep the edit list sorted by point; the per-instruction pass above
    // emits them in ascending instruction order, but before/after edits
    // interleave within one instruction.
    edits.sort_by_key(|(p, _)| *p);

    Ok(RegAllocResult {
        inst_allocs,
        edits,
        num_spillslots,
        clobbered,
    })
}

/// Choose the register through which a spilled or register-homed def
/// flows, plus the slot to spill to afterwards if any.
fn reg_for(
    home: Loc,
    vreg: VirtualReg,
    env: &MachineEnv,
    analysis: &Analysis,
    tmps_used: &mut [usize; 2],
) -> (RealReg, Option<SpillSlot>) {
    match home {
        Loc::Reg(r) => (r, None),
        Loc::Slot(slot) => {
            let class = analysis.classes[vreg.index()];
            let tmp = env.spilltmps[class.index()][tmps_used[class.index()] % 2];
            tmps_used[class.index()] += 1;
            (tmp, Some(slot))
        }
    }
}
