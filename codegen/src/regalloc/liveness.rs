//! Liveness analysis over VCode.
//!
//! Produces, for each virtual register, a conservative live interval over
//! *program points*. Each instruction occupies two points: an early point
//! (where its uses read) and a late point (where its defs write). Block
//! boundaries propagate liveness across control-flow edges; the analysis
//! iterates to a fixed point, which in the absence of irreducible control
//! flow converges in two passes.
//!
//! The same pass collects everything else the allocators need: the
//! per-instruction operand lists, the fixed-register reservations implied
//! by constraints and call clobbers, per-vreg spill weights, and
//! rematerialization candidates.

use crate::fx::FxHashSet;
use crate::machinst::abi::ABIMachineSpec;
use crate::machinst::reg::{
    Operand, OperandCollector, OperandConstraint, OperandKind, RealReg, RegClass,
};
use crate::machinst::vcode::VCode;
use crate::machinst::MachInst;
use crate::ir::Type;
use smallvec::SmallVec;

/// A conservative live interval over program points, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveInterval {
    /// First point at which the vreg is live or defined.
    pub start: u32,
    /// One past the last point at which the vreg is live or used.
    pub end: u32,
}

impl LiveInterval {
    /// Does this interval overlap another?
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Does this interval strictly contain the given point?
    pub fn contains(&self, point: u32) -> bool {
        self.start <= point && point < self.end
    }
}

/// Per-instruction operand information, cached from the collector.
#[derive(Default)]
pub struct InstOperands {
    /// Virtual-register operands.
    pub operands: SmallVec<[Operand; 8]>,
    /// Real registers clobbered (writes outside the operand list).
    pub clobbers: SmallVec<[RealReg; 8]>,
    /// Real registers read directly.
    pub fixed_uses: SmallVec<[RealReg; 8]>,
}

/// The complete analysis over one function's VCode.
pub struct Analysis {
    /// Number of virtual registers.
    pub num_vregs: usize,
    /// Live interval per vreg (`None` if the vreg never appears).
    pub intervals: Vec<Option<LiveInterval>>,
    /// Cached operands per instruction.
    pub inst_operands: Vec<InstOperands>,
    /// Class of each vreg.
    pub classes: Vec<RegClass>,
    /// Type of each vreg (for spill/reload width).
    pub types: Vec<Type>,
    /// Spill weight: number of occurrences of each vreg.
    pub weights: Vec<u32>,
    /// Fixed reservations per physical register: point ranges during
    /// which the preg is pinned by a constraint or clobber.
    pub reservations: Vec<(RealReg, LiveInterval)>,
    /// Late points of instructions that clobber registers (call sites),
    /// with the clobbered set index into `inst_operands`.
    pub call_points: Vec<(u32, u32)>,
    /// For each vreg: the index of its single defining instruction, if it
    /// is a pure materialization (no register inputs) and thus a
    /// rematerialization candidate.
    pub remat_def: Vec<Option<u32>>,
}

impl Analysis {
    /// Does `interval` cross any instruction that clobbers `reg`?
    pub fn crosses_clobber_of(&self, interval: &LiveInterval, reg: RealReg) -> bool {
        for &(point, inst) in &self.call_points {
            // Strict crossing: values defined or last-used exactly at the
            // call boundary are not affected.
            if interval.start < point && interval.end > point {
                if self.inst_operands[inst as usize].clobbers.contains(&reg) {
                    return true;
                }
            }
        }
        false
    }

    /// Does `interval` cross any clobbering instruction at all?
    pub fn crosses_any_call(&self, interval: &LiveInterval) -> bool {
        self.call_points
            .iter()
            .any(|&(point, _)| interval.start < point && interval.end > point)
    }

    /// Does `interval` overlap a fixed reservation of `reg`?
    pub fn overlaps_reservation(&self, interval: &LiveInterval, reg: RealReg) -> bool {
        self.reservations
            .iter()
            .any(|&(r, ref resv)| r == reg && interval.overlaps(resv))
    }
}

/// The early program point of instruction `i`.
pub fn early_point(inst: u32) -> u32 {
    inst * 2
}

/// The late program point of instruction `i`.
pub fn late_point(inst: u32) -> u32 {
    inst * 2 + 1
}

/// Run the analysis.
pub fn analyze<M: ABIMachineSpec>(vcode: &VCode<M>) -> Analysis {
    let num_vregs = vcode.num_vregs();
    let num_insts = vcode.num_insts() as u32;
    let num_blocks = vcode.num_blocks() as u32;

    // Collect operands for every instruction once.
    let mut inst_operands = Vec::with_capacity(num_insts as usize);
    for i in 0..num_insts {
        let mut collector = OperandCollector::new();
        vcode.get_inst(i).get_operands(&mut collector);
        inst_operands.push(InstOperands {
            operands: collector.operands,
            clobbers: collector.clobbers,
            fixed_uses: collector.fixed_uses,
        });
    }

    // Block-level liveness to a fixed point.
    let mut live_in: Vec<FxHashSet<u32>> = vec![FxHashSet::default(); num_blocks as usize];
    let mut live_out: Vec<FxHashSet<u32>> = vec![FxHashSet::default(); num_blocks as usize];

    let mut changed = true;
    while changed {
        changed = false;
        for block in (0..num_blocks).rev() {
            let mut out = FxHashSet::default();
            for &succ in vcode.block_succs(block) {
                for &v in &live_in[succ as usize] {
                    out.insert(v);
                }
            }

            let mut live = out.clone();
            let (start, end) = vcode.block_range(block);
            for inst in (start..end).rev() {
                for op in &inst_operands[inst as usize].operands {
                    match op.kind {
                        OperandKind::Def => {
                            live.remove(&(op.vreg.index() as u32));
                        }
                        OperandKind::Use | OperandKind::Mod => {}
                    }
                }
                for op in &inst_operands[inst as usize].operands {
                    match op.kind {
                        OperandKind::Use | OperandKind::Mod => {
                            live.insert(op.vreg.index() as u32);
                        }
                        OperandKind::Def => {}
                    }
                }
            }

            if out != live_out[block as usize] {
                live_out[block as usize] = out;
                changed = true;
            }
            if live != live_in[block as usize] {
                live_in[block as usize] = live;
                changed = true;
            }
        }
    }

    // Build conservative intervals.
    let mut intervals: Vec<Option<LiveInterval>> = vec![None; num_vregs];
    let mut weights = vec![0u32; num_vregs];
    let mut classes = vec![RegClass::Int; num_vregs];
    let mut types = vec![crate::ir::types::I64; num_vregs];
    let mut def_counts = vec![0u32; num_vregs];
    let mut remat_def: Vec<Option<u32>> = vec![None; num_vregs];

    let extend = |intervals: &mut Vec<Option<LiveInterval>>, v: usize, from: u32, to: u32| {
        let entry = &mut intervals[v];
        match entry {
            None => {
                *entry = Some(LiveInterval {
                    start: from,
                    end: to,
                })
            }
            Some(iv) => {
                iv.start = iv.start.min(from);
                iv.end = iv.end.max(to);
            }
        }
    };

    for block in 0..num_blocks {
        let (start, end) = vcode.block_range(block);
        let block_start = early_point(start);
        let block_end = late_point(end.saturating_sub(1)) + 1;
        for &v in &live_in[block as usize] {
            extend(&mut intervals, v as usize, block_start, block_start + 1);
        }
        for &v in &live_out[block as usize] {
            extend(&mut intervals, v as usize, block_end.saturating_sub(1), block_end);
        }
        for inst in start..end {
            let ops = &inst_operands[inst as usize];
            let is_pure_materialization = ops
                .operands
                .iter()
                .all(|op| op.kind == OperandKind::Def)
                && ops.fixed_uses.is_empty()
                && ops.clobbers.is_empty()
                && vcode.get_inst(inst).is_term() == crate::machinst::MachTerminator::None;
            for op in &ops.operands {
                let v = op.vreg.index();
                classes[v] = op.vreg.class();
                weights[v] += 1;
                let vty = vcode.vreg_type(op.vreg);
                types[v] = vty;
                match op.kind {
                    OperandKind::Use => {
                        extend(&mut intervals, v, early_point(inst), early_point(inst) + 1);
                    }
                    OperandKind::Def => {
                        extend(&mut intervals, v, late_point(inst), late_point(inst) + 1);
                        def_counts[v] += 1;
                        if is_pure_materialization && def_counts[v] == 1 {
                            remat_def[v] = Some(inst);
                        } else {
                            remat_def[v] = None;
                        }
                    }
                    OperandKind::Mod => {
                        extend(&mut intervals, v, early_point(inst), late_point(inst) + 1);
                        def_counts[v] += 1;
                        remat_def[v] = None;
                    }
                }
            }
        }
    }

    // Fixed reservations and call points.
    let mut reservations: Vec<(RealReg, LiveInterval)> = vec![];
    let mut call_points: Vec<(u32, u32)> = vec![];
    for inst in 0..num_insts {
        let ops = &inst_operands[inst as usize];
        for op in &ops.operands {
            if let OperandConstraint::FixedReg(reg) = op.constraint {
                reservations.push((
                    reg,
                    LiveInterval {
                        start: early_point(inst),
                        end: late_point(inst) + 1,
                    },
                ));
            }
        }
        for &reg in &ops.fixed_uses {
            reservations.push((
                reg,
                LiveInterval {
                    start: early_point(inst),
                    end: early_point(inst) + 1,
                },
            ));
        }
        if !ops.clobbers.is_empty() {
            for &reg in &ops.clobbers {
                reservations.push((
                    reg,
                    LiveInterval {
                        start: late_point(inst),
                        end: late_point(inst) + 1,
                    },
                ));
            }
            call_points.push((late_point(inst), inst));
        }
    }

    Analysis {
        num_vregs,
        intervals,
        inst_operands,
        classes,
        types,
        weights,
        reservations,
        call_points,
        remat_def,
    }
}
