//! Linear-scan register allocation.
//!
//! The classic single-pass algorithm: live intervals sorted by start
//! point, an active set of intervals currently holding a register, and a
//! spill-furthest-end heuristic when no register is free. Fixed
//! constraints are handled by the shared application pass; here they only
//! show up as reservations an interval must not overlap.

use crate::machinst::abi::{ABIMachineSpec, SpillSlot};
use crate::machinst::reg::RealReg;
use crate::machinst::vcode::VCode;
use crate::regalloc::apply::{apply_assignment, Loc};
use crate::regalloc::liveness::{analyze, Analysis, LiveInterval};
use crate::regalloc::{MachineEnv, RegAllocResult};
use crate::result::CodegenResult;

/// Run the linear-scan allocator over `vcode`.
pub fn run_linear_scan<M: ABIMachineSpec>(
    vcode: &VCode<M>,
    env: &MachineEnv,
) -> CodegenResult<RegAllocResult> {
    let analysis = analyze(vcode);
    let mut assignment: Vec<Option<Loc>> = vec![None; analysis.num_vregs];
    let mut num_spillslots = 0usize;

    // Intervals sorted by start point; ties broken by vreg index for
    // determinism.
    let mut order: Vec<usize> = (0..analysis.num_vregs)
        .filter(|&v| analysis.intervals[v].is_some())
        .collect();
    order.sort_by_key(|&v| (analysis.intervals[v].unwrap().start, v));

    // The active list: (end, vreg, reg), kept sorted by end point.
    let mut active: Vec<(u32, usize, RealReg)> = vec![];

    for &v in &order {
        let interval = analysis.intervals[v].unwrap();

        // Expire intervals that ended before this one starts.
        active.retain(|&(end, _, _)| end > interval.start);

        match choose_register(&analysis, env, v, &interval, &active) {
            Some(reg) => {
                trace!("linear: {} -> {:?}", v, reg);
                assignment[v] = Some(Loc::Reg(reg));
                let pos = active
                    .binary_search_by_key(&(interval.end, v), |&(e, vr, _)| (e, vr))
                    .unwrap_or_else(|p| p);
                active.insert(pos, (interval.end, v, reg));
            }
            None => {
                // Spill: either this interval, or the active one with the
                // furthest end if that frees a register for longer.
                let furthest = active
                    .iter()
                    .enumerate()
                    .filter(|(_, &(_, av, _))| {
                        analysis.classes[av] == analysis.classes[v]
                    })
                    .max_by_key(|(_, &(end, av, _))| (end, av));
                match furthest {
                    Some((idx, &(end, av, reg)))
                        if end > interval.end
                            && can_hold(&analysis, env, v, &interval, reg, &active, idx) =>
                    {
                        trace!("linear: spilling {} to free {:?} for {}", av, reg, v);
                        assignment[av] = Some(Loc::Slot(SpillSlot(num_spillslots as u32)));
                        num_spillslots += 1;
                        active.remove(idx);
                        assignment[v] = Some(Loc::Reg(reg));
                        let pos = active
                            .binary_search_by_key(&(interval.end, v), |&(e, vr, _)| (e, vr))
                            .unwrap_or_else(|p| p);
                        active.insert(pos, (interval.end, v, reg));
                    }
                    _ => {
                        trace!("linear: spilling {}", v);
                        assignment[v] = Some(Loc::Slot(SpillSlot(num_spillslots as u32)));
                        num_spillslots += 1;
                    }
                }
            }
        }
    }

    apply_assignment(vcode, &analysis, &assignment, env, num_spillslots)
}

/// Pick a free register for `v`, honoring reservations and preferring
/// callee-saved registers for intervals that cross calls.
fn choose_register(
    analysis: &Analysis,
    env: &MachineEnv,
    v: usize,
    interval: &LiveInterval,
    active: &[(u32, usize, RealReg)],
) -> Option<RealReg> {
    let class = analysis.classes[v];
    let crosses_call = analysis.crosses_any_call(interval);

    let candidates = env.regs_in_class(class);
    let pick = |prefer_callee_saved: bool| {
        candidates.iter().copied().find(|&reg| {
            if env.is_callee_saved(reg) != prefer_callee_saved {
                return false;
            }
            is_free(analysis, v, interval, reg, active)
        })
    };

    if crosses_call {
        pick(true).or_else(|| pick(false))
    } else {
        pick(false).or_else(|| pick(true))
    }
}

fn is_free(
    analysis: &Analysis,
    v: usize,
    interval: &LiveInterval,
    reg: RealReg,
    active: &[(u32, usize, RealReg)],
) -> bool {
    if active.iter().any(|&(_, _, r)| r == reg) {
        return false;
    }
    if analysis.overlaps_reservation(interval, reg) {
        return false;
    }
    // A register clobbered by a call inside this interval cannot hold it.
    if analysis.crosses_clobber_of(interval, reg) {
        return false;
    }
    let _ = v;
    true
}

/// After evicting `active[skip]`, can `reg` hold `v`'s interval?
fn can_hold(
    analysis: &Analysis,
    _env: &MachineEnv,
    v: usize,
    interval: &LiveInterval,
    reg: RealReg,
    active: &[(u32, usize, RealReg)],
    skip: usize,
) -> bool {
    if active
        .iter()
        .enumerate()
        .any(|(i, &(_, _, r))| i != skip && r == reg)
    {
        return false;
    }
    if analysis.overlaps_reservation(interval, reg) {
        return false;
    }
    if analysis.crosses_clobber_of(interval, reg) {
        return false;
    }
    let _ = v;
    true
}
