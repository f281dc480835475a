//! Backtracking register allocation.
//!
//! Intervals are processed from a priority queue ordered by spill weight
//! (occurrence count, scaled down by interval length). Each interval
//! tries to take a register, preferring any coalescing hint gathered from
//! move instructions; on conflict with already-assigned lower-priority
//! intervals it may *evict* them back onto the queue. An eviction budget
//! bounds the search; when it runs out, the lightest interval is spilled.
//! Cheap pure definitions (constant materializations) are rematerialized
//! at their uses rather than reloaded from a slot.

use crate::fx::FxHashMap;
use crate::machinst::abi::{ABIMachineSpec, SpillSlot};
use crate::machinst::reg::RealReg;
use crate::machinst::vcode::VCode;
use crate::machinst::MachInst;
use crate::regalloc::apply::{apply_assignment, Loc};
use crate::regalloc::liveness::{analyze, Analysis, LiveInterval};
use crate::regalloc::{MachineEnv, RegAllocResult};
use crate::result::CodegenResult;
use std::collections::BinaryHeap;

/// Limit on total evictions, to bound the backtracking search.
const EVICTION_BUDGET: usize = 10_000;

#[derive(PartialEq, Eq)]
struct QueueEntry {
    priority: u64,
    vreg: usize,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // Max-heap on priority; ties broken toward the lower vreg index
        // for determinism.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.vreg.cmp(&self.vreg))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Run the backtracking allocator over `vcode`.
pub fn run_backtracking<M: ABIMachineSpec>(
    vcode: &VCode<M>,
    env: &MachineEnv,
) -> CodegenResult<RegAllocResult> {
    let analysis = analyze(vcode);
    let mut assignment: Vec<Option<Loc>> = vec![None; analysis.num_vregs];
    let mut num_spillslots = 0usize;

    // Coalescing hints from move instructions: prefer to give a move's
    // destination the same register as its source (and vice versa).
    let mut hints: FxHashMap<usize, usize> = FxHashMap::default();
    for i in 0..vcode.num_insts() as u32 {
        if let Some((dst, src)) = vcode.get_inst(i).is_move() {
            if let (Some(d), Some(s)) = (dst.to_reg().as_virtual(), src.as_virtual()) {
                hints.entry(d.index()).or_insert(s.index());
                hints.entry(s.index()).or_insert(d.index());
            }
        }
    }

    let priority = |v: usize| -> u64 {
        let interval = analysis.intervals[v].unwrap();
        let length = u64::from(interval.end - interval.start).max(1);
        // Short, frequently-used intervals first.
        (u64::from(analysis.weights[v]) << 20) / length
    };

    let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
    for v in 0..analysis.num_vregs {
        if analysis.intervals[v].is_some() {
            queue.push(QueueEntry {
                priority: priority(v),
                vreg: v,
            });
        }
    }

    let mut evictions = 0usize;

    while let Some(QueueEntry { vreg: v, .. }) = queue.pop() {
        if assignment[v].is_some() {
            // Re-queued stale entry.
            continue;
        }
        let interval = analysis.intervals[v].unwrap();

        // Candidate order: hinted register first, then preference order
        // adapted to call-crossing.
        let hinted: Option<RealReg> = hints.get(&v).and_then(|&h| match assignment[h] {
            Some(Loc::Reg(r)) if r.class() == analysis.classes[v] => Some(r),
            _ => None,
        });
        let crosses_call = analysis.crosses_any_call(&interval);
        let mut candidates: Vec<RealReg> = Vec::new();
        if let Some(h) = hinted {
            candidates.push(h);
        }
        let class_regs = env.regs_in_class(analysis.classes[v]);
        let (first, second): (Vec<_>, Vec<_>) = class_regs
            .iter()
            .copied()
            .partition(|&r| env.is_callee_saved(r) == crosses_call);
        candidates.extend(first);
        candidates.extend(second);

        let mut assigned = false;

        // First pass: a register with no conflicts at all.
        for &reg in &candidates {
            if hard_conflict(&analysis, &interval, reg) {
                continue;
            }
            if conflicting_vregs(&analysis, &assignment, v, &interval, reg).is_empty() {
                trace!("backtracking: {} -> {:?}", v, reg);
                assignment[v] = Some(Loc::Reg(reg));
                assigned = true;
                break;
            }
        }

        // Second pass: evict lower-priority holders and retry.
        if !assigned && evictions < EVICTION_BUDGET {
            let my_priority = priority(v);
            let mut best: Option<(RealReg, Vec<usize>, u64)> = None;
            for &reg in &candidates {
                if hard_conflict(&analysis, &interval, reg) {
                    continue;
                }
                let conflicts = conflicting_vregs(&analysis, &assignment, v, &interval, reg);
                let total: u64 = conflicts.iter().map(|&c| priority(c)).sum();
                if conflicts.iter().all(|&c| priority(c) < my_priority) {
                    match &best {
                        Some((_, _, best_total)) if *best_total <= total => {}
                        _ => best = Some((reg, conflicts, total)),
                    }
                }
            }
            if let Some((reg, conflicts, _)) = best {
                for c in conflicts {
                    trace!("backtracking: evicting {} from {:?}", c, reg);
                    assignment[c] = None;
                    queue.push(QueueEntry {
                        priority: priority(c),
                        vreg: c,
                    });
                    evictions += 1;
                }
                assignment[v] = Some(Loc::Reg(reg));
                assigned = true;
            }
        }

        // Last resort: spill. Rematerializable vregs replay their
        // defining instruction at uses instead of reloading (the shared
        // application pass checks `remat_def`).
        if !assigned {
            trace!(
                "backtracking: spilling {} (remat: {})",
                v,
                analysis.remat_def[v].is_some()
            );
            assignment[v] = Some(Loc::Slot(SpillSlot(num_spillslots as u32)));
            num_spillslots += 1;
        }
    }

    apply_assignment(vcode, &analysis, &assignment, env, num_spillslots)
}

/// Conflicts with fixed reservations or call clobbers cannot be resolved
/// by eviction.
fn hard_conflict(analysis: &Analysis, interval: &LiveInterval, reg: RealReg) -> bool {
    analysis.overlaps_reservation(interval, reg) || analysis.crosses_clobber_of(interval, reg)
}

/// The currently-assigned vregs whose intervals overlap `interval` in
/// `reg`.
fn conflicting_vregs(
    analysis: &Analysis,
    assignment: &[Option<Loc>],
    v: usize,
    interval: &LiveInterval,
    reg: RealReg,
) -> Vec<usize> {
    let mut out = vec![];
    for other in 0..analysis.num_vregs {
        if other == v {
            continue;
        }
        if assignment[other] != Some(Loc::Reg(reg)) {
            continue;
        }
        if let Some(other_interval) = analysis.intervals[other] {
            if interval.overlaps(&other_interval) {
                out.push(other);
            }
        }
    }
    out
}
