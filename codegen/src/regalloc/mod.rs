//! Register allocation.
//!
//! Two allocators are provided over the same input (a `VCode` whose
//! instructions expose their operands through `OperandCollector`) and the
//! same output contract (`RegAllocResult`):
//!
//! - a linear-scan allocator: fast, reasonable quality;
//! - a backtracking allocator: priority-ordered assignment with eviction
//!   and rematerialization, better quality on high register pressure.
//!
//! Both produce, per instruction, a mapping from virtual registers to the
//! physical register holding them at that instruction, plus a list of
//! *edits* (moves, spills, reloads) to apply at program points between
//! instructions. A post-allocation checker verifies the result
//! symbolically.

mod apply;
pub mod checker;
pub mod env;
pub mod linear;
pub mod liveness;
pub mod solver;

pub use apply::Loc;

pub use checker::verify_allocation;
pub use env::MachineEnv;
pub use linear::run_linear_scan;
pub use solver::run_backtracking;

use crate::ir::Type;
use crate::machinst::abi::SpillSlot;
use crate::machinst::reg::{RealReg, RegMapper, VirtualReg};
use smallvec::SmallVec;

/// Which allocator to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Single-pass linear scan.
    LinearScan,
    /// Backtracking allocator with eviction and rematerialization.
    Backtracking,
}

/// An edit to apply between instructions.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    /// Move a value between two physical registers.
    Move {
        /// Source.
        from: RealReg,
        /// Destination.
        to: RealReg,
        /// The type to move (determines width).
        ty: Type,
    },
    /// Store a register to a spill slot.
    Spill {
        /// Source register.
        from: RealReg,
        /// Destination slot.
        to_slot: SpillSlot,
        /// The type to store.
        ty: Type,
    },
    /// Load a spill slot into a register.
    Reload {
        /// Source slot.
        from_slot: SpillSlot,
        /// Destination register.
        to: RealReg,
        /// The type to load.
        ty: Type,
    },
    /// Recompute a cheap, pure definition directly into a register
    /// instead of reloading it from a slot.
    Remat {
        /// The defining instruction to replay.
        def_inst: u32,
        /// The virtual register it defines.
        vreg: VirtualReg,
        /// The register to define into.
        to: RealReg,
    },
}

/// A point at which an edit applies: before or after an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProgPoint {
    /// Instruction index in the VCode's flat instruction array.
    pub inst: u32,
    /// 0 = before the instruction, 1 = after.
    pub side: u8,
}

impl ProgPoint {
    /// The point just before `inst`.
    pub fn before(inst: u32) -> Self {
        Self { inst, side: 0 }
    }

    /// The point just after `inst`.
    pub fn after(inst: u32) -> Self {
        Self { inst, side: 1 }
    }
}

/// The output of register allocation.
pub struct RegAllocResult {
    /// Per instruction, the mapping of virtual registers to physical
    /// registers in effect at that instruction.
    pub inst_allocs: Vec<SmallVec<[(VirtualReg, RealReg); 4]>>,
    /// Edits to apply at program points, sorted by point.
    pub edits: Vec<(ProgPoint, Edit)>,
    /// Number of spill slots used, in word units.
    pub num_spillslots: usize,
    /// All physical registers written anywhere in the function, for
    /// callee-save computation.
    pub clobbered: Vec<RealReg>,
}

impl RegAllocResult {
    /// The allocation map for one instruction, usable as a `RegMapper`.
    pub fn mapper(&self, inst: u32) -> InstMapper {
        InstMapper(&self.inst_allocs[inst as usize])
    }

    /// The edits to apply at the given program point.
    pub fn edits_at(&self, point: ProgPoint) -> impl Iterator<Item = &Edit> {
        // The edit list is sorted; a binary search finds the range.
        let start = self.edits.partition_point(|(p, _)| *p < point);
        self.edits[start..]
            .iter()
            .take_while(move |(p, _)| *p == point)
            .map(|(_, e)| e)
    }
}

/// Maps the virtual registers of one instruction to their allocations.
pub struct InstMapper<'a>(&'a [(VirtualReg, RealReg)]);

impl<'a> InstMapper<'a> {
    /// Build a mapper over an explicit pair list.
    pub fn from_pairs(pairs: &'a [(VirtualReg, RealReg)]) -> Self {
        Self(pairs)
    }
}

impl<'a> RegMapper for InstMapper<'a> {
    fn get(&self, vreg: VirtualReg) -> Option<RealReg> {
        self.0
            .iter()
            .find(|(v, _)| *v == vreg)
            .map(|(_, r)| *r)
    }
}
