//! The machine environment seen by the register allocator: which physical
//! registers exist, which are allocatable, and in which preference order.

use crate::machinst::reg::{RealReg, RegClass};

/// A static description of the allocatable register file.
///
/// Each backend builds one of these once; it is shared by reference across
/// all compilations. The preference order matters: registers earlier in
/// each list are tried first, so caller-saved registers should come first
/// for leaf-friendly allocation, with callee-saved registers as a later
/// resort.
#[derive(Clone, Debug)]
pub struct MachineEnv {
    /// Allocatable integer registers, in preference order.
    pub int_regs: Vec<RealReg>,
    /// Allocatable float/vector registers, in preference order.
    pub float_regs: Vec<RealReg>,
    /// The subset of registers preserved across calls by the callee.
    pub callee_saved: Vec<RealReg>,
    /// Two spill temporaries per class, excluded from allocation, used to
    /// stage reloads and stores of spilled values around instructions.
    pub spilltmps: [[RealReg; 2]; 2],
}

impl MachineEnv {
    /// The allocatable registers of the given class, in preference order.
    pub fn regs_in_class(&self, class: RegClass) -> &[RealReg] {
        match class {
            RegClass::Int => &self.int_regs,
            RegClass::Float => &self.float_regs,
        }
    }

    /// Is the given register preserved across calls?
    pub fn is_callee_saved(&self, reg: RealReg) -> bool {
        self.callee_saved.contains(&reg)
    }

    /// The spill temporaries for a class.
    pub fn spilltmps_for(&self, class: RegClass) -> &[RealReg; 2] {
        &self.spilltmps[class.index()]
    }
}
