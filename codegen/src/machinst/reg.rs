//! Registers: virtual and real, and the operand-collection interface
//! between machine instructions and the register allocator.

use core::fmt;
use smallvec::SmallVec;

/// The class of a register: which register file it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    /// General-purpose (integer) registers.
    Int,
    /// Floating-point / vector registers.
    Float,
}

impl RegClass {
    /// Dense index for per-class tables.
    pub fn index(self) -> usize {
        match self {
            Self::Int => 0,
            Self::Float => 1,
        }
    }
}

/// A real (physical) register known to the target, identified by its class
/// and hardware encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealReg {
    hw_enc: u8,
    class: RegClass,
}

impl RealReg {
    /// Create a real register from a hardware encoding.
    pub const fn new(class: RegClass, hw_enc: u8) -> Self {
        Self { hw_enc, class }
    }

    /// The hardware encoding, as used in instruction encodings.
    pub fn hw_enc(self) -> u8 {
        self.hw_enc
    }

    /// The register class.
    pub fn class(self) -> RegClass {
        self.class
    }
}

impl fmt::Debug for RealReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.class {
            RegClass::Int => write!(f, "r{}", self.hw_enc),
            RegClass::Float => write!(f, "f{}", self.hw_enc),
        }
    }
}

/// A virtual register, densely numbered from zero within one function,
/// partitioned by class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualReg {
    index: u32,
    class: RegClass,
}

impl VirtualReg {
    /// Create a virtual register with the given index.
    pub fn new(class: RegClass, index: u32) -> Self {
        Self { index, class }
    }

    /// The dense index of this vreg.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// The register class.
    pub fn class(self) -> RegClass {
        self.class
    }
}

impl fmt::Debug for VirtualReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.class {
            RegClass::Int => write!(f, "%i{}", self.index),
            RegClass::Float => write!(f, "%f{}", self.index),
        }
    }
}

/// A register, either virtual (pre-allocation) or real (post-allocation,
/// or a pinned ABI register such as SP).
///
/// Machine instruction variants store operands as `Reg` throughout;
/// register allocation rewrites the virtual ones in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    /// A virtual register.
    Virtual(VirtualReg),
    /// A real register.
    Real(RealReg),
}

impl Reg {
    /// Get the class of this register.
    pub fn class(self) -> RegClass {
        match self {
            Self::Virtual(v) => v.class(),
            Self::Real(r) => r.class(),
        }
    }

    /// Is this a virtual register?
    pub fn is_virtual(self) -> bool {
        matches!(self, Self::Virtual(..))
    }

    /// Is this a real register?
    pub fn is_real(self) -> bool {
        matches!(self, Self::Real(..))
    }

    /// Get this as a virtual register, if it is one.
    pub fn as_virtual(self) -> Option<VirtualReg> {
        match self {
            Self::Virtual(v) => Some(v),
            _ => None,
        }
    }

    /// Get this as a real register, if it is one.
    pub fn to_real_reg(self) -> Option<RealReg> {
        match self {
            Self::Real(r) => Some(r),
            _ => None,
        }
    }
}

impl From<RealReg> for Reg {
    fn from(r: RealReg) -> Self {
        Self::Real(r)
    }
}

impl From<VirtualReg> for Reg {
    fn from(v: VirtualReg) -> Self {
        Self::Virtual(v)
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Virtual(v) => v.fmt(f),
            Self::Real(r) => r.fmt(f),
        }
    }
}

/// A newtype wrapper around a register that is written by an instruction.
///
/// Temporaries and instruction destinations must be created as `Writable`,
/// making every write explicit in the instruction constructors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Writable<T> {
    reg: T,
}

impl<T: Copy> Writable<T> {
    /// Explicitly construct a `Writable<T>` from a `T`.
    pub fn from_reg(reg: T) -> Self {
        Self { reg }
    }

    /// Get the underlying register.
    pub fn to_reg(self) -> T {
        self.reg
    }

    /// Map the underlying register to another type or value.
    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> Writable<U> {
        Writable { reg: f(self.reg) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "w:{:?}", self.reg)
    }
}

/// The role of a collected operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// The operand is read.
    Use,
    /// The operand is written.
    Def,
    /// The operand is read and written.
    Mod,
}

/// The timing of a collected operand within its instruction.
///
/// Uses normally happen `Early` (before any write) and defs `Late`
/// (after all reads); the opposite markings pin down operands that must
/// not share a register with the other half of the instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandPos {
    /// Before the instruction writes any result.
    Early,
    /// After the instruction has read all inputs.
    Late,
}

/// A placement constraint on an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandConstraint {
    /// Any register of the operand's class.
    Any,
    /// Exactly this physical register.
    FixedReg(RealReg),
    /// Reuse the register of the use operand with the given collect-order
    /// index (two-address forms).
    Reuse(usize),
}

/// One collected operand: a virtual register together with its role,
/// timing and constraint.
#[derive(Clone, Copy, Debug)]
pub struct Operand {
    /// The virtual register.
    pub vreg: VirtualReg,
    /// Read, write, or both.
    pub kind: OperandKind,
    /// Early or late.
    pub pos: OperandPos,
    /// Register-placement constraint.
    pub constraint: OperandConstraint,
}

/// Collects the operands of one machine instruction.
///
/// This view of an instruction is the sole interface between machine
/// backends and the register allocator: `MachInst::get_operands`
/// enumerates every register the instruction touches, with its role and
/// constraints. Real registers named directly by an instruction are
/// reported as clobbers/fixed so that the allocator keeps out of their
/// way, but are never themselves allocated.
#[derive(Default)]
pub struct OperandCollector {
    /// Virtual-register operands in collection order.
    pub operands: SmallVec<[Operand; 8]>,
    /// Real registers the instruction writes outside of the operand list
    /// (call clobbers, implicit result registers).
    pub clobbers: SmallVec<[RealReg; 8]>,
    /// Real registers the instruction reads directly (ABI argument
    /// registers at calls).
    pub fixed_uses: SmallVec<[RealReg; 8]>,
}

impl OperandCollector {
    /// Start a fresh collection.
    pub fn new() -> Self {
        Default::default()
    }

    fn push(&mut self, reg: Reg, kind: OperandKind, pos: OperandPos, constraint: OperandConstraint) {
        match reg {
            Reg::Virtual(vreg) => self.operands.push(Operand {
                vreg,
                kind,
                pos,
                constraint,
            }),
            Reg::Real(rreg) => match kind {
                // A directly-named real register: record the read or
                // write so liveness keeps it intact, but there is nothing
                // to allocate.
                OperandKind::Use => self.fixed_uses.push(rreg),
                OperandKind::Def | OperandKind::Mod => self.clobbers.push(rreg),
            },
        }
    }

    /// An ordinary register read.
    pub fn reg_use(&mut self, reg: Reg) {
        self.push(reg, OperandKind::Use, OperandPos::Early, OperandConstraint::Any);
    }

    /// A register read that must remain live until the instruction's
    /// writes happen.
    pub fn reg_late_use(&mut self, reg: Reg) {
        self.push(reg, OperandKind::Use, OperandPos::Late, OperandConstraint::Any);
    }

    /// An ordinary register write.
    pub fn reg_def(&mut self, reg: Writable<Reg>) {
        self.push(
            reg.to_reg(),
            OperandKind::Def,
            OperandPos::Late,
            OperandConstraint::Any,
        );
    }

    /// A register write that happens before all reads are complete, so the
    /// destination must not alias any input.
    pub fn reg_early_def(&mut self, reg: Writable<Reg>) {
        self.push(
            reg.to_reg(),
            OperandKind::Def,
            OperandPos::Early,
            OperandConstraint::Any,
        );
    }

    /// A read-modify-write operand.
    pub fn reg_mod(&mut self, reg: Writable<Reg>) {
        self.push(
            reg.to_reg(),
            OperandKind::Mod,
            OperandPos::Early,
            OperandConstraint::Any,
        );
    }

    /// A read pinned to a specific physical register.
    pub fn reg_fixed_use(&mut self, reg: Reg, rreg: RealReg) {
        self.push(
            reg,
            OperandKind::Use,
            OperandPos::Early,
            OperandConstraint::FixedReg(rreg),
        );
    }

    /// A write pinned to a specific physical register.
    pub fn reg_fixed_def(&mut self, reg: Writable<Reg>, rreg: RealReg) {
        self.push(
            reg.to_reg(),
            OperandKind::Def,
            OperandPos::Late,
            OperandConstraint::FixedReg(rreg),
        );
    }

    /// A write that must share its register with the use operand collected
    /// at index `idx` (two-address forms).
    pub fn reg_reuse_def(&mut self, reg: Writable<Reg>, idx: usize) {
        self.push(
            reg.to_reg(),
            OperandKind::Def,
            OperandPos::Late,
            OperandConstraint::Reuse(idx),
        );
    }

    /// Real registers clobbered wholesale (calls).
    pub fn reg_clobbers(&mut self, regs: &[RealReg]) {
        self.clobbers.extend(regs.iter().copied());
    }
}

/// Maps virtual registers to their allocations when rewriting an
/// instruction after register allocation.
pub trait RegMapper {
    /// Get the allocation for `vreg`, if it was allocated at this
    /// instruction.
    fn get(&self, vreg: VirtualReg) -> Option<RealReg>;
}

/// Rewrite a single register field in place.
pub fn map_reg<RM: RegMapper + ?Sized>(mapper: &RM, reg: &mut Reg) {
    if let Reg::Virtual(vreg) = *reg {
        if let Some(rreg) = mapper.get(vreg) {
            *reg = Reg::Real(rreg);
        }
    }
}

/// Rewrite a writable register field in place.
pub fn map_writable<RM: RegMapper + ?Sized>(mapper: &RM, reg: &mut Writable<Reg>) {
    let mut r = reg.to_reg();
    map_reg(mapper, &mut r);
    *reg = Writable::from_reg(r);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_basics() {
        let v = VirtualReg::new(RegClass::Int, 42);
        let r = RealReg::new(RegClass::Float, 7);
        let rv: Reg = v.into();
        let rr: Reg = r.into();
        assert!(rv.is_virtual());
        assert!(rr.is_real());
        assert_eq!(rv.class(), RegClass::Int);
        assert_eq!(rr.class(), RegClass::Float);
        assert_eq!(rr.to_real_reg().unwrap().hw_enc(), 7);
        assert_eq!(rv.as_virtual().unwrap().index(), 42);
    }

    #[test]
    fn collector_partitions_real_and_virtual() {
        let mut coll = OperandCollector::new();
        let v0: Reg = VirtualReg::new(RegClass::Int, 0).into();
        let v1: Reg = VirtualReg::new(RegClass::Int, 1).into();
        let x0 = RealReg::new(RegClass::Int, 0);

        coll.reg_use(v0);
        coll.reg_def(Writable::from_reg(v1));
        coll.reg_use(Reg::Real(x0));
        coll.reg_fixed_def(Writable::from_reg(v1), x0);

        assert_eq!(coll.operands.len(), 3);
        assert_eq!(coll.fixed_uses.len(), 1);
        assert!(matches!(
            coll.operands[2].constraint,
            OperandConstraint::FixedReg(r) if r == x0
        ));
    }
}
