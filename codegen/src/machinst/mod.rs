//! This module exposes the machine-specific backend definition pieces.
//!
//! The `MachInst` trait defines the interface for a target's machine
//! instruction type: how its register operands are collected for the
//! allocator, how moves and jumps are synthesized, and (through
//! `MachInstEmit`) how it is encoded into a `MachBuffer`.
//!
//! The compilation pipeline for one function is:
//!
//! ```plain
//!     ir::Function           (SSA IR)
//!         |
//!         | [lower]
//!         v
//!     VCode<MachInst>        (machine instructions on virtual registers)
//!         |
//!         | [regalloc]
//!         v
//!     VCode<MachInst>        (machine instructions on real registers)
//!         |
//!         | [emit]
//!         v
//!     MachBufferFinalized    (machine code, relocations, traps)
//! ```

use crate::binemit::CodeOffset;
use crate::ir::Type;
use core::fmt::Debug;

pub mod abi;
pub mod buffer;
pub mod compile;
pub mod lower;
pub mod reg;
pub mod valueregs;
pub mod vcode;

pub use abi::*;
pub use buffer::*;
pub use lower::*;
pub use reg::*;
pub use valueregs::*;
pub use vcode::*;

/// The result of classifying an instruction as a terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachTerminator {
    /// Not a terminator.
    None,
    /// A return instruction.
    Ret,
    /// A tail call: tears down the frame itself.
    RetCall,
    /// An unconditional branch.
    Uncond,
    /// A conditional branch.
    Cond,
    /// An indirect branch (jump table).
    Indirect,
}

impl MachTerminator {
    /// Is this a terminator at all?
    pub fn is_term(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A machine instruction.
pub trait MachInst: Clone + Debug {
    /// The label-use kinds (PC-relative field formats) this instruction
    /// set emits.
    type LabelUse: MachInstLabelUse;

    /// Report every register this instruction touches.
    fn get_operands(&self, collector: &mut OperandCollector);

    /// Rewrite virtual registers to their allocations, in place.
    fn map_regs(&mut self, mapper: &dyn RegMapper);

    /// If this is a simple register-to-register move, return the
    /// (destination, source) pair.
    fn is_move(&self) -> Option<(Writable<Reg>, Reg)>;

    /// Classify this instruction as a terminator.
    fn is_term(&self) -> MachTerminator;

    /// Generate a register-to-register move of the given type.
    fn gen_move(to: Writable<Reg>, from: Reg, ty: Type) -> Self;

    /// Generate an unconditional jump to a label.
    fn gen_jump(target: MachLabel) -> Self;

    /// Generate the return pseudo-instruction. The emission driver
    /// expands this into the full epilogue.
    fn gen_ret() -> Self;

    /// An upper bound on the encoded size of any single instruction, used
    /// to decide when constant/veneer islands must be emitted.
    fn worst_case_size() -> CodeOffset;
}

/// State carried between emissions of one instruction sequence.
///
/// Backends keep whatever they need here (frame layout for stack-relative
/// addressing, pending traps, etc.).
pub trait MachInstEmitState: Default + Clone {
    /// Record the final frame layout before emission begins.
    fn set_frame_layout(&mut self, _frame: FrameLayout) {}
}

impl MachInstEmitState for () {}

/// A machine instruction that knows how to emit itself.
pub trait MachInstEmit: MachInst {
    /// Persistent state carried across instructions during emission.
    type State: MachInstEmitState;

    /// Emit the instruction into the buffer.
    fn emit(&self, sink: &mut MachBuffer<Self>, state: &mut Self::State);

    /// Pretty-print the instruction for diagnostics.
    fn pretty_print(&self, state: &mut Self::State) -> String;
}
