//! This module defines aarch64-specific machine instruction types.

use crate::binemit::CodeOffset;
use crate::ir::{ExternalName, TrapCode, Type};
use crate::ir::types;
use crate::machinst::buffer::{MachInstLabelUse, MachLabel};
use crate::machinst::reg::{
    map_reg, map_writable, OperandCollector, RealReg, Reg, RegClass, RegMapper, Writable,
};
use crate::machinst::{MachInst, MachTerminator};
use smallvec::{smallvec, SmallVec};

pub mod args;
pub use self::args::*;
pub mod imms;
pub use self::imms::*;
pub mod regs;
pub use self::regs::*;
pub mod emit;
pub use self::emit::*;

#[cfg(test)]
mod emit_tests;

//=============================================================================
// Instructions (top level): definition

/// Supplementary information attached to a direct call.
#[derive(Clone, Debug)]
pub struct CallInfo {
    /// The name being called.
    pub dest: ExternalName,
    /// Argument registers read by the call.
    pub uses: SmallVec<[RealReg; 8]>,
    /// Return registers written by the call.
    pub defs: SmallVec<[RealReg; 8]>,
    /// Everything else the callee may write.
    pub clobbers: SmallVec<[RealReg; 8]>,
}

/// Supplementary information attached to an indirect call.
#[derive(Clone, Debug)]
pub struct CallIndInfo {
    /// The register holding the code pointer.
    pub rn: Reg,
    /// Argument registers read by the call.
    pub uses: SmallVec<[RealReg; 8]>,
    /// Return registers written by the call.
    pub defs: SmallVec<[RealReg; 8]>,
    /// Everything else the callee may write.
    pub clobbers: SmallVec<[RealReg; 8]>,
}

/// Supplementary information attached to a tail call.
#[derive(Clone, Debug)]
pub struct TailCallInfo {
    /// The name being tail-called.
    pub dest: ExternalName,
    /// Argument registers live at the jump.
    pub uses: SmallVec<[RealReg; 8]>,
}

/// An addressing mode for load/store pairs.
#[derive(Clone, Copy, Debug)]
pub enum PairAMode {
    /// Base plus signed, scaled 7-bit offset.
    SignedOffset(Reg, SImm7Scaled),
    /// Pre-indexed: base is updated before the access.
    PreIndexed(Reg, SImm7Scaled),
    /// Post-indexed: base is updated after the access.
    PostIndexed(Reg, SImm7Scaled),
}

/// A machine instruction.
#[derive(Clone, Debug)]
pub enum Inst {
    /// A no-op of one instruction (4 bytes).
    Nop4,

    /// An ALU operation with two register sources and a register
    /// destination.
    AluRRR {
        /// The operation.
        alu_op: ALUOp,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// First source.
        rn: Reg,
        /// Second source.
        rm: Reg,
    },

    /// A three-source ALU operation (madd/msub).
    AluRRRR {
        /// The operation.
        alu_op: ALUOp3,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Multiplicand.
        rn: Reg,
        /// Multiplier.
        rm: Reg,
        /// Addend.
        ra: Reg,
    },

    /// An ALU operation with a register source and a 12-bit immediate.
    AluRRImm12 {
        /// The operation: Add, Sub, AddS or SubS.
        alu_op: ALUOp,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// The immediate.
        imm12: Imm12,
    },

    /// An ALU operation with a register source and a logical immediate.
    AluRRImmLogic {
        /// The operation: And, Orr or Eor.
        alu_op: ALUOp,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// The immediate.
        imml: ImmLogic,
    },

    /// An ALU operation with a register source and a shift-amount
    /// immediate.
    AluRRImmShift {
        /// The operation: Lsl, Lsr or Asr.
        alu_op: ALUOp,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// The shift amount.
        immshift: ImmShift,
    },

    /// A two-register bit operation (rbit, clz).
    BitRR {
        /// The operation.
        op: BitOp,
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// An unsigned (zero-extending) 8-bit load.
    ULoad8 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A signed (sign-extending) 8-bit load.
    SLoad8 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// An unsigned (zero-extending) 16-bit load.
    ULoad16 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A signed (sign-extending) 16-bit load.
    SLoad16 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// An unsigned (zero-extending) 32-bit load.
    ULoad32 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A signed (sign-extending) 32-bit load.
    SLoad32 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A 64-bit load.
    ULoad64 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },

    /// An 8-bit store.
    Store8 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },
    /// A 16-bit store.
    Store16 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },
    /// A 32-bit store.
    Store32 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },
    /// A 64-bit store.
    Store64 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },

    /// A store of a pair of X-registers.
    StoreP64 {
        /// First register.
        rt: Reg,
        /// Second register.
        rt2: Reg,
        /// Address.
        mem: PairAMode,
    },
    /// A load of a pair of X-registers.
    LoadP64 {
        /// First destination.
        rt: Writable<Reg>,
        /// Second destination.
        rt2: Writable<Reg>,
        /// Address.
        mem: PairAMode,
    },

    /// A MOV instruction (alias of ORR with the zero register).
    Mov {
        /// 32- or 64-bit form.
        size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rm: Reg,
    },

    /// A MOV to/from SP (alias of ADD with zero immediate); ORR cannot
    /// name SP.
    MovToFromSp {
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rm: Reg,
    },

    /// A MOVZ with a 16-bit immediate.
    MovZ {
        /// Destination.
        rd: Writable<Reg>,
        /// The shifted halfword.
        imm: MoveWideConst,
        /// 32- or 64-bit form.
        size: OperandSize,
    },
    /// A MOVN: move the bitwise NOT of the shifted halfword.
    MovN {
        /// Destination.
        rd: Writable<Reg>,
        /// The shifted halfword.
        imm: MoveWideConst,
        /// 32- or 64-bit form.
        size: OperandSize,
    },
    /// A MOVK: insert a halfword, keeping the other bits.
    MovK {
        /// Destination (read-modify-write).
        rd: Writable<Reg>,
        /// The shifted halfword.
        imm: MoveWideConst,
        /// 32- or 64-bit form.
        size: OperandSize,
    },

    /// A conditional select.
    CSel {
        /// Destination.
        rd: Writable<Reg>,
        /// The condition.
        cond: Cond,
        /// Value if the condition holds.
        rn: Reg,
        /// Value otherwise.
        rm: Reg,
        /// 32- or 64-bit form.
        size: OperandSize,
    },
    /// A conditional set: rd = cond ? 1 : 0 (alias of CSINC).
    CSet {
        /// Destination.
        rd: Writable<Reg>,
        /// The condition.
        cond: Cond,
    },

    /// An integer sign- or zero-extension.
    Extend {
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// Sign- rather than zero-extend?
        signed: bool,
        /// Source width.
        from_bits: u8,
        /// Destination width.
        to_bits: u8,
    },

    /// An unconditional branch.
    Jump {
        /// The target.
        dest: BranchTarget,
    },

    /// A return pseudo-instruction, expanded by the emission driver into
    /// the epilogue.
    Ret,

    /// The actual `ret` instruction, emitted by the epilogue itself.
    EpilogueRet,

    /// A machine direct call.
    Call {
        /// Call metadata.
        info: Box<CallInfo>,
    },
    /// A machine indirect call.
    CallInd {
        /// Call metadata.
        info: Box<CallIndInfo>,
    },
    /// A tail call: epilogue plus direct branch, expanded at emission
    /// using the frame layout.
    TailCall {
        /// Call metadata.
        info: Box<TailCallInfo>,
    },

    /// A two-way conditional branch. The emitter knows the fallthrough
    /// block and emits one or two instructions accordingly.
    CondBr {
        /// Target if the condition holds.
        taken: BranchTarget,
        /// Target otherwise.
        not_taken: BranchTarget,
        /// The condition.
        kind: CondBrKind,
    },

    /// A conditional trap: branch over an inline `udf` unless the
    /// condition holds.
    TrapIf {
        /// Trap when this condition holds.
        kind: CondBrKind,
        /// The trap code to record.
        trap_code: TrapCode,
    },

    /// An undefined-instruction trap.
    Udf {
        /// The trap code to record.
        trap_code: TrapCode,
    },

    /// A PC-relative address computation into a register (+/- 1 MiB).
    Adr {
        /// Destination.
        rd: Writable<Reg>,
        /// Byte offset from this instruction.
        off: i32,
    },

    /// Load the address of an external symbol: ADRP + ADD with
    /// relocations.
    LoadExtName {
        /// Destination.
        rd: Writable<Reg>,
        /// The symbol.
        name: Box<ExternalName>,
        /// Addend.
        offset: i64,
    },

    /// Compute the address described by `mem` into a register.
    LoadAddr {
        /// Destination.
        rd: Writable<Reg>,
        /// The address to materialize.
        mem: AMode,
    },

    /// A vector ALU operation, three-same form.
    VecRRR {
        /// The operation.
        alu_op: VecALUOp,
        /// Destination.
        rd: Writable<Reg>,
        /// First source.
        rn: Reg,
        /// Second source.
        rm: Reg,
        /// The vector shape.
        size: VectorSize,
    },

    /// Duplicate a general-purpose register into all vector lanes.
    VecDup {
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// The vector shape.
        size: VectorSize,
    },

    /// A scalar FP move.
    FpuMove {
        /// Register width.
        size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// A scalar FP unary operation.
    FpuRR {
        /// The operation.
        op: FPUOp1,
        /// Operand width.
        size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// A scalar FP binary operation.
    FpuRRR {
        /// The operation.
        op: FPUOp2,
        /// Operand width.
        size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// First source.
        rn: Reg,
        /// Second source.
        rm: Reg,
    },

    /// A scalar FP compare, setting flags.
    FpuCmp {
        /// Operand width.
        size: ScalarSize,
        /// First operand.
        rn: Reg,
        /// Second operand.
        rm: Reg,
    },

    /// A scalar FP round-to-integral (FRINT*).
    FpuRound {
        /// The rounding mode.
        mode: FpuRoundMode,
        /// Operand width.
        size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// A conditional select on FP registers.
    FpuCSel {
        /// Operand width.
        size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Value if the condition holds.
        rn: Reg,
        /// Value otherwise.
        rm: Reg,
        /// The condition.
        cond: Cond,
    },

    /// Float-to-integer conversion, round toward zero (FCVTZS/FCVTZU).
    FpuToInt {
        /// Signed result?
        signed: bool,
        /// Source width.
        in_size: ScalarSize,
        /// Destination width.
        out_size: OperandSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// Integer-to-float conversion (SCVTF/UCVTF).
    IntToFpu {
        /// Signed source?
        signed: bool,
        /// Source width.
        in_size: OperandSize,
        /// Destination width.
        out_size: ScalarSize,
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
    },

    /// A bit-preserving move from an X-register to an FP register.
    MovToFpu {
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// Width.
        size: ScalarSize,
    },

    /// A bit-preserving move from an FP register to an X-register.
    MovFromFpu {
        /// Destination.
        rd: Writable<Reg>,
        /// Source.
        rn: Reg,
        /// Width.
        size: ScalarSize,
    },

    /// A 32-bit FP load.
    FpuLoad32 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A 64-bit FP load.
    FpuLoad64 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A 128-bit FP/vector load.
    FpuLoad128 {
        /// Destination.
        rd: Writable<Reg>,
        /// Address.
        mem: AMode,
    },
    /// A 32-bit FP store.
    FpuStore32 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },
    /// A 64-bit FP store.
    FpuStore64 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },
    /// A 128-bit FP/vector store.
    FpuStore128 {
        /// Value to store.
        rd: Reg,
        /// Address.
        mem: AMode,
    },

    /// Load a 32-bit float constant from the literal pool.
    LoadFpuConst32 {
        /// Destination.
        rd: Writable<Reg>,
        /// The bit pattern.
        const_data: u32,
    },
    /// Load a 64-bit float constant from the literal pool.
    LoadFpuConst64 {
        /// Destination.
        rd: Writable<Reg>,
        /// The bit pattern.
        const_data: u64,
    },
    /// Load a 128-bit vector constant from the literal pool.
    LoadFpuConst128 {
        /// Destination.
        rd: Writable<Reg>,
        /// The bit pattern.
        const_data: u128,
    },

    /// A load-exclusive, optionally with acquire semantics
    /// (LDXR/LDAXR and the narrower widths).
    LoadExclusive {
        /// Access size in bits: 8, 16, 32 or 64.
        access_bits: u8,
        /// Acquire ordering?
        acquire: bool,
        /// Destination.
        rt: Writable<Reg>,
        /// Address register.
        rn: Reg,
    },
    /// A store-exclusive, optionally with release semantics
    /// (STXR/STLXR and the narrower widths).
    StoreExclusive {
        /// Access size in bits: 8, 16, 32 or 64.
        access_bits: u8,
        /// Release ordering?
        release: bool,
        /// Status output: 0 on success.
        rs: Writable<Reg>,
        /// Value to store.
        rt: Reg,
        /// Address register.
        rn: Reg,
    },
}

impl Inst {
    /// Create instructions loading a 64-bit constant into a register,
    /// using the shortest MOVZ/MOVN/MOVK sequence.
    pub fn load_constant(rd: Writable<Reg>, value: u64) -> SmallVec<[Inst; 4]> {
        if let Some(imm) = MoveWideConst::maybe_from_u64(value) {
            // One halfword set (or zero): MOVZ.
            return smallvec![Inst::MovZ {
                rd,
                imm,
                size: OperandSize::Size64
            }];
        }
        if let Some(imm) = MoveWideConst::maybe_from_u64(!value) {
            // One halfword clear: MOVN.
            return smallvec![Inst::MovN {
                rd,
                imm,
                size: OperandSize::Size64
            }];
        }

        // Count halfwords equal to 0x0000 and 0xffff to pick the cheaper
        // of a MOVZ- or MOVN-headed chain.
        let mut zeros = 0;
        let mut ones = 0;
        for i in 0..4 {
            match (value >> (16 * i)) & 0xffff {
                0x0000 => zeros += 1,
                0xffff => ones += 1,
                _ => {}
            }
        }

        let mut insts = smallvec![];
        if ones > zeros {
            // MOVN writes !halfword, filling the rest with ones.
            let mut first = true;
            for i in 0..4u8 {
                let half = ((value >> (16 * i)) & 0xffff) as u16;
                if half == 0xffff {
                    continue;
                }
                if first {
                    insts.push(Inst::MovN {
                        rd,
                        imm: MoveWideConst::with_halfword(!half, i),
                        size: OperandSize::Size64,
                    });
                    first = false;
                } else {
                    insts.push(Inst::MovK {
                        rd,
                        imm: MoveWideConst::with_halfword(half, i),
                        size: OperandSize::Size64,
                    });
                }
            }
        } else {
            let mut first = true;
            for i in 0..4u8 {
                let half = ((value >> (16 * i)) & 0xffff) as u16;
                if half == 0 {
                    continue;
                }
                if first {
                    insts.push(Inst::MovZ {
                        rd,
                        imm: MoveWideConst::with_halfword(half, i),
                        size: OperandSize::Size64,
                    });
                    first = false;
                } else {
                    insts.push(Inst::MovK {
                        rd,
                        imm: MoveWideConst::with_halfword(half, i),
                        size: OperandSize::Size64,
                    });
                }
            }
        }
        debug_assert!(!insts.is_empty());
        insts
    }

    /// A load of the given type.
    pub fn gen_load(into: Writable<Reg>, mem: AMode, ty: Type) -> Inst {
        match ty {
            types::I8 => Inst::ULoad8 { rd: into, mem },
            types::I16 => Inst::ULoad16 { rd: into, mem },
            types::I32 => Inst::ULoad32 { rd: into, mem },
            types::I64 => Inst::ULoad64 { rd: into, mem },
            types::F32 => Inst::FpuLoad32 { rd: into, mem },
            types::F64 => Inst::FpuLoad64 { rd: into, mem },
            _ if ty.is_vector() && ty.bits() == 128 => Inst::FpuLoad128 { rd: into, mem },
            _ => panic!("unsupported load type: {}", ty),
        }
    }

    /// A store of the given type.
    pub fn gen_store(from: Reg, mem: AMode, ty: Type) -> Inst {
        match ty {
            types::I8 => Inst::Store8 { rd: from, mem },
            types::I16 => Inst::Store16 { rd: from, mem },
            types::I32 => Inst::Store32 { rd: from, mem },
            types::I64 => Inst::Store64 { rd: from, mem },
            types::F32 => Inst::FpuStore32 { rd: from, mem },
            types::F64 => Inst::FpuStore64 { rd: from, mem },
            _ if ty.is_vector() && ty.bits() == 128 => Inst::FpuStore128 { rd: from, mem },
            _ => panic!("unsupported store type: {}", ty),
        }
    }
}

fn memarg_operands(mem: &AMode, collector: &mut OperandCollector) {
    match mem {
        AMode::Unscaled(rn, ..) | AMode::UnsignedOffset(rn, ..) | AMode::RegOffset(rn, ..) => {
            collector.reg_use(*rn);
        }
        AMode::RegReg(rn, rm) => {
            collector.reg_use(*rn);
            collector.reg_use(*rm);
        }
        AMode::Label(..) | AMode::NominalSP(..) => {}
    }
}

fn memarg_map(mem: &mut AMode, mapper: &dyn RegMapper) {
    match mem {
        AMode::Unscaled(rn, ..) | AMode::UnsignedOffset(rn, ..) | AMode::RegOffset(rn, ..) => {
            map_reg(mapper, rn);
        }
        AMode::RegReg(rn, rm) => {
            map_reg(mapper, rn);
            map_reg(mapper, rm);
        }
        AMode::Label(..) | AMode::NominalSP(..) => {}
    }
}

impl MachInst for Inst {
    type LabelUse = LabelUse;

    fn get_operands(&self, collector: &mut OperandCollector) {
        match self {
            Inst::Nop4
            | Inst::Ret
            | Inst::EpilogueRet
            | Inst::Jump { .. }
            | Inst::Udf { .. } => {}
            Inst::AluRRR { rd, rn, rm, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
                collector.reg_use(*rm);
            }
            Inst::AluRRRR { rd, rn, rm, ra, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
                collector.reg_use(*rm);
                collector.reg_use(*ra);
            }
            Inst::AluRRImm12 { rd, rn, .. }
            | Inst::AluRRImmLogic { rd, rn, .. }
            | Inst::AluRRImmShift { rd, rn, .. }
            | Inst::BitRR { rd, rn, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
            }
            Inst::ULoad8 { rd, mem }
            | Inst::SLoad8 { rd, mem }
            | Inst::ULoad16 { rd, mem }
            | Inst::SLoad16 { rd, mem }
            | Inst::ULoad32 { rd, mem }
            | Inst::SLoad32 { rd, mem }
            | Inst::ULoad64 { rd, mem }
            | Inst::FpuLoad32 { rd, mem }
            | Inst::FpuLoad64 { rd, mem }
            | Inst::FpuLoad128 { rd, mem } => {
                collector.reg_def(*rd);
                memarg_operands(mem, collector);
            }
            Inst::Store8 { rd, mem }
            | Inst::Store16 { rd, mem }
            | Inst::Store32 { rd, mem }
            | Inst::Store64 { rd, mem }
            | Inst::FpuStore32 { rd, mem }
            | Inst::FpuStore64 { rd, mem }
            | Inst::FpuStore128 { rd, mem } => {
                collector.reg_use(*rd);
                memarg_operands(mem, collector);
            }
            Inst::StoreP64 { rt, rt2, .. } => {
                collector.reg_use(*rt);
                collector.reg_use(*rt2);
            }
            Inst::LoadP64 { rt, rt2, .. } => {
                collector.reg_def(*rt);
                collector.reg_def(*rt2);
            }
            Inst::Mov { rd, rm, .. } | Inst::MovToFromSp { rd, rm } => {
                collector.reg_def(*rd);
                collector.reg_use(*rm);
            }
            Inst::MovZ { rd, .. } | Inst::MovN { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::MovK { rd, .. } => {
                collector.reg_mod(*rd);
            }
            Inst::CSel { rd, rn, rm, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
                collector.reg_use(*rm);
            }
            Inst::CSet { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::Extend { rd, rn, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
            }
            Inst::Call { info } => {
                for &r in &info.uses {
                    collector.reg_fixed_use(Reg::Real(r), r);
                }
                for &r in &info.defs {
                    collector.reg_clobbers(&[r]);
                }
                collector.reg_clobbers(&info.clobbers);
            }
            Inst::CallInd { info } => {
                collector.reg_use(info.rn);
                for &r in &info.uses {
                    collector.reg_fixed_use(Reg::Real(r), r);
                }
                for &r in &info.defs {
                    collector.reg_clobbers(&[r]);
                }
                collector.reg_clobbers(&info.clobbers);
            }
            Inst::TailCall { info } => {
                for &r in &info.uses {
                    collector.reg_fixed_use(Reg::Real(r), r);
                }
            }
            Inst::CondBr { kind, .. } | Inst::TrapIf { kind, .. } => match kind {
                CondBrKind::Zero(rt) | CondBrKind::NotZero(rt) => collector.reg_use(*rt),
                CondBrKind::Cond(_) => {}
            },
            Inst::Adr { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::LoadExtName { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::LoadAddr { rd, mem } => {
                collector.reg_def(*rd);
                memarg_operands(mem, collector);
            }
            Inst::VecRRR { rd, rn, rm, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
                collector.reg_use(*rm);
            }
            Inst::VecDup { rd, rn, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
            }
            Inst::FpuMove { rd, rn, .. }
            | Inst::FpuRR { rd, rn, .. }
            | Inst::FpuRound { rd, rn, .. }
            | Inst::FpuToInt { rd, rn, .. }
            | Inst::IntToFpu { rd, rn, .. }
            | Inst::MovToFpu { rd, rn, .. }
            | Inst::MovFromFpu { rd, rn, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
            }
            Inst::FpuRRR { rd, rn, rm, .. } | Inst::FpuCSel { rd, rn, rm, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rn);
                collector.reg_use(*rm);
            }
            Inst::FpuCmp { rn, rm, .. } => {
                collector.reg_use(*rn);
                collector.reg_use(*rm);
            }
            Inst::LoadFpuConst32 { rd, .. }
            | Inst::LoadFpuConst64 { rd, .. }
            | Inst::LoadFpuConst128 { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::LoadExclusive { rt, rn, .. } => {
                collector.reg_def(*rt);
                collector.reg_use(*rn);
            }
            Inst::StoreExclusive { rs, rt, rn, .. } => {
                collector.reg_early_def(*rs);
                collector.reg_use(*rt);
                collector.reg_use(*rn);
            }
        }
    }

    fn map_regs(&mut self, mapper: &dyn RegMapper) {
        match self {
            Inst::Nop4
            | Inst::Ret
            | Inst::EpilogueRet
            | Inst::Jump { .. }
            | Inst::Udf { .. } => {}
            Inst::AluRRR { rd, rn, rm, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
                map_reg(mapper, rm);
            }
            Inst::AluRRRR { rd, rn, rm, ra, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
                map_reg(mapper, rm);
                map_reg(mapper, ra);
            }
            Inst::AluRRImm12 { rd, rn, .. }
            | Inst::AluRRImmLogic { rd, rn, .. }
            | Inst::AluRRImmShift { rd, rn, .. }
            | Inst::BitRR { rd, rn, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
            }
            Inst::ULoad8 { rd, mem }
            | Inst::SLoad8 { rd, mem }
            | Inst::ULoad16 { rd, mem }
            | Inst::SLoad16 { rd, mem }
            | Inst::ULoad32 { rd, mem }
            | Inst::SLoad32 { rd, mem }
            | Inst::ULoad64 { rd, mem }
            | Inst::FpuLoad32 { rd, mem }
            | Inst::FpuLoad64 { rd, mem }
            | Inst::FpuLoad128 { rd, mem } => {
                map_writable(mapper, rd);
                memarg_map(mem, mapper);
            }
            Inst::Store8 { rd, mem }
            | Inst::Store16 { rd, mem }
            | Inst::Store32 { rd, mem }
            | Inst::Store64 { rd, mem }
            | Inst::FpuStore32 { rd, mem }
            | Inst::FpuStore64 { rd, mem }
            | Inst::FpuStore128 { rd, mem } => {
                map_reg(mapper, rd);
                memarg_map(mem, mapper);
            }
            Inst::StoreP64 { rt, rt2, .. } => {
                map_reg(mapper, rt);
                map_reg(mapper, rt2);
            }
            Inst::LoadP64 { rt, rt2, .. } => {
                map_writable(mapper, rt);
                map_writable(mapper, rt2);
            }
            Inst::Mov { rd, rm, .. } | Inst::MovToFromSp { rd, rm } => {
                map_writable(mapper, rd);
                map_reg(mapper, rm);
            }
            Inst::MovZ { rd, .. } | Inst::MovN { rd, .. } | Inst::MovK { rd, .. } => {
                map_writable(mapper, rd);
            }
            Inst::CSel { rd, rn, rm, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
                map_reg(mapper, rm);
            }
            Inst::CSet { rd, .. } => {
                map_writable(mapper, rd);
            }
            Inst::Extend { rd, rn, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
            }
            Inst::Call { .. } => {}
            Inst::CallInd { info } => {
                map_reg(mapper, &mut info.rn);
            }
            Inst::TailCall { .. } => {}
            Inst::CondBr { kind, .. } | Inst::TrapIf { kind, .. } => match kind {
                CondBrKind::Zero(rt) | CondBrKind::NotZero(rt) => map_reg(mapper, rt),
                CondBrKind::Cond(_) => {}
            },
            Inst::Adr { rd, .. } => map_writable(mapper, rd),
            Inst::LoadExtName { rd, .. } => map_writable(mapper, rd),
            Inst::LoadAddr { rd, mem } => {
                map_writable(mapper, rd);
                memarg_map(mem, mapper);
            }
            Inst::VecRRR { rd, rn, rm, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
                map_reg(mapper, rm);
            }
            Inst::VecDup { rd, rn, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
            }
            Inst::FpuMove { rd, rn, .. }
            | Inst::FpuRR { rd, rn, .. }
            | Inst::FpuRound { rd, rn, .. }
            | Inst::FpuToInt { rd, rn, .. }
            | Inst::IntToFpu { rd, rn, .. }
            | Inst::MovToFpu { rd, rn, .. }
            | Inst::MovFromFpu { rd, rn, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
            }
            Inst::FpuRRR { rd, rn, rm, .. } | Inst::FpuCSel { rd, rn, rm, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rn);
                map_reg(mapper, rm);
            }
            Inst::FpuCmp { rn, rm, .. } => {
                map_reg(mapper, rn);
                map_reg(mapper, rm);
            }
            Inst::LoadFpuConst32 { rd, .. }
            | Inst::LoadFpuConst64 { rd, .. }
            | Inst::LoadFpuConst128 { rd, .. } => {
                map_writable(mapper, rd);
            }
            Inst::LoadExclusive { rt, rn, .. } => {
                map_writable(mapper, rt);
                map_reg(mapper, rn);
            }
            Inst::StoreExclusive { rs, rt, rn, .. } => {
                map_writable(mapper, rs);
                map_reg(mapper, rt);
                map_reg(mapper, rn);
            }
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::Mov {
                size: OperandSize::Size64,
                rd,
                rm,
            } => Some((rd, rm)),
            &Inst::FpuMove { rd, rn, .. } => Some((rd, rn)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Ret | Inst::EpilogueRet => MachTerminator::Ret,
            Inst::TailCall { .. } => MachTerminator::RetCall,
            Inst::Jump { .. } => MachTerminator::Uncond,
            Inst::CondBr { .. } => MachTerminator::Cond,
            Inst::Udf { .. } => MachTerminator::Uncond,
            _ => MachTerminator::None,
        }
    }

    fn gen_move(to: Writable<Reg>, from: Reg, ty: Type) -> Inst {
        if ty.is_float() || ty.is_vector() {
            Inst::FpuMove {
                size: if ty.bits() <= 32 {
                    ScalarSize::Size32
                } else {
                    ScalarSize::Size64
                },
                rd: to,
                rn: from,
            }
        } else {
            Inst::Mov {
                size: OperandSize::Size64,
                rd: to,
                rm: from,
            }
        }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::Jump {
            dest: BranchTarget::Label(target),
        }
    }

    fn gen_ret() -> Inst {
        Inst::Ret
    }

    fn worst_case_size() -> CodeOffset {
        // LoadAddr in the worst case: a 4-instruction constant sequence
        // plus an add; calls and TailCall expansions stay below this.
        44
    }
}

//=============================================================================
// Label uses: PC-relative field formats this ISA emits.

/// A use of a label / PC-relative offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// 19-bit branch offset (conditional branches, CBZ/CBNZ, LDR
    /// literal). PC-rel, offset is imm << 2. Signed, +/- 1 MiB.
    Branch19,
    /// 26-bit branch offset (unconditional branches, BL). PC-rel, offset
    /// is imm << 2. Signed, +/- 128 MiB.
    Branch26,
    /// 19-bit offset for LDR (literal): same range and shift as
    /// Branch19, patched into bits 23..5.
    Ldr19,
    /// ADR: 21-bit signed byte offset, split between immlo (bits 30-29)
    /// and immhi (bits 23-5).
    Adr21,
}

impl MachInstLabelUse for LabelUse {
    /// Alignment for veneer code.
    const ALIGN: CodeOffset = 4;

    fn max_pos_range(self) -> CodeOffset {
        match self {
            // 19-bit signed immediate of instructions (imm << 2).
            LabelUse::Branch19 | LabelUse::Ldr19 => (1 << 20) - 1,
            LabelUse::Branch26 => (1 << 27) - 1,
            LabelUse::Adr21 => (1 << 20) - 1,
        }
    }

    fn max_neg_range(self) -> CodeOffset {
        match self {
            LabelUse::Branch19 | LabelUse::Ldr19 => 1 << 20,
            LabelUse::Branch26 => 1 << 27,
            LabelUse::Adr21 => 1 << 20,
        }
    }

    fn patch_size(self) -> CodeOffset {
        4
    }

    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        let pc_rel = (label_offset as i64) - (use_offset as i64);
        debug_assert!(pc_rel <= i64::from(self.max_pos_range()));
        debug_assert!(pc_rel >= -i64::from(self.max_neg_range()));
        let insn_word = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let pc_rel = pc_rel as u32;
        let insn_word = match self {
            LabelUse::Branch19 | LabelUse::Ldr19 => {
                debug_assert_eq!(pc_rel & 3, 0);
                insn_word | (((pc_rel >> 2) & 0x7ffff) << 5)
            }
            LabelUse::Branch26 => {
                debug_assert_eq!(pc_rel & 3, 0);
                insn_word | ((pc_rel >> 2) & 0x03ff_ffff)
            }
            LabelUse::Adr21 => {
                let immlo = pc_rel & 3;
                let immhi = (pc_rel >> 2) & 0x7ffff;
                insn_word | (immlo << 29) | (immhi << 5)
            }
        };
        buffer[0..4].copy_from_slice(&insn_word.to_le_bytes());
    }

    fn supports_veneer(self) -> bool {
        matches!(self, LabelUse::Branch19)
    }

    fn veneer_size(self) -> CodeOffset {
        4
    }

    fn generate_veneer(self, buffer: &mut [u8], veneer_offset: CodeOffset) -> (CodeOffset, Self) {
        match self {
            LabelUse::Branch19 => {
                // An unconditional branch with a 26-bit range; the
                // original conditional branch is patched to point here.
                let insn_word = 0b000101u32 << 26;
                buffer[0..4].copy_from_slice(&insn_word.to_le_bytes());
                (veneer_offset, LabelUse::Branch26)
            }
            _ => panic!("veneer not supported for {:?}", self),
        }
    }
}
