//! RISC-V 64 instruction definitions and binary emission.
//!
//! Instructions are encoded in the base R/I/S/B/U/J formats. The integer
//! core of RV64IM is represented; three-address register forms keep the
//! lowering rules simple.

use crate::binemit::{CodeOffset, Reloc};
use crate::ir::{ExternalName, TrapCode, Type};
use crate::machinst::abi::{FrameLayout, StackAMode};
use crate::machinst::buffer::{MachBuffer, MachInstLabelUse, MachLabel};
use crate::machinst::reg::{
    map_reg, map_writable, OperandCollector, RealReg, Reg, RegClass, RegMapper, Writable,
};
use crate::machinst::{MachInst, MachInstEmit, MachInstEmitState, MachTerminator};
use crate::regalloc::MachineEnv;
use smallvec::SmallVec;

/// An integer register by number (x0-x31).
pub fn xreg(num: u8) -> Reg {
    assert!(num < 32);
    Reg::Real(RealReg::new(RegClass::Int, num))
}

/// A writable integer register.
pub fn writable_xreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(xreg(num))
}

/// The zero register, x0.
pub fn zero_reg() -> Reg {
    xreg(0)
}

/// The return-address register, x1 (ra).
pub fn link_reg() -> Reg {
    xreg(1)
}

/// The stack pointer, x2.
pub fn stack_reg() -> Reg {
    xreg(2)
}

/// The frame pointer, x8 (s0).
pub fn fp_reg() -> Reg {
    xreg(8)
}

/// The allocatable-register environment for riscv64.
///
/// x30/x31 (t5/t6) are the spill temporaries; x0 (zero), x1 (ra),
/// x2 (sp), x3 (gp), x4 (tp) and x8 (fp) are reserved.
pub fn create_machine_env() -> MachineEnv {
    let mut int_regs = vec![];
    // Caller-saved first: a0-a7, t0-t4.
    for &enc in &[10u8, 11, 12, 13, 14, 15, 16, 17, 5, 6, 7, 28, 29] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    // Callee-saved: s1-s11.
    for &enc in &[9u8, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    let float_regs = (0..30u8).map(|x| RealReg::new(RegClass::Float, x)).collect();
    MachineEnv {
        int_regs,
        float_regs,
        callee_saved: [9u8, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect(),
        spilltmps: [
            [
                RealReg::new(RegClass::Int, 30),
                RealReg::new(RegClass::Int, 31),
            ],
            [
                RealReg::new(RegClass::Float, 30),
                RealReg::new(RegClass::Float, 31),
            ],
        ],
    }
}

/// A three-register ALU operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOpRRR {
    Add,
    Addw,
    Sub,
    Subw,
    And,
    Or,
    Xor,
    Sll,
    Sllw,
    Srl,
    Srlw,
    Sra,
    Sraw,
    Slt,
    Sltu,
    Mul,
    Mulw,
    Mulh,
    Mulhu,
    Div,
    Divw,
    Divu,
    Divuw,
    Rem,
    Remw,
    Remu,
    Remuw,
}

impl AluOpRRR {
    /// (opcode, funct3, funct7).
    fn fields(self) -> (u32, u32, u32) {
        match self {
            AluOpRRR::Add => (0x33, 0b000, 0b0000000),
            AluOpRRR::Addw => (0x3b, 0b000, 0b0000000),
            AluOpRRR::Sub => (0x33, 0b000, 0b0100000),
            AluOpRRR::Subw => (0x3b, 0b000, 0b0100000),
            AluOpRRR::And => (0x33, 0b111, 0b0000000),
            AluOpRRR::Or => (0x33, 0b110, 0b0000000),
            AluOpRRR::Xor => (0x33, 0b100, 0b0000000),
            AluOpRRR::Sll => (0x33, 0b001, 0b0000000),
            AluOpRRR::Sllw => (0x3b, 0b001, 0b0000000),
            AluOpRRR::Srl => (0x33, 0b101, 0b0000000),
            AluOpRRR::Srlw => (0x3b, 0b101, 0b0000000),
            AluOpRRR::Sra => (0x33, 0b101, 0b0100000),
            AluOpRRR::Sraw => (0x3b, 0b101, 0b0100000),
            AluOpRRR::Slt => (0x33, 0b010, 0b0000000),
            AluOpRRR::Sltu => (0x33, 0b011, 0b0000000),
            AluOpRRR::Mul => (0x33, 0b000, 0b0000001),
            AluOpRRR::Mulw => (0x3b, 0b000, 0b0000001),
            AluOpRRR::Mulh => (0x33, 0b001, 0b0000001),
            AluOpRRR::Mulhu => (0x33, 0b011, 0b0000001),
            AluOpRRR::Div => (0x33, 0b100, 0b0000001),
            AluOpRRR::Divw => (0x3b, 0b100, 0b0000001),
            AluOpRRR::Divu => (0x33, 0b101, 0b0000001),
            AluOpRRR::Divuw => (0x3b, 0b101, 0b0000001),
            AluOpRRR::Rem => (0x33, 0b110, 0b0000001),
            AluOpRRR::Remw => (0x3b, 0b110, 0b0000001),
            AluOpRRR::Remu => (0x33, 0b111, 0b0000001),
            AluOpRRR::Remuw => (0x3b, 0b111, 0b0000001),
        }
    }
}

/// A register-immediate ALU operation (I-type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOpRRI {
    Addi,
    Addiw,
    Andi,
    Ori,
    Xori,
    Slti,
    Sltiu,
    Slli,
    Srli,
    Srai,
}

impl AluOpRRI {
    /// (opcode, funct3).
    fn fields(self) -> (u32, u32) {
        match self {
            AluOpRRI::Addi => (0x13, 0b000),
            AluOpRRI::Addiw => (0x1b, 0b000),
            AluOpRRI::Andi => (0x13, 0b111),
            AluOpRRI::Ori => (0x13, 0b110),
            AluOpRRI::Xori => (0x13, 0b100),
            AluOpRRI::Slti => (0x13, 0b010),
            AluOpRRI::Sltiu => (0x13, 0b011),
            AluOpRRI::Slli => (0x13, 0b001),
            AluOpRRI::Srli => (0x13, 0b101),
            AluOpRRI::Srai => (0x13, 0b101),
        }
    }
}

/// A conditional-branch comparison kind (B-type funct3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BranchKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl BranchKind {
    fn funct3(self) -> u32 {
        match self {
            BranchKind::Eq => 0b000,
            BranchKind::Ne => 0b001,
            BranchKind::Lt => 0b100,
            BranchKind::Ge => 0b101,
            BranchKind::Ltu => 0b110,
            BranchKind::Geu => 0b111,
        }
    }

    /// Invert the comparison.
    pub fn invert(self) -> BranchKind {
        match self {
            BranchKind::Eq => BranchKind::Ne,
            BranchKind::Ne => BranchKind::Eq,
            BranchKind::Lt => BranchKind::Ge,
            BranchKind::Ge => BranchKind::Lt,
            BranchKind::Ltu => BranchKind::Geu,
            BranchKind::Geu => BranchKind::Ltu,
        }
    }
}

/// Supplementary information attached to a call.
#[derive(Clone, Debug)]
pub struct CallInfo {
    /// The callee, if direct.
    pub dest: Option<ExternalName>,
    /// The callee register, if indirect.
    pub reg: Option<Reg>,
    /// Argument registers read.
    pub uses: SmallVec<[RealReg; 8]>,
    /// Return registers written.
    pub defs: SmallVec<[RealReg; 8]>,
    /// Caller-saved clobbers.
    pub clobbers: SmallVec<[RealReg; 8]>,
}

/// A riscv64 machine instruction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Inst {
    /// R-type ALU operation.
    AluRRR {
        op: AluOpRRR,
        rd: Writable<Reg>,
        rs1: Reg,
        rs2: Reg,
    },
    /// I-type ALU operation.
    AluRRI {
        op: AluOpRRI,
        rd: Writable<Reg>,
        rs1: Reg,
        imm12: i16,
    },
    /// Load upper immediate (U-type).
    Lui {
        rd: Writable<Reg>,
        /// The 20-bit immediate, already shifted semantics (imm << 12).
        imm20: i32,
    },
    /// A load. `bytes` in {1,2,4,8}; sub-doubleword loads sign- or
    /// zero-extend.
    Load {
        bytes: u8,
        sign_extend: bool,
        rd: Writable<Reg>,
        base: Reg,
        offset: i16,
    },
    /// A store of the low `bytes` of rs2.
    Store {
        bytes: u8,
        rs2: Reg,
        base: Reg,
        offset: i16,
    },
    /// A load from a frame region, finalized at emission.
    LoadStack {
        bytes: u8,
        rd: Writable<Reg>,
        mem: StackAMode,
    },
    /// A store to a frame region, finalized at emission.
    StoreStack {
        bytes: u8,
        rs2: Reg,
        mem: StackAMode,
    },
    /// The address of a frame region location.
    StackAddr {
        rd: Writable<Reg>,
        mem: StackAMode,
    },
    /// Unconditional jump (J-type).
    Jal {
        dest: MachLabel,
    },
    /// Conditional branch; B-type to `taken`, then a JAL to `not_taken`.
    CondBr {
        kind: BranchKind,
        rs1: Reg,
        rs2: Reg,
        taken: MachLabel,
        not_taken: MachLabel,
    },
    /// One-armed conditional branch: B-type to `taken`, falling through
    /// otherwise.
    OneWayCondBr {
        kind: BranchKind,
        rs1: Reg,
        rs2: Reg,
        taken: MachLabel,
    },
    /// Direct or indirect call.
    Call {
        info: Box<CallInfo>,
    },
    /// Tail call.
    TailCall {
        dest: ExternalName,
        uses: SmallVec<[RealReg; 8]>,
    },
    /// The return pseudo-instruction.
    Ret,
    /// The actual `jalr x0, 0(ra)`.
    EpilogueRet,
    /// Branch over an `ebreak` unless the condition holds.
    TrapIf {
        kind: BranchKind,
        rs1: Reg,
        rs2: Reg,
        trap_code: TrapCode,
    },
    /// An unconditional trap (`ebreak`).
    Ebreak {
        trap_code: TrapCode,
    },
    /// Load the address of a symbol: AUIPC+ADDI with pcrel relocations.
    LoadExtName {
        rd: Writable<Reg>,
        name: Box<ExternalName>,
        offset: i64,
    },
    /// No-op (`addi x0, x0, 0`).
    Nop,
}

impl Inst {
    /// Materialize a 64-bit constant.
    ///
    /// Small values use ADDI from x0; 32-bit-signed values use LUI+ADDIW;
    /// everything else builds the constant in 16-bit chunks with
    /// shift-or steps.
    pub fn load_constant(rd: Writable<Reg>, value: u64) -> SmallVec<[Inst; 8]> {
        let mut insts: SmallVec<[Inst; 8]> = SmallVec::new();
        let sval = value as i64;
        if (-2048..=2047).contains(&sval) {
            insts.push(Inst::AluRRI {
                op: AluOpRRI::Addi,
                rd,
                rs1: zero_reg(),
                imm12: sval as i16,
            });
        } else if i32::try_from(sval).is_ok() {
            let sval32 = sval as i32;
            let lo12 = (sval32 << 20) >> 20;
            let hi20 = sval32.wrapping_sub(lo12) >> 12;
            insts.push(Inst::Lui { rd, imm20: hi20 });
            if lo12 != 0 {
                insts.push(Inst::AluRRI {
                    op: AluOpRRI::Addiw,
                    rd,
                    rs1: rd.to_reg(),
                    imm12: lo12 as i16,
                });
            }
        } else {
            // Build from the top 32 bits, then shift in the bottom two
            // 16-bit chunks 11 bits at a time (keeping each addend
            // positive in the 12-bit immediate).
            let hi32 = (value >> 32) as u32 as u64;
            let mid = ((value >> 16) & 0xffff) as u64;
            let lo = (value & 0xffff) as u64;
            for inst in Inst::load_constant(rd, hi32 as i32 as i64 as u64) {
                insts.push(inst);
            }
            for &(chunk, shift) in &[(mid, 16u8), (lo, 0u8)] {
                let _ = shift;
                insts.push(Inst::AluRRI {
                    op: AluOpRRI::Slli,
                    rd,
                    rs1: rd.to_reg(),
                    imm12: 11,
                });
                insts.push(Inst::AluRRI {
                    op: AluOpRRI::Addi,
                    rd,
                    rs1: rd.to_reg(),
                    imm12: ((chunk >> 5) & 0x7ff) as i16,
                });
                insts.push(Inst::AluRRI {
                    op: AluOpRRI::Slli,
                    rd,
                    rs1: rd.to_reg(),
                    imm12: 5,
                });
                insts.push(Inst::AluRRI {
                    op: AluOpRRI::Addi,
                    rd,
                    rs1: rd.to_reg(),
                    imm12: (chunk & 0x1f) as i16,
                });
            }
        }
        insts
    }
}

// Encoding helpers, one per format.

fn enc(reg: Reg) -> u32 {
    u32::from(reg.to_real_reg().expect("real register").hw_enc())
}

fn enc_r(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_i(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm12: u32) -> u32 {
    ((imm12 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_s(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm12: u32) -> u32 {
    (((imm12 >> 5) & 0x7f) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | ((imm12 & 0x1f) << 7)
        | opcode
}

fn enc_b(opcode: u32, funct3: u32, rs1: u32, rs2: u32, offset: i32) -> u32 {
    let imm = (offset >> 1) as u32;
    let imm12 = (imm >> 11) & 1;
    let imm10_5 = (imm >> 4) & 0x3f;
    let imm4_1 = imm & 0xf;
    let imm11 = (imm >> 10) & 1;
    (imm12 << 31)
        | (imm10_5 << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | (imm4_1 << 8)
        | (imm11 << 7)
        | opcode
}

fn enc_u(opcode: u32, rd: u32, imm20: i32) -> u32 {
    (((imm20 as u32) & 0xfffff) << 12) | (rd << 7) | opcode
}

fn enc_j(opcode: u32, rd: u32, offset: i32) -> u32 {
    let imm = (offset >> 1) as u32;
    let imm20 = (imm >> 19) & 1;
    let imm10_1 = imm & 0x3ff;
    let imm11 = (imm >> 10) & 1;
    let imm19_12 = (imm >> 11) & 0xff;
    (imm20 << 31) | (imm10_1 << 21) | (imm11 << 20) | (imm19_12 << 12) | (rd << 7) | opcode
}

/// Resolve a frame-region reference into (base, offset) pairs, emitting
/// address arithmetic through a spill temporary when out of I-type range.
fn finalize_stack(
    mem: StackAMode,
    state: &EmitState,
    sink: &mut MachBuffer<Inst>,
) -> (Reg, i16) {
    let off = mem.resolve(&state.frame);
    if (-2048..=2047).contains(&off) {
        (stack_reg(), off as i16)
    } else {
        let tmp = writable_xreg(31);
        for inst in Inst::load_constant(tmp, off as u64) {
            inst.emit(sink, &mut state.clone());
        }
        let add = Inst::AluRRR {
            op: AluOpRRR::Add,
            rd: tmp,
            rs1: stack_reg(),
            rs2: tmp.to_reg(),
        };
        add.emit(sink, &mut state.clone());
        (tmp.to_reg(), 0)
    }
}

impl MachInst for Inst {
    type LabelUse = LabelUse;

    fn get_operands(&self, collector: &mut OperandCollector) {
        match self {
            Inst::Nop | Inst::Ret | Inst::EpilogueRet | Inst::Jal { .. } | Inst::Ebreak { .. } => {}
            Inst::AluRRR { rd, rs1, rs2, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rs1);
                collector.reg_use(*rs2);
            }
            Inst::AluRRI { rd, rs1, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*rs1);
            }
            Inst::Lui { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::Load { rd, base, .. } => {
                collector.reg_def(*rd);
                collector.reg_use(*base);
            }
            Inst::Store { rs2, base, .. } => {
                collector.reg_use(*rs2);
                collector.reg_use(*base);
            }
            Inst::LoadStack { rd, .. } | Inst::StackAddr { rd, .. } => {
                collector.reg_def(*rd);
            }
            Inst::StoreStack { rs2, .. } => {
                collector.reg_use(*rs2);
            }
            Inst::CondBr { rs1, rs2, .. }
            | Inst::OneWayCondBr { rs1, rs2, .. }
            | Inst::TrapIf { rs1, rs2, .. } => {
                collector.reg_use(*rs1);
                collector.reg_use(*rs2);
            }
            Inst::Call { info } => {
                if let Some(r) = info.reg {
                    collector.reg_use(r);
                }
                for &u in &info.uses {
                    collector.reg_fixed_use(Reg::Real(u), u);
                }
                for &d in &info.defs {
                    collector.reg_clobbers(&[d]);
                }
                collector.reg_clobbers(&info.clobbers);
            }
            Inst::TailCall { uses, .. } => {
                for &u in uses {
                    collector.reg_fixed_use(Reg::Real(u), u);
                }
            }
            Inst::LoadExtName { rd, .. } => {
                collector.reg_def(*rd);
            }
        }
    }

    fn map_regs(&mut self, mapper: &dyn RegMapper) {
        match self {
            Inst::Nop | Inst::Ret | Inst::EpilogueRet | Inst::Jal { .. } | Inst::Ebreak { .. } => {}
            Inst::AluRRR { rd, rs1, rs2, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rs1);
                map_reg(mapper, rs2);
            }
            Inst::AluRRI { rd, rs1, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, rs1);
            }
            Inst::Lui { rd, .. } => map_writable(mapper, rd),
            Inst::Load { rd, base, .. } => {
                map_writable(mapper, rd);
                map_reg(mapper, base);
            }
            Inst::Store { rs2, base, .. } => {
                map_reg(mapper, rs2);
                map_reg(mapper, base);
            }
            Inst::LoadStack { rd, .. } | Inst::StackAddr { rd, .. } => map_writable(mapper, rd),
            Inst::StoreStack { rs2, .. } => map_reg(mapper, rs2),
            Inst::CondBr { rs1, rs2, .. }
            | Inst::OneWayCondBr { rs1, rs2, .. }
            | Inst::TrapIf { rs1, rs2, .. } => {
                map_reg(mapper, rs1);
                map_reg(mapper, rs2);
            }
            Inst::Call { info } => {
                if let Some(r) = &mut info.reg {
                    map_reg(mapper, r);
                }
            }
            Inst::TailCall { .. } => {}
            Inst::LoadExtName { rd, .. } => map_writable(mapper, rd),
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::AluRRI {
                op: AluOpRRI::Addi,
                rd,
                rs1,
                imm12: 0,
            } => Some((rd, rs1)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Ret | Inst::EpilogueRet => MachTerminator::Ret,
            Inst::TailCall { .. } => MachTerminator::RetCall,
            Inst::Jal { .. } => MachTerminator::Uncond,
            Inst::CondBr { .. } => MachTerminator::Cond,
            Inst::Ebreak { .. } => MachTerminator::Uncond,
            _ => MachTerminator::None,
        }
    }

    fn gen_move(to: Writable<Reg>, from: Reg, _ty: Type) -> Inst {
        Inst::AluRRI {
            op: AluOpRRI::Addi,
            rd: to,
            rs1: from,
            imm12: 0,
        }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::Jal { dest: target }
    }

    fn gen_ret() -> Inst {
        Inst::Ret
    }

    fn worst_case_size() -> CodeOffset {
        // Constant synthesis dominates: up to ten 4-byte instructions.
        40
    }
}

/// State carried between emissions.
#[derive(Clone, Default)]
pub struct EmitState {
    frame: FrameLayout,
}

impl MachInstEmitState for EmitState {
    fn set_frame_layout(&mut self, frame: FrameLayout) {
        self.frame = frame;
    }
}

impl MachInstEmit for Inst {
    type State = EmitState;

    fn emit(&self, sink: &mut MachBuffer<Inst>, state: &mut EmitState) {
        match self {
            Inst::Nop => {
                sink.put4(enc_i(0x13, 0, 0, 0, 0));
            }

            &Inst::AluRRR { op, rd, rs1, rs2 } => {
                let (opcode, f3, f7) = op.fields();
                sink.put4(enc_r(opcode, f3, f7, enc(rd.to_reg()), enc(rs1), enc(rs2)));
            }

            &Inst::AluRRI { op, rd, rs1, imm12 } => {
                let (opcode, f3) = op.fields();
                let imm = match op {
                    // Shift-immediate forms place funct6 above the
                    // 6-bit shamt.
                    AluOpRRI::Slli => u32::from(imm12 as u16) & 0x3f,
                    AluOpRRI::Srli => u32::from(imm12 as u16) & 0x3f,
                    AluOpRRI::Srai => (u32::from(imm12 as u16) & 0x3f) | (0b010000 << 6),
                    _ => (imm12 as u32) & 0xfff,
                };
                sink.put4(enc_i(opcode, f3, enc(rd.to_reg()), enc(rs1), imm));
            }

            &Inst::Lui { rd, imm20 } => {
                sink.put4(enc_u(0x37, enc(rd.to_reg()), imm20));
            }

            &Inst::Load {
                bytes,
                sign_extend,
                rd,
                base,
                offset,
            } => {
                let f3 = match (bytes, sign_extend) {
                    (1, true) => 0b000,
                    (1, false) => 0b100,
                    (2, true) => 0b001,
                    (2, false) => 0b101,
                    (4, true) => 0b010,
                    (4, false) => 0b110,
                    (8, _) => 0b011,
                    _ => unreachable!("bad load width"),
                };
                sink.put4(enc_i(
                    0x03,
                    f3,
                    enc(rd.to_reg()),
                    enc(base),
                    (offset as u32) & 0xfff,
                ));
            }

            &Inst::Store {
                bytes,
                rs2,
                base,
                offset,
            } => {
                let f3 = match bytes {
                    1 => 0b000,
                    2 => 0b001,
                    4 => 0b010,
                    8 => 0b011,
                    _ => unreachable!("bad store width"),
                };
                sink.put4(enc_s(0x23, f3, enc(base), enc(rs2), (offset as u32) & 0xfff));
            }

            &Inst::LoadStack { bytes, rd, mem } => {
                let (base, offset) = finalize_stack(mem, state, sink);
                Inst::Load {
                    bytes,
                    sign_extend: true,
                    rd,
                    base,
                    offset,
                }
                .emit(sink, state);
            }
            &Inst::StoreStack { bytes, rs2, mem } => {
                let (base, offset) = finalize_stack(mem, state, sink);
                Inst::Store {
                    bytes,
                    rs2,
                    base,
                    offset,
                }
                .emit(sink, state);
            }
            &Inst::StackAddr { rd, mem } => {
                let (base, offset) = finalize_stack(mem, state, sink);
                Inst::AluRRI {
                    op: AluOpRRI::Addi,
                    rd,
                    rs1: base,
                    imm12: offset,
                }
                .emit(sink, state);
            }

            &Inst::Jal { dest } => {
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, dest, LabelUse::Jal20);
                sink.put4(enc_j(0x6f, 0, 0));
            }

            &Inst::CondBr {
                kind,
                rs1,
                rs2,
                taken,
                not_taken,
            } => {
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::B12);
                sink.put4(enc_b(0x63, kind.funct3(), enc(rs1), enc(rs2), 0));

                let off = sink.cur_offset();
                sink.use_label_at_offset(off, not_taken, LabelUse::Jal20);
                sink.put4(enc_j(0x6f, 0, 0));
            }

            &Inst::OneWayCondBr {
                kind,
                rs1,
                rs2,
                taken,
            } => {
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::B12);
                sink.put4(enc_b(0x63, kind.funct3(), enc(rs1), enc(rs2), 0));
            }

            Inst::Call { info } => match (&info.dest, info.reg) {
                (Some(name), None) => {
                    // auipc ra, %pcrel_hi(sym) ; jalr ra, %pcrel_lo(ra)
                    sink.add_reloc(Reloc::RiscvCall, name, 0);
                    sink.put4(enc_u(0x17, 1, 0));
                    sink.put4(enc_i(0x67, 0, 1, 1, 0));
                }
                (None, Some(reg)) => {
                    sink.put4(enc_i(0x67, 0, 1, enc(reg), 0));
                }
                _ => unreachable!("call needs exactly one destination"),
            },

            Inst::TailCall { dest, .. } => {
                let frame = state.frame.clone();
                for inst in crate::isa::riscv64::abi::gen_epilogue_frame_restore(&frame) {
                    inst.emit(sink, state);
                }
                // auipc t5, hi ; jalr x0, lo(t5): a tail call leaves ra
                // untouched.
                sink.add_reloc(Reloc::RiscvCall, dest, 0);
                sink.put4(enc_u(0x17, 30, 0));
                sink.put4(enc_i(0x67, 0, 0, 30, 0));
            }

            Inst::Ret | Inst::EpilogueRet => {
                // jalr x0, 0(ra).
                sink.put4(enc_i(0x67, 0, 0, 1, 0));
            }

            &Inst::TrapIf {
                kind,
                rs1,
                rs2,
                trap_code,
            } => {
                // Branch over the ebreak when the trap condition does
                // NOT hold.
                sink.put4(enc_b(0x63, kind.invert().funct3(), enc(rs1), enc(rs2), 8));
                sink.add_trap(trap_code);
                sink.put4(0x00100073);
            }
            &Inst::Ebreak { trap_code } => {
                sink.add_trap(trap_code);
                sink.put4(0x00100073);
            }

            Inst::LoadExtName { rd, name, offset } => {
                let rdn = enc(rd.to_reg());
                sink.add_reloc(Reloc::RiscvPCRelHi20, name, *offset);
                sink.put4(enc_u(0x17, rdn, 0));
                sink.add_reloc(Reloc::RiscvPCRelLo12I, name, *offset);
                sink.put4(enc_i(0x13, 0, rdn, rdn, 0));
            }
        }
    }

    fn pretty_print(&self, _state: &mut EmitState) -> String {
        format!("{:?}", self)
    }
}

/// Label-use kinds for riscv64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// B-type branch: 13-bit signed, even, +/- 4 KiB.
    B12,
    /// J-type jump: 21-bit signed, even, +/- 1 MiB.
    Jal20,
}

impl MachInstLabelUse for LabelUse {
    const ALIGN: CodeOffset = 4;

    fn max_pos_range(self) -> CodeOffset {
        match self {
            LabelUse::B12 => (1 << 12) - 1,
            LabelUse::Jal20 => (1 << 20) - 1,
        }
    }
    fn max_neg_range(self) -> CodeOffset {
        match self {
            LabelUse::B12 => 1 << 12,
            LabelUse::Jal20 => 1 << 20,
        }
    }
    fn patch_size(self) -> CodeOffset {
        4
    }
    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        let pc_rel = (label_offset as i64 - use_offset as i64) as i32;
        let insn = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let patched = match self {
            LabelUse::B12 => insn | (enc_b(0, 0, 0, 0, pc_rel) & 0xfe000f80),
            LabelUse::Jal20 => insn | (enc_j(0, 0, pc_rel) & 0xfffff000),
        };
        buffer[0..4].copy_from_slice(&patched.to_le_bytes());
    }
    fn supports_veneer(self) -> bool {
        matches!(self, LabelUse::B12)
    }
    fn veneer_size(self) -> CodeOffset {
        4
    }
    fn generate_veneer(self, buffer: &mut [u8], veneer_offset: CodeOffset) -> (CodeOffset, Self) {
        match self {
            LabelUse::B12 => {
                // A JAL x0 covers +/- 1 MiB.
                buffer[0..4].copy_from_slice(&enc_j(0x6f, 0, 0).to_le_bytes());
                (veneer_offset, LabelUse::Jal20)
            }
            _ => panic!("veneer not supported for {:?}", self),
        }
    }
}

#[cfg(test)]
mod emit_tests {
    use super::*;

    fn emit_one(inst: Inst) -> Vec<u8> {
        let mut buffer = MachBuffer::<Inst>::new();
        let mut state = EmitState::default();
        inst.emit(&mut buffer, &mut state);
        buffer.finish().unwrap().data
    }

    fn word(data: &[u8]) -> u32 {
        u32::from_le_bytes([data[0], data[1], data[2], data[3]])
    }

    #[test]
    fn test_r_type() {
        // add a0, a1, a2 => 0x00c58533
        assert_eq!(
            word(&emit_one(Inst::AluRRR {
                op: AluOpRRR::Add,
                rd: writable_xreg(10),
                rs1: xreg(11),
                rs2: xreg(12),
            })),
            0x00c58533
        );
        // sub a0, a1, a2 => 0x40c58533
        assert_eq!(
            word(&emit_one(Inst::AluRRR {
                op: AluOpRRR::Sub,
                rd: writable_xreg(10),
                rs1: xreg(11),
                rs2: xreg(12),
            })),
            0x40c58533
        );
        // mul a0, a1, a2 => 0x02c58533
        assert_eq!(
            word(&emit_one(Inst::AluRRR {
                op: AluOpRRR::Mul,
                rd: writable_xreg(10),
                rs1: xreg(11),
                rs2: xreg(12),
            })),
            0x02c58533
        );
        // divu a0, a1, a2 => 0x02c5d533
        assert_eq!(
            word(&emit_one(Inst::AluRRR {
                op: AluOpRRR::Divu,
                rd: writable_xreg(10),
                rs1: xreg(11),
                rs2: xreg(12),
            })),
            0x02c5d533
        );
    }

    #[test]
    fn test_i_type() {
        // addi a0, a1, 42 => 0x02a58513
        assert_eq!(
            word(&emit_one(Inst::AluRRI {
                op: AluOpRRI::Addi,
                rd: writable_xreg(10),
                rs1: xreg(11),
                imm12: 42,
            })),
            0x02a58513
        );
        // srai a0, a0, 3 => 0x40355513
        assert_eq!(
            word(&emit_one(Inst::AluRRI {
                op: AluOpRRI::Srai,
                rd: writable_xreg(10),
                rs1: xreg(10),
                imm12: 3,
            })),
            0x40355513
        );
        // ld a0, 8(sp) => 0x00813503
        assert_eq!(
            word(&emit_one(Inst::Load {
                bytes: 8,
                sign_extend: true,
                rd: writable_xreg(10),
                base: xreg(2),
                offset: 8,
            })),
            0x00813503
        );
    }

    #[test]
    fn test_s_b_u_j_types() {
        // sd a0, 8(sp) => 0x00a13423
        assert_eq!(
            word(&emit_one(Inst::Store {
                bytes: 8,
                rs2: xreg(10),
                base: xreg(2),
                offset: 8,
            })),
            0x00a13423
        );
        // lui a0, 0x12345 => 0x12345537
        assert_eq!(
            word(&emit_one(Inst::Lui {
                rd: writable_xreg(10),
                imm20: 0x12345,
            })),
            0x12345537
        );
        // ret (jalr x0, 0(ra)) => 0x00008067
        assert_eq!(word(&emit_one(Inst::EpilogueRet)), 0x00008067);
        // ebreak => 0x00100073
        assert_eq!(
            word(&emit_one(Inst::Ebreak {
                trap_code: TrapCode::UnreachableCodeReached
            })),
            0x00100073
        );
    }

    #[test]
    fn test_load_constant() {
        // Small constants are one ADDI.
        assert_eq!(Inst::load_constant(writable_xreg(10), 42).len(), 1);
        // 32-bit constants are LUI (+ADDIW).
        let insts = Inst::load_constant(writable_xreg(10), 0x12345678);
        assert!(insts.len() <= 2);
        // Full 64-bit constants synthesize in bounded length.
        let insts = Inst::load_constant(writable_xreg(10), 0x1234_5678_9abc_def0);
        assert!(insts.len() <= 10);
    }
}
