//! x86-64 instruction definitions and binary emission.
//!
//! Encodings follow the classic REX + opcode + ModR/M + SIB + disp +
//! immediate layout. Only the integer core is represented; the operand
//! forms (RM, MR, MI, two-address with a `mod` destination) cover the
//! shapes the lowering rules produce.

use crate::binemit::{CodeOffset, Reloc};
use crate::ir::condcodes::IntCC;
use crate::ir::{ExternalName, TrapCode, Type};
use crate::machinst::abi::StackAMode;
use crate::machinst::buffer::{MachBuffer, MachInstLabelUse, MachLabel};
use crate::machinst::reg::{
    map_reg, map_writable, OperandCollector, RealReg, Reg, RegClass, RegMapper, Writable,
};
use crate::machinst::{MachInst, MachInstEmit, MachInstEmitState, MachTerminator};
use crate::machinst::abi::FrameLayout;
use crate::regalloc::MachineEnv;
use smallvec::SmallVec;

// Register constructors.

/// A general-purpose register by hardware encoding (0 = rax .. 15 = r15).
pub fn gpr(enc: u8) -> Reg {
    Reg::Real(RealReg::new(RegClass::Int, enc))
}

/// A writable general-purpose register.
pub fn writable_gpr(enc: u8) -> Writable<Reg> {
    Writable::from_reg(gpr(enc))
}

/// rax.
pub fn rax() -> Reg {
    gpr(0)
}
/// rcx.
pub fn rcx() -> Reg {
    gpr(1)
}
/// rdx.
pub fn rdx() -> Reg {
    gpr(2)
}
/// rsp.
pub fn rsp() -> Reg {
    gpr(4)
}
/// rbp.
pub fn rbp() -> Reg {
    gpr(5)
}

/// The allocatable-register environment for x64.
///
/// r10/r11 are the spill temporaries; rsp/rbp are reserved.
pub fn create_machine_env() -> MachineEnv {
    let mut int_regs = vec![];
    // Caller-saved first: rax, rcx, rdx, rsi, rdi, r8, r9.
    for &enc in &[0u8, 1, 2, 6, 7, 8, 9] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    // Callee-saved: rbx, r12..r15.
    for &enc in &[3u8, 12, 13, 14, 15] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    let float_regs = (0..16u8)
        .filter(|&x| x < 14)
        .map(|x| RealReg::new(RegClass::Float, x))
        .collect();
    MachineEnv {
        int_regs,
        float_regs,
        callee_saved: [3u8, 12, 13, 14, 15]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect(),
        spilltmps: [
            [
                RealReg::new(RegClass::Int, 10),
                RealReg::new(RegClass::Int, 11),
            ],
            [
                RealReg::new(RegClass::Float, 14),
                RealReg::new(RegClass::Float, 15),
            ],
        ],
    }
}

/// An addressing mode.
#[derive(Clone, Copy, Debug)]
pub enum Amode {
    /// Base register plus signed 32-bit displacement.
    ImmReg {
        /// The displacement.
        simm32: i32,
        /// The base.
        base: Reg,
    },
    /// Base + index*scale + displacement.
    ImmRegRegShift {
        /// The displacement.
        simm32: i32,
        /// The base.
        base: Reg,
        /// The index (must not be rsp).
        index: Reg,
        /// log2 of the scale (0-3).
        shift: u8,
    },
    /// A frame-region offset, resolved at emission.
    NominalSP(StackAMode),
}

/// An integer ALU operation (two-address: dst = dst op src).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl AluOp {
    /// The /r opcode for the MR (reg-to-rm) form.
    fn opcode_mr(self) -> u8 {
        match self {
            AluOp::Add => 0x01,
            AluOp::Sub => 0x29,
            AluOp::And => 0x21,
            AluOp::Or => 0x09,
            AluOp::Xor => 0x31,
        }
    }

    /// The /digit for the 0x81 immediate form.
    fn imm_digit(self) -> u8 {
        match self {
            AluOp::Add => 0,
            AluOp::Or => 1,
            AluOp::And => 4,
            AluOp::Sub => 5,
            AluOp::Xor => 6,
        }
    }
}

/// A shift kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ShiftKind {
    Shl,
    ShrLogical,
    ShrArithmetic,
}

impl ShiftKind {
    fn digit(self) -> u8 {
        match self {
            ShiftKind::Shl => 4,
            ShiftKind::ShrLogical => 5,
            ShiftKind::ShrArithmetic => 7,
        }
    }
}

/// A condition code, in x86 encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CC(u8);

impl CC {
    /// From an IR integer condition.
    pub fn from_intcc(cc: IntCC) -> CC {
        CC(match cc {
            IntCC::Equal => 0x4,
            IntCC::NotEqual => 0x5,
            IntCC::SignedLessThan => 0xC,
            IntCC::SignedGreaterThanOrEqual => 0xD,
            IntCC::SignedLessThanOrEqual => 0xE,
            IntCC::SignedGreaterThan => 0xF,
            IntCC::UnsignedLessThan => 0x2,
            IntCC::UnsignedGreaterThanOrEqual => 0x3,
            IntCC::UnsignedLessThanOrEqual => 0x6,
            IntCC::UnsignedGreaterThan => 0x7,
        })
    }

    /// The not-zero condition.
    pub fn nz() -> CC {
        CC(0x5)
    }

    /// The zero condition.
    pub fn z() -> CC {
        CC(0x4)
    }

    /// The inverted condition.
    pub fn invert(self) -> CC {
        CC(self.0 ^ 1)
    }

    /// The low opcode nibble.
    pub fn enc(self) -> u8 {
        self.0
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

/// An x64 machine instruction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Inst {
    /// Integer ALU op, two-address: dst = dst op src.
    AluRR {
        op: AluOp,
        is64: bool,
        dst: Writable<Reg>,
        src: Reg,
    },
    /// Integer ALU op with a 32-bit immediate.
    AluRImm {
        op: AluOp,
        is64: bool,
        dst: Writable<Reg>,
        simm32: i32,
    },
    /// Two-address integer multiply: dst = dst * src (0F AF /r).
    MulRR {
        is64: bool,
        dst: Writable<Reg>,
        src: Reg,
    },
    /// Move register to register.
    MovRR {
        is64: bool,
        dst: Writable<Reg>,
        src: Reg,
    },
    /// Load a 64-bit immediate.
    Imm {
        dst: Writable<Reg>,
        simm64: u64,
    },
    /// Load: zero- or sign-extending as requested.
    Load {
        /// 1, 2, 4 or 8 bytes.
        bytes: u8,
        sign_extend: bool,
        dst: Writable<Reg>,
        addr: Amode,
    },
    /// Store the low `bytes` of src.
    Store {
        bytes: u8,
        src: Reg,
        addr: Amode,
    },
    /// Load effective address.
    LoadAddr {
        dst: Writable<Reg>,
        addr: Amode,
    },
    /// Shift by an immediate or by CL.
    Shift {
        kind: ShiftKind,
        is64: bool,
        dst: Writable<Reg>,
        /// `None` means the amount is in CL.
        num_bits: Option<u8>,
    },
    /// Compare two registers, setting flags (CMP).
    CmpRR {
        is64: bool,
        a: Reg,
        b: Reg,
    },
    /// Compare a register against an immediate.
    CmpRImm {
        is64: bool,
        a: Reg,
        simm32: i32,
    },
    /// Materialize a flag condition into a register (SETcc + MOVZX).
    Setcc {
        cc: CC,
        dst: Writable<Reg>,
    },
    /// Conditional move.
    Cmove {
        is64: bool,
        cc: CC,
        dst: Writable<Reg>,
        src: Reg,
    },
    /// Sign-extend rax into rdx (CDQ/CQO), setup for IDIV.
    SignExtendAxDx {
        is64: bool,
    },
    /// Divide rdx:rax by the divisor; quotient in rax, remainder in rdx.
    Div {
        is64: bool,
        signed: bool,
        divisor: Reg,
    },
    /// Push a 64-bit register.
    Push64 {
        src: Reg,
    },
    /// Pop into a 64-bit register.
    Pop64 {
        dst: Writable<Reg>,
    },
    /// Direct or indirect call.
    Call {
        info: Box<CallInfo>,
    },
    /// Tail call: epilogue + jmp.
    TailCall {
        dest: ExternalName,
        uses: SmallVec<[RealReg; 8]>,
    },
    /// The return pseudo-instruction (expanded into the epilogue).
    Ret,
    /// The actual `ret`.
    EpilogueRet,
    /// Unconditional jump.
    JmpKnown {
        dst: MachLabel,
    },
    /// Conditional branch: jcc taken; jmp not_taken.
    JmpCond {
        cc: CC,
        taken: MachLabel,
        not_taken: MachLabel,
    },
    /// One-armed conditional branch: jcc taken; fall through otherwise.
    JmpIf {
        cc: CC,
        taken: MachLabel,
    },
    /// Test a register against itself and trap on the condition.
    TrapIf {
        cc: CC,
        trap_code: TrapCode,
    },
    /// ud2.
    Ud2 {
        trap_code: TrapCode,
    },
    /// Load the address of a symbol: RIP-relative LEA with a relocation.
    LoadExtName {
        dst: Writable<Reg>,
        name: Box<ExternalName>,
        offset: i64,
    },
    /// No-op.
    Nop,
}

// Encoding helpers.

fn low8_will_sign_extend_to_32(x: i32) -> bool {
    (-128..=127).contains(&x)
}

fn enc(reg: Reg) -> u8 {
    reg.to_real_reg().expect("real register").hw_enc()
}

/// Emit a REX prefix if needed. `w`: 64-bit operand size; `r`: the reg
/// field; `b`: the rm/base field; `x`: the index field.
fn rex(sink: &mut MachBuffer<Inst>, w: bool, r: u8, x: u8, b: u8, force: bool) {
    let rex = 0x40
        | ((w as u8) << 3)
        | (((r >> 3) & 1) << 2)
        | (((x >> 3) & 1) << 1)
        | ((b >> 3) & 1);
    if rex != 0x40 || force {
        sink.put1(rex);
    }
}

fn modrm(sink: &mut MachBuffer<Inst>, md: u8, reg: u8, rm: u8) {
    sink.put1((md << 6) | ((reg & 7) << 3) | (rm & 7));
}

/// Emit ModR/M (+SIB +disp) selecting `reg` and the memory operand.
fn emit_modrm_mem(sink: &mut MachBuffer<Inst>, reg: u8, addr: &Amode, state: &EmitState) {
    let (simm32, base, index) = match addr {
        &Amode::ImmReg { simm32, base } => (simm32, base, None),
        &Amode::ImmRegRegShift {
            simm32,
            base,
            index,
            shift,
        } => (simm32, base, Some((index, shift))),
        &Amode::NominalSP(stack_mode) => {
            let off = stack_mode.resolve(state.frame_layout());
            (
                i32::try_from(off).expect("frame offset fits in disp32"),
                rsp(),
                None,
            )
        }
    };
    let base_enc = enc(base);
    match index {
        None => {
            if base_enc & 7 == 4 {
                // rsp/r12 as base requires a SIB byte.
                if simm32 == 0 && base_enc & 7 != 5 {
                    modrm(sink, 0b00, reg, 4);
                    sink.put1(0x24);
                } else if low8_will_sign_extend_to_32(simm32) {
                    modrm(sink, 0b01, reg, 4);
                    sink.put1(0x24);
                    sink.put1(simm32 as u8);
                } else {
                    modrm(sink, 0b10, reg, 4);
                    sink.put1(0x24);
                    sink.put4(simm32 as u32);
                }
            } else if simm32 == 0 && base_enc & 7 != 5 {
                modrm(sink, 0b00, reg, base_enc);
            } else if low8_will_sign_extend_to_32(simm32) {
                modrm(sink, 0b01, reg, base_enc);
                sink.put1(simm32 as u8);
            } else {
                modrm(sink, 0b10, reg, base_enc);
                sink.put4(simm32 as u32);
            }
        }
        Some((index, shift)) => {
            let index_enc = enc(index);
            debug_assert_ne!(index_enc & 7, 4, "rsp cannot be an index");
            let sib = (shift << 6) | ((index_enc & 7) << 3) | (base_enc & 7);
            if simm32 == 0 && base_enc & 7 != 5 {
                modrm(sink, 0b00, reg, 4);
                sink.put1(sib);
            } else if low8_will_sign_extend_to_32(simm32) {
                modrm(sink, 0b01, reg, 4);
                sink.put1(sib);
                sink.put1(simm32 as u8);
            } else {
                modrm(sink, 0b10, reg, 4);
                sink.put1(sib);
                sink.put4(simm32 as u32);
            }
        }
    }
}

fn amode_regs(addr: &Amode) -> (Option<Reg>, Option<Reg>) {
    match addr {
        &Amode::ImmReg { base, .. } => (Some(base), None),
        &Amode::ImmRegRegShift { base, index, .. } => (Some(base), Some(index)),
        &Amode::NominalSP(..) => (None, None),
    }
}

fn amode_rex_xb(addr: &Amode, state: Option<&EmitState>) -> (u8, u8) {
    match addr {
        &Amode::ImmReg { base, .. } => (0, enc(base)),
        &Amode::ImmRegRegShift { base, index, .. } => (enc(index), enc(base)),
        &Amode::NominalSP(..) => {
            let _ = state;
            (0, 4)
        }
    }
}

impl MachInst for Inst {
    type LabelUse = LabelUse;

    fn get_operands(&self, collector: &mut OperandCollector) {
        match self {
            Inst::Nop | Inst::Ret | Inst::EpilogueRet | Inst::JmpKnown { .. } | Inst::Ud2 { .. } => {
            }
            Inst::AluRR { dst, src, .. } => {
                collector.reg_mod(*dst);
                collector.reg_use(*src);
            }
            Inst::AluRImm { dst, .. } => {
                collector.reg_mod(*dst);
            }
            Inst::MulRR { dst, src, .. } => {
                collector.reg_mod(*dst);
                collector.reg_use(*src);
            }
            Inst::MovRR { dst, src, .. } => {
                collector.reg_def(*dst);
                collector.reg_use(*src);
            }
            Inst::Imm { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::Load { dst, addr, .. } | Inst::LoadAddr { dst, addr } => {
                collector.reg_def(*dst);
                let (b, i) = amode_regs(addr);
                if let Some(b) = b {
                    collector.reg_use(b);
                }
                if let Some(i) = i {
                    collector.reg_use(i);
                }
            }
            Inst::Store { src, addr, .. } => {
                collector.reg_use(*src);
                let (b, i) = amode_regs(addr);
                if let Some(b) = b {
                    collector.reg_use(b);
                }
                if let Some(i) = i {
                    collector.reg_use(i);
                }
            }
            Inst::Shift { dst, num_bits, .. } => {
                collector.reg_mod(*dst);
                if num_bits.is_none() {
                    collector.reg_fixed_use(rcx(), RealReg::new(RegClass::Int, 1));
                }
            }
            Inst::CmpRR { a, b, .. } => {
                collector.reg_use(*a);
                collector.reg_use(*b);
            }
            Inst::CmpRImm { a, .. } => {
                collector.reg_use(*a);
            }
            Inst::Setcc { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::Cmove { dst, src, .. } => {
                collector.reg_mod(*dst);
                collector.reg_use(*src);
            }
            Inst::SignExtendAxDx { .. } => {
                collector.reg_clobbers(&[RealReg::new(RegClass::Int, 2)]);
                collector.fixed_uses.push(RealReg::new(RegClass::Int, 0));
            }
            Inst::Div { divisor, .. } => {
                collector.reg_use(*divisor);
                collector.fixed_uses.push(RealReg::new(RegClass::Int, 0));
                collector.fixed_uses.push(RealReg::new(RegClass::Int, 2));
                collector.reg_clobbers(&[
                    RealReg::new(RegClass::Int, 0),
                    RealReg::new(RegClass::Int, 2),
                ]);
            }
            Inst::Push64 { src } => {
                collector.reg_use(*src);
            }
            Inst::Pop64 { dst } => {
                collector.reg_def(*dst);
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
            Inst::JmpCond { .. } | Inst::JmpIf { .. } | Inst::TrapIf { .. } => {}
            Inst::LoadExtName { dst, .. } => {
                collector.reg_def(*dst);
            }
        }
    }

    fn map_regs(&mut self, mapper: &dyn RegMapper) {
        let map_amode = |mapper: &dyn RegMapper, addr: &mut Amode| match addr {
            Amode::ImmReg { base, .. } => map_reg(mapper, base),
            Amode::ImmRegRegShift { base, index, .. } => {
                map_reg(mapper, base);
                map_reg(mapper, index);
            }
            Amode::NominalSP(..) => {}
        };
        match self {
            Inst::Nop | Inst::Ret | Inst::EpilogueRet | Inst::JmpKnown { .. } | Inst::Ud2 { .. } => {
            }
            Inst::AluRR { dst, src, .. }
            | Inst::MulRR { dst, src, .. }
            | Inst::MovRR { dst, src, .. }
            | Inst::Cmove { dst, src, .. } => {
                map_writable(mapper, dst);
                map_reg(mapper, src);
            }
            Inst::AluRImm { dst, .. }
            | Inst::Imm { dst, .. }
            | Inst::Setcc { dst, .. }
            | Inst::Pop64 { dst }
            | Inst::LoadExtName { dst, .. } => {
                map_writable(mapper, dst);
            }
            Inst::Load { dst, addr, .. } | Inst::LoadAddr { dst, addr } => {
                map_writable(mapper, dst);
                map_amode(mapper, addr);
            }
            Inst::Store { src, addr, .. } => {
                map_reg(mapper, src);
                map_amode(mapper, addr);
            }
            Inst::Shift { dst, .. } => {
                map_writable(mapper, dst);
            }
            Inst::CmpRR { a, b, .. } => {
                map_reg(mapper, a);
                map_reg(mapper, b);
            }
            Inst::CmpRImm { a, .. } => {
                map_reg(mapper, a);
            }
            Inst::SignExtendAxDx { .. } => {}
            Inst::Div { divisor, .. } => {
                map_reg(mapper, divisor);
            }
            Inst::Push64 { src } => {
                map_reg(mapper, src);
            }
            Inst::Call { info } => {
                if let Some(r) = &mut info.reg {
                    map_reg(mapper, r);
                }
            }
            Inst::TailCall { .. } => {}
            Inst::JmpCond { .. } | Inst::JmpIf { .. } | Inst::TrapIf { .. } => {}
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::MovRR {
                is64: true,
                dst,
                src,
            } => Some((dst, src)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Ret | Inst::EpilogueRet => MachTerminator::Ret,
            Inst::TailCall { .. } => MachTerminator::RetCall,
            Inst::JmpKnown { .. } => MachTerminator::Uncond,
            Inst::JmpCond { .. } => MachTerminator::Cond,
            Inst::Ud2 { .. } => MachTerminator::Uncond,
            _ => MachTerminator::None,
        }
    }

    fn gen_move(to: Writable<Reg>, from: Reg, _ty: Type) -> Inst {
        Inst::MovRR {
            is64: true,
            dst: to,
            src: from,
        }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::JmpKnown { dst: target }
    }

    fn gen_ret() -> Inst {
        Inst::Ret
    }

    fn worst_case_size() -> CodeOffset {
        // mov imm64 (10 bytes) is the largest single form.
        15
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

impl EmitState {
    fn frame_layout(&self) -> &FrameLayout {
        &self.frame
    }
}

impl MachInstEmit for Inst {
    type State = EmitState;

    fn emit(&self, sink: &mut MachBuffer<Inst>, state: &mut EmitState) {
        match self {
            Inst::Nop => {
                sink.put1(0x90);
            }

            &Inst::AluRR { op, is64, dst, src } => {
                let d = enc(dst.to_reg());
                let s = enc(src);
                rex(sink, is64, s, 0, d, false);
                sink.put1(op.opcode_mr());
                modrm(sink, 0b11, s, d);
            }

            &Inst::AluRImm {
                op,
                is64,
                dst,
                simm32,
            } => {
                let d = enc(dst.to_reg());
                rex(sink, is64, 0, 0, d, false);
                if low8_will_sign_extend_to_32(simm32) {
                    sink.put1(0x83);
                    modrm(sink, 0b11, op.imm_digit(), d);
                    sink.put1(simm32 as u8);
                } else {
                    sink.put1(0x81);
                    modrm(sink, 0b11, op.imm_digit(), d);
                    sink.put4(simm32 as u32);
                }
            }

            &Inst::MulRR { is64, dst, src } => {
                let d = enc(dst.to_reg());
                let s = enc(src);
                rex(sink, is64, d, 0, s, false);
                sink.put1(0x0F);
                sink.put1(0xAF);
                modrm(sink, 0b11, d, s);
            }

            &Inst::MovRR { is64, dst, src } => {
                let d = enc(dst.to_reg());
                let s = enc(src);
                rex(sink, is64, s, 0, d, false);
                sink.put1(0x89);
                modrm(sink, 0b11, s, d);
            }

            &Inst::Imm { dst, simm64 } => {
                let d = enc(dst.to_reg());
                if simm64 <= u64::from(u32::MAX) {
                    // mov r32, imm32 zero-extends.
                    rex(sink, false, 0, 0, d, false);
                    sink.put1(0xB8 | (d & 7));
                    sink.put4(simm64 as u32);
                } else {
                    rex(sink, true, 0, 0, d, false);
                    sink.put1(0xB8 | (d & 7));
                    sink.put8(simm64);
                }
            }

            &Inst::Load {
                bytes,
                sign_extend,
                dst,
                ref addr,
            } => {
                let d = enc(dst.to_reg());
                let (x, b) = amode_rex_xb(addr, Some(state));
                match (bytes, sign_extend) {
                    (1, false) => {
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x0F);
                        sink.put1(0xB6);
                    }
                    (1, true) => {
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x0F);
                        sink.put1(0xBE);
                    }
                    (2, false) => {
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x0F);
                        sink.put1(0xB7);
                    }
                    (2, true) => {
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x0F);
                        sink.put1(0xBF);
                    }
                    (4, false) => {
                        // mov r32, rm32 zero-extends.
                        rex(sink, false, d, x, b, false);
                        sink.put1(0x8B);
                    }
                    (4, true) => {
                        // movsxd.
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x63);
                    }
                    (8, _) => {
                        rex(sink, true, d, x, b, false);
                        sink.put1(0x8B);
                    }
                    _ => unreachable!("bad load width"),
                }
                emit_modrm_mem(sink, d, addr, state);
            }

            &Inst::Store {
                bytes,
                src,
                ref addr,
            } => {
                let s = enc(src);
                let (x, b) = amode_rex_xb(addr, Some(state));
                match bytes {
                    1 => {
                        // The REX prefix is required for sil/dil.
                        rex(sink, false, s, x, b, s >= 4);
                        sink.put1(0x88);
                    }
                    2 => {
                        sink.put1(0x66);
                        rex(sink, false, s, x, b, false);
                        sink.put1(0x89);
                    }
                    4 => {
                        rex(sink, false, s, x, b, false);
                        sink.put1(0x89);
                    }
                    8 => {
                        rex(sink, true, s, x, b, false);
                        sink.put1(0x89);
                    }
                    _ => unreachable!("bad store width"),
                }
                emit_modrm_mem(sink, s, addr, state);
            }

            &Inst::LoadAddr { dst, ref addr } => {
                let d = enc(dst.to_reg());
                let (x, b) = amode_rex_xb(addr, Some(state));
                rex(sink, true, d, x, b, false);
                sink.put1(0x8D);
                emit_modrm_mem(sink, d, addr, state);
            }

            &Inst::Shift {
                kind,
                is64,
                dst,
                num_bits,
            } => {
                let d = enc(dst.to_reg());
                rex(sink, is64, 0, 0, d, false);
                match num_bits {
                    Some(1) => {
                        sink.put1(0xD1);
                        modrm(sink, 0b11, kind.digit(), d);
                    }
                    Some(n) => {
                        sink.put1(0xC1);
                        modrm(sink, 0b11, kind.digit(), d);
                        sink.put1(n);
                    }
                    None => {
                        sink.put1(0xD3);
                        modrm(sink, 0b11, kind.digit(), d);
                    }
                }
            }

            &Inst::CmpRR { is64, a, b } => {
                let ae = enc(a);
                let be = enc(b);
                rex(sink, is64, be, 0, ae, false);
                sink.put1(0x39);
                modrm(sink, 0b11, be, ae);
            }

            &Inst::CmpRImm { is64, a, simm32 } => {
                let ae = enc(a);
                rex(sink, is64, 0, 0, ae, false);
                if low8_will_sign_extend_to_32(simm32) {
                    sink.put1(0x83);
                    modrm(sink, 0b11, 7, ae);
                    sink.put1(simm32 as u8);
                } else {
                    sink.put1(0x81);
                    modrm(sink, 0b11, 7, ae);
                    sink.put4(simm32 as u32);
                }
            }

            &Inst::Setcc { cc, dst } => {
                let d = enc(dst.to_reg());
                // setcc dl; movzx edx, dl.
                rex(sink, false, 0, 0, d, d >= 4);
                sink.put1(0x0F);
                sink.put1(0x90 | cc.enc());
                modrm(sink, 0b11, 0, d);
                rex(sink, false, d, 0, d, d >= 4);
                sink.put1(0x0F);
                sink.put1(0xB6);
                modrm(sink, 0b11, d, d);
            }

            &Inst::Cmove { is64, cc, dst, src } => {
                let d = enc(dst.to_reg());
                let s = enc(src);
                rex(sink, is64, d, 0, s, false);
                sink.put1(0x0F);
                sink.put1(0x40 | cc.enc());
                modrm(sink, 0b11, d, s);
            }

            &Inst::SignExtendAxDx { is64 } => {
                rex(sink, is64, 0, 0, 0, false);
                sink.put1(0x99);
            }

            &Inst::Div {
                is64,
                signed,
                divisor,
            } => {
                let de = enc(divisor);
                rex(sink, is64, 0, 0, de, false);
                sink.put1(0xF7);
                modrm(sink, 0b11, if signed { 7 } else { 6 }, de);
            }

            &Inst::Push64 { src } => {
                let s = enc(src);
                rex(sink, false, 0, 0, s, false);
                sink.put1(0x50 | (s & 7));
            }
            &Inst::Pop64 { dst } => {
                let d = enc(dst.to_reg());
                rex(sink, false, 0, 0, d, false);
                sink.put1(0x58 | (d & 7));
            }

            Inst::Call { info } => match (&info.dest, info.reg) {
                (Some(name), None) => {
                    sink.put1(0xE8);
                    sink.add_reloc(Reloc::X86CallPCRel4, name, -4);
                    sink.put4(0);
                }
                (None, Some(reg)) => {
                    let r = enc(reg);
                    rex(sink, false, 0, 0, r, false);
                    sink.put1(0xFF);
                    modrm(sink, 0b11, 2, r);
                }
                _ => unreachable!("call needs exactly one destination"),
            },

            Inst::TailCall { dest, .. } => {
                let frame = state.frame.clone();
                for inst in crate::isa::x64::abi::gen_epilogue_frame_restore(&frame) {
                    inst.emit(sink, state);
                }
                sink.put1(0xE9);
                sink.add_reloc(Reloc::X86CallPCRel4, dest, -4);
                sink.put4(0);
            }

            Inst::Ret | Inst::EpilogueRet => {
                sink.put1(0xC3);
            }

            &Inst::JmpKnown { dst } => {
                sink.put1(0xE9);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, dst, LabelUse::JmpRel32);
                sink.put4(0);
            }

            &Inst::JmpCond {
                cc,
                taken,
                not_taken,
            } => {
                // jcc taken (6 bytes), then jmp not_taken (5 bytes).
                sink.put1(0x0F);
                sink.put1(0x80 | cc.enc());
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::JmpRel32);
                sink.put4(0);

                sink.put1(0xE9);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, not_taken, LabelUse::JmpRel32);
                sink.put4(0);
            }

            &Inst::JmpIf { cc, taken } => {
                sink.put1(0x0F);
                sink.put1(0x80 | cc.enc());
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::JmpRel32);
                sink.put4(0);
            }

            &Inst::TrapIf { cc, trap_code } => {
                // jcc over the ud2.
                sink.put1(0x70 | cc.invert().enc());
                sink.put1(2);
                sink.add_trap(trap_code);
                sink.put1(0x0F);
                sink.put1(0x0B);
            }
            &Inst::Ud2 { trap_code } => {
                sink.add_trap(trap_code);
                sink.put1(0x0F);
                sink.put1(0x0B);
            }

            Inst::LoadExtName { dst, name, offset } => {
                let d = enc(dst.to_reg());
                rex(sink, true, d, 0, 5, false);
                sink.put1(0x8D);
                // RIP-relative: mod=00, rm=101.
                modrm(sink, 0b00, d, 5);
                sink.add_reloc(Reloc::X86PCRel4, name, *offset - 4);
                sink.put4(0);
            }
        }
    }

    fn pretty_print(&self, _state: &mut EmitState) -> String {
        format!("{:?}", self)
    }
}

/// Label-use kinds for x64: all PC-relative 32-bit fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// A 32-bit offset from the end of the instruction (i.e. the end of
    /// the patch region).
    JmpRel32,
}

impl MachInstLabelUse for LabelUse {
    const ALIGN: CodeOffset = 1;

    fn max_pos_range(self) -> CodeOffset {
        0x7fff_ffff
    }
    fn max_neg_range(self) -> CodeOffset {
        0x8000_0000
    }
    fn patch_size(self) -> CodeOffset {
        4
    }
    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        // The displacement is relative to the end of the 4-byte field.
        let pc_rel = (label_offset as i64) - (use_offset as i64) - 4;
        let pc_rel = pc_rel as i32;
        buffer[0..4].copy_from_slice(&pc_rel.to_le_bytes());
    }
    fn supports_veneer(self) -> bool {
        false
    }
    fn veneer_size(self) -> CodeOffset {
        0
    }
    fn generate_veneer(self, _buffer: &mut [u8], _offset: CodeOffset) -> (CodeOffset, Self) {
        panic!("rel32 does not need veneers")
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

    #[test]
    fn test_alu() {
        // add rax, rcx => REX.W 01 c8
        assert_eq!(
            emit_one(Inst::AluRR {
                op: AluOp::Add,
                is64: true,
                dst: writable_gpr(0),
                src: gpr(1),
            }),
            vec![0x48, 0x01, 0xC8]
        );
        // sub r8, r9 => REX.WRB 29 c8
        assert_eq!(
            emit_one(Inst::AluRR {
                op: AluOp::Sub,
                is64: true,
                dst: writable_gpr(8),
                src: gpr(9),
            }),
            vec![0x4D, 0x29, 0xC8]
        );
        // add eax, 1 => 83 c0 01
        assert_eq!(
            emit_one(Inst::AluRImm {
                op: AluOp::Add,
                is64: false,
                dst: writable_gpr(0),
                simm32: 1,
            }),
            vec![0x83, 0xC0, 0x01]
        );
        // and rdi, 0x12345 => REX.W 81 e7 45 23 01 00
        assert_eq!(
            emit_one(Inst::AluRImm {
                op: AluOp::And,
                is64: true,
                dst: writable_gpr(7),
                simm32: 0x12345,
            }),
            vec![0x48, 0x81, 0xE7, 0x45, 0x23, 0x01, 0x00]
        );
    }

    #[test]
    fn test_mul_div() {
        // imul rax, rcx => REX.W 0F AF C1
        assert_eq!(
            emit_one(Inst::MulRR {
                is64: true,
                dst: writable_gpr(0),
                src: gpr(1),
            }),
            vec![0x48, 0x0F, 0xAF, 0xC1]
        );
        // cqo => REX.W 99
        assert_eq!(
            emit_one(Inst::SignExtendAxDx { is64: true }),
            vec![0x48, 0x99]
        );
        // div rcx => REX.W F7 F1
        assert_eq!(
            emit_one(Inst::Div {
                is64: true,
                signed: false,
                divisor: gpr(1),
            }),
            vec![0x48, 0xF7, 0xF1]
        );
        // idiv rcx => REX.W F7 F9
        assert_eq!(
            emit_one(Inst::Div {
                is64: true,
                signed: true,
                divisor: gpr(1),
            }),
            vec![0x48, 0xF7, 0xF9]
        );
    }

    #[test]
    fn test_mov() {
        // mov rdi, rsi => REX.W 89 F7
        assert_eq!(
            emit_one(Inst::MovRR {
                is64: true,
                dst: writable_gpr(7),
                src: gpr(6),
            }),
            vec![0x48, 0x89, 0xF7]
        );
        // mov eax, 0x12345678 => B8 78 56 34 12
        assert_eq!(
            emit_one(Inst::Imm {
                dst: writable_gpr(0),
                simm64: 0x12345678,
            }),
            vec![0xB8, 0x78, 0x56, 0x34, 0x12]
        );
        // movabs rax, imm64 => REX.W B8 ..
        assert_eq!(
            emit_one(Inst::Imm {
                dst: writable_gpr(0),
                simm64: 0x1_0000_0000,
            }),
            vec![0x48, 0xB8, 0, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn test_load_store() {
        // mov rax, [rdi] => REX.W 8B 07
        assert_eq!(
            emit_one(Inst::Load {
                bytes: 8,
                sign_extend: false,
                dst: writable_gpr(0),
                addr: Amode::ImmReg {
                    simm32: 0,
                    base: gpr(7)
                },
            }),
            vec![0x48, 0x8B, 0x07]
        );
        // mov rax, [rdi+16] => REX.W 8B 47 10
        assert_eq!(
            emit_one(Inst::Load {
                bytes: 8,
                sign_extend: false,
                dst: writable_gpr(0),
                addr: Amode::ImmReg {
                    simm32: 16,
                    base: gpr(7)
                },
            }),
            vec![0x48, 0x8B, 0x47, 0x10]
        );
        // movzx rax, byte [rdi] => REX.W 0F B6 07
        assert_eq!(
            emit_one(Inst::Load {
                bytes: 1,
                sign_extend: false,
                dst: writable_gpr(0),
                addr: Amode::ImmReg {
                    simm32: 0,
                    base: gpr(7)
                },
            }),
            vec![0x48, 0x0F, 0xB6, 0x07]
        );
        // mov [rdi], rax => REX.W 89 07
        assert_eq!(
            emit_one(Inst::Store {
                bytes: 8,
                src: gpr(0),
                addr: Amode::ImmReg {
                    simm32: 0,
                    base: gpr(7)
                },
            }),
            vec![0x48, 0x89, 0x07]
        );
        // mov rax, [rsp+8]: SIB required for rsp base.
        assert_eq!(
            emit_one(Inst::Load {
                bytes: 8,
                sign_extend: false,
                dst: writable_gpr(0),
                addr: Amode::ImmReg {
                    simm32: 8,
                    base: rsp()
                },
            }),
            vec![0x48, 0x8B, 0x44, 0x24, 0x08]
        );
        // lea rax, [rdi + rsi*8 + 4]
        assert_eq!(
            emit_one(Inst::LoadAddr {
                dst: writable_gpr(0),
                addr: Amode::ImmRegRegShift {
                    simm32: 4,
                    base: gpr(7),
                    index: gpr(6),
                    shift: 3
                },
            }),
            vec![0x48, 0x8D, 0x44, 0xF7, 0x04]
        );
    }

    #[test]
    fn test_shift_cmp() {
        // shl rax, 3 => REX.W C1 E0 03
        assert_eq!(
            emit_one(Inst::Shift {
                kind: ShiftKind::Shl,
                is64: true,
                dst: writable_gpr(0),
                num_bits: Some(3),
            }),
            vec![0x48, 0xC1, 0xE0, 0x03]
        );
        // shr rax, cl => REX.W D3 E8
        assert_eq!(
            emit_one(Inst::Shift {
                kind: ShiftKind::ShrLogical,
                is64: true,
                dst: writable_gpr(0),
                num_bits: None,
            }),
            vec![0x48, 0xD3, 0xE8]
        );
        // cmp rax, rcx => REX.W 39 C8
        assert_eq!(
            emit_one(Inst::CmpRR {
                is64: true,
                a: gpr(0),
                b: gpr(1),
            }),
            vec![0x48, 0x39, 0xC8]
        );
        // cmp rax, 100 => REX.W 83 F8 64
        assert_eq!(
            emit_one(Inst::CmpRImm {
                is64: true,
                a: gpr(0),
                simm32: 100,
            }),
            vec![0x48, 0x83, 0xF8, 0x64]
        );
    }

    #[test]
    fn test_misc() {
        // push rbp / pop rbp
        assert_eq!(emit_one(Inst::Push64 { src: rbp() }), vec![0x55]);
        assert_eq!(
            emit_one(Inst::Pop64 {
                dst: Writable::from_reg(rbp())
            }),
            vec![0x5D]
        );
        // ret
        assert_eq!(emit_one(Inst::EpilogueRet), vec![0xC3]);
        // ud2
        assert_eq!(
            emit_one(Inst::Ud2 {
                trap_code: TrapCode::UnreachableCodeReached
            }),
            vec![0x0F, 0x0B]
        );
        // cmove rax, rcx => REX.W 0F 44 C1
        assert_eq!(
            emit_one(Inst::Cmove {
                is64: true,
                cc: CC::from_intcc(IntCC::Equal),
                dst: writable_gpr(0),
                src: gpr(1),
            }),
            vec![0x48, 0x0F, 0x44, 0xC1]
        );
    }
}
