//! s390x instruction definitions and binary emission.
//!
//! Instructions are encoded in the classic z/Architecture formats: RR and
//! RRE register forms, RI/RIL immediate forms, RXY displacement forms and
//! RSY shifts. s390x is big-endian, so all words are emitted byte by
//! byte, most significant first.

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

/// A general-purpose register by number (r0-r15).
pub fn gpr(num: u8) -> Reg {
    assert!(num < 16);
    Reg::Real(RealReg::new(RegClass::Int, num))
}

/// A writable general-purpose register.
pub fn writable_gpr(num: u8) -> Writable<Reg> {
    Writable::from_reg(gpr(num))
}

/// The stack pointer, r15.
pub fn stack_reg() -> Reg {
    gpr(15)
}

/// The return-address register, r14.
pub fn link_reg() -> Reg {
    gpr(14)
}

/// The allocatable-register environment for s390x.
///
/// r0/r1 are the spill temporaries (r0 has special meaning as a base
/// register and is never used as one); r14 (link) and r15 (SP) are
/// reserved.
pub fn create_machine_env() -> MachineEnv {
    let mut int_regs = vec![];
    // Caller-saved argument/scratch registers first.
    for &enc in &[2u8, 3, 4, 5] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    // Callee-saved.
    for &enc in &[6u8, 7, 8, 9, 10, 11, 12, 13] {
        int_regs.push(RealReg::new(RegClass::Int, enc));
    }
    let float_regs = (0..14u8).map(|x| RealReg::new(RegClass::Float, x)).collect();
    MachineEnv {
        int_regs,
        float_regs,
        callee_saved: [6u8, 7, 8, 9, 10, 11, 12, 13]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect(),
        spilltmps: [
            [
                RealReg::new(RegClass::Int, 0),
                RealReg::new(RegClass::Int, 1),
            ],
            [
                RealReg::new(RegClass::Float, 14),
                RealReg::new(RegClass::Float, 15),
            ],
        ],
    }
}

/// Branch-condition masks for BRC/BRCL after a compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CondMask(u8);

impl CondMask {
    /// After CGR/CLGR: a == b.
    pub fn eq() -> Self {
        CondMask(8)
    }
    /// a != b.
    pub fn ne() -> Self {
        CondMask(6)
    }
    /// a < b.
    pub fn lt() -> Self {
        CondMask(4)
    }
    /// a > b.
    pub fn gt() -> Self {
        CondMask(2)
    }
    /// a <= b.
    pub fn le() -> Self {
        CondMask(12)
    }
    /// a >= b.
    pub fn ge() -> Self {
        CondMask(10)
    }
    /// Always.
    pub fn always() -> Self {
        CondMask(15)
    }
    /// The inverted mask.
    pub fn invert(self) -> Self {
        CondMask(!self.0 & 0xf)
    }
    /// The 4-bit mask value.
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// An RRE-format ALU operation (two-address: r1 = r1 op r2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOp {
    Add,  // AGR
    Sub,  // SGR
    And,  // NGR
    Or,   // OGR
    Xor,  // XGR
    Mul,  // MSGR
}

impl AluOp {
    fn opcode(self) -> u16 {
        match self {
            AluOp::Add => 0xb908,
            AluOp::Sub => 0xb909,
            AluOp::And => 0xb980,
            AluOp::Or => 0xb981,
            AluOp::Xor => 0xb982,
            AluOp::Mul => 0xb90c,
        }
    }
}

/// An RSY-format shift operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ShiftOp {
    Sllg,
    Srlg,
    Srag,
}

impl ShiftOp {
    fn opcode2(self) -> u8 {
        match self {
            ShiftOp::Sllg => 0x0d,
            ShiftOp::Srlg => 0x0c,
            ShiftOp::Srag => 0x0a,
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

/// An s390x machine instruction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Inst {
    /// RRE ALU operation, two-address.
    AluRR {
        op: AluOp,
        dst: Writable<Reg>,
        src: Reg,
    },
    /// Load a 32-bit signed immediate (LGFI), optionally inserting the
    /// high 32 bits (IIHF).
    Imm64 {
        dst: Writable<Reg>,
        value: u64,
    },
    /// Register move (LGR).
    MovRR {
        dst: Writable<Reg>,
        src: Reg,
    },
    /// A load (RXY): 1/2/4/8 bytes, sign- or zero-extending.
    Load {
        bytes: u8,
        sign_extend: bool,
        dst: Writable<Reg>,
        base: Reg,
        disp: i32,
    },
    /// A store (RXY) of the low `bytes` of src.
    Store {
        bytes: u8,
        src: Reg,
        base: Reg,
        disp: i32,
    },
    /// A load from a frame region.
    LoadStack {
        bytes: u8,
        dst: Writable<Reg>,
        mem: StackAMode,
    },
    /// A store to a frame region.
    StoreStack {
        bytes: u8,
        src: Reg,
        mem: StackAMode,
    },
    /// The address of a frame-region location (LAY).
    StackAddr {
        dst: Writable<Reg>,
        mem: StackAMode,
    },
    /// Add a 16-bit signed immediate (AGHI).
    AddImm16 {
        dst: Writable<Reg>,
        imm: i16,
    },
    /// An RSY shift by immediate.
    ShiftImm {
        op: ShiftOp,
        dst: Writable<Reg>,
        src: Reg,
        amt: u8,
    },
    /// An RSY shift by register.
    ShiftReg {
        op: ShiftOp,
        dst: Writable<Reg>,
        src: Reg,
        amt: Reg,
    },
    /// Compare two registers (CGR/CLGR), setting the condition code.
    Cmp {
        signed: bool,
        a: Reg,
        b: Reg,
    },
    /// Materialize the condition code into 0/1.
    CSet {
        dst: Writable<Reg>,
        mask: CondMask,
    },
    /// Conditional select on the condition code.
    CSel {
        dst: Writable<Reg>,
        mask: CondMask,
        if_true: Reg,
        if_false: Reg,
    },
    /// Divide the r4:r5 pair by the divisor: quotient in r5, remainder
    /// in r4 (DSGR/DLGR).
    Div {
        signed: bool,
        divisor: Reg,
    },
    /// Direct or indirect call (BRASL / BASR).
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
    /// The actual `br %r14`.
    EpilogueRet,
    /// Unconditional branch (BRCL 15).
    Jump {
        dest: MachLabel,
    },
    /// Conditional branch: BRCL mask to taken, BRCL 15 to not_taken.
    CondBr {
        mask: CondMask,
        taken: MachLabel,
        not_taken: MachLabel,
    },
    /// One-armed conditional branch.
    OneWayCondBr {
        mask: CondMask,
        taken: MachLabel,
    },
    /// Branch over an inline trap unless the condition holds.
    TrapIf {
        mask: CondMask,
        trap_code: TrapCode,
    },
    /// An unconditional trap (invalid opcode).
    Trap {
        trap_code: TrapCode,
    },
    /// Load the address of a symbol (LARL with a pc32dbl relocation).
    LoadExtName {
        dst: Writable<Reg>,
        name: Box<ExternalName>,
        offset: i64,
    },
    /// Save registers in the caller-provided save area (STMG) for the
    /// prologue.
    Stmg {
        from: Reg,
        to: Reg,
        base: Reg,
        disp: i32,
    },
    /// Reload registers from the save area (LMG).
    Lmg {
        from: Writable<Reg>,
        to: Writable<Reg>,
        base: Reg,
        disp: i32,
    },
    /// No-op (BCR 0,0).
    Nop,
}

fn enc(reg: Reg) -> u8 {
    reg.to_real_reg().expect("real register").hw_enc()
}

// Big-endian emission helpers.

fn put2(sink: &mut MachBuffer<Inst>, halfword: u16) {
    sink.put1((halfword >> 8) as u8);
    sink.put1(halfword as u8);
}

fn put4(sink: &mut MachBuffer<Inst>, word: u32) {
    put2(sink, (word >> 16) as u16);
    put2(sink, word as u16);
}

/// RRE: opcode(16) ........ r1 r2.
fn enc_rre(sink: &mut MachBuffer<Inst>, opcode: u16, r1: u8, r2: u8) {
    put2(sink, opcode);
    sink.put1(0);
    sink.put1((r1 << 4) | r2);
}

/// RR: opcode(8) r1 r2.
fn enc_rr(sink: &mut MachBuffer<Inst>, opcode: u8, r1: u8, r2: u8) {
    sink.put1(opcode);
    sink.put1((r1 << 4) | r2);
}

/// RI: opcode(8) r1 op(4) imm16.
fn enc_ri(sink: &mut MachBuffer<Inst>, opcode: u8, r1: u8, op2: u8, imm16: u16) {
    sink.put1(opcode);
    sink.put1((r1 << 4) | op2);
    put2(sink, imm16);
}

/// RIL: opcode(8) r1 op(4) imm32.
fn enc_ril(sink: &mut MachBuffer<Inst>, opcode: u8, r1: u8, op2: u8, imm32: u32) {
    sink.put1(opcode);
    sink.put1((r1 << 4) | op2);
    put4(sink, imm32);
}

/// RXY: opcode(8) r1 x2 b2 dl(12) dh(8) opcode2(8).
fn enc_rxy(sink: &mut MachBuffer<Inst>, opcode: u8, opcode2: u8, r1: u8, b2: u8, disp: i32) {
    debug_assert!((-(1 << 19)..(1 << 19)).contains(&disp));
    let d = disp as u32 & 0xf_ffff;
    let dl = d & 0xfff;
    let dh = (d >> 12) & 0xff;
    sink.put1(opcode);
    sink.put1(r1 << 4); // x2 = 0
    sink.put1((b2 << 4) | ((dl >> 8) as u8));
    sink.put1(dl as u8);
    sink.put1(dh as u8);
    sink.put1(opcode2);
}

/// RSY: opcode(8) r1 r3 b2 dl(12) dh(8) opcode2(8).
fn enc_rsy(
    sink: &mut MachBuffer<Inst>,
    opcode: u8,
    opcode2: u8,
    r1: u8,
    r3: u8,
    b2: u8,
    disp: u32,
) {
    let dl = disp & 0xfff;
    let dh = (disp >> 12) & 0xff;
    sink.put1(opcode);
    sink.put1((r1 << 4) | r3);
    sink.put1((b2 << 4) | ((dl >> 8) as u8));
    sink.put1(dl as u8);
    sink.put1(dh as u8);
    sink.put1(opcode2);
}

/// Resolve a frame-region reference to (base, disp), which always fits:
/// RXY displacements are 20-bit signed.
///
/// The bottom 160 bytes of the frame are the register save area
/// belonging to our callees, so every region sits 160 bytes above the
/// generic layout's origin.
fn finalize_stack(mem: StackAMode, state: &EmitState) -> (Reg, i32) {
    let off = mem.resolve(&state.frame) + 160;
    assert!(
        (-(1 << 19)..(1 << 19)).contains(&off),
        "frame offset out of RXY range"
    );
    (stack_reg(), off as i32)
}

impl MachInst for Inst {
    type LabelUse = LabelUse;

    fn get_operands(&self, collector: &mut OperandCollector) {
        match self {
            Inst::Nop
            | Inst::Ret
            | Inst::EpilogueRet
            | Inst::Jump { .. }
            | Inst::Trap { .. }
            | Inst::CondBr { .. }
            | Inst::OneWayCondBr { .. }
            | Inst::TrapIf { .. } => {}
            Inst::AluRR { dst, src, .. } => {
                collector.reg_mod(*dst);
                collector.reg_use(*src);
            }
            Inst::Imm64 { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::MovRR { dst, src } => {
                collector.reg_def(*dst);
                collector.reg_use(*src);
            }
            Inst::Load { dst, base, .. } => {
                collector.reg_def(*dst);
                collector.reg_use(*base);
            }
            Inst::Store { src, base, .. } => {
                collector.reg_use(*src);
                collector.reg_use(*base);
            }
            Inst::LoadStack { dst, .. } | Inst::StackAddr { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::StoreStack { src, .. } => {
                collector.reg_use(*src);
            }
            Inst::AddImm16 { dst, .. } => {
                collector.reg_mod(*dst);
            }
            Inst::ShiftImm { dst, src, .. } => {
                collector.reg_def(*dst);
                collector.reg_use(*src);
            }
            Inst::ShiftReg { dst, src, amt, .. } => {
                collector.reg_def(*dst);
                collector.reg_use(*src);
                collector.reg_use(*amt);
            }
            Inst::Cmp { a, b, .. } => {
                collector.reg_use(*a);
                collector.reg_use(*b);
            }
            Inst::CSet { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::CSel {
                dst,
                if_true,
                if_false,
                ..
            } => {
                collector.reg_def(*dst);
                collector.reg_use(*if_true);
                collector.reg_use(*if_false);
            }
            Inst::Div { divisor, .. } => {
                collector.reg_use(*divisor);
                collector.fixed_uses.push(RealReg::new(RegClass::Int, 4));
                collector.fixed_uses.push(RealReg::new(RegClass::Int, 5));
                collector.reg_clobbers(&[
                    RealReg::new(RegClass::Int, 4),
                    RealReg::new(RegClass::Int, 5),
                ]);
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
            Inst::LoadExtName { dst, .. } => {
                collector.reg_def(*dst);
            }
            Inst::Stmg { from, to, base, .. } => {
                collector.reg_use(*from);
                collector.reg_use(*to);
                collector.reg_use(*base);
            }
            Inst::Lmg { from, to, base, .. } => {
                collector.reg_def(*from);
                collector.reg_def(*to);
                collector.reg_use(*base);
            }
        }
    }

    fn map_regs(&mut self, mapper: &dyn RegMapper) {
        match self {
            Inst::Nop
            | Inst::Ret
            | Inst::EpilogueRet
            | Inst::Jump { .. }
            | Inst::Trap { .. }
            | Inst::CondBr { .. }
            | Inst::OneWayCondBr { .. }
            | Inst::TrapIf { .. }
            | Inst::TailCall { .. } => {}
            Inst::AluRR { dst, src, .. } | Inst::MovRR { dst, src } => {
                map_writable(mapper, dst);
                map_reg(mapper, src);
            }
            Inst::Imm64 { dst, .. }
            | Inst::CSet { dst, .. }
            | Inst::AddImm16 { dst, .. }
            | Inst::LoadStack { dst, .. }
            | Inst::StackAddr { dst, .. }
            | Inst::LoadExtName { dst, .. } => {
                map_writable(mapper, dst);
            }
            Inst::Load { dst, base, .. } => {
                map_writable(mapper, dst);
                map_reg(mapper, base);
            }
            Inst::Store { src, base, .. } => {
                map_reg(mapper, src);
                map_reg(mapper, base);
            }
            Inst::StoreStack { src, .. } => {
                map_reg(mapper, src);
            }
            Inst::ShiftImm { dst, src, .. } => {
                map_writable(mapper, dst);
                map_reg(mapper, src);
            }
            Inst::ShiftReg { dst, src, amt, .. } => {
                map_writable(mapper, dst);
                map_reg(mapper, src);
                map_reg(mapper, amt);
            }
            Inst::Cmp { a, b, .. } => {
                map_reg(mapper, a);
                map_reg(mapper, b);
            }
            Inst::CSel {
                dst,
                if_true,
                if_false,
                ..
            } => {
                map_writable(mapper, dst);
                map_reg(mapper, if_true);
                map_reg(mapper, if_false);
            }
            Inst::Div { divisor, .. } => {
                map_reg(mapper, divisor);
            }
            Inst::Call { info } => {
                if let Some(r) = &mut info.reg {
                    map_reg(mapper, r);
                }
            }
            Inst::Stmg { from, to, base, .. } => {
                map_reg(mapper, from);
                map_reg(mapper, to);
                map_reg(mapper, base);
            }
            Inst::Lmg { from, to, base, .. } => {
                map_writable(mapper, from);
                map_writable(mapper, to);
                map_reg(mapper, base);
            }
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::MovRR { dst, src } => Some((dst, src)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Ret | Inst::EpilogueRet => MachTerminator::Ret,
            Inst::TailCall { .. } => MachTerminator::RetCall,
            Inst::Jump { .. } => MachTerminator::Uncond,
            Inst::CondBr { .. } => MachTerminator::Cond,
            Inst::Trap { .. } => MachTerminator::Uncond,
            _ => MachTerminator::None,
        }
    }

    fn gen_move(to: Writable<Reg>, from: Reg, _ty: Type) -> Inst {
        Inst::MovRR { dst: to, src: from }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::Jump { dest: target }
    }

    fn gen_ret() -> Inst {
        Inst::Ret
    }

    fn worst_case_size() -> CodeOffset {
        // Imm64 (LGFI + IIHF) plus slack.
        16
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
                enc_rr(sink, 0x07, 0, 0);
            }

            &Inst::AluRR { op, dst, src } => {
                enc_rre(sink, op.opcode(), enc(dst.to_reg()), enc(src));
            }

            &Inst::Imm64 { dst, value } => {
                let d = enc(dst.to_reg());
                let lo = value as u32;
                let hi = (value >> 32) as u32;
                let sext_lo = (lo as i32) as i64 as u64;
                // LGFI loads a sign-extended 32-bit immediate.
                enc_ril(sink, 0xc0, d, 0x1, lo);
                if value != sext_lo {
                    // IIHF inserts the high 32 bits.
                    enc_ril(sink, 0xc0, d, 0x8, hi);
                }
            }

            &Inst::MovRR { dst, src } => {
                enc_rre(sink, 0xb904, enc(dst.to_reg()), enc(src));
            }

            &Inst::Load {
                bytes,
                sign_extend,
                dst,
                base,
                disp,
            } => {
                let opcode2 = match (bytes, sign_extend) {
                    (1, true) => 0x77,  // LGB
                    (1, false) => 0x90, // LLGC
                    (2, true) => 0x15,  // LGH
                    (2, false) => 0x91, // LLGH
                    (4, true) => 0x14,  // LGF
                    (4, false) => 0x16, // LLGF
                    (8, _) => 0x04,     // LG
                    _ => unreachable!("bad load width"),
                };
                enc_rxy(sink, 0xe3, opcode2, enc(dst.to_reg()), enc(base), disp);
            }

            &Inst::Store {
                bytes,
                src,
                base,
                disp,
            } => {
                let opcode2 = match bytes {
                    1 => 0x72, // STC
                    2 => 0x70, // STH
                    4 => 0x50, // ST
                    8 => 0x24, // STG
                    _ => unreachable!("bad store width"),
                };
                enc_rxy(sink, 0xe3, opcode2, enc(src), enc(base), disp);
            }

            &Inst::LoadStack { bytes, dst, mem } => {
                let (base, disp) = finalize_stack(mem, state);
                Inst::Load {
                    bytes,
                    sign_extend: true,
                    dst,
                    base,
                    disp,
                }
                .emit(sink, state);
            }
            &Inst::StoreStack { bytes, src, mem } => {
                let (base, disp) = finalize_stack(mem, state);
                Inst::Store {
                    bytes,
                    src,
                    base,
                    disp,
                }
                .emit(sink, state);
            }
            &Inst::StackAddr { dst, mem } => {
                let (base, disp) = finalize_stack(mem, state);
                // LAY.
                enc_rxy(sink, 0xe3, 0x71, enc(dst.to_reg()), enc(base), disp);
            }

            &Inst::AddImm16 { dst, imm } => {
                // AGHI.
                enc_ri(sink, 0xa7, enc(dst.to_reg()), 0xb, imm as u16);
            }

            &Inst::ShiftImm { op, dst, src, amt } => {
                enc_rsy(
                    sink,
                    0xeb,
                    op.opcode2(),
                    enc(dst.to_reg()),
                    enc(src),
                    0,
                    u32::from(amt & 63),
                );
            }
            &Inst::ShiftReg { op, dst, src, amt } => {
                // The shift amount comes from the base register field.
                enc_rsy(sink, 0xeb, op.opcode2(), enc(dst.to_reg()), enc(src), enc(amt), 0);
            }

            &Inst::Cmp { signed, a, b } => {
                let opcode = if signed { 0xb920 } else { 0xb921 };
                enc_rre(sink, opcode, enc(a), enc(b));
            }

            &Inst::CSet { dst, mask } => {
                let d = enc(dst.to_reg());
                // lghi dst, 1 ; brc mask, +4 halfwords ; lghi dst, 0.
                enc_ri(sink, 0xa7, d, 0x9, 1);
                enc_ri(sink, 0xa7, mask.bits(), 0x4, 4);
                enc_ri(sink, 0xa7, d, 0x9, 0);
            }

            &Inst::CSel {
                dst,
                mask,
                if_true,
                if_false,
            } => {
                let d = enc(dst.to_reg());
                // lgr dst, if_true ; brc mask, +4hw ; lgr dst, if_false.
                enc_rre(sink, 0xb904, d, enc(if_true));
                enc_ri(sink, 0xa7, mask.bits(), 0x4, 4);
                enc_rre(sink, 0xb904, d, enc(if_false));
            }

            &Inst::Div { signed, divisor } => {
                // DSGR/DLGR on the r4:r5 pair.
                let opcode = if signed { 0xb90d } else { 0xb987 };
                enc_rre(sink, opcode, 4, enc(divisor));
            }

            Inst::Call { info } => match (&info.dest, info.reg) {
                (Some(name), None) => {
                    // brasl %r14, sym.
                    sink.put1(0xc0);
                    sink.put1((14 << 4) | 0x5);
                    sink.add_reloc(Reloc::S390xPCRel32Dbl, name, 2);
                    put4(sink, 0);
                }
                (None, Some(reg)) => {
                    // basr %r14, reg.
                    enc_rr(sink, 0x0d, 14, enc(reg));
                }
                _ => unreachable!("call needs exactly one destination"),
            },

            Inst::TailCall { dest, .. } => {
                let frame = state.frame.clone();
                for inst in crate::isa::s390x::abi::gen_epilogue_frame_restore(&frame) {
                    inst.emit(sink, state);
                }
                // brcl 15, sym.
                sink.put1(0xc0);
                sink.put1((15 << 4) | 0x4);
                sink.add_reloc(Reloc::S390xPCRel32Dbl, dest, 2);
                put4(sink, 0);
            }

            Inst::Ret | Inst::EpilogueRet => {
                // br %r14 (BCR 15, r14).
                enc_rr(sink, 0x07, 15, 14);
            }

            &Inst::Jump { dest } => {
                sink.put1(0xc0);
                sink.put1((15 << 4) | 0x4);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, dest, LabelUse::PCRel32Dbl);
                put4(sink, 0);
            }

            &Inst::CondBr {
                mask,
                taken,
                not_taken,
            } => {
                sink.put1(0xc0);
                sink.put1((mask.bits() << 4) | 0x4);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::PCRel32Dbl);
                put4(sink, 0);

                sink.put1(0xc0);
                sink.put1((15 << 4) | 0x4);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, not_taken, LabelUse::PCRel32Dbl);
                put4(sink, 0);
            }

            &Inst::OneWayCondBr { mask, taken } => {
                sink.put1(0xc0);
                sink.put1((mask.bits() << 4) | 0x4);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, taken, LabelUse::PCRel32Dbl);
                put4(sink, 0);
            }

            &Inst::TrapIf { mask, trap_code } => {
                // brc !mask, +3 halfwords (over the 2-byte trap).
                enc_ri(sink, 0xa7, mask.invert().bits(), 0x4, 3);
                sink.add_trap(trap_code);
                put2(sink, 0x0000);
            }
            &Inst::Trap { trap_code } => {
                sink.add_trap(trap_code);
                put2(sink, 0x0000);
            }

            Inst::LoadExtName { dst, name, offset } => {
                // larl dst, sym.
                sink.put1(0xc0);
                sink.put1((enc(dst.to_reg()) << 4) | 0x0);
                sink.add_reloc(Reloc::S390xPCRel32Dbl, name, 2 + *offset);
                put4(sink, 0);
            }

            &Inst::Stmg {
                from,
                to,
                base,
                disp,
            } => {
                enc_rsy(sink, 0xeb, 0x24, enc(from), enc(to), enc(base), disp as u32);
            }
            &Inst::Lmg { from, to, base, disp } => {
                enc_rsy(
                    sink,
                    0xeb,
                    0x04,
                    enc(from.to_reg()),
                    enc(to.to_reg()),
                    enc(base),
                    disp as u32,
                );
            }
        }
    }

    fn pretty_print(&self, _state: &mut EmitState) -> String {
        format!("{:?}", self)
    }
}

/// Label-use kinds for s390x.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// 32-bit PC-relative offset in halfwords (`pc32dbl`), measured from
    /// the start of the instruction, i.e. 2 bytes before the patch
    /// field.
    PCRel32Dbl,
}

impl MachInstLabelUse for LabelUse {
    const ALIGN: CodeOffset = 2;

    fn max_pos_range(self) -> CodeOffset {
        0xffff_fffe
    }
    fn max_neg_range(self) -> CodeOffset {
        0xffff_ffff
    }
    fn patch_size(self) -> CodeOffset {
        4
    }
    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        // The offset is relative to the instruction start (2 bytes before
        // the immediate field), in halfwords, big-endian.
        let pc_rel = (label_offset as i64) - (use_offset as i64) + 2;
        debug_assert_eq!(pc_rel & 1, 0);
        let halfwords = (pc_rel >> 1) as i32;
        buffer[0..4].copy_from_slice(&halfwords.to_be_bytes());
    }
    fn supports_veneer(self) -> bool {
        false
    }
    fn veneer_size(self) -> CodeOffset {
        0
    }
    fn generate_veneer(self, _buffer: &mut [u8], _offset: CodeOffset) -> (CodeOffset, Self) {
        panic!("pc32dbl does not need veneers")
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
    fn test_rre() {
        // agr %r2, %r3 => b908 0023
        assert_eq!(
            emit_one(Inst::AluRR {
                op: AluOp::Add,
                dst: writable_gpr(2),
                src: gpr(3),
            }),
            vec![0xb9, 0x08, 0x00, 0x23]
        );
        // lgr %r2, %r3 => b904 0023
        assert_eq!(
            emit_one(Inst::MovRR {
                dst: writable_gpr(2),
                src: gpr(3),
            }),
            vec![0xb9, 0x04, 0x00, 0x23]
        );
        // cgr %r2, %r3 => b920 0023
        assert_eq!(
            emit_one(Inst::Cmp {
                signed: true,
                a: gpr(2),
                b: gpr(3),
            }),
            vec![0xb9, 0x20, 0x00, 0x23]
        );
    }

    #[test]
    fn test_ril_rxy() {
        // lgfi %r2, 64 => c02b... : c0 21 00000040
        assert_eq!(
            emit_one(Inst::Imm64 {
                dst: writable_gpr(2),
                value: 64,
            }),
            vec![0xc0, 0x21, 0x00, 0x00, 0x00, 0x40]
        );
        // lg %r2, 160(%r15) => e3 20 f0a0 00 04
        assert_eq!(
            emit_one(Inst::Load {
                bytes: 8,
                sign_extend: true,
                dst: writable_gpr(2),
                base: gpr(15),
                disp: 160,
            }),
            vec![0xe3, 0x20, 0xf0, 0xa0, 0x00, 0x04]
        );
        // stg %r2, 160(%r15) => e3 20 f0a0 00 24
        assert_eq!(
            emit_one(Inst::Store {
                bytes: 8,
                src: gpr(2),
                base: gpr(15),
                disp: 160,
            }),
            vec![0xe3, 0x20, 0xf0, 0xa0, 0x00, 0x24]
        );
    }

    #[test]
    fn test_ri_rsy() {
        // aghi %r15, -160 => a7 fb ff60
        assert_eq!(
            emit_one(Inst::AddImm16 {
                dst: writable_gpr(15),
                imm: -160,
            }),
            vec![0xa7, 0xfb, 0xff, 0x60]
        );
        // sllg %r2, %r3, 3 => eb 23 0003 00 0d
        assert_eq!(
            emit_one(Inst::ShiftImm {
                op: ShiftOp::Sllg,
                dst: writable_gpr(2),
                src: gpr(3),
                amt: 3,
            }),
            vec![0xeb, 0x23, 0x00, 0x03, 0x00, 0x0d]
        );
        // stmg %r14, %r15, 112(%r15) => eb ef f0 70 00 24
        assert_eq!(
            emit_one(Inst::Stmg {
                from: gpr(14),
                to: gpr(15),
                base: gpr(15),
                disp: 112,
            }),
            vec![0xeb, 0xef, 0xf0, 0x70, 0x00, 0x24]
        );
    }

    #[test]
    fn test_branch_ret() {
        // br %r14 => 07 fe
        assert_eq!(emit_one(Inst::EpilogueRet), vec![0x07, 0xfe]);
    }
}
