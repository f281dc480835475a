//! AArch64 ISA: binary code emission.

use crate::binemit::Reloc;
use crate::machinst::abi::FrameLayout;
use crate::machinst::buffer::MachBuffer;
use crate::machinst::reg::{Reg, RegClass, Writable};
use crate::machinst::{MachInstEmit, MachInstEmitState};
use crate::isa::aarch64::inst::*;
use smallvec::{smallvec, SmallVec};

/// State carried between emissions of a sequence of instructions.
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
    /// The frame layout of the function being emitted.
    pub fn frame_layout(&self) -> &FrameLayout {
        &self.frame
    }
}

/// Memory addressing mode finalization: convert "special" modes (e.g.,
/// generic stack-region offsets) into real addressing modes, possibly by
/// emitting some helper instructions that come immediately before the use
/// of this amode.
pub fn mem_finalize(mem: &AMode, access_bytes: u8, state: &EmitState) -> (SmallVec<[Inst; 4]>, AMode) {
    match mem {
        &AMode::NominalSP(stack_mode) => {
            let off = stack_mode.resolve(&state.frame);
            if let Some(simm9) = SImm9::maybe_from_i64(off) {
                (smallvec![], AMode::Unscaled(stack_reg(), simm9))
            } else if let Some(uimm12) = UImm12Scaled::maybe_from_i64(off, access_bytes) {
                (smallvec![], AMode::UnsignedOffset(stack_reg(), uimm12))
            } else {
                let tmp = Writable::from_reg(tmp2_reg());
                let mut insts = Inst::load_constant(tmp, off as u64);
                insts.push(Inst::AluRRR {
                    alu_op: ALUOp::Add,
                    size: OperandSize::Size64,
                    rd: tmp,
                    rn: stack_reg(),
                    rm: tmp.to_reg(),
                });
                (insts, AMode::Unscaled(tmp.to_reg(), SImm9 { value: 0 }))
            }
        }
        &AMode::RegOffset(rn, off) => {
            if let Some(simm9) = SImm9::maybe_from_i64(off) {
                (smallvec![], AMode::Unscaled(rn, simm9))
            } else if let Some(uimm12) = UImm12Scaled::maybe_from_i64(off, access_bytes) {
                (smallvec![], AMode::UnsignedOffset(rn, uimm12))
            } else {
                let tmp = Writable::from_reg(tmp2_reg());
                let insts = Inst::load_constant(tmp, off as u64);
                (insts, AMode::RegReg(rn, tmp.to_reg()))
            }
        }
        _ => (smallvec![], *mem),
    }
}

//=============================================================================
// Instructions and subcomponents: emission

pub(crate) fn machreg_to_gpr(m: Reg) -> u32 {
    assert_eq!(m.class(), RegClass::Int);
    u32::from(m.to_real_reg().expect("real register").hw_enc() & 31)
}

pub(crate) fn machreg_to_vec(m: Reg) -> u32 {
    assert_eq!(m.class(), RegClass::Float);
    u32::from(m.to_real_reg().expect("real register").hw_enc())
}

fn machreg_to_gpr_or_vec(m: Reg) -> u32 {
    u32::from(m.to_real_reg().expect("real register").hw_enc() & 31)
}

pub(crate) fn enc_arith_rrr(
    bits_31_21: u32,
    bits_15_10: u32,
    rd: Writable<Reg>,
    rn: Reg,
    rm: Reg,
) -> u32 {
    (bits_31_21 << 21)
        | (bits_15_10 << 10)
        | machreg_to_gpr(rd.to_reg())
        | (machreg_to_gpr(rn) << 5)
        | (machreg_to_gpr(rm) << 16)
}

fn enc_arith_rr_imm12(
    bits_31_24: u32,
    immshift: u32,
    imm12: u32,
    rn: Reg,
    rd: Writable<Reg>,
) -> u32 {
    (bits_31_24 << 24)
        | (immshift << 22)
        | (imm12 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_arith_rr_imml(bits_31_23: u32, imm_bits: u32, rn: Reg, rd: Writable<Reg>) -> u32 {
    (bits_31_23 << 23) | (imm_bits << 10) | (machreg_to_gpr(rn) << 5) | machreg_to_gpr(rd.to_reg())
}

fn enc_arith_rrrr(top11: u32, rm: Reg, bit15: u32, ra: Reg, rn: Reg, rd: Writable<Reg>) -> u32 {
    (top11 << 21)
        | (machreg_to_gpr(rm) << 16)
        | (bit15 << 15)
        | (machreg_to_gpr(ra) << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_bfm(opc: u32, size: OperandSize, rd: Writable<Reg>, rn: Reg, immr: u32, imms: u32) -> u32 {
    let n_bit = size.sf_bit();
    0b0_00_100110_0_000000_000000_00000_00000
        | (size.sf_bit() << 31)
        | (opc << 29)
        | (n_bit << 22)
        | (immr << 16)
        | (imms << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_jump26(op_31_26: u32, off_26_0: u32) -> u32 {
    assert!(off_26_0 < (1 << 26));
    (op_31_26 << 26) | off_26_0
}

fn enc_cmpbr(op_31_24: u32, off_18_0: u32, reg: Reg) -> u32 {
    assert!(off_18_0 < (1 << 19));
    (op_31_24 << 24) | (off_18_0 << 5) | machreg_to_gpr(reg)
}

fn enc_cbr(op_31_24: u32, off_18_0: u32, op_4: u32, cond: u32) -> u32 {
    assert!(off_18_0 < (1 << 19));
    assert!(cond < (1 << 4));
    (op_31_24 << 24) | (off_18_0 << 5) | (op_4 << 4) | cond
}

fn enc_conditional_br(taken: BranchTarget, kind: CondBrKind) -> u32 {
    match kind {
        CondBrKind::Zero(reg) => enc_cmpbr(0b1_011010_0, taken.as_offset19_or_zero(), reg),
        CondBrKind::NotZero(reg) => enc_cmpbr(0b1_011010_1, taken.as_offset19_or_zero(), reg),
        CondBrKind::Cond(c) => enc_cbr(0b01010100, taken.as_offset19_or_zero(), 0b0, c.bits()),
    }
}

fn enc_move_wide(op: u32, rd: Writable<Reg>, imm: MoveWideConst, size: OperandSize) -> u32 {
    assert!(imm.shift <= 0b11);
    0x12800000
        | (size.sf_bit() << 31)
        | (op << 29)
        | (u32::from(imm.shift) << 21)
        | (u32::from(imm.bits) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_ldst_simm9(op_31_22: u32, simm9: SImm9, op_11_10: u32, rn: Reg, rd: Reg) -> u32 {
    (op_31_22 << 22)
        | (simm9.bits() << 12)
        | (op_11_10 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr_or_vec(rd)
}

fn enc_ldst_uimm12(op_31_22: u32, uimm12: UImm12Scaled, rn: Reg, rd: Reg) -> u32 {
    (op_31_22 << 22)
        | (uimm12.bits() << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr_or_vec(rd)
}

/// Build the top ten bits (31..22) of a load/store encoding from its
/// fields: the size bits (31-30), the V bit (FP/vector), whether this is
/// the scaled-unsigned-immediate form (bits 25-24 = 01), and the opc
/// field (23-22).
///
/// The 32- vs 64-bit distinction lives in the size bits, not bit 31.
fn ldst_op(size: u32, v: u32, opc: u32, uimm12_form: bool) -> u32 {
    debug_assert!(size <= 0b11 && v <= 1 && opc <= 0b11);
    (size << 8) | (0b111 << 5) | (v << 4) | ((uimm12_form as u32) << 2) | opc
}

fn enc_ldst_reg(op_31_22: u32, rn: Reg, rm: Reg, rd: Reg) -> u32 {
    // LSL extend (option 011), S=0.
    (op_31_22 << 22)
        | (1 << 21)
        | (machreg_to_gpr(rm) << 16)
        | (0b011 << 13)
        | (0b10 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr_or_vec(rd)
}

pub(crate) fn enc_ldst_imm19(op_31_24: u32, imm19: u32, rd: Reg) -> u32 {
    (op_31_24 << 24) | (imm19 << 5) | machreg_to_gpr_or_vec(rd)
}

fn enc_ldst_pair(op_31_22: u32, simm7: SImm7Scaled, rn: Reg, rt: Reg, rt2: Reg) -> u32 {
    (op_31_22 << 22)
        | (simm7.bits() << 15)
        | (machreg_to_gpr(rt2) << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rt)
}

pub(crate) fn enc_br(rn: Reg) -> u32 {
    0b1101011_0000_11111_000000_00000_00000 | (machreg_to_gpr(rn) << 5)
}

pub(crate) fn enc_adr_inst(opcode: u32, off: i32, rd: Writable<Reg>) -> u32 {
    let off = off as u32;
    let immlo = off & 3;
    let immhi = (off >> 2) & ((1 << 19) - 1);
    opcode | (immlo << 29) | (immhi << 5) | machreg_to_gpr(rd.to_reg())
}

/// ADR computes a byte-offset PC-relative address.
pub(crate) fn enc_adr(off: i32, rd: Writable<Reg>) -> u32 {
    let opcode = 0b00010000 << 24;
    enc_adr_inst(opcode, off, rd)
}

/// ADRP computes a 4 KiB-page PC-relative address; the offset operand is
/// in pages, i.e. the byte offset shifted right by 12.
pub(crate) fn enc_adrp(page_off: i32, rd: Writable<Reg>) -> u32 {
    let opcode = 0b10010000 << 24;
    enc_adr_inst(opcode, page_off, rd)
}

fn enc_csel(opc_31_21: u32, bits_11_10: u32, rd: Writable<Reg>, rn: Reg, rm: Reg, cond: Cond) -> u32 {
    (opc_31_21 << 21)
        | (machreg_to_gpr(rm) << 16)
        | (cond.bits() << 12)
        | (bits_11_10 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

/// The top 22 bits of a scalar FP 1-source instruction:
/// 000 11110 tt 1 oooooo 10000.
fn fpu_rr_top22(ftype: u32, opcode6: u32) -> u32 {
    (0b00011110 << 14) | (ftype << 12) | (1 << 11) | (opcode6 << 5) | 0b10000
}

/// The top 16 bits of an FP<->integer instruction:
/// sf 0011110 tt 1 rr ooo.
fn fpu_int_top16(sf: u32, ftype: u32, rmode: u32, opcode: u32) -> u32 {
    (sf << 15) | (0b0011110 << 8) | (ftype << 6) | (1 << 5) | (rmode << 3) | opcode
}

fn enc_fpurr(top22: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top22 << 10) | (machreg_to_vec(rn) << 5) | machreg_to_vec(rd.to_reg())
}

fn enc_fpurrr(top22: u32, rd: Writable<Reg>, rn: Reg, rm: Reg) -> u32 {
    (top22 << 10)
        | (machreg_to_vec(rm) << 16)
        | (machreg_to_vec(rn) << 5)
        | machreg_to_vec(rd.to_reg())
}

fn enc_fcmp(size: ScalarSize, rn: Reg, rm: Reg) -> u32 {
    0b000_11110_00_1_00000_00_1000_00000_00000
        | (size.ftype() << 22)
        | (machreg_to_vec(rm) << 16)
        | (machreg_to_vec(rn) << 5)
}

fn enc_fputoint(top16: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top16 << 16) | (machreg_to_vec(rn) << 5) | machreg_to_gpr(rd.to_reg())
}

fn enc_inttofpu(top16: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top16 << 16) | (machreg_to_gpr(rn) << 5) | machreg_to_vec(rd.to_reg())
}

fn enc_vec_rrr(top11: u32, rm: Reg, bit15_10: u32, rn: Reg, rd: Writable<Reg>) -> u32 {
    (top11 << 21)
        | (machreg_to_vec(rm) << 16)
        | (bit15_10 << 10)
        | (machreg_to_vec(rn) << 5)
        | machreg_to_vec(rd.to_reg())
}

fn enc_dup_gpr(size: VectorSize, rd: Writable<Reg>, rn: Reg) -> u32 {
    let imm5 = match size.lane_bits() {
        8 => 0b00001,
        16 => 0b00010,
        32 => 0b00100,
        64 => 0b01000,
        _ => unreachable!(),
    };
    0b0_0_0_01110000_00000_0_0001_1_00000_00000
        | (size.q_bit() << 30)
        | (imm5 << 16)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_vec(rd.to_reg())
}

fn enc_ldaxr_stlxr(
    access_bits: u8,
    is_load: bool,
    ordered: bool,
    rs: u32,
    rt: Reg,
    rn: Reg,
) -> u32 {
    let sz = match access_bits {
        8 => 0b00,
        16 => 0b01,
        32 => 0b10,
        64 => 0b11,
        _ => unreachable!(),
    };
    let l = if is_load { 1 } else { 0 };
    // The o0 bit (bit 15) selects the acquire/release form; per-width
    // encoders all route through here so the ordered variants are never
    // silently dropped.
    let o0 = if ordered { 1 } else { 0 };
    (sz << 30)
        | (0b001000 << 24)
        | (0 << 23)
        | (l << 22)
        | (0 << 21)
        | (rs << 16)
        | (o0 << 15)
        | (0b11111 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr_or_vec(rt)
}

fn enc_alu_rrr_op(alu_op: ALUOp, size: OperandSize) -> (u32, u32) {
    // Returns (bits_31_21, bits_15_10).
    let sf = size.sf_bit() << 10; // bit 31 within the 31..21 field
    match alu_op {
        ALUOp::Add => (0b00001011_000 | sf, 0),
        ALUOp::Sub => (0b01001011_000 | sf, 0),
        ALUOp::AddS => (0b00101011_000 | sf, 0),
        ALUOp::SubS => (0b01101011_000 | sf, 0),
        ALUOp::Adc => (0b00011010_000 | sf, 0),
        ALUOp::Sbc => (0b01011010_000 | sf, 0),
        ALUOp::And => (0b00001010_000 | sf, 0),
        ALUOp::Orr => (0b00101010_000 | sf, 0),
        ALUOp::OrrNot => (0b00101010_001 | sf, 0),
        ALUOp::Eor => (0b01001010_000 | sf, 0),
        ALUOp::Lsl => (0b00011010_110 | sf, 0b001000),
        ALUOp::Lsr => (0b00011010_110 | sf, 0b001001),
        ALUOp::Asr => (0b00011010_110 | sf, 0b001010),
        ALUOp::SMulH => (0b10011011_010, 0b011111),
        ALUOp::UMulH => (0b10011011_110, 0b011111),
        ALUOp::SDiv => (0b00011010_110 | sf, 0b000011),
        ALUOp::UDiv => (0b00011010_110 | sf, 0b000010),
    }
}

fn emit_amode_insts(
    insts: SmallVec<[Inst; 4]>,
    sink: &mut MachBuffer<Inst>,
    state: &mut EmitState,
) {
    for inst in insts {
        inst.emit(sink, state);
    }
}

fn emit_ldst(
    sink: &mut MachBuffer<Inst>,
    state: &mut EmitState,
    mem: &AMode,
    access_bytes: u8,
    rd: Reg,
    size: u32,
    v: u32,
    opc: u32,
    op_lit: Option<u32>,
) {
    let (insts, mem) = mem_finalize(mem, access_bytes, state);
    emit_amode_insts(insts, sink, state);
    match mem {
        AMode::Unscaled(rn, simm9) => {
            sink.put4(enc_ldst_simm9(ldst_op(size, v, opc, false), simm9, 0b00, rn, rd));
        }
        AMode::UnsignedOffset(rn, uimm12) => {
            sink.put4(enc_ldst_uimm12(ldst_op(size, v, opc, true), uimm12, rn, rd));
        }
        AMode::RegReg(rn, rm) => {
            sink.put4(enc_ldst_reg(ldst_op(size, v, opc, false), rn, rm, rd));
        }
        AMode::Label(label) => {
            let op_lit = op_lit.expect("literal form not available for this access");
            let inst_off = sink.cur_offset();
            sink.use_label_at_offset(inst_off, label, LabelUse::Ldr19);
            sink.put4(enc_ldst_imm19(op_lit, 0, rd));
        }
        _ => unreachable!("mem_finalize left a pseudo-mode"),
    }
}

impl MachInstEmit for Inst {
    type State = EmitState;

    fn emit(&self, sink: &mut MachBuffer<Inst>, state: &mut EmitState) {
        match self {
            &Inst::Nop4 => {
                sink.put4(0xd503201f);
            }

            &Inst::AluRRR {
                alu_op,
                size,
                rd,
                rn,
                rm,
            } => {
                let (top11, bit15_10) = enc_alu_rrr_op(alu_op, size);
                sink.put4(enc_arith_rrr(top11, bit15_10, rd, rn, rm));
            }

            &Inst::AluRRRR {
                alu_op,
                size,
                rd,
                rn,
                rm,
                ra,
            } => {
                let (top11, bit15) = match alu_op {
                    ALUOp3::MAdd => (0b0_00_11011_000, 0),
                    ALUOp3::MSub => (0b0_00_11011_000, 1),
                };
                let top11 = top11 | (size.sf_bit() << 10);
                sink.put4(enc_arith_rrrr(top11, rm, bit15, ra, rn, rd));
            }

            &Inst::AluRRImm12 {
                alu_op,
                size,
                rd,
                rn,
                imm12,
            } => {
                let top8 = match alu_op {
                    ALUOp::Add => 0b000_10001,
                    ALUOp::Sub => 0b010_10001,
                    ALUOp::AddS => 0b001_10001,
                    ALUOp::SubS => 0b011_10001,
                    _ => unreachable!("{:?} with imm12", alu_op),
                };
                let top8 = top8 | (size.sf_bit() << 7);
                sink.put4(enc_arith_rr_imm12(
                    top8,
                    imm12.shift_bits(),
                    imm12.imm_bits(),
                    rn,
                    rd,
                ));
            }

            &Inst::AluRRImmLogic {
                alu_op,
                size,
                rd,
                rn,
                imml,
            } => {
                let top9 = match alu_op {
                    ALUOp::And => 0b000_100100,
                    ALUOp::Orr => 0b001_100100,
                    ALUOp::Eor => 0b010_100100,
                    _ => unreachable!("{:?} with logical imm", alu_op),
                };
                let top9 = top9 | (size.sf_bit() << 8);
                sink.put4(enc_arith_rr_imml(top9, imml.enc_bits(), rn, rd));
            }

            &Inst::AluRRImmShift {
                alu_op,
                size,
                rd,
                rn,
                immshift,
            } => {
                // Shifts by immediate are aliases of UBFM/SBFM.
                let bits = size.bits();
                let amt = u32::from(immshift.value()) & (bits - 1);
                let insn = match alu_op {
                    ALUOp::Lsl => enc_bfm(
                        0b10,
                        size,
                        rd,
                        rn,
                        (bits - amt) & (bits - 1),
                        bits - 1 - amt,
                    ),
                    ALUOp::Lsr => enc_bfm(0b10, size, rd, rn, amt, bits - 1),
                    ALUOp::Asr => enc_bfm(0b00, size, rd, rn, amt, bits - 1),
                    _ => unreachable!("{:?} with shift imm", alu_op),
                };
                sink.put4(insn);
            }

            &Inst::BitRR { op, size, rd, rn } => {
                let (op1, op2) = match op {
                    BitOp::RBit => (0b00000, 0b000000),
                    BitOp::Clz => (0b00000, 0b000100),
                };
                sink.put4(
                    (0b01011010110 << 21)
                        | (size.sf_bit() << 31)
                        | (op1 << 16)
                        | (op2 << 10)
                        | (machreg_to_gpr(rn) << 5)
                        | machreg_to_gpr(rd.to_reg()),
                );
            }

            &Inst::ULoad8 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 1, rd.to_reg(), 0b00, 0, 0b01, None)
            }
            &Inst::SLoad8 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 1, rd.to_reg(), 0b00, 0, 0b10, None)
            }
            &Inst::ULoad16 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 2, rd.to_reg(), 0b01, 0, 0b01, None)
            }
            &Inst::SLoad16 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 2, rd.to_reg(), 0b01, 0, 0b10, None)
            }
            &Inst::ULoad32 { rd, ref mem } => emit_ldst(
                sink,
                state,
                mem,
                4,
                rd.to_reg(),
                0b10,
                0,
                0b01,
                Some(0b00011000),
            ),
            &Inst::SLoad32 { rd, ref mem } => {
                // LDRSW: size bits 10, opc 10.
                emit_ldst(sink, state, mem, 4, rd.to_reg(), 0b10, 0, 0b10, None)
            }
            &Inst::ULoad64 { rd, ref mem } => emit_ldst(
                sink,
                state,
                mem,
                8,
                rd.to_reg(),
                0b11,
                0,
                0b01,
                Some(0b01011000),
            ),
            &Inst::Store8 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 1, rd, 0b00, 0, 0b00, None)
            }
            &Inst::Store16 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 2, rd, 0b01, 0, 0b00, None)
            }
            &Inst::Store32 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 4, rd, 0b10, 0, 0b00, None)
            }
            &Inst::Store64 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 8, rd, 0b11, 0, 0b00, None)
            }

            &Inst::FpuLoad32 { rd, ref mem } => emit_ldst(
                sink,
                state,
                mem,
                4,
                rd.to_reg(),
                0b10,
                1,
                0b01,
                Some(0b00011100),
            ),
            &Inst::FpuLoad64 { rd, ref mem } => emit_ldst(
                sink,
                state,
                mem,
                8,
                rd.to_reg(),
                0b11,
                1,
                0b01,
                Some(0b01011100),
            ),
            &Inst::FpuLoad128 { rd, ref mem } => emit_ldst(
                sink,
                state,
                mem,
                16,
                rd.to_reg(),
                0b00,
                1,
                0b11,
                Some(0b10011100),
            ),
            &Inst::FpuStore32 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 4, rd, 0b10, 1, 0b00, None)
            }
            &Inst::FpuStore64 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 8, rd, 0b11, 1, 0b00, None)
            }
            &Inst::FpuStore128 { rd, ref mem } => {
                emit_ldst(sink, state, mem, 16, rd, 0b00, 1, 0b10, None)
            }

            &Inst::StoreP64 { rt, rt2, ref mem } => {
                let insn = match mem {
                    PairAMode::SignedOffset(rn, simm7) => {
                        enc_ldst_pair(0b1010100100, *simm7, *rn, rt, rt2)
                    }
                    PairAMode::PreIndexed(rn, simm7) => {
                        enc_ldst_pair(0b1010100110, *simm7, *rn, rt, rt2)
                    }
                    PairAMode::PostIndexed(rn, simm7) => {
                        enc_ldst_pair(0b1010100010, *simm7, *rn, rt, rt2)
                    }
                };
                sink.put4(insn);
            }
            &Inst::LoadP64 { rt, rt2, ref mem } => {
                let (rt, rt2) = (rt.to_reg(), rt2.to_reg());
                let insn = match mem {
                    PairAMode::SignedOffset(rn, simm7) => {
                        enc_ldst_pair(0b1010100101, *simm7, *rn, rt, rt2)
                    }
                    PairAMode::PreIndexed(rn, simm7) => {
                        enc_ldst_pair(0b1010100111, *simm7, *rn, rt, rt2)
                    }
                    PairAMode::PostIndexed(rn, simm7) => {
                        enc_ldst_pair(0b1010100011, *simm7, *rn, rt, rt2)
                    }
                };
                sink.put4(insn);
            }

            &Inst::Mov { size, rd, rm } => {
                // MOV Xd, Xm is ORR Xd, XZR, Xm.
                let (top11, _) = enc_alu_rrr_op(ALUOp::Orr, size);
                sink.put4(enc_arith_rrr(top11, 0, rd, zero_reg(), rm));
            }
            &Inst::MovToFromSp { rd, rm } => {
                // ADD Xd, Xn, #0 can address SP where ORR cannot.
                sink.put4(enc_arith_rr_imm12(
                    0b100_10001,
                    0,
                    0,
                    rm,
                    rd,
                ));
            }

            &Inst::MovZ { rd, imm, size } => {
                sink.put4(enc_move_wide(0b10, rd, imm, size));
            }
            &Inst::MovN { rd, imm, size } => {
                sink.put4(enc_move_wide(0b00, rd, imm, size));
            }
            &Inst::MovK { rd, imm, size } => {
                sink.put4(enc_move_wide(0b11, rd, imm, size));
            }

            &Inst::CSel {
                rd,
                cond,
                rn,
                rm,
                size,
            } => {
                let top11 = 0b00011010100 | (size.sf_bit() << 10);
                sink.put4(enc_csel(top11, 0b00, rd, rn, rm, cond));
            }
            &Inst::CSet { rd, cond } => {
                // CSET is CSINC rd, xzr, xzr, invert(cond).
                let top11 = 0b10011010100;
                sink.put4(enc_csel(
                    top11,
                    0b01,
                    rd,
                    zero_reg(),
                    zero_reg(),
                    cond.invert(),
                ));
            }

            &Inst::Extend {
                rd,
                rn,
                signed,
                from_bits,
                to_bits,
            } => {
                // UBFM/SBFM with immr=0, imms=from_bits-1. 32-to-64-bit
                // zero-extension is a W-register MOV; sign extension to
                // 64 bits must use the X form.
                if !signed && from_bits == 32 {
                    sink.put4({
                        let (top11, _) = enc_alu_rrr_op(ALUOp::Orr, OperandSize::Size32);
                        enc_arith_rrr(top11, 0, rd, zero_reg(), rn)
                    });
                } else {
                    let size = if to_bits == 64 && signed {
                        OperandSize::Size64
                    } else if to_bits == 64 {
                        // Zero-extension can work in the 32-bit space:
                        // the high bits clear automatically.
                        OperandSize::Size32
                    } else {
                        OperandSize::Size32
                    };
                    let opc = if signed { 0b00 } else { 0b10 };
                    sink.put4(enc_bfm(opc, size, rd, rn, 0, u32::from(from_bits) - 1));
                }
            }

            &Inst::Jump { dest } => {
                let off = sink.cur_offset();
                if let Some(label) = dest.as_label() {
                    sink.use_label_at_offset(off, label, LabelUse::Branch26);
                }
                sink.put4(enc_jump26(0b000101, dest.as_offset26_or_zero()));
            }

            &Inst::Ret => {
                // The emission driver expands `Ret` via the epilogue;
                // reaching here means a bare return with no frame.
                sink.put4(0xd65f03c0);
            }
            &Inst::EpilogueRet => {
                sink.put4(0xd65f03c0);
            }

            &Inst::Call { ref info } => {
                sink.add_reloc(Reloc::Arm64Call, &info.dest, 0);
                sink.put4(enc_jump26(0b100101, 0));
            }
            &Inst::CallInd { ref info } => {
                sink.put4(0b1101011_0001_11111_000000_00000_00000 | (machreg_to_gpr(info.rn) << 5));
            }
            &Inst::TailCall { ref info } => {
                // Tear down the frame, then jump.
                let frame = state.frame.clone();
                for inst in crate::isa::aarch64::abi::gen_epilogue_frame_restore(&frame) {
                    inst.emit(sink, state);
                }
                sink.add_reloc(Reloc::Arm64Call, &info.dest, 0);
                sink.put4(enc_jump26(0b000101, 0));
            }

            &Inst::CondBr {
                taken,
                not_taken,
                kind,
            } => {
                // Conditional part first.
                let cond_off = sink.cur_offset();
                if let Some(label) = taken.as_label() {
                    sink.use_label_at_offset(cond_off, label, LabelUse::Branch19);
                }
                sink.put4(enc_conditional_br(taken, kind));

                // Unconditional part.
                let uncond_off = sink.cur_offset();
                if let Some(label) = not_taken.as_label() {
                    sink.use_label_at_offset(uncond_off, label, LabelUse::Branch26);
                }
                sink.put4(enc_jump26(0b000101, not_taken.as_offset26_or_zero()));
            }

            &Inst::TrapIf { kind, trap_code } => {
                // Branch over the trap if the condition does NOT hold.
                let else_target = BranchTarget::ResolvedOffset(8);
                sink.put4(enc_conditional_br(else_target, kind.invert()));
                sink.add_trap(trap_code);
                sink.put4(0x0000_0000);
            }
            &Inst::Udf { trap_code } => {
                sink.add_trap(trap_code);
                sink.put4(0x0000_0000);
            }

            &Inst::Adr { rd, off } => {
                sink.put4(enc_adr(off, rd));
            }

            &Inst::LoadExtName {
                rd,
                ref name,
                offset,
            } => {
                // adrp rd, symbol@page ; add rd, rd, symbol@pageoff
                //
                // The page-relative form covers +/- 4 GiB; the linker
                // fills in both halves. The ADRP offset operand is in
                // 4 KiB pages: zero here, fully relocated.
                sink.add_reloc(Reloc::Aarch64AdrPrelPgHi21, name, offset);
                sink.put4(enc_adrp(0, rd));
                sink.add_reloc(Reloc::Aarch64AddAbsLo12Nc, name, offset);
                sink.put4(enc_arith_rr_imm12(
                    0b100_10001,
                    0,
                    0,
                    rd.to_reg(),
                    rd,
                ));
            }

            &Inst::LoadAddr { rd, ref mem } => {
                let (insts, mem) = mem_finalize(mem, 1, state);
                emit_amode_insts(insts, sink, state);
                match mem {
                    AMode::Unscaled(rn, simm9) => {
                        let imm = simm9.value;
                        if imm >= 0 {
                            let imm12 = Imm12::maybe_from_u64(imm as u64).unwrap();
                            sink.put4(enc_arith_rr_imm12(
                                0b100_10001,
                                imm12.shift_bits(),
                                imm12.imm_bits(),
                                rn,
                                rd,
                            ));
                        } else {
                            let imm12 = Imm12::maybe_from_u64((-imm) as u64).unwrap();
                            sink.put4(enc_arith_rr_imm12(
                                0b110_10001,
                                imm12.shift_bits(),
                                imm12.imm_bits(),
                                rn,
                                rd,
                            ));
                        }
                    }
                    AMode::UnsignedOffset(rn, uimm12) => {
                        let byte_off = u64::from(uimm12.bits()) * u64::from(uimm12.scale);
                        match Imm12::maybe_from_u64(byte_off) {
                            Some(imm12) => {
                                sink.put4(enc_arith_rr_imm12(
                                    0b100_10001,
                                    imm12.shift_bits(),
                                    imm12.imm_bits(),
                                    rn,
                                    rd,
                                ));
                            }
                            None => {
                                for inst in Inst::load_constant(rd, byte_off) {
                                    inst.emit(sink, state);
                                }
                                sink.put4(enc_arith_rrr(
                                    0b10001011_000,
                                    0,
                                    rd,
                                    rn,
                                    rd.to_reg(),
                                ));
                            }
                        }
                    }
                    AMode::RegReg(rn, rm) => {
                        sink.put4(enc_arith_rrr(0b10001011_000, 0, rd, rn, rm));
                    }
                    _ => unreachable!("mem_finalize left a pseudo-mode"),
                }
            }

            &Inst::VecRRR {
                alu_op,
                rd,
                rn,
                rm,
                size,
            } => {
                let q = size.q_bit();
                let enc_size = size.enc_size();
                let (u, top_size, bits_15_10) = match alu_op {
                    // The integer three-same family: base bits 28..24 are
                    // 0b01110, size in bits 23..22, and the U bit picks
                    // the add (0) or sub (1) family.
                    VecALUOp::Add => (0, enc_size, 0b100001),
                    VecALUOp::Sub => (1, enc_size, 0b100001),
                    VecALUOp::Mul => (0, enc_size, 0b100111),
                    VecALUOp::And => (0, 0b00, 0b000111),
                    VecALUOp::Orr => (0, 0b10, 0b000111),
                    VecALUOp::Eor => (1, 0b00, 0b000111),
                    VecALUOp::Fadd => (0, enc_size & 0b01, 0b110101),
                    VecALUOp::Fsub => (0, 0b10 | (enc_size & 0b01), 0b110101),
                    VecALUOp::Fmul => (1, enc_size & 0b01, 0b110111),
                    VecALUOp::Fdiv => (1, enc_size & 0b01, 0b111111),
                };
                let top11 = (q << 9) | (u << 8) | (0b01110 << 3) | (top_size << 1) | 1;
                sink.put4(enc_vec_rrr(top11, rm, bits_15_10, rn, rd));
            }

            &Inst::VecDup { rd, rn, size } => {
                sink.put4(enc_dup_gpr(size, rd, rn));
            }

            &Inst::FpuMove { size, rd, rn } => {
                // FMOV (register): opcode6 = 000000.
                let top22 = fpu_rr_top22(size.ftype(), 0b000000);
                sink.put4(enc_fpurr(top22, rd, rn));
            }

            &Inst::FpuRR { op, size, rd, rn } => {
                let (ftype, opcode6) = match op {
                    FPUOp1::Abs => (size.ftype(), 0b000001),
                    FPUOp1::Neg => (size.ftype(), 0b000010),
                    FPUOp1::Sqrt => (size.ftype(), 0b000011),
                    FPUOp1::Cvt32To64 => {
                        debug_assert_eq!(size, ScalarSize::Size32);
                        (0b00, 0b000101)
                    }
                    FPUOp1::Cvt64To32 => {
                        debug_assert_eq!(size, ScalarSize::Size64);
                        (0b01, 0b000100)
                    }
                };
                sink.put4(enc_fpurr(fpu_rr_top22(ftype, opcode6), rd, rn));
            }

            &Inst::FpuRRR {
                op,
                size,
                rd,
                rn,
                rm,
            } => {
                let opcode = match op {
                    FPUOp2::Mul => 0b0000,
                    FPUOp2::Div => 0b0001,
                    FPUOp2::Add => 0b0010,
                    FPUOp2::Sub => 0b0011,
                };
                // Bits 31..10: 000 11110 tt 1 rrrrr oooo 10, with the Rm
                // field left clear for enc_fpurrr.
                let top22 = (0b00011110 << 14)
                    | (size.ftype() << 12)
                    | (1 << 11)
                    | (opcode << 2)
                    | 0b10;
                sink.put4(enc_fpurrr(top22, rd, rn, rm));
            }

            &Inst::FpuCmp { size, rn, rm } => {
                sink.put4(enc_fcmp(size, rn, rm));
            }

            &Inst::FpuRound { mode, size, rd, rn } => {
                let mode3 = match mode {
                    FpuRoundMode::Nearest => 0b000,
                    FpuRoundMode::Plus => 0b001,
                    FpuRoundMode::Minus => 0b010,
                    FpuRoundMode::Zero => 0b011,
                };
                // FRINT*: opcode6 = 001 ++ mode.
                sink.put4(enc_fpurr(
                    fpu_rr_top22(size.ftype(), (0b001 << 3) | mode3),
                    rd,
                    rn,
                ));
            }

            &Inst::FpuCSel {
                size,
                rd,
                rn,
                rm,
                cond,
            } => {
                let insn = 0b000_11110_00_1_00000_0000_11_00000_00000
                    | (size.ftype() << 22)
                    | (machreg_to_vec(rm) << 16)
                    | (cond.bits() << 12)
                    | (machreg_to_vec(rn) << 5)
                    | machreg_to_vec(rd.to_reg());
                sink.put4(insn);
            }

            &Inst::FpuToInt {
                signed,
                in_size,
                out_size,
                rd,
                rn,
            } => {
                // FCVTZS/FCVTZU: rmode = 11 (toward zero), opcode 000/001.
                let opcode = if signed { 0b000 } else { 0b001 };
                let top16 = fpu_int_top16(out_size.sf_bit(), in_size.ftype(), 0b11, opcode);
                sink.put4(enc_fputoint(top16, rd, rn));
            }

            &Inst::IntToFpu {
                signed,
                in_size,
                out_size,
                rd,
                rn,
            } => {
                // SCVTF/UCVTF: rmode = 00, opcode 010/011.
                let opcode = if signed { 0b010 } else { 0b011 };
                let top16 = fpu_int_top16(in_size.sf_bit(), out_size.ftype(), 0b00, opcode);
                sink.put4(enc_inttofpu(top16, rd, rn));
            }

            &Inst::MovToFpu { rd, rn, size } => {
                // FMOV (general to FP): rmode = 00, opcode 111.
                let (sf, ftype) = match size {
                    ScalarSize::Size32 => (0, 0b00),
                    ScalarSize::Size64 => (1, 0b01),
                };
                sink.put4(enc_inttofpu(fpu_int_top16(sf, ftype, 0b00, 0b111), rd, rn));
            }
            &Inst::MovFromFpu { rd, rn, size } => {
                // FMOV (FP to general): rmode = 00, opcode 110.
                let (sf, ftype) = match size {
                    ScalarSize::Size32 => (0, 0b00),
                    ScalarSize::Size64 => (1, 0b01),
                };
                sink.put4(enc_fputoint(fpu_int_top16(sf, ftype, 0b00, 0b110), rd, rn));
            }

            &Inst::LoadFpuConst32 { rd, const_data } => {
                let label = sink.get_label_for_constant(&const_data.to_le_bytes(), 4);
                let inst = Inst::FpuLoad32 {
                    rd,
                    mem: AMode::Label(label),
                };
                inst.emit(sink, state);
            }
            &Inst::LoadFpuConst64 { rd, const_data } => {
                let label = sink.get_label_for_constant(&const_data.to_le_bytes(), 8);
                let inst = Inst::FpuLoad64 {
                    rd,
                    mem: AMode::Label(label),
                };
                inst.emit(sink, state);
            }
            &Inst::LoadFpuConst128 { rd, const_data } => {
                let label = sink.get_label_for_constant(&const_data.to_le_bytes(), 16);
                let inst = Inst::FpuLoad128 {
                    rd,
                    mem: AMode::Label(label),
                };
                inst.emit(sink, state);
            }

            &Inst::LoadExclusive {
                access_bits,
                acquire,
                rt,
                rn,
            } => {
                sink.put4(enc_ldaxr_stlxr(
                    access_bits,
                    true,
                    acquire,
                    0b11111,
                    rt.to_reg(),
                    rn,
                ));
            }
            &Inst::StoreExclusive {
                access_bits,
                release,
                rs,
                rt,
                rn,
            } => {
                sink.put4(enc_ldaxr_stlxr(
                    access_bits,
                    false,
                    release,
                    machreg_to_gpr(rs.to_reg()),
                    rt,
                    rn,
                ));
            }
        }
    }

    fn pretty_print(&self, _state: &mut EmitState) -> String {
        // A compact rendering for trace logs; exact operand formatting is
        // secondary to being able to see the instruction stream shape.
        format!("{:?}", self)
    }
}
