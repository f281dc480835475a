//! Encoding tests for aarch64, against assembler-verified constants.

use crate::isa::aarch64::inst::*;
use crate::machinst::buffer::MachBuffer;
use crate::machinst::reg::Writable;
use crate::machinst::MachInstEmit;

fn emit_one(inst: Inst) -> Vec<u8> {
    let mut buffer = MachBuffer::<Inst>::new();
    let mut state = EmitState::default();
    inst.emit(&mut buffer, &mut state);
    buffer.finish().unwrap().data
}

fn check(inst: Inst, expected: u32, asm: &str) {
    let data = emit_one(inst);
    assert_eq!(
        data,
        expected.to_le_bytes().to_vec(),
        "invalid encoding for `{}`: got {:08x}, want {:08x}",
        asm,
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        expected,
    );
}

#[test]
fn test_alu_rrr() {
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(0),
            rm: xreg(1),
        },
        0x8b010000,
        "add x0, x0, x1",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Add,
            size: OperandSize::Size32,
            rd: writable_xreg(4),
            rn: xreg(5),
            rm: xreg(6),
        },
        0x0b0600a4,
        "add w4, w5, w6",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Sub,
            size: OperandSize::Size64,
            rd: writable_xreg(2),
            rn: xreg(3),
            rm: xreg(4),
        },
        0xcb040062,
        "sub x2, x3, x4",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::SubS,
            size: OperandSize::Size64,
            rd: writable_zero_reg(),
            rn: xreg(0),
            rm: xreg(1),
        },
        0xeb01001f,
        "cmp x0, x1",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Adc,
            size: OperandSize::Size64,
            rd: writable_xreg(1),
            rn: xreg(2),
            rm: xreg(3),
        },
        0x9a030041,
        "adc x1, x2, x3",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::UDiv,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9ac20820,
        "udiv x0, x1, x2",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::SDiv,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9ac20c20,
        "sdiv x0, x1, x2",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::UMulH,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9bc27c20,
        "umulh x0, x1, x2",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Orr,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: zero_reg(),
            rm: xreg(7),
        },
        0xaa0703e0,
        "mov x0, x7",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Lsl,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9ac22020,
        "lsl x0, x1, x2",
    );
}

#[test]
fn test_alu_rrrr() {
    check(
        Inst::AluRRRR {
            alu_op: ALUOp3::MAdd,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
            ra: xreg(3),
        },
        0x9b020c20,
        "madd x0, x1, x2, x3",
    );
    check(
        Inst::AluRRRR {
            alu_op: ALUOp3::MSub,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
            ra: xreg(3),
        },
        0x9b028c20,
        "msub x0, x1, x2, x3",
    );
}

#[test]
fn test_alu_imm12() {
    check(
        Inst::AluRRImm12 {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            imm12: Imm12::maybe_from_u64(42).unwrap(),
        },
        0x9100a820,
        "add x0, x1, #42",
    );
    check(
        Inst::AluRRImm12 {
            alu_op: ALUOp::Sub,
            size: OperandSize::Size64,
            rd: writable_stack_reg(),
            rn: stack_reg(),
            imm12: Imm12::maybe_from_u64(32).unwrap(),
        },
        0xd10083ff,
        "sub sp, sp, #32",
    );
    // A shifted immediate.
    check(
        Inst::AluRRImm12 {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_xreg(2),
            rn: xreg(3),
            imm12: Imm12::maybe_from_u64(0x1000).unwrap(),
        },
        0x91400462,
        "add x2, x3, #4096",
    );
}

#[test]
fn test_logical_imm() {
    // and x0, x1, #0xff
    check(
        Inst::AluRRImmLogic {
            alu_op: ALUOp::And,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            imml: ImmLogic::maybe_from_u64(0xff, OperandSize::Size64).unwrap(),
        },
        0x92401c20,
        "and x0, x1, #255",
    );
    // orr x0, x1, #1
    check(
        Inst::AluRRImmLogic {
            alu_op: ALUOp::Orr,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            imml: ImmLogic::maybe_from_u64(1, OperandSize::Size64).unwrap(),
        },
        0xb2400020,
        "orr x0, x1, #1",
    );
}

#[test]
fn test_shift_imm() {
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Lsr,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            immshift: ImmShift::maybe_from_u64(3).unwrap(),
        },
        0xd343fc20,
        "lsr x0, x1, #3",
    );
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Asr,
            size: OperandSize::Size64,
            rd: writable_xreg(4),
            rn: xreg(5),
            immshift: ImmShift::maybe_from_u64(63).unwrap(),
        },
        0x937ffca4,
        "asr x4, x5, #63",
    );
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Lsl,
            size: OperandSize::Size64,
            rd: writable_xreg(8),
            rn: xreg(9),
            immshift: ImmShift::maybe_from_u64(2).unwrap(),
        },
        0xd37ef528,
        "lsl x8, x9, #2",
    );
}

#[test]
fn test_move_wide() {
    check(
        Inst::MovZ {
            rd: writable_xreg(8),
            imm: MoveWideConst::maybe_from_u64(0xffff).unwrap(),
            size: OperandSize::Size64,
        },
        0xd29fffe8,
        "movz x8, #65535",
    );
    check(
        Inst::MovN {
            rd: writable_xreg(0),
            imm: MoveWideConst::maybe_from_u64(0).unwrap(),
            size: OperandSize::Size64,
        },
        0x92800000,
        "movn x0, #0",
    );
    check(
        Inst::MovK {
            rd: writable_xreg(1),
            imm: MoveWideConst::with_halfword(0x1234, 1),
            size: OperandSize::Size64,
        },
        0xf2a24681,
        "movk x1, #4660, lsl #16",
    );
}

#[test]
fn test_csel_cset() {
    check(
        Inst::CSel {
            rd: writable_xreg(0),
            cond: Cond::Ne,
            rn: xreg(1),
            rm: xreg(2),
            size: OperandSize::Size64,
        },
        0x9a821020,
        "csel x0, x1, x2, ne",
    );
    check(
        Inst::CSet {
            rd: writable_xreg(3),
            cond: Cond::Eq,
        },
        0x9a9f17e3,
        "cset x3, eq",
    );
}

#[test]
fn test_bit_rr() {
    check(
        Inst::BitRR {
            op: BitOp::Clz,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
        },
        0xdac01020,
        "clz x0, x1",
    );
    check(
        Inst::BitRR {
            op: BitOp::RBit,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
        },
        0xdac00020,
        "rbit x0, x1",
    );
}

#[test]
fn test_extend() {
    // uxtb w0, w1
    check(
        Inst::Extend {
            rd: writable_xreg(0),
            rn: xreg(1),
            signed: false,
            from_bits: 8,
            to_bits: 32,
        },
        0x53001c20,
        "uxtb w0, w1",
    );
    // sxtw x0, w1
    check(
        Inst::Extend {
            rd: writable_xreg(0),
            rn: xreg(1),
            signed: true,
            from_bits: 32,
            to_bits: 64,
        },
        0x93407c20,
        "sxtw x0, w1",
    );
    // Zero-extension of a 32-bit value is a plain W move.
    check(
        Inst::Extend {
            rd: writable_xreg(0),
            rn: xreg(1),
            signed: false,
            from_bits: 32,
            to_bits: 64,
        },
        0x2a0103e0,
        "mov w0, w1",
    );
}

#[test]
fn test_load_store() {
    // ldr x0, [x1]
    check(
        Inst::ULoad64 {
            rd: writable_xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 8).unwrap()),
        },
        0xf9400020,
        "ldr x0, [x1]",
    );
    // ldr x0, [x1, #16]
    check(
        Inst::ULoad64 {
            rd: writable_xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(16, 8).unwrap()),
        },
        0xf9400820,
        "ldr x0, [x1, #16]",
    );
    // ldur x0, [x1, #-8]
    check(
        Inst::ULoad64 {
            rd: writable_xreg(0),
            mem: AMode::Unscaled(xreg(1), SImm9::maybe_from_i64(-8).unwrap()),
        },
        0xf85f8020,
        "ldur x0, [x1, #-8]",
    );
    // ldrb w0, [x1]
    check(
        Inst::ULoad8 {
            rd: writable_xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 1).unwrap()),
        },
        0x39400020,
        "ldrb w0, [x1]",
    );
    // ldrsw x0, [x1]
    check(
        Inst::SLoad32 {
            rd: writable_xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 4).unwrap()),
        },
        0xb9800020,
        "ldrsw x0, [x1]",
    );
    // str x0, [x1, #8]
    check(
        Inst::Store64 {
            rd: xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(8, 8).unwrap()),
        },
        0xf9000420,
        "str x0, [x1, #8]",
    );
    // strh w0, [x1]
    check(
        Inst::Store16 {
            rd: xreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 2).unwrap()),
        },
        0x79000020,
        "strh w0, [x1]",
    );
    // ldr x2, [x3, x4] (register offset, LSL #0)
    check(
        Inst::ULoad64 {
            rd: writable_xreg(2),
            mem: AMode::RegReg(xreg(3), xreg(4)),
        },
        0xf8646862,
        "ldr x2, [x3, x4]",
    );
    // ldr d0, [x1]
    check(
        Inst::FpuLoad64 {
            rd: writable_vreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 8).unwrap()),
        },
        0xfd400020,
        "ldr d0, [x1]",
    );
    // str d0, [x1]
    check(
        Inst::FpuStore64 {
            rd: vreg(0),
            mem: AMode::UnsignedOffset(xreg(1), UImm12Scaled::maybe_from_i64(0, 8).unwrap()),
        },
        0xfd000020,
        "str d0, [x1]",
    );
}

#[test]
fn test_load_store_pair() {
    // stp x29, x30, [sp, #-16]!
    check(
        Inst::StoreP64 {
            rt: fp_reg(),
            rt2: link_reg(),
            mem: PairAMode::PreIndexed(stack_reg(), SImm7Scaled::maybe_from_i64(-16, 8).unwrap()),
        },
        0xa9bf7bfd,
        "stp x29, x30, [sp, #-16]!",
    );
    // ldp x29, x30, [sp], #16
    check(
        Inst::LoadP64 {
            rt: writable_fp_reg(),
            rt2: writable_link_reg(),
            mem: PairAMode::PostIndexed(stack_reg(), SImm7Scaled::maybe_from_i64(16, 8).unwrap()),
        },
        0xa8c17bfd,
        "ldp x29, x30, [sp], #16",
    );
}

#[test]
fn test_branches() {
    check(
        Inst::Jump {
            dest: BranchTarget::ResolvedOffset(64),
        },
        0x14000010,
        "b +64",
    );
    check(Inst::EpilogueRet, 0xd65f03c0, "ret");
    check(
        Inst::Udf {
            trap_code: crate::ir::TrapCode::UnreachableCodeReached,
        },
        0x00000000,
        "udf",
    );
}

#[test]
fn test_mov_to_from_sp() {
    check(
        Inst::MovToFromSp {
            rd: writable_fp_reg(),
            rm: stack_reg(),
        },
        0x910003fd,
        "mov x29, sp",
    );
}

#[test]
fn test_fpu() {
    // fadd d0, d1, d2
    check(
        Inst::FpuRRR {
            op: FPUOp2::Add,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
        },
        0x1e622820,
        "fadd d0, d1, d2",
    );
    // fsub s3, s4, s5
    check(
        Inst::FpuRRR {
            op: FPUOp2::Sub,
            size: ScalarSize::Size32,
            rd: writable_vreg(3),
            rn: vreg(4),
            rm: vreg(5),
        },
        0x1e253883,
        "fsub s3, s4, s5",
    );
    // fmul d0, d1, d2
    check(
        Inst::FpuRRR {
            op: FPUOp2::Mul,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
        },
        0x1e620820,
        "fmul d0, d1, d2",
    );
    // fdiv d0, d1, d2
    check(
        Inst::FpuRRR {
            op: FPUOp2::Div,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
        },
        0x1e621820,
        "fdiv d0, d1, d2",
    );
    // fmov d0, d1
    check(
        Inst::FpuMove {
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e604020,
        "fmov d0, d1",
    );
    // fneg d0, d1
    check(
        Inst::FpuRR {
            op: FPUOp1::Neg,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e614020,
        "fneg d0, d1",
    );
    // fsqrt s0, s1
    check(
        Inst::FpuRR {
            op: FPUOp1::Sqrt,
            size: ScalarSize::Size32,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e21c020,
        "fsqrt s0, s1",
    );
    // fcvt d0, s1
    check(
        Inst::FpuRR {
            op: FPUOp1::Cvt32To64,
            size: ScalarSize::Size32,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e22c020,
        "fcvt d0, s1",
    );
    // fcmp d0, d1
    check(
        Inst::FpuCmp {
            size: ScalarSize::Size64,
            rn: vreg(0),
            rm: vreg(1),
        },
        0x1e612000,
        "fcmp d0, d1",
    );
    // frintp d0, d1 (ceil)
    check(
        Inst::FpuRound {
            mode: FpuRoundMode::Plus,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e64c020,
        "frintp d0, d1",
    );
    // frintm d0, d1 (floor)
    check(
        Inst::FpuRound {
            mode: FpuRoundMode::Minus,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e654020,
        "frintm d0, d1",
    );
    // fcvtzs x0, d1
    check(
        Inst::FpuToInt {
            signed: true,
            in_size: ScalarSize::Size64,
            out_size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: vreg(1),
        },
        0x9e780020,
        "fcvtzs x0, d1",
    );
    // ucvtf d0, x1
    check(
        Inst::IntToFpu {
            signed: false,
            in_size: OperandSize::Size64,
            out_size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: xreg(1),
        },
        0x9e630020,
        "ucvtf d0, x1",
    );
    // fmov d0, x1
    check(
        Inst::MovToFpu {
            rd: writable_vreg(0),
            rn: xreg(1),
            size: ScalarSize::Size64,
        },
        0x9e670020,
        "fmov d0, x1",
    );
    // fmov x0, d1
    check(
        Inst::MovFromFpu {
            rd: writable_xreg(0),
            rn: vreg(1),
            size: ScalarSize::Size64,
        },
        0x9e660020,
        "fmov x0, d1",
    );
}

#[test]
fn test_vector() {
    // add v0.4s, v1.4s, v2.4s: base 28-24 fixed, size in 23-22, U=0.
    check(
        Inst::VecRRR {
            alu_op: VecALUOp::Add,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
            size: VectorSize::Size32x4,
        },
        0x4ea28420,
        "add v0.4s, v1.4s, v2.4s",
    );
    // sub v0.4s, v1.4s, v2.4s: same family with U=1.
    check(
        Inst::VecRRR {
            alu_op: VecALUOp::Sub,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
            size: VectorSize::Size32x4,
        },
        0x6ea28420,
        "sub v0.4s, v1.4s, v2.4s",
    );
    // and v0.16b, v1.16b, v2.16b
    check(
        Inst::VecRRR {
            alu_op: VecALUOp::And,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
            size: VectorSize::Size8x16,
        },
        0x4e221c20,
        "and v0.16b, v1.16b, v2.16b",
    );
    // fadd v0.4s, v1.4s, v2.4s
    check(
        Inst::VecRRR {
            alu_op: VecALUOp::Fadd,
            rd: writable_vreg(0),
            rn: vreg(1),
            rm: vreg(2),
            size: VectorSize::Size32x4,
        },
        0x4e22d420,
        "fadd v0.4s, v1.4s, v2.4s",
    );
    // dup v0.4s, w1
    check(
        Inst::VecDup {
            rd: writable_vreg(0),
            rn: xreg(1),
            size: VectorSize::Size32x4,
        },
        0x4e040c20,
        "dup v0.4s, w1",
    );
}

#[test]
fn test_atomics() {
    // ldxr x0, [x1]
    check(
        Inst::LoadExclusive {
            access_bits: 64,
            acquire: false,
            rt: writable_xreg(0),
            rn: xreg(1),
        },
        0xc85f7c20,
        "ldxr x0, [x1]",
    );
    // ldaxr x0, [x1]: the acquire bit must survive for every width.
    check(
        Inst::LoadExclusive {
            access_bits: 64,
            acquire: true,
            rt: writable_xreg(0),
            rn: xreg(1),
        },
        0xc85ffc20,
        "ldaxr x0, [x1]",
    );
    // ldaxrb w0, [x1]
    check(
        Inst::LoadExclusive {
            access_bits: 8,
            acquire: true,
            rt: writable_xreg(0),
            rn: xreg(1),
        },
        0x085ffc20,
        "ldaxrb w0, [x1]",
    );
    // stxr w2, x0, [x1]
    check(
        Inst::StoreExclusive {
            access_bits: 64,
            release: false,
            rs: writable_xreg(2),
            rt: xreg(0),
            rn: xreg(1),
        },
        0xc8027c20,
        "stxr w2, x0, [x1]",
    );
    // stlxr w2, x0, [x1]
    check(
        Inst::StoreExclusive {
            access_bits: 64,
            release: true,
            rs: writable_xreg(2),
            rt: xreg(0),
            rn: xreg(1),
        },
        0xc802fc20,
        "stlxr w2, x0, [x1]",
    );
}

#[test]
fn test_adr() {
    // adr x0, #16: 21-bit signed byte offset.
    check(
        Inst::Adr {
            rd: writable_xreg(0),
            off: 16,
        },
        0x10000080,
        "adr x0, #16",
    );
}

#[test]
fn test_load_constant_synthesis() {
    // A single-halfword value: one MOVZ.
    let insts = Inst::load_constant(writable_xreg(0), 0xffff);
    assert_eq!(insts.len(), 1);
    // An inverted value: one MOVN.
    let insts = Inst::load_constant(writable_xreg(0), !0u64);
    assert_eq!(insts.len(), 1);
    // 0xffff_ffff_0001_ffff: mostly-ones, MOVN + MOVK beats MOVZ chain.
    let insts = Inst::load_constant(writable_xreg(0), 0xffff_ffff_0001_ffff);
    assert!(insts.len() <= 3);
    // A dense value needs the full 4-instruction chain.
    let insts = Inst::load_constant(writable_xreg(0), 0x1234_5678_9abc_def0);
    assert_eq!(insts.len(), 4);
}

#[test]
fn test_cond_br() {
    // b.le +8 then b +4 (the not-taken arm).
    let mut buffer = MachBuffer::<Inst>::new();
    let mut state = EmitState::default();
    Inst::CondBr {
        taken: BranchTarget::ResolvedOffset(8),
        not_taken: BranchTarget::ResolvedOffset(4),
        kind: CondBrKind::Cond(Cond::Le),
    }
    .emit(&mut buffer, &mut state);
    let data = buffer.finish().unwrap().data;
    let first = u32::from_le_bytes(data[0..4].try_into().unwrap());
    assert_eq!(first, 0x5400004d, "b.le +8");
    let second = u32::from_le_bytes(data[4..8].try_into().unwrap());
    assert_eq!(second, 0x14000001, "b +4");
}

#[test]
fn test_cbz_cbnz() {
    let mut buffer = MachBuffer::<Inst>::new();
    let mut state = EmitState::default();
    Inst::CondBr {
        taken: BranchTarget::ResolvedOffset(16),
        not_taken: BranchTarget::ResolvedOffset(4),
        kind: CondBrKind::Zero(xreg(3)),
    }
    .emit(&mut buffer, &mut state);
    let data = buffer.finish().unwrap().data;
    let first = u32::from_le_bytes(data[0..4].try_into().unwrap());
    assert_eq!(first, 0xb4000083, "cbz x3, +16");
    let second = u32::from_le_bytes(data[4..8].try_into().unwrap());
    assert_eq!(second, 0x14000001, "b +4");
}
