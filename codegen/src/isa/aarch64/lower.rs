//! Lowering rules for AArch64.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::immediates::Imm64;
use crate::ir::{Inst as IRInst, InstructionData, Opcode, TrapCode, Type};
use crate::ir::types;
use crate::isa::aarch64::abi::AArch64MachineDeps;
use crate::isa::aarch64::inst::*;
use crate::machinst::buffer::MachLabel;
use crate::machinst::lower::{Lower, LowerBackend};
use crate::machinst::reg::{Reg, Writable};
use crate::result::CodegenResult;

/// The AArch64 lowering rule set.
pub struct AArch64Backend;

type Ctx<'a, 'f> = &'a mut Lower<'f, AArch64MachineDeps>;

//============================================================================
// Lowering: convert instruction inputs to forms that we can use.

/// The size class of an integer operation.
fn op_size(ty: Type) -> OperandSize {
    OperandSize::from_ty(ty)
}

/// Put an input into a single register.
fn put_input_in_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Reg {
    ctx.put_input_in_regs(inst, idx)
        .only_reg()
        .expect("narrow value in one register")
}

/// Get the single output register.
fn get_output_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Writable<Reg> {
    ctx.get_output(inst, idx)
        .only_reg()
        .expect("narrow result in one register")
}

/// If the input is produced by an `iconst` (and nothing else), return its
/// bits, zero-extended from the constant's type width.
fn input_as_const_u64(ctx: Ctx, inst: IRInst, idx: usize) -> Option<u64> {
    let input = ctx.get_input_as_source_or_const(inst, idx);
    let (def_inst, _) = input.inst?;
    if ctx.data(def_inst).opcode() != Opcode::Iconst {
        return None;
    }
    let ty = ctx.input_ty(inst, idx);
    let imm = match ctx.data(def_inst) {
        &InstructionData::UnaryImm { imm, .. } => imm,
        _ => return None,
    };
    Some(imm.zero_extend_from_width(ty.bits().min(64)).bits() as u64)
}

/// Try to use the second input of an add/sub as an Imm12, possibly after
/// negation. Returns (imm, negated).
fn input_as_imm12(ctx: Ctx, inst: IRInst, idx: usize) -> Option<(Imm12, bool)> {
    let c = input_as_const_u64(ctx, inst, idx)?;
    if let Some(imm) = Imm12::maybe_from_u64(c) {
        return Some((imm, false));
    }
    let ty = ctx.input_ty(inst, idx);
    let neg = Imm64::new(c as i64)
        .sign_extend_from_width(ty.bits().min(64))
        .wrapping_neg()
        .bits();
    if neg >= 0 {
        if let Some(imm) = Imm12::maybe_from_u64(neg as u64) {
            return Some((imm, true));
        }
    }
    None
}

/// Try to use the input as a logical immediate.
fn input_as_immlogic(ctx: Ctx, inst: IRInst, idx: usize, size: OperandSize) -> Option<ImmLogic> {
    let c = input_as_const_u64(ctx, inst, idx)?;
    ImmLogic::maybe_from_u64(c, size)
}

/// Mark the producer of an input as merged into the current instruction.
fn sink_input(ctx: Ctx, inst: IRInst, idx: usize) {
    if let Some((def_inst, _)) = ctx.get_input_as_source_or_const(inst, idx).inst {
        ctx.sink_inst(def_inst);
    }
}

/// Materialize a 64-bit constant into a fresh register.
fn constant_to_reg(ctx: Ctx, value: u64) -> Reg {
    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
    for inst in Inst::load_constant(tmp, value) {
        ctx.emit(inst);
    }
    tmp.to_reg()
}

/// Compute an addressing mode for a load/store whose address operand is
/// input `idx` plus `offset`.
fn lower_address(ctx: Ctx, inst: IRInst, idx: usize, offset: i32) -> AMode {
    let base = put_input_in_reg(ctx, inst, idx);
    AMode::reg_offset(base, i64::from(offset))
}

/// Zero- or sign-extend a narrow value in `rn` to a full register width,
/// into a temporary. Needed when the high bits of a sub-word value
/// matter (comparisons, division, truthiness).
fn extend_narrow(
    ctx: Ctx,
    rn: Reg,
    from_bits: u8,
    signed: bool,
) -> Reg {
    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
    ctx.emit(Inst::Extend {
        rd: tmp,
        rn,
        signed,
        from_bits,
        to_bits: 64,
    });
    tmp.to_reg()
}

/// Emit flag-setting code for an integer comparison and return the
/// condition to test.
fn lower_icmp_to_flags(ctx: Ctx, icmp: IRInst, cc: IntCC) -> Cond {
    let ty = ctx.input_ty(icmp, 0);
    let bits = ty.bits();
    let mut rn = put_input_in_reg(ctx, icmp, 0);
    let mut rm = put_input_in_reg(ctx, icmp, 1);
    if bits < 32 {
        // Extend sub-word operands so the flags reflect the narrow
        // comparison.
        let signed = cc.is_signed();
        rn = extend_narrow(ctx, rn, bits as u8, signed);
        rm = extend_narrow(ctx, rm, bits as u8, signed);
    }
    let size = op_size(ty);
    ctx.emit(Inst::AluRRR {
        alu_op: ALUOp::SubS,
        size,
        rd: writable_zero_reg(),
        rn,
        rm,
    });
    Cond::from_intcc(cc)
}

/// Emit flag-setting code for a float comparison and return the
/// condition to test.
fn lower_fcmp_to_flags(ctx: Ctx, fcmp: IRInst, cc: FloatCC) -> Cond {
    let ty = ctx.input_ty(fcmp, 0);
    let rn = put_input_in_reg(ctx, fcmp, 0);
    let rm = put_input_in_reg(ctx, fcmp, 1);
    ctx.emit(Inst::FpuCmp {
        size: ScalarSize::from_ty(ty),
        rn,
        rm,
    });
    Cond::from_floatcc(cc)
}

/// Materialize the truthiness of a (possibly narrow) integer value: the
/// returned register is non-zero iff the IR value is non-zero in its own
/// width.
fn put_truthy_value_in_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Reg {
    let ty = ctx.input_ty(inst, idx);
    let rn = put_input_in_reg(ctx, inst, idx);
    if ty.bits() < 32 {
        extend_narrow(ctx, rn, ty.bits() as u8, false)
    } else {
        rn
    }
}

//============================================================================
// Instruction lowering entry points.

impl LowerBackend for AArch64Backend {
    type M = AArch64MachineDeps;

    fn lower(&self, ctx: Ctx, inst: IRInst) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Nop => {}

            Opcode::Iconst => {
                let value = match ctx.data(inst) {
                    &InstructionData::UnaryImm { imm, .. } => imm.bits() as u64,
                    _ => unreachable!(),
                };
                let ty = ctx.output_ty(inst, 0);
                if ty == types::I128 {
                    let dst = ctx.get_output(inst, 0);
                    let lo = dst.regs()[0];
                    let hi = dst.regs()[1];
                    for i in Inst::load_constant(lo, value) {
                        ctx.emit(i);
                    }
                    // The IR constant is sign-extended to 128 bits.
                    let hi_bits = if (value as i64) < 0 { u64::MAX } else { 0 };
                    for i in Inst::load_constant(hi, hi_bits) {
                        ctx.emit(i);
                    }
                } else {
                    let rd = get_output_reg(ctx, inst, 0);
                    for i in Inst::load_constant(rd, value) {
                        ctx.emit(i);
                    }
                }
            }

            Opcode::F32const => {
                let bits = match ctx.data(inst) {
                    &InstructionData::UnaryIeee32 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                ctx.emit(Inst::LoadFpuConst32 {
                    rd,
                    const_data: bits,
                });
            }
            Opcode::F64const => {
                let bits = match ctx.data(inst) {
                    &InstructionData::UnaryIeee64 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                ctx.emit(Inst::LoadFpuConst64 {
                    rd,
                    const_data: bits,
                });
            }
            Opcode::Vconst => {
                let constant = match ctx.data(inst) {
                    &InstructionData::UnaryConst {
                        constant_handle, ..
                    } => constant_handle,
                    _ => unreachable!(),
                };
                let data = ctx.f.dfg.constants.get(constant);
                let mut bytes = [0u8; 16];
                bytes[..data.len().min(16)].copy_from_slice(&data.as_slice()[..data.len().min(16)]);
                let rd = get_output_reg(ctx, inst, 0);
                ctx.emit(Inst::LoadFpuConst128 {
                    rd,
                    const_data: u128::from_le_bytes(bytes),
                });
            }

            Opcode::Iadd | Opcode::Isub => {
                let ty = ctx.output_ty(inst, 0);
                if ty.is_vector() {
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    let rm = put_input_in_reg(ctx, inst, 1);
                    ctx.emit(Inst::VecRRR {
                        alu_op: if op == Opcode::Iadd {
                            VecALUOp::Add
                        } else {
                            VecALUOp::Sub
                        },
                        rd,
                        rn,
                        rm,
                        size: VectorSize::from_ty(ty),
                    });
                } else if ty == types::I128 {
                    let lhs = ctx.put_input_in_regs(inst, 0);
                    let rhs = ctx.put_input_in_regs(inst, 1);
                    let dst = ctx.get_output(inst, 0);
                    // adds/adc or subs/sbc over the two limbs.
                    let (lo_op, hi_op) = if op == Opcode::Iadd {
                        (ALUOp::AddS, ALUOp::Adc)
                    } else {
                        (ALUOp::SubS, ALUOp::Sbc)
                    };
                    ctx.emit(Inst::AluRRR {
                        alu_op: lo_op,
                        size: OperandSize::Size64,
                        rd: dst.regs()[0],
                        rn: lhs.regs()[0],
                        rm: rhs.regs()[0],
                    });
                    ctx.emit(Inst::AluRRR {
                        alu_op: hi_op,
                        size: OperandSize::Size64,
                        rd: dst.regs()[1],
                        rn: lhs.regs()[1],
                        rm: rhs.regs()[1],
                    });
                } else {
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    let size = op_size(ty);
                    // Fold a constant rhs into the 12-bit immediate form,
                    // flipping add/sub for negated immediates.
                    if let Some((imm12, negated)) = input_as_imm12(ctx, inst, 1) {
                        let alu_op = match (op, negated) {
                            (Opcode::Iadd, false) | (Opcode::Isub, true) => ALUOp::Add,
                            (Opcode::Iadd, true) | (Opcode::Isub, false) => ALUOp::Sub,
                            _ => unreachable!(),
                        };
                        sink_input(ctx, inst, 1);
                        ctx.emit(Inst::AluRRImm12 {
                            alu_op,
                            size,
                            rd,
                            rn,
                            imm12,
                        });
                    } else {
                        let rm = put_input_in_reg(ctx, inst, 1);
                        ctx.emit(Inst::AluRRR {
                            alu_op: if op == Opcode::Iadd {
                                ALUOp::Add
                            } else {
                                ALUOp::Sub
                            },
                            size,
                            rd,
                            rn,
                            rm,
                        });
                    }
                }
            }

            Opcode::Ineg => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rm = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::AluRRR {
                    alu_op: ALUOp::Sub,
                    size: op_size(ty),
                    rd,
                    rn: zero_reg(),
                    rm,
                });
            }

            Opcode::Imul => {
                let ty = ctx.output_ty(inst, 0);
                if ty == types::I128 {
                    let lhs = ctx.put_input_in_regs(inst, 0);
                    let rhs = ctx.put_input_in_regs(inst, 1);
                    let dst = ctx.get_output(inst, 0);

                    // 128-bit multiply:
                    //   dst_hi = umulh(l0, r0) + l0 * r1 + l1 * r0
                    //   dst_lo = l0 * r0
                    ctx.emit(Inst::AluRRR {
                        alu_op: ALUOp::UMulH,
                        size: OperandSize::Size64,
                        rd: dst.regs()[1],
                        rn: lhs.regs()[0],
                        rm: rhs.regs()[0],
                    });
                    ctx.emit(Inst::AluRRRR {
                        alu_op: ALUOp3::MAdd,
                        size: OperandSize::Size64,
                        rd: dst.regs()[1],
                        rn: lhs.regs()[0],
                        rm: rhs.regs()[1],
                        ra: dst.regs()[1].to_reg(),
                    });
                    ctx.emit(Inst::AluRRRR {
                        alu_op: ALUOp3::MAdd,
                        size: OperandSize::Size64,
                        rd: dst.regs()[1],
                        rn: lhs.regs()[1],
                        rm: rhs.regs()[0],
                        ra: dst.regs()[1].to_reg(),
                    });
                    ctx.emit(Inst::AluRRRR {
                        alu_op: ALUOp3::MAdd,
                        size: OperandSize::Size64,
                        rd: dst.regs()[0],
                        rn: lhs.regs()[0],
                        rm: rhs.regs()[0],
                        ra: zero_reg(),
                    });
                } else if ty.is_vector() {
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    let rm = put_input_in_reg(ctx, inst, 1);
                    ctx.emit(Inst::VecRRR {
                        alu_op: VecALUOp::Mul,
                        rd,
                        rn,
                        rm,
                        size: VectorSize::from_ty(ty),
                    });
                } else {
                    // MADD with a zero addend.
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    let rm = put_input_in_reg(ctx, inst, 1);
                    ctx.emit(Inst::AluRRRR {
                        alu_op: ALUOp3::MAdd,
                        size: op_size(ty),
                        rd,
                        rn,
                        rm,
                        ra: zero_reg(),
                    });
                }
            }

            Opcode::Umulhi | Opcode::Smulhi => {
                let ty = ctx.output_ty(inst, 0);
                let is_signed = op == Opcode::Smulhi;
                let rd = get_output_reg(ctx, inst, 0);
                match ty {
                    types::I64 => {
                        let rn = put_input_in_reg(ctx, inst, 0);
                        let rm = put_input_in_reg(ctx, inst, 1);
                        ctx.emit(Inst::AluRRR {
                            alu_op: if is_signed {
                                ALUOp::SMulH
                            } else {
                                ALUOp::UMulH
                            },
                            size: OperandSize::Size64,
                            rd,
                            rn,
                            rm,
                        });
                    }
                    types::I32 | types::I16 | types::I8 => {
                        // Widen, multiply in 64 bits, shift the high part
                        // down.
                        let bits = ty.bits() as u8;
                        let rn = put_input_in_reg(ctx, inst, 0);
                        let rm = put_input_in_reg(ctx, inst, 1);
                        let rn = extend_narrow(ctx, rn, bits.min(32), is_signed);
                        let rm = extend_narrow(ctx, rm, bits.min(32), is_signed);
                        ctx.emit(Inst::AluRRRR {
                            alu_op: ALUOp3::MAdd,
                            size: OperandSize::Size64,
                            rd,
                            rn,
                            rm,
                            ra: zero_reg(),
                        });
                        ctx.emit(Inst::AluRRImmShift {
                            alu_op: if is_signed { ALUOp::Asr } else { ALUOp::Lsr },
                            size: OperandSize::Size64,
                            rd,
                            rn: rd.to_reg(),
                            immshift: ImmShift::maybe_from_u64(u64::from(bits)).unwrap(),
                        });
                    }
                    _ => return Err(ctx.lowering_error(inst)),
                }
            }

            Opcode::Udiv | Opcode::Sdiv => {
                let ty = ctx.output_ty(inst, 0);
                if !ty.is_int() || ty.is_vector() || ty.bits() > 64 {
                    return Err(ctx.lowering_error(inst));
                }
                let is_signed = op == Opcode::Sdiv;
                let bits = ty.bits();
                let rd = get_output_reg(ctx, inst, 0);
                let mut rn = put_input_in_reg(ctx, inst, 0);
                let mut rm = put_input_in_reg(ctx, inst, 1);
                if bits < 32 {
                    rn = extend_narrow(ctx, rn, bits as u8, is_signed);
                    rm = extend_narrow(ctx, rm, bits as u8, is_signed);
                }
                // A zero divisor traps.
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Zero(rm),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                ctx.emit(Inst::AluRRR {
                    alu_op: if is_signed { ALUOp::SDiv } else { ALUOp::UDiv },
                    size: op_size(ty),
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Urem | Opcode::Srem => {
                let ty = ctx.output_ty(inst, 0);
                if !ty.is_int() || ty.is_vector() || ty.bits() > 64 {
                    return Err(ctx.lowering_error(inst));
                }
                let is_signed = op == Opcode::Srem;
                let bits = ty.bits();
                let rd = get_output_reg(ctx, inst, 0);
                let mut rn = put_input_in_reg(ctx, inst, 0);
                let mut rm = put_input_in_reg(ctx, inst, 1);
                if bits < 32 {
                    rn = extend_narrow(ctx, rn, bits as u8, is_signed);
                    rm = extend_narrow(ctx, rm, bits as u8, is_signed);
                }
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Zero(rm),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                // quotient = rn / rm; rd = rn - quotient * rm (msub).
                let size = op_size(ty);
                let quotient = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                ctx.emit(Inst::AluRRR {
                    alu_op: if is_signed { ALUOp::SDiv } else { ALUOp::UDiv },
                    size,
                    rd: quotient,
                    rn,
                    rm,
                });
                ctx.emit(Inst::AluRRRR {
                    alu_op: ALUOp3::MSub,
                    size,
                    rd,
                    rn: quotient.to_reg(),
                    rm,
                    ra: rn,
                });
            }

            Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let ty = ctx.output_ty(inst, 0);
                if ty.is_vector() {
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    let rm = put_input_in_reg(ctx, inst, 1);
                    let alu_op = match op {
                        Opcode::Band => VecALUOp::And,
                        Opcode::Bor => VecALUOp::Orr,
                        Opcode::Bxor => VecALUOp::Eor,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::VecRRR {
                        alu_op,
                        rd,
                        rn,
                        rm,
                        size: VectorSize::from_ty(ty),
                    });
                } else if ty == types::I128 {
                    let lhs = ctx.put_input_in_regs(inst, 0);
                    let rhs = ctx.put_input_in_regs(inst, 1);
                    let dst = ctx.get_output(inst, 0);
                    let alu_op = match op {
                        Opcode::Band => ALUOp::And,
                        Opcode::Bor => ALUOp::Orr,
                        Opcode::Bxor => ALUOp::Eor,
                        _ => unreachable!(),
                    };
                    for limb in 0..2 {
                        ctx.emit(Inst::AluRRR {
                            alu_op,
                            size: OperandSize::Size64,
                            rd: dst.regs()[limb],
                            rn: lhs.regs()[limb],
                            rm: rhs.regs()[limb],
                        });
                    }
                } else {
                    let alu_op = match op {
                        Opcode::Band => ALUOp::And,
                        Opcode::Bor => ALUOp::Orr,
                        Opcode::Bxor => ALUOp::Eor,
                        _ => unreachable!(),
                    };
                    let size = op_size(ty);
                    let rd = get_output_reg(ctx, inst, 0);
                    let rn = put_input_in_reg(ctx, inst, 0);
                    if let Some(imml) = input_as_immlogic(ctx, inst, 1, size) {
                        sink_input(ctx, inst, 1);
                        ctx.emit(Inst::AluRRImmLogic {
                            alu_op,
                            size,
                            rd,
                            rn,
                            imml,
                        });
                    } else {
                        let rm = put_input_in_reg(ctx, inst, 1);
                        ctx.emit(Inst::AluRRR {
                            alu_op,
                            size,
                            rd,
                            rn,
                            rm,
                        });
                    }
                }
            }

            Opcode::Bnot => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rm = put_input_in_reg(ctx, inst, 0);
                // NOT rd, rm is ORN rd, zero, rm.
                ctx.emit(Inst::AluRRR {
                    alu_op: ALUOp::OrrNot,
                    size: op_size(ty),
                    rd,
                    rn: zero_reg(),
                    rm,
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr => {
                let ty = ctx.output_ty(inst, 0);
                let bits = ty.bits();
                let size = op_size(ty);
                let rd = get_output_reg(ctx, inst, 0);
                let alu_op = match op {
                    Opcode::Ishl => ALUOp::Lsl,
                    Opcode::Ushr => ALUOp::Lsr,
                    Opcode::Sshr => ALUOp::Asr,
                    _ => unreachable!(),
                };
                // Sub-word shifts must normalize the value first so the
                // shifted-in bits are well defined.
                let rn = if bits < 32 {
                    let raw = put_input_in_reg(ctx, inst, 0);
                    extend_narrow(ctx, raw, bits as u8, op == Opcode::Sshr)
                } else {
                    put_input_in_reg(ctx, inst, 0)
                };
                if let Some(c) = input_as_const_u64(ctx, inst, 1) {
                    let amt = c & u64::from(bits - 1);
                    sink_input(ctx, inst, 1);
                    ctx.emit(Inst::AluRRImmShift {
                        alu_op,
                        size,
                        rd,
                        rn,
                        immshift: ImmShift::maybe_from_u64(amt).unwrap(),
                    });
                } else {
                    let rm = put_input_in_reg(ctx, inst, 1);
                    // The hardware masks the amount to the operand size;
                    // for sub-word types mask explicitly.
                    let rm = if bits < 32 {
                        let masked = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                        ctx.emit(Inst::AluRRImmLogic {
                            alu_op: ALUOp::And,
                            size: OperandSize::Size32,
                            rd: masked,
                            rn: rm,
                            imml: ImmLogic::maybe_from_u64(
                                u64::from(bits - 1),
                                OperandSize::Size32,
                            )
                            .unwrap(),
                        });
                        masked.to_reg()
                    } else {
                        rm
                    };
                    ctx.emit(Inst::AluRRR {
                        alu_op,
                        size,
                        rd,
                        rn,
                        rm,
                    });
                }
            }

            Opcode::Clz | Opcode::Ctz => {
                let ty = ctx.output_ty(inst, 0);
                let bits = ty.bits();
                let size = op_size(ty);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = if bits < 32 {
                    let raw = put_input_in_reg(ctx, inst, 0);
                    extend_narrow(ctx, raw, bits as u8, false)
                } else {
                    put_input_in_reg(ctx, inst, 0)
                };
                if op == Opcode::Ctz {
                    // ctz = clz(rbit(x)).
                    ctx.emit(Inst::BitRR {
                        op: BitOp::RBit,
                        size,
                        rd,
                        rn,
                    });
                    ctx.emit(Inst::BitRR {
                        op: BitOp::Clz,
                        size,
                        rd,
                        rn: rd.to_reg(),
                    });
                } else {
                    ctx.emit(Inst::BitRR {
                        op: BitOp::Clz,
                        size,
                        rd,
                        rn,
                    });
                    if bits < 32 {
                        // Discount the bits above the narrow value.
                        ctx.emit(Inst::AluRRImm12 {
                            alu_op: ALUOp::Sub,
                            size: OperandSize::Size32,
                            rd,
                            rn: rd.to_reg(),
                            imm12: Imm12::maybe_from_u64(u64::from(32 - bits)).unwrap(),
                        });
                    }
                }
            }

            Opcode::Icmp => {
                let cc = ctx.data(inst).cond_code().unwrap();
                let rd = get_output_reg(ctx, inst, 0);
                let cond = lower_icmp_to_flags(ctx, inst, cc);
                ctx.emit(Inst::CSet { rd, cond });
            }
            Opcode::Fcmp => {
                let cc = ctx.data(inst).fp_cond_code().unwrap();
                let rd = get_output_reg(ctx, inst, 0);
                let cond = lower_fcmp_to_flags(ctx, inst, cc);
                ctx.emit(Inst::CSet { rd, cond });
            }

            Opcode::Select => {
                let ty = ctx.output_ty(inst, 0);
                // Test the condition; merge a unique-use icmp/fcmp
                // producer directly into the flags.
                let cond = {
                    let input = ctx.get_input_as_source_or_const(inst, 0);
                    match input.inst {
                        Some((cmp_inst, 0))
                            if ctx.data(cmp_inst).opcode() == Opcode::Icmp =>
                        {
                            let cc = ctx.data(cmp_inst).cond_code().unwrap();
                            ctx.sink_inst(cmp_inst);
                            lower_icmp_to_flags(ctx, cmp_inst, cc)
                        }
                        Some((cmp_inst, 0))
                            if ctx.data(cmp_inst).opcode() == Opcode::Fcmp =>
                        {
                            let cc = ctx.data(cmp_inst).fp_cond_code().unwrap();
                            ctx.sink_inst(cmp_inst);
                            lower_fcmp_to_flags(ctx, cmp_inst, cc)
                        }
                        _ => {
                            let rcond = put_truthy_value_in_reg(ctx, inst, 0);
                            ctx.emit(Inst::AluRRR {
                                alu_op: ALUOp::SubS,
                                size: OperandSize::Size64,
                                rd: writable_zero_reg(),
                                rn: rcond,
                                rm: zero_reg(),
                            });
                            Cond::Ne
                        }
                    }
                };
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 1);
                let rm = put_input_in_reg(ctx, inst, 2);
                if ty.is_float() {
                    ctx.emit(Inst::FpuCSel {
                        size: ScalarSize::from_ty(ty),
                        rd,
                        rn,
                        rm,
                        cond,
                    });
                } else {
                    ctx.emit(Inst::CSel {
                        rd,
                        cond,
                        rn,
                        rm,
                        size: op_size(ty),
                    });
                }
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::Extend {
                    rd,
                    rn,
                    signed: op == Opcode::Sextend,
                    from_bits: from_ty.bits() as u8,
                    to_bits: to_ty.bits().min(64) as u8,
                });
            }

            Opcode::Ireduce => {
                // A wider value truncates for free: just copy the (low)
                // register.
                let rd = get_output_reg(ctx, inst, 0);
                let src = ctx.put_input_in_regs(inst, 0);
                ctx.emit(Inst::Mov {
                    size: OperandSize::Size64,
                    rd,
                    rm: src.regs()[0],
                });
            }

            Opcode::Bitcast => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                match (from_ty.is_float(), to_ty.is_float()) {
                    (false, true) => ctx.emit(Inst::MovToFpu {
                        rd,
                        rn,
                        size: ScalarSize::from_ty(to_ty),
                    }),
                    (true, false) => ctx.emit(Inst::MovFromFpu {
                        rd,
                        rn,
                        size: ScalarSize::from_ty(from_ty),
                    }),
                    (false, false) => ctx.emit(Inst::Mov {
                        size: OperandSize::Size64,
                        rd,
                        rm: rn,
                    }),
                    (true, true) => ctx.emit(Inst::FpuMove {
                        size: ScalarSize::from_ty(to_ty),
                        rd,
                        rn,
                    }),
                }
            }

            Opcode::Splat => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::VecDup {
                    rd,
                    rn,
                    size: VectorSize::from_ty(ty),
                });
            }

            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let rm = put_input_in_reg(ctx, inst, 1);
                if ty.is_vector() {
                    let alu_op = match op {
                        Opcode::Fadd => VecALUOp::Fadd,
                        Opcode::Fsub => VecALUOp::Fsub,
                        Opcode::Fmul => VecALUOp::Fmul,
                        Opcode::Fdiv => VecALUOp::Fdiv,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::VecRRR {
                        alu_op,
                        rd,
                        rn,
                        rm,
                        size: VectorSize::from_ty(ty),
                    });
                } else {
                    let fpu_op = match op {
                        Opcode::Fadd => FPUOp2::Add,
                        Opcode::Fsub => FPUOp2::Sub,
                        Opcode::Fmul => FPUOp2::Mul,
                        Opcode::Fdiv => FPUOp2::Div,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::FpuRRR {
                        op: fpu_op,
                        size: ScalarSize::from_ty(ty),
                        rd,
                        rn,
                        rm,
                    });
                }
            }

            Opcode::Fneg | Opcode::Fabs | Opcode::Sqrt => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let fpu_op = match op {
                    Opcode::Fneg => FPUOp1::Neg,
                    Opcode::Fabs => FPUOp1::Abs,
                    Opcode::Sqrt => FPUOp1::Sqrt,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::FpuRR {
                    op: fpu_op,
                    size: ScalarSize::from_ty(ty),
                    rd,
                    rn,
                });
            }

            Opcode::Ceil | Opcode::Floor | Opcode::Trunc | Opcode::Nearest => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let mode = match op {
                    Opcode::Ceil => FpuRoundMode::Plus,
                    Opcode::Floor => FpuRoundMode::Minus,
                    Opcode::Trunc => FpuRoundMode::Zero,
                    Opcode::Nearest => FpuRoundMode::Nearest,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::FpuRound {
                    mode,
                    size: ScalarSize::from_ty(ty),
                    rd,
                    rn,
                });
            }

            Opcode::Fpromote | Opcode::Fdemote => {
                let from_ty = ctx.input_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let (fpu_op, size) = if op == Opcode::Fpromote {
                    (FPUOp1::Cvt32To64, ScalarSize::Size32)
                } else {
                    (FPUOp1::Cvt64To32, ScalarSize::Size64)
                };
                debug_assert_eq!(ScalarSize::from_ty(from_ty), size);
                ctx.emit(Inst::FpuRR {
                    op: fpu_op,
                    size,
                    rd,
                    rn,
                });
            }

            Opcode::FcvtToUint | Opcode::FcvtToSint => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let in_size = ScalarSize::from_ty(from_ty);
                // A NaN input has no integer representation.
                ctx.emit(Inst::FpuCmp {
                    size: in_size,
                    rn,
                    rm: rn,
                });
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Cond(Cond::Vs),
                    trap_code: TrapCode::BadConversionToInteger,
                });
                ctx.emit(Inst::FpuToInt {
                    signed: op == Opcode::FcvtToSint,
                    in_size,
                    out_size: op_size(to_ty),
                    rd,
                    rn,
                });
            }
            Opcode::FcvtFromUint | Opcode::FcvtFromSint => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rn = put_input_in_reg(ctx, inst, 0);
                let bits = from_ty.bits();
                let rn = if bits < 32 {
                    extend_narrow(ctx, rn, bits as u8, op == Opcode::FcvtFromSint)
                } else {
                    rn
                };
                ctx.emit(Inst::IntToFpu {
                    signed: op == Opcode::FcvtFromSint,
                    in_size: op_size(from_ty),
                    out_size: ScalarSize::from_ty(to_ty),
                    rd,
                    rn,
                });
            }

            Opcode::Load
            | Opcode::Uload8
            | Opcode::Sload8
            | Opcode::Uload16
            | Opcode::Sload16
            | Opcode::Uload32
            | Opcode::Sload32 => {
                let offset = match ctx.data(inst) {
                    &InstructionData::Load { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let out_ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let mem = lower_address(ctx, inst, 0, offset);
                let inst_out = match (op, out_ty) {
                    (Opcode::Load, types::I8) => Inst::ULoad8 { rd, mem },
                    (Opcode::Load, types::I16) => Inst::ULoad16 { rd, mem },
                    (Opcode::Load, types::I32) => Inst::ULoad32 { rd, mem },
                    (Opcode::Load, types::I64) => Inst::ULoad64 { rd, mem },
                    (Opcode::Load, types::F32) => Inst::FpuLoad32 { rd, mem },
                    (Opcode::Load, types::F64) => Inst::FpuLoad64 { rd, mem },
                    (Opcode::Load, t) if t.is_vector() && t.bits() == 128 => {
                        Inst::FpuLoad128 { rd, mem }
                    }
                    (Opcode::Uload8, _) => Inst::ULoad8 { rd, mem },
                    (Opcode::Sload8, _) => Inst::SLoad8 { rd, mem },
                    (Opcode::Uload16, _) => Inst::ULoad16 { rd, mem },
                    (Opcode::Sload16, _) => Inst::SLoad16 { rd, mem },
                    (Opcode::Uload32, _) => Inst::ULoad32 { rd, mem },
                    (Opcode::Sload32, _) => Inst::SLoad32 { rd, mem },
                    _ => return Err(ctx.lowering_error(inst)),
                };
                ctx.emit(inst_out);
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let offset = match ctx.data(inst) {
                    &InstructionData::Store { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let rd = put_input_in_reg(ctx, inst, 0);
                let mem = lower_address(ctx, inst, 1, offset);
                let inst_out = match (op, val_ty) {
                    (Opcode::Store, types::I8) => Inst::Store8 { rd, mem },
                    (Opcode::Store, types::I16) => Inst::Store16 { rd, mem },
                    (Opcode::Store, types::I32) => Inst::Store32 { rd, mem },
                    (Opcode::Store, types::I64) => Inst::Store64 { rd, mem },
                    (Opcode::Store, types::F32) => Inst::FpuStore32 { rd, mem },
                    (Opcode::Store, types::F64) => Inst::FpuStore64 { rd, mem },
                    (Opcode::Store, t) if t.is_vector() && t.bits() == 128 => {
                        Inst::FpuStore128 { rd, mem }
                    }
                    (Opcode::Istore8, _) => Inst::Store8 { rd, mem },
                    (Opcode::Istore16, _) => Inst::Store16 { rd, mem },
                    (Opcode::Istore32, _) => Inst::Store32 { rd, mem },
                    _ => return Err(ctx.lowering_error(inst)),
                };
                ctx.emit(inst_out);
            }

            Opcode::StackLoad => {
                let (slot, offset) = match ctx.data(inst) {
                    &InstructionData::StackLoad {
                        stack_slot, offset, ..
                    } => (stack_slot, offset),
                    _ => unreachable!(),
                };
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let load = ctx.abi().stackslot_load(slot, off as u32, rd, ty);
                ctx.emit(load);
            }
            Opcode::StackStore => {
                let (slot, offset) = match ctx.data(inst) {
                    &InstructionData::StackStore {
                        stack_slot, offset, ..
                    } => (stack_slot, offset),
                    _ => unreachable!(),
                };
                let ty = ctx.input_ty(inst, 0);
                let rd = put_input_in_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let store = ctx.abi().stackslot_store(slot, off as u32, rd, ty);
                ctx.emit(store);
            }
            Opcode::StackAddr => {
                let (slot, offset) = match ctx.data(inst) {
                    &InstructionData::StackLoad {
                        stack_slot, offset, ..
                    } => (stack_slot, offset),
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let addr = ctx.abi().stackslot_addr(slot, off as u32, rd);
                ctx.emit(addr);
            }

            Opcode::FuncAddr => {
                let func_ref = match ctx.data(inst) {
                    &InstructionData::FuncAddr { func_ref, .. } => func_ref,
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                let name = ctx.f.dfg.ext_funcs[func_ref].name.clone();
                ctx.emit(Inst::LoadExtName {
                    rd,
                    name: Box::new(name),
                    offset: 0,
                });
            }

            Opcode::GlobalValue => {
                let gv = match ctx.data(inst) {
                    &InstructionData::UnaryGlobalValue { global_value, .. } => global_value,
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                match &ctx.f.global_values[gv] {
                    &crate::ir::GlobalValueData::Symbol {
                        ref name, offset, ..
                    } => {
                        let name = name.clone();
                        ctx.emit(Inst::LoadExtName {
                            rd,
                            name: Box::new(name),
                            offset: offset.into(),
                        });
                    }
                    _ => return Err(ctx.lowering_error(inst)),
                }
            }

            Opcode::Trap => {
                let code = ctx.data(inst).trap_code().unwrap();
                ctx.emit(Inst::Udf { trap_code: code });
            }
            Opcode::Trapz | Opcode::Trapnz => {
                let code = ctx.data(inst).trap_code().unwrap();
                let rt = put_truthy_value_in_reg(ctx, inst, 0);
                let kind = if op == Opcode::Trapz {
                    CondBrKind::Zero(rt)
                } else {
                    CondBrKind::NotZero(rt)
                };
                ctx.emit(Inst::TrapIf {
                    kind,
                    trap_code: code,
                });
            }

            _ => return Err(ctx.lowering_error(inst)),
        }
        Ok(())
    }

    fn lower_branch(
        &self,
        ctx: Ctx,
        inst: IRInst,
        targets: &[MachLabel],
    ) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Brif => {
                // Merge a unique-use comparison producer into the branch.
                let input = ctx.get_input_as_source_or_const(inst, 0);
                let kind = match input.inst {
                    Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Icmp => {
                        let cc = ctx.data(cmp_inst).cond_code().unwrap();
                        ctx.sink_inst(cmp_inst);
                        CondBrKind::Cond(lower_icmp_to_flags(ctx, cmp_inst, cc))
                    }
                    Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Fcmp => {
                        let cc = ctx.data(cmp_inst).fp_cond_code().unwrap();
                        ctx.sink_inst(cmp_inst);
                        CondBrKind::Cond(lower_fcmp_to_flags(ctx, cmp_inst, cc))
                    }
                    _ => {
                        let rt = put_truthy_value_in_reg(ctx, inst, 0);
                        CondBrKind::NotZero(rt)
                    }
                };
                ctx.emit(Inst::CondBr {
                    taken: BranchTarget::Label(targets[0]),
                    not_taken: BranchTarget::Label(targets[1]),
                    kind,
                });
                Ok(())
            }

            Opcode::BrTable => {
                // A compare chain: small tables only arise here since the
                // mid-end turns large tables into this same shape anyway.
                // targets[0] is the default; targets[1..] the entries.
                let ridx = put_truthy_value_in_reg(ctx, inst, 0);
                for (i, &target) in targets.iter().enumerate().skip(1) {
                    let entry = (i - 1) as u64;
                    if let Some(imm12) = Imm12::maybe_from_u64(entry) {
                        ctx.emit(Inst::AluRRImm12 {
                            alu_op: ALUOp::SubS,
                            size: OperandSize::Size64,
                            rd: writable_zero_reg(),
                            rn: ridx,
                            imm12,
                        });
                    } else {
                        let rtmp = constant_to_reg(ctx, entry);
                        ctx.emit(Inst::AluRRR {
                            alu_op: ALUOp::SubS,
                            size: OperandSize::Size64,
                            rd: writable_zero_reg(),
                            rn: ridx,
                            rm: rtmp,
                        });
                    }
                    // Each comparison falls through to the next on
                    // mismatch; the final fallthrough is the default.
                    ctx.emit(Inst::CondBr {
                        taken: BranchTarget::Label(target),
                        not_taken: BranchTarget::ResolvedOffset(4),
                        kind: CondBrKind::Cond(Cond::Eq),
                    });
                }
                ctx.emit(Inst::Jump {
                    dest: BranchTarget::Label(targets[0]),
                });
                Ok(())
            }

            _ => Err(ctx.lowering_error(inst)),
        }
    }
}
