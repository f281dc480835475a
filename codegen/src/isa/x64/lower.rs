//! Lowering rules for x64.
//!
//! x64 instructions are mostly two-address, so binary operations move the
//! first operand into the destination and operate in place (a `mod`
//! operand for the allocator).

use crate::ir::{Inst as IRInst, InstructionData, Opcode, TrapCode};
use crate::ir::types;
use crate::isa::x64::abi::X64MachineDeps;
use crate::isa::x64::inst::*;
use crate::machinst::buffer::MachLabel;
use crate::machinst::lower::{Lower, LowerBackend};
use crate::machinst::reg::{Reg, Writable};
use crate::result::CodegenResult;

/// The x64 lowering rule set.
pub struct X64Backend;

type Ctx<'a, 'f> = &'a mut Lower<'f, X64MachineDeps>;

fn put_input_in_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Reg {
    ctx.put_input_in_regs(inst, idx)
        .only_reg()
        .expect("value in one register")
}

fn get_output_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Writable<Reg> {
    ctx.get_output(inst, idx)
        .only_reg()
        .expect("result in one register")
}

fn input_as_simm32(ctx: Ctx, inst: IRInst, idx: usize) -> Option<i32> {
    let input = ctx.get_input_as_source_or_const(inst, idx);
    let (def_inst, _) = input.inst?;
    if ctx.data(def_inst).opcode() != Opcode::Iconst {
        return None;
    }
    let c = input.constant? as i64;
    i32::try_from(c).ok()
}

fn is_64(ty: crate::ir::Type) -> bool {
    ty.bits() == 64
}

/// Zero- or sign-extend a narrow value into a fresh full-width register.
fn extend_narrow(ctx: Ctx, src: Reg, _from_bits: u8, signed: bool, bits: u8) -> Reg {
    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
    // A shift pair keeps this generic over the source width.
    ctx.emit(Inst::MovRR {
        is64: true,
        dst: tmp,
        src,
    });
    ctx.emit(Inst::Shift {
        kind: ShiftKind::Shl,
        is64: true,
        dst: tmp,
        num_bits: Some(64 - bits),
    });
    ctx.emit(Inst::Shift {
        kind: if signed {
            ShiftKind::ShrArithmetic
        } else {
            ShiftKind::ShrLogical
        },
        is64: true,
        dst: tmp,
        num_bits: Some(64 - bits),
    });
    tmp.to_reg()
}

/// Set flags for an integer comparison, extending narrow operands.
fn lower_icmp_to_flags(ctx: Ctx, icmp: IRInst) -> CC {
    let cc = ctx.data(icmp).cond_code().unwrap();
    let ty = ctx.input_ty(icmp, 0);
    let bits = ty.bits();
    let mut a = put_input_in_reg(ctx, icmp, 0);
    let mut b = put_input_in_reg(ctx, icmp, 1);
    if bits < 32 {
        let signed = cc.is_signed();
        a = extend_narrow(ctx, a, bits as u8, signed, bits as u8);
        b = extend_narrow(ctx, b, bits as u8, signed, bits as u8);
    }
    ctx.emit(Inst::CmpRR {
        is64: is_64(ty) || bits < 32,
        a,
        b,
    });
    CC::from_intcc(cc)
}

/// A register holding the truthiness of a possibly-narrow value.
fn put_truthy_value_in_reg(ctx: Ctx, inst: IRInst, idx: usize) -> Reg {
    let ty = ctx.input_ty(inst, idx);
    let src = put_input_in_reg(ctx, inst, idx);
    if ty.bits() < 32 {
        extend_narrow(ctx, src, ty.bits() as u8, false, ty.bits() as u8)
    } else {
        src
    }
}

impl LowerBackend for X64Backend {
    type M = X64MachineDeps;

    fn lower(&self, ctx: Ctx, inst: IRInst) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Nop => {}

            Opcode::Iconst => {
                let value = match ctx.data(inst) {
                    &InstructionData::UnaryImm { imm, .. } => imm.bits() as u64,
                    _ => unreachable!(),
                };
                let dst = get_output_reg(ctx, inst, 0);
                ctx.emit(Inst::Imm { dst, simm64: value });
            }

            Opcode::Iadd | Opcode::Isub | Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let lhs = put_input_in_reg(ctx, inst, 0);
                let alu_op = match op {
                    Opcode::Iadd => AluOp::Add,
                    Opcode::Isub => AluOp::Sub,
                    Opcode::Band => AluOp::And,
                    Opcode::Bor => AluOp::Or,
                    Opcode::Bxor => AluOp::Xor,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: lhs,
                });
                if let Some(simm32) = input_as_simm32(ctx, inst, 1) {
                    ctx.emit(Inst::AluRImm {
                        op: alu_op,
                        is64: is_64(ty),
                        dst,
                        simm32,
                    });
                } else {
                    let rhs = put_input_in_reg(ctx, inst, 1);
                    ctx.emit(Inst::AluRR {
                        op: alu_op,
                        is64: is_64(ty),
                        dst,
                        src: rhs,
                    });
                }
            }

            Opcode::Ineg => {
                let ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                // neg = 0 - x via sub from a zeroed destination.
                ctx.emit(Inst::Imm { dst, simm64: 0 });
                ctx.emit(Inst::AluRR {
                    op: AluOp::Sub,
                    is64: is_64(ty),
                    dst,
                    src,
                });
            }

            Opcode::Bnot => {
                let ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src,
                });
                ctx.emit(Inst::AluRImm {
                    op: AluOp::Xor,
                    is64: is_64(ty),
                    dst,
                    simm32: -1,
                });
            }

            Opcode::Imul => {
                let ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let lhs = put_input_in_reg(ctx, inst, 0);
                let rhs = put_input_in_reg(ctx, inst, 1);
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: lhs,
                });
                ctx.emit(Inst::MulRR {
                    is64: is_64(ty),
                    dst,
                    src: rhs,
                });
            }

            Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                let ty = ctx.output_ty(inst, 0);
                if ty.bits() > 64 {
                    return Err(ctx.lowering_error(inst));
                }
                let signed = matches!(op, Opcode::Sdiv | Opcode::Srem);
                let is_rem = matches!(op, Opcode::Urem | Opcode::Srem);
                let bits = ty.bits();
                let dst = get_output_reg(ctx, inst, 0);
                let mut lhs = put_input_in_reg(ctx, inst, 0);
                let mut rhs = put_input_in_reg(ctx, inst, 1);
                if bits < 32 {
                    lhs = extend_narrow(ctx, lhs, bits as u8, signed, bits as u8);
                    rhs = extend_narrow(ctx, rhs, bits as u8, signed, bits as u8);
                }
                // Trap on a zero divisor.
                let zcheck = if bits <= 32 { false } else { true };
                ctx.emit(Inst::CmpRImm {
                    is64: zcheck,
                    a: rhs,
                    simm32: 0,
                });
                ctx.emit(Inst::TrapIf {
                    cc: CC::z(),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                // Dividend goes into rax (with rdx holding the high
                // half/sign); quotient lands in rax, remainder in rdx.
                let rax_w = Writable::from_reg(rax());
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst: rax_w,
                    src: lhs,
                });
                if signed {
                    ctx.emit(Inst::SignExtendAxDx { is64: is_64(ty) });
                } else {
                    ctx.emit(Inst::Imm {
                        dst: Writable::from_reg(rdx()),
                        simm64: 0,
                    });
                }
                ctx.emit(Inst::Div {
                    is64: is_64(ty) || bits < 32,
                    signed,
                    divisor: rhs,
                });
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: if is_rem { rdx() } else { rax() },
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr => {
                let ty = ctx.output_ty(inst, 0);
                let bits = ty.bits();
                let kind = match op {
                    Opcode::Ishl => ShiftKind::Shl,
                    Opcode::Ushr => ShiftKind::ShrLogical,
                    Opcode::Sshr => ShiftKind::ShrArithmetic,
                    _ => unreachable!(),
                };
                let dst = get_output_reg(ctx, inst, 0);
                let lhs = if bits < 32 {
                    let raw = put_input_in_reg(ctx, inst, 0);
                    extend_narrow(ctx, raw, bits as u8, op == Opcode::Sshr, bits as u8)
                } else {
                    put_input_in_reg(ctx, inst, 0)
                };
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: lhs,
                });
                if let Some(simm32) = input_as_simm32(ctx, inst, 1) {
                    let amt = (simm32 as u32) & (bits - 1);
                    ctx.emit(Inst::Shift {
                        kind,
                        is64: is_64(ty) || bits < 32,
                        dst,
                        num_bits: Some(amt as u8),
                    });
                } else {
                    let amt = put_input_in_reg(ctx, inst, 1);
                    ctx.emit(Inst::MovRR {
                        is64: true,
                        dst: Writable::from_reg(rcx()),
                        src: amt,
                    });
                    ctx.emit(Inst::Shift {
                        kind,
                        is64: is_64(ty) || bits < 32,
                        dst,
                        num_bits: None,
                    });
                }
            }

            Opcode::Icmp => {
                let dst = get_output_reg(ctx, inst, 0);
                let cc = lower_icmp_to_flags(ctx, inst);
                ctx.emit(Inst::Setcc { cc, dst });
            }

            Opcode::Select => {
                let ty = ctx.output_ty(inst, 0);
                let cc = {
                    let input = ctx.get_input_as_source_or_const(inst, 0);
                    match input.inst {
                        Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Icmp => {
                            ctx.sink_inst(cmp_inst);
                            lower_icmp_to_flags(ctx, cmp_inst)
                        }
                        _ => {
                            let c = put_truthy_value_in_reg(ctx, inst, 0);
                            ctx.emit(Inst::CmpRImm {
                                is64: true,
                                a: c,
                                simm32: 0,
                            });
                            CC::nz()
                        }
                    }
                };
                let dst = get_output_reg(ctx, inst, 0);
                let if_true = put_input_in_reg(ctx, inst, 1);
                let if_false = put_input_in_reg(ctx, inst, 2);
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: if_false,
                });
                ctx.emit(Inst::Cmove {
                    is64: is_64(ty) || ty.bits() < 64,
                    cc,
                    dst,
                    src: if_true,
                });
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let bits = from_ty.bits() as u8;
                let widened = extend_narrow(ctx, src, bits, op == Opcode::Sextend, bits);
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src: widened,
                });
            }

            Opcode::Ireduce => {
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::MovRR {
                    is64: true,
                    dst,
                    src,
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
                let dst = get_output_reg(ctx, inst, 0);
                let base = put_input_in_reg(ctx, inst, 0);
                let addr = Amode::ImmReg {
                    simm32: offset,
                    base,
                };
                let (bytes, sign_extend) = match op {
                    Opcode::Load => (out_ty.bytes().min(8) as u8, false),
                    Opcode::Uload8 => (1, false),
                    Opcode::Sload8 => (1, true),
                    Opcode::Uload16 => (2, false),
                    Opcode::Sload16 => (2, true),
                    Opcode::Uload32 => (4, false),
                    Opcode::Sload32 => (4, true),
                    _ => unreachable!(),
                };
                ctx.emit(Inst::Load {
                    bytes,
                    sign_extend,
                    dst,
                    addr,
                });
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let offset = match ctx.data(inst) {
                    &InstructionData::Store { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let base = put_input_in_reg(ctx, inst, 1);
                let addr = Amode::ImmReg {
                    simm32: offset,
                    base,
                };
                let bytes = match op {
                    Opcode::Store => val_ty.bytes().min(8) as u8,
                    Opcode::Istore8 => 1,
                    Opcode::Istore16 => 2,
                    Opcode::Istore32 => 4,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::Store { bytes, src, addr });
            }

            Opcode::StackLoad => {
                let (slot, offset) = match ctx.data(inst) {
                    &InstructionData::StackLoad {
                        stack_slot, offset, ..
                    } => (stack_slot, offset),
                    _ => unreachable!(),
                };
                let ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let load = ctx.abi().stackslot_load(slot, off as u32, dst, ty);
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
                let src = put_input_in_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let store = ctx.abi().stackslot_store(slot, off as u32, src, ty);
                ctx.emit(store);
            }
            Opcode::StackAddr => {
                let (slot, offset) = match ctx.data(inst) {
                    &InstructionData::StackLoad {
                        stack_slot, offset, ..
                    } => (stack_slot, offset),
                    _ => unreachable!(),
                };
                let dst = get_output_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let addr = ctx.abi().stackslot_addr(slot, off as u32, dst);
                ctx.emit(addr);
            }

            Opcode::FuncAddr => {
                let func_ref = match ctx.data(inst) {
                    &InstructionData::FuncAddr { func_ref, .. } => func_ref,
                    _ => unreachable!(),
                };
                let dst = get_output_reg(ctx, inst, 0);
                let name = ctx.f.dfg.ext_funcs[func_ref].name.clone();
                ctx.emit(Inst::LoadExtName {
                    dst,
                    name: Box::new(name),
                    offset: 0,
                });
            }

            Opcode::Trap => {
                let code = ctx.data(inst).trap_code().unwrap();
                ctx.emit(Inst::Ud2 { trap_code: code });
            }
            Opcode::Trapz | Opcode::Trapnz => {
                let code = ctx.data(inst).trap_code().unwrap();
                let v = put_truthy_value_in_reg(ctx, inst, 0);
                ctx.emit(Inst::CmpRImm {
                    is64: true,
                    a: v,
                    simm32: 0,
                });
                ctx.emit(Inst::TrapIf {
                    cc: if op == Opcode::Trapz { CC::z() } else { CC::nz() },
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
                let cc = {
                    let input = ctx.get_input_as_source_or_const(inst, 0);
                    match input.inst {
                        Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Icmp => {
                            ctx.sink_inst(cmp_inst);
                            lower_icmp_to_flags(ctx, cmp_inst)
                        }
                        _ => {
                            let v = put_truthy_value_in_reg(ctx, inst, 0);
                            ctx.emit(Inst::CmpRImm {
                                is64: true,
                                a: v,
                                simm32: 0,
                            });
                            CC::nz()
                        }
                    }
                };
                ctx.emit(Inst::JmpCond {
                    cc,
                    taken: targets[0],
                    not_taken: targets[1],
                });
                Ok(())
            }
            Opcode::BrTable => {
                let idx = put_truthy_value_in_reg(ctx, inst, 0);
                // A compare chain: each test falls through to the next on
                // mismatch, ending in the default.
                for (i, &target) in targets.iter().enumerate().skip(1) {
                    ctx.emit(Inst::CmpRImm {
                        is64: true,
                        a: idx,
                        simm32: (i - 1) as i32,
                    });
                    ctx.emit(Inst::JmpIf {
                        cc: CC::from_intcc(crate::ir::condcodes::IntCC::Equal),
                        taken: target,
                    });
                }
                ctx.emit(Inst::JmpKnown { dst: targets[0] });
                Ok(())
            }
            _ => Err(ctx.lowering_error(inst)),
        }
    }
}

