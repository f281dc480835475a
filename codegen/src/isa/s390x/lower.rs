//! Lowering rules for s390x.

use crate::ir::condcodes::IntCC;
use crate::ir::{Inst as IRInst, InstructionData, Opcode, TrapCode};
use crate::ir::types;
use crate::isa::s390x::abi::S390xMachineDeps;
use crate::isa::s390x::inst::*;
use crate::machinst::buffer::MachLabel;
use crate::machinst::lower::{Lower, LowerBackend};
use crate::machinst::reg::{Reg, Writable};
use crate::result::CodegenResult;

/// The s390x lowering rule set.
pub struct S390xBackend;

type Ctx<'a, 'f> = &'a mut Lower<'f, S390xMachineDeps>;

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

/// Sign- or zero-extend a narrow value into a fresh register.
fn extend_narrow(ctx: Ctx, src: Reg, bits: u8, signed: bool) -> Reg {
    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
    ctx.emit(Inst::ShiftImm {
        op: ShiftOp::Sllg,
        dst: tmp,
        src,
        amt: 64 - bits,
    });
    ctx.emit(Inst::ShiftImm {
        op: if signed { ShiftOp::Srag } else { ShiftOp::Srlg },
        dst: tmp,
        src: tmp.to_reg(),
        amt: 64 - bits,
    });
    tmp.to_reg()
}

fn put_extended_input(ctx: Ctx, inst: IRInst, idx: usize, signed: bool) -> Reg {
    let ty = ctx.input_ty(inst, idx);
    let src = put_input_in_reg(ctx, inst, idx);
    if ty.bits() < 64 {
        extend_narrow(ctx, src, ty.bits() as u8, signed)
    } else {
        src
    }
}

/// The branch mask testing an integer condition after a compare.
fn mask_for_cc(cc: IntCC) -> CondMask {
    match cc {
        IntCC::Equal => CondMask::eq(),
        IntCC::NotEqual => CondMask::ne(),
        IntCC::SignedLessThan | IntCC::UnsignedLessThan => CondMask::lt(),
        IntCC::SignedGreaterThan | IntCC::UnsignedGreaterThan => CondMask::gt(),
        IntCC::SignedLessThanOrEqual | IntCC::UnsignedLessThanOrEqual => CondMask::le(),
        IntCC::SignedGreaterThanOrEqual | IntCC::UnsignedGreaterThanOrEqual => CondMask::ge(),
    }
}

/// Emit a compare setting the condition code, returning the mask to test.
fn lower_icmp_to_cc(ctx: Ctx, icmp: IRInst) -> CondMask {
    let cc = ctx.data(icmp).cond_code().unwrap();
    let signed = cc.is_signed();
    let a = put_extended_input(ctx, icmp, 0, signed);
    let b = put_extended_input(ctx, icmp, 1, signed);
    ctx.emit(Inst::Cmp { signed, a, b });
    mask_for_cc(cc)
}

impl LowerBackend for S390xBackend {
    type M = S390xMachineDeps;

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
                ctx.emit(Inst::Imm64 { dst, value });
            }

            Opcode::Iadd | Opcode::Isub | Opcode::Band | Opcode::Bor | Opcode::Bxor
            | Opcode::Imul => {
                let dst = get_output_reg(ctx, inst, 0);
                let lhs = put_input_in_reg(ctx, inst, 0);
                let rhs = put_input_in_reg(ctx, inst, 1);
                let alu_op = match op {
                    Opcode::Iadd => AluOp::Add,
                    Opcode::Isub => AluOp::Sub,
                    Opcode::Band => AluOp::And,
                    Opcode::Bor => AluOp::Or,
                    Opcode::Bxor => AluOp::Xor,
                    Opcode::Imul => AluOp::Mul,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::MovRR { dst, src: lhs });
                ctx.emit(Inst::AluRR {
                    op: alu_op,
                    dst,
                    src: rhs,
                });
            }

            Opcode::Ineg => {
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::Imm64 { dst, value: 0 });
                ctx.emit(Inst::AluRR {
                    op: AluOp::Sub,
                    dst,
                    src,
                });
            }

            Opcode::Bnot => {
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let ones = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                ctx.emit(Inst::Imm64 {
                    dst: ones,
                    value: u64::MAX,
                });
                ctx.emit(Inst::MovRR { dst, src });
                ctx.emit(Inst::AluRR {
                    op: AluOp::Xor,
                    dst,
                    src: ones.to_reg(),
                });
            }

            Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                let signed = matches!(op, Opcode::Sdiv | Opcode::Srem);
                let is_rem = matches!(op, Opcode::Urem | Opcode::Srem);
                let dst = get_output_reg(ctx, inst, 0);
                let lhs = put_extended_input(ctx, inst, 0, signed);
                let rhs = put_extended_input(ctx, inst, 1, signed);
                // Trap on zero divisors.
                let zero = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                ctx.emit(Inst::Imm64 {
                    dst: zero,
                    value: 0,
                });
                ctx.emit(Inst::Cmp {
                    signed: false,
                    a: rhs,
                    b: zero.to_reg(),
                });
                ctx.emit(Inst::TrapIf {
                    mask: CondMask::eq(),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                // The divide uses the fixed r4:r5 pair: dividend in r5,
                // r4 holds the sign/zero extension.
                ctx.emit(Inst::MovRR {
                    dst: writable_gpr(5),
                    src: lhs,
                });
                if signed {
                    ctx.emit(Inst::MovRR {
                        dst: writable_gpr(4),
                        src: lhs,
                    });
                    ctx.emit(Inst::ShiftImm {
                        op: ShiftOp::Srag,
                        dst: writable_gpr(4),
                        src: gpr(4),
                        amt: 63,
                    });
                } else {
                    ctx.emit(Inst::Imm64 {
                        dst: writable_gpr(4),
                        value: 0,
                    });
                }
                ctx.emit(Inst::Div {
                    signed,
                    divisor: rhs,
                });
                ctx.emit(Inst::MovRR {
                    dst,
                    src: if is_rem { gpr(4) } else { gpr(5) },
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr => {
                let ty = ctx.output_ty(inst, 0);
                let bits = ty.bits();
                let shift_op = match op {
                    Opcode::Ishl => ShiftOp::Sllg,
                    Opcode::Ushr => ShiftOp::Srlg,
                    Opcode::Sshr => ShiftOp::Srag,
                    _ => unreachable!(),
                };
                let dst = get_output_reg(ctx, inst, 0);
                let src = if bits < 64 {
                    put_extended_input(ctx, inst, 0, op == Opcode::Sshr)
                } else {
                    put_input_in_reg(ctx, inst, 0)
                };
                let input = ctx.get_input_as_source_or_const(inst, 1);
                if let (Some((def_inst, _)), Some(c)) = (input.inst, input.constant) {
                    if ctx.data(def_inst).opcode() == Opcode::Iconst {
                        ctx.sink_inst(def_inst);
                        ctx.emit(Inst::ShiftImm {
                            op: shift_op,
                            dst,
                            src,
                            amt: (c as u8) & (bits - 1) as u8,
                        });
                        return Ok(());
                    }
                }
                let raw = put_input_in_reg(ctx, inst, 1);
                // Mask the amount to the type width: the hardware shifts
                // use the low 6 bits of the amount register.
                let amt = if bits < 64 {
                    let masked = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    let m = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    ctx.emit(Inst::Imm64 {
                        dst: m,
                        value: u64::from(bits - 1),
                    });
                    ctx.emit(Inst::MovRR {
                        dst: masked,
                        src: raw,
                    });
                    ctx.emit(Inst::AluRR {
                        op: AluOp::And,
                        dst: masked,
                        src: m.to_reg(),
                    });
                    masked.to_reg()
                } else {
                    raw
                };
                ctx.emit(Inst::ShiftReg {
                    op: shift_op,
                    dst,
                    src,
                    amt,
                });
            }

            Opcode::Icmp => {
                let dst = get_output_reg(ctx, inst, 0);
                let mask = lower_icmp_to_cc(ctx, inst);
                ctx.emit(Inst::CSet { dst, mask });
            }

            Opcode::Select => {
                let mask = {
                    let input = ctx.get_input_as_source_or_const(inst, 0);
                    match input.inst {
                        Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Icmp => {
                            ctx.sink_inst(cmp_inst);
                            lower_icmp_to_cc(ctx, cmp_inst)
                        }
                        _ => {
                            let v = put_extended_input(ctx, inst, 0, false);
                            let zero = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                            ctx.emit(Inst::Imm64 {
                                dst: zero,
                                value: 0,
                            });
                            ctx.emit(Inst::Cmp {
                                signed: false,
                                a: v,
                                b: zero.to_reg(),
                            });
                            CondMask::ne()
                        }
                    }
                };
                let dst = get_output_reg(ctx, inst, 0);
                let if_true = put_input_in_reg(ctx, inst, 1);
                let if_false = put_input_in_reg(ctx, inst, 2);
                ctx.emit(Inst::CSel {
                    dst,
                    mask,
                    if_true,
                    if_false,
                });
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let widened =
                    extend_narrow(ctx, src, from_ty.bits() as u8, op == Opcode::Sextend);
                ctx.emit(Inst::MovRR { dst, src: widened });
            }

            Opcode::Ireduce => {
                let dst = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::MovRR { dst, src });
            }

            Opcode::Load
            | Opcode::Uload8
            | Opcode::Sload8
            | Opcode::Uload16
            | Opcode::Sload16
            | Opcode::Uload32
            | Opcode::Sload32 => {
                let offset: i32 = match ctx.data(inst) {
                    &InstructionData::Load { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let out_ty = ctx.output_ty(inst, 0);
                let dst = get_output_reg(ctx, inst, 0);
                let base = put_input_in_reg(ctx, inst, 0);
                let (bytes, sign_extend) = match op {
                    Opcode::Load => (out_ty.bytes().min(8) as u8, true),
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
                    base,
                    disp: offset,
                });
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let offset: i32 = match ctx.data(inst) {
                    &InstructionData::Store { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let base = put_input_in_reg(ctx, inst, 1);
                let bytes = match op {
                    Opcode::Store => val_ty.bytes().min(8) as u8,
                    Opcode::Istore8 => 1,
                    Opcode::Istore16 => 2,
                    Opcode::Istore32 => 4,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::Store {
                    bytes,
                    src,
                    base,
                    disp: offset,
                });
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
                ctx.emit(Inst::Trap { trap_code: code });
            }
            Opcode::Trapz | Opcode::Trapnz => {
                let code = ctx.data(inst).trap_code().unwrap();
                let v = put_extended_input(ctx, inst, 0, false);
                let zero = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                ctx.emit(Inst::Imm64 {
                    dst: zero,
                    value: 0,
                });
                ctx.emit(Inst::Cmp {
                    signed: false,
                    a: v,
                    b: zero.to_reg(),
                });
                ctx.emit(Inst::TrapIf {
                    mask: if op == Opcode::Trapz {
                        CondMask::eq()
                    } else {
                        CondMask::ne()
                    },
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
                let mask = {
                    let input = ctx.get_input_as_source_or_const(inst, 0);
                    match input.inst {
                        Some((cmp_inst, 0)) if ctx.data(cmp_inst).opcode() == Opcode::Icmp => {
                            ctx.sink_inst(cmp_inst);
                            lower_icmp_to_cc(ctx, cmp_inst)
                        }
                        _ => {
                            let v = put_extended_input(ctx, inst, 0, false);
                            let zero = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                            ctx.emit(Inst::Imm64 {
                                dst: zero,
                                value: 0,
                            });
                            ctx.emit(Inst::Cmp {
                                signed: false,
                                a: v,
                                b: zero.to_reg(),
                            });
                            CondMask::ne()
                        }
                    }
                };
                ctx.emit(Inst::CondBr {
                    mask,
                    taken: targets[0],
                    not_taken: targets[1],
                });
                Ok(())
            }
            Opcode::BrTable => {
                let idx = put_extended_input(ctx, inst, 0, false);
                for (i, &target) in targets.iter().enumerate().skip(1) {
                    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    ctx.emit(Inst::Imm64 {
                        dst: tmp,
                        value: (i - 1) as u64,
                    });
                    ctx.emit(Inst::Cmp {
                        signed: false,
                        a: idx,
                        b: tmp.to_reg(),
                    });
                    ctx.emit(Inst::OneWayCondBr {
                        mask: CondMask::eq(),
                        taken: target,
                    });
                }
                ctx.emit(Inst::Jump { dest: targets[0] });
                Ok(())
            }
            _ => Err(ctx.lowering_error(inst)),
        }
    }
}
