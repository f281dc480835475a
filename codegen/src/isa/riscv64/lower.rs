//! Lowering rules for riscv64.

use crate::ir::condcodes::IntCC;
use crate::ir::{Inst as IRInst, InstructionData, Opcode, TrapCode, Type};
use crate::ir::types;
use crate::isa::riscv64::abi::Riscv64MachineDeps;
use crate::isa::riscv64::inst::*;
use crate::machinst::buffer::MachLabel;
use crate::machinst::lower::{Lower, LowerBackend};
use crate::machinst::reg::{Reg, Writable};
use crate::result::CodegenResult;

/// The riscv64 lowering rule set.
pub struct Riscv64Backend;

type Ctx<'a, 'f> = &'a mut Lower<'f, Riscv64MachineDeps>;

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

fn input_as_imm12(ctx: Ctx, inst: IRInst, idx: usize) -> Option<i16> {
    let input = ctx.get_input_as_source_or_const(inst, idx);
    let (def_inst, _) = input.inst?;
    if ctx.data(def_inst).opcode() != Opcode::Iconst {
        return None;
    }
    let c = input.constant? as i64;
    if (-2048..=2047).contains(&c) {
        Some(c as i16)
    } else {
        None
    }
}

/// Use the W-form (32-bit) of an operation for 32-bit types?
fn is_w_form(ty: Type) -> bool {
    ty.bits() == 32
}

/// Sign- or zero-extend a narrow value into a fresh register via a shift
/// pair.
fn extend_narrow(ctx: Ctx, src: Reg, bits: u8, signed: bool) -> Reg {
    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
    ctx.emit(Inst::AluRRI {
        op: AluOpRRI::Slli,
        rd: tmp,
        rs1: src,
        imm12: i16::from(64 - bits),
    });
    ctx.emit(Inst::AluRRI {
        op: if signed {
            AluOpRRI::Srai
        } else {
            AluOpRRI::Srli
        },
        rd: tmp,
        rs1: tmp.to_reg(),
        imm12: i16::from(64 - bits),
    });
    tmp.to_reg()
}

/// Normalize an operand for comparisons/divisions: the full 64-bit
/// register must reflect the narrow value.
fn put_extended_input(ctx: Ctx, inst: IRInst, idx: usize, signed: bool) -> Reg {
    let ty = ctx.input_ty(inst, idx);
    let src = put_input_in_reg(ctx, inst, idx);
    if ty.bits() < 64 {
        extend_narrow(ctx, src, ty.bits() as u8, signed)
    } else {
        src
    }
}

/// Emit an icmp into a register: 0 or 1.
fn lower_icmp_to_reg(ctx: Ctx, icmp: IRInst, rd: Writable<Reg>) {
    let cc = ctx.data(icmp).cond_code().unwrap();
    let signed = cc.is_signed();
    let a = put_extended_input(ctx, icmp, 0, signed);
    let b = put_extended_input(ctx, icmp, 1, signed);
    match cc {
        IntCC::Equal => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Xor,
                rd,
                rs1: a,
                rs2: b,
            });
            ctx.emit(Inst::AluRRI {
                op: AluOpRRI::Sltiu,
                rd,
                rs1: rd.to_reg(),
                imm12: 1,
            });
        }
        IntCC::NotEqual => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Xor,
                rd,
                rs1: a,
                rs2: b,
            });
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Sltu,
                rd,
                rs1: zero_reg(),
                rs2: rd.to_reg(),
            });
        }
        IntCC::SignedLessThan => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Slt,
                rd,
                rs1: a,
                rs2: b,
            });
        }
        IntCC::UnsignedLessThan => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Sltu,
                rd,
                rs1: a,
                rs2: b,
            });
        }
        IntCC::SignedGreaterThan => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Slt,
                rd,
                rs1: b,
                rs2: a,
            });
        }
        IntCC::UnsignedGreaterThan => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Sltu,
                rd,
                rs1: b,
                rs2: a,
            });
        }
        IntCC::SignedGreaterThanOrEqual => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Slt,
                rd,
                rs1: a,
                rs2: b,
            });
            ctx.emit(Inst::AluRRI {
                op: AluOpRRI::Xori,
                rd,
                rs1: rd.to_reg(),
                imm12: 1,
            });
        }
        IntCC::UnsignedGreaterThanOrEqual => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Sltu,
                rd,
                rs1: a,
                rs2: b,
            });
            ctx.emit(Inst::AluRRI {
                op: AluOpRRI::Xori,
                rd,
                rs1: rd.to_reg(),
                imm12: 1,
            });
        }
        IntCC::SignedLessThanOrEqual => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Slt,
                rd,
                rs1: b,
                rs2: a,
            });
            ctx.emit(Inst::AluRRI {
                op: AluOpRRI::Xori,
                rd,
                rs1: rd.to_reg(),
                imm12: 1,
            });
        }
        IntCC::UnsignedLessThanOrEqual => {
            ctx.emit(Inst::AluRRR {
                op: AluOpRRR::Sltu,
                rd,
                rs1: b,
                rs2: a,
            });
            ctx.emit(Inst::AluRRI {
                op: AluOpRRI::Xori,
                rd,
                rs1: rd.to_reg(),
                imm12: 1,
            });
        }
    }
}

/// Compute the branch kind and operand registers for a `brif` condition.
fn lower_branch_cond(ctx: Ctx, inst: IRInst) -> (BranchKind, Reg, Reg) {
    let input = ctx.get_input_as_source_or_const(inst, 0);
    if let Some((cmp_inst, 0)) = input.inst {
        if ctx.data(cmp_inst).opcode() == Opcode::Icmp {
            let cc = ctx.data(cmp_inst).cond_code().unwrap();
            ctx.sink_inst(cmp_inst);
            let signed = cc.is_signed();
            let a = put_extended_input(ctx, cmp_inst, 0, signed);
            let b = put_extended_input(ctx, cmp_inst, 1, signed);
            let (kind, lhs, rhs) = match cc {
                IntCC::Equal => (BranchKind::Eq, a, b),
                IntCC::NotEqual => (BranchKind::Ne, a, b),
                IntCC::SignedLessThan => (BranchKind::Lt, a, b),
                IntCC::SignedGreaterThanOrEqual => (BranchKind::Ge, a, b),
                IntCC::SignedGreaterThan => (BranchKind::Lt, b, a),
                IntCC::SignedLessThanOrEqual => (BranchKind::Ge, b, a),
                IntCC::UnsignedLessThan => (BranchKind::Ltu, a, b),
                IntCC::UnsignedGreaterThanOrEqual => (BranchKind::Geu, a, b),
                IntCC::UnsignedGreaterThan => (BranchKind::Ltu, b, a),
                IntCC::UnsignedLessThanOrEqual => (BranchKind::Geu, b, a),
            };
            return (kind, lhs, rhs);
        }
    }
    let v = put_extended_input(ctx, inst, 0, false);
    (BranchKind::Ne, v, zero_reg())
}

impl LowerBackend for Riscv64Backend {
    type M = Riscv64MachineDeps;

    fn lower(&self, ctx: Ctx, inst: IRInst) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Nop => {}

            Opcode::Iconst => {
                let value = match ctx.data(inst) {
                    &InstructionData::UnaryImm { imm, .. } => imm.bits() as u64,
                    _ => unreachable!(),
                };
                let rd = get_output_reg(ctx, inst, 0);
                for i in Inst::load_constant(rd, value) {
                    ctx.emit(i);
                }
            }

            Opcode::Iadd | Opcode::Isub => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_input_in_reg(ctx, inst, 0);
                let w = is_w_form(ty);
                if op == Opcode::Iadd {
                    if let Some(imm12) = input_as_imm12(ctx, inst, 1) {
                        ctx.emit(Inst::AluRRI {
                            op: if w { AluOpRRI::Addiw } else { AluOpRRI::Addi },
                            rd,
                            rs1,
                            imm12,
                        });
                        return Ok(());
                    }
                }
                let rs2 = put_input_in_reg(ctx, inst, 1);
                let alu_op = match (op, w) {
                    (Opcode::Iadd, false) => AluOpRRR::Add,
                    (Opcode::Iadd, true) => AluOpRRR::Addw,
                    (Opcode::Isub, false) => AluOpRRR::Sub,
                    (Opcode::Isub, true) => AluOpRRR::Subw,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::AluRRR { op: alu_op, rd, rs1, rs2 });
            }

            Opcode::Ineg => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rs2 = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::AluRRR {
                    op: if is_w_form(ty) {
                        AluOpRRR::Subw
                    } else {
                        AluOpRRR::Sub
                    },
                    rd,
                    rs1: zero_reg(),
                    rs2,
                });
            }

            Opcode::Imul => {
                let ty = ctx.output_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_input_in_reg(ctx, inst, 0);
                let rs2 = put_input_in_reg(ctx, inst, 1);
                ctx.emit(Inst::AluRRR {
                    op: if is_w_form(ty) {
                        AluOpRRR::Mulw
                    } else {
                        AluOpRRR::Mul
                    },
                    rd,
                    rs1,
                    rs2,
                });
            }

            Opcode::Umulhi | Opcode::Smulhi => {
                let ty = ctx.output_ty(inst, 0);
                if ty != types::I64 {
                    return Err(ctx.lowering_error(inst));
                }
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_input_in_reg(ctx, inst, 0);
                let rs2 = put_input_in_reg(ctx, inst, 1);
                ctx.emit(Inst::AluRRR {
                    op: if op == Opcode::Smulhi {
                        AluOpRRR::Mulh
                    } else {
                        AluOpRRR::Mulhu
                    },
                    rd,
                    rs1,
                    rs2,
                });
            }

            Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                let ty = ctx.output_ty(inst, 0);
                let signed = matches!(op, Opcode::Sdiv | Opcode::Srem);
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_extended_input(ctx, inst, 0, signed);
                let rs2 = put_extended_input(ctx, inst, 1, signed);
                // RISC-V division does not trap on zero; the IR
                // semantics require it.
                ctx.emit(Inst::TrapIf {
                    kind: BranchKind::Eq,
                    rs1: rs2,
                    rs2: zero_reg(),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                let w = is_w_form(ty);
                let alu_op = match (op, w) {
                    (Opcode::Udiv, false) => AluOpRRR::Divu,
                    (Opcode::Udiv, true) => AluOpRRR::Divuw,
                    (Opcode::Sdiv, false) => AluOpRRR::Div,
                    (Opcode::Sdiv, true) => AluOpRRR::Divw,
                    (Opcode::Urem, false) => AluOpRRR::Remu,
                    (Opcode::Urem, true) => AluOpRRR::Remuw,
                    (Opcode::Srem, false) => AluOpRRR::Rem,
                    (Opcode::Srem, true) => AluOpRRR::Remw,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::AluRRR { op: alu_op, rd, rs1, rs2 });
            }

            Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_input_in_reg(ctx, inst, 0);
                if let Some(imm12) = input_as_imm12(ctx, inst, 1) {
                    let alu_op = match op {
                        Opcode::Band => AluOpRRI::Andi,
                        Opcode::Bor => AluOpRRI::Ori,
                        Opcode::Bxor => AluOpRRI::Xori,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::AluRRI { op: alu_op, rd, rs1, imm12 });
                } else {
                    let rs2 = put_input_in_reg(ctx, inst, 1);
                    let alu_op = match op {
                        Opcode::Band => AluOpRRR::And,
                        Opcode::Bor => AluOpRRR::Or,
                        Opcode::Bxor => AluOpRRR::Xor,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::AluRRR { op: alu_op, rd, rs1, rs2 });
                }
            }

            Opcode::Bnot => {
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::AluRRI {
                    op: AluOpRRI::Xori,
                    rd,
                    rs1,
                    imm12: -1,
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr => {
                let ty = ctx.output_ty(inst, 0);
                let bits = ty.bits();
                let rd = get_output_reg(ctx, inst, 0);
                let rs1 = if bits < 32 {
                    put_extended_input(ctx, inst, 0, op == Opcode::Sshr)
                } else {
                    put_input_in_reg(ctx, inst, 0)
                };
                let w = is_w_form(ty);
                if let Some(imm) = input_as_imm12(ctx, inst, 1) {
                    let amt = (imm as u32) & (bits - 1);
                    let alu_op = match op {
                        Opcode::Ishl => AluOpRRI::Slli,
                        Opcode::Ushr => AluOpRRI::Srli,
                        Opcode::Sshr => AluOpRRI::Srai,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::AluRRI {
                        op: alu_op,
                        rd,
                        rs1,
                        imm12: amt as i16,
                    });
                } else {
                    let raw = put_input_in_reg(ctx, inst, 1);
                    let rs2 = if bits < 64 {
                        // Mask the amount to the type width.
                        let masked = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                        ctx.emit(Inst::AluRRI {
                            op: AluOpRRI::Andi,
                            rd: masked,
                            rs1: raw,
                            imm12: (bits - 1) as i16,
                        });
                        masked.to_reg()
                    } else {
                        raw
                    };
                    let alu_op = match (op, w) {
                        (Opcode::Ishl, false) => AluOpRRR::Sll,
                        (Opcode::Ishl, true) => AluOpRRR::Sllw,
                        (Opcode::Ushr, false) => AluOpRRR::Srl,
                        (Opcode::Ushr, true) => AluOpRRR::Srlw,
                        (Opcode::Sshr, false) => AluOpRRR::Sra,
                        (Opcode::Sshr, true) => AluOpRRR::Sraw,
                        _ => unreachable!(),
                    };
                    ctx.emit(Inst::AluRRR { op: alu_op, rd, rs1, rs2 });
                }
            }

            Opcode::Icmp => {
                let rd = get_output_reg(ctx, inst, 0);
                lower_icmp_to_reg(ctx, inst, rd);
            }

            Opcode::Select => {
                // No conditional move in the base ISA: use a branchless
                // mask sequence. mask = (cond != 0) - 1 gives all-zeros
                // when true... instead compute:
                //   t = cond != 0 (0/1); mask = -t (all ones when true)
                //   rd = (a & mask) | (b & !mask)
                let rd = get_output_reg(ctx, inst, 0);
                let cond = put_extended_input(ctx, inst, 0, false);
                let a = put_input_in_reg(ctx, inst, 1);
                let b = put_input_in_reg(ctx, inst, 2);
                let t = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                let mask = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                ctx.emit(Inst::AluRRR {
                    op: AluOpRRR::Sltu,
                    rd: t,
                    rs1: zero_reg(),
                    rs2: cond,
                });
                ctx.emit(Inst::AluRRR {
                    op: AluOpRRR::Sub,
                    rd: mask,
                    rs1: zero_reg(),
                    rs2: t.to_reg(),
                });
                // rd = b ^ ((a ^ b) & mask).
                ctx.emit(Inst::AluRRR {
                    op: AluOpRRR::Xor,
                    rd: t,
                    rs1: a,
                    rs2: b,
                });
                ctx.emit(Inst::AluRRR {
                    op: AluOpRRR::And,
                    rd: t,
                    rs1: t.to_reg(),
                    rs2: mask.to_reg(),
                });
                ctx.emit(Inst::AluRRR {
                    op: AluOpRRR::Xor,
                    rd,
                    rs1: b,
                    rs2: t.to_reg(),
                });
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let rd = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                let widened =
                    extend_narrow(ctx, src, from_ty.bits() as u8, op == Opcode::Sextend);
                ctx.emit(Inst::AluRRI {
                    op: AluOpRRI::Addi,
                    rd,
                    rs1: widened,
                    imm12: 0,
                });
            }

            Opcode::Ireduce => {
                let rd = get_output_reg(ctx, inst, 0);
                let src = put_input_in_reg(ctx, inst, 0);
                ctx.emit(Inst::AluRRI {
                    op: AluOpRRI::Addi,
                    rd,
                    rs1: src,
                    imm12: 0,
                });
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
                let rd = get_output_reg(ctx, inst, 0);
                let mut base = put_input_in_reg(ctx, inst, 0);
                let offset = if (-2048..=2047).contains(&offset) {
                    offset as i16
                } else {
                    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    for i in Inst::load_constant(tmp, offset as i64 as u64) {
                        ctx.emit(i);
                    }
                    ctx.emit(Inst::AluRRR {
                        op: AluOpRRR::Add,
                        rd: tmp,
                        rs1: base,
                        rs2: tmp.to_reg(),
                    });
                    base = tmp.to_reg();
                    0
                };
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
                    rd,
                    base,
                    offset,
                });
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let offset: i32 = match ctx.data(inst) {
                    &InstructionData::Store { offset, .. } => offset.into(),
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let rs2 = put_input_in_reg(ctx, inst, 0);
                let mut base = put_input_in_reg(ctx, inst, 1);
                let offset = if (-2048..=2047).contains(&offset) {
                    offset as i16
                } else {
                    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    for i in Inst::load_constant(tmp, offset as i64 as u64) {
                        ctx.emit(i);
                    }
                    ctx.emit(Inst::AluRRR {
                        op: AluOpRRR::Add,
                        rd: tmp,
                        rs1: base,
                        rs2: tmp.to_reg(),
                    });
                    base = tmp.to_reg();
                    0
                };
                let bytes = match op {
                    Opcode::Store => val_ty.bytes().min(8) as u8,
                    Opcode::Istore8 => 1,
                    Opcode::Istore16 => 2,
                    Opcode::Istore32 => 4,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::Store {
                    bytes,
                    rs2,
                    base,
                    offset,
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
                let rs = put_input_in_reg(ctx, inst, 0);
                let off: i32 = offset.into();
                let store = ctx.abi().stackslot_store(slot, off as u32, rs, ty);
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

            Opcode::Trap => {
                let code = ctx.data(inst).trap_code().unwrap();
                ctx.emit(Inst::Ebreak { trap_code: code });
            }
            Opcode::Trapz | Opcode::Trapnz => {
                let code = ctx.data(inst).trap_code().unwrap();
                let v = put_extended_input(ctx, inst, 0, false);
                ctx.emit(Inst::TrapIf {
                    kind: if op == Opcode::Trapz {
                        BranchKind::Eq
                    } else {
                        BranchKind::Ne
                    },
                    rs1: v,
                    rs2: zero_reg(),
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
                let (kind, rs1, rs2) = lower_branch_cond(ctx, inst);
                ctx.emit(Inst::CondBr {
                    kind,
                    rs1,
                    rs2,
                    taken: targets[0],
                    not_taken: targets[1],
                });
                Ok(())
            }
            Opcode::BrTable => {
                let idx = put_extended_input(ctx, inst, 0, false);
                for (i, &target) in targets.iter().enumerate().skip(1) {
                    let tmp = ctx.alloc_tmp(types::I64).only_reg().unwrap();
                    for c in Inst::load_constant(tmp, (i - 1) as u64) {
                        ctx.emit(c);
                    }
                    // Branch to the entry on match; fall through to the
                    // next comparison otherwise.
                    ctx.emit(Inst::OneWayCondBr {
                        kind: BranchKind::Eq,
                        rs1: idx,
                        rs2: tmp.to_reg(),
                        taken: target,
                    });
                }
                ctx.emit(Inst::Jal { dest: targets[0] });
                Ok(())
            }
            _ => Err(ctx.lowering_error(inst)),
        }
    }
}
