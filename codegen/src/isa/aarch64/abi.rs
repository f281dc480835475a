//! Implementation of a standard AArch64 ABI (AAPCS64).
//!
//! Arguments are passed in x0-x7 and v0-v7, then on the stack. A large
//! aggregate return goes through a pointer in x8 (the explicit
//! struct-return parameter). x19-x28 and the low halves of v8-v15 are
//! callee-saved. SP stays 16-byte aligned.
//!
//! The frame, from high to low addresses: incoming args, the FP/LR pair
//! (FP points just above), saved callee-saves, explicit stack slots,
//! spill slots, outgoing call arguments.

use crate::ir::{AbiParam, ArgumentPurpose, Type};
use crate::ir::types;
use crate::isa::aarch64::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIArgSlot, ABIMachineSpec, ArgsOrRets, CallDest, FrameLayout, SmallInstVec,
    StackAMode,
};
use crate::machinst::reg::{RealReg, Reg, RegClass, Writable};
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};

/// Support for the AArch64 ABI from the callee side (within a function
/// body) and the caller side (at a callsite).
pub struct AArch64MachineDeps;

const MAX_REG_ARGS: u8 = 8;

impl ABIMachineSpec for AArch64MachineDeps {
    type I = Inst;

    fn word_bits() -> u32 {
        64
    }

    fn stack_align() -> u32 {
        16
    }

    fn compute_arg_locs(
        _call_conv: CallConv,
        params: &[AbiParam],
        args_or_rets: ArgsOrRets,
    ) -> CodegenResult<(Vec<ABIArg>, u32, Option<usize>)> {
        let mut next_xreg: u8 = 0;
        let mut next_vreg: u8 = 0;
        let mut next_stack: u32 = 0;
        let mut args = Vec::with_capacity(params.len());
        let mut stack_ret_arg = None;

        for (i, param) in params.iter().enumerate() {
            let ty = param.value_type;

            if param.purpose == ArgumentPurpose::StructReturn {
                debug_assert_eq!(args_or_rets, ArgsOrRets::Args);
                // The indirect-result register.
                args.push(ABIArg::reg(
                    RealReg::new(RegClass::Int, 8),
                    types::I64,
                    param.purpose,
                ));
                stack_ret_arg = Some(i);
                continue;
            }

            if ty == types::I128 {
                // A 128-bit integer takes an even-aligned register pair.
                if next_xreg % 2 != 0 {
                    next_xreg += 1;
                }
                if next_xreg + 1 < MAX_REG_ARGS {
                    let lo = RealReg::new(RegClass::Int, next_xreg);
                    let hi = RealReg::new(RegClass::Int, next_xreg + 1);
                    next_xreg += 2;
                    args.push(ABIArg {
                        slots: smallvec![
                            ABIArgSlot::Reg {
                                reg: lo,
                                ty: types::I64
                            },
                            ABIArgSlot::Reg {
                                reg: hi,
                                ty: types::I64
                            },
                        ],
                        purpose: param.purpose,
                    });
                } else {
                    if args_or_rets == ArgsOrRets::Rets {
                        return Err(CodegenError::Unsupported(
                            "too many return values; use an sret pointer".into(),
                        ));
                    }
                    next_stack = align_to(next_stack, 16);
                    args.push(ABIArg {
                        slots: smallvec![
                            ABIArgSlot::Stack {
                                offset: i64::from(next_stack),
                                ty: types::I64
                            },
                            ABIArgSlot::Stack {
                                offset: i64::from(next_stack) + 8,
                                ty: types::I64
                            },
                        ],
                        purpose: param.purpose,
                    });
                    next_stack += 16;
                }
                continue;
            }

            let is_fp = ty.is_float() || ty.is_vector();
            let next_reg = if is_fp { &mut next_vreg } else { &mut next_xreg };
            if *next_reg < MAX_REG_ARGS {
                let class = if is_fp { RegClass::Float } else { RegClass::Int };
                let reg = RealReg::new(class, *next_reg);
                *next_reg += 1;
                args.push(ABIArg::reg(reg, ty, param.purpose));
            } else {
                if args_or_rets == ArgsOrRets::Rets {
                    return Err(CodegenError::Unsupported(
                        "too many return values; use an sret pointer".into(),
                    ));
                }
                let size = ty.bytes().max(8);
                next_stack = align_to(next_stack, size);
                args.push(ABIArg::stack(
                    i64::from(next_stack),
                    ty,
                    param.purpose,
                ));
                next_stack += size;
            }
        }

        Ok((args, align_to(next_stack, 16), stack_ret_arg))
    }

    fn gen_load_stack(mem: StackAMode, into: Writable<Reg>, ty: Type) -> Inst {
        Inst::gen_load(into, AMode::NominalSP(mem), ty)
    }

    fn gen_store_stack(mem: StackAMode, from: Reg, ty: Type) -> Inst {
        Inst::gen_store(from, AMode::NominalSP(mem), ty)
    }

    fn gen_stack_addr(mem: StackAMode, into: Writable<Reg>) -> Inst {
        Inst::LoadAddr {
            rd: into,
            mem: AMode::NominalSP(mem),
        }
    }

    fn gen_prologue(frame: &FrameLayout) -> SmallInstVec<Inst> {
        let mut insts: SmallInstVec<Inst> = smallvec![];

        // A frameless leaf needs no setup at all.
        if frame.setup_area_size == 0 {
            return insts;
        }

        // stp fp, lr, [sp, #-16]!
        insts.push(Inst::StoreP64 {
            rt: fp_reg(),
            rt2: link_reg(),
            mem: PairAMode::PreIndexed(
                stack_reg(),
                SImm7Scaled::maybe_from_i64(-16, 8).unwrap(),
            ),
        });
        // mov fp, sp
        insts.push(Inst::MovToFromSp {
            rd: writable_fp_reg(),
            rm: stack_reg(),
        });

        // sub sp, sp, #frame_size
        insts.extend(gen_sp_adjust(-(i64::from(frame.frame_size()))));

        // Save clobbered callee-saves above the fixed-storage area.
        let clobber_base =
            i64::from(frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size);
        for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
            let offset = clobber_base + (i as i64) * 8;
            let mem = AMode::reg_offset(stack_reg(), offset);
            insts.push(match reg.class() {
                RegClass::Int => Inst::Store64 {
                    rd: Reg::Real(reg),
                    mem,
                },
                RegClass::Float => Inst::FpuStore64 {
                    rd: Reg::Real(reg),
                    mem,
                },
            });
        }

        insts
    }

    fn gen_epilogue(frame: &FrameLayout) -> SmallInstVec<Inst> {
        let mut insts = gen_epilogue_frame_restore(frame);
        insts.push(Inst::EpilogueRet);
        insts
    }

    fn gen_call(
        dest: CallDest,
        uses: SmallVec<[RealReg; 8]>,
        defs: SmallVec<[RealReg; 8]>,
        clobbers: SmallVec<[RealReg; 8]>,
    ) -> Inst {
        match dest {
            CallDest::ExtName(name) => Inst::Call {
                info: Box::new(CallInfo {
                    dest: name,
                    uses,
                    defs,
                    clobbers,
                }),
            },
            CallDest::Reg(reg) => Inst::CallInd {
                info: Box::new(CallIndInfo {
                    rn: reg,
                    uses,
                    defs,
                    clobbers,
                }),
            },
        }
    }

    fn gen_tail_call(dest: CallDest, uses: SmallVec<[RealReg; 8]>) -> Inst {
        match dest {
            CallDest::ExtName(name) => Inst::TailCall {
                info: Box::new(TailCallInfo { dest: name, uses }),
            },
            CallDest::Reg(_) => unimplemented!("indirect tail calls"),
        }
    }

    fn caller_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        let mut regs: SmallVec<[RealReg; 8]> = smallvec![];
        for i in 0..16u8 {
            regs.push(RealReg::new(RegClass::Int, i));
        }
        for i in 0..8u8 {
            regs.push(RealReg::new(RegClass::Float, i));
        }
        for i in 16..32u8 {
            regs.push(RealReg::new(RegClass::Float, i));
        }
        regs
    }

    fn callee_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        let mut regs: SmallVec<[RealReg; 8]> = smallvec![];
        for i in 19..29u8 {
            regs.push(RealReg::new(RegClass::Int, i));
        }
        for i in 8..16u8 {
            regs.push(RealReg::new(RegClass::Float, i));
        }
        regs
    }
}

/// Restore the frame without returning: shared by the epilogue and tail
/// calls.
pub fn gen_epilogue_frame_restore(frame: &FrameLayout) -> SmallInstVec<Inst> {
    let mut insts: SmallInstVec<Inst> = smallvec![];
    if frame.setup_area_size == 0 {
        return insts;
    }

    // Reload clobbered callee-saves.
    let clobber_base = i64::from(
        frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size,
    );
    for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
        let offset = clobber_base + (i as i64) * 8;
        let mem = AMode::reg_offset(stack_reg(), offset);
        insts.push(match reg.class() {
            RegClass::Int => Inst::ULoad64 {
                rd: Writable::from_reg(Reg::Real(reg)),
                mem,
            },
            RegClass::Float => Inst::FpuLoad64 {
                rd: Writable::from_reg(Reg::Real(reg)),
                mem,
            },
        });
    }

    // add sp, sp, #frame_size
    insts.extend(gen_sp_adjust(i64::from(frame.frame_size())));

    // ldp fp, lr, [sp], #16
    insts.push(Inst::LoadP64 {
        rt: writable_fp_reg(),
        rt2: writable_link_reg(),
        mem: PairAMode::PostIndexed(
            stack_reg(),
            SImm7Scaled::maybe_from_i64(16, 8).unwrap(),
        ),
    });

    insts
}

/// Adjust SP by a signed amount using one or two immediate forms.
fn gen_sp_adjust(amount: i64) -> SmallInstVec<Inst> {
    let mut insts: SmallInstVec<Inst> = smallvec![];
    if amount == 0 {
        return insts;
    }
    let (alu_op, magnitude) = if amount > 0 {
        (ALUOp::Add, amount as u64)
    } else {
        (ALUOp::Sub, (-amount) as u64)
    };
    assert!(magnitude < (1 << 24), "frame too large");
    let low = magnitude & 0xfff;
    let high = magnitude & 0xfff_000;
    for part in [low, high] {
        if part != 0 {
            insts.push(Inst::AluRRImm12 {
                alu_op,
                size: OperandSize::Size64,
                rd: writable_stack_reg(),
                rn: stack_reg(),
                imm12: Imm12::maybe_from_u64(part).unwrap(),
            });
        }
    }
    insts
}

fn align_to(x: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}
