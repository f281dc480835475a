//! Implementation of the standard RISC-V 64 ABI (LP64).
//!
//! Integer arguments in a0-a7 (x10-x17), return values in a0/a1. s1-s11
//! are callee-saved; x8 (s0) is the frame pointer, x1 (ra) the return
//! address. SP stays 16-byte aligned.

use crate::ir::{AbiParam, ArgumentPurpose, Type};
use crate::ir::types;
use crate::isa::riscv64::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgsOrRets, CallDest, FrameLayout, SmallInstVec, StackAMode,
};
use crate::machinst::reg::{RealReg, Reg, RegClass, Writable};
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};

/// riscv64 ABI information shared between body and call sites.
pub struct Riscv64MachineDeps;

const ARG_GPRS: [u8; 8] = [10, 11, 12, 13, 14, 15, 16, 17];
const RET_GPRS: [u8; 2] = [10, 11];

impl ABIMachineSpec for Riscv64MachineDeps {
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
        let mut next_gpr = 0;
        let mut next_stack: u32 = 0;
        let mut args = Vec::with_capacity(params.len());
        let mut stack_ret_arg = None;

        let reg_list: &[u8] = match args_or_rets {
            ArgsOrRets::Args => &ARG_GPRS,
            ArgsOrRets::Rets => &RET_GPRS,
        };

        for (i, param) in params.iter().enumerate() {
            let ty = param.value_type;
            if ty.is_float() || ty.is_vector() || ty == types::I128 {
                return Err(CodegenError::Unsupported(
                    "non-integer ABI values on riscv64".into(),
                ));
            }
            if param.purpose == ArgumentPurpose::StructReturn {
                debug_assert_eq!(args_or_rets, ArgsOrRets::Args);
                stack_ret_arg = Some(i);
            }
            if next_gpr < reg_list.len() {
                let reg = RealReg::new(RegClass::Int, reg_list[next_gpr]);
                next_gpr += 1;
                args.push(ABIArg::reg(reg, ty, param.purpose));
            } else {
                if args_or_rets == ArgsOrRets::Rets {
                    return Err(CodegenError::Unsupported(
                        "too many return values; use an sret pointer".into(),
                    ));
                }
                let size = ty.bytes().max(8);
                args.push(ABIArg::stack(i64::from(next_stack), ty, param.purpose));
                next_stack += size;
            }
        }

        Ok((args, (next_stack + 15) & !15, stack_ret_arg))
    }

    fn gen_load_stack(mem: StackAMode, into: Writable<Reg>, ty: Type) -> Inst {
        Inst::LoadStack {
            bytes: ty.bytes().min(8) as u8,
            rd: into,
            mem,
        }
    }

    fn gen_store_stack(mem: StackAMode, from: Reg, ty: Type) -> Inst {
        Inst::StoreStack {
            bytes: ty.bytes().min(8) as u8,
            rs2: from,
            mem,
        }
    }

    fn gen_stack_addr(mem: StackAMode, into: Writable<Reg>) -> Inst {
        Inst::StackAddr { rd: into, mem }
    }

    fn gen_prologue(frame: &FrameLayout) -> SmallInstVec<Inst> {
        let mut insts: SmallInstVec<Inst> = smallvec![];
        if frame.setup_area_size == 0 {
            return insts;
        }
        // addi sp, sp, -16 ; sd ra, 8(sp) ; sd fp, 0(sp) ; mv fp, sp.
        insts.push(Inst::AluRRI {
            op: AluOpRRI::Addi,
            rd: Writable::from_reg(stack_reg()),
            rs1: stack_reg(),
            imm12: -16,
        });
        insts.push(Inst::Store {
            bytes: 8,
            rs2: link_reg(),
            base: stack_reg(),
            offset: 8,
        });
        insts.push(Inst::Store {
            bytes: 8,
            rs2: fp_reg(),
            base: stack_reg(),
            offset: 0,
        });
        insts.push(Inst::AluRRI {
            op: AluOpRRI::Addi,
            rd: Writable::from_reg(fp_reg()),
            rs1: stack_reg(),
            imm12: 0,
        });

        // Drop SP by the frame size.
        let size = frame.frame_size();
        insts.extend(gen_sp_adjust(-(i64::from(size))));

        // Save clobbered callee-saves.
        let clobber_base = i64::from(
            frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size,
        );
        for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
            let offset = clobber_base + (i as i64) * 8;
            insts.push(Inst::StoreStack {
                bytes: 8,
                rs2: Reg::Real(reg),
                mem: StackAMode::OutgoingArg(offset),
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
        let (name, reg) = match dest {
            CallDest::ExtName(name) => (Some(name), None),
            CallDest::Reg(reg) => (None, Some(reg)),
        };
        Inst::Call {
            info: Box::new(CallInfo {
                dest: name,
                reg,
                uses,
                defs,
                clobbers,
            }),
        }
    }

    fn gen_tail_call(dest: CallDest, uses: SmallVec<[RealReg; 8]>) -> Inst {
        match dest {
            CallDest::ExtName(name) => Inst::TailCall { dest: name, uses },
            CallDest::Reg(_) => unimplemented!("indirect tail calls"),
        }
    }

    fn caller_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        // a0-a7 and t0-t6.
        [10u8, 11, 12, 13, 14, 15, 16, 17, 5, 6, 7, 28, 29, 30, 31]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect()
    }

    fn callee_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        [9u8, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect()
    }
}

/// Frame teardown without the return, shared with tail calls.
pub fn gen_epilogue_frame_restore(frame: &FrameLayout) -> SmallInstVec<Inst> {
    let mut insts: SmallInstVec<Inst> = smallvec![];
    if frame.setup_area_size == 0 {
        return insts;
    }
    let clobber_base = i64::from(
        frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size,
    );
    for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
        let offset = clobber_base + (i as i64) * 8;
        insts.push(Inst::LoadStack {
            bytes: 8,
            rd: Writable::from_reg(Reg::Real(reg)),
            mem: StackAMode::OutgoingArg(offset),
        });
    }
    insts.extend(gen_sp_adjust(i64::from(frame.frame_size())));
    // ld ra, 8(sp) ; ld fp, 0(sp) ; addi sp, sp, 16.
    insts.push(Inst::Load {
        bytes: 8,
        sign_extend: true,
        rd: Writable::from_reg(link_reg()),
        base: stack_reg(),
        offset: 8,
    });
    insts.push(Inst::Load {
        bytes: 8,
        sign_extend: true,
        rd: Writable::from_reg(fp_reg()),
        base: stack_reg(),
        offset: 0,
    });
    insts.push(Inst::AluRRI {
        op: AluOpRRI::Addi,
        rd: Writable::from_reg(stack_reg()),
        rs1: stack_reg(),
        imm12: 16,
    });
    insts
}

/// Adjust SP by a signed amount, chunked into the 12-bit immediate.
fn gen_sp_adjust(mut amount: i64) -> SmallInstVec<Inst> {
    let mut insts: SmallInstVec<Inst> = smallvec![];
    while amount != 0 {
        let step = amount.clamp(-2048, 2047);
        insts.push(Inst::AluRRI {
            op: AluOpRRI::Addi,
            rd: Writable::from_reg(stack_reg()),
            rs1: stack_reg(),
            imm12: step as i16,
        });
        amount -= step;
    }
    insts
}
