//! Implementation of the standard x64 ABI (System V).
//!
//! Integer arguments in rdi, rsi, rdx, rcx, r8, r9; return value in rax
//! (and rdx for a second value). rbx and r12-r15 are callee-saved; rbp is
//! the frame pointer. The stack stays 16-byte aligned at calls.

use crate::ir::{AbiParam, ArgumentPurpose, Type};
use crate::ir::types;
use crate::isa::x64::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgsOrRets, CallDest, FrameLayout, SmallInstVec, StackAMode,
};
use crate::machinst::reg::{RealReg, Reg, RegClass, Writable};
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};

/// x64 ABI information shared between body and call sites.
pub struct X64MachineDeps;

const ARG_GPRS: [u8; 6] = [7, 6, 2, 1, 8, 9]; // rdi, rsi, rdx, rcx, r8, r9
const RET_GPRS: [u8; 2] = [0, 2]; // rax, rdx

impl ABIMachineSpec for X64MachineDeps {
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
            if ty.is_float() || ty.is_vector() {
                return Err(CodegenError::Unsupported(
                    "floating-point ABI values on x64".into(),
                ));
            }
            if ty == types::I128 {
                return Err(CodegenError::Unsupported("i128 ABI values on x64".into()));
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
        Inst::Load {
            bytes: ty.bytes().min(8) as u8,
            sign_extend: false,
            dst: into,
            addr: Amode::NominalSP(mem),
        }
    }

    fn gen_store_stack(mem: StackAMode, from: Reg, ty: Type) -> Inst {
        Inst::Store {
            bytes: ty.bytes().min(8) as u8,
            src: from,
            addr: Amode::NominalSP(mem),
        }
    }

    fn gen_stack_addr(mem: StackAMode, into: Writable<Reg>) -> Inst {
        Inst::LoadAddr {
            dst: into,
            addr: Amode::NominalSP(mem),
        }
    }

    fn gen_prologue(frame: &FrameLayout) -> SmallInstVec<Inst> {
        let mut insts: SmallInstVec<Inst> = smallvec![];
        if frame.setup_area_size == 0 {
            return insts;
        }
        // push rbp; mov rbp, rsp.
        insts.push(Inst::Push64 { src: rbp() });
        insts.push(Inst::MovRR {
            is64: true,
            dst: Writable::from_reg(rbp()),
            src: rsp(),
        });
        // sub rsp, frame_size.
        let size = frame.frame_size();
        if size > 0 {
            insts.push(Inst::AluRImm {
                op: AluOp::Sub,
                is64: true,
                dst: Writable::from_reg(rsp()),
                simm32: i32::try_from(size).expect("frame size fits in 31 bits"),
            });
        }
        // Save clobbered callee-saves above the fixed storage.
        let clobber_base = i64::from(
            frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size,
        );
        for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
            insts.push(Inst::Store {
                bytes: 8,
                src: Reg::Real(reg),
                addr: Amode::ImmReg {
                    simm32: (clobber_base + (i as i64) * 8) as i32,
                    base: rsp(),
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
        // rax, rcx, rdx, rsi, rdi, r8-r11.
        [0u8, 1, 2, 6, 7, 8, 9, 10, 11]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect()
    }

    fn callee_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        [3u8, 12, 13, 14, 15]
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
        insts.push(Inst::Load {
            bytes: 8,
            sign_extend: false,
            dst: Writable::from_reg(Reg::Real(reg)),
            addr: Amode::ImmReg {
                simm32: (clobber_base + (i as i64) * 8) as i32,
                base: rsp(),
            },
        });
    }
    let size = frame.frame_size();
    if size > 0 {
        insts.push(Inst::AluRImm {
            op: AluOp::Add,
            is64: true,
            dst: Writable::from_reg(rsp()),
            simm32: size as i32,
        });
    }
    insts.push(Inst::Pop64 {
        dst: Writable::from_reg(rbp()),
    });
    insts
}
