//! Implementation of the standard s390x ABI (ELF).
//!
//! Integer arguments in r2-r6, return value in r2. r6-r13 and r15 are
//! callee-saved; r14 holds the return address. The caller provides a
//! 160-byte register save area at the bottom of its frame; r14/r15 are
//! saved into the caller's area at fixed offsets, and the prologue
//! allocates a fresh save area below this function's own frame.

use crate::ir::{AbiParam, ArgumentPurpose, Type};
use crate::ir::types;
use crate::isa::s390x::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgsOrRets, CallDest, FrameLayout, SmallInstVec, StackAMode,
};
use crate::machinst::reg::{RealReg, Reg, RegClass, Writable};
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};

/// s390x ABI information shared between body and call sites.
pub struct S390xMachineDeps;

const ARG_GPRS: [u8; 5] = [2, 3, 4, 5, 6];
const RET_GPRS: [u8; 2] = [2, 3];

impl ABIMachineSpec for S390xMachineDeps {
    type I = Inst;

    fn word_bits() -> u32 {
        64
    }

    fn stack_align() -> u32 {
        8
    }

    fn setup_area_size() -> u32 {
        160
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
                    "non-integer ABI values on s390x".into(),
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

        Ok((args, (next_stack + 7) & !7, stack_ret_arg))
    }

    fn gen_load_stack(mem: StackAMode, into: Writable<Reg>, ty: Type) -> Inst {
        Inst::LoadStack {
            bytes: ty.bytes().min(8) as u8,
            dst: into,
            mem,
        }
    }

    fn gen_store_stack(mem: StackAMode, from: Reg, ty: Type) -> Inst {
        Inst::StoreStack {
            bytes: ty.bytes().min(8) as u8,
            src: from,
            mem,
        }
    }

    fn gen_stack_addr(mem: StackAMode, into: Writable<Reg>) -> Inst {
        Inst::StackAddr { dst: into, mem }
    }

    fn gen_prologue(frame: &FrameLayout) -> SmallInstVec<Inst> {
        let mut insts: SmallInstVec<Inst> = smallvec![];
        if frame.setup_area_size == 0 {
            return insts;
        }
        // stmg %r14, %r15, 112(%r15): save return address and SP in the
        // caller's register save area.
        insts.push(Inst::Stmg {
            from: link_reg(),
            to: stack_reg(),
            base: stack_reg(),
            disp: 112,
        });
        // aghi %r15, -(frame + save area).
        let total = frame.frame_size() + 160;
        insts.extend(gen_sp_adjust(-(i64::from(total))));

        // Save clobbered callee-saves into the frame.
        let clobber_base = i64::from(
            frame.outgoing_args_size + frame.spillslots_size + frame.fixed_frame_storage_size,
        );
        for (i, &reg) in frame.clobbered_callee_saves.iter().enumerate() {
            insts.push(Inst::StoreStack {
                bytes: 8,
                src: Reg::Real(reg),
                mem: StackAMode::OutgoingArg(clobber_base + (i as i64) * 8),
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
        [0u8, 1, 2, 3, 4, 5, 14]
            .iter()
            .map(|&e| RealReg::new(RegClass::Int, e))
            .collect()
    }

    fn callee_saved_regs(_call_conv: CallConv) -> SmallVec<[RealReg; 8]> {
        [6u8, 7, 8, 9, 10, 11, 12, 13]
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
        insts.push(Inst::LoadStack {
            bytes: 8,
            dst: Writable::from_reg(Reg::Real(reg)),
            mem: StackAMode::OutgoingArg(clobber_base + (i as i64) * 8),
        });
    }
    let total = frame.frame_size() + 160;
    insts.extend(gen_sp_adjust(i64::from(total)));
    // lmg %r14, %r15, 112(%r15).
    insts.push(Inst::Lmg {
        from: Writable::from_reg(link_reg()),
        to: Writable::from_reg(stack_reg()),
        base: stack_reg(),
        disp: 112,
    });
    insts
}

/// Adjust SP by a signed amount, chunked into AGHI's 16-bit immediate.
fn gen_sp_adjust(mut amount: i64) -> SmallInstVec<Inst> {
    let mut insts: SmallInstVec<Inst> = smallvec![];
    while amount != 0 {
        let step = amount.clamp(-32768, 32767);
        insts.push(Inst::AddImm16 {
            dst: Writable::from_reg(stack_reg()),
            imm: step as i16,
        });
        amount -= step;
    }
    insts
}
