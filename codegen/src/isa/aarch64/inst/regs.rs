//! AArch64 ISA definitions: registers.

use crate::machinst::reg::{RealReg, Reg, RegClass, Writable};
use crate::regalloc::MachineEnv;

/// Get a reference to an X-register (integer register).
pub fn xreg(num: u8) -> Reg {
    assert!(num < 31);
    Reg::Real(RealReg::new(RegClass::Int, num))
}

/// Get a writable reference to an X-register.
pub fn writable_xreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(xreg(num))
}

/// Get a reference to a V-register (vector/FP register).
pub fn vreg(num: u8) -> Reg {
    assert!(num < 32);
    Reg::Real(RealReg::new(RegClass::Float, num))
}

/// Get a writable reference to a V-register.
pub fn writable_vreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(vreg(num))
}

/// Get a reference to the zero-register.
///
/// XZR and SP share hardware encoding 31; the encoders pick the right
/// meaning from the instruction form, so a single `Reg` suffices here.
pub fn zero_reg() -> Reg {
    Reg::Real(RealReg::new(RegClass::Int, 31))
}

/// Get a writable reference to the zero-register (this discards a
/// result).
pub fn writable_zero_reg() -> Writable<Reg> {
    Writable::from_reg(zero_reg())
}

/// Get a reference to the stack-pointer register.
pub fn stack_reg() -> Reg {
    Reg::Real(RealReg::new(RegClass::Int, 31))
}

/// Get a writable reference to the stack-pointer register.
pub fn writable_stack_reg() -> Writable<Reg> {
    Writable::from_reg(stack_reg())
}

/// Get a reference to the link register (x30).
pub fn link_reg() -> Reg {
    xreg(30)
}

/// Get a writable reference to the link register.
pub fn writable_link_reg() -> Writable<Reg> {
    Writable::from_reg(link_reg())
}

/// Get a reference to the frame pointer (x29).
pub fn fp_reg() -> Reg {
    xreg(29)
}

/// Get a writable reference to the frame pointer.
pub fn writable_fp_reg() -> Writable<Reg> {
    Writable::from_reg(fp_reg())
}

/// Get a reference to the first spill-temporary register (x16, aka IP0).
///
/// It is a linker-veneer scratch register in the AArch64 ABI, so it is
/// free for our use as long as it does not live across calls, which a
/// spill temporary never does.
pub fn spilltmp_reg() -> Reg {
    xreg(16)
}

/// Get a reference to the second spill-temporary register (x17, aka IP1).
pub fn tmp2_reg() -> Reg {
    xreg(17)
}

/// Create the allocatable-register environment for AArch64.
///
/// Excluded from allocation: x16/x17 (spill temporaries), x18 (platform
/// register), x29 (FP), x30 (LR), x31 (SP/ZR), and v30/v31 (float spill
/// temporaries).
pub fn create_machine_env() -> MachineEnv {
    let mut int_regs = vec![];
    // Caller-saved x0..x15 first (argument and scratch registers), then
    // callee-saved x19..x28.
    for i in 0..16u8 {
        int_regs.push(RealReg::new(RegClass::Int, i));
    }
    for i in 19..29u8 {
        int_regs.push(RealReg::new(RegClass::Int, i));
    }

    let mut float_regs = vec![];
    // v0..v7 args, v16..v29 scratch are caller-saved; v8..v15 (low 64
    // bits) are callee-saved, listed last.
    for i in 0..8u8 {
        float_regs.push(RealReg::new(RegClass::Float, i));
    }
    for i in 16..30u8 {
        float_regs.push(RealReg::new(RegClass::Float, i));
    }
    for i in 8..16u8 {
        float_regs.push(RealReg::new(RegClass::Float, i));
    }

    let callee_saved = (19..29u8)
        .map(|i| RealReg::new(RegClass::Int, i))
        .chain((8..16u8).map(|i| RealReg::new(RegClass::Float, i)))
        .collect();

    MachineEnv {
        int_regs,
        float_regs,
        callee_saved,
        spilltmps: [
            [
                RealReg::new(RegClass::Int, 16),
                RealReg::new(RegClass::Int, 17),
            ],
            [
                RealReg::new(RegClass::Float, 30),
                RealReg::new(RegClass::Float, 31),
            ],
        ],
    }
}
