//! Compile a function through the machine backend pipeline: lower,
//! allocate registers, verify the allocation, and emit.

use crate::isa::CompiledCode;
use crate::machinst::abi::Callee;
use crate::machinst::lower::{lower_function, LowerBackend};
use crate::regalloc::{
    run_backtracking, run_linear_scan, verify_allocation, Algorithm, MachineEnv,
};
use crate::result::{CodegenError, CodegenResult};
use crate::settings::{Flags, OptLevel};
use crate::ir::Function;

/// Compile the given (legalized, edge-split) function down to machine
/// code.
pub fn compile_function<B: LowerBackend>(
    func: &Function,
    backend: &B,
    env: &MachineEnv,
    flags: &Flags,
) -> CodegenResult<CompiledCode> {
    let abi = Callee::<B::M>::new(func)?;
    let vcode = lower_function(func, backend, abi)?;
    trace!("vcode:\n{}", vcode.pretty_print());

    let algorithm = match flags.opt_level() {
        OptLevel::None => Algorithm::LinearScan,
        OptLevel::Speed | OptLevel::SpeedAndSize => Algorithm::Backtracking,
    };
    let regalloc = match algorithm {
        Algorithm::LinearScan => run_linear_scan(&vcode, env)?,
        Algorithm::Backtracking => run_backtracking(&vcode, env)?,
    };

    verify_allocation(&vcode, &regalloc)?;

    let (buffer, frame_size) = vcode.emit(&regalloc)?;

    if buffer.total_size() > flags.code_size_limit() {
        return Err(CodegenError::CodeTooLarge {
            bytes: buffer.total_size() as usize,
        });
    }

    Ok(CompiledCode {
        code: buffer.data,
        relocs: buffer.relocs,
        traps: buffer.traps,
        frame_size,
    })
}
