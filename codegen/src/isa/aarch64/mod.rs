//! ARM 64-bit Instruction Set Architecture.

use crate::ir::{Function, Opcode, Type};
use crate::ir::types;
use crate::ir::LibCall;
use crate::isa::{CompiledCode, Features, IsaBuilder, TargetIsa};
use crate::legalizer::Action;
use crate::machinst::compile::compile_function;
use crate::regalloc::MachineEnv;
use crate::result::CodegenResult;
use crate::settings::Flags;
use target_lexicon::Triple;

pub mod abi;
pub mod inst;
pub mod lower;

use self::lower::AArch64Backend as LowerRules;

/// An AArch64 backend.
pub struct AArch64Backend {
    triple: Triple,
    flags: Flags,
    features: Features,
    machine_env: MachineEnv,
}

impl AArch64Backend {
    /// Create a new AArch64 backend with the given (shared) flags.
    pub fn new_with_flags(triple: Triple, flags: Flags, features: Features) -> Self {
        Self {
            triple,
            flags,
            features,
            machine_env: inst::create_machine_env(),
        }
    }
}

impl TargetIsa for AArch64Backend {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn flags(&self) -> &Flags {
        &self.flags
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn legalize_action(&self, opcode: Opcode, ctrl_type: Type) -> Action {
        // Wide-integer division has no instruction; everything else on
        // the i128 path is handled as register pairs by the lowering
        // rules.
        if ctrl_type == types::I128 {
            return match opcode {
                Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                    match LibCall::for_inst(opcode, ctrl_type) {
                        Some(lc) => Action::Libcall(lc),
                        None => Action::Unsupported,
                    }
                }
                Opcode::Iconst
                | Opcode::Iadd
                | Opcode::Isub
                | Opcode::Imul
                | Opcode::Band
                | Opcode::Bor
                | Opcode::Bxor => Action::Legal,
                _ => Action::Unsupported,
            };
        }
        // Vector lowering covers the three-same ALU families, splat,
        // constants and memory; everything else is rejected rather than
        // scalarized.
        if ctrl_type.is_vector() {
            return match opcode {
                Opcode::Iadd
                | Opcode::Isub
                | Opcode::Imul
                | Opcode::Band
                | Opcode::Bor
                | Opcode::Bxor
                | Opcode::Fadd
                | Opcode::Fsub
                | Opcode::Fmul
                | Opcode::Fdiv
                | Opcode::Vconst
                | Opcode::Splat
                | Opcode::Bitcast
                | Opcode::Load
                | Opcode::Store
                | Opcode::StackLoad
                | Opcode::StackStore => Action::Legal,
                _ => Action::Unsupported,
            };
        }
        // Sub-native float formats promote (f16) or go to soft-float
        // libcalls (f128).
        if ctrl_type == types::F16 {
            return match opcode {
                Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => Action::Expand,
                _ => Action::Unsupported,
            };
        }
        if ctrl_type == types::F128 {
            return match LibCall::for_inst(opcode, ctrl_type) {
                Some(lc) => Action::Libcall(lc),
                None => Action::Unsupported,
            };
        }
        Action::Legal
    }

    fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode> {
        compile_function(func, &LowerRules, &self.machine_env, &self.flags)
    }
}

/// Create an ISA from the given triple, flags and features.
pub fn isa_constructor(
    triple: Triple,
    flags: Flags,
    features: Features,
) -> Box<dyn TargetIsa> {
    Box::new(AArch64Backend::new_with_flags(triple, flags, features))
}

/// Look up the builder for tests that want a known-good configuration.
pub fn isa_builder(triple: Triple) -> IsaBuilder {
    crate::isa::lookup(triple).expect("aarch64 support is compiled in")
}
