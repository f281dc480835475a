//! x86-64 Instruction Set Architecture.

use crate::ir::{Function, LibCall, Opcode, Type};
use crate::ir::types;
use crate::isa::{CompiledCode, Features, TargetIsa};
use crate::legalizer::Action;
use crate::machinst::compile::compile_function;
use crate::regalloc::MachineEnv;
use crate::result::CodegenResult;
use crate::settings::Flags;
use target_lexicon::Triple;

pub mod abi;
pub mod inst;
pub mod lower;

use self::lower::X64Backend as LowerRules;

/// An x64 backend.
pub struct X64Backend {
    triple: Triple,
    flags: Flags,
    features: Features,
    machine_env: MachineEnv,
}

impl X64Backend {
    /// Create a new x64 backend with the given (shared) flags.
    pub fn new_with_flags(triple: Triple, flags: Flags, features: Features) -> Self {
        Self {
            triple,
            flags,
            features,
            machine_env: inst::create_machine_env(),
        }
    }
}

impl TargetIsa for X64Backend {
    fn name(&self) -> &'static str {
        "x64"
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
        // The integer core is native; floating point and 128-bit
        // integers route through libcalls where the runtime library has
        // an entry point.
        if ctrl_type.is_float() || ctrl_type.is_vector() || ctrl_type == types::I128 {
            return match LibCall::for_inst(opcode, ctrl_type) {
                Some(lc) => Action::Libcall(lc),
                None => Action::Unsupported,
            };
        }
        match opcode {
            Opcode::Clz | Opcode::Ctz | Opcode::Umulhi | Opcode::Smulhi => Action::Unsupported,
            _ => Action::Legal,
        }
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
    Box::new(X64Backend::new_with_flags(triple, flags, features))
}
