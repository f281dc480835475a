//! IBM z/Architecture (s390x) Instruction Set Architecture.

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

use self::lower::S390xBackend as LowerRules;

/// An s390x backend.
pub struct S390xBackend {
    triple: Triple,
    flags: Flags,
    features: Features,
    machine_env: MachineEnv,
}

impl S390xBackend {
    /// Create a new s390x backend with the given (shared) flags.
    pub fn new_with_flags(triple: Triple, flags: Flags, features: Features) -> Self {
        Self {
            triple,
            flags,
            features,
            machine_env: inst::create_machine_env(),
        }
    }
}

impl TargetIsa for S390xBackend {
    fn name(&self) -> &'static str {
        "s390x"
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
    Box::new(S390xBackend::new_with_flags(triple, flags, features))
}
