//! Result and error types representing the outcome of compiling a function.

use crate::ir::{Inst, Opcode, Type};
use crate::verifier::VerifierErrors;
use std::fmt;

/// A compilation error.
///
/// When a function fails to compile, the compilation is aborted, the state
/// for the function is dropped, and one of these is returned.
#[derive(Debug)]
pub enum CodegenError {
    /// A list of IR verifier errors.
    ///
    /// This always represents a bug, either in the code that generated IR
    /// for this compiler, or a bug in the compiler itself.
    Verifier(VerifierErrors),

    /// The legalizer found no rule mapping an (opcode, type) pair onto this
    /// target.
    Legalize {
        /// The opcode with no legalization rule.
        opcode: Opcode,
        /// The controlling type of the offending instruction.
        ty: Type,
    },

    /// No lowering rule matched a legal instruction. This is a backend bug.
    Lowering {
        /// The instruction that could not be lowered.
        inst: Inst,
        /// The instruction's opcode.
        opcode: Opcode,
    },

    /// The register allocator was handed an unsatisfiable constraint set.
    ///
    /// This should never happen for legal input; it implies a backend bug.
    Regalloc(RegAllocErrorKind),

    /// An instruction could not be encoded into machine code.
    Encoding(EncodingError),

    /// The code size for the function is too large.
    CodeTooLarge {
        /// Size of the buffer at the point the limit was exceeded.
        bytes: usize,
    },

    /// A feature the compilation requires is not supported on this target.
    Unsupported(String),
}

/// Ways in which register allocation can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegAllocErrorKind {
    /// Two operands of one instruction demand the same physical register
    /// for different virtual registers.
    ConflictingFixedConstraints,
    /// Every register of the needed class is pinned at this program point.
    OutOfRegisters,
    /// The post-allocation checker found an inconsistency.
    CheckerFailed,
}

/// Ways in which instruction encoding can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingError {
    /// A value was used as a logical-instruction immediate but has no
    /// encoding in the target's immediate format.
    UnsupportedLogicalImmediate,
    /// A branch target is out of range and no veneer form exists.
    BranchOutOfRange,
    /// A constant-pool reference could not be placed within range.
    ConstantPoolOutOfRange,
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error type.
pub type CodegenResult<T> = Result<T, CodegenError>;

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Verifier(errors) => write!(f, "Verifier errors: {}", errors),
            Self::Legalize { opcode, ty } => {
                write!(f, "No legalization for {} with type {}", opcode, ty)
            }
            Self::Lowering { inst, opcode } => {
                write!(f, "No lowering rule matched {} ({})", inst, opcode)
            }
            Self::Regalloc(kind) => write!(f, "Register allocation failed: {:?}", kind),
            Self::Encoding(kind) => write!(f, "Encoding failed: {:?}", kind),
            Self::CodeTooLarge { bytes } => {
                write!(f, "Code for function is too large ({} bytes)", bytes)
            }
            Self::Unsupported(feature) => write!(f, "Unsupported feature: {}", feature),
        }
    }
}

impl std::error::Error for CodegenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Verifier(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<VerifierErrors> for CodegenError {
    fn from(errors: VerifierErrors) -> Self {
        Self::Verifier(errors)
    }
}
