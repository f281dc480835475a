//! External function calls.
//!
//! To a function under compilation, all other functions are external. Calls
//! to them go through a `FuncRef` declared in the preamble, which bundles the
//! callee's name and signature.

use crate::ir::{LibCall, SigRef, Type};
use crate::isa::CallConv;
use core::fmt;

/// Function signature.
///
/// The function signature describes the types of formal parameters and
/// return values along with other details that are needed to call a function
/// correctly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// The arguments passed to the function.
    pub params: Vec<AbiParam>,
    /// Values returned from the function.
    pub returns: Vec<AbiParam>,
    /// Calling convention.
    pub call_conv: CallConv,
}

impl Signature {
    /// Create a new blank signature.
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            params: Vec::new(),
            returns: Vec::new(),
            call_conv,
        }
    }

    /// Find the index of a presumed unique special-purpose parameter.
    pub fn special_param_index(&self, purpose: ArgumentPurpose) -> Option<usize> {
        self.params.iter().rposition(|arg| arg.purpose == purpose)
    }

    /// Does this signature use a struct-return pointer parameter?
    pub fn uses_struct_return_param(&self) -> bool {
        self.special_param_index(ArgumentPurpose::StructReturn)
            .is_some()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        if !self.returns.is_empty() {
            write!(f, " -> ")?;
            for (i, r) in self.returns.iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", r)?;
            }
        }
        write!(f, " {}", self.call_conv)
    }
}

/// Function parameter or return value descriptor.
///
/// This describes the value type being passed to or from a function along
/// with flags that affect how the argument is passed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AbiParam {
    /// Type of the argument value.
    pub value_type: Type,
    /// Special purpose of argument, or `Normal`.
    pub purpose: ArgumentPurpose,
    /// Method for extending argument to a full register.
    pub extension: ArgumentExtension,
}

impl AbiParam {
    /// Create a parameter with default flags.
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            extension: ArgumentExtension::None,
            purpose: ArgumentPurpose::Normal,
        }
    }

    /// Create a special-purpose parameter that is not (yet) bound to a
    /// specific register.
    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            value_type,
            extension: ArgumentExtension::None,
            purpose,
        }
    }

    /// Convert `self` to a parameter with the `uext` flag set.
    pub fn uext(self) -> Self {
        debug_assert!(
            self.value_type.is_int(),
            "uext on {} arg",
            self.value_type
        );
        Self {
            extension: ArgumentExtension::Uext,
            ..self
        }
    }

    /// Convert `self` to a parameter with the `sext` flag set.
    pub fn sext(self) -> Self {
        debug_assert!(
            self.value_type.is_int(),
            "sext on {} arg",
            self.value_type
        );
        Self {
            extension: ArgumentExtension::Sext,
            ..self
        }
    }
}

impl fmt::Display for AbiParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value_type)?;
        match self.extension {
            ArgumentExtension::None => {}
            ArgumentExtension::Uext => write!(f, " uext")?,
            ArgumentExtension::Sext => write!(f, " sext")?,
        }
        if self.purpose != ArgumentPurpose::Normal {
            write!(f, " {}", self.purpose)?;
        }
        Ok(())
    }
}

/// Function argument extension options.
///
/// On some architectures, small integer function arguments are extended to
/// the width of a full register.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ArgumentExtension {
    /// No extension, high bits are indeterminate.
    None,
    /// Unsigned extension: high bits in register are 0.
    Uext,
    /// Signed extension: high bits in register replicate sign bit.
    Sext,
}

/// The special purpose of a function argument.
///
/// Function arguments and return values are used to pass user program values
/// between functions, but they are also used to represent special registers
/// with significance to the ABI.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ArgumentPurpose {
    /// A normal user program value passed to or from a function.
    Normal,

    /// A C struct passed as argument.
    StructArgument(u32),

    /// Struct return pointer.
    ///
    /// When a function needs to return more data than will fit in
    /// registers, the caller passes a pointer to a memory location where the
    /// return value can be written. In some ABIs, this struct return pointer
    /// is passed in a specific register.
    StructReturn,

    /// A stack limit pointer, checked by the prologue when probing is on.
    StackLimit,
}

impl fmt::Display for ArgumentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::StructArgument(size) => write!(f, "sarg({})", size),
            Self::StructReturn => f.write_str("sret"),
            Self::StackLimit => f.write_str("stack_limit"),
        }
    }
}

/// An external name in a user-defined symbol table.
///
/// The code generator doesn't interpret the contents: names are dense
/// (namespace, index) pairs handed back to the embedder through relocation
/// records, plus the well-known runtime library routines.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExternalName {
    /// A name in a user-defined symbol table.
    User {
        /// Arbitrary. E.g. the module a function comes from.
        namespace: u32,
        /// Arbitrary. E.g. the index of the function within its module.
        index: u32,
    },
    /// A well-known runtime library function.
    LibCall(LibCall),
}

impl ExternalName {
    /// Creates a new external name from a user namespace/index pair.
    pub fn user(namespace: u32, index: u32) -> Self {
        Self::User { namespace, index }
    }
}

impl Default for ExternalName {
    fn default() -> Self {
        Self::user(0, 0)
    }
}

impl fmt::Display for ExternalName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::User { namespace, index } => write!(f, "u{}:{}", namespace, index),
            Self::LibCall(lc) => write!(f, "%{}", lc),
        }
    }
}

/// An external function reference as stored in the function preamble.
#[derive(Clone, Debug, PartialEq, Hash)]
pub struct ExtFuncData {
    /// Name of the external function.
    pub name: ExternalName,
    /// Call signature of function.
    pub signature: SigRef,
    /// Will this function be defined nearby, such that it will always be a
    /// certain distance away, after linking? If so, calls can use a direct
    /// PC-relative form; otherwise an indirect sequence through a register.
    pub colocated: bool,
}

impl fmt::Display for ExtFuncData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.colocated {
            write!(f, "colocated ")?;
        }
        write!(f, "{} {}", self.name, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{F32, I32, I8};

    #[test]
    fn argument_type() {
        let t = AbiParam::new(I32);
        assert_eq!(t.to_string(), "i32");
        let t = t.uext();
        assert_eq!(t.to_string(), "i32 uext");
        let t = AbiParam::new(I8).sext();
        assert_eq!(t.to_string(), "i8 sext");
    }

    #[test]
    fn signatures() {
        let mut sig = Signature::new(CallConv::SystemV);
        assert_eq!(sig.to_string(), "() system_v");
        sig.params.push(AbiParam::new(I32));
        sig.returns.push(AbiParam::new(F32));
        sig.params
            .push(AbiParam::special(I32, ArgumentPurpose::StructReturn));
        assert_eq!(sig.to_string(), "(i32, i32 sret) -> f32 system_v");
        assert_eq!(sig.special_param_index(ArgumentPurpose::StructReturn), Some(1));
        assert!(sig.uses_struct_return_param());
    }
}
