//! Global values.

use crate::ir::{ExternalName, GlobalValue, Type};
use crate::ir::immediates::{Imm64, Offset32};
use core::fmt;

/// Information about a global value declaration.
#[derive(Clone, Debug, PartialEq, Hash)]
pub enum GlobalValueData {
    /// Value is the address of the VM context struct.
    VMContext,

    /// Value is pointed to by another global value.
    ///
    /// The `base` global value is assumed to contain a pointer. This global
    /// value is computed by loading from memory at that pointer value, plus
    /// a byte offset.
    Load {
        /// The base pointer global value.
        base: GlobalValue,
        /// Offset added to the base pointer before doing the load.
        offset: Offset32,
        /// Type of the loaded value.
        global_type: Type,
    },

    /// Value is an offset from another global value.
    IAddImm {
        /// The base pointer global value.
        base: GlobalValue,
        /// Byte offset to be added to the value.
        offset: Imm64,
        /// Type of the iadd.
        global_type: Type,
    },

    /// Value is symbolic, meaning it's a name which will be resolved to an
    /// actual value later (eg. by linking). The value of a symbol is the
    /// address it resolves to.
    Symbol {
        /// The symbolic name.
        name: ExternalName,
        /// Offset from the symbol. This can be used instead of IAddImm to
        /// represent folding an offset into a symbol.
        offset: Imm64,
        /// Will this symbol be defined nearby, such that it will always be
        /// a certain distance away, after linking?
        colocated: bool,
    },
}

impl GlobalValueData {
    /// Assume that `self` is an `GlobalValueData::Symbol` and return its name.
    pub fn symbol_name(&self) -> &ExternalName {
        match self {
            Self::Symbol { name, .. } => name,
            _ => panic!("only symbols have names"),
        }
    }

    /// Return the type of this global.
    pub fn global_type(&self, pointer_type: Type) -> Type {
        match self {
            Self::VMContext | Self::Symbol { .. } => pointer_type,
            Self::Load { global_type, .. } | Self::IAddImm { global_type, .. } => *global_type,
        }
    }
}

impl fmt::Display for GlobalValueData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::VMContext => f.write_str("vmctx"),
            Self::Load {
                base,
                offset,
                global_type,
            } => write!(f, "load.{} notrap aligned {}{}", global_type, base, offset),
            Self::IAddImm {
                base,
                offset,
                global_type,
            } => write!(f, "iadd_imm.{} {}, {}", global_type, base, offset),
            Self::Symbol {
                name,
                offset,
                colocated,
            } => {
                write!(
                    f,
                    "symbol {}{}",
                    if *colocated { "colocated " } else { "" },
                    name
                )?;
                let offset_val: i64 = (*offset).into();
                if offset_val > 0 {
                    write!(f, "+")?;
                }
                if offset_val != 0 {
                    write!(f, "{}", offset)?;
                }
                Ok(())
            }
        }
    }
}
