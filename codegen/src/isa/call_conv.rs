//! Calling conventions.

use core::fmt;
use core::str::FromStr;

/// Calling convention identifiers.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum CallConv {
    /// Best performance, not ABI-stable.
    Fast,
    /// System V-style convention: the default C ABI on the supported
    /// targets (AAPCS64 on aarch64, the ELF psABI on s390x and riscv64).
    SystemV,
    /// Like SystemV, but callee pops stack arguments; used for tail-call
    /// chains.
    Tail,
}

impl CallConv {
    /// Returns the list of all conventions.
    pub fn all() -> &'static [CallConv] {
        &[Self::Fast, Self::SystemV, Self::Tail]
    }
}

impl Default for CallConv {
    fn default() -> Self {
        Self::Fast
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::SystemV => "system_v",
            Self::Tail => "tail",
        })
    }
}

impl FromStr for CallConv {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "system_v" => Ok(Self::SystemV),
            "tail" => Ok(Self::Tail),
            _ => Err(()),
        }
    }
}
