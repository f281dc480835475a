//! Binary machine code emission: shared types.
//!
//! The `binemit` module contains the types the rest of the compiler and
//! its embedders use to talk about emitted machine code: offsets into the
//! code buffer, relocation records, and trap records.

use crate::ir::{ExternalName, SourceLoc, TrapCode};
use core::fmt;

/// Offset in bytes from the beginning of the function.
pub type CodeOffset = u32;

/// Addend to add to the symbol value.
pub type Addend = i64;

/// Relocation kinds for every supported target.
///
/// The code generator only records relocations; resolving them against
/// actual addresses is the linker's or JIT's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reloc {
    /// Absolute 4-byte.
    Abs4,
    /// Absolute 8-byte.
    Abs8,
    /// x86 PC-relative 4-byte.
    X86PCRel4,
    /// x86 call to PC-relative 4-byte.
    X86CallPCRel4,
    /// x86 call to PLT-relative 4-byte.
    X86CallPLTRel4,
    /// x86 GOT PC-relative 4-byte.
    X86GOTPCRel4,
    /// AArch64 call target (+/- 128 MiB), `BL` bits 25:0.
    Arm64Call,
    /// AArch64 unconditional branch, `B` bits 25:0.
    Arm64Jump26,
    /// AArch64 ADR with a 21-bit PC-relative page (4 KiB) offset:
    /// `ADR_PREL_PG_HI21`.
    Aarch64AdrPrelPgHi21,
    /// AArch64 `ADD` immediate holding the low 12 bits of a symbol
    /// address: `ADD_ABS_LO12_NC`.
    Aarch64AddAbsLo12Nc,
    /// AArch64 load/store with scaled low-12-bit offset of a symbol:
    /// `LDST64_ABS_LO12_NC`.
    Aarch64Ldst64AbsLo12Nc,
    /// RISC-V PC-relative high 20 bits (AUIPC).
    RiscvPCRelHi20,
    /// RISC-V PC-relative low 12 bits (paired with `RiscvPCRelHi20`).
    RiscvPCRelLo12I,
    /// RISC-V JAL 21-bit offset.
    RiscvJal,
    /// RISC-V call (AUIPC + JALR pair).
    RiscvCall,
    /// s390x PC-relative 32-bit, divided by two (`pc32dbl`).
    S390xPCRel32Dbl,
}

impl fmt::Display for Reloc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Abs4 => write!(f, "Abs4"),
            Self::Abs8 => write!(f, "Abs8"),
            Self::X86PCRel4 => write!(f, "PCRel4"),
            Self::X86CallPCRel4 => write!(f, "CallPCRel4"),
            Self::X86CallPLTRel4 => write!(f, "CallPLTRel4"),
            Self::X86GOTPCRel4 => write!(f, "GOTPCRel4"),
            Self::Arm64Call => write!(f, "Arm64Call"),
            Self::Arm64Jump26 => write!(f, "Arm64Jump26"),
            Self::Aarch64AdrPrelPgHi21 => write!(f, "Aarch64AdrPrelPgHi21"),
            Self::Aarch64AddAbsLo12Nc => write!(f, "Aarch64AddAbsLo12Nc"),
            Self::Aarch64Ldst64AbsLo12Nc => write!(f, "Aarch64Ldst64AbsLo12Nc"),
            Self::RiscvPCRelHi20 => write!(f, "RiscvPCRelHi20"),
            Self::RiscvPCRelLo12I => write!(f, "RiscvPCRelLo12I"),
            Self::RiscvJal => write!(f, "RiscvJal"),
            Self::RiscvCall => write!(f, "RiscvCall"),
            Self::S390xPCRel32Dbl => write!(f, "S390xPCRel32Dbl"),
        }
    }
}

/// A relocation resulting from a compilation.
#[derive(Clone, Debug, PartialEq)]
pub struct MachReloc {
    /// The offset at which the relocation applies, *relative to the
    /// containing section*.
    pub offset: CodeOffset,
    /// The kind of relocation.
    pub kind: Reloc,
    /// The external symbol / name to which this relocation refers.
    pub name: ExternalName,
    /// The addend to add to the symbol value.
    pub addend: Addend,
}

/// A trap record resulting from a compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachTrap {
    /// The offset at which the trap instruction starts.
    pub offset: CodeOffset,
    /// The code of the trap.
    pub code: TrapCode,
    /// The source location of the trapping instruction.
    pub srcloc: SourceLoc,
}

/// Metadata about a compiled function.
#[derive(Clone, Debug, Default)]
pub struct CodeInfo {
    /// Number of bytes of machine code.
    pub total_size: CodeOffset,
}
