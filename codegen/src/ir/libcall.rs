//! Naming well-known routines in the runtime library.

use crate::ir::{types, Opcode, Type};
use core::fmt;
use core::str::FromStr;

/// The name of a runtime library routine.
///
/// Runtime library calls are generated for IR instructions that don't have
/// an equivalent hardware operation on the current target, or for operations
/// that are more conveniently expressed as a function call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LibCall {
    /// probe for stack overflow. The usage depends on the platform.
    Probestack,
    /// ceil.f32
    CeilF32,
    /// ceil.f64
    CeilF64,
    /// floor.f32
    FloorF32,
    /// floor.f64
    FloorF64,
    /// trunc.f32
    TruncF32,
    /// trunc.f64
    TruncF64,
    /// nearest.f32
    NearestF32,
    /// nearest.f64
    NearestF64,
    /// udiv.i128
    UdivI128,
    /// sdiv.i128
    SdivI128,
    /// urem.i128
    UremI128,
    /// srem.i128
    SremI128,
    /// Soft-float addition for targets or types without hardware FP.
    AddF128,
    /// Soft-float subtraction.
    SubF128,
    /// Soft-float multiplication.
    MulF128,
    /// Soft-float division.
    DivF128,
}

impl LibCall {
    /// Get the well-known library call that can implement the given
    /// `Opcode` with the given controlling type, if any.
    pub fn for_inst(opcode: Opcode, ctrl_type: Type) -> Option<Self> {
        Some(match ctrl_type {
            types::F32 => match opcode {
                Opcode::Ceil => Self::CeilF32,
                Opcode::Floor => Self::FloorF32,
                Opcode::Trunc => Self::TruncF32,
                Opcode::Nearest => Self::NearestF32,
                _ => return None,
            },
            types::F64 => match opcode {
                Opcode::Ceil => Self::CeilF64,
                Opcode::Floor => Self::FloorF64,
                Opcode::Trunc => Self::TruncF64,
                Opcode::Nearest => Self::NearestF64,
                _ => return None,
            },
            types::I128 => match opcode {
                Opcode::Udiv => Self::UdivI128,
                Opcode::Sdiv => Self::SdivI128,
                Opcode::Urem => Self::UremI128,
                Opcode::Srem => Self::SremI128,
                _ => return None,
            },
            types::F128 => match opcode {
                Opcode::Fadd => Self::AddF128,
                Opcode::Fsub => Self::SubF128,
                Opcode::Fmul => Self::MulF128,
                Opcode::Fdiv => Self::DivF128,
                _ => return None,
            },
            _ => return None,
        })
    }
}

impl fmt::Display for LibCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for LibCall {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Probestack" => Ok(Self::Probestack),
            "CeilF32" => Ok(Self::CeilF32),
            "CeilF64" => Ok(Self::CeilF64),
            "FloorF32" => Ok(Self::FloorF32),
            "FloorF64" => Ok(Self::FloorF64),
            "TruncF32" => Ok(Self::TruncF32),
            "TruncF64" => Ok(Self::TruncF64),
            "NearestF32" => Ok(Self::NearestF32),
            "NearestF64" => Ok(Self::NearestF64),
            "UdivI128" => Ok(Self::UdivI128),
            "SdivI128" => Ok(Self::SdivI128),
            "UremI128" => Ok(Self::UremI128),
            "SremI128" => Ok(Self::SremI128),
            "AddF128" => Ok(Self::AddF128),
            "SubF128" => Ok(Self::SubF128),
            "MulF128" => Ok(Self::MulF128),
            "DivF128" => Ok(Self::DivF128),
            _ => Err(()),
        }
    }
}
