//! Value types.
//!
//! A `Type` describes the kind of value an SSA value carries: a scalar
//! integer or floating-point number, a CPU-flags value, or a SIMD vector of
//! scalar lanes. Types are packed into 16 bits: the low byte identifies the
//! lane type, the high byte holds log2 of the lane count. A scalar is simply
//! a vector with one lane.

use core::fmt;

/// The type of an SSA value.
///
/// The `INVALID` type isn't a real type, and is used as a placeholder or
/// sentinel in data structures.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(u16);

// Lane-type codes, stored in the low byte of a `Type`.
const LANE_INVALID: u16 = 0x00;
const LANE_IFLAGS: u16 = 0x01;
const LANE_FFLAGS: u16 = 0x02;
const LANE_I8: u16 = 0x08;
const LANE_I16: u16 = 0x09;
const LANE_I32: u16 = 0x0a;
const LANE_I64: u16 = 0x0b;
const LANE_I128: u16 = 0x0c;
const LANE_F16: u16 = 0x10;
const LANE_F32: u16 = 0x11;
const LANE_F64: u16 = 0x12;
const LANE_F128: u16 = 0x13;

const fn scalar(lane: u16) -> Type {
    Type(lane)
}

const fn vector(lane: u16, log2_lanes: u16) -> Type {
    Type(lane | (log2_lanes << 8))
}

/// The invalid type, used as a sentinel.
pub const INVALID: Type = scalar(LANE_INVALID);

/// CPU flags produced by an integer comparison.
pub const IFLAGS: Type = scalar(LANE_IFLAGS);
/// CPU flags produced by a floating-point comparison.
pub const FFLAGS: Type = scalar(LANE_FFLAGS);

/// An 8-bit integer.
pub const I8: Type = scalar(LANE_I8);
/// A 16-bit integer.
pub const I16: Type = scalar(LANE_I16);
/// A 32-bit integer.
pub const I32: Type = scalar(LANE_I32);
/// A 64-bit integer.
pub const I64: Type = scalar(LANE_I64);
/// A 128-bit integer.
pub const I128: Type = scalar(LANE_I128);

/// A 16-bit (half-precision) floating-point number.
pub const F16: Type = scalar(LANE_F16);
/// A 32-bit floating-point number.
pub const F32: Type = scalar(LANE_F32);
/// A 64-bit floating-point number.
pub const F64: Type = scalar(LANE_F64);
/// A 128-bit (quad-precision) floating-point number.
pub const F128: Type = scalar(LANE_F128);

/// A vector of 16 8-bit integer lanes.
pub const I8X16: Type = vector(LANE_I8, 4);
/// A vector of 8 8-bit integer lanes.
pub const I8X8: Type = vector(LANE_I8, 3);
/// A vector of 8 16-bit integer lanes.
pub const I16X8: Type = vector(LANE_I16, 3);
/// A vector of 4 16-bit integer lanes.
pub const I16X4: Type = vector(LANE_I16, 2);
/// A vector of 4 32-bit integer lanes.
pub const I32X4: Type = vector(LANE_I32, 2);
/// A vector of 2 32-bit integer lanes.
pub const I32X2: Type = vector(LANE_I32, 1);
/// A vector of 2 64-bit integer lanes.
pub const I64X2: Type = vector(LANE_I64, 1);
/// A vector of 4 32-bit float lanes.
pub const F32X4: Type = vector(LANE_F32, 2);
/// A vector of 2 32-bit float lanes.
pub const F32X2: Type = vector(LANE_F32, 1);
/// A vector of 2 64-bit float lanes.
pub const F64X2: Type = vector(LANE_F64, 1);

impl Type {
    /// Get the lane type of this type: for scalars, the type itself.
    pub fn lane_type(self) -> Type {
        Type(self.0 & 0x00ff)
    }

    /// Log2 of the number of lanes.
    pub fn log2_lane_count(self) -> u32 {
        u32::from(self.0 >> 8)
    }

    /// How many lanes does this type have? Scalars have one lane.
    pub fn lane_count(self) -> u32 {
        1 << self.log2_lane_count()
    }

    /// The number of bits in one lane. Flags types have no storage bits.
    pub fn lane_bits(self) -> u32 {
        match self.0 & 0x00ff {
            LANE_I8 => 8,
            LANE_I16 | LANE_F16 => 16,
            LANE_I32 | LANE_F32 => 32,
            LANE_I64 | LANE_F64 => 64,
            LANE_I128 | LANE_F128 => 128,
            _ => 0,
        }
    }

    /// Total number of bits in this type, over all lanes.
    pub fn bits(self) -> u32 {
        self.lane_bits() * self.lane_count()
    }

    /// Total number of bytes this type occupies in memory.
    pub fn bytes(self) -> u32 {
        (self.bits() + 7) / 8
    }

    /// Is this an integer type (scalar or the lane type of a vector)?
    pub fn is_int(self) -> bool {
        matches!(
            self.0 & 0x00ff,
            LANE_I8 | LANE_I16 | LANE_I32 | LANE_I64 | LANE_I128
        )
    }

    /// Is this a floating-point type (scalar or lane)?
    pub fn is_float(self) -> bool {
        matches!(self.0 & 0x00ff, LANE_F16 | LANE_F32 | LANE_F64 | LANE_F128)
    }

    /// Is this one of the CPU-flags types?
    pub fn is_flags(self) -> bool {
        matches!(self.0, LANE_IFLAGS | LANE_FFLAGS)
    }

    /// Is this the invalid sentinel type?
    pub fn is_invalid(self) -> bool {
        self.0 == LANE_INVALID
    }

    /// Is this a SIMD vector type (more than one lane)?
    pub fn is_vector(self) -> bool {
        self.lane_count() > 1
    }

    /// Is this a scalar integer or floating-point type?
    pub fn is_scalar(self) -> bool {
        self.lane_count() == 1 && (self.is_int() || self.is_float())
    }

    /// Get a type with the same lane type, but `n` lanes. `n` must be a
    /// power of two no larger than 256.
    pub fn by(self, n: u32) -> Option<Type> {
        if !n.is_power_of_two() || self.lane_bits() == 0 {
            return None;
        }
        let log2 = n.trailing_zeros() + self.log2_lane_count();
        if self.lane_bits() << log2 > 256 * 8 {
            return None;
        }
        Some(Type(self.lane_type().0 | ((log2 as u16) << 8)))
    }

    /// Get a vector with the same lane type but half the lanes.
    pub fn half_vector(self) -> Option<Type> {
        if self.is_vector() {
            Some(Type(self.0 - 0x0100))
        } else {
            None
        }
    }

    /// Get a vector with the same lane type but twice the lanes.
    pub fn double_vector(self) -> Option<Type> {
        if self.lane_bits() != 0 && self.bits() <= 64 {
            Some(Type(self.0 + 0x0100))
        } else {
            None
        }
    }

    /// Get a type with the same lane count but lanes half as wide.
    pub fn half_width(self) -> Option<Type> {
        let lane = match self.0 & 0x00ff {
            LANE_I16 => LANE_I8,
            LANE_I32 => LANE_I16,
            LANE_I64 => LANE_I32,
            LANE_I128 => LANE_I64,
            LANE_F32 => LANE_F16,
            LANE_F64 => LANE_F32,
            LANE_F128 => LANE_F64,
            _ => return None,
        };
        Some(Type(lane | (self.0 & 0xff00)))
    }

    /// Get a type with the same lane count but lanes twice as wide.
    pub fn double_width(self) -> Option<Type> {
        let lane = match self.0 & 0x00ff {
            LANE_I8 => LANE_I16,
            LANE_I16 => LANE_I32,
            LANE_I32 => LANE_I64,
            LANE_I64 => LANE_I128,
            LANE_F16 => LANE_F32,
            LANE_F32 => LANE_F64,
            LANE_F64 => LANE_F128,
            _ => return None,
        };
        Some(Type(lane | (self.0 & 0xff00)))
    }

    /// Get the scalar integer type with the given number of bits, if any.
    pub fn int_with_bits(bits: u32) -> Option<Type> {
        match bits {
            8 => Some(I8),
            16 => Some(I16),
            32 => Some(I32),
            64 => Some(I64),
            128 => Some(I128),
            _ => None,
        }
    }

    /// Get the scalar integer type with the same number of bits as this type.
    pub fn as_int(self) -> Option<Type> {
        Self::int_with_bits(self.lane_bits()).and_then(|t| t.by(self.lane_count()))
    }

    /// Index of this type for dense per-type tables. Stable across runs.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// A raw u16 representation, for compact storage inside instructions.
    pub fn repr(self) -> u16 {
        self.0
    }

    /// Recreate a type from its `repr()` value.
    pub fn from_repr(bits: u16) -> Type {
        Type(bits)
    }
}

impl Default for Type {
    fn default() -> Self {
        INVALID
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_vector() {
            write!(f, "{}x{}", self.lane_type(), self.lane_count())
        } else if self.is_int() {
            write!(f, "i{}", self.lane_bits())
        } else if self.is_float() {
            write!(f, "f{}", self.lane_bits())
        } else {
            f.write_str(match self.0 {
                LANE_IFLAGS => "iflags",
                LANE_FFLAGS => "fflags",
                _ => "invalid",
            })
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "types::{}", self.to_string().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_scalars() {
        assert_eq!(I32.lane_count(), 1);
        assert_eq!(I32.bits(), 32);
        assert_eq!(I32.bytes(), 4);
        assert_eq!(I64.lane_bits(), 64);
        assert_eq!(I128.bits(), 128);
        assert_eq!(F16.bits(), 16);
        assert_eq!(F128.bits(), 128);
        assert!(I8.is_int());
        assert!(!I8.is_float());
        assert!(F32.is_float());
        assert!(IFLAGS.is_flags());
        assert_eq!(IFLAGS.bits(), 0);
        assert!(INVALID.is_invalid());
    }

    #[test]
    fn vectors() {
        assert_eq!(I32X4.lane_count(), 4);
        assert_eq!(I32X4.lane_type(), I32);
        assert_eq!(I32X4.bits(), 128);
        assert!(I32X4.is_vector());
        assert!(!I32.is_vector());
        assert_eq!(I32.by(4), Some(I32X4));
        assert_eq!(F32.by(2), Some(F32X2));
        assert_eq!(I32X4.half_vector(), Some(I32X2));
        assert_eq!(I32X2.double_vector(), Some(I32X4));
        assert_eq!(I32.half_vector(), None);
    }

    #[test]
    fn width_changes() {
        assert_eq!(I64.half_width(), Some(I32));
        assert_eq!(I8.half_width(), None);
        assert_eq!(I32.double_width(), Some(I64));
        assert_eq!(I64.double_width(), Some(I128));
        assert_eq!(F32.double_width(), Some(F64));
        assert_eq!(F32.half_width(), Some(F16));
        assert_eq!(I16X8.half_width(), Some(I8X16.half_vector().unwrap()));
        assert_eq!(I16X8.double_width(), I32.by(8));
    }

    #[test]
    fn display() {
        assert_eq!(I32.to_string(), "i32");
        assert_eq!(F64.to_string(), "f64");
        assert_eq!(I32X4.to_string(), "i32x4");
        assert_eq!(IFLAGS.to_string(), "iflags");
        assert_eq!(INVALID.to_string(), "invalid");
    }
}
