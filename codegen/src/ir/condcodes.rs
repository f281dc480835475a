//! Condition codes for the IR comparison instructions.
//!
//! A condition code here is a enumerated type that determined how to compare
//! two numbers. There are different rules for comparing integers and
//! floating point numbers, so they use different condition codes.

use core::fmt;
use core::str::FromStr;

/// Common traits of condition codes.
pub trait CondCode: Copy {
    /// Get the inverse condition code of `self`.
    ///
    /// The inverse condition code produces the opposite result for all
    /// comparisons. That is, `cmp CC, x, y` is true if and only if
    /// `cmp CC.complement(), x, y` is false.
    #[must_use]
    fn complement(self) -> Self;

    /// Get the swapped args condition code for `self`.
    ///
    /// The swapped args condition code produces the same result as `self`
    /// with the operand order reversed: `cmp CC, x, y` is the same as
    /// `cmp CC.swap_args(), y, x`.
    #[must_use]
    fn swap_args(self) -> Self;
}

/// Condition code for comparing integers.
///
/// This condition code is used by the `icmp` instruction to compare integer
/// values. There are separate codes for comparing the integers as signed or
/// unsigned numbers where it makes a difference.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum IntCC {
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// Signed `<`.
    SignedLessThan,
    /// Signed `>=`.
    SignedGreaterThanOrEqual,
    /// Signed `>`.
    SignedGreaterThan,
    /// Signed `<=`.
    SignedLessThanOrEqual,
    /// Unsigned `<`.
    UnsignedLessThan,
    /// Unsigned `>=`.
    UnsignedGreaterThanOrEqual,
    /// Unsigned `>`.
    UnsignedGreaterThan,
    /// Unsigned `<=`.
    UnsignedLessThanOrEqual,
}

impl CondCode for IntCC {
    fn complement(self) -> Self {
        use self::IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            SignedLessThan => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThan,
            SignedGreaterThan => SignedLessThanOrEqual,
            SignedLessThanOrEqual => SignedGreaterThan,
            UnsignedLessThan => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThan,
            UnsignedGreaterThan => UnsignedLessThanOrEqual,
            UnsignedLessThanOrEqual => UnsignedGreaterThan,
        }
    }

    fn swap_args(self) -> Self {
        use self::IntCC::*;
        match self {
            Equal => Equal,
            NotEqual => NotEqual,
            SignedGreaterThan => SignedLessThan,
            SignedGreaterThanOrEqual => SignedLessThanOrEqual,
            SignedLessThan => SignedGreaterThan,
            SignedLessThanOrEqual => SignedGreaterThanOrEqual,
            UnsignedGreaterThan => UnsignedLessThan,
            UnsignedGreaterThanOrEqual => UnsignedLessThanOrEqual,
            UnsignedLessThan => UnsignedGreaterThan,
            UnsignedLessThanOrEqual => UnsignedGreaterThanOrEqual,
        }
    }
}

impl IntCC {
    /// Returns a slice with all possible IntCC values.
    pub fn all() -> &'static [IntCC] {
        use self::IntCC::*;
        &[
            Equal,
            NotEqual,
            SignedLessThan,
            SignedGreaterThanOrEqual,
            SignedGreaterThan,
            SignedLessThanOrEqual,
            UnsignedLessThan,
            UnsignedGreaterThanOrEqual,
            UnsignedGreaterThan,
            UnsignedLessThanOrEqual,
        ]
    }

    /// Is this a signed comparison?
    pub fn is_signed(self) -> bool {
        use self::IntCC::*;
        matches!(
            self,
            SignedLessThan | SignedGreaterThanOrEqual | SignedGreaterThan | SignedLessThanOrEqual
        )
    }

    /// Get the corresponding unsigned condition, mapping the signed
    /// orderings to unsigned ones and leaving the rest alone.
    pub fn unsigned(self) -> Self {
        use self::IntCC::*;
        match self {
            SignedLessThan => UnsignedLessThan,
            SignedGreaterThanOrEqual => UnsignedGreaterThanOrEqual,
            SignedGreaterThan => UnsignedGreaterThan,
            SignedLessThanOrEqual => UnsignedLessThanOrEqual,
            other => other,
        }
    }

    /// Short mnemonic used in the textual format.
    pub fn to_static_str(self) -> &'static str {
        use self::IntCC::*;
        match self {
            Equal => "eq",
            NotEqual => "ne",
            SignedLessThan => "slt",
            SignedGreaterThanOrEqual => "sge",
            SignedGreaterThan => "sgt",
            SignedLessThanOrEqual => "sle",
            UnsignedLessThan => "ult",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedGreaterThan => "ugt",
            UnsignedLessThanOrEqual => "ule",
        }
    }
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

impl FromStr for IntCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use self::IntCC::*;
        match s {
            "eq" => Ok(Equal),
            "ne" => Ok(NotEqual),
            "slt" => Ok(SignedLessThan),
            "sge" => Ok(SignedGreaterThanOrEqual),
            "sgt" => Ok(SignedGreaterThan),
            "sle" => Ok(SignedLessThanOrEqual),
            "ult" => Ok(UnsignedLessThan),
            "uge" => Ok(UnsignedGreaterThanOrEqual),
            "ugt" => Ok(UnsignedGreaterThan),
            "ule" => Ok(UnsignedLessThanOrEqual),
            _ => Err(()),
        }
    }
}

/// Condition code for comparing floating point numbers.
///
/// This condition code is used by the `fcmp` instruction to compare
/// floating point values. Two IEEE numbers are in exactly one of four
/// relations: equal, less, greater, or unordered (at least one is a NaN).
/// Each condition code is a set of those relations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FloatCC {
    /// EQ | LT | GT.
    Ordered,
    /// UN.
    Unordered,
    /// EQ.
    Equal,
    /// The C '!=' operator is the inverse of '==': `NotEqual`: UN | LT | GT.
    NotEqual,
    /// LT | GT.
    OrderedNotEqual,
    /// UN | EQ.
    UnorderedOrEqual,
    /// LT.
    LessThan,
    /// LT | EQ.
    LessThanOrEqual,
    /// GT.
    GreaterThan,
    /// GT | EQ.
    GreaterThanOrEqual,
    /// UN | LT.
    UnorderedOrLessThan,
    /// UN | LT | EQ.
    UnorderedOrLessThanOrEqual,
    /// UN | GT.
    UnorderedOrGreaterThan,
    /// UN | GT | EQ.
    UnorderedOrGreaterThanOrEqual,
}

impl CondCode for FloatCC {
    fn complement(self) -> Self {
        use self::FloatCC::*;
        match self {
            Ordered => Unordered,
            Unordered => Ordered,
            Equal => NotEqual,
            NotEqual => Equal,
            OrderedNotEqual => UnorderedOrEqual,
            UnorderedOrEqual => OrderedNotEqual,
            LessThan => UnorderedOrGreaterThanOrEqual,
            LessThanOrEqual => UnorderedOrGreaterThan,
            GreaterThan => UnorderedOrLessThanOrEqual,
            GreaterThanOrEqual => UnorderedOrLessThan,
            UnorderedOrLessThan => GreaterThanOrEqual,
            UnorderedOrLessThanOrEqual => GreaterThan,
            UnorderedOrGreaterThan => LessThanOrEqual,
            UnorderedOrGreaterThanOrEqual => LessThan,
        }
    }

    fn swap_args(self) -> Self {
        use self::FloatCC::*;
        match self {
            Ordered => Ordered,
            Unordered => Unordered,
            Equal => Equal,
            NotEqual => NotEqual,
            OrderedNotEqual => OrderedNotEqual,
            UnorderedOrEqual => UnorderedOrEqual,
            LessThan => GreaterThan,
            LessThanOrEqual => GreaterThanOrEqual,
            GreaterThan => LessThan,
            GreaterThanOrEqual => LessThanOrEqual,
            UnorderedOrLessThan => UnorderedOrGreaterThan,
            UnorderedOrLessThanOrEqual => UnorderedOrGreaterThanOrEqual,
            UnorderedOrGreaterThan => UnorderedOrLessThan,
            UnorderedOrGreaterThanOrEqual => UnorderedOrLessThanOrEqual,
        }
    }
}

impl fmt::Display for FloatCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::FloatCC::*;
        f.write_str(match self {
            Ordered => "ord",
            Unordered => "uno",
            Equal => "eq",
            NotEqual => "ne",
            OrderedNotEqual => "one",
            UnorderedOrEqual => "ueq",
            LessThan => "lt",
            LessThanOrEqual => "le",
            GreaterThan => "gt",
            GreaterThanOrEqual => "ge",
            UnorderedOrLessThan => "ult",
            UnorderedOrLessThanOrEqual => "ule",
            UnorderedOrGreaterThan => "ugt",
            UnorderedOrGreaterThanOrEqual => "uge",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_complement() {
        for &cc in IntCC::all() {
            assert_eq!(cc.complement().complement(), cc);
        }
    }

    #[test]
    fn int_swap_args() {
        for &cc in IntCC::all() {
            assert_eq!(cc.swap_args().swap_args(), cc);
        }
        assert_eq!(IntCC::SignedLessThan.swap_args(), IntCC::SignedGreaterThan);
        assert_eq!(IntCC::Equal.swap_args(), IntCC::Equal);
    }

    #[test]
    fn int_display_roundtrip() {
        for &cc in IntCC::all() {
            assert_eq!(cc.to_string().parse(), Ok(cc));
        }
    }

    #[test]
    fn float_complement() {
        let all = [
            FloatCC::Ordered,
            FloatCC::Unordered,
            FloatCC::Equal,
            FloatCC::NotEqual,
            FloatCC::OrderedNotEqual,
            FloatCC::UnorderedOrEqual,
            FloatCC::LessThan,
            FloatCC::LessThanOrEqual,
            FloatCC::GreaterThan,
            FloatCC::GreaterThanOrEqual,
            FloatCC::UnorderedOrLessThan,
            FloatCC::UnorderedOrLessThanOrEqual,
            FloatCC::UnorderedOrGreaterThan,
            FloatCC::UnorderedOrGreaterThanOrEqual,
        ];
        for &cc in &all {
            assert_eq!(cc.complement().complement(), cc);
            assert_eq!(cc.swap_args().swap_args(), cc);
        }
    }
}
