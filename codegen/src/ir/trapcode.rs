//! Trap codes describing the reason for a trap.

use core::fmt;

/// A trap code describing the reason for a trap.
///
/// All trap instructions have an explicit trap code, and every potentially
/// trapping machine instruction gets one of these attached to its trap
/// metadata record.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TrapCode {
    /// The current stack space was exhausted.
    StackOverflow,

    /// A memory access was outside the bounds of its heap.
    HeapOutOfBounds,

    /// An integer division by zero.
    IntegerDivisionByZero,

    /// An integer arithmetic operation overflowed (`INT_MIN / -1`).
    IntegerOverflow,

    /// Failed float-to-int conversion: NaN or out-of-range input.
    BadConversionToInteger,

    /// Code that was supposed to be unreachable was reached.
    UnreachableCodeReached,

    /// A user-defined trap code.
    User(u16),
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::TrapCode::*;
        let identifier = match self {
            StackOverflow => "stk_ovf",
            HeapOutOfBounds => "heap_oob",
            IntegerDivisionByZero => "int_divz",
            IntegerOverflow => "int_ovf",
            BadConversionToInteger => "bad_toint",
            UnreachableCodeReached => "unreachable",
            User(x) => return write!(f, "user{}", x),
        };
        f.write_str(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(TrapCode::StackOverflow.to_string(), "stk_ovf");
        assert_eq!(TrapCode::IntegerDivisionByZero.to_string(), "int_divz");
        assert_eq!(TrapCode::User(17).to_string(), "user17");
    }
}
