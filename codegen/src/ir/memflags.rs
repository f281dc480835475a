//! Memory operation flags.

use core::fmt;

enum FlagBit {
    Notrap,
    Aligned,
    Readonly,
}

const NAMES: [&str; 3] = ["notrap", "aligned", "readonly"];

/// Flags for memory operations like load/store.
///
/// Each of these flags introduce a limited form of undefined behavior. The
/// flags each enable certain optimizations that need to make additional
/// assumptions. Generally, the semantics of a program does not change when a
/// flag is removed, but adding a flag will.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemFlags {
    bits: u8,
}

impl MemFlags {
    /// Create a new empty set of flags.
    pub fn new() -> Self {
        Self { bits: 0 }
    }

    /// Create a set of flags representing an access from a "trusted"
    /// address, meaning it's known to be aligned and non-trapping.
    pub fn trusted() -> Self {
        let mut result = Self::new();
        result.set_notrap();
        result.set_aligned();
        result
    }

    fn read(self, bit: FlagBit) -> bool {
        self.bits & (1 << bit as usize) != 0
    }

    fn set(&mut self, bit: FlagBit) {
        self.bits |= 1 << bit as usize
    }

    /// Test if the `notrap` flag is set.
    ///
    /// Normally, any load or store can trap if the memory address is
    /// invalid. A `notrap` access declares the address to be dereferenceable,
    /// so the access cannot trap and no trap record is emitted for it.
    pub fn notrap(self) -> bool {
        self.read(FlagBit::Notrap)
    }

    /// Set the `notrap` flag.
    pub fn set_notrap(&mut self) {
        self.set(FlagBit::Notrap)
    }

    /// Test if the `aligned` flag is set.
    ///
    /// By default, heap accesses may be misaligned. The `aligned` flag
    /// asserts natural alignment for the access type.
    pub fn aligned(self) -> bool {
        self.read(FlagBit::Aligned)
    }

    /// Set the `aligned` flag.
    pub fn set_aligned(&mut self) {
        self.set(FlagBit::Aligned)
    }

    /// Test if the `readonly` flag is set.
    ///
    /// Loads with this flag can be freely moved and deduplicated: the memory
    /// is not written between the load and any dominating copy of it.
    pub fn readonly(self) -> bool {
        self.read(FlagBit::Readonly)
    }

    /// Set the `readonly` flag.
    pub fn set_readonly(&mut self) {
        self.set(FlagBit::Readonly)
    }
}

impl fmt::Display for MemFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, n) in NAMES.iter().enumerate() {
            if self.bits & (1 << i) != 0 {
                write!(f, " {}", n)?;
            }
        }
        Ok(())
    }
}
