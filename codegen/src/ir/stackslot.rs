//! Stack slots.
//!
//! The `StackSlotData` struct keeps track of a single stack slot in a
//! function. Slot offsets within the frame are assigned later, by the ABI
//! implementation of the target.

use crate::entity::PrimaryMap;
use crate::ir::StackSlot;
use core::fmt;
use core::ops::{Index, IndexMut};

/// The kind of a stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StackSlotKind {
    /// An explicit stack slot. This is a chunk of stack memory for use by
    /// the `stack_load` and `stack_store` instructions.
    ExplicitSlot,
}

impl fmt::Display for StackSlotKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ExplicitSlot => f.write_str("explicit_slot"),
        }
    }
}

/// Contents of a stack slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackSlotData {
    /// The kind of stack slot.
    pub kind: StackSlotKind,

    /// Size of stack slot in bytes.
    pub size: u32,

    /// Alignment of stack slot as a power-of-two exponent.
    pub align_shift: u8,
}

impl StackSlotData {
    /// Create a stack slot with the specified byte size and alignment.
    pub fn new(kind: StackSlotKind, size: u32, align_shift: u8) -> Self {
        Self {
            kind,
            size,
            align_shift,
        }
    }

    /// The stack slot's alignment in bytes.
    pub fn align(&self) -> u32 {
        1 << self.align_shift
    }
}

impl fmt::Display for StackSlotData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.align_shift != 0 {
            write!(f, "{} {}, align = {}", self.kind, self.size, self.align())
        } else {
            write!(f, "{} {}", self.kind, self.size)
        }
    }
}

/// All the stack slots defined in the preamble of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StackSlots {
    slots: PrimaryMap<StackSlot, StackSlotData>,
}

impl StackSlots {
    /// Create an empty set of stack slots.
    pub fn new() -> Self {
        Default::default()
    }

    /// Clear out everything.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Allocate a new stack slot.
    pub fn push(&mut self, data: StackSlotData) -> StackSlot {
        self.slots.push(data)
    }

    /// Check if `ss` is a valid stack slot reference.
    pub fn is_valid(&self, ss: StackSlot) -> bool {
        self.slots.is_valid(ss)
    }

    /// Get an iterator over all the stack slot keys.
    pub fn iter(&self) -> impl Iterator<Item = (StackSlot, &StackSlotData)> {
        self.slots.iter()
    }

    /// Get an iterator over all the stack slot keys.
    pub fn keys(&self) -> impl Iterator<Item = StackSlot> {
        self.slots.keys()
    }

    /// Get the number of stack slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Are there no stack slots?
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Index<StackSlot> for StackSlots {
    type Output = StackSlotData;

    fn index(&self, ss: StackSlot) -> &StackSlotData {
        &self.slots[ss]
    }
}

impl IndexMut<StackSlot> for StackSlots {
    fn index_mut(&mut self, ss: StackSlot) -> &mut StackSlotData {
        &mut self.slots[ss]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_slot() {
        let mut sss = StackSlots::new();
        let ss0 = sss.push(StackSlotData::new(StackSlotKind::ExplicitSlot, 4, 0));
        let ss1 = sss.push(StackSlotData::new(StackSlotKind::ExplicitSlot, 8, 3));
        assert_eq!(ss0.to_string(), "ss0");
        assert_eq!(ss1.to_string(), "ss1");

        assert_eq!(sss[ss0].size, 4);
        assert_eq!(sss[ss1].size, 8);
        assert_eq!(sss[ss1].align(), 8);

        assert_eq!(sss[ss0].to_string(), "explicit_slot 4");
        assert_eq!(sss[ss1].to_string(), "explicit_slot 8, align = 8");
    }
}
