//! IR entity references.
//!
//! Instructions in the IR need to reference other entities in the function.
//! This can be other parts of the function like basic blocks or stack slots,
//! or it can be external entities that are declared in the function preamble.
//!
//! These entity references are not implemented as Rust references, both
//! because Rust's ownership and mutability rules make it difficult, and
//! because 64-bit pointers take up a lot of space and we want a compact
//! in-memory representation. Instead, entity references are structs wrapping
//! a `u32` index into a table in the `Function` main data structure. There
//! is a separate index type for each entity type, so we don't lose type
//! safety.
//!
//! The entity references all implement `Display` in a way that matches the
//! names used in diagnostics: `v12`, `block3`, `ss1`, and so on. The
//! all-ones index is reserved to represent "no entity" in `PackedOption`s.

use crate::entity::entity_impl;
use core::fmt;

/// An opaque reference to a [basic block](https://en.wikipedia.org/wiki/Basic_block) in a
/// `Function`.
///
/// While the order is stable, it is arbitrary and does not necessarily
/// resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
///
/// Values are defined either by an instruction result or a block parameter,
/// or they alias another value; see `DataFlowGraph::value_def`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a `Function`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a stack slot.
///
/// Stack slots represent an address on the call stack, allocated in the
/// function's frame and addressed relative to it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// An opaque reference to a global value.
///
/// A global value is an address that is live across the entire function,
/// typically a symbol's address or a value loaded from one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");

/// An opaque reference to a constant in the pooled constant table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// An opaque reference to a jump table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// An opaque reference to another function, callable from this one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// An opaque reference to a function signature, used by indirect calls.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to any of the entities defined in this module.
///
/// This is mostly used by the verifier to describe the location of an error.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyEntity {
    /// The whole function.
    Function,
    /// A basic block.
    Block(Block),
    /// An instruction.
    Inst(Inst),
    /// An SSA value.
    Value(Value),
    /// A stack slot.
    StackSlot(StackSlot),
    /// A global value.
    GlobalValue(GlobalValue),
    /// A jump table.
    JumpTable(JumpTable),
    /// A constant.
    Constant(Constant),
    /// An external function.
    FuncRef(FuncRef),
    /// A function signature.
    SigRef(SigRef),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Block(r) => r.fmt(f),
            Self::Inst(r) => r.fmt(f),
            Self::Value(r) => r.fmt(f),
            Self::StackSlot(r) => r.fmt(f),
            Self::GlobalValue(r) => r.fmt(f),
            Self::JumpTable(r) => r.fmt(f),
            Self::Constant(r) => r.fmt(f),
            Self::FuncRef(r) => r.fmt(f),
            Self::SigRef(r) => r.fmt(f),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

impl From<Block> for AnyEntity {
    fn from(r: Block) -> Self {
        Self::Block(r)
    }
}

impl From<Inst> for AnyEntity {
    fn from(r: Inst) -> Self {
        Self::Inst(r)
    }
}

impl From<Value> for AnyEntity {
    fn from(r: Value) -> Self {
        Self::Value(r)
    }
}

impl From<StackSlot> for AnyEntity {
    fn from(r: StackSlot) -> Self {
        Self::StackSlot(r)
    }
}

impl From<GlobalValue> for AnyEntity {
    fn from(r: GlobalValue) -> Self {
        Self::GlobalValue(r)
    }
}

impl From<JumpTable> for AnyEntity {
    fn from(r: JumpTable) -> Self {
        Self::JumpTable(r)
    }
}

impl From<Constant> for AnyEntity {
    fn from(r: Constant) -> Self {
        Self::Constant(r)
    }
}

impl From<FuncRef> for AnyEntity {
    fn from(r: FuncRef) -> Self {
        Self::FuncRef(r)
    }
}

impl From<SigRef> for AnyEntity {
    fn from(r: SigRef) -> Self {
        Self::SigRef(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use std::string::ToString;

    #[test]
    fn display() {
        assert_eq!(Value::new(0).to_string(), "v0");
        assert_eq!(Block::new(12).to_string(), "block12");
        assert_eq!(Inst::new(3).to_string(), "inst3");
        assert_eq!(StackSlot::new(7).to_string(), "ss7");
        assert_eq!(AnyEntity::from(Value::new(4)).to_string(), "v4");
    }

    #[test]
    fn memory() {
        use crate::entity::packed_option::PackedOption;
        use core::mem;
        // This is the whole point of the newtypes.
        assert_eq!(mem::size_of::<Value>(), 4);
        assert_eq!(mem::size_of::<PackedOption<Value>>(), 4);
        assert_eq!(mem::size_of::<Option<Value>>(), 8);
    }
}
