//! Representation of SSA IR functions.

mod builder;
pub mod condcodes;
pub mod constant;
mod dfg;
pub mod entities;
mod extfunc;
mod function;
mod globalvalue;
pub mod immediates;
pub mod instructions;
pub mod layout;
mod libcall;
mod memflags;
mod sourceloc;
mod stackslot;
mod trapcode;
pub mod types;

pub use self::builder::{InstBuilder, InstBuilderBase, ReplaceBuilder};
pub use self::dfg::{DataFlowGraph, DisplayInst, ValueDef};
pub use self::entities::{
    AnyEntity, Block, Constant, FuncRef, GlobalValue, Inst, JumpTable, SigRef, StackSlot, Value,
};
pub use self::extfunc::{
    AbiParam, ArgumentExtension, ArgumentPurpose, ExtFuncData, ExternalName, Signature,
};
pub use self::function::Function;
pub use self::globalvalue::GlobalValueData;
pub use self::instructions::{
    BlockCall, InstructionData, JumpTableData, JumpTables, Opcode, ValueList, ValueListPool,
};
pub use self::layout::Layout;
pub use self::libcall::LibCall;
pub use self::memflags::MemFlags;
pub use self::sourceloc::SourceLoc;
pub use self::stackslot::{StackSlotData, StackSlotKind, StackSlots};
pub use self::trapcode::TrapCode;
pub use self::types::Type;
