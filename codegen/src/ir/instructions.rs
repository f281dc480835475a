//! Instruction formats and opcodes.
//!
//! Every instruction in the IR is a small, fixed-size `InstructionData`
//! value. The variant determines the payload layout; the `Opcode` stored in
//! every variant determines the operation. Instructions that need a
//! variable-length argument list (calls, returns) store a `ValueList` handle
//! pointing into the function's shared `ValueListPool`.

use crate::entity;
use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::immediates::{Ieee32, Ieee64, Imm64, Offset32};
use crate::ir::{
    Block, Constant, FuncRef, GlobalValue, JumpTable, MemFlags, SigRef, StackSlot, TrapCode,
    Type, Value,
};
use core::fmt;

/// A variable list of `Value` operands used for function call arguments and
/// passing arguments to basic blocks.
pub type ValueList = entity::EntityList<Value>;

/// Memory pool for holding value lists. See `ValueList`.
pub type ValueListPool = entity::ListPool<Value>;

/// A pair of a Block and its arguments, stored in a single EntityList
/// internally.
///
/// NOTE: We don't expose either value_to_block or block_to_value outside of
/// this module because this operation is not generally safe. However, as
/// the two share a representation, they can be stored in the same list here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockCall {
    /// The underlying storage for the BlockCall. The first element of the
    /// values list is the block, and the remaining values are the arguments
    /// passed to that block.
    values: ValueList,
}

impl BlockCall {
    // Bit-cast between blocks and values, for storage in the list.
    fn value_to_block(val: Value) -> Block {
        Block::from_u32(val.as_u32())
    }

    fn block_to_value(block: Block) -> Value {
        Value::from_u32(block.as_u32())
    }

    /// Construct a BlockCall with the given block and arguments.
    pub fn new(block: Block, args: &[Value], pool: &mut ValueListPool) -> Self {
        let mut values = ValueList::default();
        values.push(Self::block_to_value(block), pool);
        values.extend(args.iter().copied(), pool);
        Self { values }
    }

    /// Return the block for this BlockCall.
    pub fn block(&self, pool: &ValueListPool) -> Block {
        let val = self.values.first(pool).unwrap();
        Self::value_to_block(val)
    }

    /// Replace the block for this BlockCall.
    pub fn set_block(&mut self, block: Block, pool: &mut ValueListPool) {
        *self.values.get_mut(0, pool).unwrap() = Self::block_to_value(block);
    }

    /// Append an argument to the block args.
    pub fn append_argument(&mut self, arg: Value, pool: &mut ValueListPool) {
        self.values.push(arg, pool);
    }

    /// Return a slice for the arguments of this block.
    pub fn args_slice<'a>(&self, pool: &'a ValueListPool) -> &'a [Value] {
        &self.values.as_slice(pool)[1..]
    }

    /// Return a mutable slice for the arguments of this block.
    pub fn args_slice_mut<'a>(&'a mut self, pool: &'a mut ValueListPool) -> &'a mut [Value] {
        &mut self.values.as_mut_slice(pool)[1..]
    }

    /// Display this BlockCall.
    pub fn display<'a>(&self, pool: &'a ValueListPool) -> DisplayBlockCall<'a> {
        DisplayBlockCall { block: *self, pool }
    }
}

/// Wrapper for the context needed to display a [BlockCall] value.
pub struct DisplayBlockCall<'a> {
    block: BlockCall,
    pool: &'a ValueListPool,
}

impl<'a> fmt::Display for DisplayBlockCall<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.block.block(self.pool))?;
        let args = self.block.args_slice(self.pool);
        if !args.is_empty() {
            write!(f, "(")?;
            for (ix, arg) in args.iter().enumerate() {
                if ix > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// An instruction opcode.
///
/// All instructions from all supported ISAs are present.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Opcode {
    /// Does nothing, carries no value.
    Nop,
    /// Integer constant.
    Iconst,
    /// 32-bit float constant.
    F32const,
    /// 64-bit float constant.
    F64const,
    /// Vector constant from the pooled constant table.
    Vconst,
    /// Integer addition.
    Iadd,
    /// Integer subtraction.
    Isub,
    /// Integer multiplication.
    Imul,
    /// Unsigned integer multiplication, high half.
    Umulhi,
    /// Signed integer multiplication, high half.
    Smulhi,
    /// Unsigned integer division. Traps on zero divisor.
    Udiv,
    /// Signed integer division. Traps on zero divisor and INT_MIN / -1.
    Sdiv,
    /// Unsigned integer remainder.
    Urem,
    /// Signed integer remainder.
    Srem,
    /// Integer negation.
    Ineg,
    /// Bitwise and.
    Band,
    /// Bitwise or.
    Bor,
    /// Bitwise xor.
    Bxor,
    /// Bitwise not.
    Bnot,
    /// Shift left.
    Ishl,
    /// Unsigned (logical) shift right.
    Ushr,
    /// Signed (arithmetic) shift right.
    Sshr,
    /// Count leading zero bits.
    Clz,
    /// Count trailing zero bits.
    Ctz,
    /// Integer comparison producing a boolean (i8) result.
    Icmp,
    /// Floating-point comparison producing a boolean (i8) result.
    Fcmp,
    /// Conditional select: `select c, x, y` is `x` when `c != 0`, else `y`.
    Select,
    /// Zero-extend to a wider integer type.
    Uextend,
    /// Sign-extend to a wider integer type.
    Sextend,
    /// Truncate to a narrower integer type.
    Ireduce,
    /// Reinterpret the bits of a value as a different type of equal width.
    Bitcast,
    /// Duplicate a scalar into every lane of a vector.
    Splat,
    /// Floating-point addition.
    Fadd,
    /// Floating-point subtraction.
    Fsub,
    /// Floating-point multiplication.
    Fmul,
    /// Floating-point division.
    Fdiv,
    /// Floating-point negation.
    Fneg,
    /// Floating-point absolute value.
    Fabs,
    /// Floating-point square root.
    Sqrt,
    /// Round toward positive infinity.
    Ceil,
    /// Round toward negative infinity.
    Floor,
    /// Round toward zero.
    Trunc,
    /// Round to nearest, ties to even.
    Nearest,
    /// Convert a float to a larger float format.
    Fpromote,
    /// Convert a float to a smaller float format.
    Fdemote,
    /// Convert a float to an unsigned integer, trapping on NaN/overflow.
    FcvtToUint,
    /// Convert a float to a signed integer, trapping on NaN/overflow.
    FcvtToSint,
    /// Convert an unsigned integer to a float.
    FcvtFromUint,
    /// Convert a signed integer to a float.
    FcvtFromSint,
    /// Load from memory.
    Load,
    /// Load 8 bits, zero-extend.
    Uload8,
    /// Load 8 bits, sign-extend.
    Sload8,
    /// Load 16 bits, zero-extend.
    Uload16,
    /// Load 16 bits, sign-extend.
    Sload16,
    /// Load 32 bits, zero-extend.
    Uload32,
    /// Load 32 bits, sign-extend.
    Sload32,
    /// Store to memory.
    Store,
    /// Store the low 8 bits.
    Istore8,
    /// Store the low 16 bits.
    Istore16,
    /// Store the low 32 bits.
    Istore32,
    /// Load from a stack slot.
    StackLoad,
    /// Store to a stack slot.
    StackStore,
    /// The address of a stack slot.
    StackAddr,
    /// The address of a function.
    FuncAddr,
    /// Compute the value of a global value.
    GlobalValue,
    /// Unconditional jump.
    Jump,
    /// Conditional branch on a truthy integer, with two destinations.
    Brif,
    /// Indirect branch through a jump table.
    BrTable,
    /// Return from the function.
    Return,
    /// Tail call: transfer control and the frame to another function.
    ReturnCall,
    /// Direct function call.
    Call,
    /// Indirect function call through a code pointer.
    CallIndirect,
    /// Unconditional trap.
    Trap,
    /// Trap when the operand is zero.
    Trapz,
    /// Trap when the operand is non-zero.
    Trapnz,
}

impl Opcode {
    /// True for all branching instructions: those with one or more block
    /// destinations.
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Jump | Self::Brif | Self::BrTable)
    }

    /// Is this instruction a block terminator?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::Brif
                | Self::BrTable
                | Self::Return
                | Self::ReturnCall
                | Self::Trap
        )
    }

    /// Is this a call instruction?
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallIndirect | Self::ReturnCall)
    }

    /// Is this a return-like instruction?
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnCall)
    }

    /// Can this instruction read from memory?
    pub fn can_load(self) -> bool {
        matches!(
            self,
            Self::Load
                | Self::Uload8
                | Self::Sload8
                | Self::Uload16
                | Self::Sload16
                | Self::Uload32
                | Self::Sload32
                | Self::StackLoad
        )
    }

    /// Can this instruction write to memory?
    pub fn can_store(self) -> bool {
        matches!(
            self,
            Self::Store | Self::Istore8 | Self::Istore16 | Self::Istore32 | Self::StackStore
        )
    }

    /// Can this instruction cause a trap?
    pub fn can_trap(self) -> bool {
        matches!(
            self,
            Self::Udiv
                | Self::Sdiv
                | Self::Urem
                | Self::Srem
                | Self::FcvtToUint
                | Self::FcvtToSint
                | Self::Trap
                | Self::Trapz
                | Self::Trapnz
        )
    }

    /// Does this instruction have other side effects besides can_* flags?
    pub fn other_side_effects(self) -> bool {
        matches!(self, Self::Call | Self::CallIndirect)
    }

    /// Is it safe to remove an instance of this opcode whose results are
    /// all unused?
    pub fn is_pure(self) -> bool {
        !(self.is_branch()
            || self.is_terminator()
            || self.is_call()
            || self.can_load()
            || self.can_store()
            || self.can_trap()
            || self.other_side_effects())
    }

    /// The name of this opcode as it appears in textual IR.
    pub fn name(self) -> &'static str {
        use self::Opcode::*;
        match self {
            Nop => "nop",
            Iconst => "iconst",
            F32const => "f32const",
            F64const => "f64const",
            Vconst => "vconst",
            Iadd => "iadd",
            Isub => "isub",
            Imul => "imul",
            Umulhi => "umulhi",
            Smulhi => "smulhi",
            Udiv => "udiv",
            Sdiv => "sdiv",
            Urem => "urem",
            Srem => "srem",
            Ineg => "ineg",
            Band => "band",
            Bor => "bor",
            Bxor => "bxor",
            Bnot => "bnot",
            Ishl => "ishl",
            Ushr => "ushr",
            Sshr => "sshr",
            Clz => "clz",
            Ctz => "ctz",
            Icmp => "icmp",
            Fcmp => "fcmp",
            Select => "select",
            Uextend => "uextend",
            Sextend => "sextend",
            Ireduce => "ireduce",
            Bitcast => "bitcast",
            Splat => "splat",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Fneg => "fneg",
            Fabs => "fabs",
            Sqrt => "sqrt",
            Ceil => "ceil",
            Floor => "floor",
            Trunc => "trunc",
            Nearest => "nearest",
            Fpromote => "fpromote",
            Fdemote => "fdemote",
            FcvtToUint => "fcvt_to_uint",
            FcvtToSint => "fcvt_to_sint",
            FcvtFromUint => "fcvt_from_uint",
            FcvtFromSint => "fcvt_from_sint",
            Load => "load",
            Uload8 => "uload8",
            Sload8 => "sload8",
            Uload16 => "uload16",
            Sload16 => "sload16",
            Uload32 => "uload32",
            Sload32 => "sload32",
            Store => "store",
            Istore8 => "istore8",
            Istore16 => "istore16",
            Istore32 => "istore32",
            StackLoad => "stack_load",
            StackStore => "stack_store",
            StackAddr => "stack_addr",
            FuncAddr => "func_addr",
            GlobalValue => "global_value",
            Jump => "jump",
            Brif => "brif",
            BrTable => "br_table",
            Return => "return",
            ReturnCall => "return_call",
            Call => "call",
            CallIndirect => "call_indirect",
            Trap => "trap",
            Trapz => "trapz",
            Trapnz => "trapnz",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contents of an instruction.
///
/// Every variant keeps its payload small and fixed-size; larger payloads
/// are stored out of line and referenced by handle. The enum as a whole is
/// expected to stay at 16 bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InstructionData {
    Nullary {
        opcode: Opcode,
    },
    Unary {
        opcode: Opcode,
        arg: Value,
    },
    UnaryImm {
        opcode: Opcode,
        imm: Imm64,
    },
    UnaryIeee32 {
        opcode: Opcode,
        imm: Ieee32,
    },
    UnaryIeee64 {
        opcode: Opcode,
        imm: Ieee64,
    },
    UnaryConst {
        opcode: Opcode,
        constant_handle: Constant,
    },
    UnaryGlobalValue {
        opcode: Opcode,
        global_value: GlobalValue,
    },
    Binary {
        opcode: Opcode,
        args: [Value; 2],
    },
    Ternary {
        opcode: Opcode,
        args: [Value; 3],
    },
    IntCompare {
        opcode: Opcode,
        args: [Value; 2],
        cond: IntCC,
    },
    FloatCompare {
        opcode: Opcode,
        args: [Value; 2],
        cond: FloatCC,
    },
    Jump {
        opcode: Opcode,
        destination: BlockCall,
    },
    Brif {
        opcode: Opcode,
        arg: Value,
        blocks: [BlockCall; 2],
    },
    BranchTable {
        opcode: Opcode,
        arg: Value,
        table: JumpTable,
    },
    Call {
        opcode: Opcode,
        args: ValueList,
        func_ref: FuncRef,
    },
    CallIndirect {
        opcode: Opcode,
        args: ValueList,
        sig_ref: SigRef,
    },
    FuncAddr {
        opcode: Opcode,
        func_ref: FuncRef,
    },
    Load {
        opcode: Opcode,
        arg: Value,
        flags: MemFlags,
        offset: Offset32,
    },
    Store {
        opcode: Opcode,
        args: [Value; 2],
        flags: MemFlags,
        offset: Offset32,
    },
    StackLoad {
        opcode: Opcode,
        stack_slot: StackSlot,
        offset: Offset32,
    },
    StackStore {
        opcode: Opcode,
        arg: Value,
        stack_slot: StackSlot,
        offset: Offset32,
    },
    Trap {
        opcode: Opcode,
        code: TrapCode,
    },
    CondTrap {
        opcode: Opcode,
        arg: Value,
        code: TrapCode,
    },
    MultiAry {
        opcode: Opcode,
        args: ValueList,
    },
}

impl InstructionData {
    /// Get the opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Nullary { opcode }
            | Self::Unary { opcode, .. }
            | Self::UnaryImm { opcode, .. }
            | Self::UnaryIeee32 { opcode, .. }
            | Self::UnaryIeee64 { opcode, .. }
            | Self::UnaryConst { opcode, .. }
            | Self::UnaryGlobalValue { opcode, .. }
            | Self::Binary { opcode, .. }
            | Self::Ternary { opcode, .. }
            | Self::IntCompare { opcode, .. }
            | Self::FloatCompare { opcode, .. }
            | Self::Jump { opcode, .. }
            | Self::Brif { opcode, .. }
            | Self::BranchTable { opcode, .. }
            | Self::Call { opcode, .. }
            | Self::CallIndirect { opcode, .. }
            | Self::FuncAddr { opcode, .. }
            | Self::Load { opcode, .. }
            | Self::Store { opcode, .. }
            | Self::StackLoad { opcode, .. }
            | Self::StackStore { opcode, .. }
            | Self::Trap { opcode, .. }
            | Self::CondTrap { opcode, .. }
            | Self::MultiAry { opcode, .. } => opcode,
        }
    }

    /// Get the value arguments to this instruction.
    pub fn arguments<'a>(&'a self, pool: &'a ValueListPool) -> &'a [Value] {
        match self {
            Self::Nullary { .. }
            | Self::UnaryImm { .. }
            | Self::UnaryIeee32 { .. }
            | Self::UnaryIeee64 { .. }
            | Self::UnaryConst { .. }
            | Self::UnaryGlobalValue { .. }
            | Self::FuncAddr { .. }
            | Self::StackLoad { .. }
            | Self::Jump { .. }
            | Self::Trap { .. } => &[],
            Self::Unary { arg, .. }
            | Self::Brif { arg, .. }
            | Self::BranchTable { arg, .. }
            | Self::Load { arg, .. }
            | Self::StackStore { arg, .. }
            | Self::CondTrap { arg, .. } => core::slice::from_ref(arg),
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args, .. } => args,
            Self::Ternary { args, .. } => args,
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => args.as_slice(pool),
        }
    }

    /// Get mutable references to the value arguments to this instruction.
    pub fn arguments_mut<'a>(&'a mut self, pool: &'a mut ValueListPool) -> &'a mut [Value] {
        match self {
            Self::Nullary { .. }
            | Self::UnaryImm { .. }
            | Self::UnaryIeee32 { .. }
            | Self::UnaryIeee64 { .. }
            | Self::UnaryConst { .. }
            | Self::UnaryGlobalValue { .. }
            | Self::FuncAddr { .. }
            | Self::StackLoad { .. }
            | Self::Jump { .. }
            | Self::Trap { .. } => &mut [],
            Self::Unary { arg, .. }
            | Self::Brif { arg, .. }
            | Self::BranchTable { arg, .. }
            | Self::Load { arg, .. }
            | Self::StackStore { arg, .. }
            | Self::CondTrap { arg, .. } => core::slice::from_mut(arg),
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args, .. } => args,
            Self::Ternary { args, .. } => args,
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => args.as_mut_slice(pool),
        }
    }

    /// Get the destinations of this instruction, if it's a branch.
    ///
    /// `br_table` returns the empty slice; its destinations live in the
    /// jump table and must be queried through the DFG.
    pub fn branch_destination(&self) -> &[BlockCall] {
        match self {
            Self::Jump { destination, .. } => core::slice::from_ref(destination),
            Self::Brif { blocks, .. } => blocks,
            _ => &[],
        }
    }

    /// Get mutable access to the destinations of this instruction, if it's
    /// a branch.
    pub fn branch_destination_mut(&mut self) -> &mut [BlockCall] {
        match self {
            Self::Jump { destination, .. } => core::slice::from_mut(destination),
            Self::Brif { blocks, .. } => blocks,
            _ => &mut [],
        }
    }

    /// If this is a `br_table` instruction, return its jump table.
    pub fn branch_table(&self) -> Option<JumpTable> {
        match self {
            Self::BranchTable { table, .. } => Some(*table),
            _ => None,
        }
    }

    /// Return the value of an immediate if this instruction has one.
    pub fn imm_value(&self) -> Option<Imm64> {
        match self {
            Self::UnaryImm { imm, .. } => Some(*imm),
            _ => None,
        }
    }

    /// If this is a trapping instruction, get its trap code.
    pub fn trap_code(&self) -> Option<TrapCode> {
        match self {
            Self::Trap { code, .. } | Self::CondTrap { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// If this is a control-flow instruction depending on an integer
    /// condition, gets its condition.
    pub fn cond_code(&self) -> Option<IntCC> {
        match self {
            Self::IntCompare { cond, .. } => Some(*cond),
            _ => None,
        }
    }

    /// If this is a floating-point comparison, get its condition.
    pub fn fp_cond_code(&self) -> Option<FloatCC> {
        match self {
            Self::FloatCompare { cond, .. } => Some(*cond),
            _ => None,
        }
    }

    /// Take out the value list with all the value arguments, leaving the
    /// instruction with an empty list, if it has one.
    pub fn take_value_list(&mut self) -> Option<ValueList> {
        match self {
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => Some(args.take()),
            _ => None,
        }
    }

    /// Put back a value list used by this instruction.
    pub fn put_value_list(&mut self, vlist: ValueList) {
        let args = match self {
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => args,
            _ => panic!("no value list to put back"),
        };
        debug_assert!(args.is_empty(), "replacing non-empty value list");
        *args = vlist;
    }
}

/// A jump table: an ordered sequence of block destinations indexed by an
/// unsigned integer, with a default destination for out-of-range indexes.
#[derive(Clone, Debug, PartialEq, Hash)]
pub struct JumpTableData {
    // Table entries, with the default destination stored at index 0.
    table: Vec<BlockCall>,
}

impl JumpTableData {
    /// Create a new jump table with the provided default and entry blocks.
    pub fn new(def: BlockCall, table: &[BlockCall]) -> Self {
        let mut combined = Vec::with_capacity(table.len() + 1);
        combined.push(def);
        combined.extend_from_slice(table);
        Self { table: combined }
    }

    /// Fetch the default block for this jump table.
    pub fn default_block(&self) -> &BlockCall {
        self.table.first().unwrap()
    }

    /// Mutable access to the default block of this jump table.
    pub fn default_block_mut(&mut self) -> &mut BlockCall {
        self.table.first_mut().unwrap()
    }

    /// The jump table and default block as a single slice. The default
    /// block is the first element.
    pub fn all_branches(&self) -> &[BlockCall] {
        self.table.as_slice()
    }

    /// The jump table and default block as a single mutable slice. The
    /// default block is the first element.
    pub fn all_branches_mut(&mut self) -> &mut [BlockCall] {
        self.table.as_mut_slice()
    }

    /// Access the jump table's entries, excluding the default block.
    pub fn as_slice(&self) -> &[BlockCall] {
        &self.table.as_slice()[1..]
    }

    /// Returns the number of table entries, excluding the default block.
    pub fn len(&self) -> usize {
        self.table.len() - 1
    }
}

/// Jump tables defined in a function, in the DFG preamble.
pub type JumpTables = entity::PrimaryMap<JumpTable, JumpTableData>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types;

    #[test]
    fn inst_data_is_small() {
        // Keeping `InstructionData` small is important for compiler
        // performance; a lot of memory traffic is instruction payloads.
        assert!(core::mem::size_of::<InstructionData>() <= 24);
    }

    #[test]
    fn opcode_properties() {
        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::Jump.is_branch());
        assert!(Opcode::Brif.is_branch());
        assert!(!Opcode::Brif.is_call());
        assert!(Opcode::Return.is_terminator());
        assert!(!Opcode::Return.is_branch());
        assert!(Opcode::Trap.is_terminator());
        assert!(Opcode::ReturnCall.is_terminator());
        assert!(Opcode::ReturnCall.is_call());
        assert!(Opcode::Udiv.can_trap());
        assert!(!Opcode::Iadd.can_trap());
        assert!(Opcode::Iadd.is_pure());
        assert!(!Opcode::Load.is_pure());
        assert!(!Opcode::Call.is_pure());
        assert_eq!(Opcode::Iadd.name(), "iadd");
        assert_eq!(types::I32.to_string(), "i32");
    }

    #[test]
    fn instruction_data() {
        let mut pool = ValueListPool::new();
        let v0 = Value::from_u32(0);
        let v1 = Value::from_u32(1);
        let data = InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [v0, v1],
        };
        assert_eq!(data.opcode(), Opcode::Iadd);
        assert_eq!(data.arguments(&pool), &[v0, v1]);

        let block0 = Block::from_u32(0);
        let call = BlockCall::new(block0, &[v0], &mut pool);
        assert_eq!(call.block(&pool), block0);
        assert_eq!(call.args_slice(&pool), &[v0]);

        let jump = InstructionData::Jump {
            opcode: Opcode::Jump,
            destination: call,
        };
        assert_eq!(jump.branch_destination().len(), 1);
        // Jump block arguments are not value arguments.
        assert_eq!(jump.arguments(&pool), &[]);
    }
}
