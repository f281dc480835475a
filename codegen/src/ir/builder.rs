//! Cursor-based instruction builders.
//!
//! An `InstBuilder` creates an instruction, inserts it at the builder's
//! position and allocates its result values in one step. Each value-
//! producing method returns the instruction's first result; control-flow
//! and store methods return the `Inst` itself.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::immediates::{Ieee32, Ieee64, Imm64, Offset32};
use crate::ir::instructions::{BlockCall, InstructionData};
use crate::ir::{
    Block, Constant, DataFlowGraph, FuncRef, GlobalValue, Inst, JumpTable, MemFlags, Opcode,
    SigRef, StackSlot, TrapCode, Type, Value,
};
use crate::ir::types;

/// Base trait for instruction builders.
///
/// The `InstBuilderBase` trait provides the basic functionality required by
/// the methods of the generic `InstBuilder` trait. An instruction builder
/// must allocate a new instruction, insert it somewhere, and give out
/// mutable DFG access for creating its results.
pub trait InstBuilderBase<'f>: Sized {
    /// Get an immutable reference to the data flow graph that will hold the
    /// constructed instructions.
    fn data_flow_graph(&self) -> &DataFlowGraph;

    /// Get a mutable reference to the data flow graph, for constructing
    /// out-of-line payloads like value lists.
    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert an instruction and return a reference to it, consuming the
    /// builder. The result types are allocated from `ctrl_typevar`.
    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'f mut DataFlowGraph);
}

/// Instruction builder methods, one per opcode.
///
/// Most methods have the same name as the opcode they create. The
/// controlling type is either inferred from the operands or given as an
/// explicit first argument for constants, loads and conversions.
pub trait InstBuilder<'f>: InstBuilderBase<'f> {
    /// Build a one-result instruction and return its result value.
    fn unary_result(self, data: InstructionData, ctrl: Type) -> Value {
        let (inst, dfg) = self.build(data, ctrl);
        dfg.first_result(inst)
    }

    /// `nop`.
    fn nop(self) -> Inst {
        self.build(
            InstructionData::Nullary {
                opcode: Opcode::Nop,
            },
            types::INVALID,
        )
        .0
    }

    /// An integer constant of type `ty`.
    fn iconst(self, ty: Type, imm: impl Into<Imm64>) -> Value {
        self.unary_result(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: imm.into(),
            },
            ty,
        )
    }

    /// A 32-bit floating point constant.
    fn f32const(self, imm: impl Into<Ieee32>) -> Value {
        self.unary_result(
            InstructionData::UnaryIeee32 {
                opcode: Opcode::F32const,
                imm: imm.into(),
            },
            types::F32,
        )
    }

    /// A 64-bit floating point constant.
    fn f64const(self, imm: impl Into<Ieee64>) -> Value {
        self.unary_result(
            InstructionData::UnaryIeee64 {
                opcode: Opcode::F64const,
                imm: imm.into(),
            },
            types::F64,
        )
    }

    /// A vector constant from the pooled constant table.
    fn vconst(self, ty: Type, constant: Constant) -> Value {
        self.unary_result(
            InstructionData::UnaryConst {
                opcode: Opcode::Vconst,
                constant_handle: constant,
            },
            ty,
        )
    }

    /// The value of a global value.
    fn global_value(self, ty: Type, global_value: GlobalValue) -> Value {
        self.unary_result(
            InstructionData::UnaryGlobalValue {
                opcode: Opcode::GlobalValue,
                global_value,
            },
            ty,
        )
    }

    /// Build a binary arithmetic instruction.
    fn binary(self, opcode: Opcode, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        self.unary_result(InstructionData::Binary { opcode, args: [x, y] }, ty)
    }

    /// `iadd`.
    fn iadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Iadd, x, y)
    }

    /// `isub`.
    fn isub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Isub, x, y)
    }

    /// `imul`.
    fn imul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Imul, x, y)
    }

    /// `umulhi`.
    fn umulhi(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Umulhi, x, y)
    }

    /// `smulhi`.
    fn smulhi(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Smulhi, x, y)
    }

    /// `udiv`.
    fn udiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Udiv, x, y)
    }

    /// `sdiv`.
    fn sdiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sdiv, x, y)
    }

    /// `urem`.
    fn urem(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Urem, x, y)
    }

    /// `srem`.
    fn srem(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Srem, x, y)
    }

    /// `band`.
    fn band(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Band, x, y)
    }

    /// `bor`.
    fn bor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bor, x, y)
    }

    /// `bxor`.
    fn bxor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bxor, x, y)
    }

    /// `ishl`.
    fn ishl(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ishl, x, y)
    }

    /// `ushr`.
    fn ushr(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ushr, x, y)
    }

    /// `sshr`.
    fn sshr(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sshr, x, y)
    }

    /// `fadd`.
    fn fadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fadd, x, y)
    }

    /// `fsub`.
    fn fsub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fsub, x, y)
    }

    /// `fmul`.
    fn fmul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fmul, x, y)
    }

    /// `fdiv`.
    fn fdiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fdiv, x, y)
    }

    /// Build a unary instruction whose result has the argument's type.
    fn unary(self, opcode: Opcode, arg: Value) -> Value {
        let ty = self.data_flow_graph().value_type(arg);
        self.unary_result(InstructionData::Unary { opcode, arg }, ty)
    }

    /// `ineg`.
    fn ineg(self, x: Value) -> Value {
        self.unary(Opcode::Ineg, x)
    }

    /// `bnot`.
    fn bnot(self, x: Value) -> Value {
        self.unary(Opcode::Bnot, x)
    }

    /// `clz`.
    fn clz(self, x: Value) -> Value {
        self.unary(Opcode::Clz, x)
    }

    /// `ctz`.
    fn ctz(self, x: Value) -> Value {
        self.unary(Opcode::Ctz, x)
    }

    /// `fneg`.
    fn fneg(self, x: Value) -> Value {
        self.unary(Opcode::Fneg, x)
    }

    /// `fabs`.
    fn fabs(self, x: Value) -> Value {
        self.unary(Opcode::Fabs, x)
    }

    /// `sqrt`.
    fn sqrt(self, x: Value) -> Value {
        self.unary(Opcode::Sqrt, x)
    }

    /// `ceil`.
    fn ceil(self, x: Value) -> Value {
        self.unary(Opcode::Ceil, x)
    }

    /// `floor`.
    fn floor(self, x: Value) -> Value {
        self.unary(Opcode::Floor, x)
    }

    /// `trunc`.
    fn trunc(self, x: Value) -> Value {
        self.unary(Opcode::Trunc, x)
    }

    /// `nearest`.
    fn nearest(self, x: Value) -> Value {
        self.unary(Opcode::Nearest, x)
    }

    /// Build a unary conversion to an explicit result type.
    fn unary_typed(self, opcode: Opcode, ty: Type, arg: Value) -> Value {
        self.unary_result(InstructionData::Unary { opcode, arg }, ty)
    }

    /// `uextend` to the wider type `ty`.
    fn uextend(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Uextend, ty, x)
    }

    /// `sextend` to the wider type `ty`.
    fn sextend(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Sextend, ty, x)
    }

    /// `ireduce` to the narrower type `ty`.
    fn ireduce(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Ireduce, ty, x)
    }

    /// `bitcast` to the same-width type `ty`.
    fn bitcast(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Bitcast, ty, x)
    }

    /// `splat` a scalar into the vector type `ty`.
    fn splat(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Splat, ty, x)
    }

    /// `fpromote` to the wider float type `ty`.
    fn fpromote(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Fpromote, ty, x)
    }

    /// `fdemote` to the narrower float type `ty`.
    fn fdemote(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::Fdemote, ty, x)
    }

    /// `fcvt_to_uint` to the integer type `ty`.
    fn fcvt_to_uint(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::FcvtToUint, ty, x)
    }

    /// `fcvt_to_sint` to the integer type `ty`.
    fn fcvt_to_sint(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::FcvtToSint, ty, x)
    }

    /// `fcvt_from_uint` to the float type `ty`.
    fn fcvt_from_uint(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::FcvtFromUint, ty, x)
    }

    /// `fcvt_from_sint` to the float type `ty`.
    fn fcvt_from_sint(self, ty: Type, x: Value) -> Value {
        self.unary_typed(Opcode::FcvtFromSint, ty, x)
    }

    /// `icmp` producing an `i8` boolean.
    fn icmp(self, cond: IntCC, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        self.unary_result(
            InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                args: [x, y],
                cond,
            },
            ty,
        )
    }

    /// `fcmp` producing an `i8` boolean.
    fn fcmp(self, cond: FloatCC, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        self.unary_result(
            InstructionData::FloatCompare {
                opcode: Opcode::Fcmp,
                args: [x, y],
                cond,
            },
            ty,
        )
    }

    /// `select c, x, y`.
    fn select(self, c: Value, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        self.unary_result(
            InstructionData::Ternary {
                opcode: Opcode::Select,
                args: [c, x, y],
            },
            ty,
        )
    }

    /// A load of type `ty` from `addr + offset`.
    fn load(
        self,
        ty: Type,
        flags: MemFlags,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Value {
        self.unary_result(
            InstructionData::Load {
                opcode: Opcode::Load,
                arg: addr,
                flags,
                offset: offset.into(),
            },
            ty,
        )
    }

    /// A narrow extending load; `opcode` selects the width and extension.
    fn extending_load(
        self,
        opcode: Opcode,
        ty: Type,
        flags: MemFlags,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Value {
        debug_assert!(opcode.can_load());
        self.unary_result(
            InstructionData::Load {
                opcode,
                arg: addr,
                flags,
                offset: offset.into(),
            },
            ty,
        )
    }

    /// A store of `x` to `addr + offset`.
    fn store(
        self,
        flags: MemFlags,
        x: Value,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Inst {
        self.build(
            InstructionData::Store {
                opcode: Opcode::Store,
                args: [x, addr],
                flags,
                offset: offset.into(),
            },
            types::INVALID,
        )
        .0
    }

    /// A narrow truncating store; `opcode` selects the width.
    fn truncating_store(
        self,
        opcode: Opcode,
        flags: MemFlags,
        x: Value,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Inst {
        debug_assert!(opcode.can_store());
        self.build(
            InstructionData::Store {
                opcode,
                args: [x, addr],
                flags,
                offset: offset.into(),
            },
            types::INVALID,
        )
        .0
    }

    /// Load of type `ty` from a stack slot.
    fn stack_load(self, ty: Type, stack_slot: StackSlot, offset: impl Into<Offset32>) -> Value {
        self.unary_result(
            InstructionData::StackLoad {
                opcode: Opcode::StackLoad,
                stack_slot,
                offset: offset.into(),
            },
            ty,
        )
    }

    /// Store `x` to a stack slot.
    fn stack_store(self, x: Value, stack_slot: StackSlot, offset: impl Into<Offset32>) -> Inst {
        self.build(
            InstructionData::StackStore {
                opcode: Opcode::StackStore,
                arg: x,
                stack_slot,
                offset: offset.into(),
            },
            types::INVALID,
        )
        .0
    }

    /// The address of a stack slot, as the pointer type `ty`.
    fn stack_addr(self, ty: Type, stack_slot: StackSlot, offset: impl Into<Offset32>) -> Value {
        self.unary_result(
            InstructionData::StackLoad {
                opcode: Opcode::StackAddr,
                stack_slot,
                offset: offset.into(),
            },
            ty,
        )
    }

    /// The address of the function `func_ref`, as the pointer type `ty`.
    fn func_addr(self, ty: Type, func_ref: FuncRef) -> Value {
        self.unary_result(
            InstructionData::FuncAddr {
                opcode: Opcode::FuncAddr,
                func_ref,
            },
            ty,
        )
    }

    /// Unconditional `jump` to `block` with arguments.
    fn jump(mut self, block: Block, args: &[Value]) -> Inst {
        let destination = self.data_flow_graph_mut().block_call(block, args);
        self.build(
            InstructionData::Jump {
                opcode: Opcode::Jump,
                destination,
            },
            types::INVALID,
        )
        .0
    }

    /// Conditional `brif c, then(args), else(args)`.
    fn brif(
        mut self,
        c: Value,
        block_then: Block,
        args_then: &[Value],
        block_else: Block,
        args_else: &[Value],
    ) -> Inst {
        let then_call = self.data_flow_graph_mut().block_call(block_then, args_then);
        let else_call = self.data_flow_graph_mut().block_call(block_else, args_else);
        self.build(
            InstructionData::Brif {
                opcode: Opcode::Brif,
                arg: c,
                blocks: [then_call, else_call],
            },
            types::INVALID,
        )
        .0
    }

    /// Indirect branch through `table`, indexed by `x`.
    fn br_table(self, x: Value, table: JumpTable) -> Inst {
        self.build(
            InstructionData::BranchTable {
                opcode: Opcode::BrTable,
                arg: x,
                table,
            },
            types::INVALID,
        )
        .0
    }

    /// `return` the given values.
    fn return_(mut self, rvals: &[Value]) -> Inst {
        let args = crate::ir::ValueList::from_slice(
            rvals,
            &mut self.data_flow_graph_mut().value_lists,
        );
        self.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args,
            },
            types::INVALID,
        )
        .0
    }

    /// Direct `call` of `func_ref` with the given arguments.
    fn call(mut self, func_ref: FuncRef, call_args: &[Value]) -> Inst {
        let args = crate::ir::ValueList::from_slice(
            call_args,
            &mut self.data_flow_graph_mut().value_lists,
        );
        self.build(
            InstructionData::Call {
                opcode: Opcode::Call,
                args,
                func_ref,
            },
            types::INVALID,
        )
        .0
    }

    /// Tail `return_call` of `func_ref` with the given arguments.
    fn return_call(mut self, func_ref: FuncRef, call_args: &[Value]) -> Inst {
        let args = crate::ir::ValueList::from_slice(
            call_args,
            &mut self.data_flow_graph_mut().value_lists,
        );
        self.build(
            InstructionData::Call {
                opcode: Opcode::ReturnCall,
                args,
                func_ref,
            },
            types::INVALID,
        )
        .0
    }

    /// Indirect `call_indirect` through the code pointer `callee`.
    fn call_indirect(mut self, sig_ref: SigRef, callee: Value, call_args: &[Value]) -> Inst {
        let mut args = crate::ir::ValueList::default();
        {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            args.push(callee, pool);
            args.extend(call_args.iter().copied(), pool);
        }
        self.build(
            InstructionData::CallIndirect {
                opcode: Opcode::CallIndirect,
                args,
                sig_ref,
            },
            types::INVALID,
        )
        .0
    }

    /// Unconditional `trap`.
    fn trap(self, code: TrapCode) -> Inst {
        self.build(
            InstructionData::Trap {
                opcode: Opcode::Trap,
                code,
            },
            types::INVALID,
        )
        .0
    }

    /// `trapz`: trap when `x` is zero.
    fn trapz(self, x: Value, code: TrapCode) -> Inst {
        self.build(
            InstructionData::CondTrap {
                opcode: Opcode::Trapz,
                arg: x,
                code,
            },
            types::INVALID,
        )
        .0
    }

    /// `trapnz`: trap when `x` is non-zero.
    fn trapnz(self, x: Value, code: TrapCode) -> Inst {
        self.build(
            InstructionData::CondTrap {
                opcode: Opcode::Trapnz,
                arg: x,
                code,
            },
            types::INVALID,
        )
        .0
    }
}

// Anything implementing `InstBuilderBase` gets all the `InstBuilder`
// methods.
impl<'f, T: InstBuilderBase<'f>> InstBuilder<'f> for T {}

/// Builder that replaces an existing instruction in place.
///
/// This is used by the legalizer for simple rewrites: the replacement
/// instruction reuses the result values of the old one, so all uses are
/// transparently redirected.
pub struct ReplaceBuilder<'f> {
    dfg: &'f mut DataFlowGraph,
    inst: Inst,
}

impl<'f> ReplaceBuilder<'f> {
    /// Create a `ReplaceBuilder` that will overwrite `inst`.
    pub fn new(dfg: &'f mut DataFlowGraph, inst: Inst) -> Self {
        Self { dfg, inst }
    }
}

impl<'f> InstBuilderBase<'f> for ReplaceBuilder<'f> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        self.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        self.dfg
    }

    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'f mut DataFlowGraph) {
        // Splat the new instruction on top of the old one.
        self.dfg.insts[self.inst] = data;
        if !self.dfg.has_results(self.inst) {
            // The old result values were either detached or non-existent.
            // Construct new ones.
            self.dfg.make_inst_results(self.inst, ctrl_typevar);
        }
        (self.inst, self.dfg)
    }
}

