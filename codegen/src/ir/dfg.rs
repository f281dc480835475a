//! Data flow graph tracking instructions, values, and blocks.

use crate::entity::{self, PrimaryMap, SecondaryMap};
use crate::ir::instructions::{BlockCall, InstructionData, JumpTables};
use crate::ir::{
    types, Block, ExtFuncData, FuncRef, Opcode, SigRef, Signature, Type, Value, ValueList,
    ValueListPool,
};
use crate::ir::constant::ConstantPool;
use core::fmt;
use core::ops::{Index, IndexMut};
use smallvec::SmallVec;

/// Storage for instructions within the DFG.
#[derive(Clone, PartialEq, Hash)]
pub struct Insts(PrimaryMap<Inst, InstructionData>);

use crate::ir::Inst;

/// Allow immutable access to instructions via indexing.
impl Index<Inst> for Insts {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        self.0.index(inst)
    }
}

/// Allow mutable access to instructions via indexing.
impl IndexMut<Inst> for Insts {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        self.0.index_mut(inst)
    }
}

/// Storage for basic blocks within the DFG.
#[derive(Clone, PartialEq, Hash)]
pub struct Blocks(PrimaryMap<Block, BlockData>);

impl Blocks {
    /// Create a new basic block.
    pub fn add(&mut self) -> Block {
        self.0.push(BlockData::new())
    }

    /// Get the total number of basic blocks created in this function,
    /// whether they are currently inserted in the layout or not.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the given block reference is valid.
    pub fn is_valid(&self, block: Block) -> bool {
        self.0.is_valid(block)
    }

    /// Iterate over all block keys in order.
    pub fn keys(&self) -> entity::Keys<Block> {
        self.0.keys()
    }
}

impl Index<Block> for Blocks {
    type Output = BlockData;

    fn index(&self, block: Block) -> &BlockData {
        &self.0[block]
    }
}

impl IndexMut<Block> for Blocks {
    fn index_mut(&mut self, block: Block) -> &mut BlockData {
        &mut self.0[block]
    }
}

/// Contents of a basic block.
///
/// Parameters to a basic block are values that dominate everything in the
/// block. All branches to this block must provide matching arguments, and
/// the arguments to the entry block must match the function arguments.
#[derive(Clone, PartialEq, Hash)]
pub struct BlockData {
    /// List of parameters to this block.
    params: ValueList,
}

impl BlockData {
    fn new() -> Self {
        Self {
            params: ValueList::new(),
        }
    }
}

/// A data flow graph defines all instructions and basic blocks in a function
/// as well as the data flow dependencies between them. The DFG also tracks
/// values which can be either instruction results or block parameters.
///
/// The layout of blocks in the function and of instructions in each block is
/// recorded by the `Layout` data structure which forms the other half of the
/// function representation.
#[derive(Clone)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function, including
    /// opcodes and operands. The instructions in this map are not in
    /// program order. That is tracked by `Layout`, along with the block
    /// containing each instruction.
    pub insts: Insts,

    /// List of result values for each instruction.
    ///
    /// This map gets resized automatically by `make_inst()` so it is always
    /// in sync with the primary `insts` map.
    results: SecondaryMap<Inst, ValueList>,

    /// Basic blocks in the function and their parameters.
    ///
    /// This map is not in program order. That is handled by `Layout`, and
    /// so is the sequence of instructions contained in each block.
    pub blocks: Blocks,

    /// Memory pool of value lists.
    ///
    /// The `ValueList` references into this pool appear in many places:
    ///
    /// - Instructions in `insts` that don't have room for their entire
    ///   argument list inline.
    /// - Instruction result values in `results`.
    /// - Block parameters in `blocks`.
    pub value_lists: ValueListPool,

    /// Primary value table with entries for all values.
    values: PrimaryMap<Value, ValueData>,

    /// Function signature table. These signatures are referenced by
    /// indirect call instructions as well as the external function
    /// references.
    pub signatures: PrimaryMap<SigRef, Signature>,

    /// External function references. These are functions that can be
    /// called directly.
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,

    /// Constants used within the function.
    pub constants: ConstantPool,

    /// Jump tables used in this function.
    pub jump_tables: JumpTables,
}

impl DataFlowGraph {
    /// Create a new empty `DataFlowGraph`.
    pub fn new() -> Self {
        Self {
            insts: Insts(PrimaryMap::new()),
            results: SecondaryMap::new(),
            blocks: Blocks(PrimaryMap::new()),
            value_lists: ValueListPool::new(),
            values: PrimaryMap::new(),
            signatures: PrimaryMap::new(),
            ext_funcs: PrimaryMap::new(),
            constants: ConstantPool::new(),
            jump_tables: JumpTables::new(),
        }
    }

    /// Clear everything.
    pub fn clear(&mut self) {
        self.insts.0.clear();
        self.results.clear();
        self.blocks.0.clear();
        self.value_lists.clear();
        self.values.clear();
        self.signatures.clear();
        self.ext_funcs.clear();
        self.constants.clear();
        self.jump_tables.clear();
    }

    /// Get the total number of instructions created in this function,
    /// whether they are currently inserted in the layout or not.
    pub fn num_insts(&self) -> usize {
        self.insts.0.len()
    }

    /// Returns `true` if the given instruction reference is valid.
    pub fn inst_is_valid(&self, inst: Inst) -> bool {
        self.insts.0.is_valid(inst)
    }

    /// Get the total number of basic blocks created in this function,
    /// whether they are currently inserted in the layout or not.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the given block reference is valid.
    pub fn block_is_valid(&self, block: Block) -> bool {
        self.blocks.is_valid(block)
    }

    /// Make a BlockCall, bundling together the block and its arguments.
    pub fn block_call(&mut self, block: Block, args: &[Value]) -> BlockCall {
        BlockCall::new(block, args, &mut self.value_lists)
    }

    /// Get the total number of values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Iterate over all of the values in this DFG, including aliases.
    pub fn values(&self) -> entity::Keys<Value> {
        self.values.keys()
    }
}

/// Where did a value come from?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Value is the n'th result of an instruction.
    Result(Inst, usize),
    /// Value is the n'th parameter to a block.
    Param(Block, usize),
}

impl ValueDef {
    /// Unwrap the instruction where the value was defined, or panic.
    pub fn unwrap_inst(&self) -> Inst {
        self.inst().expect("Value is not an instruction result")
    }

    /// Get the instruction where the value was defined, if any.
    pub fn inst(&self) -> Option<Inst> {
        match *self {
            Self::Result(inst, _) => Some(inst),
            _ => None,
        }
    }

    /// Unwrap the block there the parameter is defined, or panic.
    pub fn unwrap_block(&self) -> Block {
        match *self {
            Self::Param(block, _) => block,
            _ => panic!("Value is not a block parameter"),
        }
    }

    /// Get the number component of this definition.
    ///
    /// When multiple values are defined at the same program point, this
    /// indicates the index of this value.
    pub fn num(self) -> usize {
        match self {
            Self::Result(_, n) | Self::Param(_, n) => n,
        }
    }
}

/// Internal table storage for extended values.
#[derive(Clone, Debug, PartialEq, Hash)]
enum ValueData {
    /// Value is defined by an instruction.
    Inst { ty: Type, num: u16, inst: Inst },

    /// Value is a block parameter.
    Param { ty: Type, num: u16, block: Block },

    /// Value is an alias of another value.
    /// An alias value can't be linked to an instruction or block.
    Alias { ty: Type, original: Value },
}

/// Handling values.
///
/// Values are either block parameters or instruction results.
impl DataFlowGraph {
    /// Allocate an extended value entry.
    fn make_value(&mut self, data: ValueData) -> Value {
        self.values.push(data)
    }

    /// Get the type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        match self.values[v] {
            ValueData::Inst { ty, .. }
            | ValueData::Param { ty, .. }
            | ValueData::Alias { ty, .. } => ty,
        }
    }

    /// Get the definition of a value.
    ///
    /// This is either the instruction that defined it or the block that has
    /// the value as an parameter. Aliases are followed to the original
    /// value.
    pub fn value_def(&self, v: Value) -> ValueDef {
        match self.values[self.resolve_aliases(v)] {
            ValueData::Inst { inst, num, .. } => ValueDef::Result(inst, num as usize),
            ValueData::Param { block, num, .. } => ValueDef::Param(block, num as usize),
            ValueData::Alias { .. } => unreachable!("resolve_aliases returned an alias"),
        }
    }

    /// Determine if `v` is an attached instruction result / block parameter.
    ///
    /// An attached value can't be attached to something else without first
    /// being detached.
    pub fn value_is_attached(&self, v: Value) -> bool {
        use self::ValueData::*;
        match self.values[v] {
            Inst { inst, num, .. } => {
                Some(&v) == self.inst_results(inst).get(num as usize)
            }
            Param { block, num, .. } => {
                Some(&v) == self.block_params(block).get(num as usize)
            }
            Alias { .. } => false,
        }
    }

    /// Resolve value aliases.
    ///
    /// Find the original SSA value that `value` aliases.
    pub fn resolve_aliases(&self, value: Value) -> Value {
        let mut v = value;

        // Note that extended_values may be empty here.
        for _ in 0..=self.values.len() {
            if let ValueData::Alias { original, .. } = self.values[v] {
                v = original;
            } else {
                return v;
            }
        }
        panic!("value alias loop detected for {}", value);
    }

    /// Resolve all aliases among `inst`'s arguments.
    ///
    /// For each argument of inst which is defined by an alias, replace the
    /// alias with the aliased value.
    pub fn resolve_aliases_in_arguments(&mut self, inst: Inst) {
        let mut resolved = SmallVec::<[(usize, Value); 8]>::new();
        for (i, &arg) in self.insts[inst].arguments(&self.value_lists).iter().enumerate() {
            if let ValueData::Alias { .. } = self.values[arg] {
                resolved.push((i, self.resolve_aliases(arg)));
            }
        }
        for (i, v) in resolved {
            self.insts[inst].arguments_mut(&mut self.value_lists)[i] = v;
        }
    }

    /// Turn a value into an alias of another.
    ///
    /// Change the `dest` value to behave as an alias of `src`. This means
    /// that all uses of `dest` will behave as if they used that value
    /// `src`.
    ///
    /// The `dest` value can't be attached to an instruction or block.
    pub fn change_to_alias(&mut self, dest: Value, src: Value) {
        debug_assert!(!self.value_is_attached(dest));
        // Try to create short alias chains by finding the original source
        // value. This also avoids the creation of loops.
        let original = self.resolve_aliases(src);
        debug_assert_ne!(
            dest, original,
            "Aliasing {} to {} would create a loop",
            dest, src
        );
        let ty = self.value_type(original);
        debug_assert_eq!(
            self.value_type(dest),
            ty,
            "Aliasing {} to {} would change its type {} to {}",
            dest,
            src,
            self.value_type(dest),
            ty
        );
        debug_assert_ne!(ty, types::INVALID);

        self.values[dest] = ValueData::Alias { ty, original };
    }

    /// Replace the results of one instruction with aliases to the results
    /// of another.
    ///
    /// Change all the results of `dest_inst` to behave as aliases of
    /// corresponding results of `src_inst`, as if calling
    /// `change_to_alias` for each.
    ///
    /// After calling this instruction, `dest_inst` will have had its
    /// results cleared, so it likely needs to be removed from the graph.
    pub fn replace_with_aliases(&mut self, dest_inst: Inst, src_inst: Inst) {
        debug_assert_ne!(
            dest_inst, src_inst,
            "Replacing {} with itself would create a loop",
            dest_inst
        );
        debug_assert_eq!(
            self.results[dest_inst].len(&self.value_lists),
            self.results[src_inst].len(&self.value_lists),
            "Replacing {} with {} would produce a different number of results.",
            dest_inst,
            src_inst
        );

        for (&dest, &src) in self.results[dest_inst]
            .as_slice(&self.value_lists)
            .iter()
            .zip(self.results[src_inst].as_slice(&self.value_lists))
        {
            let original = src;
            let ty = self.value_type(original);
            debug_assert_eq!(
                self.value_type(dest),
                ty,
                "Aliasing {} to {} would change its type {} to {}",
                dest,
                src,
                self.value_type(dest),
                ty
            );

            self.values[dest] = ValueData::Alias { ty, original };
        }

        self.clear_results(dest_inst);
    }
}

/// Instructions.
impl DataFlowGraph {
    /// Create a new instruction.
    ///
    /// The type of the first result is indicated by `data.ty`. If the
    /// instruction produces multiple results, also call
    /// `make_inst_results` to allocate value table entries.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let n = self.num_insts() + 1;
        self.results.resize(n);
        self.insts.0.push(data)
    }

    /// Get all value arguments on `inst` as a slice.
    pub fn inst_args(&self, inst: Inst) -> &[Value] {
        self.insts[inst].arguments(&self.value_lists)
    }

    /// Get all value arguments on `inst` as a mutable slice.
    pub fn inst_args_mut(&mut self, inst: Inst) -> &mut [Value] {
        self.insts.0[inst].arguments_mut(&mut self.value_lists)
    }

    /// Get the fixed value arguments on `inst` followed by its block-call
    /// arguments, for branch instructions.
    pub fn inst_values<'a>(&'a self, inst: Inst) -> impl Iterator<Item = Value> + 'a {
        let fixed = self.insts[inst].arguments(&self.value_lists).iter().copied();
        let calls = self
            .insts[inst]
            .branch_destination()
            .iter()
            .flat_map(move |call| call.args_slice(&self.value_lists).iter().copied());
        fixed.chain(calls)
    }

    /// Create result values for an instruction that produces multiple
    /// results.
    ///
    /// The result types are determined from the opcode and the controlling
    /// type variable `ctrl_typevar`; for calls they come from the
    /// signature. Returns the number of results produced.
    pub fn make_inst_results(&mut self, inst: Inst, ctrl_typevar: Type) -> usize {
        self.results[inst].clear(&mut self.value_lists);

        let tys = self.result_tys(inst, ctrl_typevar);
        for (num, ty) in tys.into_iter().enumerate() {
            let res = self.make_value(ValueData::Inst {
                ty,
                num: num as u16,
                inst,
            });
            self.results[inst].push(res, &mut self.value_lists);
        }

        self.num_inst_results(inst)
    }

    /// Compute the result types of `inst` given the controlling type.
    fn result_tys(&self, inst: Inst, ctrl_typevar: Type) -> SmallVec<[Type; 2]> {
        let data = &self.insts[inst];
        let opcode = data.opcode();

        // Calls derive their results from the signature.
        let sig = match *data {
            InstructionData::Call { func_ref, .. } => {
                if opcode == Opcode::ReturnCall {
                    None
                } else {
                    Some(self.ext_funcs[func_ref].signature)
                }
            }
            InstructionData::CallIndirect { sig_ref, .. } => Some(sig_ref),
            _ => None,
        };
        if let Some(sig) = sig {
            return self.signatures[sig]
                .returns
                .iter()
                .map(|p| p.value_type)
                .collect();
        }

        use self::Opcode::*;
        match opcode {
            // No results.
            Nop | Store | Istore8 | Istore16 | Istore32 | StackStore | Jump | Brif | BrTable
            | Return | ReturnCall | Trap | Trapz | Trapnz => SmallVec::new(),

            // Comparisons produce a boolean as an i8.
            Icmp | Fcmp => [types::I8].iter().copied().collect(),

            // Everything else produces a single value of the controlling
            // type: the result type for constants, casts, loads and address
            // computations, and the common operand type for arithmetic.
            _ => [ctrl_typevar].iter().copied().collect(),
        }
    }

    /// Get the controlling type variable of `inst`, deriving it from the
    /// value arguments or results. This is the type that determines the
    /// exact operation an opcode performs.
    pub fn ctrl_typevar(&self, inst: Inst) -> Type {
        let data = &self.insts[inst];
        match *data {
            // Result-typed instructions: the first result tells all.
            InstructionData::UnaryImm { .. }
            | InstructionData::UnaryIeee32 { .. }
            | InstructionData::UnaryIeee64 { .. }
            | InstructionData::UnaryConst { .. }
            | InstructionData::UnaryGlobalValue { .. }
            | InstructionData::FuncAddr { .. }
            | InstructionData::StackLoad { .. }
            | InstructionData::Load { .. } => self
                .first_result_opt(inst)
                .map_or(types::INVALID, |v| self.value_type(v)),

            // Unary conversions are typed by their result too.
            InstructionData::Unary { opcode, arg } => match opcode {
                Opcode::Uextend | Opcode::Sextend | Opcode::Ireduce | Opcode::Bitcast
                | Opcode::Fpromote | Opcode::Fdemote | Opcode::FcvtToUint | Opcode::FcvtToSint
                | Opcode::FcvtFromUint | Opcode::FcvtFromSint | Opcode::Splat => self
                    .first_result_opt(inst)
                    .map_or(types::INVALID, |v| self.value_type(v)),
                _ => self.value_type(arg),
            },

            // Comparisons and stores are controlled by their argument type.
            InstructionData::IntCompare { args, .. }
            | InstructionData::FloatCompare { args, .. }
            | InstructionData::Store { args, .. } => self.value_type(args[0]),
            InstructionData::StackStore { arg, .. } => self.value_type(arg),

            // Select is controlled by the type being selected, not the
            // condition.
            InstructionData::Ternary { args, .. } => self.value_type(args[1]),

            InstructionData::Binary { args, .. } => self.value_type(args[0]),

            _ => types::INVALID,
        }
    }

    /// Get the first result of an instruction.
    ///
    /// This function panics if the instruction doesn't have any result.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst]
            .first(&self.value_lists)
            .expect("instruction has no results")
    }

    /// Get the first result of an instruction, if any.
    pub fn first_result_opt(&self, inst: Inst) -> Option<Value> {
        self.results[inst].first(&self.value_lists)
    }

    /// Test if `inst` has any result values currently.
    pub fn has_results(&self, inst: Inst) -> bool {
        !self.results[inst].is_empty()
    }

    /// Return all the results of an instruction.
    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        self.results[inst].as_slice(&self.value_lists)
    }

    /// Get the number of results produced by an instruction.
    pub fn num_inst_results(&self, inst: Inst) -> usize {
        self.results[inst].len(&self.value_lists)
    }

    /// Clear the list of result values from `inst`.
    ///
    /// This leaves `inst` without any result values. New result values can
    /// be created by calling `make_inst_results`.
    pub fn clear_results(&mut self, inst: Inst) {
        self.results[inst].clear(&mut self.value_lists)
    }

    /// Check if `inst` is a branch and return its destinations.
    ///
    /// For `br_table` the destinations live in the jump table; this
    /// flattens both shapes into one slice-of-calls view.
    pub fn branch_destinations(&self, inst: Inst) -> &[BlockCall] {
        match self.insts[inst].branch_table() {
            Some(jt) => self.jump_tables[jt].all_branches(),
            None => self.insts[inst].branch_destination(),
        }
    }

    /// Returns an object that displays `inst`.
    pub fn display_inst(&self, inst: Inst) -> DisplayInst {
        DisplayInst(self, inst)
    }

    /// Create a `ReplaceBuilder` that will replace `inst` with a new
    /// instruction in place.
    pub fn replace(&mut self, inst: Inst) -> crate::ir::ReplaceBuilder {
        crate::ir::ReplaceBuilder::new(self, inst)
    }
}

/// Basic blocks.
impl DataFlowGraph {
    /// Create a new basic block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.add()
    }

    /// Get the number of parameters on a given basic block.
    pub fn num_block_params(&self, block: Block) -> usize {
        self.blocks[block].params.len(&self.value_lists)
    }

    /// Get the parameters on a given basic block.
    pub fn block_params(&self, block: Block) -> &[Value] {
        self.blocks[block].params.as_slice(&self.value_lists)
    }

    /// Append a parameter with type `ty` to `block`.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let param = self.values.next_key();
        let num = self.blocks[block].params.push(param, &mut self.value_lists);
        debug_assert!(num <= u16::MAX as usize, "too many parameters on block");
        self.make_value(ValueData::Param {
            ty,
            num: num as u16,
            block,
        })
    }

    /// Removes `val` from `block`'s parameters by a standard linear time
    /// list removal which preserves ordering. Also updates the values'
    /// data.
    pub fn remove_block_param(&mut self, val: Value) {
        let (block, num) = match self.values[val] {
            ValueData::Param { block, num, .. } => (block, num),
            _ => panic!("{} must be a block parameter", val),
        };
        self.blocks[block]
            .params
            .remove(num as usize, &mut self.value_lists);
        for index in num..(self.num_block_params(block) as u16) {
            let param = self
                .blocks[block]
                .params
                .get(index as usize, &self.value_lists)
                .unwrap();
            match &mut self.values[param] {
                ValueData::Param { num, .. } => *num -= 1,
                _ => panic!("{} must be a block parameter", param),
            }
        }
    }
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Object that can display an instruction.
pub struct DisplayInst<'a>(&'a DataFlowGraph, Inst);

impl<'a> fmt::Display for DisplayInst<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dfg = self.0;
        let inst = self.1;

        if let Some((first, rest)) = dfg.inst_results(inst).split_first() {
            write!(f, "{}", first)?;
            for v in rest {
                write!(f, ", {}", v)?;
            }
            write!(f, " = ")?;
        }

        let data = &dfg.insts[inst];
        write!(f, "{}", data.opcode())?;

        if let Some(cond) = data.cond_code() {
            write!(f, " {}", cond)?;
        } else if let Some(cond) = data.fp_cond_code() {
            write!(f, " {}", cond)?;
        }

        let mut first = true;
        for arg in dfg.inst_args(inst) {
            write!(f, "{} {}", if first { "" } else { "," }, arg)?;
            first = false;
        }
        for dest in data.branch_destination() {
            write!(
                f,
                "{} {}",
                if first { "" } else { "," },
                dest.display(&dfg.value_lists)
            )?;
            first = false;
        }
        if let Some(imm) = data.imm_value() {
            write!(f, "{} {}", if first { "" } else { "," }, imm)?;
        }
        if let Some(code) = data.trap_code() {
            write!(f, "{} {}", if first { "" } else { "," }, code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::*;
    use crate::ir::Opcode;

    #[test]
    fn make_inst() {
        let mut dfg = DataFlowGraph::new();

        let idata = InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 0.into(),
        };
        let inst = dfg.make_inst(idata);
        dfg.make_inst_results(inst, I32);

        assert_eq!(inst.to_string(), "inst0");

        // Immutable reference resolution.
        let immdfg = &dfg;
        assert_eq!(immdfg.num_inst_results(inst), 1);
        let res = immdfg.first_result(inst);
        assert_eq!(immdfg.value_type(res), I32);
        assert_eq!(immdfg.value_def(res), ValueDef::Result(inst, 0));
        assert!(immdfg.value_is_attached(res));
    }

    #[test]
    fn block_params() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        assert_eq!(dfg.num_block_params(block), 0);

        let arg1 = dfg.append_block_param(block, F32);
        let arg2 = dfg.append_block_param(block, I16);
        assert_eq!(dfg.num_block_params(block), 2);
        assert_eq!(dfg.block_params(block), &[arg1, arg2]);
        assert_eq!(dfg.value_type(arg1), F32);
        assert_eq!(dfg.value_type(arg2), I16);
        assert_eq!(dfg.value_def(arg1), ValueDef::Param(block, 0));
        assert_eq!(dfg.value_def(arg2), ValueDef::Param(block, 1));
    }

    #[test]
    fn aliases() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let v0 = dfg.append_block_param(block, I32);
        let v1 = dfg.append_block_param(block, I32);

        // Build an alias chain: v2 -> v1.
        let idata = InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 42.into(),
        };
        let inst = dfg.make_inst(idata);
        dfg.make_inst_results(inst, I32);
        let v2 = dfg.first_result(inst);

        dfg.clear_results(inst);
        dfg.change_to_alias(v2, v1);
        assert_eq!(dfg.resolve_aliases(v2), v1);
        assert_eq!(dfg.resolve_aliases(v1), v1);
        assert_eq!(dfg.resolve_aliases(v0), v0);

        // An alias of an alias resolves to the root.
        let inst2 = dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 7.into(),
        });
        dfg.make_inst_results(inst2, I32);
        let v3 = dfg.first_result(inst2);
        dfg.clear_results(inst2);
        dfg.change_to_alias(v3, v2);
        assert_eq!(dfg.resolve_aliases(v3), v1);
    }
}
