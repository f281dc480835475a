//! Intermediate representation of a function.
//!
//! The `Function` struct defined in this module owns all of its basic
//! blocks and instructions.

use crate::entity::{PrimaryMap, SecondaryMap};
use crate::ir::{
    Block, DataFlowGraph, ExtFuncData, ExternalName, FuncRef, GlobalValue, GlobalValueData, Inst,
    JumpTable, JumpTableData, Layout, SigRef, Signature, SourceLoc, StackSlot, StackSlotData,
    StackSlots,
};
use core::fmt;

/// A function.
///
/// Functions can be cloned, but it is not a very fast operation. The
/// clone will have all the same entity numbers as the original.
#[derive(Clone)]
pub struct Function {
    /// Name of this function. Mostly used by `.clif` files.
    pub name: ExternalName,

    /// Signature of this function.
    pub signature: Signature,

    /// Stack slots allocated in this function.
    pub stack_slots: StackSlots,

    /// Global values referenced.
    pub global_values: PrimaryMap<GlobalValue, GlobalValueData>,

    /// Data flow graph containing the primary definition of all
    /// instructions, blocks and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,

    /// Source locations.
    ///
    /// Track the original source location for each instruction. The source
    /// locations are not interpreted by the compiler, only preserved.
    pub srclocs: SecondaryMap<Inst, SourceLoc>,
}

impl Function {
    /// Create a function with the given name and signature.
    pub fn with_name_signature(name: ExternalName, signature: Signature) -> Self {
        Self {
            name,
            signature,
            stack_slots: StackSlots::new(),
            global_values: PrimaryMap::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            srclocs: SecondaryMap::new(),
        }
    }

    /// Create a new empty, anonymous function with a default calling
    /// convention.
    pub fn new() -> Self {
        Self::with_name_signature(
            ExternalName::default(),
            Signature::new(crate::isa::CallConv::Fast),
        )
    }

    /// Clear all data structures in this function.
    pub fn clear(&mut self) {
        self.signature.params.clear();
        self.signature.returns.clear();
        self.stack_slots.clear();
        self.global_values.clear();
        self.dfg.clear();
        self.layout.clear();
        self.srclocs.clear();
    }

    /// Creates a stack slot in the function, to be used by `stack_load`,
    /// `stack_store` and `stack_addr` instructions.
    pub fn create_stack_slot(&mut self, data: StackSlotData) -> StackSlot {
        self.stack_slots.push(data)
    }

    /// Adds a signature which can later be used to declare an external
    /// function import.
    pub fn import_signature(&mut self, signature: Signature) -> SigRef {
        self.dfg.signatures.push(signature)
    }

    /// Declare an external function import.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.dfg.ext_funcs.push(data)
    }

    /// Declares a global value accessible to the function.
    pub fn create_global_value(&mut self, data: GlobalValueData) -> GlobalValue {
        self.global_values.push(data)
    }

    /// Creates a jump table in the function, to be used by `br_table`
    /// instructions.
    pub fn create_jump_table(&mut self, data: JumpTableData) -> JumpTable {
        self.dfg.jump_tables.push(data)
    }

    /// Checks that the specified block can be encountered by the control
    /// flow graph: either it is the entry block, or it has predecessors in
    /// the layout.
    pub fn is_block_basic(&self, block: Block) -> bool {
        self.layout.is_block_inserted(block)
    }

    /// Return an object that can display this function with correct ISA-
    /// specific annotations.
    pub fn display(&self) -> DisplayFunction {
        DisplayFunction(self)
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper type capable of displaying a `Function`.
pub struct DisplayFunction<'a>(&'a Function);

impl<'a> fmt::Display for DisplayFunction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let func = self.0;
        writeln!(f, "function {}{} {{", func.name, func.signature)?;
        for (ss, data) in func.stack_slots.iter() {
            writeln!(f, "    {} = {}", ss, data)?;
        }
        for block in func.layout.blocks() {
            write!(f, "{}", block)?;
            let params = func.dfg.block_params(block);
            if !params.is_empty() {
                write!(f, "(")?;
                for (i, &param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", param, func.dfg.value_type(param))?;
                }
                write!(f, ")")?;
            }
            writeln!(f, ":")?;
            for inst in func.layout.block_insts(block) {
                writeln!(f, "    {}", func.dfg.display_inst(inst))?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.display(), f)
    }
}
