//! Cursor library.
//!
//! This module defines cursor data types that can be used for inserting
//! instructions in a function.

use crate::ir;
use crate::ir::{Block, DataFlowGraph, Function, Inst, InstructionData, Type};

/// The possible positions of a cursor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Cursor is not pointing anywhere. No instructions can be inserted.
    Nowhere,
    /// Cursor is pointing at an existing instruction.
    /// New instructions will be inserted *before* the current instruction.
    At(Inst),
    /// Cursor is before the beginning of a block. No instructions can be
    /// inserted. Calling `next_inst()` will move to the first instruction
    /// in the block.
    Before(Block),
    /// Cursor is pointing after the end of a block.
    /// New instructions will be appended to the block.
    After(Block),
}

/// A generic function cursor.
///
/// The `FuncCursor` points at instructions in a function, and it can insert
/// new instructions at the cursor position through the `ins()` builder.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    /// The function being edited.
    pub func: &'f mut Function,
}

impl<'f> FuncCursor<'f> {
    /// Create a new `FuncCursor` pointing nowhere.
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            func,
        }
    }

    /// Get the current cursor position.
    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    /// Set the current position.
    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    /// Rebuild this cursor positioned at `inst`.
    pub fn at_inst(mut self, inst: Inst) -> Self {
        self.goto_inst(inst);
        self
    }

    /// Rebuild this cursor positioned at the first insertion point for
    /// `block`.
    pub fn at_first_insertion_point(mut self, block: Block) -> Self {
        self.goto_first_insertion_point(block);
        self
    }

    /// Rebuild this cursor positioned at the bottom of `block`.
    pub fn at_bottom(mut self, block: Block) -> Self {
        self.goto_bottom(block);
        self
    }

    /// Get the block corresponding to the current position.
    pub fn current_block(&self) -> Option<Block> {
        use self::CursorPosition::*;
        match self.pos {
            Nowhere => None,
            At(inst) => self.func.layout.inst_block(inst),
            Before(block) | After(block) => Some(block),
        }
    }

    /// Get the instruction corresponding to the current position, if any.
    pub fn current_inst(&self) -> Option<Inst> {
        use self::CursorPosition::*;
        match self.pos {
            At(inst) => Some(inst),
            _ => None,
        }
    }

    /// Go to a specific instruction which must be inserted in the layout.
    /// New instructions will be inserted before `inst`.
    pub fn goto_inst(&mut self, inst: Inst) {
        debug_assert!(self.func.layout.inst_block(inst).is_some());
        self.pos = CursorPosition::At(inst);
    }

    /// Go to the position for inserting instructions at the beginning of
    /// `block`, after any block parameters.
    pub fn goto_first_insertion_point(&mut self, block: Block) {
        if let Some(inst) = self.func.layout.first_inst(block) {
            self.goto_inst(inst);
        } else {
            self.goto_bottom(block);
        }
    }

    /// Go to the bottom of `block` where instructions will be appended.
    pub fn goto_bottom(&mut self, block: Block) {
        debug_assert!(self.func.layout.is_block_inserted(block));
        self.pos = CursorPosition::After(block);
    }

    /// Go to the top of `block`, before its first instruction.
    pub fn goto_top(&mut self, block: Block) {
        debug_assert!(self.func.layout.is_block_inserted(block));
        self.pos = CursorPosition::Before(block);
    }

    /// Move to the next instruction in the same block and return it.
    ///
    /// - If the cursor was positioned before a block, go to the first
    ///   instruction in that block.
    /// - If there are no more instructions in the block, go to the `After`
    ///   position and return `None`.
    /// - If the cursor was pointing nowhere, keep doing that.
    pub fn next_inst(&mut self) -> Option<Inst> {
        use self::CursorPosition::*;
        match self.pos {
            Nowhere | After(..) => None,
            At(inst) => {
                if let Some(next) = self.func.layout.next_inst(inst) {
                    self.pos = At(next);
                    Some(next)
                } else {
                    self.pos = After(
                        self.func
                            .layout
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    None
                }
            }
            Before(block) => {
                if let Some(next) = self.func.layout.first_inst(block) {
                    self.pos = At(next);
                    Some(next)
                } else {
                    self.pos = After(block);
                    None
                }
            }
        }
    }

    /// Move to the next block in layout order and return it.
    pub fn next_block(&mut self) -> Option<Block> {
        let next = if let Some(block) = self.current_block() {
            self.func.layout.next_block(block)
        } else {
            self.func.layout.entry_block()
        };
        self.pos = match next {
            Some(block) => CursorPosition::Before(block),
            None => CursorPosition::Nowhere,
        };
        next
    }

    /// Move to the previous instruction in the same block and return it.
    ///
    /// - If the cursor was positioned after a block, go to the last
    ///   instruction in that block.
    /// - If there are no more instructions in the block, go to the
    ///   `Before` position and return `None`.
    pub fn prev_inst(&mut self) -> Option<Inst> {
        use self::CursorPosition::*;
        match self.pos {
            Nowhere | Before(..) => None,
            At(inst) => {
                if let Some(prev) = self.func.layout.prev_inst(inst) {
                    self.pos = At(prev);
                    Some(prev)
                } else {
                    self.pos = Before(
                        self.func
                            .layout
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    None
                }
            }
            After(block) => {
                if let Some(last) = self.func.layout.last_inst(block) {
                    self.pos = At(last);
                    Some(last)
                } else {
                    self.pos = Before(block);
                    None
                }
            }
        }
    }

    /// Remove the instruction under the cursor.
    ///
    /// The cursor is left pointing at the position following the current
    /// instruction.
    pub fn remove_inst(&mut self) -> Inst {
        let inst = self.current_inst().expect("not at an instruction");
        self.next_inst();
        self.func.layout.remove_inst(inst);
        inst
    }

    /// Remove the instruction under the cursor.
    ///
    /// The cursor is left pointing at the position preceding the current
    /// instruction.
    pub fn remove_inst_and_step_back(&mut self) -> Inst {
        let inst = self.current_inst().expect("not at an instruction");
        self.prev_inst();
        self.func.layout.remove_inst(inst);
        inst
    }

    /// Insert an instruction at the current position and allocate its
    /// results via the returned builder.
    pub fn ins<'c>(&'c mut self) -> InsertBuilder<'c, 'f> {
        InsertBuilder { cursor: self }
    }
}

/// An instruction builder that inserts an instruction at the current
/// cursor position.
pub struct InsertBuilder<'c, 'f: 'c> {
    cursor: &'c mut FuncCursor<'f>,
}

impl<'c, 'f> ir::InstBuilderBase<'c> for InsertBuilder<'c, 'f> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        &self.cursor.func.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        &mut self.cursor.func.dfg
    }

    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'c mut DataFlowGraph) {
        let inst = self.cursor.func.dfg.make_inst(data);
        self.cursor.func.dfg.make_inst_results(inst, ctrl_typevar);
        match self.cursor.pos {
            CursorPosition::Nowhere => panic!("Invalid insertion position"),
            CursorPosition::At(cur) => self.cursor.func.layout.insert_inst(inst, cur),
            CursorPosition::Before(block) => {
                if let Some(first) = self.cursor.func.layout.first_inst(block) {
                    self.cursor.func.layout.insert_inst(inst, first)
                } else {
                    self.cursor.func.layout.append_inst(inst, block)
                }
            }
            CursorPosition::After(block) => self.cursor.func.layout.append_inst(inst, block),
        }
        (inst, &mut self.cursor.func.dfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::I32;
    use crate::ir::InstBuilder;

    #[test]
    fn insert_and_walk() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);

        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let a = pos.ins().iconst(I32, 1);
            let b = pos.ins().iconst(I32, 2);
            pos.ins().iadd(a, b);
        }

        let insts: Vec<Inst> = func.layout.block_insts(block0).collect();
        assert_eq!(insts.len(), 3);

        // Walk with the cursor and insert before the add.
        let mut pos = FuncCursor::new(&mut func);
        pos.next_block();
        let mut count = 0;
        while pos.next_inst().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
