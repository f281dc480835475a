//! Function layout.
//!
//! The order of basic blocks in a function and the order of instructions in
//! a block is determined by the `Layout` data structure defined in this
//! module.

use crate::entity::packed_option::PackedOption;
use crate::entity::SecondaryMap;
use crate::ir::{Block, Inst};
use core::cmp;

/// The `Layout` struct determines the layout of blocks and instructions in
/// a function. It does not contain definitions of instructions or blocks,
/// but depends on `Inst` and `Block` entity references being defined
/// elsewhere.
///
/// This data structure determines:
///
/// - The order of blocks in the function.
/// - Which block contains a given instruction.
/// - The order of instructions with a block.
///
/// While data dependencies are not recorded, instruction ordering does
/// affect control dependencies, so part of the semantics of the program are
/// determined by the layout.
#[derive(Clone)]
pub struct Layout {
    /// Linked list nodes for the layout order of blocks. Forms a doubly
    /// linked list, terminated in both ends by `None`.
    blocks: SecondaryMap<Block, BlockNode>,

    /// Linked list nodes for the layout order of instructions. Forms a
    /// double linked list per block, terminated in both ends by `None`.
    insts: SecondaryMap<Inst, InstNode>,

    /// First block in the layout order, or `None` when no blocks have been
    /// laid out.
    first_block: Option<Block>,

    /// Last block in the layout order, or `None` when no blocks have been
    /// laid out.
    last_block: Option<Block>,
}

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
    seq: SequenceNumber,
    // A block is "inserted" if it is in the linked list. The entity with
    // index 0 is otherwise indistinguishable from a default node.
    inserted: bool,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    /// The block containing this instruction, or `None` if the instruction
    /// is not yet inserted.
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
    seq: SequenceNumber,
}

/// Sequence numbers.
///
/// All instructions and blocks are given a sequence number that can be used
/// to quickly determine their relative position in the layout. The sequence
/// numbers are not contiguous, but are assigned like line numbers in BASIC:
/// 10, 20, 30, ...
///
/// Sequence numbers are strictly increasing within a block, and the block
/// sequence numbers are strictly increasing across the function.
type SequenceNumber = u32;

/// Initial stride assigned to new sequence numbers.
const MAJOR_STRIDE: SequenceNumber = 10;

/// Secondary stride used when renumbering locally.
const MINOR_STRIDE: SequenceNumber = 2;

/// Compute the midpoint between `a` and `b`.
/// Return `None` if the midpoint would be equal to either.
fn midpoint(a: SequenceNumber, b: SequenceNumber) -> Option<SequenceNumber> {
    debug_assert!(a < b);
    // Avoid integer overflow.
    let m = a + (b - a) / 2;
    if m > a {
        Some(m)
    } else {
        None
    }
}

impl Layout {
    /// Create a new empty `Layout`.
    pub fn new() -> Self {
        Self {
            blocks: SecondaryMap::new(),
            insts: SecondaryMap::new(),
            first_block: None,
            last_block: None,
        }
    }

    /// Clear the layout.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.insts.clear();
        self.first_block = None;
        self.last_block = None;
    }

    /// Compare the program order of two entities: an instruction and/or a
    /// block header. A block header sorts before any instruction in that
    /// block.
    pub fn pp_cmp(&self, a_seq: u32, b_seq: u32) -> cmp::Ordering {
        a_seq.cmp(&b_seq)
    }

    /// Get the sequence number of an instruction, for program-order
    /// comparisons within the same block.
    pub fn inst_seq(&self, inst: Inst) -> u32 {
        self.insts[inst].seq
    }

    /// Get the sequence number of a block header.
    pub fn block_seq(&self, block: Block) -> u32 {
        self.blocks[block].seq
    }

    /// Compare the program order of two instructions.
    pub fn inst_cmp(&self, a: Inst, b: Inst) -> cmp::Ordering {
        self.insts[a].seq.cmp(&self.insts[b].seq)
    }

    /// Full renumbering of the layout, restoring the major stride.
    ///
    /// This is only called when a local renumbering ran out of headroom;
    /// renumbering the whole function restores the invariant cheaply since
    /// it happens so rarely.
    fn full_renumber(&mut self) {
        let mut seq = 0;
        let mut next_block = self.first_block;
        while let Some(block) = next_block {
            self.blocks[block].seq = seq;
            seq += MAJOR_STRIDE;
            let mut next_inst = self.blocks[block].first_inst.expand();
            while let Some(inst) = next_inst {
                self.insts[inst].seq = seq;
                seq += MAJOR_STRIDE;
                next_inst = self.insts[inst].next.expand();
            }
            next_block = self.blocks[block].next.expand();
        }
        trace!("Renumbered program layout");
    }

    /// Assign a seq to `block` between its neighbors, renumbering if the
    /// available gap is exhausted.
    fn assign_block_seq(&mut self, block: Block) {
        let prev_seq = self.blocks[block]
            .prev
            .map(|prev| self.last_seq_in_block(prev))
            .unwrap_or(0);

        let next_seq = if let Some(inst) = self.blocks[block].first_inst.expand() {
            self.insts[inst].seq
        } else if let Some(next) = self.blocks[block].next.expand() {
            self.blocks[next].seq
        } else {
            self.blocks[block].seq = prev_seq + MAJOR_STRIDE;
            return;
        };

        match midpoint(prev_seq, next_seq) {
            Some(seq) => self.blocks[block].seq = seq,
            None => self.full_renumber(),
        }
    }

    /// Assign a seq to `inst` between its neighbors, renumbering if the
    /// available gap is exhausted.
    fn assign_inst_seq(&mut self, inst: Inst) {
        let block = self
            .inst_block(inst)
            .expect("inst must be inserted before assigning a seq");

        let prev_seq = match self.insts[inst].prev.expand() {
            Some(prev) => self.insts[prev].seq,
            None => self.blocks[block].seq,
        };

        let next_seq = if let Some(next) = self.insts[inst].next.expand() {
            self.insts[next].seq
        } else if let Some(next_block) = self.blocks[block].next.expand() {
            self.blocks[next_block].seq
        } else {
            self.insts[inst].seq = prev_seq + MINOR_STRIDE;
            return;
        };

        match midpoint(prev_seq, next_seq) {
            Some(seq) => self.insts[inst].seq = seq,
            None => self.full_renumber(),
        }
    }

    /// The last sequence number used inside `block`, or its header seq if
    /// the block is empty.
    fn last_seq_in_block(&self, block: Block) -> SequenceNumber {
        self.blocks[block]
            .last_inst
            .map(|inst| self.insts[inst].seq)
            .unwrap_or(self.blocks[block].seq)
    }
}

/// Methods for laying out blocks.
///
/// An unknown block starts out as *not inserted* in the block layout. The
/// layout is a linear order of inserted blocks. Once a block has been
/// inserted in the layout, instructions can be added.
impl Layout {
    /// Is `block` currently part of the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.blocks.get(block).map_or(false, |n| n.inserted)
    }

    /// Insert `block` as the last block in the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot append block that is already in the layout"
        );
        {
            let node = &mut self.blocks[block];
            debug_assert!(node.first_inst.is_none() && node.last_inst.is_none());
            node.inserted = true;
            node.prev = self.last_block.into();
            node.next = None.into();
        }
        if let Some(last) = self.last_block {
            self.blocks[last].next = block.into();
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
        self.assign_block_seq(block);
    }

    /// Insert `block` in the layout before the existing block `before`.
    pub fn insert_block(&mut self, block: Block, before: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(before),
            "block preceding insertion point must be in the layout"
        );
        let after = self.blocks[before].prev;
        {
            let node = &mut self.blocks[block];
            node.inserted = true;
            node.next = before.into();
            node.prev = after;
        }
        self.blocks[before].prev = block.into();
        match after.expand() {
            None => self.first_block = Some(block),
            Some(a) => self.blocks[a].next = block.into(),
        }
        self.assign_block_seq(block);
    }

    /// Insert `block` in the layout *after* the existing block `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(after),
            "block preceding insertion point must be in the layout"
        );
        let before = self.blocks[after].next;
        {
            let node = &mut self.blocks[block];
            node.inserted = true;
            node.next = before;
            node.prev = after.into();
        }
        self.blocks[after].next = block.into();
        match before.expand() {
            None => self.last_block = Some(block),
            Some(b) => self.blocks[b].prev = block.into(),
        }
        self.assign_block_seq(block);
    }

    /// Remove `block` from the layout.
    ///
    /// The block must be empty.
    pub fn remove_block(&mut self, block: Block) {
        debug_assert!(self.is_block_inserted(block), "block not in the layout");
        debug_assert!(self.first_inst(block).is_none(), "block must be empty.");

        // Clear the `block` node and extract links.
        let prev;
        let next;
        {
            let n = &mut self.blocks[block];
            prev = n.prev;
            next = n.next;
            n.prev = None.into();
            n.next = None.into();
            n.inserted = false;
        }
        // Fix up links to `block`.
        match prev.expand() {
            None => self.first_block = next.expand(),
            Some(p) => self.blocks[p].next = next,
        }
        match next.expand() {
            None => self.last_block = prev.expand(),
            Some(n) => self.blocks[n].prev = prev,
        }
    }

    /// Return an iterator over all blocks in layout order.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            layout: self,
            next: self.first_block,
        }
    }

    /// Get the function's entry block. This is simply the first block in
    /// the layout order.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    /// Get the last block in the layout.
    pub fn last_block(&self) -> Option<Block> {
        self.last_block
    }

    /// Get the block preceding `block` in the layout order.
    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }

    /// Get the block following `block` in the layout order.
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }
}

/// An iterator over the blocks in a function, in layout order.
pub struct Blocks<'f> {
    layout: &'f Layout,
    next: Option<Block>,
}

impl<'f> Iterator for Blocks<'f> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        match self.next {
            Some(block) => {
                self.next = self.layout.next_block(block);
                Some(block)
            }
            None => None,
        }
    }
}

/// Use a layout reference in a for loop.
impl<'f> IntoIterator for &'f Layout {
    type Item = Block;
    type IntoIter = Blocks<'f>;

    fn into_iter(self) -> Blocks<'f> {
        self.blocks()
    }
}

/// Methods for arranging instructions.
///
/// An instruction starts out as *not inserted* in the layout. An
/// instruction can be inserted into a block at a given position.
impl Layout {
    /// Get the block containing `inst`, or `None` if `inst` is not
    /// inserted in the layout.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts.get(inst).and_then(|n| n.block.expand())
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert_eq!(self.inst_block(inst), None);
        debug_assert!(
            self.is_block_inserted(block),
            "Cannot append instructions to block not in layout"
        );
        {
            let block_node = &mut self.blocks[block];
            {
                let inst_node = &mut self.insts[inst];
                inst_node.block = block.into();
                inst_node.prev = block_node.last_inst;
                debug_assert!(inst_node.next.is_none());
            }
            if block_node.first_inst.is_none() {
                block_node.first_inst = inst.into();
            } else {
                self.insts[block_node.last_inst.unwrap()].next = inst.into();
            }
            block_node.last_inst = inst.into();
        }
        self.assign_inst_seq(inst);
    }

    /// Fetch a block's first instruction.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.into()
    }

    /// Fetch a block's last instruction.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.into()
    }

    /// Fetch the instruction following `inst`.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// Fetch the instruction preceding `inst`.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Insert `inst` before the instruction `before` in the same block.
    pub fn insert_inst(&mut self, inst: Inst, before: Inst) {
        debug_assert_eq!(self.inst_block(inst), None);
        let block = self
            .inst_block(before)
            .expect("Instruction before insertion point not in the layout");
        let after = self.insts[before].prev;
        {
            let inst_node = &mut self.insts[inst];
            inst_node.block = block.into();
            inst_node.next = before.into();
            inst_node.prev = after;
        }
        self.insts[before].prev = inst.into();
        match after.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(a) => self.insts[a].next = inst.into(),
        }
        self.assign_inst_seq(inst);
    }

    /// Remove `inst` from the layout.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("Instruction already removed.");
        // Clear the `inst` node and extract links.
        let prev;
        let next;
        {
            let n = &mut self.insts[inst];
            prev = n.prev;
            next = n.next;
            n.block = None.into();
            n.prev = None.into();
            n.next = None.into();
        }
        // Fix up links to `inst`.
        match prev.expand() {
            None => self.blocks[block].first_inst = next,
            Some(p) => self.insts[p].next = next,
        }
        match next.expand() {
            None => self.blocks[block].last_inst = prev,
            Some(n) => self.insts[n].prev = prev,
        }
    }

    /// Iterate over the instructions in `block` in layout order.
    pub fn block_insts(&self, block: Block) -> Insts {
        Insts {
            layout: self,
            head: self.blocks[block].first_inst.into(),
            tail: self.blocks[block].last_inst.into(),
        }
    }
}

/// Iterate over instructions in a block in layout order. See
/// `Layout::block_insts()`.
pub struct Insts<'f> {
    layout: &'f Layout,
    head: Option<Inst>,
    tail: Option<Inst>,
}

impl<'f> Iterator for Insts<'f> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let rval = self.head;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.head = self.layout.next_inst(inst);
            }
        }
        rval
    }
}

impl<'f> DoubleEndedIterator for Insts<'f> {
    fn next_back(&mut self) -> Option<Inst> {
        let rval = self.tail;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.tail = self.layout.prev_inst(inst);
            }
        }
        rval
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    fn verify(layout: &mut Layout, blocks: &[(Block, &[Inst])]) {
        // Check that blocks are inserted and instructions belong to the
        // right places.
        let mut seen_blocks = vec![];
        for &(block, insts) in blocks {
            assert!(layout.is_block_inserted(block));
            seen_blocks.push(block);
            let got: Vec<Inst> = layout.block_insts(block).collect();
            assert_eq!(got.as_slice(), insts);
            for &inst in insts {
                assert_eq!(layout.inst_block(inst), Some(block));
            }
            // Reverse iteration too.
            let mut rev: Vec<Inst> = layout.block_insts(block).rev().collect();
            rev.reverse();
            assert_eq!(rev.as_slice(), insts);
        }
        let got_blocks: Vec<Block> = layout.blocks().collect();
        assert_eq!(got_blocks, seen_blocks);
    }

    #[test]
    fn append_block() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let e2 = Block::new(2);

        assert!(!layout.is_block_inserted(e0));

        layout.append_block(e1);
        assert!(layout.is_block_inserted(e1));
        assert_eq!(layout.entry_block(), Some(e1));
        layout.append_block(e2);
        layout.append_block(e0);
        verify(&mut layout, &[(e1, &[]), (e2, &[]), (e0, &[])]);
    }

    #[test]
    fn insert_block() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let e2 = Block::new(2);

        layout.append_block(e1);
        layout.insert_block(e2, e1);
        layout.insert_block(e0, e1);
        verify(&mut layout, &[(e2, &[]), (e0, &[]), (e1, &[])]);

        // Sequence numbers respect the new order.
        assert!(layout.block_seq(e2) < layout.block_seq(e0));
        assert!(layout.block_seq(e0) < layout.block_seq(e1));
    }

    #[test]
    fn insert_block_after() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let e2 = Block::new(2);

        layout.append_block(e1);
        layout.insert_block_after(e2, e1);
        layout.insert_block_after(e0, e1);
        verify(&mut layout, &[(e1, &[]), (e0, &[]), (e2, &[])]);
    }

    #[test]
    fn append_inst() {
        let mut layout = Layout::new();
        let e1 = Block::new(1);
        layout.append_block(e1);

        let v: Vec<Inst> = layout.block_insts(e1).collect();
        assert_eq!(v, []);

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);

        assert_eq!(layout.inst_block(i0), None);

        layout.append_inst(i1, e1);
        layout.append_inst(i2, e1);
        layout.append_inst(i0, e1);
        verify(&mut layout, &[(e1, &[i1, i2, i0])]);

        assert!(layout.inst_seq(i1) < layout.inst_seq(i2));
        assert!(layout.inst_seq(i2) < layout.inst_seq(i0));
        assert_eq!(layout.first_inst(e1), Some(i1));
        assert_eq!(layout.last_inst(e1), Some(i0));
    }

    #[test]
    fn insert_and_remove_inst() {
        let mut layout = Layout::new();
        let e1 = Block::new(1);
        layout.append_block(e1);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);

        layout.append_inst(i1, e1);
        layout.insert_inst(i2, i1);
        layout.insert_inst(i0, i1);
        verify(&mut layout, &[(e1, &[i2, i0, i1])]);
        assert!(layout.inst_seq(i2) < layout.inst_seq(i0));
        assert!(layout.inst_seq(i0) < layout.inst_seq(i1));

        layout.remove_inst(i0);
        verify(&mut layout, &[(e1, &[i2, i1])]);
        assert_eq!(layout.inst_block(i0), None);

        layout.remove_inst(i2);
        layout.remove_inst(i1);
        verify(&mut layout, &[(e1, &[])]);

        layout.remove_block(e1);
        assert!(!layout.is_block_inserted(e1));
        assert_eq!(layout.blocks().next(), None);
    }

    #[test]
    fn renumbering() {
        // Pack many instructions in front of an existing one to force a
        // full renumbering, and check that order survives.
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        layout.append_block(e0);
        let last = Inst::new(0);
        layout.append_inst(last, e0);

        let mut expected = vec![];
        for i in 1..100 {
            let inst = Inst::new(i);
            layout.insert_inst(inst, last);
            expected.push(inst);
        }
        expected.push(last);

        let got: Vec<Inst> = layout.block_insts(e0).collect();
        assert_eq!(got, expected);
        for pair in got.windows(2) {
            assert!(layout.inst_seq(pair[0]) < layout.inst_seq(pair[1]));
        }
    }
}
