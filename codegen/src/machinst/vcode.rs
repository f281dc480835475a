//! This implements the VCode container: a CFG of Insts that have been
//! lowered.
//!
//! VCode is virtual-register code: an instruction in VCode is in "final"
//! machine form, except for the registers, which may still be virtual.
//! The instructions are held in a flat array, with ranges of the array
//! forming basic blocks in emission order. Labels (for branch targets)
//! are indexed by block index: label N is bound at the start of block N.

use crate::ir::{SourceLoc, Type};
use crate::machinst::abi::{ABIMachineSpec, Callee};
use crate::machinst::buffer::{MachBuffer, MachBufferFinalized, MachLabel};
use crate::machinst::reg::{Reg, RegClass, VirtualReg, Writable};
use crate::machinst::{MachInst, MachInstEmit, MachInstEmitState, MachTerminator};
use crate::regalloc::{Edit, ProgPoint, RegAllocResult};
use crate::result::CodegenResult;
use smallvec::SmallVec;

/// Index referring to an instruction in VCode.
pub type InsnIndex = u32;

/// Index referring to a basic block in VCode.
pub type BlockIndex = u32;

/// A function in "VCode" (virtualized-register code) form, after lowering.
/// This is essentially a standard CFG of basic blocks, where each basic
/// block consists of lowered instructions produced by the machine-specific
/// backend.
pub struct VCode<M: ABIMachineSpec> {
    /// Lowered machine instructions in order corresponding to the final
    /// generated machine code.
    insts: Vec<M::I>,

    /// Source locations for each instruction (the span starting at the
    /// instruction's position).
    srclocs: Vec<SourceLoc>,

    /// Block instruction indices: for block `b`, `block_ranges[b]` is the
    /// half-open range of instruction indices.
    block_ranges: Vec<(InsnIndex, InsnIndex)>,

    /// Block successor lists, for liveness computation.
    block_succs: Vec<SmallVec<[BlockIndex; 2]>>,

    /// Entry block index (always 0 in the current lowering).
    entry: BlockIndex,

    /// The type of each virtual register, indexed by vreg index.
    vreg_types: Vec<Type>,

    /// The class of each virtual register.
    vreg_classes: Vec<RegClass>,

    /// ABI object for the function body.
    pub abi: Callee<M>,
}

impl<M: ABIMachineSpec> VCode<M> {
    /// New empty VCode.
    pub fn new(abi: Callee<M>) -> Self {
        Self {
            insts: vec![],
            srclocs: vec![],
            block_ranges: vec![],
            block_succs: vec![],
            entry: 0,
            vreg_types: vec![],
            vreg_classes: vec![],
            abi,
        }
    }

    /// Allocate a fresh virtual register of the given class and type.
    pub fn alloc_vreg(&mut self, class: RegClass, ty: Type) -> VirtualReg {
        let index = self.vreg_types.len() as u32;
        self.vreg_types.push(ty);
        self.vreg_classes.push(class);
        VirtualReg::new(class, index)
    }

    /// The number of virtual registers allocated.
    pub fn num_vregs(&self) -> usize {
        self.vreg_types.len()
    }

    /// The type of a virtual register.
    pub fn vreg_type(&self, vreg: VirtualReg) -> Type {
        self.vreg_types[vreg.index()]
    }

    /// The class of a virtual register.
    pub fn vreg_class(&self, vreg: VirtualReg) -> RegClass {
        self.vreg_classes[vreg.index()]
    }

    /// Begin a new block; instructions pushed from here to the matching
    /// `end_block` belong to it. Blocks must be created in final order.
    pub fn begin_block(&mut self) -> BlockIndex {
        let index = self.block_ranges.len() as BlockIndex;
        let start = self.insts.len() as InsnIndex;
        self.block_ranges.push((start, start));
        self.block_succs.push(SmallVec::new());
        index
    }

    /// Push an instruction onto the current block.
    pub fn push(&mut self, inst: M::I, srcloc: SourceLoc) {
        debug_assert!(!self.block_ranges.is_empty());
        self.insts.push(inst);
        self.srclocs.push(srcloc);
        self.block_ranges.last_mut().unwrap().1 = self.insts.len() as InsnIndex;
    }

    /// Declare a successor of the current block.
    pub fn add_succ(&mut self, succ: BlockIndex) {
        self.block_succs.last_mut().unwrap().push(succ);
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.block_ranges.len()
    }

    /// Number of instructions.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// The entry block.
    pub fn entry(&self) -> BlockIndex {
        self.entry
    }

    /// The instruction-index range of a block.
    pub fn block_range(&self, block: BlockIndex) -> (InsnIndex, InsnIndex) {
        self.block_ranges[block as usize]
    }

    /// The successors of a block.
    pub fn block_succs(&self, block: BlockIndex) -> &[BlockIndex] {
        &self.block_succs[block as usize]
    }

    /// Get an instruction by index.
    pub fn get_inst(&self, index: InsnIndex) -> &M::I {
        &self.insts[index as usize]
    }

    /// Emit the VCode to machine code, applying the register allocation.
    ///
    /// Returns the finalized buffer and the final frame size.
    pub fn emit(
        mut self,
        regalloc: &RegAllocResult,
    ) -> CodegenResult<(MachBufferFinalized, u32)> {
        let mut buffer = MachBuffer::<M::I>::new();
        buffer.reserve_labels_for_blocks(self.num_blocks() as u32);

        // Commit the regalloc's resource usage to the ABI object so the
        // frame layout becomes final.
        self.abi.set_num_spillslots(regalloc.num_spillslots);
        self.abi.set_clobbered(regalloc.clobbered.clone());
        let frame = self.abi.frame_layout().clone();
        let frame_size = frame.frame_size();

        let mut state = <M::I as MachInstEmit>::State::default();
        state.set_frame_layout(frame.clone());

        for block in 0..self.num_blocks() as BlockIndex {
            buffer.bind_label(MachLabel::from_block(block));

            if block == self.entry {
                for inst in self.abi.gen_prologue() {
                    inst.emit(&mut buffer, &mut state);
                }
            }

            let (start, end) = self.block_range(block);
            for index in start..end {
                for edit in regalloc.edits_at(ProgPoint::before(index)) {
                    self.emit_edit(edit, &mut buffer, &mut state);
                }

                let mut inst = self.insts[index as usize].clone();
                let mapper = regalloc.mapper(index);
                inst.map_regs(&mapper);

                // Allocation frequently assigns a move's source and
                // destination the same register; such moves are dropped.
                if let Some((dst, src)) = inst.is_move() {
                    if dst.to_reg() == src {
                        for edit in regalloc.edits_at(ProgPoint::after(index)) {
                            self.emit_edit(edit, &mut buffer, &mut state);
                        }
                        continue;
                    }
                }

                let srcloc = self.srclocs[index as usize];
                if !srcloc.is_default() {
                    buffer.start_srcloc(srcloc);
                }

                if inst.is_term() == MachTerminator::Ret {
                    // The return pseudo-instruction expands into the full
                    // epilogue, which ends in the actual return.
                    for epilogue_inst in self.abi.gen_epilogue() {
                        epilogue_inst.emit(&mut buffer, &mut state);
                    }
                } else {
                    inst.emit(&mut buffer, &mut state);
                }

                if !srcloc.is_default() {
                    buffer.end_srcloc();
                }

                for edit in regalloc.edits_at(ProgPoint::after(index)) {
                    self.emit_edit(edit, &mut buffer, &mut state);
                }
            }

            // Control never falls through past a terminator, so the gap
            // between blocks is a safe island location.
            if buffer.island_needed(
                (end - start + 64).saturating_mul(<M::I as MachInst>::worst_case_size()),
            ) {
                buffer.emit_island();
            }
        }

        let finalized = buffer.finish()?;
        Ok((finalized, frame_size))
    }

    fn emit_edit(
        &self,
        edit: &Edit,
        buffer: &mut MachBuffer<M::I>,
        state: &mut <M::I as MachInstEmit>::State,
    ) {
        match edit {
            Edit::Move { from, to, ty } => {
                let inst = <M::I as MachInst>::gen_move(
                    Writable::from_reg(Reg::Real(*to)),
                    Reg::Real(*from),
                    *ty,
                );
                inst.emit(buffer, state);
            }
            Edit::Spill { from, to_slot, ty } => {
                let inst = self.abi.gen_spill(*to_slot, *from, *ty);
                inst.emit(buffer, state);
            }
            Edit::Reload { from_slot, to, ty } => {
                let inst = self.abi.gen_reload(
                    Writable::from_reg(Reg::Real(*to)),
                    *from_slot,
                    *ty,
                );
                inst.emit(buffer, state);
            }
            Edit::Remat {
                def_inst,
                vreg,
                to,
            } => {
                let mut inst = self.insts[*def_inst as usize].clone();
                let pair = [(*vreg, *to)];
                let mapper = crate::regalloc::InstMapper::from_pairs(&pair);
                inst.map_regs(&mapper);
                inst.emit(buffer, state);
            }
        }
    }

    /// Render the VCode for debugging.
    pub fn pretty_print(&self) -> String {
        use core::fmt::Write;
        let mut s = String::new();
        let mut state = <M::I as MachInstEmit>::State::default();
        for block in 0..self.num_blocks() as BlockIndex {
            writeln!(s, "block{}:", block).unwrap();
            let (start, end) = self.block_range(block);
            for index in start..end {
                writeln!(s, "  {}", self.insts[index as usize].pretty_print(&mut state))
                    .unwrap();
            }
        }
        s
    }
}
