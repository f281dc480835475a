//! This module implements lowering (instruction selection) from IR to
//! machine instructions with virtual registers.
//!
//! Lowering walks the blocks in layout order, and the instructions within
//! each block bottom-up. Bottom-up order lets a rule *merge* the
//! instruction producing an operand into the consuming instruction (for
//! example, folding a constant shift into an add on AArch64) and skip the
//! producer entirely when the merged use was its only one. The generated
//! machine instructions for each IR instruction are staged and the groups
//! reversed at the end of the block, restoring forward order.
//!
//! Calls, returns, jumps and block-parameter moves are handled here
//! generically via the ABI objects; everything else is dispatched to the
//! target's `LowerBackend::lower` rules.

use crate::entity::{EntitySet, SecondaryMap};
use crate::ir::{
    Block, ExternalName, Function, Inst as IRInst, InstructionData, Opcode, Signature, Type,
    Value, ValueDef,
};
use crate::ir::types;
use crate::machinst::abi::{ABIMachineSpec, CallDest, Callee, CallSite};
use crate::machinst::buffer::MachLabel;
use crate::machinst::reg::{Reg, RegClass, Writable};
use crate::machinst::valueregs::ValueRegs;
use crate::machinst::vcode::{BlockIndex, VCode};
use crate::machinst::MachInst;
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;

/// Trait implemented by each machine backend: the lowering rules.
pub trait LowerBackend {
    /// The ABI/instruction family this backend targets.
    type M: ABIMachineSpec;

    /// Lower a single non-branch instruction.
    ///
    /// Returns an error if no rule matched; for legal input this is a
    /// backend bug.
    fn lower(&self, ctx: &mut Lower<Self::M>, inst: IRInst) -> CodegenResult<()>;

    /// Lower a branch terminator. `targets` holds one label per
    /// destination, in the order of `branch_destinations`.
    fn lower_branch(
        &self,
        ctx: &mut Lower<Self::M>,
        inst: IRInst,
        targets: &[MachLabel],
    ) -> CodegenResult<()>;
}

/// What an instruction input looks like to a lowering rule: the producing
/// instruction if it can be merged, and/or the constant value.
#[derive(Clone, Copy, Debug)]
pub struct NonRegInput {
    /// The producing instruction and output index, if the producer may be
    /// merged into the consumer (it is pure, in the same block, and this
    /// is its only use).
    pub inst: Option<(IRInst, usize)>,
    /// The constant bits, if the value is produced by a constant
    /// instruction.
    pub constant: Option<u64>,
}

/// Machine-independent lowering driver. Passed to backend rules as their
/// window onto the IR and the growing VCode.
pub struct Lower<'func, M: ABIMachineSpec> {
    /// The function to lower.
    pub f: &'func Function,

    /// The VCode under construction.
    vcode: VCode<M>,

    /// Mapping from IR value to assigned virtual registers.
    value_regs: SecondaryMap<Value, ValueRegs<Reg>>,

    /// Remaining-use counts per value, used for dead-code skipping and
    /// unique-use merging decisions.
    value_uses: SecondaryMap<Value, u32>,

    /// Instructions that were merged into their consumer and must not be
    /// separately lowered.
    merged: EntitySet<IRInst>,

    /// IR blocks in layout order; index in this list == VCode block index
    /// == MachLabel index.
    block_order: Vec<Block>,

    /// Inverse of `block_order`.
    block_index: SecondaryMap<Block, u32>,

    /// Machine instructions staged for the IR instruction currently being
    /// lowered.
    ir_insts: Vec<M::I>,

    /// The IR instruction currently being lowered, for error reporting.
    cur_inst: Option<IRInst>,
}

impl<'func, M: ABIMachineSpec> Lower<'func, M> {
    /// Create a new lowering context for `func`.
    pub fn new(func: &'func Function, abi: Callee<M>) -> CodegenResult<Self> {
        let block_order: Vec<Block> = func.layout.blocks().collect();
        let mut block_index = SecondaryMap::with_default(u32::MAX);
        for (i, &block) in block_order.iter().enumerate() {
            block_index[block] = i as u32;
        }

        // Count uses of every value: instruction arguments and branch
        // arguments.
        let mut value_uses = SecondaryMap::new();
        for &block in &block_order {
            for inst in func.layout.block_insts(block) {
                for value in func.dfg.inst_values(inst) {
                    let value = func.dfg.resolve_aliases(value);
                    value_uses[value] += 1;
                }
            }
        }

        Ok(Self {
            f: func,
            vcode: VCode::new(abi),
            value_regs: SecondaryMap::new(),
            value_uses,
            merged: EntitySet::new(),
            block_order,
            block_index,
            ir_insts: vec![],
            cur_inst: None,
        })
    }

    /// Lower the whole function, consuming the context.
    pub fn lower<B: LowerBackend<M = M>>(mut self, backend: &B) -> CodegenResult<VCode<M>> {
        let block_order = core::mem::take(&mut self.block_order);
        for (index, &block) in block_order.iter().enumerate() {
            self.lower_block(backend, block, index as BlockIndex)?;
        }
        self.block_order = block_order;
        Ok(self.vcode)
    }

    fn lower_block<B: LowerBackend<M = M>>(
        &mut self,
        backend: &B,
        block: Block,
        index: BlockIndex,
    ) -> CodegenResult<()> {
        trace!("lowering {} as vcode block {}", block, index);
        self.vcode.begin_block();

        // Record successors from the terminator.
        let terminator = self
            .f
            .layout
            .last_inst(block)
            .expect("verified function has terminators");
        let mut targets: SmallVec<[MachLabel; 4]> = SmallVec::new();
        for call in self.f.dfg.branch_destinations(terminator) {
            let succ = call.block(&self.f.dfg.value_lists);
            let succ_index = self.block_index[succ];
            debug_assert!(succ_index != u32::MAX);
            self.vcode.add_succ(succ_index);
            targets.push(MachLabel::from_block(succ_index));
        }

        // Stage groups of machine instructions, one group per IR
        // instruction, in reverse. `emit()` pushes into the current
        // group.
        let mut groups: Vec<Vec<M::I>> = vec![];

        // Terminator first (it is the bottom-most instruction).
        self.start_ir_inst(terminator);
        self.lower_terminator(backend, terminator, &targets)?;
        groups.push(self.finish_ir_inst());

        // Then the rest, bottom-up.
        let body: SmallVec<[IRInst; 16]> = self
            .f
            .layout
            .block_insts(block)
            .take_while(|&i| i != terminator)
            .collect();
        for &inst in body.iter().rev() {
            if self.merged.contains(inst) {
                continue;
            }
            if self.is_dead(inst) {
                trace!("skipping dead {}", self.f.dfg.display_inst(inst));
                for value in self.f.dfg.inst_values(inst) {
                    let value = self.f.dfg.resolve_aliases(value);
                    self.value_uses[value] -= 1;
                }
                continue;
            }
            self.start_ir_inst(inst);
            let opcode = self.f.dfg.insts[inst].opcode();
            match opcode {
                Opcode::Call | Opcode::CallIndirect => self.lower_call(inst)?,
                _ => backend.lower(self, inst)?,
            }
            groups.push(self.finish_ir_inst());
        }

        // The entry block receives the ABI arguments at the top.
        if index == self.vcode.entry() {
            self.start_ir_inst(terminator);
            self.lower_entry_args(block)?;
            groups.push(self.finish_ir_inst());
        }

        // Emit groups in forward order.
        for group in groups.into_iter().rev() {
            for inst in group {
                let loc = self
                    .cur_inst
                    .map(|i| self.f.srclocs[i])
                    .unwrap_or_default();
                self.vcode.push(inst, loc);
            }
        }
        Ok(())
    }

    /// Is this instruction dead at this point of the bottom-up scan?
    fn is_dead(&self, inst: IRInst) -> bool {
        self.f.dfg.insts[inst].opcode().is_pure()
            && self
                .f
                .dfg
                .inst_results(inst)
                .iter()
                .all(|&v| self.value_uses[v] == 0)
    }

    fn start_ir_inst(&mut self, inst: IRInst) {
        debug_assert!(self.ir_insts.is_empty());
        self.cur_inst = Some(inst);
    }

    fn finish_ir_inst(&mut self) -> Vec<M::I> {
        self.cur_inst = None;
        core::mem::take(&mut self.ir_insts)
    }

    /// Copy the ABI arguments into the entry block's parameter vregs.
    ///
    /// The signature's parameter list (including any explicit sret
    /// pointer) corresponds 1:1 with the entry block's parameters.
    fn lower_entry_args(&mut self, entry: Block) -> CodegenResult<()> {
        let params: SmallVec<[Value; 8]> =
            self.f.dfg.block_params(entry).iter().copied().collect();
        debug_assert_eq!(params.len(), self.vcode.abi.num_args());
        for (i, &param) in params.iter().enumerate() {
            let regs = self.value_regs_writable(param);
            for inst in self.vcode.abi.gen_copy_arg_to_regs(i, regs) {
                self.ir_insts.push(inst);
            }
        }
        Ok(())
    }

    /// Lower a block terminator.
    fn lower_terminator<B: LowerBackend<M = M>>(
        &mut self,
        backend: &B,
        inst: IRInst,
        targets: &[MachLabel],
    ) -> CodegenResult<()> {
        let opcode = self.f.dfg.insts[inst].opcode();
        match opcode {
            Opcode::Jump => {
                self.lower_branch_args(inst)?;
                self.emit(<M::I as MachInst>::gen_jump(targets[0]));
                Ok(())
            }
            Opcode::Return => self.lower_return(inst),
            Opcode::ReturnCall => self.lower_return_call(inst),
            Opcode::Brif | Opcode::BrTable => {
                // Edge-splitting has moved all branch arguments onto
                // plain jumps.
                for call in self.f.dfg.branch_destinations(inst) {
                    debug_assert!(
                        call.args_slice(&self.f.dfg.value_lists).is_empty(),
                        "critical edges must be split before lowering"
                    );
                }
                backend.lower_branch(self, inst, targets)
            }
            Opcode::Trap => backend.lower(self, inst),
            _ => Err(CodegenError::Lowering { inst, opcode }),
        }
    }

    /// Emit the parallel moves carrying branch arguments into the
    /// destination block's parameter vregs.
    fn lower_branch_args(&mut self, branch: IRInst) -> CodegenResult<()> {
        let dests = self.f.dfg.branch_destinations(branch);
        debug_assert_eq!(dests.len(), 1);
        let call = dests[0];
        let target = call.block(&self.f.dfg.value_lists);
        let args: SmallVec<[Value; 8]> = call
            .args_slice(&self.f.dfg.value_lists)
            .iter()
            .map(|&v| self.f.dfg.resolve_aliases(v))
            .collect();
        if args.is_empty() {
            return Ok(());
        }
        let params: SmallVec<[Value; 8]> =
            self.f.dfg.block_params(target).iter().copied().collect();
        debug_assert_eq!(args.len(), params.len());

        // Build the move graph: dst vregs are all distinct.
        let mut moves: SmallVec<[(Writable<Reg>, Reg, Type); 8]> = SmallVec::new();
        for (&arg, &param) in args.iter().zip(params.iter()) {
            let ty = self.f.dfg.value_type(param);
            let src = self.put_value_in_regs(arg);
            let dst = self.value_regs_writable(param);
            debug_assert_eq!(src.len(), dst.len());
            for (s, d) in src.regs().iter().zip(dst.regs().iter()) {
                if *s != d.to_reg() {
                    let part_ty = if ty == types::I128 { types::I64 } else { ty };
                    moves.push((*d, *s, part_ty));
                }
            }
        }
        self.emit_parallel_moves(moves);
        Ok(())
    }

    /// Sequentialize a set of parallel moves, breaking cycles through a
    /// fresh temporary.
    fn emit_parallel_moves(&mut self, mut moves: SmallVec<[(Writable<Reg>, Reg, Type); 8]>) {
        while !moves.is_empty() {
            // Emit any move whose destination is not a source of a
            // remaining move.
            if let Some(i) = (0..moves.len()).find(|&i| {
                let dst = moves[i].0.to_reg();
                !moves.iter().any(|&(_, src, _)| src == dst)
            }) {
                let (dst, src, ty) = moves.remove(i);
                self.emit(<M::I as MachInst>::gen_move(dst, src, ty));
            } else {
                // All remaining destinations are also sources: a cycle.
                // Rotate through a temporary.
                let (dst, src, ty) = moves[0];
                let tmp = self.alloc_tmp(ty).only_reg().unwrap();
                self.emit(<M::I as MachInst>::gen_move(tmp, src, ty));
                // Redirect the uses of `src` to the temp.
                for m in moves.iter_mut() {
                    if m.1 == src {
                        m.1 = tmp.to_reg();
                    }
                }
                let _ = dst;
            }
        }
    }

    /// Lower a `return`: move return values into their ABI locations,
    /// then emit the return pseudo-instruction.
    fn lower_return(&mut self, inst: IRInst) -> CodegenResult<()> {
        let rets: SmallVec<[Value; 4]> = self
            .f
            .dfg
            .inst_args(inst)
            .iter()
            .map(|&v| self.f.dfg.resolve_aliases(v))
            .collect();
        for (i, &ret) in rets.iter().enumerate() {
            let regs = self.put_value_in_regs(ret);
            for copy in self.vcode.abi.gen_copy_regs_to_retval(i, regs) {
                self.ir_insts.push(copy);
            }
        }
        self.emit(<M::I as MachInst>::gen_ret());
        Ok(())
    }

    /// Lower a direct or indirect call.
    fn lower_call(&mut self, inst: IRInst) -> CodegenResult<()> {
        let (sig, dest, args): (Signature, CallDest, SmallVec<[Value; 8]>) =
            match self.f.dfg.insts[inst] {
                InstructionData::Call { func_ref, .. } => {
                    let ext = &self.f.dfg.ext_funcs[func_ref];
                    let sig = self.f.dfg.signatures[ext.signature].clone();
                    let args = self.f.dfg.inst_args(inst).iter().copied().collect();
                    (sig, CallDest::ExtName(ext.name.clone()), args)
                }
                InstructionData::CallIndirect { sig_ref, .. } => {
                    let sig = self.f.dfg.signatures[sig_ref].clone();
                    let all_args = self.f.dfg.inst_args(inst);
                    let callee = self.f.dfg.resolve_aliases(all_args[0]);
                    let callee_reg = self
                        .put_value_in_regs(callee)
                        .only_reg()
                        .expect("code pointer in one register");
                    let args = all_args[1..].iter().copied().collect();
                    (sig, CallDest::Reg(callee_reg), args)
                }
                _ => unreachable!(),
            };

        let site = CallSite::<M>::new(&sig, dest)?;
        self.vcode
            .abi
            .accumulate_outgoing_args_size(site.stack_arg_space());

        for (i, &arg) in args.iter().enumerate() {
            let arg = self.f.dfg.resolve_aliases(arg);
            let regs = self.put_value_in_regs(arg);
            for copy in site.gen_arg(i, regs) {
                self.ir_insts.push(copy);
            }
        }
        let call_inst = site.gen_call();
        self.ir_insts.push(call_inst);
        let results: SmallVec<[Value; 4]> =
            self.f.dfg.inst_results(inst).iter().copied().collect();
        for (i, &result) in results.iter().enumerate() {
            let into = self.value_regs_writable(result);
            for copy in site.gen_retval(i, into) {
                self.ir_insts.push(copy);
            }
        }
        Ok(())
    }

    /// Lower a tail call. Only register arguments are supported: the
    /// caller's frame is gone by the time the callee starts.
    fn lower_return_call(&mut self, inst: IRInst) -> CodegenResult<()> {
        let (sig, name, args): (Signature, ExternalName, SmallVec<[Value; 8]>) =
            match self.f.dfg.insts[inst] {
                InstructionData::Call { func_ref, .. } => {
                    let ext = &self.f.dfg.ext_funcs[func_ref];
                    (
                        self.f.dfg.signatures[ext.signature].clone(),
                        ext.name.clone(),
                        self.f.dfg.inst_args(inst).iter().copied().collect(),
                    )
                }
                _ => unreachable!(),
            };
        let site = CallSite::<M>::new(&sig, CallDest::ExtName(name.clone()))?;
        if site.stack_arg_space() > 0 {
            return Err(CodegenError::Unsupported(
                "tail call with stack arguments".into(),
            ));
        }
        let mut uses: SmallVec<[crate::machinst::reg::RealReg; 8]> = SmallVec::new();
        for arg_loc in site.args() {
            for slot in &arg_loc.slots {
                if let crate::machinst::abi::ABIArgSlot::Reg { reg, .. } = *slot {
                    uses.push(reg);
                }
            }
        }
        for (i, &arg) in args.iter().enumerate() {
            let arg = self.f.dfg.resolve_aliases(arg);
            let regs = self.put_value_in_regs(arg);
            for copy in site.gen_arg(i, regs) {
                self.ir_insts.push(copy);
            }
        }
        self.emit(M::gen_tail_call(CallDest::ExtName(name), uses));
        Ok(())
    }
}

/// The query and emission interface exposed to backend lowering rules.
impl<'func, M: ABIMachineSpec> Lower<'func, M> {
    /// Emit a machine instruction for the IR instruction currently being
    /// lowered.
    pub fn emit(&mut self, inst: M::I) {
        self.ir_insts.push(inst);
    }

    /// The type of an SSA value.
    pub fn value_ty(&self, value: Value) -> Type {
        self.f.dfg.value_type(self.f.dfg.resolve_aliases(value))
    }

    /// The type of the `idx`'th input of `inst`.
    pub fn input_ty(&self, inst: IRInst, idx: usize) -> Type {
        self.value_ty(self.f.dfg.inst_args(inst)[idx])
    }

    /// The type of the `idx`'th output of `inst`.
    pub fn output_ty(&self, inst: IRInst, idx: usize) -> Type {
        self.f.dfg.value_type(self.f.dfg.inst_results(inst)[idx])
    }

    /// The `idx`'th input of `inst` as a value, aliases resolved.
    pub fn input_as_value(&self, inst: IRInst, idx: usize) -> Value {
        self.f.dfg.resolve_aliases(self.f.dfg.inst_args(inst)[idx])
    }

    /// The number of inputs of `inst`.
    pub fn num_inputs(&self, inst: IRInst) -> usize {
        self.f.dfg.inst_args(inst).len()
    }

    /// The number of outputs of `inst`.
    pub fn num_outputs(&self, inst: IRInst) -> usize {
        self.f.dfg.inst_results(inst).len()
    }

    /// The instruction data of an IR instruction.
    pub fn data(&self, inst: IRInst) -> &InstructionData {
        &self.f.dfg.insts[inst]
    }

    /// The constant bits of `inst` if it is a constant instruction.
    pub fn get_constant(&self, inst: IRInst) -> Option<u64> {
        match self.f.dfg.insts[inst] {
            InstructionData::UnaryImm { imm, .. } => Some(imm.bits() as u64),
            InstructionData::UnaryIeee32 { imm, .. } => Some(u64::from(imm.bits())),
            InstructionData::UnaryIeee64 { imm, .. } => Some(imm.bits()),
            _ => None,
        }
    }

    /// Examine an input value: can its producer be merged, and is it a
    /// constant?
    pub fn get_value_as_source_or_const(&self, value: Value) -> NonRegInput {
        let value = self.f.dfg.resolve_aliases(value);
        match self.f.dfg.value_def(value) {
            ValueDef::Result(def_inst, idx) => {
                let data = &self.f.dfg.insts[def_inst];
                let constant = match *data {
                    InstructionData::UnaryImm { imm, .. } => {
                        // Sign-extension to 64 bits is the canonical
                        // in-register form for narrow constants.
                        let ty = self.f.dfg.value_type(value);
                        Some(imm.sign_extend_from_width(ty.bits().min(64)).bits() as u64)
                    }
                    InstructionData::UnaryIeee32 { imm, .. } => Some(u64::from(imm.bits())),
                    InstructionData::UnaryIeee64 { imm, .. } => Some(imm.bits()),
                    _ => None,
                };
                let unique_use = self.value_uses[value] == 1;
                let mergeable = data.opcode().is_pure() && unique_use;
                NonRegInput {
                    inst: if mergeable { Some((def_inst, idx)) } else { None },
                    constant,
                }
            }
            ValueDef::Param(..) => NonRegInput {
                inst: None,
                constant: None,
            },
        }
    }

    /// As `get_value_as_source_or_const` for instruction input `idx`.
    pub fn get_input_as_source_or_const(&self, inst: IRInst, idx: usize) -> NonRegInput {
        self.get_value_as_source_or_const(self.input_as_value(inst, idx))
    }

    /// Mark an instruction as merged into its consumer: it will not be
    /// separately lowered.
    pub fn sink_inst(&mut self, inst: IRInst) {
        debug_assert!(self.f.dfg.insts[inst].opcode().is_pure());
        self.merged.insert(inst);
        // The producer's own inputs are now consumed at the merge site;
        // their counts are unchanged. Only the merged value's count goes
        // away.
        for &result in self.f.dfg.inst_results(inst) {
            debug_assert!(self.value_uses[result] <= 1);
        }
    }

    /// The registers assigned to hold `value`, materializing the
    /// assignment on first request.
    pub fn put_value_in_regs(&mut self, value: Value) -> ValueRegs<Reg> {
        let value = self.f.dfg.resolve_aliases(value);
        if !self.value_regs[value].is_valid() {
            let ty = self.f.dfg.value_type(value);
            let regs = self.alloc_regs_for_type(ty);
            self.value_regs[value] = regs;
        }
        self.value_regs[value]
    }

    /// Input `idx` of `inst`, in registers.
    pub fn put_input_in_regs(&mut self, inst: IRInst, idx: usize) -> ValueRegs<Reg> {
        let value = self.input_as_value(inst, idx);
        self.put_value_in_regs(value)
    }

    /// The destination registers for output `idx` of `inst`.
    pub fn get_output(&mut self, inst: IRInst, idx: usize) -> ValueRegs<Writable<Reg>> {
        let value = self.f.dfg.inst_results(inst)[idx];
        self.value_regs_writable(value)
    }

    fn value_regs_writable(&mut self, value: Value) -> ValueRegs<Writable<Reg>> {
        self.put_value_in_regs(value).writable()
    }

    /// Allocate a fresh temporary of the given type.
    pub fn alloc_tmp(&mut self, ty: Type) -> ValueRegs<Writable<Reg>> {
        self.alloc_regs_for_type(ty).writable()
    }

    fn alloc_regs_for_type(&mut self, ty: Type) -> ValueRegs<Reg> {
        let class = if ty.is_float() || ty.is_vector() {
            RegClass::Float
        } else {
            RegClass::Int
        };
        if ty == types::I128 {
            let lo = self.vcode.alloc_vreg(RegClass::Int, types::I64);
            let hi = self.vcode.alloc_vreg(RegClass::Int, types::I64);
            ValueRegs::two(lo.into(), hi.into())
        } else {
            let vreg = self.vcode.alloc_vreg(class, ty);
            ValueRegs::one(vreg.into())
        }
    }

    /// Access the function's ABI object.
    pub fn abi(&mut self) -> &mut Callee<M> {
        &mut self.vcode.abi
    }

    /// An error value for a missing lowering rule on `inst`.
    pub fn lowering_error(&self, inst: IRInst) -> CodegenError {
        CodegenError::Lowering {
            inst,
            opcode: self.f.dfg.insts[inst].opcode(),
        }
    }
}

/// Split critical edges that carry block arguments.
///
/// After this pass, only unconditional jumps pass block arguments, so
/// lowering can emit argument moves immediately before the jump without
/// disturbing the other path(s) of a conditional or table branch.
pub fn split_critical_edges(func: &mut Function) {
    use crate::ir::InstBuilder;

    let blocks: Vec<Block> = func.layout.blocks().collect();
    for block in blocks {
        let Some(terminator) = func.layout.last_inst(block) else {
            continue;
        };
        let opcode = func.dfg.insts[terminator].opcode();
        if !matches!(opcode, Opcode::Brif | Opcode::BrTable) {
            continue;
        }
        let num_dests = func.dfg.branch_destinations(terminator).len();
        for dest_idx in 0..num_dests {
            let call = func.dfg.branch_destinations(terminator)[dest_idx];
            let args: Vec<Value> = call
                .args_slice(&func.dfg.value_lists)
                .iter()
                .copied()
                .collect();
            if args.is_empty() {
                continue;
            }
            let target = call.block(&func.dfg.value_lists);

            // Create the edge block: a single jump carrying the args.
            let edge_block = func.dfg.make_block();
            func.layout.append_block(edge_block);
            {
                let mut pos = crate::cursor::FuncCursor::new(func).at_bottom(edge_block);
                pos.ins().jump(target, &args);
            }

            // Retarget the original destination, dropping its args.
            let empty_call = func.dfg.block_call(edge_block, &[]);
            match &mut func.dfg.insts[terminator] {
                InstructionData::Brif { blocks, .. } => {
                    blocks[dest_idx] = empty_call;
                }
                InstructionData::BranchTable { table, .. } => {
                    let table = *table;
                    func.dfg.jump_tables[table].all_branches_mut()[dest_idx] = empty_call;
                }
                _ => unreachable!(),
            }
        }
    }
}

/// Entry point: lower `func` with the given backend and ABI.
pub fn lower_function<B: LowerBackend>(
    func: &Function,
    backend: &B,
    abi: Callee<B::M>,
) -> CodegenResult<VCode<B::M>> {
    let lower = Lower::new(func, abi)?;
    lower.lower(backend)
}
