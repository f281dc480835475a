//! A verifier for ensuring that functions are well formed.
//! It verifies:
//!
//! block integrity
//!
//! - All instructions reached from the `block_insts` iterator must belong
//!   to the block as reported by `inst_block()`.
//! - Every block must end in a terminator instruction, and no other
//!   instruction can be a terminator.
//! - Every value in the `block_params` iterator belongs to the block as
//!   reported by `value_def`.
//!
//! Instruction integrity
//!
//! - The instruction format must match the opcode.
//! - All result values must be created for multi-valued instructions.
//! - Instructions with no results must have a `INVALID` controlling type.
//! - All referenced entities must exist.
//!
//! SSA form
//!
//! - Values must be defined by an instruction that exists and that is
//!   inserted in a block, or be an argument of an existing block.
//! - Values used by an instruction must dominate the instruction.
//!
//! Control flow graph and dominator tree integrity
//!
//! - All predecessors in the CFG must be branches to the block.
//! - All branches to a block must be present in the CFG.
//!
//! Type checking
//!
//! - Compare input and output values against the opcode's constraints.
//! - Branch arguments must match the expected types of the destination
//!   block parameters.
//! - Function call arguments must match the signature.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::instructions::{BlockCall, InstructionData};
use crate::ir::{AnyEntity, Block, Function, Inst, Opcode, SigRef, Value, ValueDef};
use crate::settings::Flags;
use core::fmt;

/// A verifier error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierError {
    /// The entity causing the verifier error.
    pub location: AnyEntity,
    /// Optionally provide some context for the given location; e.g., for
    /// `inst42` provide `Some("v3 = iadd v1, v2")` for more comprehensible
    /// errors.
    pub context: Option<String>,
    /// The error message.
    pub message: String,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.context {
            None => write!(f, "{}: {}", self.location, self.message),
            Some(context) => {
                write!(f, "{} ({}): {}", self.location, context, self.message)
            }
        }
    }
}

/// Result of a step in the verification process.
///
/// Functions that return `VerifierStepResult` should also take a
/// `&mut VerifierErrors` parameter and add any errors that they find to
/// it; they should return `Err` if the error is fatal and verification
/// cannot proceed past this check.
pub type VerifierStepResult = Result<(), ()>;

/// Result of a verification operation.
///
/// Unlike `VerifierStepResult`, this type always returns the errors
/// collected during verification.
pub type VerifierResult<T> = Result<T, VerifierErrors>;

/// List of verifier errors.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl VerifierErrors {
    /// Return a new `VerifierErrors` struct.
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Return whether no errors were reported.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return whether one or more errors were reported.
    #[inline]
    pub fn has_error(&self) -> bool {
        !self.0.is_empty()
    }

    /// Return a `VerifierStepResult` that is fatal if at least one error
    /// was reported.
    pub fn as_result(&self) -> VerifierStepResult {
        if self.is_empty() {
            Ok(())
        } else {
            Err(())
        }
    }

    /// Report an error, adding it to the list of errors.
    pub fn report(&mut self, error: VerifierError) {
        self.0.push(error);
    }

    /// Convenience wrapper for reporting a non-fatal error.
    pub fn nonfatal(
        &mut self,
        location: impl Into<AnyEntity>,
        context: Option<String>,
        message: impl Into<String>,
    ) -> VerifierStepResult {
        self.report(VerifierError {
            location: location.into(),
            context,
            message: message.into(),
        });
        Ok(())
    }

    /// Convenience wrapper for reporting a fatal error.
    pub fn fatal(
        &mut self,
        location: impl Into<AnyEntity>,
        context: Option<String>,
        message: impl Into<String>,
    ) -> VerifierStepResult {
        self.report(VerifierError {
            location: location.into(),
            context,
            message: message.into(),
        });
        Err(())
    }
}

impl fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "- {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for VerifierErrors {}

/// Verify `func` against the given flags.
pub fn verify_function(func: &Function, flags: &Flags) -> VerifierResult<()> {
    let _ = flags;
    let mut errors = VerifierErrors::new();
    let verifier = Verifier::new(func);
    let result = verifier.run(&mut errors);
    if errors.is_empty() {
        result.expect("no errors reported, but verification failed");
        Ok(())
    } else {
        Err(errors)
    }
}

struct Verifier<'a> {
    func: &'a Function,
    cfg: ControlFlowGraph,
    domtree: DominatorTree,
}

impl<'a> Verifier<'a> {
    pub fn new(func: &'a Function) -> Self {
        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        Self { func, cfg, domtree }
    }

    /// Run all the verifier checks, collecting errors.
    pub fn run(&self, errors: &mut VerifierErrors) -> VerifierStepResult {
        self.verify_global_values(errors)?;
        for block in self.func.layout.blocks() {
            self.verify_block(block, errors)?;
            for inst in self.func.layout.block_insts(block) {
                self.verify_inst(block, inst, errors)?;
            }
        }
        errors.as_result()
    }

    fn context(&self, inst: Inst) -> Option<String> {
        Some(self.func.dfg.display_inst(inst).to_string())
    }

    fn verify_global_values(&self, errors: &mut VerifierErrors) -> VerifierStepResult {
        for gv in self.func.global_values.keys() {
            match self.func.global_values[gv] {
                crate::ir::GlobalValueData::Load { base, .. }
                | crate::ir::GlobalValueData::IAddImm { base, .. } => {
                    if base >= gv {
                        errors.nonfatal(
                            gv,
                            None,
                            format!("global value base {} must come before {}", base, gv),
                        )?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn verify_block(&self, block: Block, errors: &mut VerifierErrors) -> VerifierStepResult {
        if !self.func.dfg.block_is_valid(block) {
            return errors.fatal(block, None, "block not defined in the DFG");
        }

        // Block parameters must belong to this block.
        for (num, &param) in self.func.dfg.block_params(block).iter().enumerate() {
            match self.func.dfg.value_def(param) {
                ValueDef::Param(param_block, param_num) => {
                    if param_block != block || param_num != num {
                        errors.nonfatal(
                            block,
                            None,
                            format!("block parameter {} has wrong definition", param),
                        )?;
                    }
                }
                _ => {
                    errors.nonfatal(
                        block,
                        None,
                        format!("block parameter {} is not defined as a parameter", param),
                    )?;
                }
            }
        }

        // Every block must end in a terminator, and terminators must be
        // last.
        match self.func.layout.last_inst(block) {
            None => {
                return errors.fatal(block, None, "block must end in a terminator instruction")
            }
            Some(last) => {
                if !self.func.dfg.insts[last].opcode().is_terminator() {
                    return errors.fatal(
                        block,
                        self.context(last),
                        "block does not end in a terminator instruction",
                    );
                }
            }
        }
        for inst in self.func.layout.block_insts(block) {
            if self.func.dfg.insts[inst].opcode().is_terminator()
                && Some(inst) != self.func.layout.last_inst(block)
            {
                return errors.fatal(
                    inst,
                    self.context(inst),
                    "terminator instruction in the middle of a block",
                );
            }
        }
        Ok(())
    }

    fn verify_inst(
        &self,
        block: Block,
        inst: Inst,
        errors: &mut VerifierErrors,
    ) -> VerifierStepResult {
        if !self.func.dfg.inst_is_valid(inst) {
            return errors.fatal(inst, None, "instruction not defined in the DFG");
        }
        debug_assert_eq!(self.func.layout.inst_block(inst), Some(block));

        self.verify_entity_references(inst, errors)?;
        self.verify_uses(inst, errors)?;
        self.typecheck(inst, errors)?;
        self.verify_branch(inst, errors)?;
        Ok(())
    }

    /// Check that all entity references inside the instruction are valid.
    fn verify_entity_references(
        &self,
        inst: Inst,
        errors: &mut VerifierErrors,
    ) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        match dfg.insts[inst] {
            InstructionData::Call { func_ref, .. } => {
                if !dfg.ext_funcs.is_valid(func_ref) {
                    return errors.fatal(inst, self.context(inst), "invalid function reference");
                }
            }
            InstructionData::CallIndirect { sig_ref, .. } => {
                if !dfg.signatures.is_valid(sig_ref) {
                    return errors.fatal(inst, self.context(inst), "invalid signature reference");
                }
            }
            InstructionData::FuncAddr { func_ref, .. } => {
                if !dfg.ext_funcs.is_valid(func_ref) {
                    return errors.fatal(inst, self.context(inst), "invalid function reference");
                }
            }
            InstructionData::StackLoad { stack_slot, .. }
            | InstructionData::StackStore { stack_slot, .. } => {
                if !self.func.stack_slots.is_valid(stack_slot) {
                    return errors.fatal(inst, self.context(inst), "invalid stack slot");
                }
            }
            InstructionData::UnaryGlobalValue { global_value, .. } => {
                if !self.func.global_values.is_valid(global_value) {
                    return errors.fatal(inst, self.context(inst), "invalid global value");
                }
            }
            InstructionData::BranchTable { table, .. } => {
                if !self.func.dfg.jump_tables.is_valid(table) {
                    return errors.fatal(inst, self.context(inst), "invalid jump table");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check that every value used by `inst` is defined and dominates it.
    fn verify_uses(&self, inst: Inst, errors: &mut VerifierErrors) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        for value in dfg.inst_values(inst) {
            let value = dfg.resolve_aliases(value);
            match dfg.value_def(value) {
                ValueDef::Result(def_inst, _) => {
                    let def_block = match self.func.layout.inst_block(def_inst) {
                        Some(b) => b,
                        None => {
                            errors.nonfatal(
                                inst,
                                self.context(inst),
                                format!("uses value {} from removed instruction", value),
                            )?;
                            continue;
                        }
                    };
                    if !self
                        .domtree
                        .def_dominates_use(Some(def_inst), def_block, inst, &self.func.layout)
                        && self.domtree.is_reachable(
                            self.func.layout.inst_block(inst).unwrap(),
                        )
                    {
                        errors.nonfatal(
                            inst,
                            self.context(inst),
                            format!("uses value {} from non-dominating {}", value, def_inst),
                        )?;
                    }
                }
                ValueDef::Param(def_block, _) => {
                    if !self.func.layout.is_block_inserted(def_block) {
                        errors.nonfatal(
                            inst,
                            self.context(inst),
                            format!("uses value {} from removed block {}", value, def_block),
                        )?;
                    } else if !self
                        .domtree
                        .def_dominates_use(None, def_block, inst, &self.func.layout)
                        && self.domtree.is_reachable(
                            self.func.layout.inst_block(inst).unwrap(),
                        )
                    {
                        errors.nonfatal(
                            inst,
                            self.context(inst),
                            format!(
                                "uses value {} from non-dominating block {}",
                                value, def_block
                            ),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Check operand and result types against the opcode's constraints.
    fn typecheck(&self, inst: Inst, errors: &mut VerifierErrors) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        let opcode = dfg.insts[inst].opcode();
        let args = dfg.inst_args(inst);

        let arg_ty = |v: Value| dfg.value_type(dfg.resolve_aliases(v));

        match opcode {
            // Binary integer arithmetic: both operands and the result
            // share one integer type.
            Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Umulhi
            | Opcode::Smulhi
            | Opcode::Udiv
            | Opcode::Sdiv
            | Opcode::Urem
            | Opcode::Srem
            | Opcode::Band
            | Opcode::Bor
            | Opcode::Bxor
            | Opcode::Ishl
            | Opcode::Ushr
            | Opcode::Sshr => {
                let ty = arg_ty(args[0]);
                if !ty.lane_type().is_int() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!("{} requires integer operands, got {}", opcode, ty),
                    )?;
                }
                if arg_ty(args[1]) != ty && !matches!(opcode, Opcode::Ishl | Opcode::Ushr | Opcode::Sshr)
                {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!(
                            "operand type mismatch: {} vs {}",
                            ty,
                            arg_ty(args[1])
                        ),
                    )?;
                }
                let result = dfg.first_result(inst);
                if dfg.value_type(result) != ty {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!(
                            "result type {} does not match operand type {}",
                            dfg.value_type(result),
                            ty
                        ),
                    )?;
                }
            }

            // Binary float arithmetic.
            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => {
                let ty = arg_ty(args[0]);
                if !ty.lane_type().is_float() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!("{} requires float operands, got {}", opcode, ty),
                    )?;
                }
                if arg_ty(args[1]) != ty {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        "operand type mismatch".to_string(),
                    )?;
                }
            }

            // Extensions must strictly widen; reductions strictly narrow.
            Opcode::Uextend | Opcode::Sextend => {
                let from = arg_ty(args[0]);
                let to = dfg.value_type(dfg.first_result(inst));
                if from.bits() >= to.bits() || !from.is_int() || !to.is_int() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!("invalid extension {} -> {}", from, to),
                    )?;
                }
            }
            Opcode::Ireduce => {
                let from = arg_ty(args[0]);
                let to = dfg.value_type(dfg.first_result(inst));
                if from.bits() <= to.bits() || !from.is_int() || !to.is_int() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!("invalid reduction {} -> {}", from, to),
                    )?;
                }
            }

            Opcode::Bitcast => {
                let from = arg_ty(args[0]);
                let to = dfg.value_type(dfg.first_result(inst));
                if from.bits() != to.bits() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!("bitcast changes width: {} -> {}", from, to),
                    )?;
                }
            }

            Opcode::Icmp => {
                let ty = arg_ty(args[0]);
                if !ty.lane_type().is_int() || arg_ty(args[1]) != ty {
                    errors.nonfatal(inst, self.context(inst), "bad icmp operands")?;
                }
            }
            Opcode::Fcmp => {
                let ty = arg_ty(args[0]);
                if !ty.lane_type().is_float() || arg_ty(args[1]) != ty {
                    errors.nonfatal(inst, self.context(inst), "bad fcmp operands")?;
                }
            }

            Opcode::Select => {
                if arg_ty(args[1]) != arg_ty(args[2]) {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        "select operands must have matching types",
                    )?;
                }
            }

            Opcode::StackLoad | Opcode::StackStore => {
                // Accesses must fit inside the slot.
                let (slot, offset, ty) = match dfg.insts[inst] {
                    InstructionData::StackLoad {
                        stack_slot, offset, ..
                    } => (
                        stack_slot,
                        offset,
                        dfg.value_type(dfg.first_result(inst)),
                    ),
                    InstructionData::StackStore {
                        stack_slot,
                        offset,
                        arg,
                        ..
                    } => (stack_slot, offset, arg_ty(arg)),
                    _ => unreachable!(),
                };
                if opcode == Opcode::StackLoad || opcode == Opcode::StackStore {
                    let offset: i64 = offset.into();
                    let size = i64::from(self.func.stack_slots[slot].size);
                    if offset < 0 || offset + i64::from(ty.bytes()) > size {
                        errors.nonfatal(
                            inst,
                            self.context(inst),
                            format!("stack access out of bounds of {}", slot),
                        )?;
                    }
                }
            }

            Opcode::Return => {
                let expected = &self.func.signature.returns;
                if args.len() != expected.len() {
                    errors.nonfatal(
                        inst,
                        self.context(inst),
                        format!(
                            "arguments of return must match function signature ({} vs {})",
                            args.len(),
                            expected.len()
                        ),
                    )?;
                } else {
                    for (&arg, param) in args.iter().zip(expected) {
                        if arg_ty(arg) != param.value_type {
                            errors.nonfatal(
                                inst,
                                self.context(inst),
                                format!(
                                    "return type mismatch: {} vs {}",
                                    arg_ty(arg),
                                    param.value_type
                                ),
                            )?;
                        }
                    }
                }
            }

            Opcode::Call | Opcode::ReturnCall => {
                if let InstructionData::Call { func_ref, .. } = dfg.insts[inst] {
                    let sig_ref = dfg.ext_funcs[func_ref].signature;
                    self.typecheck_call_args(inst, sig_ref, args, errors)?;
                }
            }
            Opcode::CallIndirect => {
                if let InstructionData::CallIndirect { sig_ref, .. } = dfg.insts[inst] {
                    self.typecheck_call_args(inst, sig_ref, &args[1..], errors)?;
                }
            }

            _ => {}
        }
        Ok(())
    }

    fn typecheck_call_args(
        &self,
        inst: Inst,
        sig_ref: SigRef,
        args: &[Value],
        errors: &mut VerifierErrors,
    ) -> VerifierStepResult {
        let sig = &self.func.dfg.signatures[sig_ref];
        if args.len() != sig.params.len() {
            return errors.nonfatal(
                inst,
                self.context(inst),
                format!(
                    "call has {} arguments, signature expects {}",
                    args.len(),
                    sig.params.len()
                ),
            );
        }
        for (&arg, param) in args.iter().zip(&sig.params) {
            let ty = self
                .func
                .dfg
                .value_type(self.func.dfg.resolve_aliases(arg));
            if ty != param.value_type {
                errors.nonfatal(
                    inst,
                    self.context(inst),
                    format!(
                        "call argument type {} does not match signature type {}",
                        ty, param.value_type
                    ),
                )?;
            }
        }
        Ok(())
    }

    /// Check the destinations of a branch: arity and types of block
    /// arguments.
    fn verify_branch(&self, inst: Inst, errors: &mut VerifierErrors) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        if !dfg.insts[inst].opcode().is_branch() {
            return Ok(());
        }
        for call in dfg.branch_destinations(inst) {
            self.verify_block_call(inst, call, errors)?;
        }
        Ok(())
    }

    fn verify_block_call(
        &self,
        inst: Inst,
        call: &BlockCall,
        errors: &mut VerifierErrors,
    ) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        let block = call.block(&dfg.value_lists);
        if !self.func.layout.is_block_inserted(block) {
            return errors.fatal(
                inst,
                self.context(inst),
                format!("branch to {} not in layout", block),
            );
        }
        let args = call.args_slice(&dfg.value_lists);
        let params = dfg.block_params(block);
        if args.len() != params.len() {
            return errors.nonfatal(
                inst,
                self.context(inst),
                format!(
                    "branch to {} passes {} arguments, block expects {}",
                    block,
                    args.len(),
                    params.len()
                ),
            );
        }
        for (&arg, &param) in args.iter().zip(params) {
            let arg_ty = dfg.value_type(dfg.resolve_aliases(arg));
            let param_ty = dfg.value_type(param);
            if arg_ty != param_ty {
                errors.nonfatal(
                    inst,
                    self.context(inst),
                    format!(
                        "branch argument type {} does not match block parameter type {}",
                        arg_ty, param_ty
                    ),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::types::I32;
    use crate::ir::InstBuilder;
    use crate::settings::Flags;

    #[test]
    fn empty_function_fails() {
        let func = Function::new();
        let flags = Flags::default();
        // An empty function with no blocks trivially verifies.
        assert!(verify_function(&func, &flags).is_ok());
    }

    #[test]
    fn simple_function_ok() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let v0 = func.dfg.append_block_param(block0, I32);
        func.signature.params.push(crate::ir::AbiParam::new(I32));
        func.signature.returns.push(crate::ir::AbiParam::new(I32));
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let v1 = pos.ins().iconst(I32, 1);
            let v2 = pos.ins().iadd(v0, v1);
            pos.ins().return_(&[v2]);
        }
        let flags = Flags::default();
        verify_function(&func, &flags).expect("should be valid");
    }

    #[test]
    fn missing_terminator() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            pos.ins().iconst(I32, 1);
        }
        let flags = Flags::default();
        let errors = verify_function(&func, &flags).unwrap_err();
        assert!(errors
            .to_string()
            .contains("does not end in a terminator"));
    }

    #[test]
    fn misplaced_terminator() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            pos.ins().return_(&[]);
            pos.ins().return_(&[]);
        }
        let flags = Flags::default();
        let errors = verify_function(&func, &flags).unwrap_err();
        assert!(errors.to_string().contains("terminator"));
    }

    #[test]
    fn use_before_def() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let v1 = pos.ins().iconst(I32, 1);
        let v2 = pos.ins().iadd(v1, v1);
        pos.ins().return_(&[]);
        // Move the add above the constant definition.
        let add_inst = pos.func.dfg.value_def(v2).unwrap_inst();
        let const_inst = pos.func.dfg.value_def(v1).unwrap_inst();
        pos.func.layout.remove_inst(add_inst);
        pos.func.layout.insert_inst(add_inst, const_inst);

        let flags = Flags::default();
        let errors = verify_function(pos.func, &flags).unwrap_err();
        assert!(errors.to_string().contains("non-dominating"));
    }

    #[test]
    fn branch_arity_mismatch() {
        let mut func = Function::new();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        func.layout.append_block(block0);
        func.layout.append_block(block1);
        func.dfg.append_block_param(block1, I32);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            pos.ins().jump(block1, &[]);
            pos.goto_bottom(block1);
            pos.ins().return_(&[]);
        }
        let flags = Flags::default();
        let errors = verify_function(&func, &flags).unwrap_err();
        assert!(errors.to_string().contains("block expects"));
    }
}
