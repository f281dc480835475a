//! The per-function compilation context.
//!
//! A `Context` owns one IR function and the analyses computed over it,
//! and drives the compilation pipeline: verification, mid-end
//! optimization, legalization, and the target backend. Contexts can be
//! reused between functions to avoid repeated allocations; nothing
//! persists between compilations except capacity.

use crate::constant_folding::do_const_fold;
use crate::dce::do_dce;
use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::Function;
use crate::isa::{CompiledCode, TargetIsa};
use crate::legalizer::legalize_function;
use crate::loop_analysis::LoopAnalysis;
use crate::machinst::lower::split_critical_edges;
use crate::result::CodegenResult;
use crate::settings::OptLevel;
use crate::simple_gvn::do_simple_gvn;
use crate::verifier::verify_function;

/// Persistent data structures and compilation pipeline.
pub struct Context {
    /// The function we're compiling.
    pub func: Function,

    /// The control flow graph of `func`.
    pub cfg: ControlFlowGraph,

    /// Dominator tree for `func`.
    pub domtree: DominatorTree,

    /// Loop analysis of `func`.
    pub loop_analysis: LoopAnalysis,
}

impl Context {
    /// Allocate a new compilation context.
    ///
    /// The returned instance should be reused for compiling multiple
    /// functions in order to avoid needless allocator thrashing.
    pub fn new() -> Self {
        Self::for_function(Function::new())
    }

    /// Allocate a new compilation context with an existing Function.
    pub fn for_function(func: Function) -> Self {
        Self {
            func,
            cfg: ControlFlowGraph::new(),
            domtree: DominatorTree::new(),
            loop_analysis: LoopAnalysis::new(),
        }
    }

    /// Clear all data structures in this context.
    pub fn clear(&mut self) {
        self.func.clear();
        self.cfg.clear();
        self.domtree.clear();
        self.loop_analysis.clear();
    }

    /// Recompute the control flow graph and dominator tree.
    pub fn compute_cfg_and_domtree(&mut self) {
        self.cfg.compute(&self.func);
        self.domtree.compute(&self.func, &self.cfg);
    }

    /// Run the verifier on the function.
    pub fn verify(&self, isa: &dyn TargetIsa) -> CodegenResult<()> {
        verify_function(&self.func, isa.flags())?;
        Ok(())
    }

    /// Run the mid-end optimization passes appropriate for the
    /// optimization level.
    pub fn optimize(&mut self, isa: &dyn TargetIsa) {
        if isa.flags().opt_level() == OptLevel::None {
            return;
        }
        self.compute_cfg_and_domtree();
        do_const_fold(&mut self.func, &self.domtree);
        // Constant folding may have rewritten branches; recompute before
        // the dominance-sensitive passes.
        self.compute_cfg_and_domtree();
        do_simple_gvn(&mut self.func, &self.domtree);
        do_dce(&mut self.func, &self.domtree);
    }

    /// Legalize the function for the given target.
    pub fn legalize(&mut self, isa: &dyn TargetIsa) -> CodegenResult<()> {
        legalize_function(&mut self.func, isa)
    }

    /// Compile the function, running the whole pipeline.
    ///
    /// Returns the machine code plus relocation/trap tables, or an error
    /// from any stage. On error the context's state for this function is
    /// not reusable and should be cleared.
    pub fn compile(&mut self, isa: &dyn TargetIsa) -> CodegenResult<CompiledCode> {
        log::debug!("compiling {} for {}", self.func.name, isa.name());

        if isa.flags().verify_ir() {
            self.verify(isa)?;
        }

        self.optimize(isa);

        self.legalize(isa)?;
        if isa.flags().verify_ir() {
            self.verify(isa)?;
        }

        split_critical_edges(&mut self.func);

        isa.compile_function(&self.func)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
