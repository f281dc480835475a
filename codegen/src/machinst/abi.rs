//! ABI definitions: shared implementation of function frames, argument
//! passing and call sites.
//!
//! The per-target `ABIMachineSpec` implementations describe *where* values
//! go (which registers, which stack offsets, what the frame looks like);
//! the generic `Callee` and `CallSite` types in this module turn those
//! descriptions into instruction sequences. This factoring exists because
//! the supported ABIs are variations on one shape:
//!
//! ```plain
//! (high address)
//!       +---------------------------+
//!       | incoming stack args       |
//!       +---------------------------+
//!       | FP, return address        | <- FP after prologue
//!       +---------------------------+
//!       | clobbered callee-saves    |
//!       +---------------------------+
//!       | explicit stack slots      |
//!       +---------------------------+
//!       | spill slots               |
//!       +---------------------------+
//!       | outgoing call args        | <- SP after prologue ("nominal SP")
//!       +---------------------------+
//! (low address)
//! ```
//!
//! All frame accesses emitted during lowering and register allocation are
//! nominal-SP-relative; the final offsets are known once the register
//! allocator has reported its spill-slot count.

use crate::ir::{ArgumentPurpose, ExternalName, Signature, StackSlot, Type};
use crate::isa::CallConv;
use crate::machinst::reg::{RealReg, Reg, Writable};
use crate::machinst::valueregs::ValueRegs;
use crate::machinst::MachInstEmit;
use crate::result::{CodegenError, CodegenResult};
use crate::entity::SecondaryMap;
use smallvec::{smallvec, SmallVec};

/// A small vector of instructions, the common return type of ABI
/// generation helpers.
pub type SmallInstVec<I> = SmallVec<[I; 4]>;

/// Are we computing argument locations or return-value locations?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgsOrRets {
    /// Arguments.
    Args,
    /// Return values.
    Rets,
}

/// A location for (part of) an argument or return value.
#[derive(Clone, Copy, Debug)]
pub enum ABIArgSlot {
    /// In a real register.
    Reg {
        /// Register that holds this slot.
        reg: RealReg,
        /// Value type of this slot.
        ty: Type,
    },
    /// Arguments only: on the stack, at the given offset from the ABI
    /// argument area base (SP at the call instant, FP+setup in the
    /// callee).
    Stack {
        /// Offset of this slot in the argument area.
        offset: i64,
        /// Value type of this slot.
        ty: Type,
    },
}

/// An ABIArg is composed of one or more slots. This allows for a CLIF-level
/// Value to be passed with its parts in more than one location at the ABI
/// level.
#[derive(Clone, Debug)]
pub struct ABIArg {
    /// Slots, one per register part (e.g., two for an `i128`).
    pub slots: SmallVec<[ABIArgSlot; 2]>,
    /// The special purpose of this arg, if any.
    pub purpose: ArgumentPurpose,
}

impl ABIArg {
    /// A one-register argument.
    pub fn reg(reg: RealReg, ty: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            slots: smallvec![ABIArgSlot::Reg { reg, ty }],
            purpose,
        }
    }

    /// A one-slot stack argument.
    pub fn stack(offset: i64, ty: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            slots: smallvec![ABIArgSlot::Stack { offset, ty }],
            purpose,
        }
    }
}

/// The computed ABI lowering of a signature.
#[derive(Clone, Debug)]
pub struct SigData {
    /// Argument locations.
    pub args: Vec<ABIArg>,
    /// Return-value locations.
    pub rets: Vec<ABIArg>,
    /// Bytes of stack space needed for arguments.
    pub sized_stack_arg_space: u32,
    /// Index into `args` of the struct-return pointer argument, if used.
    pub stack_ret_arg: Option<usize>,
    /// The calling convention.
    pub call_conv: CallConv,
}

/// The final frame layout of a compiled function, available during
/// emission.
#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    /// FP and return-address save area size, in bytes.
    pub setup_area_size: u32,
    /// Bytes used to save callee-saved registers.
    pub clobber_size: u32,
    /// Bytes of explicit stack slots.
    pub fixed_frame_storage_size: u32,
    /// Bytes of register-allocator spill slots.
    pub spillslots_size: u32,
    /// Bytes of outgoing call-argument space.
    pub outgoing_args_size: u32,
    /// The callee-saved registers that are actually clobbered and must be
    /// saved, in a fixed order.
    pub clobbered_callee_saves: Vec<RealReg>,
}

impl FrameLayout {
    /// Size of the part of the frame below the FP/LR save area: what SP
    /// is dropped by after the frame-pointer setup.
    pub fn frame_size(&self) -> u32 {
        self.clobber_size
            + self.fixed_frame_storage_size
            + self.spillslots_size
            + self.outgoing_args_size
    }

    /// Offset from nominal SP (post-prologue SP) to the start of the
    /// spill-slot area.
    pub fn spillslot_base(&self) -> i64 {
        i64::from(self.outgoing_args_size)
    }

    /// Offset from nominal SP to the start of the explicit stack slots.
    pub fn stackslot_base(&self) -> i64 {
        i64::from(self.outgoing_args_size) + i64::from(self.spillslots_size)
    }

    /// Offset from nominal SP to the incoming argument area.
    pub fn incoming_arg_base(&self) -> i64 {
        i64::from(self.frame_size()) + i64::from(self.setup_area_size)
    }
}

/// A spill slot allocated by the register allocator, in abstract units of
/// one machine word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpillSlot(pub u32);

/// The destination of a call.
#[derive(Clone, Debug)]
pub enum CallDest {
    /// Direct, to a symbol.
    ExtName(ExternalName),
    /// Indirect, through a register holding a code pointer.
    Reg(Reg),
}

/// A stack location expressed against one of the frame's regions.
///
/// During lowering and register allocation, the sizes of the spill and
/// outgoing-argument regions are not yet known, so stack references name
/// a region plus an offset; the emitter resolves them against the final
/// `FrameLayout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackAMode {
    /// Offset within the outgoing-argument area (base: SP).
    OutgoingArg(i64),
    /// Offset within the spill-slot region.
    SpillOffset(i64),
    /// Offset within the explicit stack-slot region.
    SlotOffset(i64),
    /// Offset within the incoming-argument area (above the frame).
    IncomingArg(i64),
}

impl StackAMode {
    /// Resolve to a byte offset from the post-prologue SP.
    pub fn resolve(self, frame: &FrameLayout) -> i64 {
        match self {
            Self::OutgoingArg(off) => off,
            Self::SpillOffset(off) => off + i64::from(frame.outgoing_args_size),
            Self::SlotOffset(off) => {
                off + i64::from(frame.outgoing_args_size) + i64::from(frame.spillslots_size)
            }
            Self::IncomingArg(off) => off + frame.incoming_arg_base(),
        }
    }
}

/// Trait implemented by machine-specific backend to provide information
/// about register assignments and to generate the specific instructions
/// the ABI code needs.
pub trait ABIMachineSpec {
    /// The instruction type.
    type I: MachInstEmit;

    /// Returns the number of bits in a word, that is 32/64.
    fn word_bits() -> u32;

    /// The stack-pointer alignment requirement, in bytes.
    fn stack_align() -> u32;

    /// Size of the frame-setup area between the incoming arguments and
    /// this function's own frame: the FP/LR pair on most targets, the
    /// 160-byte register save area on s390x.
    fn setup_area_size() -> u32 {
        16
    }

    /// Process a list of parameters or return values and allocate them to
    /// registers and stack slots.
    ///
    /// Returns the list of argument locations, the stack-arg-space size,
    /// and the index of the struct-return arg if one was synthesized or
    /// found.
    fn compute_arg_locs(
        call_conv: CallConv,
        params: &[crate::ir::AbiParam],
        args_or_rets: ArgsOrRets,
    ) -> CodegenResult<(Vec<ABIArg>, u32, Option<usize>)>;

    /// Generate a load from a frame-region-relative location.
    fn gen_load_stack(mem: StackAMode, into: Writable<Reg>, ty: Type) -> Self::I;

    /// Generate a store to a frame-region-relative location.
    fn gen_store_stack(mem: StackAMode, from: Reg, ty: Type) -> Self::I;

    /// Generate an instruction computing the address of a frame-region-
    /// relative location.
    fn gen_stack_addr(mem: StackAMode, into: Writable<Reg>) -> Self::I;

    /// Generate the function prologue: frame-pointer setup, SP
    /// adjustment, and callee-save stores, per the given layout.
    fn gen_prologue(frame: &FrameLayout) -> SmallInstVec<Self::I>;

    /// Generate the function epilogue, including the return instruction.
    fn gen_epilogue(frame: &FrameLayout) -> SmallInstVec<Self::I>;

    /// Generate a call instruction with the given metadata.
    fn gen_call(
        dest: CallDest,
        uses: SmallVec<[RealReg; 8]>,
        defs: SmallVec<[RealReg; 8]>,
        clobbers: SmallVec<[RealReg; 8]>,
    ) -> Self::I;

    /// Generate a tail call: the instruction tears down the frame itself
    /// (using the frame layout in the emit state) and jumps.
    fn gen_tail_call(dest: CallDest, uses: SmallVec<[RealReg; 8]>) -> Self::I;

    /// The registers a call clobbers under this convention (the
    /// caller-saved set).
    fn caller_saved_regs(call_conv: CallConv) -> SmallVec<[RealReg; 8]>;

    /// The full callee-saved set for this convention, in save order.
    fn callee_saved_regs(call_conv: CallConv) -> SmallVec<[RealReg; 8]>;
}

/// ABI object for a function body: argument/return handling and frame
/// management from the callee's perspective.
pub struct Callee<M: ABIMachineSpec> {
    /// Computed locations for the signature.
    sig: SigData,
    /// The IR signature.
    ir_sig: Signature,
    /// Offsets of the explicit stack slots within the fixed storage area.
    stackslot_offsets: SecondaryMap<StackSlot, u32>,
    /// Total explicit stack-slot space.
    stackslots_size: u32,
    /// Spill-slot space, filled in after register allocation.
    spillslots_size: u32,
    /// Maximum outgoing call-argument space used by any call in the body.
    outgoing_args_size: u32,
    /// Whether the body contains any call; a frameless leaf needs no
    /// FP/LR setup at all.
    is_leaf: bool,
    /// The clobbered callee-saves, filled in after register allocation.
    clobbered: Vec<RealReg>,
    /// Cached frame layout, computed once everything above is known.
    frame: Option<FrameLayout>,
    _marker: core::marker::PhantomData<M>,
}

impl<M: ABIMachineSpec> Callee<M> {
    /// Create a new body ABI instance for the given function.
    pub fn new(func: &crate::ir::Function) -> CodegenResult<Self> {
        legalize_signature(&func.signature)?;
        let (args, _, stack_ret_arg) =
            M::compute_arg_locs(func.signature.call_conv, &func.signature.params, ArgsOrRets::Args)?;
        let (rets, _, _) =
            M::compute_arg_locs(func.signature.call_conv, &func.signature.returns, ArgsOrRets::Rets)?;

        let sig = SigData {
            args,
            rets,
            sized_stack_arg_space: 0,
            stack_ret_arg,
            call_conv: func.signature.call_conv,
        };

        // Lay out the explicit stack slots, respecting each slot's
        // alignment, densely from the bottom of the fixed storage area.
        let mut stackslot_offsets = SecondaryMap::new();
        let mut offset: u32 = 0;
        for (slot, data) in func.stack_slots.iter() {
            let align = data.align().max(1);
            offset = (offset + align - 1) & !(align - 1);
            stackslot_offsets[slot] = offset;
            offset += data.size;
        }
        let align = M::stack_align();
        let stackslots_size = (offset + align - 1) & !(align - 1);

        // Incoming stack arguments are addressed relative to the frame
        // setup area, so a function receiving them always builds a frame.
        let has_stack_args = sig
            .args
            .iter()
            .any(|a| a.slots.iter().any(|s| matches!(s, ABIArgSlot::Stack { .. })));

        Ok(Self {
            sig,
            ir_sig: func.signature.clone(),
            stackslot_offsets,
            stackslots_size,
            spillslots_size: 0,
            outgoing_args_size: 0,
            is_leaf: !has_stack_args,
            clobbered: vec![],
            frame: None,
            _marker: core::marker::PhantomData,
        })
    }

    /// The IR signature of this function.
    pub fn ir_signature(&self) -> &Signature {
        &self.ir_sig
    }

    /// The computed argument/return locations.
    pub fn sig_data(&self) -> &SigData {
        &self.sig
    }

    /// Number of arguments (including any synthesized sret pointer).
    pub fn num_args(&self) -> usize {
        self.sig.args.len()
    }

    /// Record that a call site needs `size` bytes of outgoing argument
    /// space.
    pub fn accumulate_outgoing_args_size(&mut self, size: u32) {
        self.is_leaf = false;
        if size > self.outgoing_args_size {
            self.outgoing_args_size = size;
        }
    }

    /// Generate instructions moving the incoming argument `idx` into the
    /// given virtual registers at the top of the entry block.
    pub fn gen_copy_arg_to_regs(
        &self,
        idx: usize,
        into: ValueRegs<Writable<Reg>>,
    ) -> SmallInstVec<M::I> {
        let mut insts = smallvec![];
        let arg = &self.sig.args[idx];
        debug_assert_eq!(arg.slots.len(), into.len());
        for (slot, into_reg) in arg.slots.iter().zip(into.regs().iter()) {
            match *slot {
                ABIArgSlot::Reg { reg, ty } => {
                    insts.push(<M::I as crate::machinst::MachInst>::gen_move(
                        *into_reg,
                        Reg::Real(reg),
                        ty,
                    ));
                }
                ABIArgSlot::Stack { offset, ty } => {
                    insts.push(M::gen_load_stack(
                        StackAMode::IncomingArg(offset),
                        *into_reg,
                        ty,
                    ));
                }
            }
        }
        insts
    }

    /// Generate instructions moving the return value `idx` from the given
    /// registers into its ABI locations.
    pub fn gen_copy_regs_to_retval(
        &self,
        idx: usize,
        from: ValueRegs<Reg>,
    ) -> SmallInstVec<M::I> {
        let mut insts = smallvec![];
        let ret = &self.sig.rets[idx];
        debug_assert_eq!(ret.slots.len(), from.len());
        for (slot, &from_reg) in ret.slots.iter().zip(from.regs().iter()) {
            match *slot {
                ABIArgSlot::Reg { reg, ty } => {
                    insts.push(<M::I as crate::machinst::MachInst>::gen_move(
                        Writable::from_reg(Reg::Real(reg)),
                        from_reg,
                        ty,
                    ));
                }
                ABIArgSlot::Stack { .. } => {
                    // Return values never use stack slots in the
                    // supported conventions; large aggregates go through
                    // the sret pointer.
                    unreachable!("stack return slot");
                }
            }
        }
        insts
    }

    /// The address of an explicit stack slot, as an instruction writing
    /// to `into`.
    pub fn stackslot_addr(&self, slot: StackSlot, offset: u32, into: Writable<Reg>) -> M::I {
        let base = i64::from(self.stackslot_offsets[slot]) + i64::from(offset);
        M::gen_stack_addr(StackAMode::SlotOffset(base), into)
    }

    /// A load from an explicit stack slot.
    pub fn stackslot_load(
        &self,
        slot: StackSlot,
        offset: u32,
        into: Writable<Reg>,
        ty: Type,
    ) -> M::I {
        let base = i64::from(self.stackslot_offsets[slot]) + i64::from(offset);
        M::gen_load_stack(StackAMode::SlotOffset(base), into, ty)
    }

    /// A store to an explicit stack slot.
    pub fn stackslot_store(&self, slot: StackSlot, offset: u32, from: Reg, ty: Type) -> M::I {
        let base = i64::from(self.stackslot_offsets[slot]) + i64::from(offset);
        M::gen_store_stack(StackAMode::SlotOffset(base), from, ty)
    }

    /// Record the spill-slot count required by register allocation, in
    /// word units.
    pub fn set_num_spillslots(&mut self, slots: usize) {
        let bytes = (slots as u32) * (M::word_bits() / 8);
        let align = M::stack_align();
        self.spillslots_size = (bytes + align - 1) & !(align - 1);
        self.frame = None;
    }

    /// Record the clobbered registers seen by register allocation.
    pub fn set_clobbered(&mut self, clobbered: Vec<RealReg>) {
        let callee_saved = M::callee_saved_regs(self.sig.call_conv);
        self.clobbered = callee_saved
            .iter()
            .copied()
            .filter(|r| clobbered.contains(r))
            .collect();
        self.frame = None;
    }

    /// Generate a spill of `from` to the given spill slot.
    pub fn gen_spill(&self, to_slot: SpillSlot, from: RealReg, ty: Type) -> M::I {
        let offset = self.spillslot_offset(to_slot);
        M::gen_store_stack(StackAMode::SpillOffset(offset), Reg::Real(from), ty)
    }

    /// Generate a reload of the given spill slot into `into`.
    pub fn gen_reload(&self, into: Writable<Reg>, from_slot: SpillSlot, ty: Type) -> M::I {
        let offset = self.spillslot_offset(from_slot);
        M::gen_load_stack(StackAMode::SpillOffset(offset), into, ty)
    }

    fn spillslot_offset(&self, slot: SpillSlot) -> i64 {
        i64::from(slot.0) * i64::from(M::word_bits() / 8)
    }

    /// Compute (and cache) the final frame layout.
    ///
    /// A leaf function with no frame contents at all skips the FP/LR
    /// setup entirely; `setup_area_size == 0` is the signal the per-ISA
    /// prologue/epilogue generators check.
    pub fn frame_layout(&mut self) -> &FrameLayout {
        if self.frame.is_none() {
            let frameless = self.is_leaf
                && self.stackslots_size == 0
                && self.spillslots_size == 0
                && self.outgoing_args_size == 0
                && self.clobbered.is_empty();
            self.frame = Some(FrameLayout {
                setup_area_size: if frameless { 0 } else { M::setup_area_size() },
                clobber_size: clobber_size::<M>(&self.clobbered),
                fixed_frame_storage_size: self.stackslots_size,
                spillslots_size: self.spillslots_size,
                outgoing_args_size: self.outgoing_args_size,
                clobbered_callee_saves: self.clobbered.clone(),
            });
        }
        self.frame.as_ref().unwrap()
    }

    /// Generate the prologue.
    pub fn gen_prologue(&mut self) -> SmallInstVec<M::I> {
        let frame = self.frame_layout().clone();
        M::gen_prologue(&frame)
    }

    /// Generate the epilogue, including the return.
    pub fn gen_epilogue(&mut self) -> SmallInstVec<M::I> {
        let frame = self.frame_layout().clone();
        M::gen_epilogue(&frame)
    }

    /// The total frame size (bytes SP is dropped by in the prologue).
    pub fn frame_size(&mut self) -> u32 {
        self.frame_layout().frame_size()
    }
}

fn clobber_size<M: ABIMachineSpec>(clobbered: &[RealReg]) -> u32 {
    // One word per clobbered register, rounded up to the stack alignment.
    let bytes = (clobbered.len() as u32) * (M::word_bits() / 8);
    let align = M::stack_align();
    (bytes + align - 1) & !(align - 1)
}

/// ABI object for a call site: argument marshalling and the call
/// instruction itself, from the caller's perspective.
pub struct CallSite<M: ABIMachineSpec> {
    /// Computed locations for the callee's signature.
    sig: SigData,
    /// The destination of the call.
    dest: CallDest,
    _marker: core::marker::PhantomData<M>,
}

impl<M: ABIMachineSpec> CallSite<M> {
    /// Create a call site for the given callee signature and destination.
    pub fn new(sig: &Signature, dest: CallDest) -> CodegenResult<Self> {
        let (args, stack_arg_space, stack_ret_arg) =
            M::compute_arg_locs(sig.call_conv, &sig.params, ArgsOrRets::Args)?;
        let (rets, _, _) = M::compute_arg_locs(sig.call_conv, &sig.returns, ArgsOrRets::Rets)?;
        Ok(Self {
            sig: SigData {
                args,
                rets,
                sized_stack_arg_space: stack_arg_space,
                stack_ret_arg,
                call_conv: sig.call_conv,
            },
            dest,
            _marker: core::marker::PhantomData,
        })
    }

    /// Stack space needed for this call's outgoing arguments.
    pub fn stack_arg_space(&self) -> u32 {
        self.sig.sized_stack_arg_space
    }

    /// Locations of the callee's arguments.
    pub fn args(&self) -> &[ABIArg] {
        &self.sig.args
    }

    /// Locations of the callee's return values.
    pub fn rets(&self) -> &[ABIArg] {
        &self.sig.rets
    }

    /// Generate instructions moving argument `idx` from the given
    /// registers into its ABI locations.
    pub fn gen_arg(&self, idx: usize, from: ValueRegs<Reg>) -> SmallInstVec<M::I> {
        let mut insts = smallvec![];
        let arg = &self.sig.args[idx];
        debug_assert_eq!(arg.slots.len(), from.len());
        for (slot, &from_reg) in arg.slots.iter().zip(from.regs().iter()) {
            match *slot {
                ABIArgSlot::Reg { reg, ty } => {
                    insts.push(<M::I as crate::machinst::MachInst>::gen_move(
                        Writable::from_reg(Reg::Real(reg)),
                        from_reg,
                        ty,
                    ));
                }
                ABIArgSlot::Stack { offset, ty } => {
                    insts.push(M::gen_store_stack(
                        StackAMode::OutgoingArg(offset),
                        from_reg,
                        ty,
                    ));
                }
            }
        }
        insts
    }

    /// Generate instructions moving return value `idx` into the given
    /// virtual registers after the call.
    pub fn gen_retval(&self, idx: usize, into: ValueRegs<Writable<Reg>>) -> SmallInstVec<M::I> {
        let mut insts = smallvec![];
        let ret = &self.sig.rets[idx];
        debug_assert_eq!(ret.slots.len(), into.len());
        for (slot, into_reg) in ret.slots.iter().zip(into.regs().iter()) {
            match *slot {
                ABIArgSlot::Reg { reg, ty } => {
                    insts.push(<M::I as crate::machinst::MachInst>::gen_move(
                        *into_reg,
                        Reg::Real(reg),
                        ty,
                    ));
                }
                ABIArgSlot::Stack { .. } => unreachable!("stack return slot"),
            }
        }
        insts
    }

    /// Generate the call instruction itself, with its register metadata.
    pub fn gen_call(&self) -> M::I {
        let mut uses: SmallVec<[RealReg; 8]> = smallvec![];
        for arg in &self.sig.args {
            for slot in &arg.slots {
                if let ABIArgSlot::Reg { reg, .. } = *slot {
                    uses.push(reg);
                }
            }
        }
        let mut defs: SmallVec<[RealReg; 8]> = smallvec![];
        for ret in &self.sig.rets {
            for slot in &ret.slots {
                if let ABIArgSlot::Reg { reg, .. } = *slot {
                    defs.push(reg);
                }
            }
        }
        let clobbers = M::caller_saved_regs(self.sig.call_conv);
        M::gen_call(self.dest.clone(), uses, defs, clobbers)
    }
}

/// Check a signature for unsupported shapes early, with a clear error.
pub fn legalize_signature(sig: &Signature) -> CodegenResult<()> {
    if sig.returns.len() > 2
        && !sig
            .params
            .iter()
            .any(|p| p.purpose == ArgumentPurpose::StructReturn)
    {
        return Err(CodegenError::Unsupported(
            "more than two register return values; use an sret pointer".into(),
        ));
    }
    Ok(())
}
