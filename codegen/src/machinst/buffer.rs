//! In-memory representation of compiled machine code, with labels and
//! fixups to refer to those labels. Handles constant-pool island insertion
//! and veneer insertion for out-of-range branches.
//!
//! The buffer is an append-only byte vector. Labels are symbolic
//! positions: an instruction can bind a label at the current offset, or
//! use a label before it is bound, which queues a *fixup*. When all code
//! has been emitted, `finish()` patches every fixup with the label's final
//! offset.
//!
//! Some label-use kinds have a limited range (a conditional branch on
//! AArch64 reaches +/- 1 MiB). While emitting, the buffer tracks the
//! earliest deadline by which an *island* must be emitted: a point, jumped
//! over by the fall-through path, where pending constants are placed and
//! out-of-range fixups are redirected through *veneers* with a longer
//! range. The emission driver asks `island_needed()` between instructions
//! and calls `emit_island()` at a convenient spot.

use crate::binemit::{Addend, CodeOffset, MachReloc, MachTrap, Reloc};
use crate::fx::FxHashMap;
use crate::ir::{ExternalName, SourceLoc, TrapCode};
use crate::machinst::MachInstEmit;
use crate::result::{CodegenError, CodegenResult, EncodingError};
use core::fmt;
use smallvec::SmallVec;
use std::marker::PhantomData;

/// A label refers to a position in emitted code. There is potentially a
/// one-way fixup chain of references to it that are patched when its
/// offset becomes known.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachLabel(u32);

impl MachLabel {
    /// Get a label for a block. (The first N labels are always reserved
    /// for the N blocks of the vcode being compiled.)
    pub fn from_block(bindex: u32) -> Self {
        Self(bindex)
    }

    /// Get the numeric label index.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MachLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

/// The offset of an unbound label.
const UNKNOWN_LABEL_OFFSET: CodeOffset = 0xffff_ffff;

/// Describes a usage of a label with a target-specific patching protocol.
///
/// Every backend defines its own `LabelUse` type enumerating the
/// PC-relative field formats it emits.
pub trait MachInstLabelUse: Clone + Copy + fmt::Debug + PartialEq + Eq {
    /// Required alignment for any veneer this use can be redirected
    /// through.
    const ALIGN: CodeOffset;

    /// Maximum PC-relative range (positive). E.g., a 19-bit offset field
    /// shifted left 2 bits gives 2^20 bytes forward.
    fn max_pos_range(self) -> CodeOffset;
    /// Maximum PC-relative range (negative).
    fn max_neg_range(self) -> CodeOffset;
    /// Size of the patch region in bytes.
    fn patch_size(self) -> CodeOffset;
    /// Perform the patch.
    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset);
    /// Can the label use be patched to a veneer that supports a longer
    /// range?
    fn supports_veneer(self) -> bool;
    /// How many bytes does a veneer take, if supported?
    fn veneer_size(self) -> CodeOffset;
    /// Generate a veneer into the buffer, given that this use will be
    /// patched to point to the veneer. Returns the offset and label-use
    /// kind of the veneer's own label reference.
    fn generate_veneer(self, buffer: &mut [u8], veneer_offset: CodeOffset) -> (CodeOffset, Self);
}

/// A fixup to perform on the buffer once code is emitted: patch the
/// region starting at `offset` with the eventual location of `label`.
#[derive(Clone, Debug)]
struct MachLabelFixup<I: MachInstEmit> {
    label: MachLabel,
    offset: CodeOffset,
    kind: I::LabelUse,
}

/// A pending constant-pool entry, emitted at the next island.
#[derive(Clone, Debug)]
struct MachLabelConstant {
    label: MachLabel,
    align: CodeOffset,
    data: SmallVec<[u8; 16]>,
}

/// A buffer of output to be produced, fixed up, and then emitted to a CodeSink
/// in bulk.
pub struct MachBuffer<I: MachInstEmit> {
    /// The buffer contents, as raw bytes.
    data: Vec<u8>,
    /// Any relocations referring to this code.
    relocs: Vec<MachReloc>,
    /// Any trap records referring to this code.
    traps: Vec<MachTrap>,
    /// The current source location in progress.
    cur_srcloc: SourceLoc,
    /// Known label offsets; `UNKNOWN_LABEL_OFFSET` if unknown.
    label_offsets: Vec<CodeOffset>,
    /// Fixups that must be performed after all code is emitted.
    fixups: Vec<MachLabelFixup<I>>,
    /// Latest offset at which an island must be emitted so every pending
    /// veneer-capable fixup stays in range.
    island_deadline: CodeOffset,
    /// Constants that must be emitted at the next island.
    pending_constants: Vec<MachLabelConstant>,
    /// Map from constant data to label, for pool deduplication.
    constant_labels: FxHashMap<(SmallVec<[u8; 16]>, CodeOffset), MachLabel>,
    _phantom: PhantomData<I>,
}

/// A `MachBuffer` once emission is completed: holds generated code and
/// records of relocations and trap sites, ready to hand off to the
/// embedder.
pub struct MachBufferFinalized {
    /// The buffer contents.
    pub data: Vec<u8>,
    /// Any relocations referring to this code.
    pub relocs: Vec<MachReloc>,
    /// Any trap records referring to this code.
    pub traps: Vec<MachTrap>,
}

impl MachBufferFinalized {
    /// Get the total required size for the code.
    pub fn total_size(&self) -> CodeOffset {
        self.data.len() as CodeOffset
    }
}

impl<I: MachInstEmit> MachBuffer<I> {
    /// Create a new section, known to start at `start_offset` and with a
    /// size limited to 32 bits.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            relocs: Vec::new(),
            traps: Vec::new(),
            cur_srcloc: SourceLoc::default(),
            label_offsets: Vec::new(),
            fixups: Vec::new(),
            island_deadline: UNKNOWN_LABEL_OFFSET,
            pending_constants: Vec::new(),
            constant_labels: FxHashMap::default(),
            _phantom: PhantomData,
        }
    }

    /// Current offset from the start of the buffer.
    pub fn cur_offset(&self) -> CodeOffset {
        self.data.len() as CodeOffset
    }

    /// Add a byte.
    pub fn put1(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Add 2 bytes.
    pub fn put2(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add 4 bytes.
    pub fn put4(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add 8 bytes.
    pub fn put8(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add a slice of bytes.
    pub fn put_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Align up to the given alignment.
    pub fn align_to(&mut self, align_to: CodeOffset) {
        assert!(align_to.is_power_of_two());
        while self.cur_offset() & (align_to - 1) != 0 {
            self.put1(0);
        }
    }

    /// Allocate a `Label` to refer to some offset. It is not valid to use
    /// the label's offset until it has been bound.
    pub fn get_label(&mut self) -> MachLabel {
        let l = self.label_offsets.len() as u32;
        self.label_offsets.push(UNKNOWN_LABEL_OFFSET);
        MachLabel(l)
    }

    /// Reserve the first N label numbers for blocks.
    pub fn reserve_labels_for_blocks(&mut self, blocks: u32) {
        debug_assert!(self.label_offsets.is_empty());
        self.label_offsets
            .resize(blocks as usize, UNKNOWN_LABEL_OFFSET);
    }

    /// Bind a label to the current offset.
    pub fn bind_label(&mut self, label: MachLabel) {
        debug_assert_eq!(
            self.label_offsets[label.0 as usize],
            UNKNOWN_LABEL_OFFSET,
            "label bound twice"
        );
        trace!("bind {:?} -> {}", label, self.cur_offset());
        self.label_offsets[label.0 as usize] = self.cur_offset();
    }

    /// The offset of a bound label, or `None` if unbound.
    pub fn label_offset(&self, label: MachLabel) -> Option<CodeOffset> {
        let off = self.label_offsets[label.0 as usize];
        if off == UNKNOWN_LABEL_OFFSET {
            None
        } else {
            Some(off)
        }
    }

    /// Inform the buffer of an unresolved label reference at the given
    /// offset, with the given patch kind. The data for the reference must
    /// already have been emitted (usually as zero bits).
    pub fn use_label_at_offset(&mut self, offset: CodeOffset, label: MachLabel, kind: I::LabelUse) {
        trace!("use {:?} at {} kind {:?}", label, offset, kind);
        // If the kind has a limited range and can be veneered, ensure we
        // emit an island before the use goes out of range.
        if kind.supports_veneer() {
            let deadline = offset.saturating_add(kind.max_pos_range());
            if deadline < self.island_deadline {
                self.island_deadline = deadline;
            }
        }
        self.fixups.push(MachLabelFixup {
            label,
            offset,
            kind,
        });
    }

    /// Add a constant to be emitted at the next island, returning a label
    /// that refers to it. Equal constants share a pool slot.
    pub fn get_label_for_constant(&mut self, data: &[u8], align: CodeOffset) -> MachLabel {
        let key = (SmallVec::from_slice(data), align);
        if let Some(&label) = self.constant_labels.get(&key) {
            return label;
        }
        let label = self.get_label();
        self.constant_labels.insert(key, label);
        self.pending_constants.push(MachLabelConstant {
            label,
            align,
            data: SmallVec::from_slice(data),
        });
        // Constants are typically referenced by limited-range loads; be
        // conservative and flush within the smallest common range (1 MiB
        // covers AArch64's LDR literal, the tightest user).
        let deadline = self.cur_offset().saturating_add((1 << 20) - (1 << 10));
        if deadline < self.island_deadline {
            self.island_deadline = deadline;
        }
        label
    }

    /// Is an island needed within the next `distance` bytes?
    pub fn island_needed(&self, distance: CodeOffset) -> bool {
        self.cur_offset().saturating_add(distance) > self.island_deadline
    }

    /// Emit an island of pending constants and veneers.
    ///
    /// The caller is responsible for branching around this island if
    /// execution would otherwise fall through into it.
    pub fn emit_island(&mut self) {
        trace!("island at {}", self.cur_offset());
        let constants = std::mem::take(&mut self.pending_constants);
        for constant in constants {
            self.align_to(constant.align);
            let offset = self.cur_offset();
            self.label_offsets[constant.label.0 as usize] = offset;
            self.put_data(&constant.data);
        }

        // Redirect every pending veneer-capable fixup whose label is still
        // unbound through a veneer with longer range. Bound labels are
        // left for `finish()`; they can always be patched directly since
        // the deadline logic kept them in range.
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            let MachLabelFixup {
                label,
                offset,
                kind,
            } = fixup;
            let resolved = self.label_offsets[label.0 as usize] != UNKNOWN_LABEL_OFFSET;
            if !resolved && kind.supports_veneer() {
                self.align_to(I::LabelUse::ALIGN);
                let veneer_offset = self.cur_offset();
                // Patch the original site to branch to the veneer.
                kind.patch(
                    &mut self.data[offset as usize..(offset + kind.patch_size()) as usize],
                    offset,
                    veneer_offset,
                );
                // Emit the veneer body.
                let veneer_size = kind.veneer_size();
                self.data
                    .resize((veneer_offset + veneer_size) as usize, 0);
                let (use_offset, use_kind) = kind.generate_veneer(
                    &mut self.data[veneer_offset as usize..],
                    veneer_offset,
                );
                trace!(
                    "veneer at {} for {:?} (kind {:?} -> {:?})",
                    veneer_offset,
                    label,
                    kind,
                    use_kind
                );
                self.fixups.push(MachLabelFixup {
                    label,
                    offset: use_offset,
                    kind: use_kind,
                });
            } else {
                self.fixups.push(MachLabelFixup {
                    label,
                    offset,
                    kind,
                });
            }
        }

        // Recompute the deadline over the remaining fixups.
        self.island_deadline = UNKNOWN_LABEL_OFFSET;
        for fixup in &self.fixups {
            if fixup.kind.supports_veneer() {
                let resolved =
                    self.label_offsets[fixup.label.0 as usize] != UNKNOWN_LABEL_OFFSET;
                if !resolved {
                    let deadline = fixup.offset.saturating_add(fixup.kind.max_pos_range());
                    if deadline < self.island_deadline {
                        self.island_deadline = deadline;
                    }
                }
            }
        }
    }

    /// Set the `SourceLoc` for code from this offset until the offset at
    /// the next call to `end_srcloc()`.
    pub fn start_srcloc(&mut self, loc: SourceLoc) {
        self.cur_srcloc = loc;
    }

    /// Mark the end of the `SourceLoc` segment.
    pub fn end_srcloc(&mut self) {
        self.cur_srcloc = SourceLoc::default();
    }

    /// Add an external relocation at the current offset.
    pub fn add_reloc(&mut self, kind: Reloc, name: &ExternalName, addend: Addend) {
        let offset = self.cur_offset();
        self.relocs.push(MachReloc {
            offset,
            kind,
            name: name.clone(),
            addend,
        });
    }

    /// Add a trap record for the current offset.
    pub fn add_trap(&mut self, code: TrapCode) {
        self.traps.push(MachTrap {
            offset: self.cur_offset(),
            code,
            srcloc: self.cur_srcloc,
        });
    }

    /// Finish the buffer: emit any remaining island, resolve all fixups,
    /// and return the final code and metadata.
    pub fn finish(mut self) -> CodegenResult<MachBufferFinalized> {
        if !self.pending_constants.is_empty() {
            self.emit_island();
        }

        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            let label_offset = self.label_offsets[fixup.label.0 as usize];
            assert_ne!(
                label_offset, UNKNOWN_LABEL_OFFSET,
                "unbound label {:?} at finish",
                fixup.label
            );
            let in_range = if label_offset >= fixup.offset {
                (label_offset - fixup.offset) <= fixup.kind.max_pos_range()
            } else {
                (fixup.offset - label_offset) <= fixup.kind.max_neg_range()
            };
            if !in_range {
                return Err(CodegenError::Encoding(EncodingError::BranchOutOfRange));
            }
            let start = fixup.offset as usize;
            let end = (fixup.offset + fixup.kind.patch_size()) as usize;
            fixup
                .kind
                .patch(&mut self.data[start..end], fixup.offset, label_offset);
        }

        Ok(MachBufferFinalized {
            data: self.data,
            relocs: self.relocs,
            traps: self.traps,
        })
    }
}

impl<I: MachInstEmit> Default for MachBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machinst::{MachInst, MachTerminator, OperandCollector, RegMapper};
    use crate::machinst::reg::{Reg, Writable};
    use crate::ir::Type;

    /// A trivial instruction type for buffer tests, with one label-use
    /// kind mimicking a 19-bit conditional branch and a 26-bit veneer
    /// form.
    #[derive(Clone, Debug)]
    struct DummyInst;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum DummyLabelUse {
        Branch19,
        Branch26,
    }

    impl MachInstLabelUse for DummyLabelUse {
        const ALIGN: CodeOffset = 4;

        fn max_pos_range(self) -> CodeOffset {
            match self {
                Self::Branch19 => (1 << 20) - 1,
                Self::Branch26 => (1 << 27) - 1,
            }
        }
        fn max_neg_range(self) -> CodeOffset {
            self.max_pos_range() + 1
        }
        fn patch_size(self) -> CodeOffset {
            4
        }
        fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
            let pc_rel = (label_offset as i64 - use_offset as i64) >> 2;
            let insn = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
            let insn = match self {
                Self::Branch19 => insn | (((pc_rel as u32) & 0x7ffff) << 5),
                Self::Branch26 => insn | ((pc_rel as u32) & 0x03ff_ffff),
            };
            buffer[0..4].copy_from_slice(&insn.to_le_bytes());
        }
        fn supports_veneer(self) -> bool {
            matches!(self, Self::Branch19)
        }
        fn veneer_size(self) -> CodeOffset {
            4
        }
        fn generate_veneer(
            self,
            buffer: &mut [u8],
            veneer_offset: CodeOffset,
        ) -> (CodeOffset, Self) {
            // An unconditional branch with a 26-bit range.
            buffer[0..4].copy_from_slice(&0x1400_0000u32.to_le_bytes());
            (veneer_offset, Self::Branch26)
        }
    }

    impl MachInst for DummyInst {
        type LabelUse = DummyLabelUse;
        fn get_operands(&self, _collector: &mut OperandCollector) {}
        fn map_regs(&mut self, _mapper: &dyn RegMapper) {}
        fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
            None
        }
        fn is_term(&self) -> MachTerminator {
            MachTerminator::None
        }
        fn gen_move(_to: Writable<Reg>, _from: Reg, _ty: Type) -> Self {
            DummyInst
        }
        fn gen_jump(_target: MachLabel) -> Self {
            DummyInst
        }
        fn gen_ret() -> Self {
            DummyInst
        }
        fn worst_case_size() -> CodeOffset {
            4
        }
    }

    impl MachInstEmit for DummyInst {
        type State = ();
        fn emit(&self, _sink: &mut MachBuffer<Self>, _state: &mut ()) {}
        fn pretty_print(&self, _state: &mut ()) -> String {
            "dummy".to_string()
        }
    }

    #[test]
    fn label_bind_and_patch() {
        let mut buf = MachBuffer::<DummyInst>::new();
        let label = buf.get_label();
        // A branch at offset 0 referring forward.
        buf.put4(0x5400_0000);
        buf.use_label_at_offset(0, label, DummyLabelUse::Branch19);
        buf.put4(0xd503_201f); // some other instruction
        buf.bind_label(label);
        buf.put4(0xd65f_03c0);
        let finished = buf.finish().unwrap();
        let insn = u32::from_le_bytes(finished.data[0..4].try_into().unwrap());
        // Offset 8, shifted right 2 = 2, in bits 23..5.
        assert_eq!(insn, 0x5400_0000 | (2 << 5));
    }

    #[test]
    fn backward_branch() {
        let mut buf = MachBuffer::<DummyInst>::new();
        let label = buf.get_label();
        buf.bind_label(label);
        buf.put4(0xd503_201f);
        let off = buf.cur_offset();
        buf.put4(0x5400_0000);
        buf.use_label_at_offset(off, label, DummyLabelUse::Branch19);
        let finished = buf.finish().unwrap();
        let insn = u32::from_le_bytes(finished.data[4..8].try_into().unwrap());
        // Offset -4 >> 2 = -1, masked to 19 bits.
        assert_eq!(insn, 0x5400_0000 | (0x7ffff << 5));
    }

    #[test]
    fn island_and_veneer() {
        let mut buf = MachBuffer::<DummyInst>::new();
        let label = buf.get_label();
        buf.put4(0x5400_0000);
        buf.use_label_at_offset(0, label, DummyLabelUse::Branch19);

        // Simulate a long function body: emit nops until the island
        // deadline approaches, then emit the island.
        while !buf.island_needed(8) {
            buf.put4(0xd503_201f);
        }
        buf.emit_island();

        // Now bind the label beyond the 19-bit range of the original
        // branch; the veneer covers the distance.
        for _ in 0..1024 {
            buf.put4(0xd503_201f);
        }
        buf.bind_label(label);
        buf.put4(0xd65f_03c0);

        let finished = buf.finish().unwrap();
        // The original branch must point at the veneer, which is within
        // its range, and the veneer's Branch26 must point at the label.
        let insn0 = u32::from_le_bytes(finished.data[0..4].try_into().unwrap());
        let veneer_off = ((insn0 >> 5) & 0x7ffff) << 2;
        let veneer = u32::from_le_bytes(
            finished.data[veneer_off as usize..veneer_off as usize + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(veneer & 0xfc00_0000, 0x1400_0000);
    }

    #[test]
    fn constant_pool_dedup() {
        let mut buf = MachBuffer::<DummyInst>::new();
        let a = buf.get_label_for_constant(&42u64.to_le_bytes(), 8);
        let b = buf.get_label_for_constant(&42u64.to_le_bytes(), 8);
        let c = buf.get_label_for_constant(&43u64.to_le_bytes(), 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        buf.emit_island();
        assert_eq!(buf.label_offset(a), Some(0));
        assert_eq!(buf.label_offset(c), Some(8));
    }
}
