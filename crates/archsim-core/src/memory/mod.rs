//! Sparse byte-addressable memory partitioned into architecture segments.

/// Access widths, byte order, and access policy validation.
pub mod access;
/// Cell metadata and declared datatypes.
pub mod cell;
/// Segment map and address decoder.
pub mod map;

use std::collections::BTreeMap;
use std::fmt::Write as _;

pub use access::{
    validate_alignment, validate_mapped, validate_write_access, AccessWidth, AlignmentPolicy,
    Endianness, MemoryError, UnknownAccessWidth,
};
pub use cell::{DatatypeDescriptor, DeclaredType, MemoryCell};
pub use map::{decode_segment, MemoryLayout, Segment, SegmentDescriptor, SegmentKind};

use crate::{Architecture, IntRepr};

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRead {
    /// Assembled value, zero-extended.
    pub value: IntRepr,
    /// Whether a breakpoint is set on the first byte read.
    pub breakpoint: bool,
}

/// One committed memory write, recorded for step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryDelta {
    /// First byte written.
    pub address: u64,
    /// Access width.
    pub width: AccessWidth,
    /// Value before the write.
    pub old: IntRepr,
    /// Value after the write.
    pub new: IntRepr,
}

/// Simulated main memory owned by one session.
#[derive(Debug, Clone)]
pub struct Memory {
    layout: MemoryLayout,
    endianness: Endianness,
    alignment: AlignmentPolicy,
    cells: BTreeMap<u64, MemoryCell>,
    datatypes: BTreeMap<u64, DatatypeDescriptor>,
    stack_limit: Option<u64>,
    journal: Option<Vec<MemoryDelta>>,
}

impl Memory {
    /// Creates an empty memory for the given layout and access policy.
    #[must_use]
    pub const fn new(layout: MemoryLayout, endianness: Endianness, alignment: AlignmentPolicy) -> Self {
        Self {
            layout,
            endianness,
            alignment,
            cells: BTreeMap::new(),
            datatypes: BTreeMap::new(),
            stack_limit: None,
            journal: None,
        }
    }

    /// Creates an empty memory configured from an architecture description.
    #[must_use]
    pub const fn for_architecture(arch: &Architecture) -> Self {
        Self::new(arch.memory_layout, arch.endianness, arch.alignment)
    }

    /// Segment layout.
    #[must_use]
    pub const fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Byte order used for multi-byte accesses.
    #[must_use]
    pub const fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Tracked lowest stack-pointer value, if any has been recorded.
    #[must_use]
    pub const fn stack_limit(&self) -> Option<u64> {
        self.stack_limit
    }

    /// Records a new stack limit.
    pub const fn set_stack_limit(&mut self, limit: u64) {
        self.stack_limit = Some(limit);
    }

    /// Stack bounds including growth below the declared start.
    #[must_use]
    pub const fn effective_stack(&self) -> Segment {
        self.layout.effective_stack(self.stack_limit)
    }

    /// Segment containing `addr`.
    #[must_use]
    pub const fn segment_of(&self, addr: u64) -> Option<SegmentKind> {
        decode_segment(&self.layout, addr, self.stack_limit)
    }

    /// Enables or disables delta recording for step reports.
    pub fn set_journal_enabled(&mut self, enabled: bool) {
        self.journal = enabled.then(Vec::new);
    }

    /// Drains the deltas recorded since the last call.
    pub fn take_journal(&mut self) -> Vec<MemoryDelta> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Reads `width` bytes at `addr`.
    ///
    /// Bytes that were never declared or written read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Misaligned`] or [`MemoryError::Unmapped`]
    /// before any cell is inspected.
    pub fn read(&self, addr: u64, width: AccessWidth) -> Result<MemoryRead, MemoryError> {
        validate_alignment(addr, width, self.alignment)?;
        validate_mapped(&self.layout, addr, width, self.stack_limit)?;
        Ok(MemoryRead {
            value: self.peek(addr, width),
            breakpoint: self.breakpoint(addr),
        })
    }

    /// Writes the low `width` bytes of `value` at `addr`.
    ///
    /// Creates cells on first write and leaves tag and breakpoint metadata
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Misaligned`], [`MemoryError::TextSegmentWrite`]
    /// or [`MemoryError::Unmapped`]; nothing is mutated on failure.
    pub fn write(&mut self, addr: u64, value: IntRepr, width: AccessWidth) -> Result<(), MemoryError> {
        validate_alignment(addr, width, self.alignment)?;
        validate_write_access(&self.layout, addr, width, self.stack_limit)?;

        let old = self.peek(addr, width);
        let bytes = self.endianness.encode(value.bits(), width);
        for (cell_addr, byte) in (addr..).zip(bytes) {
            self.cells.entry(cell_addr).or_default().store(byte);
        }
        let new = self.peek(addr, width);
        log::debug!("memory write 0x{addr:x} ({width:?}): 0x{old:x} -> 0x{new:x}");

        if let Some(journal) = self.journal.as_mut() {
            journal.push(MemoryDelta {
                address: addr,
                width,
                old,
                new,
            });
        }
        Ok(())
    }

    /// Declares a load-time value: creates cells whose default bytes are
    /// `bytes` and a shared datatype descriptor.
    ///
    /// Load-time declarations may target any segment, including text.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unmapped`] when any byte falls outside every
    /// segment.
    pub fn declare(
        &mut self,
        addr: u64,
        bytes: &[u8],
        declared: DeclaredType,
        tag: Option<&str>,
    ) -> Result<(), MemoryError> {
        let size = bytes.len() as u64;
        for offset in 0..size {
            let cell_addr = addr
                .checked_add(offset)
                .ok_or(MemoryError::Unmapped { address: addr })?;
            if self.segment_of(cell_addr).is_none() {
                return Err(MemoryError::Unmapped { address: cell_addr });
            }
        }

        for (cell_addr, byte) in (addr..).zip(bytes.iter().copied()) {
            let breakpoint = self.breakpoint(cell_addr);
            let mut cell = MemoryCell::declared(byte, Some(addr));
            cell.breakpoint = breakpoint;
            self.cells.insert(cell_addr, cell);
        }
        if let Some(label) = tag {
            if let Some(cell) = self.cells.get_mut(&addr) {
                cell.tag = Some(label.to_owned());
            }
        }
        self.datatypes.insert(
            addr,
            DatatypeDescriptor {
                address: addr,
                declared,
                default_bytes: bytes.to_vec(),
                size,
            },
        );
        Ok(())
    }

    /// Loads encoded instruction bytes into the text segment.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unmapped`] when a byte is outside every segment.
    pub fn load_text(&mut self, addr: u64, bytes: &[u8], tag: Option<&str>) -> Result<(), MemoryError> {
        self.declare(addr, bytes, DeclaredType::Instruction, tag)
    }

    /// Reserves `size` zero bytes (`.space`/`.bss`).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unmapped`] when a byte is outside every segment.
    pub fn reserve(&mut self, addr: u64, size: usize, tag: Option<&str>) -> Result<(), MemoryError> {
        self.declare(addr, &vec![0; size], DeclaredType::Space, tag)
    }

    /// Cell stored at `addr`, if one exists.
    #[must_use]
    pub fn cell(&self, addr: u64) -> Option<&MemoryCell> {
        self.cells.get(&addr)
    }

    /// Iterates every cell in address order.
    pub fn cells(&self) -> impl Iterator<Item = (u64, &MemoryCell)> {
        self.cells.iter().map(|(addr, cell)| (*addr, cell))
    }

    /// Iterates cells whose byte differs from the load-time default.
    pub fn dirty_cells(&self) -> impl Iterator<Item = (u64, &MemoryCell)> {
        self.cells().filter(|(_, cell)| !cell.reset)
    }

    /// Symbolic tag attached to `addr`.
    #[must_use]
    pub fn tag(&self, addr: u64) -> Option<&str> {
        self.cells.get(&addr).and_then(|cell| cell.tag.as_deref())
    }

    /// Address carrying the symbolic tag `label`.
    #[must_use]
    pub fn find_tag(&self, label: &str) -> Option<u64> {
        self.cells
            .iter()
            .find(|(_, cell)| cell.tag.as_deref() == Some(label))
            .map(|(addr, _)| *addr)
    }

    /// Attaches a symbolic tag to `addr`, creating the cell when needed.
    pub fn set_tag(&mut self, addr: u64, label: &str) {
        self.cells.entry(addr).or_default().tag = Some(label.to_owned());
    }

    /// Whether a breakpoint is set at `addr`.
    #[must_use]
    pub fn breakpoint(&self, addr: u64) -> bool {
        self.cells.get(&addr).is_some_and(|cell| cell.breakpoint)
    }

    /// Sets or clears the breakpoint flag at `addr`.
    pub fn set_breakpoint(&mut self, addr: u64, enabled: bool) {
        self.cells.entry(addr).or_default().breakpoint = enabled;
    }

    /// Flips the breakpoint flag at `addr` and returns the new state.
    pub fn toggle_breakpoint(&mut self, addr: u64) -> bool {
        let cell = self.cells.entry(addr).or_default();
        cell.breakpoint = !cell.breakpoint;
        cell.breakpoint
    }

    /// Datatype descriptor for the declared value covering `addr`.
    #[must_use]
    pub fn datatype(&self, addr: u64) -> Option<&DatatypeDescriptor> {
        let start = self.cells.get(&addr).and_then(|cell| cell.datatype)?;
        self.datatypes
            .get(&start)
            .filter(|descriptor| descriptor.covers(addr))
    }

    /// Current value of the declared value covering `addr`, assembled with
    /// the memory byte order (first eight bytes at most).
    #[must_use]
    pub fn datatype_value(&self, addr: u64) -> Option<IntRepr> {
        let descriptor = self.datatype(addr)?;
        let len = descriptor.size.min(8);
        let bytes: Vec<u8> = (descriptor.address..descriptor.address + len)
            .map(|cell_addr| self.byte(cell_addr))
            .collect();
        Some(IntRepr::from_bits(self.endianness.decode(&bytes)))
    }

    /// Restores every cell to its default byte and forgets the stack limit.
    pub fn reset(&mut self) {
        for cell in self.cells.values_mut() {
            cell.restore();
        }
        self.stack_limit = None;
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }

    /// Destroys every cell and descriptor.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.datatypes.clear();
        self.stack_limit = None;
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }

    /// Renders non-zero or modified cells as `memory[0x...]:0x..` lines in
    /// address order.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (addr, cell) in self.cells() {
            if cell.bits != 0 || !cell.reset {
                let _ = writeln!(out, "memory[0x{addr:08x}]:0x{:02x}", cell.bits);
            }
        }
        out
    }

    fn byte(&self, addr: u64) -> u8 {
        self.cells.get(&addr).map_or(0, |cell| cell.bits)
    }

    fn peek(&self, addr: u64, width: AccessWidth) -> IntRepr {
        let bytes: Vec<u8> = (0..width.bytes())
            .map(|offset| self.byte(addr.wrapping_add(offset)))
            .collect();
        IntRepr::from_bits(self.endianness.decode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        AccessWidth, AlignmentPolicy, DeclaredType, Endianness, Memory, MemoryDelta, MemoryError,
        MemoryLayout, Segment,
    };
    use crate::IntRepr;

    const LAYOUT: MemoryLayout = MemoryLayout {
        text: Segment::new(0x0000, 0x0FFF),
        data: Segment::new(0x1000, 0x1FFF),
        stack: Segment::new(0x8000, 0x8FFF),
    };

    fn memory() -> Memory {
        Memory::new(LAYOUT, Endianness::Big, AlignmentPolicy::Strict)
    }

    #[test]
    fn undeclared_bytes_read_as_zero() {
        let memory = memory();
        let read = memory.read(0x1000, AccessWidth::Word).expect("mapped");
        assert_eq!(read.value, IntRepr::ZERO);
        assert!(!read.breakpoint);
    }

    #[test]
    fn write_creates_cells_and_clears_reset_flag() {
        let mut memory = memory();
        memory
            .write(0x1004, IntRepr::from_bits(0xDEAD_BEEF), AccessWidth::Word)
            .expect("data is writable");
        assert_eq!(memory.cell(0x1004).map(|cell| cell.bits), Some(0xDE));
        assert_eq!(memory.cell(0x1007).map(|cell| cell.bits), Some(0xEF));
        assert_eq!(memory.dirty_cells().count(), 4);
    }

    #[test]
    fn write_of_default_value_keeps_cell_clean() {
        let mut memory = memory();
        memory
            .declare(0x1000, &[0, 0, 0, 7], DeclaredType::Word, Some("value"))
            .expect("declare");
        memory
            .write(0x1000, IntRepr::from_bits(7), AccessWidth::Word)
            .expect("write");
        assert_eq!(memory.dirty_cells().count(), 0);
        memory
            .write(0x1000, IntRepr::from_bits(8), AccessWidth::Word)
            .expect("write");
        assert_eq!(memory.dirty_cells().count(), 1);
    }

    #[test]
    fn text_write_fails_without_mutation() {
        let mut memory = memory();
        memory
            .load_text(0x0000, &[0x12, 0x34, 0x56, 0x78], Some("main"))
            .expect("load text");
        let err = memory
            .write(0x0000, IntRepr::ZERO, AccessWidth::Word)
            .expect_err("text is read-only");
        assert_eq!(err, MemoryError::TextSegmentWrite { address: 0 });
        let read = memory.read(0x0000, AccessWidth::Word).expect("text readable");
        assert_eq!(read.value.bits(), 0x1234_5678);
    }

    #[test]
    fn misaligned_access_fails_before_touching_memory() {
        let mut memory = memory();
        assert!(matches!(
            memory.write(0x1002, IntRepr::ZERO, AccessWidth::Word),
            Err(MemoryError::Misaligned { .. })
        ));
        assert!(memory.cell(0x1002).is_none());
        assert!(matches!(
            memory.read(0x1001, AccessWidth::Half),
            Err(MemoryError::Misaligned { .. })
        ));
    }

    #[test]
    fn access_outside_segments_is_unmapped() {
        let mut memory = memory();
        assert_eq!(
            memory.read(0x4000, AccessWidth::Byte),
            Err(MemoryError::Unmapped { address: 0x4000 })
        );
        assert_eq!(
            memory.write(0x4000, IntRepr::ZERO, AccessWidth::Byte),
            Err(MemoryError::Unmapped { address: 0x4000 })
        );
    }

    #[test]
    fn stack_limit_extends_writable_stack() {
        let mut memory = memory();
        assert!(memory
            .write(0x7FF0, IntRepr::ZERO, AccessWidth::Word)
            .is_err());
        memory.set_stack_limit(0x7F00);
        memory
            .write(0x7FF0, IntRepr::from_bits(1), AccessWidth::Word)
            .expect("stack grew");
        memory.reset();
        assert_eq!(memory.stack_limit(), None);
    }

    #[test]
    fn breakpoints_are_reported_on_read_and_survive_writes() {
        let mut memory = memory();
        memory.set_breakpoint(0x1000, true);
        memory
            .write(0x1000, IntRepr::from_bits(0xAB), AccessWidth::Byte)
            .expect("write");
        assert!(memory.read(0x1000, AccessWidth::Byte).expect("read").breakpoint);
        assert!(!memory.toggle_breakpoint(0x1000));
        assert!(!memory.breakpoint(0x1000));
    }

    #[test]
    fn reset_restores_defaults_and_clear_destroys_cells() {
        let mut memory = memory();
        memory
            .declare(0x1000, &[1, 2], DeclaredType::HalfWord, Some("pair"))
            .expect("declare");
        memory
            .write(0x1000, IntRepr::from_bits(0xFFFF), AccessWidth::Half)
            .expect("write");
        memory.reset();
        assert_eq!(memory.datatype_value(0x1001), Some(IntRepr::from_bits(0x0102)));
        assert_eq!(memory.tag(0x1000), Some("pair"));
        assert_eq!(memory.find_tag("pair"), Some(0x1000));

        memory.clear();
        assert!(memory.cell(0x1000).is_none());
        assert!(memory.datatype(0x1000).is_none());
    }

    #[test]
    fn reserve_declares_zeroed_space_with_a_tag() {
        let mut memory = memory();
        memory.reserve(0x1100, 16, Some("buffer")).expect("data segment");
        assert_eq!(memory.find_tag("buffer"), Some(0x1100));
        assert_eq!(memory.tag(0x1101), None);
        let descriptor = memory.datatype(0x110F).expect("covered");
        assert_eq!(descriptor.declared, DeclaredType::Space);
        assert_eq!(descriptor.size, 16);
        assert_eq!(memory.read(0x1108, AccessWidth::Double).map(|read| read.value), Ok(IntRepr::ZERO));
        assert!(memory.datatype(0x1110).is_none());
        assert_eq!(memory.dump(), "");
    }

    #[test]
    fn reserve_past_a_segment_end_is_unmapped_and_creates_nothing() {
        let mut memory = memory();
        assert_eq!(
            memory.reserve(0x1FFC, 8, Some("tail")),
            Err(MemoryError::Unmapped { address: 0x2000 })
        );
        assert!(memory.cells().next().is_none());
        assert_eq!(memory.find_tag("tail"), None);
    }

    #[test]
    fn set_tag_labels_cells_and_survives_reset() {
        let mut memory = memory();
        memory.set_tag(0x1020, "loop");
        assert_eq!(memory.tag(0x1020), Some("loop"));
        assert_eq!(memory.find_tag("loop"), Some(0x1020));

        memory
            .write(0x1020, IntRepr::from_bits(9), AccessWidth::Byte)
            .expect("write");
        memory.set_tag(0x1020, "renamed");
        memory.reset();
        assert_eq!(memory.find_tag("loop"), None);
        assert_eq!(memory.find_tag("renamed"), Some(0x1020));
        assert_eq!(memory.read(0x1020, AccessWidth::Byte).map(|read| read.value), Ok(IntRepr::ZERO));
    }

    #[test]
    fn datatype_descriptor_is_shared_by_member_cells() {
        let mut memory = memory();
        memory
            .declare(0x1010, &[0x3F, 0x80, 0, 0], DeclaredType::Float, None)
            .expect("declare");
        let descriptor = memory.datatype(0x1012).expect("covered");
        assert_eq!(descriptor.address, 0x1010);
        assert_eq!(descriptor.declared, DeclaredType::Float);
        assert_eq!(memory.datatype_value(0x1010), Some(IntRepr::from_bits(0x3F80_0000)));
    }

    #[test]
    fn journal_records_old_and_new_values() {
        let mut memory = memory();
        memory.set_journal_enabled(true);
        memory
            .write(0x1000, IntRepr::from_bits(5), AccessWidth::Byte)
            .expect("write");
        assert_eq!(
            memory.take_journal(),
            vec![MemoryDelta {
                address: 0x1000,
                width: AccessWidth::Byte,
                old: IntRepr::ZERO,
                new: IntRepr::from_bits(5),
            }]
        );
        assert!(memory.take_journal().is_empty());
    }

    #[test]
    fn dump_lists_nonzero_and_modified_cells() {
        let mut memory = memory();
        memory
            .write(0x1000, IntRepr::from_bits(0x0100), AccessWidth::Half)
            .expect("write");
        assert_eq!(memory.dump(), "memory[0x00001000]:0x01\n");
    }

    #[test]
    fn little_endian_memory_orders_bytes_low_first() {
        let mut memory = Memory::new(LAYOUT, Endianness::Little, AlignmentPolicy::Strict);
        memory
            .write(0x1000, IntRepr::from_bits(0x1122_3344), AccessWidth::Word)
            .expect("write");
        assert_eq!(memory.cell(0x1000).map(|cell| cell.bits), Some(0x44));
        assert_eq!(
            memory.read(0x1000, AccessWidth::Word).expect("read").value,
            IntRepr::from_bits(0x1122_3344)
        );
    }

    fn width_strategy() -> impl Strategy<Value = AccessWidth> {
        prop_oneof![
            Just(AccessWidth::Byte),
            Just(AccessWidth::Half),
            Just(AccessWidth::Word),
            Just(AccessWidth::Double),
        ]
    }

    proptest! {
        #[test]
        fn aligned_write_then_read_roundtrips(
            slot in 0_u64..0x100,
            width in width_strategy(),
            value in any::<u64>(),
        ) {
            let mut memory = memory();
            let addr = 0x1000 + slot * width.bytes();
            let expected = IntRepr::from_bits(value).truncate(width.bits());
            memory.write(addr, IntRepr::from_bits(value), width).expect("aligned data write");
            prop_assert_eq!(memory.read(addr, width).expect("aligned read").value, expected);
        }

        #[test]
        fn text_writes_never_mutate(offset in 0_u64..0x400, value in any::<u64>()) {
            let mut memory = memory();
            let addr = offset * 4;
            prop_assert!(memory.write(addr, IntRepr::from_bits(value), AccessWidth::Word).is_err());
            prop_assert!(memory.cell(addr).is_none());
        }

        #[test]
        fn misaligned_accesses_are_rejected(slot in 0_u64..0x100, skew in 1_u64..8) {
            let mut memory = memory();
            let addr = 0x1000 + slot * 8 + skew;
            let write_misaligned = matches!(
                memory.write(addr, IntRepr::ZERO, AccessWidth::Double),
                Err(MemoryError::Misaligned { .. })
            );
            prop_assert!(write_misaligned);
            let read_misaligned = matches!(
                memory.read(addr, AccessWidth::Double),
                Err(MemoryError::Misaligned { .. })
            );
            prop_assert!(read_misaligned);
            prop_assert_eq!(memory.cells().count(), 0);
        }
    }
}
