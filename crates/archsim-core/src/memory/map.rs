//! Architecture-supplied segment map and address decoding helpers.

/// Segment classification for simulated addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SegmentKind {
    /// Program text; never writable by simulated code.
    Text,
    /// Static data (`.data`/`.bss`).
    Data,
    /// Call stack.
    Stack,
}

/// Inclusive address range of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Segment {
    /// Inclusive start address.
    pub start: u64,
    /// Inclusive end address.
    pub end: u64,
}

impl Segment {
    /// Creates an inclusive segment.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns `true` when `addr` belongs to this segment.
    #[must_use]
    pub const fn contains(self, addr: u64) -> bool {
        addr >= self.start && addr <= self.end
    }

    /// Returns `true` when every byte of `addr..addr + len` lies inside.
    #[must_use]
    pub const fn contains_span(self, addr: u64, len: u64) -> bool {
        if len == 0 {
            return self.contains(addr);
        }
        match addr.checked_add(len - 1) {
            Some(last) => self.contains(addr) && self.contains(last),
            None => false,
        }
    }

    /// Returns `true` when any byte of `addr..addr + len` lies inside.
    #[must_use]
    pub const fn overlaps_span(self, addr: u64, len: u64) -> bool {
        let last = addr.saturating_add(len.saturating_sub(1));
        addr <= self.end && last >= self.start
    }

    const fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Canonical descriptor pairing a segment with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
    /// Segment classification.
    pub kind: SegmentKind,
    /// Address bounds.
    pub segment: Segment,
}

/// Named segment boundaries supplied by the architecture description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryLayout {
    /// Text segment bounds.
    pub text: Segment,
    /// Data segment bounds.
    pub data: Segment,
    /// Stack segment bounds as declared (before any growth).
    pub stack: Segment,
}

impl MemoryLayout {
    /// Returns the bounds for `kind`.
    #[must_use]
    pub const fn segment(&self, kind: SegmentKind) -> Segment {
        match kind {
            SegmentKind::Text => self.text,
            SegmentKind::Data => self.data,
            SegmentKind::Stack => self.stack,
        }
    }

    /// Segment descriptors in declaration order.
    #[must_use]
    pub const fn descriptors(&self) -> [SegmentDescriptor; 3] {
        [
            SegmentDescriptor {
                kind: SegmentKind::Text,
                segment: self.text,
            },
            SegmentDescriptor {
                kind: SegmentKind::Data,
                segment: self.data,
            },
            SegmentDescriptor {
                kind: SegmentKind::Stack,
                segment: self.stack,
            },
        ]
    }

    /// Stack bounds once the tracked stack limit is taken into account.
    ///
    /// The stack only ever grows below its declared start; a limit above the
    /// declared start leaves the declared bounds unchanged.
    #[must_use]
    pub const fn effective_stack(&self, stack_limit: Option<u64>) -> Segment {
        match stack_limit {
            Some(limit) if limit < self.stack.start => Segment::new(limit, self.stack.end),
            _ => self.stack,
        }
    }

    /// Returns `true` when the three segments are well formed and disjoint.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.text.start <= self.text.end
            && self.data.start <= self.data.end
            && self.stack.start <= self.stack.end
            && !self.text.overlaps(self.data)
            && !self.text.overlaps(self.stack)
            && !self.data.overlaps(self.stack)
    }
}

/// Decodes an address into the segment that contains it.
///
/// Returns `None` for addresses outside every segment.
#[must_use]
pub const fn decode_segment(
    layout: &MemoryLayout,
    addr: u64,
    stack_limit: Option<u64>,
) -> Option<SegmentKind> {
    if layout.text.contains(addr) {
        Some(SegmentKind::Text)
    } else if layout.data.contains(addr) {
        Some(SegmentKind::Data)
    } else if layout.effective_stack(stack_limit).contains(addr) {
        Some(SegmentKind::Stack)
    } else {
        None
    }
}
