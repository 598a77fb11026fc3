//! Per-address cell metadata and declared datatype descriptors.

/// Type declared for a region by the data directives that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeclaredType {
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    HalfWord,
    /// 32-bit integer.
    Word,
    /// 64-bit integer.
    DoubleWord,
    /// IEEE-754 single.
    Float,
    /// IEEE-754 double.
    Double,
    /// Character data without terminator.
    Ascii,
    /// NUL-terminated character data.
    Asciiz,
    /// Reserved but uninitialised space.
    Space,
    /// Encoded instruction in the text segment.
    Instruction,
}

impl DeclaredType {
    /// Spelling used by architecture descriptions and dumps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::HalfWord => "half_word",
            Self::Word => "word",
            Self::DoubleWord => "double_word",
            Self::Float => "float",
            Self::Double => "double",
            Self::Ascii => "ascii",
            Self::Asciiz => "asciiz",
            Self::Space => "space",
            Self::Instruction => "instruction",
        }
    }
}

/// Descriptor shared by every cell of one declared value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DatatypeDescriptor {
    /// Address of the first byte.
    pub address: u64,
    /// Declared type.
    pub declared: DeclaredType,
    /// Load-time bytes in address order.
    pub default_bytes: Vec<u8>,
    /// Size in bytes.
    pub size: u64,
}

impl DatatypeDescriptor {
    /// Returns `true` when `addr` belongs to the described value.
    #[must_use]
    pub const fn covers(&self, addr: u64) -> bool {
        addr >= self.address && addr - self.address < self.size
    }
}

/// One byte of simulated memory with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryCell {
    /// Current byte.
    pub bits: u8,
    /// Byte restored on simulation restart.
    pub default_bits: u8,
    /// Symbolic label attached to this address.
    pub tag: Option<String>,
    /// Start address of the declared value this byte belongs to.
    pub datatype: Option<u64>,
    /// `true` while the cell still equals its load-time byte.
    pub reset: bool,
    /// Execution stops before an instruction at this address.
    pub breakpoint: bool,
}

impl Default for MemoryCell {
    fn default() -> Self {
        Self::declared(0, None)
    }
}

impl MemoryCell {
    /// Cell created by a load-time declaration.
    #[must_use]
    pub const fn declared(bits: u8, datatype: Option<u64>) -> Self {
        Self {
            bits,
            default_bits: bits,
            tag: None,
            datatype,
            reset: true,
            breakpoint: false,
        }
    }

    /// Stores `bits`, keeping the reset flag in sync with the default.
    pub const fn store(&mut self, bits: u8) {
        self.bits = bits;
        self.reset = bits == self.default_bits;
    }

    /// Restores the load-time byte.
    pub const fn restore(&mut self) {
        self.bits = self.default_bits;
        self.reset = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{DatatypeDescriptor, DeclaredType, MemoryCell};

    #[test]
    fn store_tracks_reset_flag_against_default() {
        let mut cell = MemoryCell::declared(0x2A, None);
        assert!(cell.reset);
        cell.store(0x00);
        assert!(!cell.reset);
        cell.store(0x2A);
        assert!(cell.reset);
        cell.store(0xFF);
        cell.restore();
        assert_eq!(cell.bits, 0x2A);
        assert!(cell.reset);
    }

    #[test]
    fn fresh_cells_start_clean() {
        let cell = MemoryCell::default();
        assert_eq!(cell.bits, 0);
        assert!(cell.reset);
        assert!(!cell.breakpoint);
    }

    #[test]
    fn descriptor_covers_its_byte_span() {
        let descriptor = DatatypeDescriptor {
            address: 0x1000,
            declared: DeclaredType::Word,
            default_bytes: vec![0; 4],
            size: 4,
        };
        assert!(!descriptor.covers(0x0FFF));
        assert!(descriptor.covers(0x1000));
        assert!(descriptor.covers(0x1003));
        assert!(!descriptor.covers(0x1004));
        assert_eq!(descriptor.declared.name(), "word");
    }
}
