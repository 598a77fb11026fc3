//! Access widths, byte order, and the alignment/segment policy checks that
//! run before any memory cell is touched.

use std::str::FromStr;

use thiserror::Error;

use crate::{decode_segment, FaultKind, MemoryLayout, SegmentKind};

/// Width of a single memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AccessWidth {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Half,
    /// 32-bit access.
    Word,
    /// 64-bit access.
    Double,
}

impl AccessWidth {
    /// Number of bytes moved by the access.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }

    /// Number of bits moved by the access.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Half => 16,
            Self::Word => 32,
            Self::Double => 64,
        }
    }
}

/// Access type spelling that does not name a known width.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown access type `{0}`")]
pub struct UnknownAccessWidth(pub String);

impl FromStr for AccessWidth {
    type Err = UnknownAccessWidth;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "byte" => Ok(Self::Byte),
            "half" | "half_word" => Ok(Self::Half),
            "word" | "float" => Ok(Self::Word),
            "double" | "double_word" => Ok(Self::Double),
            other => Err(UnknownAccessWidth(other.to_owned())),
        }
    }
}

/// Byte order used to assemble multi-byte values from cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Endianness {
    /// Most significant byte at the lowest address.
    #[default]
    Big,
    /// Least significant byte at the lowest address.
    Little,
}

impl Endianness {
    /// Splits the low `width` bytes of `value` into address order.
    #[must_use]
    pub fn encode(self, value: u64, width: AccessWidth) -> Vec<u8> {
        let len = usize::try_from(width.bytes()).unwrap_or(8);
        let le = value.to_le_bytes();
        match self {
            Self::Little => le[..len].to_vec(),
            Self::Big => le[..len].iter().rev().copied().collect(),
        }
    }

    /// Assembles bytes given in address order into a value.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
        match self {
            Self::Big => bytes.iter().fold(0, fold),
            Self::Little => bytes.iter().rev().fold(0, fold),
        }
    }
}

/// Alignment requirement applied to data accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AlignmentPolicy {
    /// Address must be a multiple of the access width.
    #[default]
    Strict,
    /// Any byte address is accepted.
    Relaxed,
}

/// Memory subsystem failures, each mapping onto one fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MemoryError {
    /// Address is not a multiple of the access width.
    #[error("misaligned {width:?} access at 0x{address:x}")]
    Misaligned {
        /// Offending address.
        address: u64,
        /// Requested width.
        width: AccessWidth,
    },
    /// Write targeted the text segment.
    #[error("write to text segment at 0x{address:x}")]
    TextSegmentWrite {
        /// Offending address.
        address: u64,
    },
    /// Access fell outside every declared segment.
    #[error("access outside declared segments at 0x{address:x}")]
    Unmapped {
        /// Offending address.
        address: u64,
    },
}

impl MemoryError {
    /// Maps the subsystem failure onto the fault taxonomy.
    #[must_use]
    pub const fn fault_kind(self) -> FaultKind {
        match self {
            Self::Misaligned { .. } => FaultKind::Alignment,
            Self::TextSegmentWrite { .. } | Self::Unmapped { .. } => FaultKind::Segmentation,
        }
    }

    /// Address that triggered the failure.
    #[must_use]
    pub const fn address(self) -> u64 {
        match self {
            Self::Misaligned { address, .. }
            | Self::TextSegmentWrite { address }
            | Self::Unmapped { address } => address,
        }
    }
}

/// Validates alignment of `addr` for `width` under `policy`.
///
/// # Errors
///
/// Returns [`MemoryError::Misaligned`] when the policy is strict and `addr`
/// is not a multiple of the access width.
pub const fn validate_alignment(
    addr: u64,
    width: AccessWidth,
    policy: AlignmentPolicy,
) -> Result<(), MemoryError> {
    match policy {
        AlignmentPolicy::Relaxed => Ok(()),
        AlignmentPolicy::Strict if addr % width.bytes() == 0 => Ok(()),
        AlignmentPolicy::Strict => Err(MemoryError::Misaligned {
            address: addr,
            width,
        }),
    }
}

/// Validates that every byte of the access lies in one segment and returns
/// that segment.
///
/// # Errors
///
/// Returns [`MemoryError::Unmapped`] when any byte of the span is outside
/// the declared segments.
pub const fn validate_mapped(
    layout: &MemoryLayout,
    addr: u64,
    width: AccessWidth,
    stack_limit: Option<u64>,
) -> Result<SegmentKind, MemoryError> {
    let Some(last) = addr.checked_add(width.bytes() - 1) else {
        return Err(MemoryError::Unmapped { address: addr });
    };
    let first_kind = decode_segment(layout, addr, stack_limit);
    let last_kind = decode_segment(layout, last, stack_limit);
    match (first_kind, last_kind) {
        (Some(first), Some(last_segment)) if first as u8 == last_segment as u8 => Ok(first),
        (Some(_), _) => Err(MemoryError::Unmapped { address: last }),
        (None, _) => Err(MemoryError::Unmapped { address: addr }),
    }
}

/// Validates architectural write legality for an access.
///
/// Writes are legal in the data and stack segments only.
///
/// # Errors
///
/// Returns [`MemoryError::TextSegmentWrite`] for text-segment targets and
/// [`MemoryError::Unmapped`] for addresses outside every segment.
pub const fn validate_write_access(
    layout: &MemoryLayout,
    addr: u64,
    width: AccessWidth,
    stack_limit: Option<u64>,
) -> Result<SegmentKind, MemoryError> {
    if layout.text.overlaps_span(addr, width.bytes()) {
        return Err(MemoryError::TextSegmentWrite { address: addr });
    }
    validate_mapped(layout, addr, width, stack_limit)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        validate_alignment, validate_mapped, validate_write_access, AccessWidth, AlignmentPolicy,
        Endianness, MemoryError,
    };
    use crate::{FaultKind, MemoryLayout, Segment, SegmentKind};

    const LAYOUT: MemoryLayout = MemoryLayout {
        text: Segment::new(0x0000, 0x0FFF),
        data: Segment::new(0x1000, 0x1FFF),
        stack: Segment::new(0x8000, 0x8FFF),
    };

    #[rstest]
    #[case(0x1000, AccessWidth::Byte, true)]
    #[case(0x1001, AccessWidth::Byte, true)]
    #[case(0x1002, AccessWidth::Half, true)]
    #[case(0x1001, AccessWidth::Half, false)]
    #[case(0x1004, AccessWidth::Word, true)]
    #[case(0x1002, AccessWidth::Word, false)]
    #[case(0x1008, AccessWidth::Double, true)]
    #[case(0x1004, AccessWidth::Double, false)]
    fn strict_alignment_requires_width_multiples(
        #[case] addr: u64,
        #[case] width: AccessWidth,
        #[case] aligned: bool,
    ) {
        let result = validate_alignment(addr, width, AlignmentPolicy::Strict);
        assert_eq!(result.is_ok(), aligned);
        assert!(validate_alignment(addr, width, AlignmentPolicy::Relaxed).is_ok());
    }

    #[test]
    fn text_writes_are_segmentation_faults() {
        let err = validate_write_access(&LAYOUT, 0x0010, AccessWidth::Word, None)
            .expect_err("text is read-only");
        assert_eq!(err, MemoryError::TextSegmentWrite { address: 0x0010 });
        assert_eq!(err.fault_kind(), FaultKind::Segmentation);
    }

    #[test]
    fn write_straddling_into_text_is_rejected() {
        let layout = MemoryLayout {
            data: Segment::new(0x1000, 0x1FFF),
            text: Segment::new(0x2000, 0x2FFF),
            ..LAYOUT
        };
        assert!(matches!(
            validate_write_access(&layout, 0x1FFE, AccessWidth::Word, None),
            Err(MemoryError::TextSegmentWrite { .. })
        ));
    }

    #[test]
    fn unmapped_and_straddling_accesses_fail() {
        assert_eq!(
            validate_mapped(&LAYOUT, 0x4000, AccessWidth::Byte, None),
            Err(MemoryError::Unmapped { address: 0x4000 })
        );
        assert_eq!(
            validate_mapped(&LAYOUT, 0x1FFE, AccessWidth::Word, None),
            Err(MemoryError::Unmapped { address: 0x2001 })
        );
        assert_eq!(
            validate_write_access(&LAYOUT, 0x8004, AccessWidth::Word, None),
            Ok(SegmentKind::Stack)
        );
    }

    #[rstest]
    #[case("byte", AccessWidth::Byte)]
    #[case("half_word", AccessWidth::Half)]
    #[case("word", AccessWidth::Word)]
    #[case("float", AccessWidth::Word)]
    #[case("double", AccessWidth::Double)]
    fn access_type_names_parse(#[case] name: &str, #[case] expected: AccessWidth) {
        assert_eq!(name.parse::<AccessWidth>(), Ok(expected));
    }

    #[test]
    fn endianness_orders_bytes_by_address() {
        assert_eq!(
            Endianness::Big.encode(0x1122_3344, AccessWidth::Word),
            vec![0x11, 0x22, 0x33, 0x44]
        );
        assert_eq!(
            Endianness::Little.encode(0x1122_3344, AccessWidth::Word),
            vec![0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(Endianness::Big.decode(&[0x11, 0x22]), 0x1122);
        assert_eq!(Endianness::Little.decode(&[0x11, 0x22]), 0x2211);
    }
}
