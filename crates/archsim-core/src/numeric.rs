//! Numeric conversion layer between integer register representations and
//! IEEE-754 bit patterns.
//!
//! Every register and memory value in the core is carried as an [`IntRepr`],
//! a 64-bit two's-complement bit vector. Floating-point conversions are pure
//! bit reinterpretations: no value-preserving rounding ever happens here.

use thiserror::Error;

/// Width in bits of the backing integer representation.
pub const INT_REPR_BITS: u32 = 64;

/// Mask selecting the low 32 bits (single-precision payload).
const SINGLE_MASK: u64 = 0xFFFF_FFFF;

/// Fixed-width two's-complement bit vector used for all register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct IntRepr(u64);

impl IntRepr {
    /// All-zero representation.
    pub const ZERO: Self = Self(0);

    /// Wraps raw bits without any truncation.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Keeps only the low `width` bits.
    #[must_use]
    pub const fn truncate(self, width: u32) -> Self {
        Self(self.0 & width_mask(width))
    }

    /// Interprets the low `width` bits as a signed value.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn to_signed(self, width: u32) -> i64 {
        sign_extend(self, width).0 as i64
    }

    /// Interprets the low `width` bits as an unsigned value.
    #[must_use]
    pub const fn to_unsigned(self, width: u32) -> u64 {
        self.truncate(width).0
    }
}

impl From<u64> for IntRepr {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl std::fmt::LowerHex for IntRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Conversion failures reported by checked integer conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NumericError {
    /// Requested width is zero or wider than the backing representation.
    #[error("unsupported bit width {0}")]
    UnsupportedWidth(u32),
    /// Value does not fit the signed or unsigned range of the width.
    #[error("value {value} does not fit in {width} bits")]
    OutOfRange {
        /// Rejected value.
        value: i128,
        /// Target width in bits.
        width: u32,
    },
}

/// Mask with the low `width` bits set (`width >= 64` yields all ones).
#[must_use]
pub const fn width_mask(width: u32) -> u64 {
    if width >= INT_REPR_BITS {
        u64::MAX
    } else {
        (1_u64 << width) - 1
    }
}

/// Inclusive signed range of a `bits`-wide two's-complement value.
///
/// # Errors
///
/// Returns [`NumericError::UnsupportedWidth`] when `bits` is `0` or above 64.
pub const fn twos_complement_range(bits: u32) -> Result<(i128, i128), NumericError> {
    if bits == 0 || bits > INT_REPR_BITS {
        return Err(NumericError::UnsupportedWidth(bits));
    }
    let max = (1_i128 << (bits - 1)) - 1;
    Ok((-max - 1, max))
}

/// Wraps an arbitrary integer into the representation (two's-complement
/// truncation to 64 bits).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub const fn int_to_native(value: i128) -> IntRepr {
    IntRepr(value as u64)
}

/// Converts an integer that must fit in `bits` either as a signed or as an
/// unsigned quantity.
///
/// # Errors
///
/// Returns [`NumericError::OutOfRange`] when `value` is below the signed
/// minimum or above the unsigned maximum of the width, and
/// [`NumericError::UnsupportedWidth`] for widths outside `1..=64`.
#[allow(clippy::cast_lossless)]
pub const fn checked_int_to_native(value: i128, bits: u32) -> Result<IntRepr, NumericError> {
    let (min, _) = match twos_complement_range(bits) {
        Ok(range) => range,
        Err(err) => return Err(err),
    };
    let unsigned_max = width_mask(bits) as i128;
    if value < min || value > unsigned_max {
        return Err(NumericError::OutOfRange { value, width: bits });
    }
    Ok(int_to_native(value).truncate(bits))
}

/// Sign-extends the low `from_bits` bits to the full representation.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub const fn sign_extend(repr: IntRepr, from_bits: u32) -> IntRepr {
    if from_bits == 0 {
        return IntRepr::ZERO;
    }
    if from_bits >= INT_REPR_BITS {
        return repr;
    }
    let shift = INT_REPR_BITS - from_bits;
    IntRepr((((repr.0 << shift) as i64) >> shift) as u64)
}

/// Reinterprets the low 32 bits as an IEEE-754 single.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn native_to_f32(repr: IntRepr) -> f32 {
    f32::from_bits((repr.0 & SINGLE_MASK) as u32)
}

/// Reinterprets all 64 bits as an IEEE-754 double.
#[must_use]
pub const fn native_to_f64(repr: IntRepr) -> f64 {
    f64::from_bits(repr.0)
}

/// Stores the bit pattern of a single in the low 32 bits.
#[must_use]
pub const fn f32_to_native(value: f32) -> IntRepr {
    IntRepr(value.to_bits() as u64)
}

/// Stores the bit pattern of a double.
#[must_use]
pub const fn f64_to_native(value: f64) -> IntRepr {
    IntRepr(value.to_bits())
}

/// Joins two 32-bit single payloads into one 64-bit double pattern.
///
/// `lo` supplies bits `0..32` and `hi` bits `32..64`.
#[must_use]
pub const fn combine_singles(lo: IntRepr, hi: IntRepr) -> IntRepr {
    IntRepr(((hi.0 & SINGLE_MASK) << 32) | (lo.0 & SINGLE_MASK))
}

/// Splits a 64-bit double pattern into its `(lo, hi)` single payloads.
#[must_use]
pub const fn split_double(repr: IntRepr) -> (IntRepr, IntRepr) {
    (IntRepr(repr.0 & SINGLE_MASK), IntRepr(repr.0 >> 32))
}
