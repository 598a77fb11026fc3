//! Register capability flags.

use std::fmt;
use std::str::FromStr;

/// One capability or role tag that an architecture can attach to a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u16)]
pub enum RegisterProperty {
    /// Register may be read by instruction semantics.
    Read = 1 << 0,
    /// Register may be written by instruction semantics.
    Write = 1 << 1,
    /// Writes to a non-writable register are silently dropped.
    IgnoreWrite = 1 << 2,
    /// Register holds the stack pointer.
    StackPointer = 1 << 3,
    /// Register holds the frame pointer.
    FramePointer = 1 << 4,
    /// Register holds the global pointer.
    GlobalPointer = 1 << 5,
    /// Register holds the return address of the current call.
    ReturnAddress = 1 << 6,
    /// Register holds the program counter.
    ProgramCounter = 1 << 7,
    /// Register is callee-saved and must be restored before returning.
    Saved = 1 << 8,
}

impl RegisterProperty {
    /// Every property in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Read,
        Self::Write,
        Self::IgnoreWrite,
        Self::StackPointer,
        Self::FramePointer,
        Self::GlobalPointer,
        Self::ReturnAddress,
        Self::ProgramCounter,
        Self::Saved,
    ];

    /// Bit used for this property inside [`RegisterProperties`].
    #[must_use]
    pub const fn bit(self) -> u16 {
        self as u16
    }

    /// Tag spelling used by architecture descriptions.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::IgnoreWrite => "ignore_write",
            Self::StackPointer => "stack_pointer",
            Self::FramePointer => "frame_pointer",
            Self::GlobalPointer => "global_pointer",
            Self::ReturnAddress => "return_address",
            Self::ProgramCounter => "program_counter",
            Self::Saved => "saved",
        }
    }
}

impl fmt::Display for RegisterProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Tag string that does not name a known register property.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown register property `{0}`")]
pub struct UnknownProperty(pub String);

impl FromStr for RegisterProperty {
    type Err = UnknownProperty;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|property| property.tag() == tag)
            .ok_or_else(|| UnknownProperty(tag.to_owned()))
    }
}

/// Closed set of capability flags attached to one register element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<RegisterProperty>", into = "Vec<RegisterProperty>")
)]
pub struct RegisterProperties(u16);

impl RegisterProperties {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// `read` + `write`, the common general-purpose register profile.
    pub const READ_WRITE: Self = Self(RegisterProperty::Read.bit() | RegisterProperty::Write.bit());

    /// Builds a flag set from a list of properties.
    #[must_use]
    pub const fn from_slice(properties: &[RegisterProperty]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < properties.len() {
            bits |= properties[index].bit();
            index += 1;
        }
        Self(bits)
    }

    /// Returns `true` when `property` is present.
    #[must_use]
    pub const fn contains(self, property: RegisterProperty) -> bool {
        self.0 & property.bit() != 0
    }

    /// Returns a copy with `property` added.
    #[must_use]
    pub const fn with(self, property: RegisterProperty) -> Self {
        Self(self.0 | property.bit())
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Iterates the present properties in declaration order.
    pub fn iter(self) -> impl Iterator<Item = RegisterProperty> {
        RegisterProperty::ALL
            .into_iter()
            .filter(move |property| self.contains(*property))
    }
}

impl From<Vec<RegisterProperty>> for RegisterProperties {
    fn from(properties: Vec<RegisterProperty>) -> Self {
        Self::from_slice(&properties)
    }
}

impl From<RegisterProperties> for Vec<RegisterProperty> {
    fn from(properties: RegisterProperties) -> Self {
        properties.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{RegisterProperties, RegisterProperty};

    #[test]
    fn property_bits_are_unique() {
        let mut seen = 0_u16;
        for property in RegisterProperty::ALL {
            assert_eq!(seen & property.bit(), 0);
            seen |= property.bit();
        }
    }

    #[rstest]
    #[case("read", RegisterProperty::Read)]
    #[case("ignore_write", RegisterProperty::IgnoreWrite)]
    #[case("stack_pointer", RegisterProperty::StackPointer)]
    #[case("program_counter", RegisterProperty::ProgramCounter)]
    #[case("saved", RegisterProperty::Saved)]
    fn tags_parse_to_properties(#[case] tag: &str, #[case] expected: RegisterProperty) {
        assert_eq!(tag.parse::<RegisterProperty>(), Ok(expected));
        assert_eq!(expected.to_string(), tag);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!("writable".parse::<RegisterProperty>().is_err());
    }

    #[test]
    fn flag_set_tracks_membership() {
        let flags = RegisterProperties::from_slice(&[
            RegisterProperty::Read,
            RegisterProperty::StackPointer,
        ]);
        assert!(flags.contains(RegisterProperty::Read));
        assert!(flags.contains(RegisterProperty::StackPointer));
        assert!(!flags.contains(RegisterProperty::Write));
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![RegisterProperty::Read, RegisterProperty::StackPointer]
        );
        assert!(RegisterProperties::READ_WRITE
            .with(RegisterProperty::Saved)
            .contains(RegisterProperty::Saved));
    }
}
