use thiserror::Error;

/// Fault classes used for diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Register capability violation or unknown register.
    Register,
    /// Memory alignment or segment policy violation.
    Memory,
    /// Call-stack integrity violation.
    Stack,
    /// Malformed primitive invocation from instruction semantics.
    Primitive,
}

/// Display severity attached to every fault result.
///
/// All faults raised by the core halt execution, so only the `danger` level
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    /// Execution-halting fault.
    #[default]
    Danger,
}

/// Stable fault taxonomy raised by primitives and surfaced by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultKind {
    /// Register lacks the `read` or `write` capability.
    #[error("permission fault")]
    Permission = 0x01,
    /// Access address is not a multiple of the access width.
    #[error("alignment fault")]
    Alignment = 0x02,
    /// Write into the text segment or access outside every segment.
    #[error("segmentation fault")]
    Segmentation = 0x03,
    /// Write outside the active call frame's window.
    #[error("stack corruption fault")]
    StackCorruption = 0x04,
    /// Component or element index that the architecture does not define.
    #[error("invalid register reference")]
    InvalidRegister = 0x05,
    /// Primitive invoked with operands of the wrong count or shape.
    #[error("invalid primitive operand")]
    InvalidOperand = 0x06,
}

impl FaultKind {
    /// Converts a fault kind to its stable byte code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte code back into a fault kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Permission),
            0x02 => Some(Self::Alignment),
            0x03 => Some(Self::Segmentation),
            0x04 => Some(Self::StackCorruption),
            0x05 => Some(Self::InvalidRegister),
            0x06 => Some(Self::InvalidOperand),
            _ => None,
        }
    }

    /// Returns the diagnostics class for this fault kind.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::Permission | Self::InvalidRegister => FaultClass::Register,
            Self::Alignment | Self::Segmentation => FaultClass::Memory,
            Self::StackCorruption => FaultClass::Stack,
            Self::InvalidOperand => FaultClass::Primitive,
        }
    }

    /// Every fault kind halts the simulated run.
    #[must_use]
    pub const fn severity(self) -> Severity {
        Severity::Danger
    }
}

/// Structured fault produced by the raising path of the primitive layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{kind}: {message}")]
pub struct Fault {
    /// Fault taxonomy entry.
    pub kind: FaultKind,
    /// Human-readable description.
    pub message: String,
    /// Index of the instruction that was executing, when known.
    pub instruction_index: Option<usize>,
}

impl Fault {
    /// Creates a fault that is not yet attributed to an instruction.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            instruction_index: None,
        }
    }

    /// Marks `index` as the fault site unless one is already recorded.
    #[must_use]
    pub fn at_instruction(mut self, index: usize) -> Self {
        if self.instruction_index.is_none() {
            self.instruction_index = Some(index);
        }
        self
    }

    /// Severity of this fault.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.kind.severity()
    }
}
