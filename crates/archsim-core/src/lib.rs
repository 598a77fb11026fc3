//! Architecture-agnostic instruction-set simulation core.
//!
//! A [`SimulationSession`] owns an [`Architecture`] description, the
//! [`RegisterFile`] and [`Memory`] built from it, and the call-stack
//! [`Sentinel`]. Decoded instructions run through the [`Capi`] primitive
//! context; any fault they raise halts the run and is reported in the
//! [`StepReport`].

/// Integer/IEEE-754 conversion layer.
pub mod numeric;
pub use numeric::{
    checked_int_to_native, combine_singles, f32_to_native, f64_to_native, int_to_native,
    native_to_f32, native_to_f64, sign_extend, split_double, twos_complement_range, width_mask,
    IntRepr, NumericError, INT_REPR_BITS,
};

/// Fault taxonomy.
pub mod fault;
pub use fault::{Fault, FaultClass, FaultKind, Severity};

/// Architecture description consumed by sessions.
pub mod arch;
pub use arch::{
    Architecture, ArchitectureError, Component, ComponentKind, DoublePrecisionMode,
    RegisterElement, RegisterProperties, RegisterProperty, UnknownProperty,
};

/// Sparse segmented memory.
pub mod memory;
pub use memory::{
    decode_segment, validate_alignment, validate_mapped, validate_write_access, AccessWidth,
    AlignmentPolicy, DatatypeDescriptor, DeclaredType, Endianness, Memory, MemoryCell, MemoryDelta,
    MemoryError, MemoryLayout, MemoryRead, Segment, SegmentDescriptor, SegmentKind,
    UnknownAccessWidth,
};

/// Register file and executor run state.
pub mod state;
pub use state::{
    Precision, RegisterDelta, RegisterError, RegisterFile, RegisterRef, RegisterValue, RunState,
    WriteOutcome,
};

/// Call-stack sentinel.
pub mod sentinel;
pub use sentinel::{CallFrame, FrameReport, FrameSummary, Sentinel, StackViolation};

/// Primitive operations available to instruction semantics.
pub mod capi;
pub use capi::{Capi, CapiFn, CapiRegistry, CapiValue};

/// Host-facing configuration, result records and trace hooks.
pub mod api;
pub use api::{
    RunBoundary, RunLimits, RunOutcome, SessionConfig, StepOutcome, StepReport, TraceEvent,
    TraceSink,
};

/// Session diagnostics counters.
pub mod diag;
pub use diag::SessionDiagnostics;

/// Session ownership of all simulation state.
pub mod session;
pub use session::{ProgramCounter, SimulationSession};

/// Fetch/execute loop and program representation.
pub mod execute;
pub use execute::{Flow, Instruction, InstructionRole, InstructionSemantics, Program};

#[cfg(test)]
use serde_json as _;
