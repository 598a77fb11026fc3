//! Session diagnostics counters.

use crate::{Fault, FaultClass, FaultKind};

/// Saturating counters and last-fault record for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SessionDiagnostics {
    /// Kind of the last fault, if any.
    pub last_fault_kind: Option<FaultKind>,
    /// Instruction index of the last fault.
    pub last_fault_instruction: Option<usize>,
    /// Register-class faults (permission, invalid register).
    pub fault_count_register: u32,
    /// Memory-class faults (alignment, segmentation).
    pub fault_count_memory: u32,
    /// Stack corruption faults.
    pub fault_count_stack: u32,
    /// Primitive operand faults.
    pub fault_count_primitive: u32,
    /// Executed instructions.
    pub instruction_count: u64,
    /// Frames closed with unrestored saved registers.
    pub unrestored_frames: u32,
}

impl SessionDiagnostics {
    /// Creates zeroed diagnostics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault and bumps its class counter.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_fault(&mut self, fault: &Fault) {
        self.last_fault_kind = Some(fault.kind);
        self.last_fault_instruction = fault.instruction_index;
        let counter = match fault.kind.class() {
            FaultClass::Register => &mut self.fault_count_register,
            FaultClass::Memory => &mut self.fault_count_memory,
            FaultClass::Stack => &mut self.fault_count_stack,
            FaultClass::Primitive => &mut self.fault_count_primitive,
        };
        *counter = counter.saturating_add(1);
    }

    /// Increments the instruction counter with saturating behavior.
    #[allow(clippy::missing_const_for_fn)]
    pub fn increment_instruction_count(&mut self) {
        self.instruction_count = self.instruction_count.saturating_add(1);
    }

    /// Records a frame that returned without restoring saved registers.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_unrestored_frame(&mut self) {
        self.unrestored_frames = self.unrestored_frames.saturating_add(1);
    }

    /// Total faults across every class.
    #[must_use]
    pub const fn fault_count(&self) -> u32 {
        self.fault_count_register
            .saturating_add(self.fault_count_memory)
            .saturating_add(self.fault_count_stack)
            .saturating_add(self.fault_count_primitive)
    }

    /// Resets every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::SessionDiagnostics;
    use crate::{Fault, FaultKind};

    #[test]
    fn diagnostics_default() {
        let diag = SessionDiagnostics::default();
        assert_eq!(diag.last_fault_kind, None);
        assert_eq!(diag.instruction_count, 0);
        assert_eq!(diag.fault_count(), 0);
    }

    #[rstest]
    #[case(FaultKind::Permission, [1, 0, 0, 0])]
    #[case(FaultKind::InvalidRegister, [1, 0, 0, 0])]
    #[case(FaultKind::Alignment, [0, 1, 0, 0])]
    #[case(FaultKind::Segmentation, [0, 1, 0, 0])]
    #[case(FaultKind::StackCorruption, [0, 0, 1, 0])]
    #[case(FaultKind::InvalidOperand, [0, 0, 0, 1])]
    fn record_fault_bumps_class_counter(#[case] kind: FaultKind, #[case] expected: [u32; 4]) {
        let mut diag = SessionDiagnostics::new();
        diag.record_fault(&Fault::new(kind, "x").at_instruction(3));
        assert_eq!(
            [
                diag.fault_count_register,
                diag.fault_count_memory,
                diag.fault_count_stack,
                diag.fault_count_primitive
            ],
            expected
        );
        assert_eq!(diag.last_fault_kind, Some(kind));
        assert_eq!(diag.last_fault_instruction, Some(3));
    }

    #[test]
    fn counters_saturate() {
        let mut diag = SessionDiagnostics {
            fault_count_stack: u32::MAX,
            instruction_count: u64::MAX,
            ..SessionDiagnostics::default()
        };
        diag.record_fault(&Fault::new(FaultKind::StackCorruption, "x"));
        diag.increment_instruction_count();
        assert_eq!(diag.fault_count_stack, u32::MAX);
        assert_eq!(diag.instruction_count, u64::MAX);

        diag.reset();
        assert_eq!(diag, SessionDiagnostics::default());
    }
}
