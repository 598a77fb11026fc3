use crate::FaultKind;

/// Executor state machine: `Ready -> Running -> {Halted, Faulted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Created or reset; no instruction executed yet.
    #[default]
    Ready,
    /// At least one instruction executed and more may follow.
    Running,
    /// Program finished (no instruction at the program counter, or an
    /// instruction requested a halt).
    Halted,
    /// A fault stopped execution; state stays inspectable until the caller
    /// clears the fault or resets.
    Faulted(FaultKind),
}

impl RunState {
    /// Returns the fault kind when the state is faulted.
    #[must_use]
    pub const fn fault(self) -> Option<FaultKind> {
        match self {
            Self::Faulted(kind) => Some(kind),
            Self::Ready | Self::Running | Self::Halted => None,
        }
    }

    /// Returns `true` when further steps may execute instructions.
    #[must_use]
    pub const fn can_step(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::RunState;
    use crate::FaultKind;

    #[test]
    fn run_state_default_is_ready() {
        assert_eq!(RunState::default(), RunState::Ready);
        assert!(RunState::Ready.can_step());
    }

    #[test]
    fn fault_accessor_reports_only_faulted_variant() {
        assert_eq!(RunState::Running.fault(), None);
        assert_eq!(RunState::Halted.fault(), None);
        assert!(!RunState::Halted.can_step());
        assert_eq!(
            RunState::Faulted(FaultKind::StackCorruption).fault(),
            Some(FaultKind::StackCorruption)
        );
        assert!(!RunState::Faulted(FaultKind::Alignment).can_step());
    }
}
