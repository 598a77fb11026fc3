//! Host-facing configuration, step/run result records and trace hooks.

use crate::{
    AccessWidth, Fault, FaultKind, FrameReport, FrameSummary, IntRepr, MemoryDelta, RegisterDelta,
    RegisterRef, RunState,
};

/// Session-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Maximum number of steps per `run` call; `None` means unbounded.
    pub step_budget: Option<u64>,
    /// Stop a run before executing an instruction whose address carries a
    /// breakpoint.
    pub stop_on_breakpoint: bool,
    /// Emit [`TraceEvent`]s to the installed sink.
    pub tracing_enabled: bool,
    /// Record register and memory deltas in step reports.
    pub journal_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_budget: None,
            stop_on_breakpoint: true,
            tracing_enabled: false,
            journal_enabled: true,
        }
    }
}

/// Status of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Instruction executed; more may follow.
    Retired,
    /// No instruction at the program counter, or the instruction halted.
    Halted,
    /// Instruction semantics raised a fault (or a fault was already latched).
    Fault(Fault),
}

/// Result record of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Step status.
    pub outcome: StepOutcome,
    /// Index of the executed instruction.
    pub instruction_index: Option<usize>,
    /// Address of the executed instruction.
    pub address: Option<u64>,
    /// Register changes committed by the step.
    pub register_deltas: Vec<RegisterDelta>,
    /// Memory writes committed by the step.
    pub memory_deltas: Vec<MemoryDelta>,
    /// Active frames after the step, outermost first.
    pub frames: Vec<FrameSummary>,
    /// Frame closed by a return instruction during this step.
    pub returned: Option<FrameReport>,
}

impl StepReport {
    pub(crate) const fn empty(outcome: StepOutcome) -> Self {
        Self {
            outcome,
            instruction_index: None,
            address: None,
            register_deltas: Vec::new(),
            memory_deltas: Vec::new(),
            frames: Vec::new(),
            returned: None,
        }
    }

    /// Fault raised by the step, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match &self.outcome {
            StepOutcome::Fault(fault) => Some(fault),
            StepOutcome::Retired | StepOutcome::Halted => None,
        }
    }
}

/// Reason a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunBoundary {
    /// Program halted.
    Halted,
    /// A fault was raised or already latched.
    Fault,
    /// Step budget exhausted.
    StepBudget,
    /// Next instruction carries a breakpoint.
    Breakpoint,
    /// Host requested cancellation.
    Cancelled,
}

/// Per-call run limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunLimits {
    /// Maximum steps executed by this call.
    pub max_steps: Option<u64>,
    /// Honour breakpoints.
    pub stop_on_breakpoint: bool,
}

impl RunLimits {
    /// Limits taken from the session configuration.
    #[must_use]
    pub const fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_steps: config.step_budget,
            stop_on_breakpoint: config.stop_on_breakpoint,
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Steps that executed an instruction during this call.
    pub steps: u64,
    /// Why the run stopped.
    pub boundary: RunBoundary,
    /// Executor state at return.
    pub state: RunState,
    /// Latched fault, when the run stopped on one.
    pub fault: Option<Fault>,
}

/// Trace events emitted when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// Instruction about to execute.
    InstructionStart {
        /// Program index.
        index: usize,
        /// Instruction address.
        address: u64,
    },
    /// Register write committed.
    RegisterWrite {
        /// Register written.
        register: RegisterRef,
        /// Stored bits.
        value: IntRepr,
    },
    /// Memory write committed.
    MemoryWrite {
        /// First byte written.
        address: u64,
        /// Access width.
        width: AccessWidth,
        /// Stored value.
        value: IntRepr,
    },
    /// Fault stopped an instruction.
    FaultRaised {
        /// Fault kind.
        kind: FaultKind,
        /// Faulting instruction.
        instruction_index: Option<usize>,
    },
}

/// Sink for trace events.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn on_event(&mut self, event: TraceEvent) {
        self.push(event);
    }
}
