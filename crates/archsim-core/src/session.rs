//! Simulation session: one owner for the architecture, register file,
//! memory, sentinel and executor state.

use crate::{
    ArchitectureError, Architecture, Capi, CapiRegistry, Fault, IntRepr, Memory, Program,
    RegisterFile, RegisterProperty, RegisterRef, RunState, Sentinel, SessionConfig,
    SessionDiagnostics, TraceSink,
};

/// Where the program counter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramCounter {
    /// Register tagged `program_counter`.
    Register(RegisterRef),
    /// Internal counter for architectures without a PC register.
    Internal(u64),
}

/// Complete simulation state for one program run.
pub struct SimulationSession {
    pub(crate) arch: Architecture,
    pub(crate) registers: RegisterFile,
    pub(crate) memory: Memory,
    pub(crate) sentinel: Sentinel,
    pub(crate) registry: CapiRegistry,
    pub(crate) program: Program,
    pub(crate) config: SessionConfig,
    pub(crate) run_state: RunState,
    pub(crate) latched_fault: Option<Fault>,
    pub(crate) diagnostics: SessionDiagnostics,
    pub(crate) pc: ProgramCounter,
    pub(crate) trace: Option<Box<dyn TraceSink>>,
}

impl std::fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationSession")
            .field("arch", &self.arch.name)
            .field("run_state", &self.run_state)
            .field("pc", &self.pc)
            .field("instructions", &self.program.len())
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl SimulationSession {
    /// Creates a session with every register and memory cell at reset.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect of `arch`.
    pub fn new(arch: Architecture, config: SessionConfig) -> Result<Self, ArchitectureError> {
        arch.validate()?;
        let mut registers = RegisterFile::new(&arch);
        let mut memory = Memory::for_architecture(&arch);
        registers.set_journal_enabled(config.journal_enabled);
        memory.set_journal_enabled(config.journal_enabled);
        let pc = Self::initial_pc(&arch, &registers);
        Ok(Self {
            arch,
            registers,
            memory,
            sentinel: Sentinel::new(),
            registry: CapiRegistry::standard(),
            program: Program::default(),
            config,
            run_state: RunState::Ready,
            latched_fault: None,
            diagnostics: SessionDiagnostics::new(),
            pc,
            trace: None,
        })
    }

    fn initial_pc(arch: &Architecture, registers: &RegisterFile) -> ProgramCounter {
        registers
            .find_by_property(RegisterProperty::ProgramCounter)
            .map_or(
                ProgramCounter::Internal(arch.memory_layout.text.start),
                ProgramCounter::Register,
            )
    }

    /// Installs the decoded program.
    #[must_use]
    pub fn with_program(mut self, program: Program) -> Self {
        self.program = program;
        self
    }

    /// Replaces the decoded program.
    pub fn load_program(&mut self, program: Program) {
        self.program = program;
    }

    /// Installs a trace sink; events flow only while tracing is enabled.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace = Some(sink);
    }

    /// Removes and returns the trace sink.
    #[allow(clippy::missing_const_for_fn)]
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.trace.take()
    }

    /// Architecture description.
    #[must_use]
    pub const fn arch(&self) -> &Architecture {
        &self.arch
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable register file, for loaders and front-ends.
    #[allow(clippy::missing_const_for_fn)]
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Memory.
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable memory, for loaders and breakpoint management.
    #[allow(clippy::missing_const_for_fn)]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Call-stack sentinel.
    #[must_use]
    pub const fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    /// Primitive registry, for installing additional primitives.
    #[allow(clippy::missing_const_for_fn)]
    pub fn registry_mut(&mut self) -> &mut CapiRegistry {
        &mut self.registry
    }

    /// Decoded program.
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }

    /// Executor state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Fault latched by the last faulting step.
    #[must_use]
    pub const fn last_fault(&self) -> Option<&Fault> {
        self.latched_fault.as_ref()
    }

    /// Diagnostics counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &SessionDiagnostics {
        &self.diagnostics
    }

    /// Current program counter.
    #[must_use]
    pub fn pc(&self) -> u64 {
        match self.pc {
            ProgramCounter::Register(reg) => self.registers.peek(reg).map_or(0, IntRepr::bits),
            ProgramCounter::Internal(value) => value,
        }
    }

    /// Moves the program counter.
    pub fn set_pc(&mut self, target: u64) {
        match self.pc {
            ProgramCounter::Register(reg) => {
                if self.registers.force(reg, IntRepr::from_bits(target)).is_err() {
                    log::warn!("program counter register {reg} vanished");
                }
            }
            ProgramCounter::Internal(_) => self.pc = ProgramCounter::Internal(target),
        }
    }

    /// Primitive context outside any instruction, for front-ends and tests.
    pub fn capi(&mut self) -> Capi<'_> {
        let trace = if self.config.tracing_enabled {
            self.trace
                .as_mut()
                .map(|sink| &mut **sink as &mut dyn TraceSink)
        } else {
            None
        };
        Capi::new(
            &self.arch,
            &mut self.registers,
            &mut self.memory,
            &mut self.sentinel,
            &self.registry,
            trace,
            None,
        )
    }

    /// Returns a faulted session to [`RunState::Ready`] after inspection.
    pub fn clear_fault(&mut self) {
        if matches!(self.run_state, RunState::Faulted(_)) {
            self.run_state = RunState::Ready;
        }
        self.latched_fault = None;
    }

    /// Restores every memory cell and register to its reset value, drops all
    /// call frames and returns to [`RunState::Ready`].
    pub fn reset(&mut self) {
        self.memory.reset();
        self.registers.reset();
        self.sentinel.clear();
        self.diagnostics.reset();
        self.run_state = RunState::Ready;
        self.latched_fault = None;
        self.pc = Self::initial_pc(&self.arch, &self.registers);
        log::info!("session `{}` reset", self.arch.name);
    }
}
