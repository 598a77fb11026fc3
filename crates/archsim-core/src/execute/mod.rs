//! Fetch/execute loop.
//!
//! A step fetches the instruction at the program counter, advances the
//! counter by the instruction size, runs the semantics through a [`Capi`]
//! context and applies call/return frame bookkeeping. A fault latches the
//! session in [`RunState::Faulted`] until the caller clears it or resets.

mod program;

use std::sync::atomic::{AtomicBool, Ordering};

pub use program::{Flow, Instruction, InstructionRole, InstructionSemantics, Program};

use crate::{
    CallFrame, Capi, Fault, IntRepr, RegisterProperty, RunBoundary, RunLimits, RunOutcome,
    RunState, SimulationSession, StepOutcome, StepReport, TraceEvent, TraceSink,
};

impl SimulationSession {
    /// Executes one instruction.
    ///
    /// A faulted session returns the latched fault without executing; a
    /// halted session stays halted. A missing instruction at the program
    /// counter halts the session.
    pub fn step(&mut self) -> StepReport {
        match self.run_state {
            RunState::Faulted(kind) => {
                let fault = self
                    .latched_fault
                    .clone()
                    .unwrap_or_else(|| Fault::new(kind, "fault latched"));
                return StepReport::empty(StepOutcome::Fault(fault));
            }
            RunState::Halted => return StepReport::empty(StepOutcome::Halted),
            RunState::Ready | RunState::Running => {}
        }

        let pc = self.pc();
        let Some(index) = self.program.index_of(pc) else {
            log::info!("no instruction at 0x{pc:x}; halting");
            self.run_state = RunState::Halted;
            return StepReport::empty(StepOutcome::Halted);
        };
        let (size, role) = match self.program.get(index) {
            Some(instruction) => (instruction.size, instruction.role),
            None => return StepReport::empty(StepOutcome::Halted),
        };

        self.run_state = RunState::Running;
        self.diagnostics.increment_instruction_count();
        self.set_pc(pc.wrapping_add(size));

        let tracing = self.config.tracing_enabled;
        let Self {
            arch,
            registers,
            memory,
            sentinel,
            registry,
            program,
            trace,
            ..
        } = self;
        let mut sink = if tracing {
            trace.as_mut().map(|sink| &mut **sink as &mut dyn TraceSink)
        } else {
            None
        };
        if let Some(sink) = sink.as_mut() {
            sink.on_event(TraceEvent::InstructionStart { index, address: pc });
        }
        let (result, jump) = {
            let mut capi = Capi::new(arch, registers, memory, sentinel, registry, sink, Some(index));
            let result = match program.get(index) {
                Some(instruction) => instruction.execute(&mut capi),
                None => Ok(Flow::Halt),
            };
            (result, capi.take_jump())
        };

        let mut returned = None;
        match result {
            Ok(flow) => {
                if let Some(target) = jump {
                    self.set_pc(target);
                }
                match role {
                    InstructionRole::Call => self.open_frame(),
                    InstructionRole::Return => {
                        returned = self.sentinel.pop_frame(&self.registers);
                        if returned.as_ref().is_some_and(|report| !report.unrestored.is_empty()) {
                            self.diagnostics.record_unrestored_frame();
                        }
                    }
                    InstructionRole::Plain => {}
                }
                if flow == Flow::Halt {
                    log::info!("instruction {index} halted the program");
                    self.run_state = RunState::Halted;
                }
            }
            Err(fault) => self.latch(fault.at_instruction(index)),
        }

        let outcome = match self.run_state {
            RunState::Faulted(kind) => StepOutcome::Fault(
                self.latched_fault
                    .clone()
                    .unwrap_or_else(|| Fault::new(kind, "fault latched")),
            ),
            RunState::Halted => StepOutcome::Halted,
            RunState::Ready | RunState::Running => StepOutcome::Retired,
        };
        StepReport {
            outcome,
            instruction_index: Some(index),
            address: Some(pc),
            register_deltas: self.registers.take_journal(),
            memory_deltas: self.memory.take_journal(),
            frames: self.sentinel.diagnostics(),
            returned,
        }
    }

    fn open_frame(&mut self) {
        let sp = self
            .registers
            .find_by_property(RegisterProperty::StackPointer)
            .and_then(|reg| self.registers.peek(reg))
            .map_or_else(
                || self.memory.effective_stack().end.saturating_add(1),
                IntRepr::bits,
            );
        let saved = self.registers.snapshot(RegisterProperty::Saved);
        self.sentinel
            .push_frame(CallFrame::new(self.pc(), sp).with_saved(saved));
    }

    fn latch(&mut self, fault: Fault) {
        self.diagnostics.record_fault(&fault);
        if self.config.tracing_enabled {
            if let Some(sink) = self.trace.as_mut() {
                sink.on_event(TraceEvent::FaultRaised {
                    kind: fault.kind,
                    instruction_index: fault.instruction_index,
                });
            }
        }
        self.run_state = RunState::Faulted(fault.kind);
        self.latched_fault = Some(fault);
    }

    /// Steps until the program halts or faults, the step budget is spent, a
    /// breakpoint is reached, or `cancel` is observed between steps.
    ///
    /// Breakpoints are not checked before the first step, so a run can
    /// resume from the instruction it stopped at.
    pub fn run(&mut self, limits: RunLimits, cancel: &AtomicBool) -> RunOutcome {
        let mut steps = 0u64;
        let boundary = loop {
            match self.run_state {
                RunState::Halted => break RunBoundary::Halted,
                RunState::Faulted(_) => break RunBoundary::Fault,
                RunState::Ready | RunState::Running => {}
            }
            if cancel.load(Ordering::Relaxed) {
                break RunBoundary::Cancelled;
            }
            if limits.max_steps.is_some_and(|max| steps >= max) {
                break RunBoundary::StepBudget;
            }
            if steps > 0 && limits.stop_on_breakpoint && self.memory.breakpoint(self.pc()) {
                break RunBoundary::Breakpoint;
            }
            let report = self.step();
            if report.instruction_index.is_some() {
                steps = steps.saturating_add(1);
            }
        };
        log::info!("run stopped after {steps} steps: {boundary:?}");
        RunOutcome {
            steps,
            boundary,
            state: self.run_state,
            fault: self.latched_fault.clone(),
        }
    }

    /// Runs with the limits from the session configuration.
    pub fn run_to_end(&mut self, cancel: &AtomicBool) -> RunOutcome {
        self.run(RunLimits::from_config(&self.config), cancel)
    }
}
