//! Primitive catalogue instruction semantics use to touch simulation state.
//!
//! A [`Capi`] borrows the mutable parts of a session for the duration of one
//! instruction. Every fault detected here goes through [`Capi::raise`], which
//! attributes it to the executing instruction.

/// Name-indexed primitive table.
pub mod registry;

pub use registry::{CapiFn, CapiRegistry, CapiValue};

use crate::{
    f32_to_native, f64_to_native, native_to_f32, native_to_f64, validate_alignment, AccessWidth,
    Architecture, Fault, FaultKind, FrameSummary, IntRepr, Memory, MemoryError, MemoryRead,
    Precision, RegisterError, RegisterFile, RegisterProperty, RegisterRef, RegisterValue, Sentinel,
    TraceEvent, TraceSink, WriteOutcome,
};

/// Execution context handed to instruction semantics.
pub struct Capi<'a> {
    arch: &'a Architecture,
    registers: &'a mut RegisterFile,
    memory: &'a mut Memory,
    sentinel: &'a mut Sentinel,
    registry: &'a CapiRegistry,
    trace: Option<&'a mut dyn TraceSink>,
    instruction: Option<usize>,
    jump: Option<u64>,
}

impl std::fmt::Debug for Capi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capi")
            .field("arch", &self.arch.name)
            .field("instruction", &self.instruction)
            .field("jump", &self.jump)
            .finish_non_exhaustive()
    }
}

impl<'a> Capi<'a> {
    pub(crate) fn new(
        arch: &'a Architecture,
        registers: &'a mut RegisterFile,
        memory: &'a mut Memory,
        sentinel: &'a mut Sentinel,
        registry: &'a CapiRegistry,
        trace: Option<&'a mut dyn TraceSink>,
        instruction: Option<usize>,
    ) -> Self {
        Self {
            arch,
            registers,
            memory,
            sentinel,
            registry,
            trace,
            instruction,
            jump: None,
        }
    }

    /// Architecture description of the session.
    #[must_use]
    pub const fn arch(&self) -> &Architecture {
        self.arch
    }

    /// Register file, read-only.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn registers(&self) -> &RegisterFile {
        &*self.registers
    }

    /// Memory, read-only.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn memory(&self) -> &Memory {
        &*self.memory
    }

    /// Index of the executing instruction, if any.
    #[must_use]
    pub const fn instruction_index(&self) -> Option<usize> {
        self.instruction
    }

    /// Builds a fault attributed to the executing instruction.
    ///
    /// The caller returns it as `Err` to stop the instruction.
    pub fn raise(&self, kind: FaultKind, message: impl Into<String>) -> Fault {
        let mut fault = Fault::new(kind, message);
        if let Some(index) = self.instruction {
            fault = fault.at_instruction(index);
        }
        match fault.instruction_index {
            Some(index) => log::warn!("{fault} (instruction {index})"),
            None => log::warn!("{fault}"),
        }
        fault
    }

    fn memory_fault(&self, err: MemoryError) -> Fault {
        self.raise(err.fault_kind(), err.to_string())
    }

    fn register_fault(&self, err: &RegisterError) -> Fault {
        self.raise(err.fault_kind(), err.to_string())
    }

    fn emit(&mut self, event: TraceEvent) {
        if let Some(sink) = self.trace.as_mut() {
            sink.on_event(event);
        }
    }

    /// Resolves the optional base-register name of a memory access.
    fn access_register(&self, reg_name: Option<&str>) -> Option<RegisterRef> {
        reg_name.and_then(|name| self.registers.find_by_name(name))
    }

    /// Writes the low `width` bytes of `value` at `addr`.
    ///
    /// `reg_name` names the base register of the access; when it resolves,
    /// the write is recorded against the active call frame.
    ///
    /// # Errors
    ///
    /// Alignment faults, segmentation faults for text or unmapped targets,
    /// and stack corruption when the target lies in the stack segment but
    /// outside the innermost frame. Memory is untouched on failure.
    pub fn mem_write(
        &mut self,
        addr: u64,
        value: IntRepr,
        width: AccessWidth,
        reg_name: Option<&str>,
    ) -> Result<(), Fault> {
        validate_alignment(addr, width, self.arch.alignment).map_err(|err| self.memory_fault(err))?;
        if self.memory.layout().text.overlaps_span(addr, width.bytes()) {
            return Err(self.raise(
                FaultKind::Segmentation,
                format!("write to text segment at 0x{addr:x}"),
            ));
        }
        let stack = self.memory.effective_stack();
        self.sentinel
            .check_write(addr, width.bytes(), stack)
            .map_err(|violation| self.raise(violation.fault_kind(), violation.to_string()))?;

        self.memory
            .write(addr, value, width)
            .map_err(|err| self.memory_fault(err))?;

        if self.access_register(reg_name).is_some() && stack.contains(addr) {
            self.sentinel.record_write(addr, width.bytes());
        }
        self.emit(TraceEvent::MemoryWrite {
            address: addr,
            width,
            value: value.truncate(width.bits()),
        });
        Ok(())
    }

    /// Reads `width` bytes at `addr`.
    ///
    /// Reads from the text segment are rejected like writes.
    ///
    /// # Errors
    ///
    /// Alignment faults, and segmentation faults for text or unmapped
    /// addresses.
    pub fn mem_read(
        &mut self,
        addr: u64,
        width: AccessWidth,
        reg_name: Option<&str>,
    ) -> Result<IntRepr, Fault> {
        self.mem_read_flagged(addr, width, reg_name)
            .map(|read| read.value)
    }

    /// Same as [`Self::mem_read`], also reporting whether a breakpoint is
    /// set on the first byte read.
    ///
    /// # Errors
    ///
    /// Same as [`Self::mem_read`].
    pub fn mem_read_flagged(
        &mut self,
        addr: u64,
        width: AccessWidth,
        reg_name: Option<&str>,
    ) -> Result<MemoryRead, Fault> {
        validate_alignment(addr, width, self.arch.alignment).map_err(|err| self.memory_fault(err))?;
        if self.memory.layout().text.overlaps_span(addr, width.bytes()) {
            return Err(self.raise(
                FaultKind::Segmentation,
                format!("read from text segment at 0x{addr:x}"),
            ));
        }
        let read = self
            .memory
            .read(addr, width)
            .map_err(|err| self.memory_fault(err))?;
        if self.access_register(reg_name).is_some() && self.memory.effective_stack().contains(addr) {
            self.sentinel.record_read(addr, width.bytes());
        }
        Ok(read)
    }

    /// Faults when `addr` is not aligned for `width` under the
    /// architecture's policy.
    ///
    /// # Errors
    ///
    /// [`FaultKind::Alignment`].
    pub fn check_align(&self, addr: u64, width: AccessWidth) -> Result<(), Fault> {
        validate_alignment(addr, width, self.arch.alignment).map_err(|err| self.memory_fault(err))
    }

    /// Looks up a register by alias.
    #[must_use]
    pub fn find_reg(&self, name: &str) -> Option<RegisterRef> {
        self.registers.find_by_name(name)
    }

    /// Looks up the first register carrying the property spelled `tag`.
    #[must_use]
    pub fn find_reg_by_tag(&self, tag: &str) -> Option<RegisterRef> {
        self.registers.find_by_tag(tag)
    }

    /// Reads a register as its declared type.
    ///
    /// # Errors
    ///
    /// Permission faults for unreadable registers; invalid-register faults
    /// for unknown indices.
    pub fn read_reg(&self, reg: RegisterRef, hint: Option<Precision>) -> Result<RegisterValue, Fault> {
        self.registers
            .read(reg, hint)
            .map_err(|err| self.register_fault(&err))
    }

    /// Reads the raw bits of a register.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_reg`].
    pub fn read_reg_bits(&self, reg: RegisterRef) -> Result<IntRepr, Fault> {
        self.registers
            .read_raw(reg)
            .map_err(|err| self.register_fault(&err))
    }

    /// Writes a register.
    ///
    /// Writing a stack pointer to anything but the reset value moves the
    /// tracked stack limit and extends the innermost frame downwards.
    ///
    /// # Errors
    ///
    /// Permission faults for unwritable registers, invalid-register faults
    /// for unknown indices, and segmentation faults when a stack pointer
    /// would land in the text or data segment. The register is unchanged on
    /// failure.
    pub fn write_reg(
        &mut self,
        reg: RegisterRef,
        value: RegisterValue,
        hint: Option<Precision>,
    ) -> Result<(), Fault> {
        self.check_stack_pointer(reg, value)?;
        let outcome = self
            .registers
            .write(reg, value, hint)
            .map_err(|err| self.register_fault(&err))?;
        let WriteOutcome::Applied { stack_pointer } = outcome else {
            return Ok(());
        };
        if let Some(sp) = stack_pointer {
            self.memory.set_stack_limit(sp);
            self.sentinel.extend(sp);
        }
        self.sentinel.record_register_write(reg);
        if let Some(stored) = self.registers.peek(reg) {
            self.emit(TraceEvent::RegisterWrite {
                register: reg,
                value: stored,
            });
        }
        Ok(())
    }

    fn check_stack_pointer(&self, reg: RegisterRef, value: RegisterValue) -> Result<(), Fault> {
        let Some(element) = self.registers.element(reg) else {
            return Ok(());
        };
        if !element.has(RegisterProperty::StackPointer) || !element.has(RegisterProperty::Write) {
            return Ok(());
        }
        let sp = value.to_repr().truncate(element.nbits).bits();
        if sp == self.arch.default_stack_pointer {
            return Ok(());
        }
        let layout = self.memory.layout();
        let segment = if layout.text.contains(sp) {
            "text"
        } else if layout.data.contains(sp) {
            "data"
        } else {
            return Ok(());
        };
        Err(self.raise(
            FaultKind::Segmentation,
            format!("stack pointer cannot be placed in the {segment} segment (0x{sp:x})"),
        ))
    }

    /// Redirects control flow: the next instruction fetched is at `target`.
    #[allow(clippy::missing_const_for_fn)]
    pub fn set_pc(&mut self, target: u64) {
        self.jump = Some(target);
    }

    #[allow(clippy::missing_const_for_fn)]
    pub(crate) fn take_jump(&mut self) -> Option<u64> {
        self.jump.take()
    }

    /// Returns `true` when a write of `width` at `addr` would stay inside
    /// the innermost frame (or outside the stack segment).
    #[must_use]
    pub fn check_stack(&self, addr: u64, width: AccessWidth) -> bool {
        self.sentinel
            .check_write(addr, width.bytes(), self.memory.effective_stack())
            .is_ok()
    }

    /// Text rendering of the active frames, innermost first.
    #[must_use]
    pub fn draw_stack(&self) -> String {
        self.sentinel.render()
    }

    /// Summaries of the active frames, outermost first.
    #[must_use]
    pub fn stack_frames(&self) -> Vec<FrameSummary> {
        self.sentinel.diagnostics()
    }

    /// IEEE-754 single bit pattern of `value`.
    #[must_use]
    pub const fn float_to_bits(value: f32) -> IntRepr {
        f32_to_native(value)
    }

    /// Single-precision view of the low 32 bits of `bits`.
    #[must_use]
    pub const fn bits_to_float(bits: IntRepr) -> f32 {
        native_to_f32(bits)
    }

    /// IEEE-754 double bit pattern of `value`.
    #[must_use]
    pub const fn double_to_bits(value: f64) -> IntRepr {
        f64_to_native(value)
    }

    /// Double-precision view of `bits`.
    #[must_use]
    pub const fn bits_to_double(bits: IntRepr) -> f64 {
        native_to_f64(bits)
    }

    /// Invokes a primitive from the session's registry by name.
    ///
    /// # Errors
    ///
    /// [`FaultKind::InvalidOperand`] for unknown names, plus whatever the
    /// primitive raises.
    pub fn call(&mut self, name: &str, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
        let registry = self.registry;
        let primitive = registry
            .get(name)
            .ok_or_else(|| self.raise(FaultKind::InvalidOperand, format!("unknown primitive `{name}`")))?;
        primitive(self, args)
    }
}
