//! Register file built from an architecture description.
//!
//! Every element stores an [`IntRepr`]; floating-point registers hold the
//! IEEE-754 bit pattern of their value. Linked double-precision registers
//! are kept consistent with their single-precision pair on every write.

use std::fmt;

use thiserror::Error;

use crate::{
    combine_singles, f32_to_native, f64_to_native, native_to_f32, native_to_f64, split_double,
    Architecture, Component, ComponentKind, DoublePrecisionMode, FaultKind, IntRepr,
    RegisterElement, RegisterProperty,
};

/// Position of one register inside the architecture description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterRef {
    /// Component index.
    pub component: usize,
    /// Element index within the component.
    pub element: usize,
}

impl RegisterRef {
    /// Creates a reference from component and element indices.
    #[must_use]
    pub const fn new(component: usize, element: usize) -> Self {
        Self { component, element }
    }
}

impl fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.component, self.element)
    }
}

/// Physical width selected when accessing a separate-storage double
/// component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Precision {
    /// Single-precision view (`SFP`).
    Single,
    /// Double-precision view (`DFP`).
    Double,
}

/// Typed register value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterValue {
    /// Integer representation.
    Int(IntRepr),
    /// Single-precision float.
    Single(f32),
    /// Double-precision float.
    Double(f64),
}

impl RegisterValue {
    /// Bit pattern of the value.
    #[must_use]
    pub const fn to_repr(self) -> IntRepr {
        match self {
            Self::Int(repr) => repr,
            Self::Single(value) => f32_to_native(value),
            Self::Double(value) => f64_to_native(value),
        }
    }
}

impl From<IntRepr> for RegisterValue {
    fn from(repr: IntRepr) -> Self {
        Self::Int(repr)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn narrow_to_single(value: f64) -> f32 {
    value as f32
}

/// Register access failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Component or element index does not exist.
    #[error("register {0} does not exist")]
    Unknown(RegisterRef),
    /// Element lacks the `read` capability.
    #[error("register `{0}` is not readable")]
    NotReadable(String),
    /// Element lacks both `write` and `ignore_write`.
    #[error("register `{0}` is not writable")]
    NotWritable(String),
}

impl RegisterError {
    /// Maps the failure onto the fault taxonomy.
    #[must_use]
    pub const fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Unknown(_) => FaultKind::InvalidRegister,
            Self::NotReadable(_) | Self::NotWritable(_) => FaultKind::Permission,
        }
    }
}

/// Effect of an accepted register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value stored.
    Applied {
        /// New stack-pointer value when the element is a stack pointer and
        /// the value differs from the architecture's reset value.
        stack_pointer: Option<u64>,
    },
    /// Element carries `ignore_write`; nothing changed.
    Ignored,
}

/// One committed register change, recorded for step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterDelta {
    /// Register written.
    pub register: RegisterRef,
    /// Bits before the write.
    pub old: IntRepr,
    /// Bits after the write.
    pub new: IntRepr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkedPair {
    double: RegisterRef,
    lo: RegisterRef,
    hi: RegisterRef,
}

/// Register storage for one session.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    components: Vec<Component>,
    values: Vec<Vec<IntRepr>>,
    links: Vec<LinkedPair>,
    default_stack_pointer: u64,
    journal: Option<Vec<RegisterDelta>>,
}

impl RegisterFile {
    /// Builds the register file with every element at its reset value.
    ///
    /// Linked doubles whose singles cannot be resolved are left unlinked;
    /// [`Architecture::validate`] reports them.
    #[must_use]
    pub fn new(arch: &Architecture) -> Self {
        let components = arch.components.clone();
        let values = components
            .iter()
            .map(|component| {
                component
                    .elements
                    .iter()
                    .map(|element| element.default_value.truncate(element.nbits))
                    .collect()
            })
            .collect();
        let mut file = Self {
            components,
            values,
            links: Vec::new(),
            default_stack_pointer: arch.default_stack_pointer,
            journal: None,
        };
        file.links = file.resolve_links();
        file.sync_all_doubles();
        file
    }

    fn resolve_links(&self) -> Vec<LinkedPair> {
        let mut links = Vec::new();
        for (component_index, component) in self.components.iter().enumerate() {
            if !component.is_linked_double() {
                continue;
            }
            for (element_index, element) in component.elements.iter().enumerate() {
                let Some([lo, hi]) = element.linked.as_ref() else {
                    continue;
                };
                if let (Some(lo), Some(hi)) = (self.find_single(lo), self.find_single(hi)) {
                    links.push(LinkedPair {
                        double: RegisterRef::new(component_index, element_index),
                        lo,
                        hi,
                    });
                }
            }
        }
        links
    }

    fn find_single(&self, name: &str) -> Option<RegisterRef> {
        self.refs().find(|reg| {
            let component = &self.components[reg.component];
            component.kind == ComponentKind::FpRegisters
                && !component.double_precision
                && component.elements[reg.element].has_name(name)
        })
    }

    /// Component descriptions in declaration order.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Description of the element behind `reg`.
    #[must_use]
    pub fn element(&self, reg: RegisterRef) -> Option<&RegisterElement> {
        self.components
            .get(reg.component)
            .and_then(|component| component.elements.get(reg.element))
    }

    /// Canonical name of `reg`, or its index form when it does not exist.
    #[must_use]
    pub fn name_of(&self, reg: RegisterRef) -> String {
        self.element(reg)
            .and_then(|element| element.names.first().cloned())
            .unwrap_or_else(|| reg.to_string())
    }

    /// Iterates every register in declaration order.
    pub fn refs(&self) -> impl Iterator<Item = RegisterRef> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(component, description)| {
                (0..description.elements.len()).map(move |element| RegisterRef::new(component, element))
            })
    }

    /// Finds a register by any of its aliases. First match wins; an empty
    /// name never matches.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<RegisterRef> {
        if name.is_empty() {
            return None;
        }
        self.refs()
            .find(|reg| self.element(*reg).is_some_and(|element| element.has_name(name)))
    }

    /// Finds the first register carrying `property`.
    #[must_use]
    pub fn find_by_property(&self, property: RegisterProperty) -> Option<RegisterRef> {
        self.refs()
            .find(|reg| self.element(*reg).is_some_and(|element| element.has(property)))
    }

    /// Finds the first register carrying the property spelled `tag`.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Option<RegisterRef> {
        tag.parse()
            .ok()
            .and_then(|property| self.find_by_property(property))
    }

    /// Iterates registers carrying `property`.
    pub fn with_property(&self, property: RegisterProperty) -> impl Iterator<Item = RegisterRef> + '_ {
        self.refs()
            .filter(move |reg| self.element(*reg).is_some_and(|element| element.has(property)))
    }

    /// Raw bits of `reg` without capability checks.
    #[must_use]
    pub fn peek(&self, reg: RegisterRef) -> Option<IntRepr> {
        self.values
            .get(reg.component)
            .and_then(|values| values.get(reg.element))
            .copied()
    }

    /// Reads `reg` as the typed value its component declares.
    ///
    /// `hint` only matters for separate-storage double components, where it
    /// defaults to [`Precision::Double`].
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Unknown`] for indices outside the
    /// architecture and [`RegisterError::NotReadable`] when the element
    /// lacks `read`.
    pub fn read(&self, reg: RegisterRef, hint: Option<Precision>) -> Result<RegisterValue, RegisterError> {
        let repr = self.read_raw(reg)?;
        let component = &self.components[reg.component];
        let value = match component.kind {
            ComponentKind::IntRegisters | ComponentKind::CtrlRegisters => RegisterValue::Int(repr),
            ComponentKind::FpRegisters if !component.double_precision => {
                RegisterValue::Single(native_to_f32(repr))
            }
            ComponentKind::FpRegisters => match (component.double_precision_mode, hint) {
                (DoublePrecisionMode::Separate, Some(Precision::Single)) => {
                    RegisterValue::Single(native_to_f32(repr))
                }
                _ => RegisterValue::Double(native_to_f64(repr)),
            },
        };
        Ok(value)
    }

    /// Reads the raw bits of `reg`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub fn read_raw(&self, reg: RegisterRef) -> Result<IntRepr, RegisterError> {
        let element = self.element(reg).ok_or(RegisterError::Unknown(reg))?;
        if !element.has(RegisterProperty::Read) {
            return Err(RegisterError::NotReadable(element.display_name()));
        }
        let repr = self.peek(reg).ok_or(RegisterError::Unknown(reg))?;
        log::debug!("register read {}: 0x{repr:x}", element.display_name());
        Ok(repr)
    }

    /// Writes `value` into `reg`.
    ///
    /// Float values are converted into the precision of the accessed view
    /// before storing; integers are stored as raw bits. The stored bits are
    /// truncated to the element width (32 bits for a
    /// single-precision access to a separate double). Writing either half
    /// of a linked pair updates the double, and writing the double updates
    /// both halves.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Unknown`] for indices outside the
    /// architecture and [`RegisterError::NotWritable`] when the element has
    /// neither `write` nor `ignore_write`. The register is unchanged on
    /// failure.
    pub fn write(
        &mut self,
        reg: RegisterRef,
        value: RegisterValue,
        hint: Option<Precision>,
    ) -> Result<WriteOutcome, RegisterError> {
        let element = self.element(reg).ok_or(RegisterError::Unknown(reg))?;
        if !element.has(RegisterProperty::Write) {
            if element.has(RegisterProperty::IgnoreWrite) {
                log::debug!("register write {} ignored", element.display_name());
                return Ok(WriteOutcome::Ignored);
            }
            return Err(RegisterError::NotWritable(element.display_name()));
        }

        let component = &self.components[reg.component];
        let single_view = component.kind == ComponentKind::FpRegisters
            && component.double_precision
            && component.double_precision_mode == DoublePrecisionMode::Separate
            && hint == Some(Precision::Single);
        let width = if single_view { 32 } else { element.nbits };
        let is_stack_pointer = element.has(RegisterProperty::StackPointer);

        let repr = match (value, component.kind, component.double_precision && !single_view) {
            (RegisterValue::Single(single), ComponentKind::FpRegisters, true) => {
                f64_to_native(f64::from(single))
            }
            (RegisterValue::Double(double), ComponentKind::FpRegisters, false) => {
                f32_to_native(narrow_to_single(double))
            }
            _ => value.to_repr(),
        };
        let stored = self.store(reg, repr.truncate(width));
        self.sync_links(reg);

        let stack_pointer = (is_stack_pointer && stored.bits() != self.default_stack_pointer)
            .then_some(stored.bits());
        Ok(WriteOutcome::Applied { stack_pointer })
    }

    /// Stores raw bits without capability checks, truncated to the element
    /// width. Used by the executor to advance the program counter.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Unknown`] for indices outside the
    /// architecture.
    pub fn force(&mut self, reg: RegisterRef, repr: IntRepr) -> Result<(), RegisterError> {
        let nbits = self.element(reg).ok_or(RegisterError::Unknown(reg))?.nbits;
        self.store(reg, repr.truncate(nbits));
        self.sync_links(reg);
        Ok(())
    }

    fn store(&mut self, reg: RegisterRef, new: IntRepr) -> IntRepr {
        let Some(slot) = self
            .values
            .get_mut(reg.component)
            .and_then(|values| values.get_mut(reg.element))
        else {
            return new;
        };
        let old = std::mem::replace(slot, new);
        if let Some(element) = self.element(reg) {
            log::debug!(
                "register write {}: 0x{old:x} -> 0x{new:x}",
                element.display_name()
            );
        }
        if old != new {
            if let Some(journal) = self.journal.as_mut() {
                journal.push(RegisterDelta { register: reg, old, new });
            }
        }
        new
    }

    fn sync_links(&mut self, written: RegisterRef) {
        let links = self.links.clone();
        for pair in links {
            if pair.double == written {
                let Some(double) = self.peek(pair.double) else {
                    continue;
                };
                let (lo, hi) = split_double(double);
                self.store(pair.lo, lo);
                self.store(pair.hi, hi);
            } else if pair.lo == written || pair.hi == written {
                self.sync_double(pair);
            }
        }
    }

    fn sync_double(&mut self, pair: LinkedPair) {
        if let (Some(lo), Some(hi)) = (self.peek(pair.lo), self.peek(pair.hi)) {
            self.store(pair.double, combine_singles(lo, hi));
        }
    }

    fn sync_all_doubles(&mut self) {
        for pair in self.links.clone() {
            self.sync_double(pair);
        }
    }

    /// Enables or disables delta recording for step reports.
    pub fn set_journal_enabled(&mut self, enabled: bool) {
        self.journal = enabled.then(Vec::new);
    }

    /// Drains the deltas recorded since the last call.
    pub fn take_journal(&mut self) -> Vec<RegisterDelta> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Restores every element to its architecture reset value. Linked
    /// doubles are re-derived from their singles.
    pub fn reset(&mut self) {
        for (values, component) in self.values.iter_mut().zip(&self.components) {
            for (value, element) in values.iter_mut().zip(&component.elements) {
                *value = element.default_value.truncate(element.nbits);
            }
        }
        self.sync_all_doubles();
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }

    /// Current bits of every register tagged `property`.
    #[must_use]
    pub fn snapshot(&self, property: RegisterProperty) -> Vec<(RegisterRef, IntRepr)> {
        self.with_property(property)
            .filter_map(|reg| self.peek(reg).map(|repr| (reg, repr)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Precision, RegisterError, RegisterFile, RegisterRef, RegisterValue, WriteOutcome};
    use crate::{
        combine_singles, f32_to_native, f64_to_native, Architecture, Component, ComponentKind,
        DoublePrecisionMode, FaultKind, IntRepr, MemoryLayout, RegisterElement, RegisterProperties,
        RegisterProperty, Segment,
    };

    const LAYOUT: MemoryLayout = MemoryLayout {
        text: Segment::new(0x0000, 0x0FFF),
        data: Segment::new(0x1000, 0x1FFF),
        stack: Segment::new(0x8000, 0x8FFF),
    };

    const RW: RegisterProperties = RegisterProperties::READ_WRITE;
    const SP: RegisterProperties = RegisterProperties::from_slice(&[
        RegisterProperty::Read,
        RegisterProperty::Write,
        RegisterProperty::StackPointer,
    ]);

    fn arch() -> Architecture {
        Architecture::new("test", 32, LAYOUT)
            .with_default_stack_pointer(0x8FF0)
            .with_component(
                Component::new("int", ComponentKind::IntRegisters)
                    .with_element(RegisterElement::new(&["zero", "x0"], 32, RegisterProperties::from_slice(&[
                        RegisterProperty::Read,
                        RegisterProperty::IgnoreWrite,
                    ])))
                    .with_element(RegisterElement::new(&["r1", "ra"], 32, RW))
                    .with_element(
                        RegisterElement::new(&["sp"], 32, SP).with_value(IntRepr::from_bits(0x8FF0)),
                    )
                    .with_element(RegisterElement::new(&["ro"], 32, RegisterProperties::from_slice(&[
                        RegisterProperty::Read,
                    ]))),
            )
            .with_component(
                Component::new("single", ComponentKind::FpRegisters)
                    .with_element(RegisterElement::new(&["f0"], 32, RW))
                    .with_element(RegisterElement::new(&["f1"], 32, RW)),
            )
            .with_component(
                Component::new("double", ComponentKind::FpRegisters)
                    .double(DoublePrecisionMode::Linked)
                    .with_element(RegisterElement::new(&["d0"], 64, RW).linked_to("f0", "f1")),
            )
            .with_component(
                Component::new("separate", ComponentKind::FpRegisters)
                    .double(DoublePrecisionMode::Separate)
                    .with_element(RegisterElement::new(&["ft0"], 64, RW)),
            )
    }

    const R1: RegisterRef = RegisterRef::new(0, 1);
    const F0: RegisterRef = RegisterRef::new(1, 0);
    const F1: RegisterRef = RegisterRef::new(1, 1);
    const D0: RegisterRef = RegisterRef::new(2, 0);

    #[test]
    fn lookup_matches_aliases_and_rejects_empty_names() {
        let file = RegisterFile::new(&arch());
        assert_eq!(file.find_by_name("ra"), Some(R1));
        assert_eq!(file.find_by_name("x0"), Some(RegisterRef::new(0, 0)));
        assert_eq!(file.find_by_name(""), None);
        assert_eq!(file.find_by_name("nope"), None);
        assert_eq!(file.find_by_tag("stack_pointer"), Some(RegisterRef::new(0, 2)));
        assert_eq!(file.find_by_tag("no_such_tag"), None);
    }

    #[test]
    fn integer_writes_truncate_to_width() {
        let mut file = RegisterFile::new(&arch());
        file.write(R1, RegisterValue::Int(IntRepr::from_bits(0x1_2345_6789)), None)
            .expect("writable");
        assert_eq!(file.read(R1, None), Ok(RegisterValue::Int(IntRepr::from_bits(0x2345_6789))));
    }

    #[test]
    fn read_only_register_rejects_write_and_keeps_value() {
        let mut file = RegisterFile::new(&arch());
        let ro = RegisterRef::new(0, 3);
        let err = file
            .write(ro, RegisterValue::Int(IntRepr::from_bits(7)), None)
            .expect_err("read-only");
        assert_eq!(err.fault_kind(), FaultKind::Permission);
        assert_eq!(file.peek(ro), Some(IntRepr::ZERO));
    }

    #[test]
    fn ignore_write_register_is_silent_no_op() {
        let mut file = RegisterFile::new(&arch());
        let zero = RegisterRef::new(0, 0);
        assert_eq!(
            file.write(zero, RegisterValue::Int(IntRepr::from_bits(9)), None),
            Ok(WriteOutcome::Ignored)
        );
        assert_eq!(file.peek(zero), Some(IntRepr::ZERO));
    }

    #[test]
    fn unknown_register_is_invalid_register() {
        let file = RegisterFile::new(&arch());
        let err = file.read(RegisterRef::new(9, 0), None).expect_err("missing");
        assert_eq!(err, RegisterError::Unknown(RegisterRef::new(9, 0)));
        assert_eq!(err.fault_kind(), FaultKind::InvalidRegister);
    }

    #[test]
    fn stack_pointer_writes_report_new_limit_unless_default() {
        let mut file = RegisterFile::new(&arch());
        let sp = RegisterRef::new(0, 2);
        assert_eq!(
            file.write(sp, RegisterValue::Int(IntRepr::from_bits(0x8F00)), None),
            Ok(WriteOutcome::Applied { stack_pointer: Some(0x8F00) })
        );
        assert_eq!(
            file.write(sp, RegisterValue::Int(IntRepr::from_bits(0x8FF0)), None),
            Ok(WriteOutcome::Applied { stack_pointer: None })
        );
        assert_eq!(
            file.write(R1, RegisterValue::Int(IntRepr::from_bits(0x8F00)), None),
            Ok(WriteOutcome::Applied { stack_pointer: None })
        );
    }

    #[test]
    fn single_register_round_trips_one_point_zero() {
        let mut file = RegisterFile::new(&arch());
        file.write(F0, RegisterValue::Int(IntRepr::from_bits(0x3F80_0000)), None)
            .expect("writable");
        assert_eq!(file.read(F0, None), Ok(RegisterValue::Single(1.0)));
    }

    #[test]
    fn linked_pair_stays_consistent_in_both_directions() {
        let mut file = RegisterFile::new(&arch());
        file.write(F0, RegisterValue::Int(IntRepr::from_bits(0x0000_0001)), None)
            .expect("writable");
        file.write(F1, RegisterValue::Int(IntRepr::from_bits(0x3FF0_0000)), None)
            .expect("writable");
        assert_eq!(
            file.peek(D0),
            Some(combine_singles(IntRepr::from_bits(1), IntRepr::from_bits(0x3FF0_0000)))
        );

        file.write(D0, RegisterValue::Double(-2.5), None).expect("writable");
        let bits = (-2.5f64).to_bits();
        assert_eq!(file.peek(F0), Some(IntRepr::from_bits(bits & 0xFFFF_FFFF)));
        assert_eq!(file.peek(F1), Some(IntRepr::from_bits(bits >> 32)));
    }

    #[test]
    fn separate_double_honours_precision_hint() {
        let mut file = RegisterFile::new(&arch());
        let ft0 = RegisterRef::new(3, 0);
        file.write(ft0, RegisterValue::Double(1.5), None).expect("writable");
        assert_eq!(file.read(ft0, None), Ok(RegisterValue::Double(1.5)));

        file.write(ft0, RegisterValue::Single(2.0), Some(Precision::Single))
            .expect("writable");
        assert_eq!(file.peek(ft0), Some(IntRepr::from_bits(0x4000_0000)));
        assert_eq!(file.read(ft0, Some(Precision::Single)), Ok(RegisterValue::Single(2.0)));
    }

    #[test]
    fn float_values_convert_to_the_target_precision() {
        let mut file = RegisterFile::new(&arch());
        let ft0 = RegisterRef::new(3, 0);
        file.write(F0, RegisterValue::Double(1.5), None).expect("writable");
        assert_eq!(file.peek(F0), Some(f32_to_native(1.5)));

        file.write(ft0, RegisterValue::Single(2.0), None).expect("writable");
        assert_eq!(file.peek(ft0), Some(f64_to_native(2.0)));

        file.write(ft0, RegisterValue::Double(2.5), Some(Precision::Single))
            .expect("writable");
        assert_eq!(file.peek(ft0), Some(f32_to_native(2.5)));
    }

    #[test]
    fn journal_records_changes_and_reset_restores_defaults() {
        let mut file = RegisterFile::new(&arch());
        file.set_journal_enabled(true);
        file.write(F0, RegisterValue::Int(IntRepr::from_bits(5)), None)
            .expect("writable");
        let deltas = file.take_journal();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].register, F0);
        assert_eq!(deltas[1].register, D0);
        assert!(file.take_journal().is_empty());

        file.reset();
        assert_eq!(file.peek(F0), Some(IntRepr::ZERO));
        assert_eq!(file.peek(D0), Some(IntRepr::ZERO));
        assert_eq!(file.peek(RegisterRef::new(0, 2)), Some(IntRepr::from_bits(0x8FF0)));
    }
}
