//! Immutable architecture description consumed by a simulation session.
//!
//! The description is produced by an external loader. The core only performs
//! the structural checks in [`Architecture::validate`] that its own
//! invariants depend on.

/// Register capability flags.
pub mod properties;

use thiserror::Error;

pub use properties::{RegisterProperties, RegisterProperty, UnknownProperty};

use crate::{AlignmentPolicy, Endianness, IntRepr, MemoryLayout};

/// Register component type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ComponentKind {
    /// General-purpose integer registers.
    IntRegisters,
    /// Control registers (program counter, status words).
    CtrlRegisters,
    /// Floating-point registers.
    FpRegisters,
}

/// How a double-precision floating-point component stores its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DoublePrecisionMode {
    /// Each double is backed by two single-precision registers.
    Linked,
    /// Each register stores either a single or a double directly.
    #[default]
    Separate,
}

/// One register within a component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterElement {
    /// Register names; the first is canonical, the rest are aliases.
    pub names: Vec<String>,
    /// Declared width in bits.
    pub nbits: u32,
    /// Value loaded on session creation and reset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub default_value: IntRepr,
    /// Capability flags.
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: RegisterProperties,
    /// For linked doubles: names of the `(lo, hi)` single registers.
    #[cfg_attr(feature = "serde", serde(default))]
    pub linked: Option<[String; 2]>,
}

impl RegisterElement {
    /// Creates an element with the given aliases, width and capabilities.
    #[must_use]
    pub fn new(names: &[&str], nbits: u32, properties: RegisterProperties) -> Self {
        Self {
            names: names.iter().map(|name| (*name).to_owned()).collect(),
            nbits,
            default_value: IntRepr::ZERO,
            properties,
            linked: None,
        }
    }

    /// Sets the reset value.
    #[must_use]
    pub fn with_value(mut self, value: IntRepr) -> Self {
        self.default_value = value;
        self
    }

    /// Backs this double register by the single registers `lo` and `hi`.
    #[must_use]
    pub fn linked_to(mut self, lo: &str, hi: &str) -> Self {
        self.linked = Some([lo.to_owned(), hi.to_owned()]);
        self
    }

    /// Returns `true` when `name` is one of this register's names.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|alias| alias == name)
    }

    /// Names joined for diagnostics (`x2 | sp`).
    #[must_use]
    pub fn display_name(&self) -> String {
        self.names.join(" | ")
    }

    /// Returns `true` when the element carries `property`.
    #[must_use]
    pub const fn has(&self, property: RegisterProperty) -> bool {
        self.properties.contains(property)
    }
}

/// Named group of registers sharing a type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Component {
    /// Component name.
    pub name: String,
    /// Register type tag.
    pub kind: ComponentKind,
    /// Floating-point components: stores doubles.
    #[cfg_attr(feature = "serde", serde(default))]
    pub double_precision: bool,
    /// Floating-point doubles: linked pairs or separate storage.
    #[cfg_attr(feature = "serde", serde(default))]
    pub double_precision_mode: DoublePrecisionMode,
    /// Registers in declaration order.
    pub elements: Vec<RegisterElement>,
}

impl Component {
    /// Creates an empty component.
    #[must_use]
    pub fn new(name: &str, kind: ComponentKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            double_precision: false,
            double_precision_mode: DoublePrecisionMode::default(),
            elements: Vec::new(),
        }
    }

    /// Marks the component as double precision with the given mode.
    #[must_use]
    pub fn double(mut self, mode: DoublePrecisionMode) -> Self {
        self.double_precision = true;
        self.double_precision_mode = mode;
        self
    }

    /// Appends a register.
    #[must_use]
    pub fn with_element(mut self, element: RegisterElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Returns `true` for double-precision components in linked mode.
    #[must_use]
    pub const fn is_linked_double(&self) -> bool {
        matches!(self.kind, ComponentKind::FpRegisters)
            && self.double_precision
            && matches!(self.double_precision_mode, DoublePrecisionMode::Linked)
    }
}

/// Structural defects detected by [`Architecture::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchitectureError {
    /// A register has no names.
    #[error("register {element} of component `{component}` has no name")]
    UnnamedRegister {
        /// Component name.
        component: String,
        /// Element index.
        element: usize,
    },
    /// A register width is zero or wider than 64 bits.
    #[error("register `{name}` has unsupported width {nbits}")]
    UnsupportedWidth {
        /// Register name.
        name: String,
        /// Declared width.
        nbits: u32,
    },
    /// A linked double names a register that is not a single-precision
    /// floating-point register.
    #[error("linked register `{double}` refers to invalid single `{single}`")]
    InvalidLink {
        /// Double register name.
        double: String,
        /// Unresolved single name.
        single: String,
    },
    /// A linked-mode double register has no link.
    #[error("linked double register `{0}` has no single-precision pair")]
    MissingLink(String),
    /// Segments are inverted or overlap.
    #[error("memory layout segments overlap or are inverted")]
    MalformedLayout,
    /// Word size is zero or wider than 64 bits.
    #[error("unsupported word size {0}")]
    UnsupportedWordSize(u32),
}

/// Complete architecture description for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Architecture {
    /// Architecture name.
    pub name: String,
    /// Machine word size in bits.
    pub word_size_bits: u32,
    /// Byte order of memory accesses.
    #[cfg_attr(feature = "serde", serde(default))]
    pub endianness: Endianness,
    /// Data alignment rule.
    #[cfg_attr(feature = "serde", serde(default))]
    pub alignment: AlignmentPolicy,
    /// Segment boundaries.
    pub memory_layout: MemoryLayout,
    /// Stack-pointer reset value; writing it is not a stack-limit update.
    pub default_stack_pointer: u64,
    /// Register components in declaration order.
    pub components: Vec<Component>,
}

impl Architecture {
    /// Creates an architecture without register components.
    #[must_use]
    pub fn new(name: &str, word_size_bits: u32, memory_layout: MemoryLayout) -> Self {
        Self {
            name: name.to_owned(),
            word_size_bits,
            endianness: Endianness::default(),
            alignment: AlignmentPolicy::default(),
            memory_layout,
            default_stack_pointer: memory_layout.stack.end,
            components: Vec::new(),
        }
    }

    /// Appends a register component.
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Sets the memory byte order.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Sets the alignment rule.
    #[must_use]
    pub fn with_alignment(mut self, alignment: AlignmentPolicy) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the stack-pointer reset value.
    #[must_use]
    pub fn with_default_stack_pointer(mut self, value: u64) -> Self {
        self.default_stack_pointer = value;
        self
    }

    /// Checks the structural invariants the core depends on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ArchitectureError`] found.
    pub fn validate(&self) -> Result<(), ArchitectureError> {
        if self.word_size_bits == 0 || self.word_size_bits > 64 {
            return Err(ArchitectureError::UnsupportedWordSize(self.word_size_bits));
        }
        if !self.memory_layout.is_well_formed() {
            return Err(ArchitectureError::MalformedLayout);
        }

        for component in &self.components {
            for (index, element) in component.elements.iter().enumerate() {
                let Some(name) = element.names.first() else {
                    return Err(ArchitectureError::UnnamedRegister {
                        component: component.name.clone(),
                        element: index,
                    });
                };
                if element.nbits == 0 || element.nbits > 64 {
                    return Err(ArchitectureError::UnsupportedWidth {
                        name: name.clone(),
                        nbits: element.nbits,
                    });
                }
                if component.is_linked_double() {
                    let link = element
                        .linked
                        .as_ref()
                        .ok_or_else(|| ArchitectureError::MissingLink(name.clone()))?;
                    for single in link {
                        if !self.is_single_precision_register(single) {
                            return Err(ArchitectureError::InvalidLink {
                                double: name.clone(),
                                single: single.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn is_single_precision_register(&self, name: &str) -> bool {
        self.components
            .iter()
            .filter(|component| {
                component.kind == ComponentKind::FpRegisters && !component.double_precision
            })
            .flat_map(|component| component.elements.iter())
            .any(|element| element.has_name(name))
    }
}
