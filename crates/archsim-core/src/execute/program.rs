use std::collections::BTreeMap;
use std::fmt;

use crate::{Capi, Fault};

/// Control-flow result of one instruction's semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Continue with the next instruction.
    Continue,
    /// Stop the program.
    Halt,
}

/// Call-stack role the decoder assigned to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InstructionRole {
    /// Ordinary instruction.
    #[default]
    Plain,
    /// Opens a call frame after executing.
    Call,
    /// Closes the innermost call frame after executing.
    Return,
}

/// Externally supplied instruction behaviour.
pub trait InstructionSemantics {
    /// Executes the instruction against the primitive context.
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped the instruction.
    fn execute(&self, capi: &mut Capi<'_>) -> Result<Flow, Fault>;
}

struct FnSemantics<F>(F);

impl<F> InstructionSemantics for FnSemantics<F>
where
    F: Fn(&mut Capi<'_>) -> Result<Flow, Fault>,
{
    fn execute(&self, capi: &mut Capi<'_>) -> Result<Flow, Fault> {
        (self.0)(capi)
    }
}

/// One decoded instruction.
pub struct Instruction {
    /// Address of the first byte.
    pub address: u64,
    /// Encoded size in bytes; the program counter advances by this much.
    pub size: u64,
    /// Call-stack role.
    pub role: InstructionRole,
    /// Mnemonic or source text, for diagnostics.
    pub text: String,
    semantics: Box<dyn InstructionSemantics>,
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("address", &self.address)
            .field("size", &self.size)
            .field("role", &self.role)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

impl Instruction {
    /// Creates a plain instruction from a semantics object.
    #[must_use]
    pub fn new(address: u64, size: u64, semantics: Box<dyn InstructionSemantics>) -> Self {
        Self {
            address,
            size,
            role: InstructionRole::Plain,
            text: String::new(),
            semantics,
        }
    }

    /// Creates a plain instruction from a closure.
    #[must_use]
    pub fn from_fn<F>(address: u64, size: u64, semantics: F) -> Self
    where
        F: Fn(&mut Capi<'_>) -> Result<Flow, Fault> + 'static,
    {
        Self::new(address, size, Box::new(FnSemantics(semantics)))
    }

    /// Sets the call-stack role.
    #[must_use]
    pub fn with_role(mut self, role: InstructionRole) -> Self {
        self.role = role;
        self
    }

    /// Sets the diagnostic text.
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_owned();
        self
    }

    /// Runs the semantics.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by the semantics.
    pub fn execute(&self, capi: &mut Capi<'_>) -> Result<Flow, Fault> {
        self.semantics.execute(capi)
    }
}

/// Ordered instruction sequence indexed by address.
#[derive(Debug, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    by_address: BTreeMap<u64, usize>,
}

impl Program {
    /// Builds a program; a later instruction at a duplicate address wins.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let by_address = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.address, index))
            .collect();
        Self {
            instructions,
            by_address,
        }
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` when the program has no instruction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the instruction starting at `address`.
    #[must_use]
    pub fn index_of(&self, address: u64) -> Option<usize> {
        self.by_address.get(&address).copied()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Iterates instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }
}
