use std::collections::BTreeMap;

use crate::{AccessWidth, Capi, Fault, FaultKind, IntRepr, Precision, RegisterRef, RegisterValue};

/// Operand or result of a primitive invoked by name.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CapiValue {
    /// Integer bits.
    Int(IntRepr),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Boolean result.
    Bool(bool),
    /// Name, tag, access type or message.
    Str(String),
    /// Resolved register.
    Register(RegisterRef),
}

impl CapiValue {
    /// Integer operand from raw bits.
    #[must_use]
    pub const fn int(bits: u64) -> Self {
        Self::Int(IntRepr::from_bits(bits))
    }

    /// String operand.
    #[must_use]
    pub fn str(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<RegisterValue> for CapiValue {
    fn from(value: RegisterValue) -> Self {
        match value {
            RegisterValue::Int(repr) => Self::Int(repr),
            RegisterValue::Single(value) => Self::Float(value),
            RegisterValue::Double(value) => Self::Double(value),
        }
    }
}

/// Primitive callable through a [`CapiRegistry`].
pub type CapiFn =
    for<'c, 'a> fn(&'c mut Capi<'a>, &[CapiValue]) -> Result<Option<CapiValue>, Fault>;

/// Table mapping primitive names to functions.
#[derive(Clone, Default)]
pub struct CapiRegistry {
    entries: BTreeMap<String, CapiFn>,
}

impl std::fmt::Debug for CapiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl CapiRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in primitive.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("mem_write", mem_write);
        registry.register("mem_read", mem_read);
        registry.register("find_reg", find_reg);
        registry.register("find_reg_by_tag", find_reg_by_tag);
        registry.register("read_reg", read_reg);
        registry.register("write_reg", write_reg);
        registry.register("check_stack", check_stack);
        registry.register("draw_stack", draw_stack);
        registry.register("float_to_bits", float_to_bits);
        registry.register("bits_to_float", bits_to_float);
        registry.register("double_to_bits", double_to_bits);
        registry.register("bits_to_double", bits_to_double);
        registry.register("check_align", check_align);
        registry.register("raise", raise);
        registry
    }

    /// Adds or replaces a primitive.
    pub fn register(&mut self, name: &str, primitive: CapiFn) {
        self.entries.insert(name.to_owned(), primitive);
    }

    /// Primitive registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapiFn> {
        self.entries.get(name).copied()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn operand_fault(capi: &Capi<'_>, position: usize, expected: &str) -> Fault {
    capi.raise(
        FaultKind::InvalidOperand,
        format!("operand {position} must be {expected}"),
    )
}

fn int_arg(capi: &Capi<'_>, args: &[CapiValue], position: usize) -> Result<IntRepr, Fault> {
    match args.get(position) {
        Some(CapiValue::Int(repr)) => Ok(*repr),
        _ => Err(operand_fault(capi, position, "an integer")),
    }
}

fn str_arg<'v>(capi: &Capi<'_>, args: &'v [CapiValue], position: usize) -> Result<&'v str, Fault> {
    match args.get(position) {
        Some(CapiValue::Str(value)) => Ok(value),
        _ => Err(operand_fault(capi, position, "a string")),
    }
}

fn optional_str(args: &[CapiValue], position: usize) -> Option<&str> {
    match args.get(position) {
        Some(CapiValue::Str(value)) => Some(value),
        _ => None,
    }
}

fn width_arg(capi: &Capi<'_>, args: &[CapiValue], position: usize) -> Result<AccessWidth, Fault> {
    str_arg(capi, args, position)?
        .parse()
        .map_err(|err| capi.raise(FaultKind::InvalidOperand, format!("{err}")))
}

fn register_arg(capi: &Capi<'_>, args: &[CapiValue], position: usize) -> Result<RegisterRef, Fault> {
    match args.get(position) {
        Some(CapiValue::Register(reg)) => Ok(*reg),
        Some(CapiValue::Str(name)) => capi.find_reg(name).ok_or_else(|| {
            capi.raise(
                FaultKind::InvalidRegister,
                format!("register `{name}` not found"),
            )
        }),
        _ => Err(operand_fault(capi, position, "a register")),
    }
}

fn precision_arg(args: &[CapiValue], position: usize) -> Option<Precision> {
    match optional_str(args, position) {
        Some("SFP") => Some(Precision::Single),
        Some("DFP") => Some(Precision::Double),
        _ => None,
    }
}

fn value_arg(capi: &Capi<'_>, args: &[CapiValue], position: usize) -> Result<RegisterValue, Fault> {
    match args.get(position) {
        Some(CapiValue::Int(repr)) => Ok(RegisterValue::Int(*repr)),
        Some(CapiValue::Float(value)) => Ok(RegisterValue::Single(*value)),
        Some(CapiValue::Double(value)) => Ok(RegisterValue::Double(*value)),
        _ => Err(operand_fault(capi, position, "a number")),
    }
}

fn mem_write(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let addr = int_arg(capi, args, 0)?;
    let value = int_arg(capi, args, 1)?;
    let width = width_arg(capi, args, 2)?;
    capi.mem_write(addr.bits(), value, width, optional_str(args, 3))?;
    Ok(None)
}

fn mem_read(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let addr = int_arg(capi, args, 0)?;
    let width = width_arg(capi, args, 1)?;
    let value = capi.mem_read(addr.bits(), width, optional_str(args, 2))?;
    Ok(Some(CapiValue::Int(value)))
}

fn find_reg(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let name = str_arg(capi, args, 0)?;
    Ok(capi.find_reg(name).map(CapiValue::Register))
}

fn find_reg_by_tag(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let tag = str_arg(capi, args, 0)?;
    Ok(capi.find_reg_by_tag(tag).map(CapiValue::Register))
}

fn read_reg(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let reg = register_arg(capi, args, 0)?;
    let value = capi.read_reg(reg, precision_arg(args, 1))?;
    Ok(Some(value.into()))
}

fn write_reg(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let reg = register_arg(capi, args, 0)?;
    let value = value_arg(capi, args, 1)?;
    capi.write_reg(reg, value, precision_arg(args, 2))?;
    Ok(None)
}

fn check_stack(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let addr = int_arg(capi, args, 0)?;
    let width = match args.get(1) {
        Some(_) => width_arg(capi, args, 1)?,
        None => AccessWidth::Byte,
    };
    Ok(Some(CapiValue::Bool(capi.check_stack(addr.bits(), width))))
}

#[allow(clippy::unnecessary_wraps)]
fn draw_stack(capi: &mut Capi<'_>, _args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    Ok(Some(CapiValue::Str(capi.draw_stack())))
}

fn float_to_bits(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    match args.first() {
        Some(CapiValue::Float(value)) => Ok(Some(CapiValue::Int(Capi::float_to_bits(*value)))),
        _ => Err(operand_fault(capi, 0, "a float")),
    }
}

fn bits_to_float(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let bits = int_arg(capi, args, 0)?;
    Ok(Some(CapiValue::Float(Capi::bits_to_float(bits))))
}

fn double_to_bits(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    match args.first() {
        Some(CapiValue::Double(value)) => Ok(Some(CapiValue::Int(Capi::double_to_bits(*value)))),
        _ => Err(operand_fault(capi, 0, "a double")),
    }
}

fn bits_to_double(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let bits = int_arg(capi, args, 0)?;
    Ok(Some(CapiValue::Double(Capi::bits_to_double(bits))))
}

fn check_align(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let addr = int_arg(capi, args, 0)?;
    let width = width_arg(capi, args, 1)?;
    capi.check_align(addr.bits(), width)?;
    Ok(None)
}

fn raise(capi: &mut Capi<'_>, args: &[CapiValue]) -> Result<Option<CapiValue>, Fault> {
    let code = int_arg(capi, args, 0)?;
    let message = str_arg(capi, args, 1)?;
    let kind = u8::try_from(code.bits())
        .ok()
        .and_then(FaultKind::from_u8)
        .ok_or_else(|| operand_fault(capi, 0, "a fault code"))?;
    Err(capi.raise(kind, message))
}

#[cfg(test)]
mod tests {
    use super::{CapiRegistry, CapiValue};
    use crate::{IntRepr, RegisterValue};

    #[test]
    fn standard_registry_exposes_every_primitive() {
        let registry = CapiRegistry::standard();
        let names: Vec<&str> = registry.names().collect();
        for expected in [
            "mem_write",
            "mem_read",
            "find_reg",
            "find_reg_by_tag",
            "read_reg",
            "write_reg",
            "check_stack",
            "draw_stack",
            "float_to_bits",
            "bits_to_float",
            "double_to_bits",
            "bits_to_double",
            "check_align",
            "raise",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(names.len(), 14);
        assert!(registry.get("eval").is_none());
    }

    #[test]
    fn register_values_convert_to_operands() {
        assert_eq!(
            CapiValue::from(RegisterValue::Int(IntRepr::from_bits(7))),
            CapiValue::int(7)
        );
        assert_eq!(
            CapiValue::from(RegisterValue::Single(1.5)),
            CapiValue::Float(1.5)
        );
    }
}
