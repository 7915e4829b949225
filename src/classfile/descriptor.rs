//! JVM field/method descriptor types, rendering and parsing.
//!
//! `DescriptorEntry`/`MethodDescriptor` render descriptors the way the
//! teacher crate already did (`Display` impls building `(...)...` strings,
//! previously named `FunctionDescriptor`). `parse_field_descriptor` is new:
//! it mirrors `cb_descriptor_type` from `codebuilder_types.c`, which advances
//! a `const char **p` one descriptor element at a time; here it advances a
//! `&mut &str` the same way, since the code builder needs to turn a
//! descriptor string back into a verification type for
//! `getfield`/`getstatic`/`checkcast`/array-element operations.

use std::fmt::Display;

use crate::error::CodegenError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorEntry {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Class(String),
    Short,
    Boolean,
    Array(Box<DescriptorEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor(pub DescriptorEntry);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor(pub Vec<DescriptorEntry>, pub Option<DescriptorEntry>);

impl Display for DescriptorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorEntry::Byte => write!(f, "B")?,
            DescriptorEntry::Char => write!(f, "C")?,
            DescriptorEntry::Double => write!(f, "D")?,
            DescriptorEntry::Float => write!(f, "F")?,
            DescriptorEntry::Int => write!(f, "I")?,
            DescriptorEntry::Long => write!(f, "J")?,
            DescriptorEntry::Class(c) => write!(f, "L{c};")?,
            DescriptorEntry::Short => write!(f, "S")?,
            DescriptorEntry::Boolean => write!(f, "Z")?,
            DescriptorEntry::Array(i) => write!(f, "[{i}")?,
        }
        Ok(())
    }
}

impl Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for param in &self.0 {
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        match &self.1 {
            Some(x) => write!(f, "{}", x)?,
            None => write!(f, "V")?,
        }
        Ok(())
    }
}

impl DescriptorEntry {
    /// Every object/array descriptor carries reference semantics on the
    /// stack; primitives never do.
    pub fn is_reference(&self) -> bool {
        matches!(self, DescriptorEntry::Class(_) | DescriptorEntry::Array(_))
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, DescriptorEntry::Long | DescriptorEntry::Double)
    }
}

/// Parses a single descriptor element starting at the front of `input`,
/// advancing `input` past what it consumed. Mirrors `cb_descriptor_type`.
pub fn parse_one(input: &mut &str) -> Result<DescriptorEntry, CodegenError> {
    let mut chars = input.chars();
    let c = chars.next().ok_or_else(|| CodegenError::MalformedDescriptor(input.to_string()))?;
    let entry = match c {
        'B' => { *input = chars.as_str(); DescriptorEntry::Byte }
        'C' => { *input = chars.as_str(); DescriptorEntry::Char }
        'D' => { *input = chars.as_str(); DescriptorEntry::Double }
        'F' => { *input = chars.as_str(); DescriptorEntry::Float }
        'I' => { *input = chars.as_str(); DescriptorEntry::Int }
        'J' => { *input = chars.as_str(); DescriptorEntry::Long }
        'S' => { *input = chars.as_str(); DescriptorEntry::Short }
        'Z' => { *input = chars.as_str(); DescriptorEntry::Boolean }
        'L' => {
            let rest = chars.as_str();
            let end = rest.find(';').ok_or_else(|| CodegenError::MalformedDescriptor(input.to_string()))?;
            let name = rest[..end].to_string();
            *input = &rest[end + 1..];
            DescriptorEntry::Class(name)
        }
        '[' => {
            *input = chars.as_str();
            let element = parse_one(input)?;
            DescriptorEntry::Array(Box::new(element))
        }
        _ => return Err(CodegenError::MalformedDescriptor(input.to_string())),
    };
    Ok(entry)
}

/// Parses a complete field descriptor (exactly one element, nothing left
/// over).
pub fn parse_field_descriptor(s: &str) -> Result<DescriptorEntry, CodegenError> {
    let mut rest = s;
    let entry = parse_one(&mut rest)?;
    if !rest.is_empty() {
        return Err(CodegenError::MalformedDescriptor(s.to_string()));
    }
    Ok(entry)
}

/// Parses a `(params)return` method descriptor string.
pub fn parse_method_descriptor(s: &str) -> Result<MethodDescriptor, CodegenError> {
    let s = s.strip_prefix('(').ok_or_else(|| CodegenError::MalformedDescriptor(s.to_string()))?;
    let (params_str, ret_str) = s.split_once(')').ok_or_else(|| CodegenError::MalformedDescriptor(s.to_string()))?;
    let mut params = Vec::new();
    let mut rest = params_str;
    while !rest.is_empty() {
        params.push(parse_one(&mut rest)?);
    }
    let ret = if ret_str == "V" { None } else { Some(parse_field_descriptor(ret_str)?) };
    Ok(MethodDescriptor(params, ret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_method_descriptor() {
        let d = MethodDescriptor(vec![DescriptorEntry::Int, DescriptorEntry::Class("java/lang/String".into())], Some(DescriptorEntry::Boolean));
        assert_eq!(d.to_string(), "(ILjava/lang/String;)Z");
    }

    #[test]
    fn renders_void_return() {
        let d = MethodDescriptor(vec![], None);
        assert_eq!(d.to_string(), "()V");
    }

    #[test]
    fn parses_array_of_object() {
        let entry = parse_field_descriptor("[Ljava/lang/Object;").unwrap();
        assert_eq!(entry, DescriptorEntry::Array(Box::new(DescriptorEntry::Class("java/lang/Object".into()))));
    }

    #[test]
    fn parses_method_descriptor_roundtrip() {
        let md = parse_method_descriptor("(IJ)Ljava/lang/String;").unwrap();
        assert_eq!(md.0, vec![DescriptorEntry::Int, DescriptorEntry::Long]);
        assert_eq!(md.1, Some(DescriptorEntry::Class("java/lang/String".into())));
        assert_eq!(md.to_string(), "(IJ)Ljava/lang/String;");
    }
}
