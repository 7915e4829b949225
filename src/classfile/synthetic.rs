//! Synthetic support classes materialised at the end of compilation: one
//! "pointer" class per used primitive/object pointer flavour, and one
//! "struct" class per struct type referenced by the compiled sources.
//!
//! Grounded on §6.1's "Synthetic 'pointer struct' classes are materialised
//! at the end of compilation" paragraph. The C dialect has no object model
//! of its own, so pointers and structs need a JVM-object encoding; these
//! helper classes are that encoding. No teacher counterpart exists (the
//! LLVM backend lowered pointers to native integers); built fresh, reusing
//! `CodeBuilder`/`ClassFileWriter` the same way an ordinary compiled method
//! would.

use crate::error::CodegenError;

use super::code_builder::{CodeBuilder, JavaType};
use super::descriptor::MethodDescriptor;
use super::{ClassFileWriter, FieldSpec};

/// One field of a struct being materialised: its name and element
/// descriptor. Array-typed members carry a fixed length, dimensioned at
/// construction time in the synthetic `<init>`.
#[derive(Clone)]
pub struct StructMember {
    pub name: String,
    pub descriptor: String,
    pub array_length: Option<u32>,
    pub is_nested_struct: bool,
}

/// Builds the pointer-flavour support class `<ElementDescSanitized>Ptr`:
/// fields `base: [ElementDesc` and `offset: I`, plus a default `<init>`
/// chaining `Object.<init>`.
pub fn build_pointer_class(class_name: &str, element_descriptor: &str) -> Result<ClassFileWriter, CodegenError> {
    let mut writer = ClassFileWriter::new(class_name.to_string(), "java/lang/Object".to_string());
    let array_desc = format!("[{element_descriptor}");
    writer.add_field(FieldSpec { name: "base".to_string(), descriptor: array_desc, access_flags: 0x0001 });
    writer.add_field(FieldSpec { name: "offset".to_string(), descriptor: "I".to_string(), access_flags: 0x0001 });

    let mut init = CodeBuilder::new(writer.constant_pool_mut(), "<init>".to_string(), false, true, class_name, &MethodDescriptor(vec![], None));
    init.emit_load(JavaType::Reference(format!("L{class_name};")), 0);
    init.emit_invokespecial("java/lang/Object", "<init>", &MethodDescriptor(vec![], None));
    init.emit_return(None);
    let built = init.finish()?;
    writer.add_method("<init>".to_string(), "()V".to_string(), 0x0001, built);
    Ok(writer)
}

/// Builds a struct support class with one field per member and a default
/// `<init>` that allocates nested struct instances and fixed-size arrays.
pub fn build_struct_class(class_name: &str, members: &[StructMember]) -> Result<ClassFileWriter, CodegenError> {
    let mut writer = ClassFileWriter::new(class_name.to_string(), "java/lang/Object".to_string());
    for m in members {
        let field_desc = if m.array_length.is_some() { format!("[{}", m.descriptor) } else { m.descriptor.clone() };
        writer.add_field(FieldSpec { name: m.name.clone(), descriptor: field_desc, access_flags: 0x0001 });
    }

    let mut init = CodeBuilder::new(writer.constant_pool_mut(), "<init>".to_string(), false, true, class_name, &MethodDescriptor(vec![], None));
    let self_ty = JavaType::Reference(format!("L{class_name};"));
    init.emit_load(self_ty.clone(), 0);
    init.emit_invokespecial("java/lang/Object", "<init>", &MethodDescriptor(vec![], None));

    for m in members {
        init.emit_load(self_ty.clone(), 0);
        if let Some(len) = m.array_length {
            init.emit_constant_int(len as i32);
            emit_newarray_for_descriptor(&mut init, &m.descriptor);
            init.emit_putfield(class_name, &m.name, &format!("[{}", m.descriptor)).expect("synthetic field descriptor is always well-formed");
        } else if m.is_nested_struct {
            init.emit_new(&m.descriptor);
            init.emit_dup();
            init.emit_invokespecial(&m.descriptor, "<init>", &MethodDescriptor(vec![], None));
            init.emit_putfield(class_name, &m.name, &format!("L{};", m.descriptor)).expect("synthetic field descriptor is always well-formed");
        } else {
            default_value_for(&mut init, &m.descriptor);
            init.emit_putfield(class_name, &m.name, &m.descriptor).expect("synthetic field descriptor is always well-formed");
        }
    }
    init.emit_return(None);
    let built = init.finish()?;
    writer.add_method("<init>".to_string(), "()V".to_string(), 0x0001, built);
    Ok(writer)
}

fn emit_newarray_for_descriptor(builder: &mut CodeBuilder, element_descriptor: &str) {
    use super::opcode::PrimitiveArrayType;
    match element_descriptor {
        "I" => builder.emit_newarray_primitive(PrimitiveArrayType::Int),
        "J" => builder.emit_newarray_primitive(PrimitiveArrayType::Long),
        "F" => builder.emit_newarray_primitive(PrimitiveArrayType::Float),
        "D" => builder.emit_newarray_primitive(PrimitiveArrayType::Double),
        "B" => builder.emit_newarray_primitive(PrimitiveArrayType::Byte),
        "C" => builder.emit_newarray_primitive(PrimitiveArrayType::Char),
        "S" => builder.emit_newarray_primitive(PrimitiveArrayType::Short),
        "Z" => builder.emit_newarray_primitive(PrimitiveArrayType::Boolean),
        other => builder.emit_anewarray(other.trim_start_matches('L').trim_end_matches(';')),
    }
}

fn default_value_for(builder: &mut CodeBuilder, descriptor: &str) {
    match descriptor {
        "I" | "B" | "C" | "S" | "Z" => builder.emit_constant_int(0),
        "J" => builder.emit_constant_long(0),
        "F" => builder.emit_constant_float(0.0),
        "D" => builder.emit_constant_double(0.0),
        _ => builder.emit_constant_null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_class_has_base_and_offset_fields() {
        let writer = build_pointer_class("IntPtr", "I").unwrap();
        assert!(writer.fields().iter().any(|f| f.name == "base" && f.descriptor == "[I"));
        assert!(writer.fields().iter().any(|f| f.name == "offset" && f.descriptor == "I"));
    }

    #[test]
    fn struct_class_allocates_array_member() {
        let members = vec![StructMember { name: "buf".to_string(), descriptor: "I".to_string(), array_length: Some(4), is_nested_struct: false }];
        let writer = build_struct_class("Buffer", &members).unwrap();
        assert!(writer.fields().iter().any(|f| f.name == "buf" && f.descriptor == "[I"));
    }

    #[test]
    fn struct_class_chains_nested_struct_init() {
        let members = vec![StructMember { name: "inner".to_string(), descriptor: "Point".to_string(), array_length: None, is_nested_struct: true }];
        let writer = build_struct_class("Line", &members).unwrap();
        assert!(writer.fields().iter().any(|f| f.name == "inner" && f.descriptor == "LPoint;"));
    }
}
