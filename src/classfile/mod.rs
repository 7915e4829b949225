//! Class-file writer: the top level of the bytecode-emission pipeline.
//!
//! Grounded on the teacher crate's original `ClassFileWriter`/`MethodWriter`,
//! whose shape this module continues directly: a class-level header, an
//! owned constant pool, and a method list, serialised to the binary layout
//! described in `classfile.h`. Everything below the class writer — constant
//! pool, method code buffer, descriptors, verification types, labels,
//! control stack, opcodes, the code builder itself, the StackMapTable
//! encoder, the CFG analyser, `<clinit>` splitting and the synthetic
//! support classes — now lives in its own module, matching the
//! file-per-concern layout of the C sources they are grounded on.

pub mod cfg;
pub mod clinit;
pub mod code_builder;
pub mod constant_pool;
pub mod control;
pub mod descriptor;
pub mod label;
pub mod method_code;
pub mod opcode;
pub mod stackmap;
pub mod synthetic;
pub mod verification;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::CodegenError;

use code_builder::BuiltMethod;
use constant_pool::ConstantPool;

const MAGIC: u32 = 0xCAFEBABE;
const MINOR_VERSION: u16 = 0;
const MAJOR_VERSION: u16 = 61; // Java 17

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_PRIVATE: u16 = 0x0002;

pub struct FieldSpec {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

struct MethodRecord {
    name: String,
    descriptor: String,
    access_flags: u16,
    built: BuiltMethod,
}

/// Owns a class's constant pool, field list and method list, and serialises
/// the whole thing to the JVM class-file binary format.
pub struct ClassFileWriter {
    class_name: String,
    super_name: String,
    interfaces: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodRecord>,
    constant_pool: ConstantPool,
    source_file: Option<String>,
    access_flags: u16,
}

impl ClassFileWriter {
    pub fn new(class_name: String, super_name: String) -> Self {
        ClassFileWriter {
            class_name,
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constant_pool: ConstantPool::default(),
            source_file: None,
            access_flags: ACC_PUBLIC | ACC_SUPER,
        }
    }

    pub fn constant_pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.constant_pool
    }

    pub fn add_field(&mut self, field: FieldSpec) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn add_interface(&mut self, name: String) {
        self.interfaces.push(name);
    }

    pub fn set_source_file(&mut self, name: String) {
        self.source_file = Some(name);
    }

    pub fn set_access_flags(&mut self, flags: u16) {
        self.access_flags = flags;
    }

    pub fn add_method(&mut self, name: String, descriptor: String, access_flags: u16, built: BuiltMethod) {
        self.methods.push(MethodRecord { name, descriptor, access_flags, built });
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Serialises the complete class file to `out`: magic/version, constant
    /// pool, access flags, this/super/interfaces, fields, methods (each
    /// carrying a Code attribute with nested StackMapTable/LineNumberTable),
    /// then an optional class-level SourceFile attribute.
    pub fn serialize(mut self, out: &mut impl std::io::Write) -> Result<(), CodegenError> {
        let this_class = self.constant_pool.class(self.class_name.clone());
        let super_class = self.constant_pool.class(self.super_name.clone());
        let interface_refs: Vec<u16> = self.interfaces.iter().map(|i| self.constant_pool.class(i.clone())).collect();

        let code_attr_name = self.constant_pool.utf8("Code".to_string());
        let stackmap_attr_name = self.constant_pool.utf8("StackMapTable".to_string());
        let line_number_attr_name = self.constant_pool.utf8("LineNumberTable".to_string());
        let source_file_attr_name = self.constant_pool.utf8("SourceFile".to_string());
        let source_file_ref = self.source_file.clone().map(|s| self.constant_pool.utf8(s));

        let mut field_infos = Vec::new();
        for field in &self.fields {
            let name_index = self.constant_pool.utf8(field.name.clone());
            let descriptor_index = self.constant_pool.utf8(field.descriptor.clone());
            field_infos.push((field.access_flags, name_index, descriptor_index));
        }

        let mut method_blobs = Vec::new();
        for method in &self.methods {
            let name_index = self.constant_pool.utf8(method.name.clone());
            let descriptor_index = self.constant_pool.utf8(method.descriptor.clone());

            let stackmap_body = if !method.built.branch_targets.is_empty() {
                let buf = stackmap::encode(&method.built.initial_frame, method.built.branch_targets.clone(), method.built.code.size(), &mut self.constant_pool);
                Some(buf.into_bytes())
            } else {
                None
            };
            let line_number_body = if !method.built.code.line_numbers().is_empty() {
                let mut buf = Vec::new();
                buf.write_u16::<BigEndian>(method.built.code.line_numbers().len() as u16)?;
                for entry in method.built.code.line_numbers() {
                    buf.write_u16::<BigEndian>(entry.start_pc)?;
                    buf.write_u16::<BigEndian>(entry.line_number)?;
                }
                Some(buf)
            } else {
                None
            };

            let mut code_body = Vec::new();
            code_body.write_u16::<BigEndian>(method.built.max_stack as u16)?;
            code_body.write_u16::<BigEndian>(method.built.max_locals as u16)?;
            code_body.write_u32::<BigEndian>(method.built.code.size() as u32)?;
            code_body.write_all(method.built.code.bytes())?;
            code_body.write_u16::<BigEndian>(0)?; // exception_table_length: no try/catch in this front end

            let nested_count = stackmap_body.is_some() as u16 + line_number_body.is_some() as u16;
            code_body.write_u16::<BigEndian>(nested_count)?;
            if let Some(body) = &stackmap_body {
                code_body.write_u16::<BigEndian>(stackmap_attr_name)?;
                code_body.write_u32::<BigEndian>(body.len() as u32)?;
                code_body.write_all(body)?;
            }
            if let Some(body) = &line_number_body {
                code_body.write_u16::<BigEndian>(line_number_attr_name)?;
                code_body.write_u32::<BigEndian>(body.len() as u32)?;
                code_body.write_all(body)?;
            }

            method_blobs.push((method.access_flags, name_index, descriptor_index, code_body));
        }

        out.write_u32::<BigEndian>(MAGIC)?;
        out.write_u16::<BigEndian>(MINOR_VERSION)?;
        out.write_u16::<BigEndian>(MAJOR_VERSION)?;
        self.constant_pool.serialize(out)?;
        out.write_u16::<BigEndian>(self.access_flags)?;
        out.write_u16::<BigEndian>(this_class)?;
        out.write_u16::<BigEndian>(super_class)?;
        out.write_u16::<BigEndian>(interface_refs.len() as u16)?;
        for r in &interface_refs {
            out.write_u16::<BigEndian>(*r)?;
        }
        out.write_u16::<BigEndian>(field_infos.len() as u16)?;
        for (access_flags, name_index, descriptor_index) in &field_infos {
            out.write_u16::<BigEndian>(*access_flags)?;
            out.write_u16::<BigEndian>(*name_index)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
            out.write_u16::<BigEndian>(0)?; // no field attributes emitted
        }
        out.write_u16::<BigEndian>(method_blobs.len() as u16)?;
        for (access_flags, name_index, descriptor_index, code_body) in &method_blobs {
            out.write_u16::<BigEndian>(*access_flags)?;
            out.write_u16::<BigEndian>(*name_index)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
            out.write_u16::<BigEndian>(1)?; // exactly one attribute: Code
            out.write_u16::<BigEndian>(code_attr_name)?;
            out.write_u32::<BigEndian>(code_body.len() as u32)?;
            out.write_all(code_body)?;
        }

        match source_file_ref {
            Some(idx) => {
                out.write_u16::<BigEndian>(1)?;
                out.write_u16::<BigEndian>(source_file_attr_name)?;
                out.write_u32::<BigEndian>(2)?;
                out.write_u16::<BigEndian>(idx)?;
            }
            None => out.write_u16::<BigEndian>(0)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::code_builder::CodeBuilder;
    use super::descriptor::MethodDescriptor;
    use super::*;

    #[test]
    fn empty_class_serializes_with_correct_magic_and_version() {
        let mut writer = ClassFileWriter::new("Empty".to_string(), "java/lang/Object".to_string());
        let mut builder = CodeBuilder::new(writer.constant_pool_mut(), "m".to_string(), true, false, "Empty", &MethodDescriptor(vec![], None));
        builder.emit_return(None);
        let built = builder.finish().unwrap();
        writer.add_method("m".to_string(), "()V".to_string(), ACC_PUBLIC | ACC_STATIC, built);

        let mut out = Vec::new();
        writer.serialize(&mut out).unwrap();
        assert_eq!(&out[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(&out[4..6], &[0x00, 0x00]);
        assert_eq!(&out[6..8], &[0x00, 61]);
    }

    #[test]
    fn fields_are_written_with_empty_attribute_lists() {
        let mut writer = ClassFileWriter::new("Point".to_string(), "java/lang/Object".to_string());
        writer.add_field(FieldSpec { name: "x".to_string(), descriptor: "I".to_string(), access_flags: ACC_PUBLIC });
        let mut builder = CodeBuilder::new(writer.constant_pool_mut(), "<init>".to_string(), false, true, "Point", &MethodDescriptor(vec![], None));
        builder.emit_load(code_builder::JavaType::Reference("LPoint;".to_string()), 0);
        builder.emit_invokespecial("java/lang/Object", "<init>", &MethodDescriptor(vec![], None));
        builder.emit_return(None);
        let built = builder.finish().unwrap();
        writer.add_method("<init>".to_string(), "()V".to_string(), ACC_PUBLIC, built);

        let mut out = Vec::new();
        writer.serialize(&mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn synthetic_pointer_class_serializes_cleanly() {
        let writer = synthetic::build_pointer_class("IntPtr", "I").unwrap();
        let mut out = Vec::new();
        writer.serialize(&mut out).unwrap();
        assert_eq!(&out[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    }
}
