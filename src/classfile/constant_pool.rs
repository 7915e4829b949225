//! The JVM constant pool: a deduplicating, MUTF-8-encoding, index-addressable
//! collection of the 14 standard entry tags.
//!
//! Grounded on `constant_pool.c`/`constant_pool.h` (the codegen-side builder
//! wrapping the raw pool) and `classfile.c`/`classfile.h` (the MUTF-8 byte
//! algorithm and the raw tag values) from the original backend. The teacher
//! crate's starting point was a single-entry `IndexSet<ConstantPoolEntry::String>`;
//! this expands it to the full tag set while keeping the teacher's
//! `indexmap`-backed dedup approach.

use byteorder::WriteBytesExt;
use indexmap::IndexSet;

pub type ConstantPoolReference = u16;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ConstantPoolEntry {
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32), // bit pattern, so NaN/zero variants hash/compare exactly
    Long(i64),
    Double(u64),
    Class { name_index: ConstantPoolReference },
    String { utf8_index: ConstantPoolReference },
    Fieldref { class_index: ConstantPoolReference, name_and_type_index: ConstantPoolReference },
    Methodref { class_index: ConstantPoolReference, name_and_type_index: ConstantPoolReference },
    InterfaceMethodref { class_index: ConstantPoolReference, name_and_type_index: ConstantPoolReference },
    NameAndType { name_index: ConstantPoolReference, descriptor_index: ConstantPoolReference },
    MethodHandle { reference_kind: u8, reference_index: ConstantPoolReference },
    MethodType { descriptor_index: ConstantPoolReference },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: ConstantPoolReference },
    /// Inert placeholder occupying the second slot after a Long/Double entry.
    /// Never looked up by index; skipped entirely during serialization so
    /// indices line up with the JVM's two-slot accounting for wide constants.
    Placeholder(u32),
}

/// Ordered, deduplicating, 1-based constant pool. Index 0 is unused, matching
/// `cf_cp_create`'s `count = 1` starting point in the original.
#[derive(Default)]
pub struct ConstantPool {
    entries: IndexSet<ConstantPoolEntry>,
    placeholder_seq: u32,
}

impl ConstantPool {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// One plus the index of the last entry, per the class-file format.
    pub fn count(&self) -> u16 {
        (self.entries.len() + 1) as u16
    }

    fn insert(&mut self, entry: ConstantPoolEntry) -> ConstantPoolReference {
        let (idx, _) = self.entries.insert_full(entry);
        (idx + 1) as ConstantPoolReference
    }

    /// Like [`insert`](Self::insert), but also reports whether `entry` was
    /// newly added rather than deduplicated against an existing one.
    fn insert_new(&mut self, entry: ConstantPoolEntry) -> (ConstantPoolReference, bool) {
        let (idx, inserted) = self.entries.insert_full(entry);
        ((idx + 1) as ConstantPoolReference, inserted)
    }

    pub fn utf8(&mut self, s: String) -> ConstantPoolReference {
        self.insert(ConstantPoolEntry::Utf8(encode_mutf8(&s)))
    }

    pub fn int(&mut self, v: i32) -> ConstantPoolReference {
        self.insert(ConstantPoolEntry::Integer(v))
    }

    pub fn float(&mut self, v: f32) -> ConstantPoolReference {
        self.insert(ConstantPoolEntry::Float(v.to_bits()))
    }

    /// Long and Double each reserve the following index as an inert
    /// placeholder, per the JVM spec's "the next usable item is `i+2`" rule.
    /// Each placeholder is tagged with a unique sequence number so that two
    /// distinct Long/Double constants never accidentally dedup their
    /// placeholder slots against each other. The placeholder is only
    /// reserved when the Long/Double itself was newly inserted — re-adding
    /// the same wide constant dedups against the existing entry and must
    /// not append a second, orphaned placeholder.
    pub fn long(&mut self, v: i64) -> ConstantPoolReference {
        let (idx, inserted) = self.insert_new(ConstantPoolEntry::Long(v));
        if inserted {
            self.placeholder_seq += 1;
            self.insert(ConstantPoolEntry::Placeholder(self.placeholder_seq));
        }
        idx
    }

    pub fn double(&mut self, v: f64) -> ConstantPoolReference {
        let (idx, inserted) = self.insert_new(ConstantPoolEntry::Double(v.to_bits()));
        if inserted {
            self.placeholder_seq += 1;
            self.insert(ConstantPoolEntry::Placeholder(self.placeholder_seq));
        }
        idx
    }

    pub fn class(&mut self, name: String) -> ConstantPoolReference {
        let name_index = self.utf8(name);
        self.insert(ConstantPoolEntry::Class { name_index })
    }

    pub fn string(&mut self, s: String) -> ConstantPoolReference {
        let utf8_index = self.utf8(s);
        self.insert(ConstantPoolEntry::String { utf8_index })
    }

    pub fn name_and_type(&mut self, name: String, descriptor: String) -> ConstantPoolReference {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.insert(ConstantPoolEntry::NameAndType { name_index, descriptor_index })
    }

    pub fn fieldref(&mut self, class: String, name: String, descriptor: String) -> ConstantPoolReference {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(ConstantPoolEntry::Fieldref { class_index, name_and_type_index })
    }

    pub fn methodref(&mut self, class: String, name: String, descriptor: String) -> ConstantPoolReference {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(ConstantPoolEntry::Methodref { class_index, name_and_type_index })
    }

    pub fn interfacemethodref(&mut self, class: String, name: String, descriptor: String) -> ConstantPoolReference {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(ConstantPoolEntry::InterfaceMethodref { class_index, name_and_type_index })
    }

    pub fn method_handle(&mut self, reference_kind: u8, reference_index: ConstantPoolReference) -> ConstantPoolReference {
        self.insert(ConstantPoolEntry::MethodHandle { reference_kind, reference_index })
    }

    pub fn method_type(&mut self, descriptor: String) -> ConstantPoolReference {
        let descriptor_index = self.utf8(descriptor);
        self.insert(ConstantPoolEntry::MethodType { descriptor_index })
    }

    pub fn invoke_dynamic(&mut self, bootstrap_method_attr_index: u16, name: String, descriptor: String) -> ConstantPoolReference {
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(ConstantPoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index })
    }

    pub fn serialize(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        out.write_u16::<byteorder::BigEndian>(self.count())?;
        for entry in &self.entries {
            if matches!(entry, ConstantPoolEntry::Placeholder(_)) {
                continue;
            }
            write_entry(entry, out)?;
        }
        Ok(())
    }
}

fn write_entry(entry: &ConstantPoolEntry, out: &mut impl std::io::Write) -> std::io::Result<()> {
    use byteorder::BigEndian;
    match entry {
        ConstantPoolEntry::Utf8(bytes) => {
            out.write_u8(1)?;
            out.write_u16::<BigEndian>(bytes.len() as u16)?;
            out.write_all(bytes)?;
        }
        ConstantPoolEntry::Integer(v) => {
            out.write_u8(3)?;
            out.write_i32::<BigEndian>(*v)?;
        }
        ConstantPoolEntry::Float(bits) => {
            out.write_u8(4)?;
            out.write_u32::<BigEndian>(*bits)?;
        }
        ConstantPoolEntry::Long(v) => {
            out.write_u8(5)?;
            out.write_i64::<BigEndian>(*v)?;
        }
        ConstantPoolEntry::Double(bits) => {
            out.write_u8(6)?;
            out.write_u64::<BigEndian>(*bits)?;
        }
        ConstantPoolEntry::Class { name_index } => {
            out.write_u8(7)?;
            out.write_u16::<BigEndian>(*name_index)?;
        }
        ConstantPoolEntry::String { utf8_index } => {
            out.write_u8(8)?;
            out.write_u16::<BigEndian>(*utf8_index)?;
        }
        ConstantPoolEntry::Fieldref { class_index, name_and_type_index } => {
            out.write_u8(9)?;
            out.write_u16::<BigEndian>(*class_index)?;
            out.write_u16::<BigEndian>(*name_and_type_index)?;
        }
        ConstantPoolEntry::Methodref { class_index, name_and_type_index } => {
            out.write_u8(10)?;
            out.write_u16::<BigEndian>(*class_index)?;
            out.write_u16::<BigEndian>(*name_and_type_index)?;
        }
        ConstantPoolEntry::InterfaceMethodref { class_index, name_and_type_index } => {
            out.write_u8(11)?;
            out.write_u16::<BigEndian>(*class_index)?;
            out.write_u16::<BigEndian>(*name_and_type_index)?;
        }
        ConstantPoolEntry::NameAndType { name_index, descriptor_index } => {
            out.write_u8(12)?;
            out.write_u16::<BigEndian>(*name_index)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
        }
        ConstantPoolEntry::MethodHandle { reference_kind, reference_index } => {
            out.write_u8(15)?;
            out.write_u8(*reference_kind)?;
            out.write_u16::<BigEndian>(*reference_index)?;
        }
        ConstantPoolEntry::MethodType { descriptor_index } => {
            out.write_u8(16)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
        }
        ConstantPoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
            out.write_u8(18)?;
            out.write_u16::<BigEndian>(*bootstrap_method_attr_index)?;
            out.write_u16::<BigEndian>(*name_and_type_index)?;
        }
        ConstantPoolEntry::Placeholder(_) => unreachable!("placeholders are filtered out before write_entry is called"),
    }
    Ok(())
}

/// Encodes a Rust `&str` (guaranteed well-formed UTF-8) as Modified UTF-8:
/// NUL becomes the two-byte sequence `C0 80`, and four-byte UTF-8 sequences
/// (supplementary-plane code points) are re-encoded as a CESU-8 surrogate
/// pair of two three-byte sequences. Grounded on `encode_mutf8` in
/// `classfile.c`.
pub fn encode_mutf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == 0 {
            out.push(0xC0);
            out.push(0x80);
            i += 1;
        } else if b & 0x80 == 0 {
            out.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            out.extend_from_slice(&bytes[i..i + 2]);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            out.extend_from_slice(&bytes[i..i + 3]);
            i += 3;
        } else if b & 0xF8 == 0xF0 {
            // Decode the 4-byte UTF-8 sequence to its scalar value, then
            // re-encode as a UTF-16 surrogate pair, each half emitted as its
            // own 3-byte CESU-8 sequence.
            let cp = ((b as u32 & 0x07) << 18)
                | ((bytes[i + 1] as u32 & 0x3F) << 12)
                | ((bytes[i + 2] as u32 & 0x3F) << 6)
                | (bytes[i + 3] as u32 & 0x3F);
            let adjusted = cp - 0x10000;
            let high = 0xD800 + (adjusted >> 10);
            let low = 0xDC00 + (adjusted & 0x3FF);
            encode_surrogate_half(high as u16, &mut out);
            encode_surrogate_half(low as u16, &mut out);
            i += 4;
        } else {
            // Not reachable for valid UTF-8 input.
            i += 1;
        }
    }
    out
}

fn encode_surrogate_half(unit: u16, out: &mut Vec<u8>) {
    out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
    out.push(0x80 | (unit & 0x3F) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutf8_ascii_roundtrips() {
        assert_eq!(encode_mutf8("hello"), b"hello".to_vec());
    }

    #[test]
    fn mutf8_nul_is_two_bytes() {
        assert_eq!(encode_mutf8("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
    }

    #[test]
    fn mutf8_supplementary_plane_becomes_surrogate_pair() {
        // U+1F600 GRINNING FACE
        let encoded = encode_mutf8("\u{1F600}");
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[0] & 0xF0, 0xE0);
        assert_eq!(encoded[3] & 0xF0, 0xE0);
    }

    #[test]
    fn utf8_dedup() {
        let mut cp = ConstantPool::default();
        let a = cp.utf8("same".into());
        let b = cp.utf8("same".into());
        assert_eq!(a, b);
    }

    #[test]
    fn class_dedup_by_name_index() {
        let mut cp = ConstantPool::default();
        let a = cp.class("java/lang/Object".into());
        let b = cp.class("java/lang/Object".into());
        assert_eq!(a, b);
    }

    #[test]
    fn name_and_type_dedup() {
        let mut cp = ConstantPool::default();
        let a = cp.name_and_type("m".into(), "()V".into());
        let b = cp.name_and_type("m".into(), "()V".into());
        assert_eq!(a, b);
    }

    #[test]
    fn long_reserves_next_index() {
        let mut cp = ConstantPool::default();
        let first = cp.long(42);
        let next = cp.utf8("after".into());
        assert_eq!(next, first + 2);
    }

    #[test]
    fn distinct_longs_do_not_collapse_placeholders() {
        let mut cp = ConstantPool::default();
        let a = cp.long(1);
        let b = cp.long(2);
        assert_ne!(a, b);
        assert_eq!(b, a + 2);
    }

    #[test]
    fn duplicate_long_does_not_orphan_a_second_placeholder() {
        let mut cp = ConstantPool::default();
        let first = cp.long(42);
        let second = cp.long(42);
        assert_eq!(first, second);
        let next = cp.utf8("after".into());
        assert_eq!(next, first + 2);
    }

    #[test]
    fn duplicate_double_does_not_orphan_a_second_placeholder() {
        let mut cp = ConstantPool::default();
        let first = cp.double(1.5);
        let second = cp.double(1.5);
        assert_eq!(first, second);
        let next = cp.utf8("after".into());
        assert_eq!(next, first + 2);
    }
}
