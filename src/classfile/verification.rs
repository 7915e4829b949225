//! Verification types and the operand-stack/locals frame.
//!
//! Grounded on `codebuilder_types.c` (assignability, merge, slot widths) and
//! `classfile.h`'s `CF_VerificationTypeTag` (the eight/nine-way tag set and
//! serialized tag values). The teacher crate already had a `VerificationType`
//! enum with most of these variants (missing `assignable`/`merge`, and with
//! `Object(_)` unserializable); this fills those gaps in directly rather than
//! bolting a second type on top.

use bytebuffer::ByteBuffer;
use byteorder::WriteBytesExt;

use super::constant_pool::ConstantPool;
use super::descriptor::DescriptorEntry;

/// A bytecode offset; used both for general PCs and for the `new`-site PC
/// embedded in `Uninitialized`.
pub type Pc = u16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Object(String),
    Uninitialized(Pc),
}

impl VerificationType {
    pub fn slots(&self) -> u8 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null | VerificationType::Object(_) | VerificationType::Uninitialized(_) | VerificationType::UninitializedThis
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, VerificationType::Integer)
    }

    pub fn is_category1(&self) -> bool {
        self.slots() == 1
    }

    pub fn is_category2(&self) -> bool {
        self.slots() == 2
    }

    /// Builds the verification type corresponding to a field/array-element
    /// descriptor. Used by `getfield`/`getstatic`/`checkcast`/array loads.
    pub fn from_descriptor(d: &DescriptorEntry) -> VerificationType {
        match d {
            DescriptorEntry::Byte | DescriptorEntry::Char | DescriptorEntry::Short | DescriptorEntry::Boolean | DescriptorEntry::Int => {
                VerificationType::Integer
            }
            DescriptorEntry::Long => VerificationType::Long,
            DescriptorEntry::Float => VerificationType::Float,
            DescriptorEntry::Double => VerificationType::Double,
            DescriptorEntry::Class(name) => VerificationType::Object(name.clone()),
            DescriptorEntry::Array(_) => VerificationType::Object(d.to_string()),
        }
    }

    /// `value` is assignable to `target` per the JVM verifier's (conservative,
    /// descriptor-only) rules. Grounded on `cb_type_assignable`.
    pub fn assignable(&self, target: &VerificationType) -> bool {
        if matches!(self, VerificationType::Top) || matches!(target, VerificationType::Top) {
            return true;
        }
        if matches!(self, VerificationType::Null) {
            return matches!(
                target,
                VerificationType::Object(_) | VerificationType::Null | VerificationType::Uninitialized(_) | VerificationType::UninitializedThis
            );
        }
        if self == target {
            return true;
        }
        match (self, target) {
            (VerificationType::Object(src), VerificationType::Object(dst)) => {
                if src == dst {
                    return true;
                }
                if dst == "java/lang/Object" {
                    return true;
                }
                // Array covariance: ONLY when the target is literally
                // `[Ljava/lang/Object;` and the source is any object array,
                // per the conservative rule the original C keeps (no class
                // hierarchy is available to the core).
                if dst == "[Ljava/lang/Object;" && src.starts_with('[') && src.trim_start_matches('[').starts_with('L') {
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Conservative lattice merge. Grounded on `cb_type_merge` in
    /// `codebuilder_types.c` (referenced from `codebuilder_frame.c`'s frame
    /// merge, not separately retrieved but implied by the frame-merge
    /// contract in the specification).
    pub fn merge(a: &VerificationType, b: &VerificationType) -> VerificationType {
        if a == b {
            return a.clone();
        }
        match (a, b) {
            (VerificationType::Null, VerificationType::Object(o)) | (VerificationType::Object(o), VerificationType::Null) => {
                VerificationType::Object(o.clone())
            }
            (VerificationType::Object(x), VerificationType::Object(y)) => {
                let x_dims = x.chars().take_while(|c| *c == '[').count();
                let y_dims = y.chars().take_while(|c| *c == '[').count();
                if x_dims > 0 && x_dims == y_dims {
                    let x_elem_is_object = x.trim_start_matches('[').starts_with('L');
                    let y_elem_is_object = y.trim_start_matches('[').starts_with('L');
                    if x_elem_is_object && y_elem_is_object {
                        return VerificationType::Object(format!("{}Ljava/lang/Object;", "[".repeat(x_dims)));
                    }
                }
                VerificationType::Object("java/lang/Object".to_string())
            }
            _ => VerificationType::Top,
        }
    }

    /// Serializes a `verification_type_info` entry, including the implicit
    /// Top that follows Long/Double.
    pub fn serialize(&self, cp: &mut ConstantPool, b: &mut ByteBuffer) {
        match self {
            VerificationType::Top => b.write_u8(0),
            VerificationType::Integer => b.write_u8(1),
            VerificationType::Float => b.write_u8(2),
            VerificationType::Double => b.write_u8(3),
            VerificationType::Long => b.write_u8(4),
            VerificationType::Null => b.write_u8(5),
            VerificationType::UninitializedThis => b.write_u8(6),
            VerificationType::Object(desc) => {
                b.write_u8(7);
                let class_name = object_descriptor_to_class_name(desc);
                let idx = cp.class(class_name);
                b.write_u16(idx);
            }
            VerificationType::Uninitialized(pc) => {
                b.write_u8(8);
                b.write_u16(*pc);
            }
        }
    }
}

/// Strips a leading `L`/trailing `;` from a plain object descriptor, leaving
/// array descriptors (and bare class names) untouched — the constant pool's
/// `Class` entry stores the internal form (`java/lang/Object` or
/// `[Ljava/lang/Object;`), not the field-descriptor form.
fn object_descriptor_to_class_name(desc: &str) -> String {
    if let Some(stripped) = desc.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        stripped.to_string()
    } else {
        desc.to_string()
    }
}

/// Locals + operand stack at some program point. Grounded on the `Frame`
/// half of `codebuilder_frame.c` (not separately retrieved in full; its
/// contract is restated from the specification's §4.3/§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl Frame {
    pub fn new(locals: Vec<VerificationType>) -> Self {
        Frame { locals, stack: Vec::new() }
    }

    pub fn locals_entry_count(&self) -> usize {
        collapse_wide_entries(&self.locals).len()
    }

    pub fn stack_entry_count(&self) -> usize {
        collapse_wide_entries(&self.stack).len()
    }

    /// Locals as StackMapTable *entries*: a `Long`/`Double` local is one
    /// entry, its trailing implicit `Top` skipped rather than listed.
    /// Grounded on `count_stackmap_locals` ("long/double are represented as
    /// a single entry ... the second slot TOP is implicit, not listed").
    pub fn locals_entries(&self) -> Vec<&VerificationType> {
        collapse_wide_entries(&self.locals)
    }

    /// Stack as StackMapTable entries. The code builder never pushes an
    /// explicit `Top` after a wide stack value (only locals carry one, to
    /// track slot occupancy for JVM local-variable indexing), so this is
    /// equivalent to `&self.stack` today; kept parallel to
    /// [`locals_entries`](Self::locals_entries) so callers don't need to
    /// know that asymmetry.
    pub fn stack_entries(&self) -> Vec<&VerificationType> {
        collapse_wide_entries(&self.stack)
    }

    pub fn stack_slot_count(&self) -> usize {
        self.stack.iter().map(|t| t.slots() as usize).sum()
    }

    pub fn locals_slot_count(&self) -> usize {
        self.locals.iter().map(|t| t.slots() as usize).sum()
    }

    /// Merges `src` into `self` in place, following §4.3's rule: truncate
    /// locals to the shorter length, pointwise-merge with wide-slot
    /// consistency, then trim a trailing run of Top. Stack depths that
    /// differ are reduced to the smaller, pointwise-merged.
    pub fn merge_from(&mut self, src: &Frame) {
        let n = self.locals.len().min(src.locals.len());
        self.locals.truncate(n);
        for i in 0..n {
            self.locals[i] = VerificationType::merge(&self.locals[i], &src.locals[i]);
        }
        while matches!(self.locals.last(), Some(VerificationType::Top)) {
            self.locals.pop();
        }

        let sn = self.stack.len().min(src.stack.len());
        self.stack.truncate(sn);
        for i in 0..sn {
            self.stack[i] = VerificationType::merge(&self.stack[i], &src.stack[i]);
        }
    }

    /// Replaces every occurrence of `Uninitialized(pc)` in locals and stack
    /// with `Object(class_descriptor)`. Grounded on the receiver-replacement
    /// loop at the end of `codebuilder_build_invokespecial`.
    pub fn replace_uninitialized(&mut self, pc: Pc, class_internal_name: &str) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if *slot == VerificationType::Uninitialized(pc) {
                *slot = VerificationType::Object(class_internal_name.to_string());
            }
        }
    }
}

/// Collapses a locals/stack vector into its StackMapTable *entries*: a
/// `Long`/`Double` is one entry, and the explicit `Top` immediately
/// following one (the second slot of a wide local) is skipped rather than
/// counted or re-emitted as its own entry. A `Top` that doesn't follow a
/// wide entry (an unused local slot) is kept, since it's a real entry in
/// its own right.
fn collapse_wide_entries(types: &[VerificationType]) -> Vec<&VerificationType> {
    let mut out = Vec::with_capacity(types.len());
    let mut i = 0;
    while i < types.len() {
        out.push(&types[i]);
        let wide = matches!(types[i], VerificationType::Long | VerificationType::Double);
        if wide && types.get(i + 1) == Some(&VerificationType::Top) {
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_assignable_both_ways() {
        assert!(VerificationType::Top.assignable(&VerificationType::Integer));
        assert!(VerificationType::Integer.assignable(&VerificationType::Top));
    }

    #[test]
    fn null_assignable_to_object() {
        assert!(VerificationType::Null.assignable(&VerificationType::Object("java/lang/String".into())));
    }

    #[test]
    fn exact_match_required_for_primitives() {
        assert!(!VerificationType::Integer.assignable(&VerificationType::Float));
    }

    #[test]
    fn array_covariance_only_for_object_array_target() {
        let src = VerificationType::Object("[Ljava/lang/String;".into());
        let target = VerificationType::Object("[Ljava/lang/Object;".into());
        assert!(src.assignable(&target));

        let narrower_target = VerificationType::Object("[Ljava/lang/String;".into());
        let other_src = VerificationType::Object("[Ljava/lang/Integer;".into());
        assert!(!other_src.assignable(&narrower_target));
    }

    #[test]
    fn merge_same_object_dims_to_object_array() {
        let a = VerificationType::Object("[Ljava/lang/String;".into());
        let b = VerificationType::Object("[Ljava/lang/Integer;".into());
        assert_eq!(VerificationType::merge(&a, &b), VerificationType::Object("[Ljava/lang/Object;".into()));
    }

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let a = VerificationType::Integer;
        assert_eq!(VerificationType::merge(&a, &a), a);
        let x = VerificationType::Object("java/lang/String".into());
        let y = VerificationType::Object("java/lang/Integer".into());
        assert_eq!(VerificationType::merge(&x, &y), VerificationType::merge(&y, &x));
    }

    #[test]
    fn frame_merge_truncates_locals_and_trims_trailing_top() {
        let mut a = Frame::new(vec![VerificationType::Integer, VerificationType::Long, VerificationType::Top]);
        let b = Frame::new(vec![VerificationType::Integer]);
        a.merge_from(&b);
        assert_eq!(a.locals, vec![VerificationType::Integer]);
    }

    #[test]
    fn locals_entry_count_collapses_wide_local_top() {
        let f = Frame::new(vec![VerificationType::Integer, VerificationType::Long, VerificationType::Top, VerificationType::Float]);
        assert_eq!(f.locals_entry_count(), 3);
        assert_eq!(f.locals_entries(), vec![&VerificationType::Integer, &VerificationType::Long, &VerificationType::Float]);
    }

    #[test]
    fn locals_entry_count_keeps_standalone_top() {
        // A Top that doesn't follow a wide entry (an unused local slot) is
        // still its own entry.
        let f = Frame::new(vec![VerificationType::Top, VerificationType::Integer]);
        assert_eq!(f.locals_entry_count(), 2);
    }

    #[test]
    fn replace_uninitialized_hits_both_stack_and_locals() {
        let mut f = Frame::new(vec![VerificationType::Uninitialized(3)]);
        f.stack.push(VerificationType::Uninitialized(3));
        f.replace_uninitialized(3, "Foo");
        assert_eq!(f.locals[0], VerificationType::Object("Foo".into()));
        assert_eq!(f.stack[0], VerificationType::Object("Foo".into()));
    }
}
