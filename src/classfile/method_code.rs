//! Growable method-code byte buffer plus the LineNumberTable side table.
//!
//! Grounded on `method_code.c`/`method_code.h` from the original C backend:
//! a byte-addressable buffer with doubling growth, big-endian u1/u2/u4
//! append, in-place u2 patch, and a monotonically-increasing line table.
//! The teacher crate already wraps `bytebuffer::ByteBuffer` for this role in
//! `classfile::mod::MethodWriter`; this module lifts that into its own type
//! so the code builder can own it independently of the class-file writer.

use bytebuffer::ByteBuffer;
use byteorder::WriteBytesExt;

/// A single PC/line pair. Duplicates at the same `start_pc` or the same
/// `line_number` as the previous entry are suppressed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Default)]
pub struct MethodCode {
    buf: ByteBuffer,
    line_numbers: Vec<LineNumberEntry>,
}

impl MethodCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.buf.get_wpos()
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub fn emit_u1(&mut self, v: u8) {
        self.buf.write_u8(v);
    }

    pub fn emit_u2(&mut self, v: u16) {
        self.buf.write_u16(v);
    }

    pub fn emit_i16(&mut self, v: i16) {
        self.buf.write_i16(v);
    }

    pub fn emit_u4(&mut self, v: u32) {
        self.buf.write_u32(v);
    }

    pub fn emit_i32(&mut self, v: i32) {
        self.buf.write_i32(v);
    }

    pub fn emit_u8_slice(&mut self, bytes: &[u8]) {
        self.buf.write_bytes(bytes);
    }

    /// Overwrites two bytes at `offset`. The caller guarantees `offset` lies
    /// within the already-written range.
    pub fn write_u2_at(&mut self, offset: usize, value: u16) {
        let saved = self.buf.get_wpos();
        self.buf.set_wpos(offset);
        self.buf.write_u16(value);
        self.buf.set_wpos(saved);
    }

    /// Overwrites four bytes at `offset` (used by `goto_w` promotion and
    /// switch default-offset patching).
    pub fn write_u4_at(&mut self, offset: usize, value: u32) {
        let saved = self.buf.get_wpos();
        self.buf.set_wpos(offset);
        self.buf.write_u32(value);
        self.buf.set_wpos(saved);
    }

    pub fn read_u1_at(&self, offset: usize) -> u8 {
        self.buf.as_bytes()[offset]
    }

    /// Appends `(pc, line)` unless it would duplicate the previous entry's
    /// PC or line number.
    pub fn add_line_number(&mut self, pc: u16, line: u16) {
        if line == 0 {
            return;
        }
        if let Some(last) = self.line_numbers.last() {
            if last.start_pc == pc || last.line_number == line {
                return;
            }
        }
        self.line_numbers.push(LineNumberEntry { start_pc: pc, line_number: line });
    }

    pub fn line_numbers(&self) -> &[LineNumberEntry] {
        &self.line_numbers
    }

    /// Widens the 3-byte branch instruction at `opcode_pc` (1-byte opcode +
    /// u2 offset) into a 5-byte one (`new_opcode` + u4 offset), inserting
    /// two bytes right after the old operand and shifting every recorded
    /// line-number entry at or past the insertion point. The widened
    /// offset field is left zeroed; the caller patches it via
    /// [`write_u4_at`](Self::write_u4_at) once the final offset is known.
    pub fn widen_branch(&mut self, opcode_pc: usize, new_opcode: u8) {
        let insert_at = opcode_pc + 3;
        let old_bytes = self.buf.as_bytes().to_vec();
        let saved_wpos = self.buf.get_wpos();
        let mut rebuilt = ByteBuffer::new();
        rebuilt.write_bytes(&old_bytes[..opcode_pc]);
        rebuilt.write_u8(new_opcode);
        rebuilt.write_u32(0);
        rebuilt.write_bytes(&old_bytes[insert_at..]);
        rebuilt.set_wpos(saved_wpos + 2);
        self.buf = rebuilt;
        for entry in &mut self.line_numbers {
            if entry.start_pc as usize >= insert_at {
                entry.start_pc += 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_and_patch() {
        let mut mc = MethodCode::new();
        mc.emit_u1(0xB1);
        assert_eq!(mc.size(), 1);
        let patch_at = mc.size();
        mc.emit_u2(0xFEFE);
        mc.write_u2_at(patch_at, 42);
        assert_eq!(mc.size(), 3);
        assert_eq!(&mc.bytes()[1..3], &[0, 42]);
    }

    #[test]
    fn widen_branch_grows_instruction_and_shifts_line_numbers() {
        let mut mc = MethodCode::new();
        mc.emit_u1(0xA7); // goto
        mc.emit_u2(0xFEFE);
        mc.add_line_number(3, 7);
        mc.emit_u1(0xB1); // return, right after the branch
        assert_eq!(mc.size(), 4);

        mc.widen_branch(0, 0xC8); // goto_w
        assert_eq!(mc.size(), 6);
        assert_eq!(mc.bytes()[0], 0xC8);
        assert_eq!(mc.bytes()[5], 0xB1);
        assert_eq!(mc.line_numbers()[0].start_pc, 5);

        mc.write_u4_at(1, 123);
        assert_eq!(&mc.bytes()[1..5], &[0, 0, 0, 123]);
    }

    #[test]
    fn line_table_suppresses_duplicates() {
        let mut mc = MethodCode::new();
        mc.add_line_number(0, 1);
        mc.add_line_number(2, 1); // same line, suppressed
        mc.add_line_number(2, 2); // same pc as nothing yet recorded at 2... actually pc differs from last(0) so kept? last.start_pc==0 != 2, last.line==1 == line 1? line is 2 so not suppressed
        assert_eq!(mc.line_numbers().len(), 2);
    }
}
