//! StackMapTable frame-form selection and encoding.
//!
//! Grounded on `codebuilder_stackmap.c` (not separately retrieved in full;
//! its contract is restated from specification §4.5, which summarizes it)
//! together with the frame-form byte ranges mandated by the JVM
//! specification itself (`same`/`same_locals_1_stack_item`/`chop`/`append`/
//! `full_frame`, each with its extended variant). The teacher crate's ad hoc
//! encoder in `MethodData::serialize` only covered `same`/`same_extended`/
//! `full_frame`; this module replaces it with the complete form set.

use bytebuffer::ByteBuffer;
use byteorder::WriteBytesExt;

use super::constant_pool::ConstantPool;
use super::verification::Frame;

/// Encodes the full StackMapTable attribute body (entry count followed by
/// each frame), given the method's initial frame (derived from its
/// descriptor) and the sorted, deduplicated list of recorded branch-target
/// frames.
pub fn encode(initial_frame: &Frame, mut targets: Vec<(usize, Frame)>, code_size: usize, cp: &mut ConstantPool) -> ByteBuffer {
    targets.retain(|(pc, _)| *pc < code_size);
    targets.sort_by_key(|(pc, _)| *pc);
    targets.dedup_by(|a, b| a.0 == b.0);

    let mut out = ByteBuffer::new();
    out.write_u16(targets.len() as u16);

    let mut prev_pc: i64 = -1;
    let mut prev_frame = initial_frame.clone();
    for (pc, frame) in &targets {
        let offset_delta = if prev_pc < 0 { *pc as i64 } else { *pc as i64 - prev_pc - 1 };
        write_frame(&mut out, &prev_frame, frame, offset_delta as u16, cp);
        prev_pc = *pc as i64;
        prev_frame = frame.clone();
    }
    out
}

fn write_frame(out: &mut ByteBuffer, prev: &Frame, cur: &Frame, offset_delta: u16, cp: &mut ConstantPool) {
    // `number_of_locals`/`K` and the serialized locals list all count
    // *entries*, not raw slots: a Long/Double local is one entry, and the
    // explicit Top marking its second slot is never counted or re-emitted.
    let prev_locals = prev.locals_entries();
    let cur_locals = cur.locals_entries();
    let cur_stack = cur.stack_entries();

    let stack_empty = cur_stack.is_empty();
    let locals_equal = prev_locals == cur_locals;

    if stack_empty && locals_equal {
        if offset_delta < 64 {
            out.write_u8(offset_delta as u8);
        } else {
            out.write_u8(251);
            out.write_u16(offset_delta);
        }
        return;
    }

    if cur_stack.len() == 1 && locals_equal {
        if offset_delta < 64 {
            out.write_u8(64 + offset_delta as u8);
        } else {
            out.write_u8(247);
            out.write_u16(offset_delta);
        }
        cur_stack[0].serialize(cp, out);
        return;
    }

    if stack_empty && cur_locals.len() < prev_locals.len() {
        let k = prev_locals.len() - cur_locals.len();
        if (1..=3).contains(&k) && prev_locals[..cur_locals.len()] == cur_locals[..] {
            out.write_u8((251 - k) as u8);
            out.write_u16(offset_delta);
            return;
        }
    }

    if stack_empty && cur_locals.len() > prev_locals.len() {
        let k = cur_locals.len() - prev_locals.len();
        if (1..=3).contains(&k) && cur_locals[..prev_locals.len()] == prev_locals[..] {
            out.write_u8((251 + k) as u8);
            out.write_u16(offset_delta);
            for extra in &cur_locals[prev_locals.len()..] {
                extra.serialize(cp, out);
            }
            return;
        }
    }

    out.write_u8(255);
    out.write_u16(offset_delta);
    out.write_u16(cur_locals.len() as u16);
    for l in &cur_locals {
        l.serialize(cp, out);
    }
    out.write_u16(cur_stack.len() as u16);
    for s in &cur_stack {
        s.serialize(cp, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::verification::VerificationType;

    #[test]
    fn same_frame_for_unchanged_locals_empty_stack() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer]);
        let target = Frame::new(vec![VerificationType::Integer]);
        let buf = encode(&initial, vec![(10, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[2], 10);
    }

    #[test]
    fn same_locals_1_stack_item_when_one_value_pushed() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer]);
        let mut target = Frame::new(vec![VerificationType::Integer]);
        target.stack.push(VerificationType::Integer);
        let buf = encode(&initial, vec![(5, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[2], 64 + 5);
    }

    #[test]
    fn append_frame_for_extra_locals() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer]);
        let target = Frame::new(vec![VerificationType::Integer, VerificationType::Integer]);
        let buf = encode(&initial, vec![(3, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[2], 252);
    }

    #[test]
    fn chop_frame_for_fewer_locals() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer, VerificationType::Integer]);
        let target = Frame::new(vec![VerificationType::Integer]);
        let buf = encode(&initial, vec![(3, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[2], 250);
    }

    #[test]
    fn full_frame_when_nothing_else_applies() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer]);
        let mut target = Frame::new(vec![VerificationType::Float]);
        target.stack.push(VerificationType::Integer);
        target.stack.push(VerificationType::Long);
        let buf = encode(&initial, vec![(3, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[2], 255);
    }

    #[test]
    fn wide_local_is_one_entry_not_two() {
        // A `long` local live at a branch target (e.g. declared before a
        // `while` loop) carries an explicit second-slot Top in `Frame`, but
        // must collapse to a single locals entry with no Top byte emitted.
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Long, VerificationType::Top]);
        let target = Frame::new(vec![VerificationType::Long, VerificationType::Top]);
        let buf = encode(&initial, vec![(10, target)], 20, &mut cp);
        // same_frame (no stack, unchanged locals): a single byte, not a
        // full_frame with number_of_locals == 2.
        assert_eq!(buf.as_bytes()[2], 10);
    }

    #[test]
    fn append_frame_counts_wide_local_as_one_entry() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![VerificationType::Integer]);
        let target = Frame::new(vec![VerificationType::Integer, VerificationType::Long, VerificationType::Top]);
        let buf = encode(&initial, vec![(3, target)], 20, &mut cp);
        // append, K=1 (one new entry: the Long), not K=2.
        assert_eq!(buf.as_bytes()[2], 252);
    }

    #[test]
    fn targets_past_code_size_are_dropped() {
        let mut cp = ConstantPool::default();
        let initial = Frame::new(vec![]);
        let target = Frame::new(vec![]);
        let buf = encode(&initial, vec![(100, target)], 20, &mut cp);
        assert_eq!(buf.as_bytes()[..2], [0, 0]);
    }
}
