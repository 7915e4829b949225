//! Labels and the pending-jump queue that resolves them.
//!
//! Grounded on `codebuilder_label.c`'s label lifecycle (create → jump →
//! place → patch) and the "heap-allocate individually so pointer identity
//! survives vector growth" note in the specification's design notes (§9),
//! realised here as `Vec<Box<Label>>` indexed by a stable `LabelId` rather
//! than raw pointers.

use std::collections::HashSet;

use super::method_code::MethodCode;
use super::opcode;
use super::verification::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub usize);

/// Diagnostic record of a jump site, kept so frame-merge disagreements can
/// be reported with a readable context string ("goto", "break", "continue",
/// "if", "loop", "unknown").
#[derive(Debug, Clone)]
pub struct JumpSource {
    pub pc: usize,
    pub frame: Frame,
    pub context: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingJump {
    pub jump_site_pc: usize,
    pub label: LabelId,
    /// Offset (from the start of the instruction) of the two bytes holding
    /// the branch offset, so it can be patched once the label is placed.
    pub offset_field_pc: usize,
}

/// Result of [`LabelTable::resolve_all`]: jumps whose label was never
/// placed, branches that couldn't be made to fit even after promotion, and
/// the list of byte-insertion points applied while promoting `goto`s —
/// callers that track other pcs into the same code buffer (e.g. the code
/// builder's recorded branch-target frames) must replay these shifts via
/// [`apply_shifts`] to stay in sync with the final layout.
pub struct ResolveOutcome {
    pub unresolved: Vec<PendingJump>,
    pub out_of_range: Vec<(PendingJump, i64)>,
    pub shifts: Vec<(usize, usize)>,
}

/// Maps a pc recorded before any `goto`→`goto_w` promotion to its final
/// position, by summing the size of every insertion at or before it.
pub fn apply_shifts(pc: usize, shifts: &[(usize, usize)]) -> usize {
    shifts.iter().fold(pc, |p, &(at, delta)| if at <= pc { p + delta } else { p })
}

#[derive(Debug)]
pub struct Label {
    pub id: LabelId,
    pub pc: Option<usize>,
    pub frame: Option<Frame>,
    pub placed: bool,
    pub loop_header: bool,
    pub frame_recorded: bool,
    pub frame_saved: bool,
    pub jump_only: bool,
    pub jump_target: bool,
    pub name: Option<String>,
    pub jump_sources: Vec<JumpSource>,
}

impl Label {
    fn new(id: LabelId) -> Self {
        Label {
            id,
            pc: None,
            frame: None,
            placed: false,
            loop_header: false,
            frame_recorded: false,
            frame_saved: false,
            jump_only: false,
            jump_target: false,
            name: None,
            jump_sources: Vec::new(),
        }
    }
}

/// Owns all labels created for one method. Stable `LabelId`s let the code
/// builder hand out handles before a label is placed, then mutate the
/// underlying `Label` without invalidating handles held elsewhere (the
/// control stack, the pending-jump queue).
#[derive(Default)]
pub struct LabelTable {
    labels: Vec<Box<Label>>,
    pending: Vec<PendingJump>,
}

impl LabelTable {
    pub fn create(&mut self) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(Box::new(Label::new(id)));
        id
    }

    pub fn create_named(&mut self, name: impl Into<String>) -> LabelId {
        let id = self.create();
        self.get_mut(id).name = Some(name.into());
        id
    }

    pub fn get(&self, id: LabelId) -> &Label {
        &self.labels[id.0]
    }

    pub fn get_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id.0]
    }

    pub fn queue_jump(&mut self, jump_site_pc: usize, offset_field_pc: usize, label: LabelId) {
        self.pending.push(PendingJump { jump_site_pc, label, offset_field_pc });
    }

    /// Patches every queued jump whose label has since been placed. `goto`
    /// instructions whose offset doesn't fit in the 3-byte form's `i16`
    /// field are promoted in place to `goto_w`; any other branch family out
    /// of range (no JVM opcode has a wide conditional form) is reported
    /// rather than patched, since patching would silently truncate it.
    /// Offsets are resolved to a fixed point: promoting one `goto` can push
    /// a later branch out of range too, so every still-unwidened `goto` is
    /// re-checked each pass until a pass promotes none.
    pub fn resolve_all(&mut self, code: &mut MethodCode) -> ResolveOutcome {
        let mut placed = Vec::new();
        let mut unresolved = Vec::new();
        for pending in self.pending.drain(..) {
            if self.labels[pending.label.0].pc.is_some() {
                placed.push(pending);
            } else {
                unresolved.push(pending);
            }
        }

        // (original-space insertion pc, bytes inserted), applied in order.
        let mut shifts: Vec<(usize, usize)> = Vec::new();
        let mut widened: HashSet<usize> = HashSet::new();

        loop {
            let mut promoted = false;
            for pending in &placed {
                if widened.contains(&pending.jump_site_pc) {
                    continue;
                }
                let site = apply_shifts(pending.jump_site_pc, &shifts);
                if code.read_u1_at(site) != opcode::GOTO {
                    continue;
                }
                let target = self.labels[pending.label.0].pc.unwrap();
                let offset = apply_shifts(target, &shifts) as i64 - site as i64;
                if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
                    code.widen_branch(site, opcode::GOTO_W);
                    shifts.push((pending.jump_site_pc + 3, 2));
                    widened.insert(pending.jump_site_pc);
                    promoted = true;
                }
            }
            if !promoted {
                break;
            }
        }

        let mut out_of_range = Vec::new();
        for pending in placed {
            let site = apply_shifts(pending.jump_site_pc, &shifts);
            let offset_field = apply_shifts(pending.offset_field_pc, &shifts);
            let target = self.labels[pending.label.0].pc.unwrap();
            let offset = apply_shifts(target, &shifts) as i64 - site as i64;
            if widened.contains(&pending.jump_site_pc) {
                code.write_u4_at(offset_field, offset as u32);
            } else if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
                out_of_range.push((pending, offset));
            } else {
                code.write_u2_at(offset_field, offset as u16);
            }
        }

        ResolveOutcome { unresolved, out_of_range, shifts }
    }

    pub fn all_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter().map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_ids_stable_across_growth() {
        let mut t = LabelTable::default();
        let ids: Vec<_> = (0..64).map(|_| t.create()).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.0, i);
        }
    }

    #[test]
    fn unplaced_jump_is_reported_unresolved() {
        let mut t = LabelTable::default();
        let label = t.create();
        let mut code = MethodCode::new();
        code.emit_u1(0xA7);
        let offset_field = code.size();
        code.emit_u2(0xFEFE);
        t.queue_jump(0, offset_field, label);
        let outcome = t.resolve_all(&mut code);
        assert_eq!(outcome.unresolved.len(), 1);
    }

    #[test]
    fn placed_label_patches_offset() {
        let mut t = LabelTable::default();
        let label = t.create();
        let mut code = MethodCode::new();
        code.emit_u1(0xA7);
        let offset_field = code.size();
        code.emit_u2(0xFEFE);
        t.queue_jump(0, offset_field, label);
        t.get_mut(label).pc = Some(10);
        let outcome = t.resolve_all(&mut code);
        assert!(outcome.unresolved.is_empty());
        assert!(outcome.out_of_range.is_empty());
        assert_eq!(&code.bytes()[1..3], &[0, 10]);
    }

    #[test]
    fn far_backward_goto_is_promoted_to_goto_w() {
        let mut t = LabelTable::default();
        let label = t.create();
        t.get_mut(label).pc = Some(0);
        let mut code = MethodCode::new();
        // Pad the method out past i16::MAX so the backward jump to pc 0
        // can't fit in goto's 3-byte form.
        code.emit_u8_slice(&vec![0u8; 40_000]);
        code.emit_u1(0xA7);
        let jump_site = code.size() - 1;
        let offset_field = code.size();
        code.emit_u2(0xFEFE);
        t.queue_jump(jump_site, offset_field, label);
        let outcome = t.resolve_all(&mut code);
        assert!(outcome.unresolved.is_empty());
        assert!(outcome.out_of_range.is_empty());
        assert_eq!(code.read_u1_at(jump_site), super::super::opcode::GOTO_W);
        assert_eq!(code.size(), 40_003 + 2);
    }

    #[test]
    fn far_conditional_branch_is_reported_out_of_range() {
        let mut t = LabelTable::default();
        let label = t.create();
        t.get_mut(label).pc = Some(0);
        let mut code = MethodCode::new();
        code.emit_u8_slice(&vec![0u8; 40_000]);
        code.emit_u1(0x9F); // if_icmpeq: no wide form exists
        let jump_site = code.size() - 1;
        let offset_field = code.size();
        code.emit_u2(0xFEFE);
        t.queue_jump(jump_site, offset_field, label);
        let outcome = t.resolve_all(&mut code);
        assert_eq!(outcome.out_of_range.len(), 1);
    }
}
