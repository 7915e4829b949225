//! Structured control-flow bookkeeping: the control stack that backs
//! `if`/`while`/`do-while`/`for`/`switch` plus `break`/`continue`.
//!
//! Grounded on `codebuilder_control.c` (function names only were available
//! via the retrieval pack; the tagged-variant shape and the per-kind field
//! lists are restated directly from the specification's §3 "Control entry"
//! definition, which itself summarizes that file).

use super::label::LabelId;

pub struct IfEntry {
    pub then_label: LabelId,
    pub else_label: LabelId,
    pub end_label: LabelId,
    pub has_else: bool,
    pub in_then: bool,
    pub in_else: bool,
}

pub struct LoopEntry {
    pub start: LabelId,
    pub cond: LabelId,
    pub body: LabelId,
    pub post: Option<LabelId>,
    pub end: LabelId,
    pub is_do_while: bool,
    pub has_post: bool,
}

impl LoopEntry {
    /// For `while`, continue jumps to `cond`; for `do-while`, also `cond`
    /// (placed after the body); for `for`, continue jumps to `post`.
    pub fn continue_target(&self) -> LabelId {
        self.post.unwrap_or(self.cond)
    }
}

pub struct SwitchCase {
    pub value: i32,
    pub label: LabelId,
}

pub struct SwitchEntry {
    pub dispatch: LabelId,
    pub default_label: LabelId,
    pub end: LabelId,
    pub cases: Vec<SwitchCase>,
    /// Local variable index holding the materialised switch expression.
    pub scrutinee_local: u16,
    pub has_default: bool,
}

pub enum ControlEntry {
    If(IfEntry),
    Loop(LoopEntry),
    Switch(SwitchEntry),
}

/// A growable nesting stack of structured blocks. `break`/`continue` scan
/// from the top for the innermost loop-or-switch.
#[derive(Default)]
pub struct ControlStack {
    entries: Vec<ControlEntry>,
}

impl ControlStack {
    pub fn push(&mut self, entry: ControlEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<ControlEntry> {
        self.entries.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut ControlEntry> {
        self.entries.last_mut()
    }

    /// Innermost loop or switch's `break` target.
    pub fn innermost_break_target(&self) -> Option<LabelId> {
        self.entries.iter().rev().find_map(|e| match e {
            ControlEntry::Loop(l) => Some(l.end),
            ControlEntry::Switch(s) => Some(s.end),
            ControlEntry::If(_) => None,
        })
    }

    /// Innermost loop's `continue` target (switches have no continue
    /// target of their own; the scan passes through them to an enclosing
    /// loop).
    pub fn innermost_continue_target(&self) -> Option<LabelId> {
        self.entries.iter().rev().find_map(|e| match e {
            ControlEntry::Loop(l) => Some(l.continue_target()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::label::LabelTable;

    #[test]
    fn break_scans_through_if_to_innermost_loop() {
        let mut labels = LabelTable::default();
        let mut stack = ControlStack::default();
        let loop_end = labels.create();
        stack.push(ControlEntry::Loop(LoopEntry {
            start: labels.create(),
            cond: labels.create(),
            body: labels.create(),
            post: None,
            end: loop_end,
            is_do_while: false,
            has_post: false,
        }));
        stack.push(ControlEntry::If(IfEntry {
            then_label: labels.create(),
            else_label: labels.create(),
            end_label: labels.create(),
            has_else: false,
            in_then: true,
            in_else: false,
        }));
        assert_eq!(stack.innermost_break_target(), Some(loop_end));
    }

    #[test]
    fn continue_targets_post_for_for_loops() {
        let mut labels = LabelTable::default();
        let mut stack = ControlStack::default();
        let post = labels.create();
        stack.push(ControlEntry::Loop(LoopEntry {
            start: labels.create(),
            cond: labels.create(),
            body: labels.create(),
            post: Some(post),
            end: labels.create(),
            is_do_while: false,
            has_post: true,
        }));
        assert_eq!(stack.innermost_continue_target(), Some(post));
    }
}
