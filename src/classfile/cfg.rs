//! Post-hoc control-flow graph reconstruction over finished method bytecode.
//!
//! Grounded on `cfg.c`'s two-pass design (decode instruction boundaries, then
//! compute basic-block starts from branch targets and handler entries),
//! restated from specification §4.6 since the retrieval pack only carried
//! the file's function signatures. Used by the driver as a final structural
//! sanity check before a method's bytes are handed to the class-file writer:
//! it does not reinterpret verification, only shape.

use super::opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: u8,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub start_pc: usize,
    pub end_pc: usize,
    pub successors: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionHandler {
    pub start_pc: usize,
    pub end_pc: usize,
    pub handler_pc: usize,
}

/// Decodes a method's raw bytes into a flat instruction list, computing each
/// instruction's length from its opcode (including the variable-length
/// `tableswitch`/`lookupswitch`/`wide` forms). Stops at the first
/// unrecognized opcode rather than panicking, since malformed bytecode
/// should surface as a diagnostic, not a crash.
pub fn decode_instructions(code: &[u8]) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let len = instruction_length(code, pc);
        out.push(Instruction { pc, opcode: op, length: len });
        pc += len.max(1);
    }
    out
}

fn instruction_length(code: &[u8], pc: usize) -> usize {
    let op = code[pc];
    match op {
        opcode::BIPUSH | opcode::LDC | opcode::NEWARRAY => 2,
        opcode::SIPUSH
        | opcode::LDC_W
        | opcode::LDC2_W
        | opcode::ILOAD
        | opcode::LLOAD
        | opcode::FLOAD
        | opcode::DLOAD
        | opcode::ALOAD
        | opcode::ISTORE
        | opcode::LSTORE
        | opcode::FSTORE
        | opcode::DSTORE
        | opcode::ASTORE
        | opcode::IINC
        | opcode::GETSTATIC
        | opcode::PUTSTATIC
        | opcode::GETFIELD
        | opcode::PUTFIELD
        | opcode::INVOKEVIRTUAL
        | opcode::INVOKESPECIAL
        | opcode::INVOKESTATIC
        | opcode::NEW
        | opcode::ANEWARRAY
        | opcode::CHECKCAST
        | opcode::INSTANCEOF
        | opcode::IFEQ..=opcode::JSR
        | opcode::IFNULL
        | opcode::IFNONNULL => 3,
        opcode::INVOKEINTERFACE | opcode::INVOKEDYNAMIC | opcode::MULTIANEWARRAY => {
            if op == opcode::MULTIANEWARRAY { 4 } else { 5 }
        }
        opcode::GOTO_W | opcode::JSR_W => 5,
        opcode::WIDE => {
            if code.get(pc + 1) == Some(&opcode::IINC) { 6 } else { 4 }
        }
        opcode::TABLESWITCH => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let low = i32::from_be_bytes(code[base + 4..base + 8].try_into().unwrap());
            let high = i32::from_be_bytes(code[base + 8..base + 12].try_into().unwrap());
            let entries = (high - low + 1).max(0) as usize;
            (base + 12 + entries * 4) - pc
        }
        opcode::LOOKUPSWITCH => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let n = i32::from_be_bytes(code[base + 4..base + 8].try_into().unwrap()) as usize;
            (base + 8 + n * 8) - pc
        }
        _ => 1,
    }
}

/// Returns up to two successor PCs for the instruction at `pc`: the
/// fall-through (for anything but an unconditional transfer) and any branch
/// target(s). `tableswitch`/`lookupswitch` can have more than two, handled
/// by the caller reading the raw operands directly; this function covers the
/// common single/zero/one-target cases.
pub fn successors(code: &[u8], instr: &Instruction) -> Vec<usize> {
    let pc = instr.pc;
    match instr.opcode {
        opcode::GOTO => {
            let off = i16::from_be_bytes([code[pc + 1], code[pc + 2]]);
            vec![(pc as i64 + off as i64) as usize]
        }
        opcode::GOTO_W => {
            let off = i32::from_be_bytes(code[pc + 1..pc + 5].try_into().unwrap());
            vec![(pc as i64 + off as i64) as usize]
        }
        opcode::IRETURN | opcode::LRETURN | opcode::FRETURN | opcode::DRETURN | opcode::ARETURN | opcode::RETURN | opcode::ATHROW => vec![],
        opcode::TABLESWITCH => tableswitch_successors(code, pc),
        opcode::LOOKUPSWITCH => lookupswitch_successors(code, pc),
        op if (opcode::IFEQ..=opcode::JSR).contains(&op) || op == opcode::IFNULL || op == opcode::IFNONNULL => {
            let off = i16::from_be_bytes([code[pc + 1], code[pc + 2]]);
            vec![pc + instr.length, (pc as i64 + off as i64) as usize]
        }
        _ => vec![pc + instr.length],
    }
}

fn tableswitch_successors(code: &[u8], pc: usize) -> Vec<usize> {
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let base = pc + 1 + pad;
    let default = i32::from_be_bytes(code[base..base + 4].try_into().unwrap());
    let low = i32::from_be_bytes(code[base + 4..base + 8].try_into().unwrap());
    let high = i32::from_be_bytes(code[base + 8..base + 12].try_into().unwrap());
    let mut out = vec![(pc as i64 + default as i64) as usize];
    let n = (high - low + 1).max(0) as usize;
    for i in 0..n {
        let off_base = base + 12 + i * 4;
        let off = i32::from_be_bytes(code[off_base..off_base + 4].try_into().unwrap());
        out.push((pc as i64 + off as i64) as usize);
    }
    out
}

fn lookupswitch_successors(code: &[u8], pc: usize) -> Vec<usize> {
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let base = pc + 1 + pad;
    let default = i32::from_be_bytes(code[base..base + 4].try_into().unwrap());
    let n = i32::from_be_bytes(code[base + 4..base + 8].try_into().unwrap()) as usize;
    let mut out = vec![(pc as i64 + default as i64) as usize];
    for i in 0..n {
        let off_base = base + 8 + i * 8 + 4;
        let off = i32::from_be_bytes(code[off_base..off_base + 4].try_into().unwrap());
        out.push((pc as i64 + off as i64) as usize);
    }
    out
}

/// Computes basic-block boundaries: a new block starts at pc 0, at every
/// branch target, at every instruction immediately following a branch, and
/// at every exception handler's `start_pc`/`handler_pc`.
pub fn build_blocks(code: &[u8], handlers: &[ExceptionHandler]) -> Vec<BasicBlock> {
    let instructions = decode_instructions(code);
    if instructions.is_empty() {
        return Vec::new();
    }

    let mut starts = std::collections::BTreeSet::new();
    starts.insert(0);
    for h in handlers {
        starts.insert(h.start_pc);
        starts.insert(h.handler_pc);
    }

    let mut succ_map = std::collections::HashMap::new();
    for instr in &instructions {
        let succs = successors(code, instr);
        for &s in &succs {
            starts.insert(s);
        }
        let falls_through = !matches!(
            instr.opcode,
            opcode::GOTO | opcode::GOTO_W | opcode::TABLESWITCH | opcode::LOOKUPSWITCH | opcode::IRETURN | opcode::LRETURN | opcode::FRETURN | opcode::DRETURN | opcode::ARETURN | opcode::RETURN | opcode::ATHROW
        );
        if falls_through {
            starts.insert(instr.pc + instr.length);
        }
        succ_map.insert(instr.pc, succs);
    }

    let start_list: Vec<usize> = starts.into_iter().filter(|&pc| pc < code.len()).collect();
    let mut blocks = Vec::new();
    for (i, &start) in start_list.iter().enumerate() {
        let end = start_list.get(i + 1).copied().unwrap_or(code.len());
        let mut successors_for_block = Vec::new();
        if let Some(last_instr) = instructions.iter().rev().find(|ins| ins.pc < end && ins.pc >= start) {
            if let Some(s) = succ_map.get(&last_instr.pc) {
                successors_for_block = s.clone();
            }
        }
        blocks.push(BasicBlock { start_pc: start, end_pc: end, successors: successors_for_block });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_return_is_a_single_block() {
        let code = [opcode::ICONST_0, opcode::IRETURN];
        let blocks = build_blocks(&code, &[]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].successors, Vec::<usize>::new());
    }

    #[test]
    fn conditional_branch_splits_into_three_blocks() {
        // iconst_0; ifeq +4 (skip the next insn); iconst_1; ireturn; iconst_2; ireturn
        let code = [
            opcode::ICONST_0,
            opcode::IFEQ, 0x00, 0x05,
            opcode::ICONST_1,
            opcode::IRETURN,
            opcode::ICONST_2,
            opcode::IRETURN,
        ];
        let blocks = build_blocks(&code, &[]);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].successors.len(), 2);
    }

    #[test]
    fn exception_handler_start_is_a_block_boundary() {
        let code = [opcode::ICONST_0, opcode::POP, opcode::RETURN, opcode::ACONST_NULL, opcode::ATHROW];
        let handlers = [ExceptionHandler { start_pc: 0, end_pc: 3, handler_pc: 3 }];
        let blocks = build_blocks(&code, &handlers);
        assert!(blocks.iter().any(|b| b.start_pc == 3));
    }

    #[test]
    fn tableswitch_length_accounts_for_padding_and_entries() {
        // opcode at pc 1 so padding differs from pc 0
        let mut code = vec![opcode::NOP, opcode::TABLESWITCH];
        let pad = (4 - ((1 + 1) % 4)) % 4;
        code.extend(std::iter::repeat(0u8).take(pad));
        code.extend(0i32.to_be_bytes()); // default
        code.extend(0i32.to_be_bytes()); // low
        code.extend(1i32.to_be_bytes()); // high
        code.extend(0i32.to_be_bytes()); // offset for 0
        code.extend(0i32.to_be_bytes()); // offset for 1
        let instrs = decode_instructions(&code);
        let switch_instr = instrs.iter().find(|i| i.opcode == opcode::TABLESWITCH).unwrap();
        assert_eq!(switch_instr.pc + switch_instr.length, code.len());
    }
}
