//! `<clinit>` assembly with size-threshold splitting.
//!
//! Grounded on the "`<clinit>` splitting" design note in specification §9:
//! when static initializer bytecode would cumulatively overflow a
//! conservative per-method limit, the generated `<clinit>` is split into
//! private helper methods (`clinit$part0`, `clinit$part1`, …) invoked in
//! order by a thin driver `<clinit>`. No counterpart existed in the teacher
//! crate (LLVM never had to reason about a JVM 64 KiB method-body cap); this
//! is built fresh from the spec's contract, reusing `CodeBuilder` for each
//! part's body the same way the visitor builds an ordinary method.

use crate::error::CodegenError;

use super::code_builder::{BuiltMethod, CodeBuilder};
use super::constant_pool::ConstantPool;
use super::descriptor::MethodDescriptor;

/// Conservative per-method code-size threshold that triggers a new part.
/// Chosen well under the JVM's hard 65,535-byte Code.code_length cap so a
/// single closing statement never tips a part over the real limit.
pub const CLINIT_SPLIT_THRESHOLD: usize = 60_000;

/// One already-built helper part, named `clinit$part{index}`.
pub struct ClinitPart {
    pub name: String,
    pub method: BuiltMethod,
}

/// Assembles `<clinit>` from a sequence of statement-emitting callbacks,
/// splitting onto a new `clinit$partN` helper whenever the current part's
/// code size has already crossed the threshold. Each callback receives the
/// live builder for whichever part is current at the time it runs, so
/// statements never straddle a part boundary mid-emission.
pub fn build_clinit(
    cp: &mut ConstantPool,
    class_name: &str,
    statements: &[Box<dyn Fn(&mut CodeBuilder)>],
) -> Result<(Vec<ClinitPart>, BuiltMethod), CodegenError> {
    let mut parts = Vec::new();
    let mut part_index = 0usize;
    let mut current = CodeBuilder::new(cp, format!("clinit$part{part_index}"), true, false, class_name, &MethodDescriptor(vec![], None));

    for stmt in statements {
        if current.current_pc() >= CLINIT_SPLIT_THRESHOLD {
            current.emit_return(None);
            let built = current.finish()?;
            parts.push(ClinitPart { name: format!("clinit$part{part_index}"), method: built });
            part_index += 1;
            current = CodeBuilder::new(cp, format!("clinit$part{part_index}"), true, false, class_name, &MethodDescriptor(vec![], None));
        }
        stmt(&mut current);
    }
    current.emit_return(None);
    let built = current.finish()?;
    parts.push(ClinitPart { name: format!("clinit$part{part_index}"), method: built });

    let mut driver = CodeBuilder::new(cp, "<clinit>".to_string(), true, false, class_name, &MethodDescriptor(vec![], None));
    for part in &parts {
        driver.emit_invokestatic(class_name, &part.name, &MethodDescriptor(vec![], None));
    }
    driver.emit_return(None);
    let driver_built = driver.finish()?;

    Ok((parts, driver_built))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_small_part_needs_no_split() {
        let mut cp = ConstantPool::default();
        let statements: Vec<Box<dyn Fn(&mut CodeBuilder)>> = vec![Box::new(|b: &mut CodeBuilder| {
            b.emit_constant_int(1);
            b.emit_pop();
        })];
        let (parts, driver) = build_clinit(&mut cp, "Demo", &statements).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "clinit$part0");
        assert!(driver.code.size() > 0);
    }

    #[test]
    fn several_statements_stay_in_one_part_under_threshold() {
        let mut cp = ConstantPool::default();
        let statements: Vec<Box<dyn Fn(&mut CodeBuilder)>> = (0..5)
            .map(|i| Box::new(move |b: &mut CodeBuilder| {
                b.emit_constant_int(i);
                b.emit_pop();
            }) as Box<dyn Fn(&mut CodeBuilder)>)
            .collect();
        let (parts, _driver) = build_clinit(&mut cp, "Demo", &statements).unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn driver_invokes_each_part_in_order() {
        let mut cp = ConstantPool::default();
        let statements: Vec<Box<dyn Fn(&mut CodeBuilder)>> = vec![Box::new(|b: &mut CodeBuilder| {
            b.emit_constant_int(7);
            b.emit_pop();
        })];
        let (parts, driver) = build_clinit(&mut cp, "Demo", &statements).unwrap();
        assert_eq!(parts.len(), 1);
        assert!(driver.code.bytes().contains(&super::super::opcode::INVOKESTATIC));
    }
}
