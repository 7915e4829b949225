//! Typed error taxonomy for the codegen core and its CLI driver.

use thiserror::Error;

/// Fatal conditions raised by the class-file writer, opcode emitter or code
/// builder. Soft verifier warnings are *not* represented here; they accumulate
/// on [`crate::classfile::code_builder::Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("unresolved jump to label {label:?} in method {method}")]
    UnresolvedJump { method: String, label: String },

    #[error("branch offset {offset} out of range at pc {pc} in method {method}")]
    BranchOffsetOutOfRange { method: String, pc: usize, offset: i64 },

    #[error("literal out of range for opcode in method {method}: {detail}")]
    InvalidLiteral { method: String, detail: String },

    #[error("switch case keys not sorted in method {method}")]
    UnsortedSwitchKeys { method: String },

    #[error("duplicate switch case key {key} in method {method}")]
    DuplicateSwitchKey { method: String, key: i32 },

    #[error("malformed type descriptor: {0}")]
    MalformedDescriptor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the CLI driver; wraps [`CodegenError`] plus
/// input-handling failures specific to the binary.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no input files given")]
    NoInputFiles,

    #[error("input path does not exist: {0}")]
    BadPath(String),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}
