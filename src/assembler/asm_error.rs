use serde::Serialize;
use std::fmt;

/// parse tier of the error taxonomy (§7.1): accumulated, never fatal to
/// assembly itself — a non-empty list causes the loader to refuse the
/// bot (§4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AsmErrorKind {
    InvalidInstruction,
    InvalidOperand,
    InvalidImmediate,
    InvalidDirective,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsmErrorKind::InvalidInstruction => "Invalid instruction",
            AsmErrorKind::InvalidOperand => "Invalid operand",
            AsmErrorKind::InvalidImmediate => "Invalid immediate",
            AsmErrorKind::InvalidDirective => "Invalid directive",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    pub line: usize,
    pub text: String,
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}: {}", self.kind, self.line, self.text)
    }
}

impl std::error::Error for AsmError {}
