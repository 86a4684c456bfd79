use std::fmt;

/// runtime tier of the error taxonomy (§7.3): terminates the offending
/// process, never the battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecErrorKind {
    InvalidOpcode,
    StackUnderflow,
    Generic,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecErrorKind::InvalidOpcode => "invalid opcode",
            ExecErrorKind::StackUnderflow => "stack underflow",
            ExecErrorKind::Generic => "execution error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub pc: u16,
    pub msg: Option<String>,
}

impl ExecError {
    pub fn new(kind: ExecErrorKind, pc: u16, msg: impl Into<String>) -> Self {
        ExecError {
            kind,
            pc,
            msg: Some(msg.into()),
        }
    }

    /// text used as the process's termination reason.
    pub fn reason(&self) -> String {
        match &self.msg {
            Some(m) => format!("execution error: {} at pc={:#06x}: {}", self.kind, self.pc, m),
            None => format!("execution error: {} at pc={:#06x}", self.kind, self.pc),
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl std::error::Error for ExecError {}
