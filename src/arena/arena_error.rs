use std::fmt;

/// load-tier failures for the arena (§7 tier 2). access itself never
/// fails — see [`super::Arena::read`]/[`super::Arena::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaErrorKind {
    SegmentTooLarge,
}

impl fmt::Display for ArenaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaErrorKind::SegmentTooLarge => write!(f, "segment too large"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaError {
    pub kind: ArenaErrorKind,
    pub msg: String,
}

impl ArenaError {
    pub fn new(kind: ArenaErrorKind, msg: impl Into<String>) -> Self {
        ArenaError {
            kind,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena error ({}): {}", self.kind, self.msg)
    }
}

impl std::error::Error for ArenaError {}
