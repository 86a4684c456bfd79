use crate::arena::arena_error::ArenaError;
use crate::assembler::asm_error::AsmError;
use std::fmt;

/// load tier (§7.2, fatal to bot admission) and state tier (§7.4,
/// raised synchronously to the caller) of the error taxonomy, combined
/// here because both originate from `Battle`'s public operations.
#[derive(Debug, Clone)]
pub enum BattleError {
    ParseRejected(Vec<AsmError>),
    MemoryExceeded { used: usize, limit: usize },
    SegmentRejected(ArenaError),
    ProcessCapReached,
    AddedAfterStart,
    NoProcesses,
    DoubleCompletion,
}

impl fmt::Display for BattleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BattleError::ParseRejected(errs) => {
                write!(f, "bot rejected, {} parse error(s)", errs.len())
            }
            BattleError::MemoryExceeded { used, limit } => {
                write!(f, "bot memory footprint {} exceeds limit {}", used, limit)
            }
            BattleError::SegmentRejected(e) => write!(f, "bot rejected: {}", e),
            BattleError::ProcessCapReached => write!(f, "process cap reached"),
            BattleError::AddedAfterStart => write!(f, "cannot add a process after the battle started"),
            BattleError::NoProcesses => write!(f, "cannot start a battle with no processes"),
            BattleError::DoubleCompletion => write!(f, "battle already completed"),
        }
    }
}

impl std::error::Error for BattleError {}
