use crate::arena::ProcessId;

/// an execution log entry (§3). bounded by `max_log_entries`, oldest
/// trimmed first.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub wall_timestamp: u64,
    pub process_id: ProcessId,
    pub instruction_text: String,
    pub pc_at_fetch: u16,
}

/// the explicit hook interface (REDESIGN FLAGS) replacing runtime
/// monkey-patching of the interpreter. implement to observe every
/// instruction without touching dispatch internals.
pub trait BattleHooks {
    fn on_before_execution(&mut self, _pid: ProcessId) {}
    fn on_after_execution(&mut self, _pid: ProcessId) {}
}

/// a no-op default, used when the caller has nothing to observe.
pub struct NullHooks;

impl BattleHooks for NullHooks {}
