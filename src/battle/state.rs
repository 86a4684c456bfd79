use crate::arena::ProcessId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleStatus {
    Pending,
    Running,
    Paused,
    Completed,
}

/// (§3 "Battle state"). `scores` is linearised as `[pid, score]` pairs
/// since mappings are not natively round-trippable in most serial
/// formats (§4.E, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleState {
    pub id: String,
    pub status: BattleStatus,
    pub turn: u32,
    pub max_turns: u32,
    pub process_ids: Vec<ProcessId>,
    pub winner: Option<ProcessId>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub scores: Vec<(ProcessId, u64)>,
    pub log: Vec<SerializedLogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLogEntry {
    pub wall_timestamp: u64,
    pub process_id: ProcessId,
    pub instruction_text: String,
    pub pc_at_fetch: u16,
}

impl BattleState {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn score_of(&self, pid: ProcessId) -> u64 {
        self.scores
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, s)| *s)
            .unwrap_or(0)
    }
}
