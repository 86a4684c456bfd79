/// configuration surface for a battle (§6 Core API). all integers are
/// non-negative.
#[derive(Debug, Clone, Copy)]
pub struct BattleOptions {
    pub memory_size: usize,
    pub max_turns: u32,
    pub max_cycles_per_turn: u32,
    pub min_cycles_per_process: u32,
    pub max_memory_per_process: usize,
    pub max_log_entries: usize,
    pub max_processes: usize,
    pub cycle_limit: Option<u64>,
    pub time_limit_ms: Option<u64>,
    pub round_robin: bool,
    pub core_dump: bool,
    pub placement_seed: u64,
}

impl Default for BattleOptions {
    fn default() -> Self {
        BattleOptions {
            memory_size: 65_536,
            max_turns: 1000,
            max_cycles_per_turn: 1000,
            min_cycles_per_process: 5,
            max_memory_per_process: 8192,
            max_log_entries: 1000,
            max_processes: 32,
            cycle_limit: None,
            time_limit_ms: None,
            round_robin: true,
            core_dump: false,
            placement_seed: 0,
        }
    }
}
