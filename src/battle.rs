/*
 * Filename: /src/battle.rs
 * Project: corewars-vm
 *
 * owns the turn loop: loads bots, advances turns, detects victory,
 * produces scored results (4.E).
 */

pub mod battle_error;
pub mod clock;
pub mod events;
pub mod options;
pub mod state;

use crate::arena::{Arena, ProcessId};
use crate::assembler;
use crate::cpu;
use crate::process::{CreateOptions, ProcessManager, ProcessState};
use battle_error::BattleError;
use clock::{Clock, SystemClock};
use events::{BattleHooks, LogEntry, NullHooks};
use log::info;
use options::BattleOptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use state::{BattleState, BattleStatus, SerializedLogEntry};
use std::collections::HashMap;

pub struct BotLoadResult {
    pub pid: ProcessId,
    pub name: String,
    pub entry_point: u16,
    pub memory_used: usize,
}

#[derive(Debug, Clone)]
pub struct Results {
    pub winner: Option<ProcessId>,
    pub scores: HashMap<ProcessId, u64>,
    pub duration_ms: u64,
    pub turns: u32,
}

struct BotInfo {
    name: String,
    entry_point: u16,
    sp_top: u16,
}

/// the battle controller (4.E).
pub struct Battle {
    id: String,
    options: BattleOptions,
    arena: Arena,
    pm: ProcessManager,
    status: BattleStatus,
    turn: u32,
    scores: HashMap<ProcessId, u64>,
    log: Vec<LogEntry>,
    winner: Option<ProcessId>,
    start_time: Option<u64>,
    end_time: Option<u64>,
    clock: Box<dyn Clock>,
    rng: StdRng,
    bots: HashMap<ProcessId, BotInfo>,
    hooks: Box<dyn BattleHooks>,
}

impl Battle {
    pub fn new(id: impl Into<String>, options: BattleOptions) -> Self {
        Battle {
            id: id.into(),
            arena: Arena::new(options.memory_size, options.max_log_entries),
            pm: ProcessManager::new(options.max_processes, options.round_robin),
            status: BattleStatus::Pending,
            turn: 0,
            scores: HashMap::new(),
            log: Vec::new(),
            winner: None,
            start_time: None,
            end_time: None,
            clock: Box::new(SystemClock),
            rng: StdRng::seed_from_u64(options.placement_seed),
            bots: HashMap::new(),
            hooks: Box::new(NullHooks),
            options,
        }
    }

    /// injects a deterministic clock (REDESIGN FLAGS), for tests.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn BattleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// assembles `source`, picks a pseudo-random placement base in
    /// `[0, 0.8*N)` seeded by `placement_seed`, relocates, and admits
    /// the bot as a new process (§4.B relocation, §1 determinism).
    pub fn load_bot(&mut self, source: &str, owner: &str) -> Result<BotLoadResult, BattleError> {
        if !matches!(self.status, BattleStatus::Pending) {
            return Err(BattleError::AddedAfterStart);
        }
        let limit = ((self.options.memory_size as f64) * 0.8) as u32;
        let base = if limit == 0 { 0 } else { self.rng.gen_range(0..limit) as i32 };

        let assembled = assembler::assemble_and_relocate(source, base);
        if !assembled.errors.is_empty() {
            return Err(BattleError::ParseRejected(assembled.errors));
        }

        let memory_used: usize = assembled.segments.iter().map(|s| s.data.len()).sum();
        if memory_used > self.options.max_memory_per_process {
            return Err(BattleError::MemoryExceeded {
                used: memory_used,
                limit: self.options.max_memory_per_process,
            });
        }

        let name = assembled
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| format!("bot{}", self.pm.count() + 1));

        let create_opts = CreateOptions {
            priority: 0,
            quantum: 10,
            sp_top: (self.options.memory_size.saturating_sub(1)) as u16,
            entry_point: assembled.entry_point,
        };
        let pid = self
            .pm
            .create(owner, &name, create_opts, self.now())
            .ok_or(BattleError::ProcessCapReached)?;

        for segment in &assembled.segments {
            if let Err(e) = self.arena.load_segment(segment, pid) {
                let now = self.now();
                self.pm.terminate(pid, "segment rejected", now);
                return Err(BattleError::SegmentRejected(e));
            }
        }
        if let Some(p) = self.pm.get_mut(pid) {
            p.memory_footprint_bytes = memory_used;
            p.owned_segment_ids = vec![pid];
        }
        self.scores.insert(pid, 0);
        self.bots.insert(
            pid,
            BotInfo {
                name: name.clone(),
                entry_point: create_opts.entry_point,
                sp_top: create_opts.sp_top,
            },
        );

        Ok(BotLoadResult {
            pid,
            name,
            entry_point: assembled.entry_point,
            memory_used,
        })
    }

    pub fn start(&mut self) -> Result<(), BattleError> {
        if self.pm.count() == 0 {
            return Err(BattleError::NoProcesses);
        }
        if !matches!(self.status, BattleStatus::Pending | BattleStatus::Paused) {
            return Err(BattleError::DoubleCompletion);
        }
        self.status = BattleStatus::Running;
        if self.start_time.is_none() {
            self.start_time = Some(self.now());
        }
        // bring every Ready-eligible process into the scheduler's Ready
        // pool; `create` already leaves them Ready.
        info!("battle {} started with {} processes", self.id, self.pm.count());
        Ok(())
    }

    pub fn pause(&mut self) {
        if matches!(self.status, BattleStatus::Running) {
            self.status = BattleStatus::Paused;
        }
    }

    /// rearms every loaded bot to its original entry point and sp, so the
    /// battle can be run again from turn 0 (process table and arena
    /// contents are otherwise left as the previous run ended them).
    pub fn reset(&mut self) {
        self.turn = 0;
        self.status = BattleStatus::Pending;
        self.winner = None;
        self.start_time = None;
        self.end_time = None;
        self.log.clear();
        self.arena.clear_access_log();
        for (&pid, info) in self.bots.iter() {
            self.pm.reset(pid, info.sp_top, info.entry_point);
            self.scores.insert(pid, 0);
        }
    }

    /// §5 wall-clock/cycle budget: once either limit is exceeded, the
    /// battle concludes by score rather than waiting for a survivor.
    fn budget_exceeded(&self) -> bool {
        if let Some(limit) = self.options.cycle_limit {
            let total: u64 = self.pm.all().map(|p| p.cycles_used_total).sum();
            if total >= limit {
                return true;
            }
        }
        if let Some(limit) = self.options.time_limit_ms {
            if let Some(start) = self.start_time {
                if self.now().saturating_sub(start) >= limit {
                    return true;
                }
            }
        }
        false
    }

    fn pick_score_winner(&self) -> Option<ProcessId> {
        self.scores.iter().max_by_key(|(_, &score)| score).map(|(&pid, _)| pid)
    }

    /// per-turn algorithm (4.E).
    pub fn next_turn(&mut self) -> bool {
        if !matches!(self.status, BattleStatus::Running) || self.turn >= self.options.max_turns {
            self.conclude();
            return false;
        }
        if self.budget_exceeded() {
            self.winner = self.pick_score_winner();
            self.conclude();
            return false;
        }
        if self.pm.active_count() == 0 {
            self.conclude();
            return false;
        }

        let active_count = self.pm.active_count();
        let mut cycles_this_turn: u32 = 0;
        let mut ran: std::collections::HashSet<ProcessId> = std::collections::HashSet::new();

        loop {
            let now = self.now();
            let pid = match self.pm.schedule(now) {
                Some(pid) => pid,
                None => break,
            };

            self.hooks.on_before_execution(pid);
            let outcome = cpu::step(&mut self.pm, &mut self.arena, now);
            if let cpu::StepOutcome::Ran {
                instruction_text,
                spawn_target,
            } = outcome
            {
                let pc_at_fetch = self.pm.get(pid).map(|p| p.registers.pc).unwrap_or(0);
                self.push_log(LogEntry {
                    wall_timestamp: now,
                    process_id: pid,
                    instruction_text,
                    pc_at_fetch,
                });
                *self.scores.entry(pid).or_insert(0) += 1;
                ran.insert(pid);
                if let Some(target) = spawn_target {
                    self.spawn_child(pid, target, now);
                }
            }
            self.hooks.on_after_execution(pid);
            cycles_this_turn += 1;

            if cycles_this_turn >= self.options.max_cycles_per_turn {
                break;
            }
            let ran_covers_active = self
                .pm
                .all()
                .filter(|p| p.state != ProcessState::Terminated)
                .all(|p| ran.contains(&p.id));
            if cycles_this_turn >= active_count as u32 * self.options.min_cycles_per_process
                && ran_covers_active
            {
                break;
            }
        }

        self.turn += 1;
        if self.check_victory() {
            self.conclude();
            return false;
        }
        true
    }

    fn spawn_child(&mut self, parent: ProcessId, target: u16, now: u64) {
        if self.pm.active_count() >= self.options.max_processes {
            info!("spl from {} dropped, process cap reached", parent);
            return;
        }
        let parent_sp = self.pm.get(parent).map(|p| p.registers.sp).unwrap_or(0);
        let owner = self.pm.get(parent).map(|p| p.owner.clone()).unwrap_or_default();
        let name = self.bots.get(&parent).map(|b| b.name.clone()).unwrap_or_default();
        let create_opts = CreateOptions {
            priority: 0,
            quantum: 10,
            sp_top: parent_sp,
            entry_point: target,
        };
        if let Some(child_pid) = self.pm.create(&owner, &format!("{}-child", name), create_opts, now) {
            if let Some(parent_proc) = self.pm.get(parent) {
                let segments = parent_proc.owned_segment_ids.clone();
                if let Some(child) = self.pm.get_mut(child_pid) {
                    child.owned_segment_ids = segments;
                }
            }
            self.scores.insert(child_pid, 0);
            self.bots.insert(
                child_pid,
                BotInfo {
                    name: format!("{}-child", name),
                    entry_point: target,
                    sp_top: parent_sp,
                },
            );
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
        if self.log.len() > self.options.max_log_entries {
            let overflow = self.log.len() - self.options.max_log_entries;
            self.log.drain(0..overflow);
        }
    }

    /// (a) one survivor, (b) zero survivors, or (c) turn >= max_turns.
    pub fn check_victory(&mut self) -> bool {
        let active: Vec<ProcessId> = self
            .pm
            .all()
            .filter(|p| p.state != ProcessState::Terminated)
            .map(|p| p.id)
            .collect();

        let concluded = active.len() <= 1 || self.turn >= self.options.max_turns;
        if !concluded {
            return false;
        }

        self.winner = if active.len() == 1 {
            Some(active[0])
        } else {
            self.pick_tiebreak_winner()
        };
        true
    }

    /// last-active-then-highest-score tiebreak (§4.E, §9 open question).
    fn pick_tiebreak_winner(&self) -> Option<ProcessId> {
        let candidates: Vec<_> = self.pm.all().collect();
        if candidates.is_empty() {
            return None;
        }
        let max_last_run = candidates.iter().map(|p| p.last_run_at).max()?;
        let most_recent: Vec<_> = candidates
            .iter()
            .filter(|p| p.last_run_at == max_last_run)
            .collect();
        most_recent
            .iter()
            .max_by_key(|p| self.scores.get(&p.id).copied().unwrap_or(0))
            .map(|p| p.id)
    }

    fn conclude(&mut self) {
        if matches!(self.status, BattleStatus::Completed) {
            return;
        }
        self.status = BattleStatus::Completed;
        self.end_time = Some(self.now());
        let now = self.now();
        let ids: Vec<ProcessId> = self.pm.all().map(|p| p.id).collect();
        for pid in ids {
            self.pm.terminate(pid, "battle concluded", now);
        }
        info!("battle {} concluded, winner={:?}", self.id, self.winner);
    }

    pub fn get_state(&self) -> BattleState {
        BattleState {
            id: self.id.clone(),
            status: self.status,
            turn: self.turn,
            max_turns: self.options.max_turns,
            process_ids: self.pm.all().map(|p| p.id).collect(),
            winner: self.winner,
            start_time: self.start_time,
            end_time: self.end_time,
            scores: self.scores.iter().map(|(&k, &v)| (k, v)).collect(),
            log: self
                .log
                .iter()
                .map(|e| SerializedLogEntry {
                    wall_timestamp: e.wall_timestamp,
                    process_id: e.process_id,
                    instruction_text: e.instruction_text.clone(),
                    pc_at_fetch: e.pc_at_fetch,
                })
                .collect(),
        }
    }

    pub fn get_results(&self) -> Results {
        Results {
            winner: self.winner,
            scores: self.scores.clone(),
            duration_ms: match (self.start_time, self.end_time) {
                (Some(s), Some(e)) => e.saturating_sub(s),
                _ => 0,
            },
            turns: self.turn,
        }
    }

    pub fn save_state(&self) -> Result<String, serde_json::Error> {
        self.get_state().to_json()
    }

    /// restores every BattleState field; the caller must ensure the
    /// ProcessManager's tables still contain the referenced processes.
    pub fn load_state(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let state = BattleState::from_json(json)?;
        self.turn = state.turn;
        self.status = state.status;
        self.winner = state.winner;
        self.start_time = state.start_time;
        self.end_time = state.end_time;
        self.scores = state.scores.into_iter().collect();
        self.log = state
            .log
            .into_iter()
            .map(|e| LogEntry {
                wall_timestamp: e.wall_timestamp,
                process_id: e.process_id,
                instruction_text: e.instruction_text,
                pc_at_fetch: e.pc_at_fetch,
            })
            .collect();
        Ok(())
    }

    /// runs turns until conclusion or an optional turn cap.
    pub fn run(&mut self, turn_cap: Option<u32>) -> Result<Results, BattleError> {
        self.start()?;
        loop {
            if let Some(cap) = turn_cap {
                if self.turn >= cap {
                    break;
                }
            }
            if !self.next_turn() {
                break;
            }
        }
        Ok(self.get_results())
    }

    pub fn memory_snapshot(&self, start: usize, len: usize) -> Vec<u8> {
        self.arena.snapshot_range(start, len)
    }

    pub fn access_log(&self) -> &[crate::arena::AccessRecord] {
        self.arena.get_access_log()
    }

    pub fn process_ids(&self) -> Vec<ProcessId> {
        self.pm.all().map(|p| p.id).collect()
    }

    pub fn registers_of(&self, pid: ProcessId) -> Option<crate::process::Registers> {
        self.pm.get(pid).map(|p| p.registers)
    }

    pub fn disassemble_log_window(&self, n: usize) -> Vec<String> {
        self.log
            .iter()
            .rev()
            .take(n)
            .map(|e| e.instruction_text.clone())
            .collect()
    }

    pub fn core_dump(&self) -> Option<crate::arena::CoreDump> {
        if self.options.core_dump {
            Some(self.arena.core_dump())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(memory_size: usize) -> BattleOptions {
        BattleOptions {
            memory_size,
            max_turns: 100,
            max_cycles_per_turn: 10,
            min_cycles_per_process: 5,
            round_robin: true,
            placement_seed: 1,
            ..Default::default()
        }
    }

    #[test]
    fn s1_nop_trail() {
        let mut b = Battle::new("s1", opts(1024));
        let r = b.load_bot("start:\nnop\nnop\nhalt\n", "p1").unwrap();
        let results = b.run(None).unwrap();
        assert_eq!(results.winner, Some(r.pid));
        assert_eq!(*results.scores.get(&r.pid).unwrap(), 3);
    }

    #[test]
    fn b5_zero_processes_refuses_start() {
        let mut b = Battle::new("b5", opts(1024));
        assert!(matches!(b.start(), Err(BattleError::NoProcesses)));
    }

    #[test]
    fn b5_one_process_terminates_on_first_victory_check() {
        let mut b = Battle::new("b5b", opts(1024));
        b.load_bot("start:\nhalt\n", "p1").unwrap();
        let results = b.run(None).unwrap();
        assert!(results.winner.is_some());
    }

    #[test]
    fn s3_halt_race_last_survivor_wins() {
        let mut b = Battle::new("s3", opts(1024));
        let a = b.load_bot("start:\nnop\nhalt\n", "a").unwrap();
        let bb = b.load_bot("start:\nnop\nnop\nhalt\n", "b").unwrap();
        let results = b.run(None).unwrap();
        assert_eq!(results.winner, Some(bb.pid));
        assert_eq!(*results.scores.get(&a.pid).unwrap(), 2);
        assert_eq!(*results.scores.get(&bb.pid).unwrap(), 3);
    }

    #[test]
    fn reset_rearms_processes_so_the_battle_can_replay() {
        let mut b = Battle::new("replay", opts(1024));
        let r = b.load_bot("start:\nnop\nnop\nhalt\n", "solo").unwrap();
        let first = b.run(None).unwrap();
        assert_eq!(first.winner, Some(r.pid));

        b.reset();
        let second = b.run(None).unwrap();
        assert_eq!(second.winner, Some(r.pid));
        assert_eq!(*second.scores.get(&r.pid).unwrap(), 3);
    }

    #[test]
    fn cycle_limit_concludes_by_score_before_a_survivor_emerges() {
        // with quantum == max_cycles_per_turn, each turn is monopolized by
        // a single looper, so after one turn A has outscored still-idle B.
        let mut options = opts(1024);
        options.cycle_limit = Some(5);
        let mut b = Battle::new("budget", options);
        let a = b.load_bot("start:\njmp start\n", "a").unwrap();
        let _b = b.load_bot("start:\njmp start\n", "b").unwrap();
        let results = b.run(None).unwrap();
        assert_eq!(results.winner, Some(a.pid));
        assert_eq!(results.turns, 1);
    }

    #[test]
    fn time_limit_concludes_by_score_once_wall_clock_is_exceeded() {
        use clock::FakeClock;
        use std::rc::Rc;

        let mut options = opts(1024);
        options.time_limit_ms = Some(1000);
        let clock = Rc::new(FakeClock::new(0));
        let mut b = Battle::new("budget-time", options).with_clock(Box::new(clock.clone()));
        let looper = b.load_bot("start:\njmp start\n", "looper").unwrap();
        b.start().unwrap();
        clock.advance(2000);
        let still_running = b.next_turn();
        assert!(!still_running);
        assert_eq!(b.get_results().winner, Some(looper.pid));
    }
}
