/*
 * Filename: /src/process.rs
 * Project: corewars-vm
 */

use crate::arena::ProcessId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// per-process register file (4.C): r0..r3, sp, pc, flags, each a 16-bit
/// word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub r0: u16,
    pub r1: u16,
    pub r2: u16,
    pub r3: u16,
    pub sp: u16,
    pub pc: u16,
    pub flags: u16,
}

impl Registers {
    pub fn new(sp_top: u16, entry_point: u16) -> Self {
        Registers {
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            sp: sp_top,
            pc: entry_point,
            flags: 0,
        }
    }

    pub fn get(&self, idx: u8) -> u16 {
        match idx & 0b11 {
            0 => self.r0,
            1 => self.r1,
            2 => self.r2,
            _ => self.r3,
        }
    }

    pub fn set(&mut self, idx: u8, value: u16) {
        match idx & 0b11 {
            0 => self.r0 = value,
            1 => self.r1 = value,
            2 => self.r2 = value,
            _ => self.r3 = value,
        }
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r0={:#06x} r1={:#06x} r2={:#06x} r3={:#06x} sp={:#06x} pc={:#06x} flags={:#06x}",
            self.r0, self.r1, self.r2, self.r3, self.sp, self.pc, self.flags
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked => "blocked",
            ProcessState::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub owner: String,
    pub priority: u8,
    pub quantum: u32,
    pub cycles_used_total: u64,
    pub cycles_in_quantum: u32,
    pub memory_footprint_bytes: usize,
    pub created_at: u64,
    pub last_run_at: u64,
    pub state: ProcessState,
    pub registers: Registers,
    pub owned_segment_ids: Vec<u32>,
    pub current_instruction_text: String,
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    pub priority: u8,
    pub quantum: u32,
    pub sp_top: u16,
    pub entry_point: u16,
}

/// owns the process table, allocates pids, schedules execution (4.C).
pub struct ProcessManager {
    processes: HashMap<ProcessId, Process>,
    order: Vec<ProcessId>,
    next_id: ProcessId,
    running: Option<ProcessId>,
    last_scheduled_in_class: HashMap<u8, ProcessId>,
    pub max_processes: usize,
    pub round_robin: bool,
}

impl ProcessManager {
    pub fn new(max_processes: usize, round_robin: bool) -> Self {
        ProcessManager {
            processes: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
            running: None,
            last_scheduled_in_class: HashMap::new(),
            max_processes,
            round_robin,
        }
    }

    pub fn count(&self) -> usize {
        self.processes.len()
    }

    pub fn create(&mut self, owner: &str, name: &str, options: CreateOptions, now: u64) -> Option<ProcessId> {
        if self.processes.len() >= self.max_processes {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let process = Process {
            id,
            name: name.to_string(),
            owner: owner.to_string(),
            priority: options.priority,
            quantum: options.quantum,
            cycles_used_total: 0,
            cycles_in_quantum: 0,
            memory_footprint_bytes: 0,
            created_at: now,
            last_run_at: now,
            state: ProcessState::Ready,
            registers: Registers::new(options.sp_top, options.entry_point),
            owned_segment_ids: Vec::new(),
            current_instruction_text: String::new(),
            termination_reason: None,
        };
        self.processes.insert(id, process);
        self.order.push(id);
        Some(id)
    }

    /// rearms a process for a fresh run: register file back to its
    /// starting `sp_top`/`entry_point`, cycle counters zeroed, state
    /// back to `Ready`, termination cleared.
    pub fn reset(&mut self, pid: ProcessId, sp_top: u16, entry_point: u16) {
        if let Some(p) = self.processes.get_mut(&pid) {
            p.registers = Registers::new(sp_top, entry_point);
            p.cycles_in_quantum = 0;
            p.cycles_used_total = 0;
            p.state = ProcessState::Ready;
            p.termination_reason = None;
        }
        if self.running == Some(pid) {
            self.running = None;
        }
    }

    /// idempotent: calling terminate on an already-terminated process is
    /// a no-op beyond refreshing last_run_at/reason (P4: absorbing state).
    pub fn terminate(&mut self, pid: ProcessId, reason: &str, now: u64) {
        if let Some(p) = self.processes.get_mut(&pid) {
            if p.state == ProcessState::Terminated {
                return;
            }
            p.state = ProcessState::Terminated;
            p.last_run_at = now;
            p.termination_reason = Some(reason.to_string());
            p.owned_segment_ids.clear();
            p.memory_footprint_bytes = 0;
            debug!("process {} terminated: {}", pid, reason);
        }
        if self.running == Some(pid) {
            self.running = None;
        }
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    pub fn get_running(&self) -> Option<&Process> {
        self.running.and_then(|pid| self.processes.get(&pid))
    }

    pub fn all(&self) -> impl Iterator<Item = &Process> {
        self.order.iter().filter_map(move |pid| self.processes.get(pid))
    }

    pub fn active_count(&self) -> usize {
        self.all().filter(|p| p.state != ProcessState::Terminated).count()
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for p in self.all() {
            match p.state {
                ProcessState::Ready => stats.ready += 1,
                ProcessState::Running => stats.running += 1,
                ProcessState::Blocked => stats.blocked += 1,
                ProcessState::Terminated => stats.terminated += 1,
            }
            stats.total_cycles += p.cycles_used_total;
        }
        stats
    }

    /// scheduling algorithm (4.C). a single running slot; priority
    /// classes round-robin within themselves when enabled.
    pub fn schedule(&mut self, now: u64) -> Option<ProcessId> {
        if let Some(running) = self.running {
            let quantum_hit = {
                let p = self.processes.get_mut(&running).unwrap();
                p.cycles_in_quantum += 1;
                p.cycles_in_quantum >= p.quantum
            };
            if quantum_hit {
                if let Some(p) = self.processes.get_mut(&running) {
                    p.cycles_in_quantum = 0;
                    if p.state == ProcessState::Running {
                        p.state = ProcessState::Ready;
                    }
                }
                self.running = None;
            } else {
                return Some(running);
            }
        }

        let chosen = self.pick_next_ready()?;
        {
            let p = self.processes.get_mut(&chosen).unwrap();
            p.state = ProcessState::Running;
            p.last_run_at = now;
            p.cycles_in_quantum = 0;
        }
        self.last_scheduled_in_class.insert(
            self.processes.get(&chosen).unwrap().priority,
            chosen,
        );
        self.running = Some(chosen);
        Some(chosen)
    }

    fn pick_next_ready(&self) -> Option<ProcessId> {
        let ready: Vec<&Process> = self
            .order
            .iter()
            .filter_map(|pid| self.processes.get(pid))
            .filter(|p| p.state == ProcessState::Ready)
            .collect();
        if ready.is_empty() {
            return None;
        }
        let max_priority = ready.iter().map(|p| p.priority).max().unwrap();
        let class: Vec<&Process> = ready.into_iter().filter(|p| p.priority == max_priority).collect();

        if !self.round_robin {
            return class.iter().map(|p| p.id).min();
        }
        if class.len() == 1 {
            return Some(class[0].id);
        }
        let ids: Vec<ProcessId> = class.iter().map(|p| p.id).collect();
        match self.last_scheduled_in_class.get(&max_priority) {
            Some(last) if ids.contains(last) => {
                let pos = ids.iter().position(|id| id == last).unwrap();
                Some(ids[(pos + 1) % ids.len()])
            }
            _ => Some(ids[0]),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub ready: usize,
    pub running: usize,
    pub blocked: usize,
    pub terminated: usize,
    pub total_cycles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CreateOptions {
        CreateOptions {
            priority: 0,
            quantum: 1,
            sp_top: 0xffff,
            entry_point: 0x100,
        }
    }

    #[test]
    fn round_robin_alternates_equal_priority() {
        let mut pm = ProcessManager::new(32, true);
        let a = pm.create("x", "a", opts(), 0).unwrap();
        let b = pm.create("x", "b", opts(), 0).unwrap();
        let first = pm.schedule(0).unwrap();
        let second = pm.schedule(1).unwrap();
        assert_ne!(first, second);
        assert!((first == a && second == b) || (first == b && second == a));
    }

    #[test]
    fn terminated_is_absorbing() {
        let mut pm = ProcessManager::new(32, true);
        let a = pm.create("x", "a", opts(), 0).unwrap();
        pm.terminate(a, "halt", 5);
        pm.terminate(a, "again", 6);
        assert_eq!(pm.get(a).unwrap().state, ProcessState::Terminated);
        assert_eq!(pm.get(a).unwrap().termination_reason.as_deref(), Some("halt"));
    }
}
