/*
 * Filename: /src/cpu.rs
 * Project: corewars-vm
 *
 * the interpreter: fetch-decode-execute for the currently scheduled
 * process (4.D).
 */

pub mod cpu_error;
pub mod operand;
pub mod opcodes;

use crate::arena::Arena;
use crate::process::{Process, ProcessManager, ProcessState};
use log::{info, trace};

/// result of stepping the currently running process once.
pub enum StepOutcome {
    /// nothing was running.
    Idle,
    /// one instruction executed; carries the log entry text and, if a
    /// SPL requested a child, the target address to spawn at.
    Ran {
        instruction_text: String,
        spawn_target: Option<u16>,
    },
}

/// executes exactly one instruction of the process the scheduler marks
/// as running (steps 1-7 of 4.D). returns `Idle` if nothing is running.
pub fn step(pm: &mut ProcessManager, arena: &mut Arena, now: u64) -> StepOutcome {
    let pid = match pm.get_running().map(|p| p.id) {
        Some(pid) => pid,
        None => return StepOutcome::Idle,
    };

    {
        let process = pm.get(pid).unwrap();
        if process.state != ProcessState::Running {
            return StepOutcome::Idle;
        }
    }

    arena.set_current_process(Some(pid));

    let pc = pm.get(pid).unwrap().registers.pc;
    let opcode = arena.read(pc as usize);
    let size = opcodes::instruction_size(opcode);
    let b1 = if size >= 2 { arena.read(pc.wrapping_add(1) as usize) } else { 0 };
    let b2 = if size >= 3 { arena.read(pc.wrapping_add(2) as usize) } else { 0 };

    let (handler, mnemonic) = match opcodes::find_handler(opcode) {
        Some(h) => h,
        None => {
            let _ = opcodes::unknown_opcode(opcode);
            advance_pc(pm, pid, pc, size);
            arena.set_current_process(None);
            return StepOutcome::Ran {
                instruction_text: format!("{:#06x}: db {:#04x} (unknown)", pc, opcode),
                spawn_target: None,
            };
        }
    };

    let text = format!("{:#06x}: {}", pc, mnemonic);
    let result = {
        let process = pm.get_mut(pid).unwrap();
        handler(process, arena, b1, b2, pc)
    };

    arena.set_current_process(None);

    let outcome = match result {
        Ok(effect) => {
            if let Some(reason) = &effect.terminate {
                pm.terminate(pid, reason, now);
            } else if let Some(target) = effect.pc_override {
                pm.get_mut(pid).unwrap().registers.pc = target;
            } else {
                advance_pc(pm, pid, pc, size);
            }
            StepOutcome::Ran {
                instruction_text: text,
                spawn_target: effect.spawn_target,
            }
        }
        Err(e) => {
            trace!("step error: {}", e);
            pm.terminate(pid, &e.reason(), now);
            StepOutcome::Ran {
                instruction_text: text,
                spawn_target: None,
            }
        }
    };

    if let Some(p) = pm.get_mut(pid) {
        p.cycles_used_total += 1;
        if p.state == ProcessState::Terminated {
            info!("process {} terminated", pid);
        }
    }

    outcome
}

fn advance_pc(pm: &mut ProcessManager, pid: crate::arena::ProcessId, pc: u16, size: u8) {
    if let Some(p) = pm.get_mut(pid) {
        p.registers.pc = pc.wrapping_add(size as u16);
    }
}

/// formats a process's current registers for logging/debug output.
pub fn debug_out_registers(p: &Process) {
    println!("\t{}, cycles={}", p.registers, p.cycles_used_total);
}
