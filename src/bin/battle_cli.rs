/*
 * Filename: /src/bin/battle_cli.rs
 * Project: corewars-vm
 *
 * thin batch driver: assembles a list of bot files, runs a battle to
 * completion, and prints a leaderboard (§6 CLI).
 */

use clap::Parser;
use corewars_vm::{Battle, BattleOptions};
use std::fs;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "battle_cli", about = "runs a Core Wars battle from .asm bot files")]
struct Args {
    #[arg(long)]
    max_turns: Option<u32>,

    #[arg(long)]
    max_cycles: Option<u32>,

    #[arg(short, long)]
    verbose: bool,

    bots: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    corewars_vm::utils::init_logging(args.verbose);

    if args.bots.is_empty() {
        eprintln!("no bot files given");
        return ExitCode::FAILURE;
    }

    let mut options = BattleOptions::default();
    if let Some(t) = args.max_turns {
        options.max_turns = t;
    }
    if let Some(c) = args.max_cycles {
        options.max_cycles_per_turn = c;
    }

    let mut battle = Battle::new("cli-battle", options);

    for path in &args.bots {
        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}: {}", path, e);
                return ExitCode::FAILURE;
            }
        };
        match battle.load_bot(&source, path) {
            Ok(r) => {
                if args.verbose {
                    println!("loaded {} as pid {} at {:#06x}", r.name, r.pid, r.entry_point);
                }
            }
            Err(e) => {
                eprintln!("{}: {}", path, e);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = battle.start() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    loop {
        let still_running = battle.next_turn();
        if args.verbose {
            let state = battle.get_state();
            println!("-- turn {} --", state.turn);
            print_leaderboard(state.scores.iter().map(|&(pid, s)| (pid, s)));
        }
        if !still_running {
            break;
        }
    }

    let results = battle.get_results();
    println!("turns: {}", results.turns);
    println!("winner: {:?}", results.winner);
    print_leaderboard(results.scores.iter().map(|(&pid, &s)| (pid, s)));

    ExitCode::SUCCESS
}

fn print_leaderboard(scores: impl Iterator<Item = (corewars_vm::arena::ProcessId, u64)>) {
    let mut scores: Vec<_> = scores.collect();
    scores.sort_by_key(|&(_, s)| std::cmp::Reverse(s));
    for (pid, score) in scores {
        println!("  pid {}: score {}", pid, score);
    }
}
