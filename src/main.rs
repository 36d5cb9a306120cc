use std::fs;

use anyhow::Context;
use clap::Parser;

use tomasim::{BranchTargetMode, SimConfig, SimState, Simulator};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    pub program_filename: String,

    #[arg(short, long, default_value_t = 1024)]
    pub memory_words: usize,

    #[arg(long, value_enum, default_value_t = BranchTargetMode::WordAligned)]
    pub branch_target_mode: BranchTargetMode,

    #[arg(short, long, default_value_t = false)]
    pub trace: bool,

    #[arg(long, default_value_t = 100_000)]
    pub max_cycles: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let text = fs::read_to_string(&args.program_filename)
        .with_context(|| format!("cannot read {}", args.program_filename))?;

    let mut simulator = Simulator::new(SimConfig {
        memory_words: args.memory_words,
        branch_target_mode: args.branch_target_mode,
    });
    simulator.load_program(&text)?;

    loop {
        let state = simulator.tick();
        if args.trace {
            for event in simulator.events() {
                println!("[c{}] {}", simulator.stats().cycle, event);
            }
        }
        if state == SimState::Halted || simulator.stats().cycle >= args.max_cycles {
            break;
        }
    }

    let snapshot = simulator.snapshot();
    if let Some(error) = &snapshot.error {
        println!("simulation fault: {error}");
    }
    println!("{}", simulator.stats());
    Ok(())
}
