//! CLI for the icehunt compiler fuzzer.
//!
//! Two engines, one binary:
//!
//! ```bash
//! # Grow grammar trees against an instrumented compiler
//! icehunt grammar --compiler "cc1plus -quiet -O3 - -o -.s" --rules cxx.rules
//!
//! # Mutate valid programs and check the compiled output
//! icehunt valid --compiler "g++ -x c++ -std=c++14 -O3 -S - -o prog.s" \
//!               --assemble "g++ prog.s -o prog" --binary ./prog
//! ```
//!
//! Both run until a defect is found or they are interrupted; the
//! reproducer path is printed to stdout.

use clap::{Parser, Subcommand};
use icehunt_exec::SandboxConfig;
use icehunt_explore::{
    format_report, Defect, ExploreError, GrammarConfig, GrammarEngine, SessionStats, ValidConfig,
    ValidEngine,
};
use icehunt_grammar::MutationTable;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "icehunt")]
#[command(about = "Coverage-guided fuzzer hunting compiler defects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grow textual programs from a grammar, guided by coverage.
    Grammar {
        /// Compiler command line; source arrives on stdin.
        #[arg(short, long)]
        compiler: String,

        /// Rules file with grammar productions (default: built-in C++).
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Random seed for reproducibility.
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Priority-queue capacity.
        #[arg(short = 'q', long, default_value = "750")]
        queue_capacity: usize,

        /// Restart after this many executions without new coverage.
        #[arg(long, default_value = "500")]
        restart_interval: u32,

        /// Compile timeout in milliseconds.
        #[arg(short, long, default_value = "500")]
        timeout_ms: u64,

        /// Output directory for reproducers and checkpoints.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Mutate valid programs; any observable change is a defect.
    Valid {
        /// Compiler command line; must leave an assemblable artifact.
        #[arg(short, long)]
        compiler: String,

        /// Assembler/linker command for the artifact.
        #[arg(short, long, default_value = "g++ prog.s -o prog")]
        assemble: String,

        /// The binary the assemble step produces.
        #[arg(short, long, default_value = "./prog")]
        binary: PathBuf,

        /// Random seed for reproducibility.
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Compile timeout in milliseconds.
        #[arg(short, long, default_value = "10000")]
        timeout_ms: u64,

        /// Output directory for reproducers.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Grammar {
            compiler,
            rules,
            seed,
            queue_capacity,
            restart_interval,
            timeout_ms,
            output,
        } => cmd_grammar(
            compiler,
            rules,
            seed,
            queue_capacity,
            restart_interval,
            timeout_ms,
            output,
        ),
        Commands::Valid {
            compiler,
            assemble,
            binary,
            seed,
            timeout_ms,
            output,
        } => cmd_valid(compiler, assemble, binary, seed, timeout_ms, output),
    };

    match result {
        Ok((stats, defect)) => {
            println!("{}", format_report(&stats, Some(&defect)));
            // A defect ends the session; exit nonzero so scripts notice.
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("icehunt: {e}");
            std::process::exit(2);
        }
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

fn cmd_grammar(
    compiler: String,
    rules: Option<PathBuf>,
    seed: u64,
    queue_capacity: usize,
    restart_interval: u32,
    timeout_ms: u64,
    output: PathBuf,
) -> Result<(SessionStats, Defect), ExploreError> {
    let table = match rules {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            MutationTable::parse(&text).unwrap_or_else(|e| {
                eprintln!("icehunt: {}: {e}", path.display());
                std::process::exit(2);
            })
        }
        None => MutationTable::cxx(),
    };

    let config = GrammarConfig {
        sandbox: SandboxConfig {
            command: split_command(&compiler),
            timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        },
        seed,
        queue_capacity,
        restart_interval,
        output_dir: output,
        ..Default::default()
    };

    let mut engine = GrammarEngine::new(config, table)?;
    let defect = engine.run()?;
    Ok((engine.stats(), defect))
}

fn cmd_valid(
    compiler: String,
    assemble: String,
    binary: PathBuf,
    seed: u64,
    timeout_ms: u64,
    output: PathBuf,
) -> Result<(SessionStats, Defect), ExploreError> {
    let config = ValidConfig {
        sandbox: SandboxConfig {
            command: split_command(&compiler),
            timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        },
        assemble: split_command(&assemble),
        binary,
        seed,
        output_dir: output,
        ..Default::default()
    };

    let mut engine = ValidEngine::new(config)?;
    let defect = engine.run()?;
    Ok((engine.stats(), defect))
}
