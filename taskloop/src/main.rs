//! Goal-driven task orchestration CLI.
//!
//! `taskloop run --goal "..."` plans the goal with the configured oracle,
//! executes tasks with the configured executor, and refines until the oracle
//! declares the goal complete. State is checkpointed to the configured state
//! file so an interrupted run resumes where it stopped.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use taskloop::core::knowledge::ContextPolicy;
use taskloop::engine::{Collaborators, Engine, EngineOptions, Seed};
use taskloop::exit_codes;
use taskloop::io::completion::ResultFileSink;
use taskloop::io::config::{DEFAULT_CONFIG_FILE, EngineConfig, load_config, write_config};
use taskloop::io::executor::CommandExecutor;
use taskloop::io::operator::ConsoleOperator;
use taskloop::io::oracle::CommandOracle;
use taskloop::io::state_store::{PersistedState, StateLoad, load_state};
use taskloop::logging;
use taskloop::looping::{LoopConfig, LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "taskloop",
    version,
    about = "Goal-driven task orchestration around a language-model oracle"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `taskloop.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Plan and work toward a goal until it is complete.
    Run(RunArgs),
    /// Summarize a persisted state file.
    Status {
        #[arg(long)]
        state: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
struct RunArgs {
    /// The goal, in natural language.
    #[arg(short, long)]
    goal: String,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Persist state here (overrides `state_path`).
    #[arg(long)]
    state: Option<PathBuf>,
    /// Allow the oracle to schedule tasks that were already attempted.
    #[arg(long)]
    repeat: bool,
    /// Run tasks without asking for confirmation.
    #[arg(short, long)]
    yes: bool,
    /// Show the executor only the larger of stored info and final result.
    #[arg(long)]
    smart_combine: bool,
    /// Leave the completed-task ledger out of task prompts.
    #[arg(long)]
    no_completed_tasks: bool,
    #[arg(long)]
    max_cycles: Option<u32>,
}

impl RunArgs {
    fn apply_to(&self, config: &mut EngineConfig) {
        if let Some(state) = &self.state {
            config.state_path = Some(state.clone());
        }
        if self.repeat {
            config.allow_repeat_tasks = true;
        }
        if self.yes {
            config.confirm_tasks = false;
        }
        if self.smart_combine {
            config.context.policy = ContextPolicy::Larger;
        }
        if self.no_completed_tasks {
            config.context.include_completed_tasks = false;
        }
        if let Some(max_cycles) = self.max_cycles {
            config.max_cycles = max_cycles;
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run(args) => cmd_run(&args),
        Command::Status { state } => cmd_status(&state),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &EngineConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let mut config = load_config(&args.config)?;
    args.apply_to(&mut config);
    config.validate()?;

    let oracle = CommandOracle::new(&config.oracle);
    let executor = CommandExecutor::new(&config.executor);
    let operator = ConsoleOperator;
    let sink = ResultFileSink::new(&config.results_dir);
    let mut engine = Engine::new(
        args.goal.clone(),
        config.tools.clone(),
        Collaborators {
            oracle: &oracle,
            operator: &operator,
            sink: &sink,
        },
        EngineOptions::from_config(&config),
        Seed::default(),
    )?;

    let loop_config = LoopConfig {
        max_cycles: config.max_cycles,
        confirm_tasks: config.confirm_tasks,
    };
    let outcome = run_loop(&mut engine, &executor, &loop_config, |event| {
        debug!(?event, "loop event");
    })?;

    let code = match &outcome.stop {
        LoopStop::Complete => {
            println!(
                "goal complete after {} cycle(s); result written to {}",
                outcome.cycles,
                sink.path_for(engine.goal()).display()
            );
            exit_codes::OK
        }
        LoopStop::PlanningFailed { error } => {
            eprintln!("planning failed: {error}");
            exit_codes::PLANNING_FAILED
        }
        LoopStop::CycleLimit { max_cycles } => {
            eprintln!(
                "stopped after {max_cycles} cycle(s) with {} task(s) pending",
                engine.queue().len()
            );
            exit_codes::CYCLE_LIMIT
        }
    };
    Ok(code)
}

fn cmd_status(path: &Path) -> Result<i32> {
    match load_state(path) {
        StateLoad::Loaded(state) => {
            print!("{}", render_status(path, &state));
            Ok(exit_codes::OK)
        }
        StateLoad::Missing => {
            println!("no state at {}", path.display());
            Ok(exit_codes::OK)
        }
        StateLoad::Unreadable { reason } => {
            eprintln!("cannot read state {}: {reason}", path.display());
            Ok(exit_codes::INVALID)
        }
    }
}

fn render_status(path: &Path, state: &PersistedState) -> String {
    let mut out = format!("state: {}\n", path.display());
    out.push_str(&format!("pending tasks: {}\n", state.current_tasks.len()));
    for (i, task) in state.current_tasks.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, task));
    }
    out.push_str(&format!("completed tasks: {}\n", state.completed_tasks.len()));
    for task in state.completed_tasks.keys() {
        out.push_str(&format!("  - {task}\n"));
    }
    out.push_str(&format!("stored_info keys: {}\n", join_keys(state.stored_info.keys())));
    out.push_str(&format!("final_result keys: {}\n", join_keys(state.final_result.keys())));
    out
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    let keys: Vec<&str> = keys.map(String::as_str).collect();
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.join(", ")
    }
}
