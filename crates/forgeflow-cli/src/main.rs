use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forgeflow_agent::{DebateDecision, Engine, EngineEvent, EngineState, ReviewDecision};
use forgeflow_core::EngineConfig;
use serde_json::json;

mod collaborators;

use collaborators::{FsExecutor, FsSearchContext, InteractiveLlm, NullObserver, PrintingCheckpoint};

#[derive(Parser)]
#[command(name = "forgeflow")]
#[command(about = "Drives the forgeflow agent engine over a workspace", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent engine end-to-end against a goal.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Natural-language goal for the engine to plan and execute.
    goal: String,

    /// Workspace root the engine edits. Defaults to the current directory.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Maximum fix attempts per step before the engine gives up.
    #[arg(long)]
    max_fix_attempts: Option<u32>,

    /// Enable the multi-round review protocol after each successful step.
    #[arg(long, default_value_t = false)]
    enable_review: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_engine(args, cli.json),
    }
}

fn run_engine(args: RunArgs, json_mode: bool) -> Result<()> {
    let workspace = args
        .workspace
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("resolving workspace root")?;

    let mut config = EngineConfig::default();
    if let Some(max_fix_attempts) = args.max_fix_attempts {
        config.max_fix_attempts = max_fix_attempts;
    }
    config.enable_multi_model_review = args.enable_review;

    let mut engine = Engine::new(
        &workspace,
        config,
        Box::new(InteractiveLlm),
        Box::new(FsSearchContext::new(&workspace)),
        Box::new(FsExecutor::new(&workspace)),
        Box::new(NullObserver),
        Some(Box::new(PrintingCheckpoint::new())),
    );
    engine.on_event(Box::new(move |event| log_event(&event, json_mode)));

    engine.start(args.goal);
    let mut state = engine.run();

    loop {
        match state {
            EngineState::WaitingForReviewDecision => {
                engine.resolve_review_decision(ReviewDecision::Skip);
                state = engine.resume_from_review();
            }
            EngineState::WaitingForDebateDecision => {
                engine.resolve_debate_decision(DebateDecision::Accept);
                state = engine.resume_from_debate();
            }
            _ => break,
        }
    }

    match state {
        EngineState::Done => {
            if json_mode {
                println!("{}", json!({"status": "done", "plan_complete": engine.plan().all_done()}));
            } else {
                println!("Done. {} step(s) completed.", engine.plan().steps().len());
            }
            Ok(())
        }
        EngineState::Error => {
            let message = engine
                .last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown engine error".to_string());
            anyhow::bail!("engine stopped in Error state: {message}")
        }
        other => anyhow::bail!("engine stopped unexpectedly in {other:?} state"),
    }
}

fn log_event(event: &EngineEvent, json_mode: bool) {
    if json_mode {
        if let EngineEvent::Message(text) = event {
            println!("{}", json!({"event": "message", "text": text}));
        }
        return;
    }
    match event {
        EngineEvent::StateChanged { from, to } => eprintln!("[state] {from:?} -> {to:?}"),
        EngineEvent::PlanChanged(plan) => eprintln!("[plan] {} step(s)", plan.steps().len()),
        EngineEvent::Message(text) => eprintln!("[message] {text}"),
        EngineEvent::CheckpointCreated(id) => eprintln!("[checkpoint] {id}"),
        EngineEvent::ReviewComplete { step_id, convergence, .. } => {
            eprintln!("[review] step {step_id} converged at {:.2}", convergence.overall_score)
        }
        EngineEvent::DebateComplete { convergence, .. } => {
            eprintln!("[debate] converged at {:.2}", convergence.overall_score)
        }
        EngineEvent::SynthesisComplete(text) => eprintln!("[synthesis] {text}"),
    }
}
