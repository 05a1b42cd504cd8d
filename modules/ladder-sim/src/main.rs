use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ladder_common::MethodologySpec;
use ladder_engine::{SignalPool, TurnPipeline};
use ladder_sim::{load_methodology, load_transcript, replay, JsonLinesSink, ScriptedAnalysis};

#[derive(Parser)]
#[command(name = "ladder-sim", about = "Replay scripted interviews through the ladder decision engine")]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a transcript and write one decision record per turn
    Run {
        /// Path to methodology TOML file
        #[arg(long, env = "LADDER_METHODOLOGY", default_value = "./methodologies/means_end_chain.toml")]
        methodology: PathBuf,

        /// Path to transcript JSON file
        #[arg(long, env = "LADDER_TRANSCRIPT")]
        transcript: PathBuf,

        /// Decision log path (JSON lines); stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON schema of methodology files
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("ladder=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Command::Run {
            methodology,
            transcript,
            output,
        } => run(methodology, transcript, output).await,
        Command::Schema => {
            let schema = schemars::schema_for!(MethodologySpec);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

async fn run(methodology: PathBuf, transcript: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let transcript = load_transcript(&transcript)?;
    let analysis = ScriptedAnalysis::from_transcript(&transcript);
    tracing::info!(
        topic = %transcript.topic,
        turns = transcript.turns.len(),
        scripted = analysis.scripted_count(),
        "Transcript loaded"
    );

    let pool = SignalPool::standard(Arc::new(analysis)).context("Failed to build signal pool")?;
    let methodology = load_methodology(&methodology, pool.catalog())?;
    tracing::info!(
        methodology = methodology.name(),
        description = methodology.description(),
        strategies = methodology.strategies().len(),
        "Methodology loaded"
    );

    let mut pipeline = TurnPipeline::new(Arc::new(methodology), pool);

    let sink = match &output {
        Some(path) => JsonLinesSink::create(path)?,
        None => JsonLinesSink::stdout(),
    };

    let summary = replay(&mut pipeline, &transcript, &sink).await?;
    sink.flush()?;

    tracing::info!(
        turns = summary.turns,
        strategies = ?summary.strategy_counts,
        final_phase = ?summary.final_phase,
        "Done"
    );
    Ok(())
}
