//! storyloom command line.
//!
//! Run a saved episode against Claude and write the resulting episode,
//! transcripts and summary to disk:
//!
//! ```bash
//! cargo run -p storyloom -- run demos/network_anomaly.json --max-turns 6
//! ```
//!
//! Inspect who can know which claims in a saved episode:
//!
//! ```bash
//! cargo run -p storyloom -- claims runs/corp_espionage_001_episode.json
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyloom_core::persist::{load_episode, save_artifacts};
use storyloom_core::{ClaudeGenerator, Episode, GeneratorConfig, SimulationConfig, Simulator, NARRATOR};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "storyloom", version, about = "Multi-character narrative simulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Simulate an episode against Claude")]
    Run {
        #[arg(help = "Episode JSON document")]
        episode: PathBuf,
        #[arg(long, default_value_t = 10, help = "Highest turn number to play")]
        max_turns: u32,
        #[arg(long, value_delimiter = ',', help = "Speaking order, e.g. alice,bob")]
        order: Option<Vec<String>>,
        #[arg(long, default_value = "runs", help = "Directory for run artifacts")]
        out: PathBuf,
        #[arg(long, help = "Claude model to use")]
        model: Option<String>,
        #[arg(long, help = "Only log warnings and errors")]
        quiet: bool,
    },
    #[command(about = "Show claim visibility for a saved episode")]
    Claims {
        #[arg(help = "Episode JSON document")]
        episode: PathBuf,
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let quiet = matches!(cli.command, Commands::Run { quiet: true, .. });
    init_logging(quiet);

    match cli.command {
        Commands::Run {
            episode,
            max_turns,
            order,
            out,
            model,
            ..
        } => run(&episode, max_turns, order, &out, model).await,
        Commands::Claims { episode, json } => claims(&episode, json).await,
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(
    path: &Path,
    max_turns: u32,
    order: Option<Vec<String>>,
    out: &Path,
    model: Option<String>,
) -> anyhow::Result<()> {
    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        bail!(
            "ANTHROPIC_API_KEY environment variable not set. \
             Set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here"
        );
    }

    let episode = load_episode(path)
        .await
        .with_context(|| format!("failed to load episode from {}", path.display()))?;

    let mut generator_config = GeneratorConfig::default();
    if let Some(model) = model {
        generator_config = generator_config.with_model(model);
    }
    let generator = ClaudeGenerator::from_env()?.with_config(generator_config);

    let mut simulator = Simulator::new(Arc::new(generator))
        .with_config(SimulationConfig::new().with_max_turns(max_turns));
    let result = simulator.run(episode, order).await?;

    println!("{}", result.dialogue_transcript);
    println!();
    println!("{}", serde_json::to_string_pretty(&result.summary)?);

    let paths = save_artifacts(out, &result)
        .await
        .with_context(|| format!("failed to write artifacts to {}", out.display()))?;
    info!(episode = %paths.episode.display(), "episode saved");
    println!("\nArtifacts:");
    for artifact in [&paths.episode, &paths.dialogue, &paths.detailed, &paths.summary] {
        println!("  {}", artifact.display());
    }

    Ok(())
}

async fn claims(path: &Path, json: bool) -> anyhow::Result<()> {
    let episode = load_episode(path)
        .await
        .with_context(|| format!("failed to load episode from {}", path.display()))?;
    let report = episode.claim_ledger.visibility_report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== CLAIMS: {} ===", episode.title);
    println!("Total claims: {}", episode.claim_ledger.len());

    println!("\nOnly the {NARRATOR} knows:");
    print_claims(&episode, &report.narrator_only);

    for character in &episode.characters {
        println!("\n{} can know:", character.char_id);
        let visible = report
            .by_viewer
            .get(&character.char_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        print_claims(&episode, visible);
    }

    Ok(())
}

fn print_claims(episode: &Episode, ids: &[storyloom_core::ClaimId]) {
    if ids.is_empty() {
        println!("  (nothing)");
        return;
    }
    for id in ids {
        if let Some(claim) = episode.claim_ledger.get(id) {
            let truth = if claim.truth_value { "" } else { " [false]" };
            println!(
                "  {} (turn {}, {}){truth}: {}",
                claim.claim_id, claim.introduced_in_turn, claim.claim_type, claim.text
            );
        }
    }
}
