use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use postmill_common::{Config, SourceContent};
use postmill_engine::llm::{self, LlmGenerator, LlmJudge};
use postmill_engine::{
    CandidateValidator, ContextMixer, Judge, Orchestrator, PersonaPolicy, PersonaSet, RunExporter,
};

#[derive(Parser)]
#[command(name = "postmill", about = "Generate, filter and judge short-form posts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline on a source JSON file and export the result
    Run {
        /// JSON file with at least `title` and `summary`
        #[arg(long)]
        source: PathBuf,
        /// Number of parallel generation workers (default: POSTMILL_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
        /// Seed making persona assignment and every context reproducible
        #[arg(long)]
        seed: Option<u64>,
        /// Use one persona for every worker
        #[arg(long)]
        persona: Option<String>,
        /// Export directory (default: POSTMILL_OUTPUT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate a text file against the writing rules
    Check { file: PathBuf },
    /// Print the creativity context a persona and seed produce
    Context {
        #[arg(long)]
        persona: String,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the writing rules as given to the models
    Rules,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("postmill=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let validator = CandidateValidator::new().load_extra_words(&config.banned_words_file())?;

    match cli.command {
        Command::Run {
            source,
            workers,
            seed,
            persona,
            out,
        } => {
            config.log_redacted();
            let source = load_source(&source)?;
            let run_dir = run(&config, validator, source, workers, seed, persona, out).await?;
            println!("\nSaved to {}", run_dir.display());
        }
        Command::Check { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let outcome = validator.validate(&text);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_valid {
                std::process::exit(1);
            }
        }
        Command::Context { persona, seed } => {
            let personas = PersonaSet::load(&config.personas_file())?;
            personas.require(&persona)?;
            let mixer = ContextMixer::from_files(&config.creativity_file(), &config.examples_dir())?;
            let ctx = mixer.generate(&persona, seed);
            println!("{}", serde_json::to_string_pretty(&ctx)?);
        }
        Command::Rules => {
            print!("{}", validator.rules_for_prompt());
        }
    }

    Ok(())
}

fn load_source(path: &Path) -> Result<SourceContent> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source {}", path.display()))?;
    let source: SourceContent = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse source {}", path.display()))?;
    Ok(source)
}

async fn run(
    config: &Config,
    validator: CandidateValidator,
    source: SourceContent,
    workers: Option<usize>,
    seed: Option<u64>,
    persona: Option<String>,
    out: Option<PathBuf>,
) -> Result<PathBuf> {
    let personas = PersonaSet::load(&config.personas_file())?;
    let mixer = ContextMixer::from_files(&config.creativity_file(), &config.examples_dir())?;
    let rules = validator.rules_for_prompt();

    let generator = LlmGenerator::new(
        llm::text_model(config, &config.generator_model)?,
        personas.clone(),
        rules.clone(),
    );
    let judge = Judge::new(
        Arc::new(LlmJudge::new(llm::text_model(config, &config.judge_model)?)),
        rules,
    );

    let mut orchestrator = Orchestrator::new(mixer, validator, personas, Arc::new(generator), judge)
        .with_variants(config.variants_min, config.variants_max)
        .with_worker_timeout(config.worker_timeout);
    if let Some(seed) = seed {
        orchestrator = orchestrator.with_seed(seed);
    }

    let policy = persona.map_or(PersonaPolicy::Balanced, PersonaPolicy::Fixed);
    let workers = workers.unwrap_or(config.num_workers);
    info!(workers, policy = ?policy, title = source.title.as_str(), "Starting run");

    let run = orchestrator.run(&source, workers, &policy).await?;

    println!("{}", run.stats);
    println!("=== Winner ({}) ===\n", run.judgment.winner.persona_id);
    println!("{}", run.judgment.winner.content);
    println!(
        "\nScore: {:.1}/10{}",
        run.judgment.winner_score.weighted_total,
        if run.judgment.fallback { " (fallback)" } else { "" }
    );

    let out = out.unwrap_or_else(|| config.output_dir.clone());
    RunExporter::new(out).save(&run)
}
