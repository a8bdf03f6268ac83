use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use deckforge::{load_question_set, open_cache, run_pipeline, Config, RunRepository};

#[derive(Parser)]
#[command(name = "deckforge", version, about = "Multi-provider flashcard generation pipeline")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "deckforge.toml", global = true)]
    config: PathBuf,

    /// Verbose logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a generation run over a question set
    Run {
        /// Question set file (JSON or TOML)
        #[arg(short, long)]
        questions: PathBuf,

        /// Subject recorded on the run
        #[arg(short, long)]
        subject: String,

        /// Card type to generate: basic or mcq
        #[arg(long, default_value = "basic")]
        card_type: String,

        /// Free-form label recorded on the run
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// List recorded runs
    Runs,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print entry and hit counts
    Stats,
    /// Remove every cached response
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    deckforge_utils::logging::init(cli.verbose);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "deckforge failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Run {
            questions,
            subject,
            card_type,
            label,
        } => {
            let question_set = load_question_set(&questions)
                .with_context(|| format!("loading {}", questions.display()))?;

            let outcome = run_pipeline(
                &config,
                &question_set,
                &subject,
                &card_type,
                label.as_deref(),
            )
            .await?;

            println!(
                "run {} {}: {}/{} items succeeded, {} failed",
                outcome.run.id,
                outcome.run.status.as_str(),
                outcome.run.successful,
                outcome.run.total,
                outcome.run.failed,
            );
            println!("artifacts written to {}", config.archive.dir);
        }

        Command::Cache { command } => {
            let Some(cache) = open_cache(&config)? else {
                println!("cache is disabled in {}", cli.config.display());
                return Ok(());
            };
            match command {
                CacheCommand::Stats => {
                    let stats = cache.stats();
                    println!(
                        "{} entries, {} total hits ({})",
                        stats.total_entries, stats.total_hits, config.cache.dir
                    );
                }
                CacheCommand::Clear => {
                    let removed = cache.clear();
                    println!("removed {removed} cached responses");
                }
            }
        }

        Command::Runs => {
            let repo = RunRepository::open(&config.runs.dir)?;
            let runs = repo.list();
            if runs.is_empty() {
                println!("no runs recorded in {}", config.runs.dir);
            }
            for run in runs {
                println!(
                    "{}  {:<9}  {}  {}/{} ok, {} failed",
                    run.id,
                    run.status.as_str(),
                    run.subject,
                    run.successful,
                    run.total,
                    run.failed,
                );
            }
        }
    }
    Ok(())
}
