use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod aggregate;
mod config;
mod db;
mod detect;
mod error;
mod export;
mod ingest;
mod models;
mod pipeline;
mod report;
mod synth;
mod trend;
mod validate;

use config::{AppConfig, FileConfig};
use models::PipelineOutput;

#[derive(Parser)]
#[command(name = "dropoff-tracker")]
#[command(about = "Season quality trends and drop-off detection for TV series", long_about = None)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write synthetic episode fixtures to the sample directory
    GenerateSample {
        #[arg(long, default_value_t = synth::DEFAULT_SEED)]
        seed: u64,
    },
    /// Compute season KPIs, drop-off seasons and durability
    Run {
        #[arg(long)]
        sample: bool,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Print show results as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run QA checks over the episode table and the output tables
    Validate {
        #[arg(long)]
        sample: bool,
        /// Directory holding the output tables, as passed to `run --out-dir`
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        sample: bool,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Run the pipeline and store the results in Postgres
    Publish {
        #[arg(long)]
        sample: bool,
    },
    /// List recently published runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("failed to initialize logging")?;

    let cli = Cli::parse();
    let file_config = cli.config.as_deref().map(FileConfig::load).transpose()?;
    let config = AppConfig::resolve(file_config);

    match cli.command {
        Commands::GenerateSample { seed } => {
            let episodes = synth::generate(&config.show_ids(), seed)?;
            let path = config.sample_dir.join(ingest::EPISODES_FILE);
            export::write_episodes(&path, &episodes)?;
            println!("Generated {} synthetic episodes in {}.", episodes.len(), path.display());
        }
        Commands::Run {
            sample,
            out_dir,
            json,
        } => {
            let (_, output) = load_and_run(&config, sample)?;
            let out_dir = config.output_dir_or(out_dir);
            let paths = export::write_tables(&out_dir, &output)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&output.results)?);
            } else {
                print_summary(&config, &output);
                println!("Exported {} tables to {}.", paths.len(), out_dir.display());
            }
        }
        Commands::Validate { sample, out_dir } => {
            let out_dir = config.output_dir_or(out_dir);
            let runner = validate::validate(
                config.input_dir(sample),
                &out_dir,
                &config.show_ids(),
                sample,
            );
            println!("{}", runner.render());
            if runner.failures() > 0 {
                bail!("{} validation check(s) failed", runner.failures());
            }
            println!("Validation: all checks passed.");
        }
        Commands::Report { sample, out } => {
            let (_, output) = load_and_run(&config, sample)?;
            let report = report::build_report(&config, &output);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Publish { sample } => {
            let (episode_count, output) = load_and_run(&config, sample)?;
            let pool = connect().await?;
            let run_id =
                db::publish_run(&pool, config.baseline_policy, episode_count, &output).await?;
            println!(
                "Published run {run_id} with {} seasons across {} shows.",
                output.trends.len(),
                output.results.len()
            );
        }
        Commands::Runs { limit } => {
            let pool = connect().await?;
            let runs = db::fetch_recent_runs(&pool, limit).await?;

            if runs.is_empty() {
                println!("No runs published yet.");
                return Ok(());
            }

            println!("Recent runs:");
            for run in runs {
                println!(
                    "- {} at {} ({}, {} episodes): {} shows, {} drop-offs",
                    run.run_id,
                    run.created_at.format("%Y-%m-%d %H:%M"),
                    run.baseline_policy,
                    run.episode_count,
                    run.show_count,
                    run.break_count
                );
            }
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set for database commands")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_and_run(config: &AppConfig, sample: bool) -> anyhow::Result<(usize, PipelineOutput)> {
    let path = config.input_dir(sample).join(ingest::EPISODES_FILE);
    let show_ids = config.show_ids();
    let (episodes, _) = ingest::load_episodes(&path, &show_ids)?;

    info!(
        episodes = episodes.len(),
        shows = show_ids.len(),
        policy = config.baseline_policy.as_str(),
        "running pipeline"
    );
    let output = pipeline::run_pipeline(&episodes, &show_ids, config.baseline_policy)
        .context("episode table violates the engine contract")?;
    Ok((episodes.len(), output))
}

fn print_summary(config: &AppConfig, output: &PipelineOutput) {
    println!("Drop-off results:");
    for result in &output.results {
        let title = config.title(&result.show_id);
        let verdict = match (result.status, result.break_season) {
            (models::ShowStatus::InsufficientData, _) => "insufficient data".to_string(),
            (_, Some(season)) => format!("drop-off at season {season}"),
            (_, None) => "no drop-off detected".to_string(),
        };
        let durability = result
            .durability
            .map(|d| format!("{d} of {} seasons above average", result.season_count))
            .unwrap_or_else(|| format!("{} seasons", result.season_count));
        println!("- {title}: {verdict}; {durability}");
    }
    for show_id in &output.missing_shows {
        println!("- {}: no episodes found", config.title(show_id));
    }
}
