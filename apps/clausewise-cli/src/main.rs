//! `clausewise`: ingest plain-text contracts and run risk, QA or summary
//! tasks over them. Results are printed as JSON on stdout; logs go to stderr.

mod inputs;
mod wiring;

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use clausewise_core::config::Config;
use clausewise_core::loader::PlainTextLoader;
use clausewise_core::traits::DocumentLoader;
use clausewise_core::types::{FragmentCounts, TaskType};
use clausewise_llm::BackendStats;
use clausewise_orchestrator::{AgentResponse, TaskFailure};

#[derive(Parser)]
#[command(name = "clausewise")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hybrid retrieval and task routing over legal contracts")]
struct Cli {
    /// Extra TOML settings file, layered over config.toml in the working directory
    #[arg(long, global = true, value_parser = inputs::parse_path)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk and index contracts, printing fragment counts
    Ingest {
        /// Files or directories (walked for .txt, .text and .md files)
        #[arg(required = true, value_parser = inputs::parse_path)]
        paths: Vec<PathBuf>,
    },

    /// Ingest one contract and run a task over it
    Analyze {
        /// Contract file; pages are separated by form feeds
        #[arg(value_parser = inputs::parse_path)]
        file: PathBuf,
        /// risk_analysis, qa or summary; classified from --query when omitted
        #[arg(long)]
        task: Option<TaskType>,
        /// Question or focus for the task
        #[arg(long)]
        query: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Completed { response: AgentResponse, backend: BackendStats },
    Failed { failure: TaskFailure, backend: BackendStats },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut config = Config::load()?;
    if let Some(path) = &cli.config {
        config = config.with_file(path)?;
    }
    let settings = config.settings().context("loading configuration")?;
    let engine = wiring::build_engine(&settings).await?;
    let loader = PlainTextLoader::new();

    match cli.command {
        Commands::Ingest { paths } => {
            let files = inputs::collect_inputs(&paths);
            if files.is_empty() {
                bail!("no supported files under {:?}", paths);
            }
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
                    .progress_chars("#>-"),
            );

            let mut ingested: Vec<FragmentCounts> = Vec::new();
            let mut failed = 0usize;
            for file in &files {
                pb.set_message(file.display().to_string());
                let result = match loader.load(file) {
                    Ok(document) => engine.ingest(&document).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(counts) => ingested.push(counts),
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "skipping file");
                        failed += 1;
                    }
                }
                pb.inc(1);
            }
            pb.finish_and_clear();

            println!("{}", serde_json::to_string_pretty(&ingested)?);
            if failed > 0 {
                bail!("{} of {} files could not be ingested", failed, files.len());
            }
        }
        Commands::Analyze { file, task, query } => {
            let document = loader.load(&file).with_context(|| format!("loading {}", file.display()))?;
            engine.ingest(&document).await.with_context(|| format!("ingesting {}", file.display()))?;

            let outcome = match engine.run_task(document.id(), task, query).await {
                Ok(response) => Outcome::Completed { response, backend: engine.stats() },
                Err(failure) => Outcome::Failed { failure, backend: engine.stats() },
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let Outcome::Failed { failure, .. } = outcome {
                bail!(failure);
            }
        }
    }
    Ok(())
}
