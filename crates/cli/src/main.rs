use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{
    classification_json, classification_lines, failure_message, history_lines, summary_banner,
    summary_json,
};
use compliance_core::config::{self, AppConfig};
use compliance_core::pipeline;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ai-act-check")]
#[command(about = "EU AI Act risk classification and compliance scoring", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk the regulation text and store it in the vector index
    IndexAct {
        /// PDF or text file holding the regulation
        path: PathBuf,
        /// Clear the namespace before indexing
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Assign a risk tier to the documented system
    Classify {
        /// Directory of system documentation
        #[arg(long)]
        docs: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Heuristics and overrides only
        #[arg(long, default_value_t = false)]
        no_oracle: bool,
    },
    /// Classify, score every compliance category and save the result
    Analyze {
        /// Directory of system documentation
        #[arg(long)]
        docs: PathBuf,
        /// Name recorded in the result and used for the output file
        #[arg(long)]
        system_name: String,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
        /// Also write a plain-text report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Render a saved analysis as a text report
    Report {
        /// `<name>_compliance_analysis.json` written by `analyze`
        analysis: PathBuf,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List analyses recorded in the database
    History {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("{}", failure_message(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::IndexAct { path, force } => run_index(cfg, path, force).await,
        Commands::Classify {
            docs,
            json,
            no_oracle,
        } => run_classify(cfg, docs, json, !no_oracle).await,
        Commands::Analyze {
            docs,
            system_name,
            json,
            report,
        } => run_analyze(cfg, docs, system_name, json, report).await,
        Commands::Report { analysis, out } => run_report(analysis, out),
        Commands::History { json } => run_history(cfg, json).await,
    }
}

async fn run_index(cfg: AppConfig, path: PathBuf, force: bool) -> Result<()> {
    let stored = pipeline::index_regulation(&cfg, &path, force).await?;
    println!(
        "indexed {} chunks from {} into namespace {}",
        stored,
        path.display(),
        cfg.analysis.namespace
    );
    Ok(())
}

async fn run_classify(cfg: AppConfig, docs: PathBuf, json: bool, use_oracle: bool) -> Result<()> {
    let result = pipeline::run_classification(&cfg, &docs, use_oracle).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&classification_json(&result))?);
    } else {
        for line in classification_lines(&result) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_analyze(
    cfg: AppConfig,
    docs: PathBuf,
    system_name: String,
    json: bool,
    report: Option<PathBuf>,
) -> Result<()> {
    let outcome = pipeline::run_analysis(&cfg, &docs, &system_name).await?;
    if let Some(out) = &report {
        pipeline::write_report(&outcome.result, out)?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&outcome))?);
    } else {
        println!("{}", summary_banner(&outcome));
        if let Some(out) = &report {
            println!("Report:        {}", out.display());
        }
    }
    Ok(())
}

fn run_report(analysis: PathBuf, out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(out) => {
            let result = pipeline::load_saved_analysis(&analysis)?;
            pipeline::write_report(&result, &out)?;
            println!("report written to {}", out.display());
        }
        None => print!("{}", pipeline::render_saved_report(&analysis)?),
    }
    Ok(())
}

async fn run_history(cfg: AppConfig, json: bool) -> Result<()> {
    let rows = pipeline::history(&cfg).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for line in history_lines(&rows) {
            println!("{line}");
        }
    }
    Ok(())
}
