use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use xref_adapters::ExtractionMode;
use xref_sync::{
    render_inspection, render_table, report, write_report, ReconcileConfig, ReconcileOptions,
    Reconciler, RunContext,
};

#[derive(Debug, Parser)]
#[command(name = "xref")]
#[command(about = "Cross-reference Linear issues against their GitHub mirrors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile every issue in a team and report status mismatches.
    All {
        /// Team key, name, or id.
        #[arg(long)]
        group: String,
        /// Stop after this many issues.
        #[arg(long)]
        limit: Option<usize>,
        /// Include rows whose statuses already agree.
        #[arg(long)]
        show_all: bool,
        /// Scan titles and descriptions too, not just the first attachment.
        #[arg(long)]
        all_links: bool,
        /// Write a markdown report, or JSON when the path ends in .json.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the worker pool size.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Show every GitHub link in one issue and resolve each of them.
    One {
        /// Issue identifier, e.g. TEAM-123.
        identifier: String,
    },
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut ctx = RunContext::new(ReconcileConfig::from_env()?)?;
    if let Commands::All {
        workers: Some(workers),
        ..
    } = &cli.command
    {
        ctx = ctx.with_workers(*workers);
    }
    let reconciler = Reconciler::from_context(ctx)?;

    match cli.command {
        Commands::All {
            group,
            limit,
            show_all,
            all_links,
            output,
            workers: _,
        } => {
            let options = ReconcileOptions {
                group,
                limit,
                show_all,
                mode: if all_links {
                    ExtractionMode::All
                } else {
                    ExtractionMode::FirstAttachment
                },
            };
            let report = reconciler.run(&options).await?;

            println!("{}", render_table(&report.rows));
            println!();
            println!("{}", report::render_summary(&report.summary));
            if !report.diagnostics.is_empty() {
                println!();
                println!("Diagnostics:");
                println!("{}", report::render_diagnostics(&report.diagnostics));
            }

            if let Some(path) = output {
                write_report(&report, &path).await?;
                info!(path = %path.display(), "report written");
            }
        }
        Commands::One { identifier } => {
            let inspection = reconciler.inspect_record(&identifier).await?;
            println!("{}", render_inspection(&inspection));
        }
    }

    Ok(())
}
