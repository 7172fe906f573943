//! kiln-analytics: Data-quality report for a store directory
//!
//! Usage:
//!   kiln-analytics --store ./kiln-data
//!   kiln-analytics --store ./kiln-data --recent 20 --top 10 --compact

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::{AnalyticsAggregator, DirStore, ExtractionConfig, PipelineConfig};
use std::io::{self, Write};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kiln-analytics")]
#[command(about = "Summarize what a kiln store holds", long_about = None)]
struct Args {
    /// Store directory written by kiln-import
    #[arg(long, short = 's')]
    store: String,

    /// JSON file replacing the default extraction fields
    #[arg(long)]
    extraction_rules: Option<String>,

    /// Number of recent import runs in the validation-error summary (default: 10)
    #[arg(long)]
    recent: Option<usize>,

    /// Length of the missing-field ranking (default: 5)
    #[arg(long)]
    top: Option<usize>,

    /// Print the report on a single line
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = PipelineConfig::default();
    if let Some(path) = &args.extraction_rules {
        config.extraction = ExtractionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load extraction rules from {}", path))?;
    }
    if let Some(recent) = args.recent {
        config.recent_log_window = recent;
    }
    if let Some(top) = args.top {
        config.missing_fields_top_n = top;
    }

    let store = DirStore::open(&args.store)
        .with_context(|| format!("Failed to open store {}", args.store))?;
    let report = AnalyticsAggregator::new(&config).summarize(&store);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.compact {
        serde_json::to_writer(&mut out, &report)?;
    } else {
        serde_json::to_writer_pretty(&mut out, &report)?;
    }
    writeln!(out)?;
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("kiln=info".parse()?))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
    Ok(())
}
