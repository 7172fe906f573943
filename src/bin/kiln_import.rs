//! kiln-import: Validate and store newline-delimited clinical resources
//!
//! Usage:
//!   # Import a file into a store directory, print the summary
//!   kiln-import resources.jsonl --store ./kiln-data
//!
//!   # Dry run from stdin against an in-memory store
//!   cat resources.jsonl | kiln-import
//!
//!   # Body is a JSON array (or a single object) instead of NDJSON
//!   kiln-import bundle.json --json-array --store ./kiln-data
//!
//!   # Custom rule tables, keep the first copy of duplicate ids
//!   kiln-import data.jsonl --store ./kiln-data \
//!       --validation-rules rules.json --extraction-rules fields.json --duplicates skip

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::import::json_body_to_lines;
use kiln::{
    DirStore, DuplicatePolicy, ExtractionConfig, ImportPipeline, ImportSummary, MemoryStore,
    PipelineConfig, ValidationConfig,
};
use std::fs::File;
use std::io::{self, Read, Write};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kiln-import")]
#[command(about = "Validate and store newline-delimited clinical resources", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Store directory; an in-memory store is used when omitted
    #[arg(long, short = 's')]
    store: Option<String>,

    /// Treat the input as one JSON document (array elements become lines)
    #[arg(long)]
    json_array: bool,

    /// JSON file replacing the default validation rules
    #[arg(long)]
    validation_rules: Option<String>,

    /// JSON file replacing the default extraction fields
    #[arg(long)]
    extraction_rules: Option<String>,

    /// What to do when an id is already stored: overwrite or skip
    #[arg(long, default_value_t = DuplicatePolicy::Overwrite)]
    duplicates: DuplicatePolicy,

    /// Print the summary on a single line
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = PipelineConfig {
        duplicate_policy: args.duplicates,
        ..PipelineConfig::default()
    };
    if let Some(path) = &args.validation_rules {
        config.validation = ValidationConfig::from_json_file(path)
            .with_context(|| format!("Failed to load validation rules from {}", path))?;
    }
    if let Some(path) = &args.extraction_rules {
        config.extraction = ExtractionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load extraction rules from {}", path))?;
    }

    let mut body = read_input(args.input.as_deref())?;
    let content = if args.json_array {
        json_body_to_lines(&mut body).context("Failed to split JSON body")?
    } else {
        String::from_utf8(body).context("Input is not valid UTF-8")?
    };

    let pipeline = ImportPipeline::new(&config);
    let summary = match &args.store {
        Some(dir) => {
            let mut store =
                DirStore::open(dir).with_context(|| format!("Failed to open store {}", dir))?;
            pipeline.run(&content, &mut store)?
        }
        None => pipeline.run(&content, &mut MemoryStore::new())?,
    };

    write_summary(&summary, args.compact)
}

fn read_input(input: Option<&str>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    match input {
        Some(path) => {
            File::open(path)
                .with_context(|| format!("Failed to open {}", path))?
                .read_to_end(&mut body)?;
        }
        None => {
            io::stdin().read_to_end(&mut body)?;
        }
    }
    Ok(body)
}

fn write_summary(summary: &ImportSummary, compact: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if compact {
        serde_json::to_writer(&mut out, summary)?;
    } else {
        serde_json::to_writer_pretty(&mut out, summary)?;
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
