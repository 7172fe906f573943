//! kiln-query: Read stored resources back out of a store directory
//!
//! Usage:
//!   # List extracted fields of every Observation
//!   kiln-query --store ./kiln-data --resource-type Observation
//!
//!   # Only some fields, for one patient
//!   kiln-query --store ./kiln-data --subject PT-001 --fields id,status,effectiveDateTime
//!
//!   # One raw resource by id
//!   kiln-query --store ./kiln-data --id obs-1 --fields code.coding[0].code
//!
//!   # Apply transformation rules to the matching raw resources
//!   kiln-query --store ./kiln-data --resource-type Observation --rules rules.json

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::project::parse_field_list;
use kiln::query::{get_record, list_records, transform_records};
use kiln::{DirStore, ResourceFilter, TransformEngine};
use serde::Serialize;
use std::io::{self, Write};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kiln-query")]
#[command(about = "Query resources stored by kiln-import", long_about = None)]
struct Args {
    /// Store directory written by kiln-import
    #[arg(long, short = 's')]
    store: String,

    /// Fetch a single resource by id (raw record)
    #[arg(long, conflicts_with_all = ["resource_type", "subject", "rules"])]
    id: Option<String>,

    /// Only resources of this type
    #[arg(long)]
    resource_type: Option<String>,

    /// Only resources for this subject ("Patient/PT-001" or "PT-001")
    #[arg(long)]
    subject: Option<String>,

    /// Comma-separated field paths to keep
    #[arg(long, conflicts_with = "rules")]
    fields: Option<String>,

    /// JSON file with transformation rules
    #[arg(long)]
    rules: Option<String>,

    /// Print output on a single line
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let store = DirStore::open(&args.store)
        .with_context(|| format!("Failed to open store {}", args.store))?;
    let fields = args.fields.as_deref().map(parse_field_list);

    if let Some(id) = &args.id {
        let record = get_record(&store, id, fields.as_deref())?;
        return write_json(&record, args.compact);
    }

    let filter = ResourceFilter {
        resource_type: args.resource_type,
        subject: args.subject,
    };

    let records = match &args.rules {
        Some(path) => {
            let rules = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read rules from {}", path))?;
            let engine = TransformEngine::from_json_str(&rules)
                .with_context(|| format!("Invalid rules in {}", path))?;
            transform_records(&store, &filter, &engine)
        }
        None => list_records(&store, &filter, fields.as_deref()),
    };
    write_json(&records, args.compact)
}

fn write_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if compact {
        serde_json::to_writer(&mut out, value)?;
    } else {
        serde_json::to_writer_pretty(&mut out, value)?;
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
