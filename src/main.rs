use anyhow::{Context, Result};
use clap::Parser;
use rpgraph::runtime::{self, ChartSource};
use rpgraph::{OutputFormat, RenderOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rpgraph")]
#[command(about = "Chart roleplay chat activity from an event table", long_about = None)]
struct Args {
    /// Pipe DSL string (e.g. 'author | count | sum | bar | ylog')
    #[arg(required_unless_present = "request", conflicts_with = "request")]
    dsl: Option<String>,

    /// JSON chart request to compile instead of a DSL string
    #[arg(long)]
    request: Option<PathBuf>,

    /// Event table: CSV, or a .json array of events (default: CSV on stdin)
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Render options as JSON, e.g. '{"width": 1024, "type": "svg"}'
    #[arg(long)]
    options: Option<String>,

    /// Output format (png, svg or json); overrides the options' type
    #[arg(long, short)]
    format: Option<OutputFormat>,

    /// Log level filter
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the chart
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let mut options: RenderOptions = match &args.options {
        Some(json) => serde_json::from_str(json).context("Failed to parse render options")?,
        None => RenderOptions::default(),
    };
    if let Some(format) = args.format {
        options.format = format;
    }

    let source = match (&args.dsl, &args.request) {
        (_, Some(path)) => ChartSource::Request(runtime::load_request(path)?),
        (Some(dsl), None) => ChartSource::Dsl(dsl.clone()),
        (None, None) => anyhow::bail!("Either a DSL string or --request is required"),
    };

    let table = runtime::load_table(args.input.as_deref()).context("Failed to load events")?;
    let bytes = runtime::run(table, &source, &options).context("Failed to render chart")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(&bytes)
        .context("Failed to write chart to stdout")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}
