// Runtime glue: load events, build a chart and render it

use crate::builder::PlotBuilder;
use crate::command::Command;
use crate::csv_reader;
use crate::data::Table;
use crate::graph::Canvas;
use crate::ir::ChartPayload;
use crate::parser;
use crate::request::ChartRequest;
use crate::{OutputFormat, RenderOptions};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Where the chart's commands come from
#[derive(Debug, Clone)]
pub enum ChartSource {
    /// Pipe DSL text
    Dsl(String),
    /// A dashboard chart request
    Request(ChartRequest),
}

impl ChartSource {
    pub fn commands(&self) -> Result<Vec<Command>> {
        match self {
            ChartSource::Dsl(dsl) => parser::parse_commands(dsl),
            ChartSource::Request(request) => {
                request.compile().context("Failed to compile chart request")
            }
        }
    }
}

/// Load a chart request from a JSON file
pub fn load_request(path: &Path) -> Result<ChartRequest> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open request file {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse request file {}", path.display()))
}

/// Load the event table. `.json` files hold an array of event objects;
/// anything else is read as CSV. Without a path, CSV comes from stdin.
pub fn load_table(path: Option<&Path>) -> Result<Table> {
    let Some(path) = path else {
        return csv_reader::read_events_from_stdin();
    };

    let file = File::open(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;
    let reader = BufReader::new(file);

    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let table = if is_json {
        let value: serde_json::Value = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON input {}", path.display()))?;
        Table::from_json(&value)?
    } else {
        csv_reader::read_events(reader)
            .with_context(|| format!("Failed to read CSV input {}", path.display()))?
    };

    debug!(path = %path.display(), rows = table.len(), "loaded events");
    Ok(table)
}

/// Queue the commands on a fresh builder and replay them into a chart
pub fn build_chart(table: Table, commands: Vec<Command>) -> Result<ChartPayload> {
    let mut builder = PlotBuilder::new(table);
    builder.extend(commands);
    builder.build().context("Failed to build chart")?;
    Ok(builder.into_chart()?)
}

/// Serialise a chart in the requested output format
pub fn render_chart(chart: &ChartPayload, options: &RenderOptions) -> Result<Vec<u8>> {
    info!(format = ?options.format, width = options.width, height = options.height, "rendering chart");
    match options.format {
        OutputFormat::Json => {
            serde_json::to_vec_pretty(chart).context("Failed to serialise chart payload")
        }
        OutputFormat::Png => Canvas::new(options.width, options.height).render_png(chart),
        OutputFormat::Svg => Canvas::new(options.width, options.height)
            .render_svg(chart)
            .map(String::into_bytes),
    }
}

/// Full run: table plus command source to rendered bytes
pub fn run(table: Table, source: &ChartSource, options: &RenderOptions) -> Result<Vec<u8>> {
    let commands = source.commands()?;
    let chart = build_chart(table, commands)?;
    render_chart(&chart, options)
}
