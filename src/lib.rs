// Library exports for rpgraph

pub mod aggregation;
pub mod builder;
pub mod command;
pub mod csv_reader;
pub mod data;
pub mod derive;
pub mod error;
pub mod field;
pub mod filter;
pub mod graph;
pub mod ir;
pub mod metadata;
pub mod parser;
pub mod request;
pub mod runtime;
pub mod transform;

pub use aggregation::Aggregation;
pub use builder::{BuilderState, PlotBuilder};
pub use command::Command;
pub use data::{ColumnId, Table, Value};
pub use error::{EngineError, ErrorKind};
pub use field::Field;
pub use filter::{FilterGroup, FilterValue, Operator};
pub use ir::{AxisKind, ChartPayload, PlotKind};
pub use request::ChartRequest;
pub use transform::Pipeline;

use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
    /// The chart payload itself, for an external renderer
    #[serde(rename = "json")]
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "svg" => Ok(OutputFormat::Svg),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow::anyhow!("Unknown output format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default, rename = "type")]
    pub format: OutputFormat,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            format: OutputFormat::Png,
        }
    }
}
