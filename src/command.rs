// Serializable command records and the single interpreter that replays them

use crate::aggregation::Aggregation;
use crate::data::ColumnId;
use crate::error::EngineError;
use crate::field::Field;
use crate::filter::FilterGroup;
use crate::ir::{AxisKind, ChartPayload, PlotKind};
use crate::transform::Pipeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

fn ascending() -> bool {
    true
}

/// One queued pipeline or chart operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    AddField {
        field: Field,
    },
    AddReactionField {
        field: Field,
        reaction: String,
    },
    Filter(FilterGroup),
    GroupBy {
        aggregation: Aggregation,
        #[serde(default)]
        field: Option<Field>,
    },
    GroupByMultiple {
        aggregations: BTreeMap<Field, Aggregation>,
    },
    ValueCounts,
    Sort {
        column: ColumnId,
        #[serde(default = "ascending")]
        ascending: bool,
    },
    Cumulative {
        field: Field,
        #[serde(default)]
        result: Option<String>,
    },
    Chart {
        kind: PlotKind,
        #[serde(default)]
        x: Option<ColumnId>,
        #[serde(default)]
        y: Option<ColumnId>,
    },
    LogScale {
        axis: AxisKind,
    },
    MovingAverage {
        window: usize,
        #[serde(default)]
        label: Option<String>,
    },
    FormatTicks,
    SetTitle {
        title: String,
    },
    SetAxisTitle {
        axis: AxisKind,
        title: String,
    },
}

/// The built chart, for mutations that need one.
fn built(chart: &mut Option<ChartPayload>) -> Result<&mut ChartPayload, EngineError> {
    chart.as_mut().ok_or(EngineError::ChartNotBuilt)
}

/// Execute one command against a pipeline and the (optional) chart.
pub fn apply(
    command: &Command,
    pipeline: &mut Pipeline,
    chart: &mut Option<ChartPayload>,
) -> Result<(), EngineError> {
    debug!(?command, "replaying");

    match command {
        Command::AddField { field } => {
            pipeline.add_field(*field)?;
        }
        Command::AddReactionField { field, reaction } => {
            pipeline.add_reaction_field(*field, reaction)?;
        }
        Command::Filter(group) => {
            let group = group.clone().post_process()?;
            pipeline.filter(group.operator, group.field, group.value)?;
        }
        Command::GroupBy { aggregation, field } => {
            pipeline.group_by(*aggregation, *field)?;
        }
        Command::GroupByMultiple { aggregations } => {
            pipeline.group_by_multiple(aggregations)?;
        }
        Command::ValueCounts => {
            pipeline.value_counts()?;
        }
        Command::Sort { column, ascending } => {
            pipeline.sort(column, *ascending)?;
        }
        Command::Cumulative { field, result } => {
            pipeline.cumulative(*field, result.clone())?;
        }
        Command::Chart { kind, x, y } => {
            if chart.is_some() {
                return Err(EngineError::ChartAlreadyBuilt);
            }
            *chart = Some(ChartPayload::construct(pipeline, *kind, x.clone(), y.clone())?);
        }
        Command::LogScale { axis } => built(chart)?.apply_log_scale(*axis),
        Command::MovingAverage { window, label } => {
            built(chart)?.add_moving_average(*window, label.clone())?
        }
        Command::FormatTicks => built(chart)?.format_ticks(),
        Command::SetTitle { title } => built(chart)?.set_title(title.as_str()),
        Command::SetAxisTitle { axis, title } => {
            built(chart)?.set_axis_title(*axis, title.as_str())
        }
    }
    Ok(())
}

/// Execute commands strictly in order, stopping at the first failure.
pub fn replay<'a>(
    commands: impl IntoIterator<Item = &'a Command>,
    pipeline: &mut Pipeline,
    chart: &mut Option<ChartPayload>,
) -> Result<(), EngineError> {
    for command in commands {
        apply(command, pipeline, chart)?;
    }
    Ok(())
}
