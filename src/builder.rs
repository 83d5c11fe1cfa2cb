//! Lazy chart builder.
//!
//! Configuration calls only queue [`Command`]s; nothing touches the data
//! until [`PlotBuilder::build`] replays the queue in insertion order. A
//! builder owns one [`Pipeline`] and produces at most one chart until it is
//! reset.

use crate::aggregation::Aggregation;
use crate::command::{self, Command};
use crate::data::{ColumnId, Table};
use crate::error::EngineError;
use crate::field::Field;
use crate::filter::{FilterGroup, FilterValue, Operator};
use crate::ir::{AxisKind, ChartPayload, PlotKind};
use crate::transform::Pipeline;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Empty,
    Queued,
    Built,
}

#[derive(Debug, Clone)]
pub struct PlotBuilder {
    pipeline: Pipeline,
    chart: Option<ChartPayload>,
    commands: Vec<Command>,
    // Commands before this index have already been replayed
    replayed: usize,
}

impl PlotBuilder {
    pub fn new(table: impl Into<Arc<Table>>) -> Self {
        Self::from_pipeline(Pipeline::new(table))
    }

    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            chart: None,
            commands: Vec::new(),
            replayed: 0,
        }
    }

    pub fn state(&self) -> BuilderState {
        if self.chart.is_some() {
            BuilderState::Built
        } else if self.commands.is_empty() {
            BuilderState::Empty
        } else {
            BuilderState::Queued
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = Command>) -> &mut Self {
        self.commands.extend(commands);
        self
    }

    // Field selection

    pub fn field(&mut self, field: Field) -> &mut Self {
        self.push(Command::AddField { field })
    }

    pub fn author(&mut self) -> &mut Self {
        self.field(Field::Author)
    }

    pub fn channel_name(&mut self) -> &mut Self {
        self.field(Field::ChannelName)
    }

    pub fn date(&mut self) -> &mut Self {
        self.field(Field::Date)
    }

    pub fn day(&mut self) -> &mut Self {
        self.field(Field::Day)
    }

    pub fn hour(&mut self) -> &mut Self {
        self.field(Field::Hour)
    }

    pub fn count(&mut self) -> &mut Self {
        self.field(Field::Count)
    }

    pub fn word_count(&mut self) -> &mut Self {
        self.field(Field::WordCount)
    }

    pub fn reaction_count(&mut self) -> &mut Self {
        self.field(Field::ReactionCount)
    }

    pub fn scene_end(&mut self) -> &mut Self {
        self.field(Field::SceneEnd)
    }

    /// Count of one named reaction per message.
    pub fn reaction(&mut self, reaction: impl Into<String>) -> &mut Self {
        self.push(Command::AddReactionField {
            field: Field::ReactionCount,
            reaction: reaction.into(),
        })
    }

    // Aggregation

    pub fn group_by(&mut self, aggregation: Aggregation, field: Option<Field>) -> &mut Self {
        self.push(Command::GroupBy { aggregation, field })
    }

    pub fn sum(&mut self) -> &mut Self {
        self.group_by(Aggregation::Sum, None)
    }

    pub fn mean(&mut self) -> &mut Self {
        self.group_by(Aggregation::Mean, None)
    }

    pub fn nunique(&mut self) -> &mut Self {
        self.group_by(Aggregation::CountDistinct, None)
    }

    pub fn agg(&mut self, aggregations: BTreeMap<Field, Aggregation>) -> &mut Self {
        self.push(Command::GroupByMultiple { aggregations })
    }

    pub fn value_counts(&mut self) -> &mut Self {
        self.push(Command::ValueCounts)
    }

    // Row selection and ordering

    pub fn filter(&mut self, filter: FilterGroup) -> &mut Self {
        self.push(Command::Filter(filter))
    }

    pub fn filter_min(&mut self, field: Field, value: impl Into<FilterValue>) -> &mut Self {
        self.filter(FilterGroup::new(field, Operator::Geq, value))
    }

    pub fn filter_max(&mut self, field: Field, value: impl Into<FilterValue>) -> &mut Self {
        self.filter(FilterGroup::new(field, Operator::Leq, value))
    }

    pub fn filter_equals(&mut self, field: Field, value: impl Into<FilterValue>) -> &mut Self {
        self.filter(FilterGroup::new(field, Operator::Eq, value))
    }

    pub fn sort(&mut self, column: impl Into<ColumnId>, ascending: bool) -> &mut Self {
        self.push(Command::Sort {
            column: column.into(),
            ascending,
        })
    }

    pub fn cumulative(&mut self, field: Field, result: Option<String>) -> &mut Self {
        self.push(Command::Cumulative { field, result })
    }

    // Chart construction and mutation

    pub fn plot(&mut self, kind: PlotKind, x: Option<ColumnId>, y: Option<ColumnId>) -> &mut Self {
        self.push(Command::Chart { kind, x, y })
    }

    pub fn bar(&mut self) -> &mut Self {
        self.plot(PlotKind::Bar, None, None)
    }

    pub fn line(&mut self) -> &mut Self {
        self.plot(PlotKind::Line, None, None)
    }

    pub fn scatter(&mut self) -> &mut Self {
        self.plot(PlotKind::Scatter, None, None)
    }

    pub fn xlog(&mut self) -> &mut Self {
        self.push(Command::LogScale { axis: AxisKind::X })
    }

    pub fn ylog(&mut self) -> &mut Self {
        self.push(Command::LogScale { axis: AxisKind::Y })
    }

    pub fn moving_average(&mut self, window: usize, label: Option<String>) -> &mut Self {
        self.push(Command::MovingAverage { window, label })
    }

    pub fn format_ticks(&mut self) -> &mut Self {
        self.push(Command::FormatTicks)
    }

    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.push(Command::SetTitle {
            title: title.into(),
        })
    }

    pub fn x_label(&mut self, title: impl Into<String>) -> &mut Self {
        self.push(Command::SetAxisTitle {
            axis: AxisKind::X,
            title: title.into(),
        })
    }

    pub fn y_label(&mut self, title: impl Into<String>) -> &mut Self {
        self.push(Command::SetAxisTitle {
            axis: AxisKind::Y,
            title: title.into(),
        })
    }

    /// Replay every command queued since the last build.
    ///
    /// Commands replay exactly once. Once a chart exists, building again
    /// with nothing new queued is a sequencing error until `reset()`;
    /// chart mutations queued after the first build still apply. A failing
    /// command stays queued.
    pub fn build(&mut self) -> Result<&mut Self, EngineError> {
        if self.chart.is_some() && self.replayed == self.commands.len() {
            return Err(EngineError::ChartAlreadyBuilt);
        }
        while let Some(command) = self.commands.get(self.replayed) {
            command::apply(command, &mut self.pipeline, &mut self.chart)?;
            self.replayed += 1;
        }

        if let Some(chart) = &self.chart {
            info!(
                kind = %chart.kind,
                rows = chart.rows.len(),
                title = %chart.title,
                "built chart"
            );
        }
        Ok(self)
    }

    pub fn chart(&self) -> Result<&ChartPayload, EngineError> {
        self.chart.as_ref().ok_or(EngineError::ChartNotBuilt)
    }

    pub fn into_chart(self) -> Result<ChartPayload, EngineError> {
        self.chart.ok_or(EngineError::ChartNotBuilt)
    }

    /// Drop the chart and the queue, and reset the pipeline.
    pub fn reset(&mut self) -> &mut Self {
        self.pipeline.reset();
        self.chart = None;
        self.commands.clear();
        self.replayed = 0;
        self
    }
}
