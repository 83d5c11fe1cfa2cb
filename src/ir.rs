// Chart payload handed to renderers, and the mutations applied to it

use crate::data::{ColumnId, Value};
use crate::error::EngineError;
use crate::field::Field;
use crate::transform::Pipeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Fewest observations a rolling window needs before it emits a value.
pub const MIN_PERIODS: usize = 3;

const LOG_SUFFIX: &str = " (log scale)";

// =============================================================================
// Chart vocabulary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Bar,
    Line,
    Scatter,
}

impl PlotKind {
    pub fn name(self) -> &'static str {
        match self {
            PlotKind::Bar => "bar",
            PlotKind::Line => "line",
            PlotKind::Scatter => "scatter",
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bar" => Ok(PlotKind::Bar),
            "line" => Ok(PlotKind::Line),
            "scatter" => Ok(PlotKind::Scatter),
            other => Err(format!("unknown chart kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    X,
    Y,
}

// =============================================================================
// Chart payload: what the renderer receives
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: String,
    pub log: bool,
    /// Forced distance between ticks, in data units.
    pub tick_step: Option<f64>,
}

impl Axis {
    fn new(title: String) -> Self {
        Self {
            title,
            log: false,
            tick_step: None,
        }
    }
}

/// One drawable series. The first trace is the chart's own data; later
/// traces are overlays such as moving averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub name: String,
    pub x: Vec<Value>,
    pub y: Vec<Option<f64>>,
    pub text: Option<Vec<Value>>,
    pub dashed: bool,
    pub show_legend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload {
    pub kind: PlotKind,
    pub columns: Vec<ColumnId>,
    pub rows: Vec<Vec<Value>>,
    pub x_field: ColumnId,
    pub y_field: ColumnId,
    pub text_field: Option<ColumnId>,
    pub labels: BTreeMap<ColumnId, String>,
    pub title: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub traces: Vec<Trace>,
}

impl ChartPayload {
    /// Bind the pipeline's current table to a chart.
    ///
    /// Without explicit axes the first two chart columns become x and y. A
    /// third active field, when present, becomes the text annotation.
    pub fn construct(
        pipeline: &Pipeline,
        kind: PlotKind,
        x: Option<ColumnId>,
        y: Option<ColumnId>,
    ) -> Result<Self, EngineError> {
        let mut columns = pipeline.chart_columns();
        if columns.len() < 2 {
            return Err(EngineError::NotEnoughColumns(columns.len()));
        }

        let x_field = x.unwrap_or_else(|| columns[0].clone());
        let y_field = y.unwrap_or_else(|| columns[1].clone());
        let table = pipeline.table();
        for id in [&x_field, &y_field] {
            table.require(id)?;
            if !columns.contains(id) {
                columns.push(id.clone());
            }
        }

        let text_field = pipeline
            .fields()
            .get(2)
            .map(|&f| ColumnId::Field(f))
            .filter(|id| table.contains(id) && id != &x_field && id != &y_field);

        let plot = pipeline.metadata().labels_and_title(&x_field, &y_field)?;
        let selected = table.select(&columns)?;

        let main = Trace {
            name: plot.labels[&y_field].clone(),
            x: table.require(&x_field)?.values.clone(),
            y: table.require(&y_field)?.values.iter().map(Value::as_f64).collect(),
            text: match &text_field {
                Some(id) => Some(table.require(id)?.values.clone()),
                None => None,
            },
            dashed: false,
            show_legend: false,
        };

        debug!(%kind, x = %x_field, y = %y_field, rows = selected.len(), "constructed chart");
        Ok(Self {
            kind,
            columns,
            rows: selected.rows(),
            x_axis: Axis::new(plot.labels[&x_field].clone()),
            y_axis: Axis::new(plot.labels[&y_field].clone()),
            x_field,
            y_field,
            text_field,
            labels: plot.labels,
            title: plot.title,
            traces: vec![main],
        })
    }

    pub fn log_x(&self) -> bool {
        self.x_axis.log
    }

    pub fn log_y(&self) -> bool {
        self.y_axis.log
    }

    pub fn axis(&self, axis: AxisKind) -> &Axis {
        match axis {
            AxisKind::X => &self.x_axis,
            AxisKind::Y => &self.y_axis,
        }
    }

    fn axis_mut(&mut self, axis: AxisKind) -> &mut Axis {
        match axis {
            AxisKind::X => &mut self.x_axis,
            AxisKind::Y => &mut self.y_axis,
        }
    }

    /// Mark an axis logarithmic. Applying it twice changes nothing.
    pub fn apply_log_scale(&mut self, axis: AxisKind) {
        let target = self.axis_mut(axis);
        if target.log {
            return;
        }
        target.log = true;
        target.title.push_str(LOG_SUFFIX);
        debug!(?axis, "log scale");
    }

    /// Overlay a rolling mean of the main series as a dashed line.
    ///
    /// The first overlay renames the main series to "Daily". Adding an
    /// overlay with a name already present is a no-op.
    pub fn add_moving_average(&mut self, window: usize, label: Option<String>) -> Result<(), EngineError> {
        if window < MIN_PERIODS {
            return Err(EngineError::InvalidWindow {
                window,
                min: MIN_PERIODS,
            });
        }

        let name = label.unwrap_or_else(|| default_average_name(window));
        if self.traces.iter().any(|t| t.name == name) {
            return Ok(());
        }

        let main = &self.traces[0];
        let values = rolling_mean(&main.y, window, MIN_PERIODS);
        if values.iter().all(Option::is_none) {
            warn!(window, rows = values.len(), "moving average has no values");
        }
        let overlay = Trace {
            name,
            x: main.x.clone(),
            y: values,
            text: None,
            dashed: true,
            show_legend: true,
        };

        if self.traces.len() == 1 {
            self.traces[0].name = "Daily".to_string();
            self.traces[0].show_legend = true;
        }
        debug!(overlay = %overlay.name, window, "moving average");
        self.traces.push(overlay);
        Ok(())
    }

    /// One tick per unit for hour/day scatter charts.
    pub fn format_ticks(&mut self) {
        let discrete = matches!(
            self.x_field,
            ColumnId::Field(Field::Hour) | ColumnId::Field(Field::Day)
        );
        if self.kind == PlotKind::Scatter && discrete {
            self.x_axis.tick_step = Some(1.0);
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Replace a generated axis title, log suffix included.
    pub fn set_axis_title(&mut self, axis: AxisKind, title: impl Into<String>) {
        self.axis_mut(axis).title = title.into();
    }
}

fn default_average_name(window: usize) -> String {
    let period = match window {
        7 => "Weekly".to_string(),
        30 => "Monthly".to_string(),
        n => format!("{}-Day", n),
    };
    format!("{} Moving Avg", period)
}

/// Trailing rolling mean. A position gets a value once its window holds at
/// least `min_periods` non-missing observations.
pub fn rolling_mean(values: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if present.len() >= min_periods {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Aggregation;
    use crate::data::{Column, Table};

    fn grouped(rows: i64) -> Pipeline {
        let table = Table::from_columns(vec![
            Column::new(Field::Day, (1..=rows).map(Value::Int).collect()),
            Column::new(Field::Count, (1..=rows).map(|i| Value::Int(i * 2)).collect()),
        ])
        .unwrap();
        let mut pipeline = Pipeline::new(table);
        pipeline
            .add_field(Field::Day)
            .unwrap()
            .add_field(Field::Count)
            .unwrap()
            .group_by(Aggregation::Sum, None)
            .unwrap();
        pipeline
    }

    #[test]
    fn test_construct_binds_first_two_columns() {
        let chart = ChartPayload::construct(&grouped(3), PlotKind::Line, None, None).unwrap();
        assert_eq!(chart.x_field, ColumnId::Field(Field::Day));
        assert_eq!(chart.y_field, ColumnId::Field(Field::Count));
        assert_eq!(chart.title, "Messages by Day of Month");
        assert_eq!(chart.y_axis.title, "Number of Messages");
        assert_eq!(chart.traces[0].y, vec![Some(2.0), Some(4.0), Some(6.0)]);
        assert!(chart.text_field.is_none());
    }

    #[test]
    fn test_construct_needs_two_columns() {
        let table = Table::from_columns(vec![Column::new(Field::Author, vec!["A".into()])]).unwrap();
        let mut pipeline = Pipeline::new(table);
        pipeline.add_field(Field::Author).unwrap();
        let err = ChartPayload::construct(&pipeline, PlotKind::Bar, None, None).unwrap_err();
        assert!(matches!(err, EngineError::NotEnoughColumns(1)));
    }

    #[test]
    fn test_third_field_is_text() {
        let table = Table::from_columns(vec![
            Column::new(Field::Author, vec!["A".into(), "B".into()]),
            Column::new(Field::WordCount, vec![Value::Int(5), Value::Int(9)]),
            Column::new(Field::ChannelName, vec!["x".into(), "y".into()]),
        ])
        .unwrap();
        let mut pipeline = Pipeline::new(table);
        for field in [Field::Author, Field::WordCount, Field::ChannelName] {
            pipeline.add_field(field).unwrap();
        }
        let chart = ChartPayload::construct(&pipeline, PlotKind::Scatter, None, None).unwrap();
        assert_eq!(chart.text_field, Some(ColumnId::Field(Field::ChannelName)));
        assert_eq!(chart.traces[0].text.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_log_scale_is_idempotent() {
        let mut chart = ChartPayload::construct(&grouped(3), PlotKind::Bar, None, None).unwrap();
        chart.apply_log_scale(AxisKind::Y);
        chart.apply_log_scale(AxisKind::Y);
        assert!(chart.log_y());
        assert!(!chart.log_x());
        assert_eq!(chart.y_axis.title, "Number of Messages (log scale)");

        chart.set_axis_title(AxisKind::Y, "Messages");
        assert_eq!(chart.axis(AxisKind::Y).title, "Messages");
    }

    #[test]
    fn test_rolling_mean_minimum_periods() {
        let two = [Some(1.0), Some(2.0)];
        assert_eq!(rolling_mean(&two, 7, MIN_PERIODS), vec![None, None]);

        let four = [Some(1.0), Some(2.0), Some(3.0), Some(6.0)];
        assert_eq!(
            rolling_mean(&four, 7, MIN_PERIODS),
            vec![None, None, Some(2.0), Some(3.0)]
        );
        assert_eq!(
            rolling_mean(&four, 3, MIN_PERIODS),
            vec![None, None, Some(2.0), Some(11.0 / 3.0)]
        );
    }

    #[test]
    fn test_moving_average_overlay() {
        let mut chart = ChartPayload::construct(&grouped(4), PlotKind::Line, None, None).unwrap();
        chart.add_moving_average(7, None).unwrap();
        chart.add_moving_average(7, None).unwrap();

        assert_eq!(chart.traces.len(), 2);
        assert_eq!(chart.traces[0].name, "Daily");
        assert_eq!(chart.traces[1].name, "Weekly Moving Avg");
        assert!(chart.traces[1].dashed);
        assert_eq!(chart.traces[1].y, vec![None, None, Some(4.0), Some(5.0)]);

        chart.add_moving_average(30, None).unwrap();
        chart.add_moving_average(14, None).unwrap();
        assert_eq!(chart.traces[2].name, "Monthly Moving Avg");
        assert_eq!(chart.traces[3].name, "14-Day Moving Avg");
    }

    #[test]
    fn test_moving_average_window_too_small() {
        let mut chart = ChartPayload::construct(&grouped(4), PlotKind::Line, None, None).unwrap();
        let err = chart.add_moving_average(2, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWindow { window: 2, min: 3 }));
    }

    #[test]
    fn test_ticks_only_for_discrete_scatter() {
        let mut line = ChartPayload::construct(&grouped(3), PlotKind::Line, None, None).unwrap();
        line.format_ticks();
        assert_eq!(line.x_axis.tick_step, None);

        let mut scatter = ChartPayload::construct(&grouped(3), PlotKind::Scatter, None, None).unwrap();
        scatter.format_ticks();
        assert_eq!(scatter.x_axis.tick_step, Some(1.0));
    }
}
