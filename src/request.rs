// Dashboard form model: a declarative chart request compiled into commands

use crate::aggregation::Aggregation;
use crate::command::Command;
use crate::data::ColumnId;
use crate::error::EngineError;
use crate::field::Field;
use crate::filter::{FilterGroup, FilterKind, FilterValue, Operator};
use crate::ir::{AxisKind, PlotKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

fn default_axes() -> Vec<AxisKind> {
    vec![AxisKind::X, AxisKind::Y]
}

fn ascending() -> bool {
    true
}

/// One filter row of the form. A blank value means the row is ignored; a
/// missing operator falls back to the filter catalog's default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub field: Field,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: Option<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    pub axis: AxisKind,
    #[serde(default = "ascending")]
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub x_log: bool,
    pub y_log: bool,
    pub moving_averages: Vec<usize>,
    pub sort: Option<SortConfig>,
}

/// Everything the dashboard collects for one chart.
///
/// The last field is the grouping key; every other field is reduced by the
/// aggregation at the same position in `aggregations`, or by its default.
/// `axes` says whether the first field goes on x (`[x, y]`) or y (`[y, x]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub kind: PlotKind,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default = "default_axes")]
    pub axes: Vec<AxisKind>,
    #[serde(default)]
    pub filters: Vec<FilterRequest>,
    #[serde(default)]
    pub figure: FigureConfig,
}

impl ChartRequest {
    /// (x, y) fields for the requested axis order.
    pub fn axis_fields(&self) -> Result<(Field, Field), EngineError> {
        let (primary, secondary) = match self.fields[..] {
            [primary, secondary, ..] => (primary, secondary),
            _ => return Err(EngineError::NotEnoughColumns(self.fields.len())),
        };
        match self.axes[..] {
            [AxisKind::X, AxisKind::Y] => Ok((primary, secondary)),
            [AxisKind::Y, AxisKind::X] => Ok((secondary, primary)),
            _ => Err(EngineError::InvalidAxes(format!("{:?}", self.axes))),
        }
    }

    pub fn compile(&self) -> Result<Vec<Command>, EngineError> {
        if self.fields.len() > 3 {
            return Err(EngineError::InvalidAxes(format!(
                "expected two or three fields, got {}",
                self.fields.len()
            )));
        }
        let (x, y) = self.axis_fields()?;
        let mut commands = Vec::new();

        // 1. Filters
        for filter in &self.filters {
            let Some(value) = filter.value.clone().filter(|v| !v.is_empty()) else {
                continue;
            };
            let operator = filter.operator.unwrap_or_else(|| {
                FilterKind::for_field(filter.field).map_or(Operator::Eq, FilterKind::default_operator)
            });
            commands.push(Command::Filter(FilterGroup::new(filter.field, operator, value)));
        }

        // 2. Fields, grouped by the last one
        commands.extend(self.fields.iter().map(|&field| Command::AddField { field }));
        let (key, reduced) = match self.fields.split_last() {
            Some((&key, reduced)) => (key, reduced),
            None => return Err(EngineError::NotEnoughColumns(0)),
        };
        let mut aggregations = BTreeMap::new();
        for (idx, &field) in reduced.iter().enumerate() {
            let aggregation = match self.aggregations.get(idx).copied() {
                Some(aggregation) => aggregation,
                None => field.default_aggregation().ok_or(EngineError::UnsupportedAggregation {
                    field,
                    aggregation: Aggregation::Sum,
                })?,
            };
            aggregations.insert(field, aggregation);
        }
        commands.push(Command::GroupByMultiple { aggregations });

        // 3. Sorting
        match &self.figure.sort {
            Some(sort) => {
                let column = match sort.axis {
                    AxisKind::X => x,
                    AxisKind::Y => y,
                };
                commands.push(Command::Sort {
                    column: ColumnId::Field(column),
                    ascending: sort.ascending,
                });
            }
            // Temporal keys keep the group-by's chronological order
            None if !key.is_temporal() => commands.push(Command::Sort {
                column: ColumnId::Field(self.fields[0]),
                ascending: true,
            }),
            None => {}
        }

        // 4. Chart and figure customisation
        commands.push(Command::Chart {
            kind: self.kind,
            x: Some(ColumnId::Field(x)),
            y: Some(ColumnId::Field(y)),
        });
        if self.figure.x_log {
            commands.push(Command::LogScale { axis: AxisKind::X });
        }
        if self.figure.y_log {
            commands.push(Command::LogScale { axis: AxisKind::Y });
        }
        if let Some(title) = &self.figure.title {
            commands.push(Command::SetTitle { title: title.clone() });
        }
        if let Some(label) = &self.figure.x_label {
            commands.push(Command::SetAxisTitle {
                axis: AxisKind::X,
                title: label.clone(),
            });
        }
        if let Some(label) = &self.figure.y_label {
            commands.push(Command::SetAxisTitle {
                axis: AxisKind::Y,
                title: label.clone(),
            });
        }
        commands.push(Command::FormatTicks);
        commands.extend(
            self.figure
                .moving_averages
                .iter()
                .map(|&window| Command::MovingAverage { window, label: None }),
        );

        debug!(commands = commands.len(), "compiled chart request");
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PlotBuilder;
    use crate::data::{EventRecord, Table, Value};
    use chrono::DateTime;
    use serde_json::json;

    fn events() -> Table {
        let record = |datetime: &str, author: &str, channel: &str| EventRecord {
            datetime: DateTime::parse_from_rfc3339(datetime).unwrap(),
            author: author.to_string(),
            channel_name: channel.to_string(),
            word_count: 10,
            scene_end: false,
            reactions: Default::default(),
        };
        Table::from_records(&[
            record("2024-11-02T09:00:00+00:00", "Bob", "tavern"),
            record("2024-11-01T14:00:00+00:00", "Alice", "tavern"),
            record("2024-11-01T15:00:00+00:00", "Alice", "market"),
        ])
    }

    fn request(value: serde_json::Value) -> ChartRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_from_json() {
        let req = request(json!({"kind": "bar", "fields": ["count", "author"]}));
        assert_eq!(req.axes, vec![AxisKind::X, AxisKind::Y]);
        assert!(req.filters.is_empty());
        assert_eq!(req.figure, FigureConfig::default());
    }

    #[test]
    fn test_swapped_axes() {
        let req = request(json!({"kind": "bar", "fields": ["count", "author"], "axes": ["y", "x"]}));
        assert_eq!(req.axis_fields().unwrap(), (Field::Author, Field::Count));

        let bad = request(json!({"kind": "bar", "fields": ["count", "author"], "axes": ["x", "x"]}));
        assert!(matches!(bad.compile(), Err(EngineError::InvalidAxes(_))));
    }

    #[test]
    fn test_too_few_fields() {
        let req = request(json!({"kind": "bar", "fields": ["count"]}));
        assert!(matches!(req.compile(), Err(EngineError::NotEnoughColumns(1))));
    }

    #[test]
    fn test_compile_order() {
        let req = request(json!({
            "kind": "line",
            "fields": ["word_count", "date"],
            "aggregations": ["mean"],
            "axes": ["y", "x"],
            "filters": [
                {"field": "author", "value": "Alice"},
                {"field": "hour", "value": ""}
            ],
            "figure": {"y_log": true, "moving_averages": [7]}
        }));
        let commands = req.compile().unwrap();

        assert_eq!(
            commands[0],
            Command::Filter(FilterGroup::new(Field::Author, Operator::In, "Alice"))
        );
        assert_eq!(commands[1], Command::AddField { field: Field::WordCount });
        assert_eq!(commands[2], Command::AddField { field: Field::Date });
        assert_eq!(
            commands[3],
            Command::GroupByMultiple {
                aggregations: [(Field::WordCount, Aggregation::Mean)].into_iter().collect()
            }
        );
        // Temporal key: no default sort
        assert_eq!(
            commands[4],
            Command::Chart {
                kind: PlotKind::Line,
                x: Some(ColumnId::Field(Field::Date)),
                y: Some(ColumnId::Field(Field::WordCount)),
            }
        );
        assert_eq!(commands[5], Command::LogScale { axis: AxisKind::Y });
        assert_eq!(commands[6], Command::FormatTicks);
        assert_eq!(commands[7], Command::MovingAverage { window: 7, label: None });
    }

    #[test]
    fn test_request_builds_chart() {
        let req = request(json!({
            "kind": "bar",
            "fields": ["count", "author"],
            "axes": ["y", "x"],
            "figure": {"y_log": true, "y_label": "Posts"}
        }));
        let mut builder = PlotBuilder::new(events());
        builder.extend(req.compile().unwrap()).build().unwrap();

        let chart = builder.chart().unwrap();
        assert_eq!(chart.x_field, ColumnId::Field(Field::Author));
        assert_eq!(chart.title, "Messages by Users");
        // A custom label replaces the log suffix
        assert_eq!(chart.y_axis.title, "Posts");
        assert!(chart.log_y());
        // Sorted ascending by the first field by default
        assert_eq!(chart.traces[0].y, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_explicit_sort() {
        let req = request(json!({
            "kind": "bar",
            "fields": ["count", "author"],
            "axes": ["y", "x"],
            "figure": {"sort": {"axis": "y", "ascending": false}}
        }));
        let mut builder = PlotBuilder::new(events());
        builder.extend(req.compile().unwrap()).build().unwrap();
        let chart = builder.chart().unwrap();
        assert_eq!(chart.traces[0].x, vec![Value::from("Alice"), Value::from("Bob")]);
    }

    #[test]
    fn test_text_field_from_third_selection() {
        let req = request(json!({
            "kind": "scatter",
            "fields": ["count", "author", "channel_name"],
            "aggregations": ["sum", "nunique"]
        }));
        let mut builder = PlotBuilder::new(events());
        builder.extend(req.compile().unwrap()).build().unwrap();
        let chart = builder.chart().unwrap();
        assert_eq!(chart.text_field, Some(ColumnId::Field(Field::ChannelName)));
        assert_eq!(chart.title, "Unique Users by Messages");
    }
}
