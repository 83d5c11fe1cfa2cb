// Cell values, column identifiers and the column-oriented event table

use crate::error::EngineError;
use crate::field::Field;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single cell.
///
/// Serialized untagged so payloads and command files read as plain JSON.
/// Variant order matters for deserialization: integers are tried before
/// floats and dates before free-form strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
    Str(String),
    Reactions(BTreeMap<String, i64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Booleans count as numeric, so summing a flag column counts its `true` rows.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 0,
            Value::Date(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Str(_) => 3,
            Value::Reactions(_) => 4,
            Value::Null => 5,
        }
    }

    /// Comparison within a family of compatible values (numbers with numbers,
    /// dates with dates, ...). `None` for nulls and mismatched families.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Reactions(a), Value::Reactions(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                _ => None,
            },
        }
    }

    /// Total order used for sorting and grouping. Nulls sort last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Str(s) => f.write_str(s),
            Value::Reactions(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

/// Identifier of a table column.
///
/// Catalog fields are the common case; cumulative derivations get their own
/// variant so the closed field set stays closed, and caller-chosen result
/// names fall back to `Alias`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ColumnId {
    Field(Field),
    Cumulative(Field),
    Alias(String),
}

const CUMULATIVE_PREFIX: &str = "cumulative_";

impl ColumnId {
    /// Resolve a column name, preferring catalog fields and the default
    /// cumulative naming scheme over free-form aliases.
    pub fn parse(name: &str) -> Self {
        if let Ok(field) = name.parse::<Field>() {
            return ColumnId::Field(field);
        }
        if let Some(source) = name.strip_prefix(CUMULATIVE_PREFIX) {
            if let Ok(field) = source.parse::<Field>() {
                return ColumnId::Cumulative(field);
            }
        }
        ColumnId::Alias(name.to_string())
    }

    pub fn name(&self) -> String {
        match self {
            ColumnId::Field(field) => field.name().to_string(),
            ColumnId::Cumulative(field) => format!("{}{}", CUMULATIVE_PREFIX, field.name()),
            ColumnId::Alias(name) => name.clone(),
        }
    }

    pub fn as_field(&self) -> Option<Field> {
        match self {
            ColumnId::Field(field) => Some(*field),
            _ => None,
        }
    }
}

impl From<Field> for ColumnId {
    fn from(field: Field) -> Self {
        ColumnId::Field(field)
    }
}

impl From<String> for ColumnId {
    fn from(name: String) -> Self {
        ColumnId::parse(&name)
    }
}

impl From<ColumnId> for String {
    fn from(id: ColumnId) -> Self {
        id.name()
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: ColumnId,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>, values: Vec<Value>) -> Self {
        Self { id: id.into(), values }
    }

    /// A column is numeric when every non-null cell is a number or a flag.
    pub fn is_numeric(&self) -> bool {
        self.values.iter().all(|v| v.is_null() || v.is_numeric())
    }
}

/// Column-oriented table. All columns always have the same length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, EngineError> {
        let mut table = Table::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Build the canonical event table from typed records.
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut datetime = Vec::with_capacity(records.len());
        let mut author = Vec::with_capacity(records.len());
        let mut channel_name = Vec::with_capacity(records.len());
        let mut word_count = Vec::with_capacity(records.len());
        let mut scene_end = Vec::with_capacity(records.len());
        let mut reactions = Vec::with_capacity(records.len());

        for record in records {
            datetime.push(Value::Timestamp(record.datetime));
            author.push(Value::Str(record.author.clone()));
            channel_name.push(Value::Str(record.channel_name.clone()));
            word_count.push(Value::Int(record.word_count));
            scene_end.push(Value::Bool(record.scene_end));
            reactions.push(Value::Reactions(record.reactions.clone()));
        }

        Table {
            columns: vec![
                Column::new(Field::Datetime, datetime),
                Column::new(Field::Author, author),
                Column::new(Field::ChannelName, channel_name),
                Column::new(Field::WordCount, word_count),
                Column::new(Field::SceneEnd, scene_end),
                Column::new(Field::Reactions, reactions),
            ],
        }
    }

    /// Create the event table from a JSON Array of Objects
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("Input data must be a JSON array of objects"))?;

        if array.is_empty() {
            return Err(anyhow!("Input data array is empty"));
        }

        let records: Vec<EventRecord> = array
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                serde_json::from_value(item.clone())
                    .with_context(|| format!("Invalid event record at index {}", idx))
            })
            .collect::<Result<_>>()?;

        Ok(Self::from_records(&records))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.name()).collect()
    }

    pub fn position(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.position(id).is_some()
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    /// Column lookup that reports a missing column as an error.
    pub fn require(&self, id: &ColumnId) -> Result<&Column, EngineError> {
        self.column(id)
            .ok_or_else(|| EngineError::UnknownColumn(id.clone()))
    }

    fn check_length(&self, column: &Column) -> Result<(), EngineError> {
        if !self.columns.is_empty() && column.values.len() != self.len() {
            return Err(EngineError::RaggedColumn {
                column: column.id.clone(),
                expected: self.len(),
                found: column.values.len(),
            });
        }
        Ok(())
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), EngineError> {
        let index = self.columns.len();
        self.insert_column(index, column)
    }

    pub fn insert_column(&mut self, index: usize, column: Column) -> Result<(), EngineError> {
        if self.contains(&column.id) {
            return Err(EngineError::DuplicateColumn(column.id));
        }
        self.check_length(&column)?;
        self.columns.insert(index.min(self.columns.len()), column);
        Ok(())
    }

    /// Replace a column in place, or append it when absent.
    pub fn set_column(&mut self, column: Column) -> Result<(), EngineError> {
        match self.position(&column.id) {
            Some(idx) => {
                // Replacing the only column may change the row count
                if self.columns.len() > 1 {
                    self.check_length(&column)?;
                }
                self.columns[idx] = column;
                Ok(())
            }
            None => self.push_column(column),
        }
    }

    /// Keep only the rows whose mask entry is `true`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut mask = keep.iter();
            column
                .values
                .retain(|_| mask.next().copied().unwrap_or(false));
        }
    }

    /// Rearrange rows so that row `i` of the result is row `order[i]` of the input.
    pub fn reorder_rows(&mut self, order: &[usize]) {
        for column in &mut self.columns {
            column.values = order.iter().map(|&i| column.values[i].clone()).collect();
        }
    }

    /// Projection onto `ids`, in that order.
    pub fn select(&self, ids: &[ColumnId]) -> Result<Table, EngineError> {
        let columns = ids
            .iter()
            .map(|id| self.require(id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table { columns })
    }

    /// Row-major copy of the table, in column order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.len())
            .map(|row| self.columns.iter().map(|c| c.values[row].clone()).collect())
            .collect()
    }
}

/// One message event in its canonical, already-cleaned shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub datetime: DateTime<FixedOffset>,
    pub author: String,
    pub channel_name: String,
    pub word_count: i64,
    #[serde(default)]
    pub scene_end: bool,
    #[serde(default)]
    pub reactions: BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_id_parse() {
        assert_eq!(ColumnId::parse("hour"), ColumnId::Field(Field::Hour));
        assert_eq!(
            ColumnId::parse("cumulative_word_count"),
            ColumnId::Cumulative(Field::WordCount)
        );
        assert_eq!(ColumnId::parse("total"), ColumnId::Alias("total".to_string()));
        assert_eq!(ColumnId::Cumulative(Field::Count).name(), "cumulative_count");
    }

    #[test]
    fn test_ragged_column_rejected() {
        let mut table = Table::from_columns(vec![Column::new(
            Field::Author,
            vec!["A".into(), "B".into()],
        )])
        .unwrap();
        let result = table.push_column(Column::new(Field::WordCount, vec![Value::Int(1)]));
        assert!(matches!(result, Err(EngineError::RaggedColumn { .. })));
        assert_eq!(table.width(), 1);
    }

    #[test]
    fn test_retain_and_reorder() {
        let mut table = Table::from_columns(vec![
            Column::new(Field::Author, vec!["A".into(), "B".into(), "C".into()]),
            Column::new(Field::WordCount, vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();
        table.retain_rows(&[true, false, true]);
        table.reorder_rows(&[1, 0]);
        assert_eq!(
            table.rows(),
            vec![
                vec![Value::from("C"), Value::Int(3)],
                vec![Value::from("A"), Value::Int(1)],
            ]
        );
    }

    #[test]
    fn test_total_cmp_puts_nulls_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Float(1.5)];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, vec![Value::Float(1.5), Value::Int(3), Value::Null]);
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_from_json() {
        let data = json!([
            {
                "datetime": "2024-11-01T09:30:00+11:00",
                "author": "Alice",
                "channel_name": "tavern",
                "word_count": 12,
                "reactions": {"heart": 2}
            }
        ]);
        let table = Table::from_json(&data).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.headers(),
            vec!["datetime", "author", "channel_name", "word_count", "scene_end", "reactions"]
        );
        let scene_end = table.column(&Field::SceneEnd.into()).unwrap();
        assert_eq!(scene_end.values, vec![Value::Bool(false)]);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(Table::from_json(&json!({"author": "Alice"})).is_err());
        assert!(Table::from_json(&json!([])).is_err());
    }
}
