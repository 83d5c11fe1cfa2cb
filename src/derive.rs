// Derived-field synthesizer: computes a field's column from the canonical columns on demand

use crate::data::{Column, ColumnId, Table, Value};
use crate::error::EngineError;
use crate::field::Field;
use chrono::{Datelike, Timelike};
use tracing::debug;

/// Make sure `table` holds a column for `field`, computing it when absent.
///
/// Calling this for a field that is already present is a no-op, so the
/// pipeline can call it on every reference without tracking what it derived.
pub fn ensure(table: &mut Table, field: Field) -> Result<(), EngineError> {
    let id = ColumnId::Field(field);
    if table.contains(&id) {
        return Ok(());
    }

    let values = match field {
        Field::Hour => from_timestamp(table, |ts| Value::Int(i64::from(ts.hour())))?,
        Field::Day => from_timestamp(table, |ts| Value::Int(i64::from(ts.day())))?,
        Field::Date => from_timestamp(table, |ts| Value::Date(ts.date_naive()))?,
        Field::Count => vec![Value::Int(1); table.len()],
        Field::ReactionCount => from_reactions(table, |map| map.values().copied().max())?,
        other => return Err(EngineError::MissingSourceColumn(other)),
    };

    debug!(field = %field, rows = values.len(), "derived column");
    table.push_column(Column::new(id, values))
}

/// Recompute the reaction-count column as the count of one named reaction.
///
/// Unlike [`ensure`] this always overwrites, since the same column name is
/// reused for every reaction.
pub fn ensure_reaction(table: &mut Table, reaction: &str) -> Result<(), EngineError> {
    let values = from_reactions(table, |map| map.get(reaction).copied())?;
    debug!(reaction, rows = values.len(), "derived reaction column");
    table.set_column(Column::new(Field::ReactionCount, values))
}

fn from_timestamp(
    table: &Table,
    extract: impl Fn(&chrono::DateTime<chrono::FixedOffset>) -> Value,
) -> Result<Vec<Value>, EngineError> {
    let id = ColumnId::Field(Field::Datetime);
    let source = table
        .column(&id)
        .ok_or(EngineError::MissingSourceColumn(Field::Datetime))?;

    source
        .values
        .iter()
        .map(|value| match value {
            Value::Timestamp(ts) => Ok(extract(ts)),
            Value::Null => Ok(Value::Null),
            _ => Err(EngineError::UnexpectedType {
                column: id.clone(),
                expected: "timestamp",
            }),
        })
        .collect()
}

fn from_reactions(
    table: &Table,
    extract: impl Fn(&std::collections::BTreeMap<String, i64>) -> Option<i64>,
) -> Result<Vec<Value>, EngineError> {
    let id = ColumnId::Field(Field::Reactions);
    let source = table
        .column(&id)
        .ok_or(EngineError::MissingSourceColumn(Field::Reactions))?;

    source
        .values
        .iter()
        .map(|value| match value {
            Value::Reactions(map) => Ok(Value::Int(extract(map).unwrap_or(0))),
            Value::Null => Ok(Value::Int(0)),
            _ => Err(EngineError::UnexpectedType {
                column: id.clone(),
                expected: "reaction map",
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EventRecord;
    use chrono::{DateTime, NaiveDate};
    use std::collections::BTreeMap;

    fn record(datetime: &str, reactions: &[(&str, i64)]) -> EventRecord {
        EventRecord {
            datetime: DateTime::parse_from_rfc3339(datetime).unwrap(),
            author: "Alice".to_string(),
            channel_name: "tavern".to_string(),
            word_count: 10,
            scene_end: false,
            reactions: reactions
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn events() -> Table {
        Table::from_records(&[
            record("2024-11-01T09:30:00+11:00", &[("heart", 2), ("laugh", 5)]),
            record("2024-11-03T23:05:00+11:00", &[]),
        ])
    }

    fn values(table: &Table, field: Field) -> Vec<Value> {
        table.column(&field.into()).unwrap().values.clone()
    }

    #[test]
    fn test_calendar_fields_use_local_time() {
        let mut table = events();
        ensure(&mut table, Field::Hour).unwrap();
        ensure(&mut table, Field::Day).unwrap();
        ensure(&mut table, Field::Date).unwrap();

        assert_eq!(values(&table, Field::Hour), vec![Value::Int(9), Value::Int(23)]);
        assert_eq!(values(&table, Field::Day), vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(
            values(&table, Field::Date)[0],
            Value::Date(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap())
        );
    }

    #[test]
    fn test_count_is_constant() {
        let mut table = events();
        ensure(&mut table, Field::Count).unwrap();
        assert_eq!(values(&table, Field::Count), vec![Value::Int(1), Value::Int(1)]);
    }

    #[test]
    fn test_reaction_count_is_max_or_zero() {
        let mut table = events();
        ensure(&mut table, Field::ReactionCount).unwrap();
        assert_eq!(
            values(&table, Field::ReactionCount),
            vec![Value::Int(5), Value::Int(0)]
        );
    }

    #[test]
    fn test_single_reaction() {
        let mut table = events();
        ensure(&mut table, Field::ReactionCount).unwrap();
        ensure_reaction(&mut table, "heart").unwrap();
        assert_eq!(
            values(&table, Field::ReactionCount),
            vec![Value::Int(2), Value::Int(0)]
        );
        assert_eq!(table.width(), 7);
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut once = events();
        ensure(&mut once, Field::Hour).unwrap();

        let mut twice = events();
        ensure(&mut twice, Field::Hour).unwrap();
        ensure(&mut twice, Field::Hour).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_present_source_field_is_a_no_op() {
        let mut table = events();
        let before = table.clone();
        ensure(&mut table, Field::Author).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_missing_source_field() {
        let mut table = Table::new();
        let err = ensure(&mut table, Field::WordCount).unwrap_err();
        assert!(matches!(err, EngineError::MissingSourceColumn(Field::WordCount)));

        let err = ensure(&mut table, Field::Hour).unwrap_err();
        assert!(matches!(err, EngineError::MissingSourceColumn(Field::Datetime)));
    }
}
